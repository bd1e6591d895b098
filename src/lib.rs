//! # recache
//!
//! Transparent call-result caching: derive a deterministic key from a call's
//! identity and arguments, compute the result at most once per key, and serve
//! it from a pluggable store until it expires.
//!
//! The crate is the guard protocol that sits behind any interception
//! mechanism, not an interception framework itself: the caller supplies the
//! operation's identity, its argument values, and a closure that performs the
//! real work, and cannot tell afterwards whether the result was computed or
//! retrieved.
//!
//! ## Quick Start
//!
//! ```rust
//! use recache::{CacheGuard, KeyDeriver, MemoryStore};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let guard = CacheGuard::new(MemoryStore::new());
//!     let key = KeyDeriver::new("users.find")?.arg(&42u64)?.finish();
//!
//!     // First call computes and stores; later calls with the same key
//!     // are served from the store.
//!     let user = guard.execute(&key, || {
//!         Ok::<_, std::io::Error>(Some("alice".to_owned()))
//!     })?;
//!     assert_eq!(user.as_deref(), Some("alice"));
//!     Ok(())
//! }
//! ```

// ── Core modules ──────────────────────────────────────────────────────────────
pub mod guard;
pub mod key;
pub mod store;

// ── Optional layers ───────────────────────────────────────────────────────────
pub mod flight;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use flight::SingleFlight;
pub use guard::{CacheError, CacheGuard, StoreFailurePolicy};
pub use key::{CallKey, KeyDeriver, KeyError};
pub use store::{CacheStore, CachedValue, Lookup, MemoryStore, StoreError};
