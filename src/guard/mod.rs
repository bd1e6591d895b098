//! Cache guard — compute once per key, serve from the store afterwards.
//!
//! [`CacheGuard`] is the single decision point of the crate. Given a
//! [`CallKey`] and a deferred computation, it consults its injected
//! [`CacheStore`] and either serves the stored value (hit) or invokes the
//! computation exactly once, writes the result through, and returns it
//! (miss). Callers cannot tell which path was taken apart from latency.
//!
//! The guard is a pass-through decorator: no retries, no backoff, no
//! timeouts, no concurrency of its own. It runs synchronously on whatever
//! thread calls it. Two concurrent misses on the same key may both compute
//! and both write, last write wins; see [`crate::flight`] for the opt-in
//! layer that serializes those.

use tracing::{debug, warn};

use crate::key::CallKey;
use crate::store::{CacheStore, CachedValue, StoreError};

use thiserror::Error;

/// Errors surfaced by [`CacheGuard::execute`].
#[derive(Debug, Error)]
pub enum CacheError<E> {
    /// The deferred computation failed. The original error is carried
    /// unaltered as the source; nothing was written to the store.
    #[error("cached computation failed")]
    Compute(#[source] E),

    /// The store failed to answer `get` or `put`. Only surfaced under
    /// [`StoreFailurePolicy::FailClosed`].
    #[error("cache store operation failed")]
    Store(#[from] StoreError),
}

/// What the guard does when the store itself fails.
///
/// Whichever policy is chosen applies to both `get` and `put`, for every
/// call through the guard. Silently swallowing store errors can mask a
/// cascading backend failure, so the default is to surface them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreFailurePolicy {
    /// Store failures surface to the caller as [`CacheError::Store`].
    #[default]
    FailClosed,
    /// A failed lookup degrades to a miss; a failed write after a successful
    /// computation is logged and dropped, and the computed value is still
    /// returned. Callers keep working while the backend is down, at the cost
    /// of computing every call.
    FailOpen,
}

/// The cache-guard protocol: look up, and on a miss compute-store-return.
///
/// The store is injected at construction, never read from process-wide
/// state, so a guard is trivially testable against a fake store. The guard
/// itself holds no other state and can be shared freely.
///
/// # Examples
///
/// ```
/// use recache::{CacheGuard, KeyDeriver, MemoryStore};
///
/// let guard = CacheGuard::new(MemoryStore::new());
/// let key = KeyDeriver::new("users.find")?.arg(&42u64)?.finish();
///
/// let user = guard.execute(&key, || {
///     // stands in for the expensive lookup
///     Ok::<_, std::io::Error>(Some("alice".to_owned()))
/// })?;
/// assert_eq!(user.as_deref(), Some("alice"));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct CacheGuard<S> {
    store: S,
    policy: StoreFailurePolicy,
}

impl<S> CacheGuard<S> {
    /// Creates a guard over `store` with the default
    /// [`FailClosed`](StoreFailurePolicy::FailClosed) policy.
    pub fn new(store: S) -> Self {
        Self {
            store,
            policy: StoreFailurePolicy::default(),
        }
    }

    /// Creates a guard with an explicit store-failure policy.
    pub fn with_policy(store: S, policy: StoreFailurePolicy) -> Self {
        Self { store, policy }
    }

    /// Returns a reference to the injected store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs `compute` at most once for `key`, serving the stored value when
    /// a valid entry exists.
    ///
    /// Lookup protocol, in exactly this order:
    ///
    /// 1. Query the store at `key`.
    /// 2. No entry, or an entry the store reports expired: miss. Invoke
    ///    `compute` exactly once, write the wrapped result through, and
    ///    return the freshly computed value. The value handed back is never
    ///    re-read from the store, so a concurrent overwrite or eviction right
    ///    after the write cannot change what this caller observes.
    /// 3. Entry present and unexpired: hit. Return the stored value without
    ///    invoking `compute`.
    ///
    /// A computation returning `Ok(None)` is a legitimate result: it is
    /// stored as [`CachedValue::Absent`] and served back as `None` on
    /// subsequent hits.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Compute`] if `compute` fails. Nothing is written to
    ///   the store, the error is not retried, and a later call with the same
    ///   key behaves as a fresh miss.
    /// - [`CacheError::Store`] if the store fails and the guard was built
    ///   with [`StoreFailurePolicy::FailClosed`].
    pub fn execute<V, E, F>(&self, key: &CallKey, compute: F) -> Result<Option<V>, CacheError<E>>
    where
        S: CacheStore<V>,
        V: Clone,
        F: FnOnce() -> Result<Option<V>, E>,
    {
        let lookup = match self.store.get(key) {
            Ok(lookup) => lookup,
            Err(e) => match self.policy {
                StoreFailurePolicy::FailClosed => return Err(CacheError::Store(e)),
                StoreFailurePolicy::FailOpen => {
                    warn!(key = %key.short_hex(), error = %e, "store lookup failed, degrading to miss");
                    None
                }
            },
        };

        match lookup {
            Some(entry) if !entry.expired => {
                debug!(key = %key.short_hex(), "cache hit");
                return Ok(entry.value.into_option());
            }
            Some(_) => debug!(key = %key.short_hex(), "cache entry expired"),
            None => debug!(key = %key.short_hex(), "cache miss"),
        }

        let value = compute().map_err(CacheError::Compute)?;

        if let Err(e) = self.store.put(key, CachedValue::wrap(value.clone())) {
            match self.policy {
                StoreFailurePolicy::FailClosed => return Err(CacheError::Store(e)),
                StoreFailurePolicy::FailOpen => {
                    warn!(key = %key.short_hex(), error = %e, "store write failed, returning computed value");
                }
            }
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::time::Duration;

    use super::*;
    use crate::key::KeyDeriver;
    use crate::store::{Lookup, MemoryStore};

    #[derive(Debug, PartialEq)]
    struct DivideByZero;

    fn key(op: &str) -> CallKey {
        KeyDeriver::new(op).unwrap().finish()
    }

    #[test]
    fn first_call_computes_second_call_hits() {
        let guard = CacheGuard::new(MemoryStore::new());
        let k = key("k1");
        let calls = Cell::new(0u32);

        let first = guard
            .execute(&k, || {
                calls.set(calls.get() + 1);
                Ok::<_, DivideByZero>(Some("result-A".to_owned()))
            })
            .unwrap();
        assert_eq!(first.as_deref(), Some("result-A"));
        assert_eq!(calls.get(), 1);
        assert_eq!(guard.store().len(), 1);

        let second = guard
            .execute(&k, || {
                calls.set(calls.get() + 1);
                Ok::<_, DivideByZero>(Some("result-B".to_owned()))
            })
            .unwrap();
        assert_eq!(second.as_deref(), Some("result-A"));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn distinct_keys_compute_independently() {
        let guard = CacheGuard::new(MemoryStore::new());
        let calls = Cell::new(0u32);
        let run = |k: &CallKey| {
            guard
                .execute(k, || {
                    calls.set(calls.get() + 1);
                    Ok::<_, DivideByZero>(Some(calls.get()))
                })
                .unwrap()
        };

        assert_eq!(run(&key("a")), Some(1));
        assert_eq!(run(&key("b")), Some(2));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn absent_result_roundtrips_as_none() {
        let guard = CacheGuard::new(MemoryStore::<String>::new());
        let k = key("k");
        let calls = Cell::new(0u32);
        let lookup_nothing = || {
            guard.execute(&k, || {
                calls.set(calls.get() + 1);
                Ok::<_, DivideByZero>(None)
            })
        };

        assert_eq!(lookup_nothing().unwrap(), None);
        assert_eq!(lookup_nothing().unwrap(), None);
        // Stored as a tagged absence, so the second call was a hit.
        assert_eq!(calls.get(), 1);
        assert_eq!(guard.store().len(), 1);
    }

    #[test]
    fn compute_error_propagates_and_pollutes_nothing() {
        let guard = CacheGuard::new(MemoryStore::<String>::new());
        let k = key("k");

        let err = guard
            .execute(&k, || Err::<Option<String>, _>(DivideByZero))
            .unwrap_err();
        assert!(matches!(err, CacheError::Compute(DivideByZero)));
        assert!(guard.store().is_empty());

        // A later succeeding call behaves as a fresh miss.
        let value = guard
            .execute(&k, || Ok::<_, DivideByZero>(Some("ok".to_owned())))
            .unwrap();
        assert_eq!(value.as_deref(), Some("ok"));
    }

    #[test]
    fn expired_entry_forces_recompute_and_overwrite() {
        let guard = CacheGuard::new(MemoryStore::with_ttl(Duration::ZERO));
        let k = key("k");
        let calls = Cell::new(0u32);
        let run = || {
            guard
                .execute(&k, || {
                    calls.set(calls.get() + 1);
                    Ok::<_, DivideByZero>(Some(calls.get()))
                })
                .unwrap()
        };

        assert_eq!(run(), Some(1));
        // Entry is instantly expired, so every call recomputes.
        assert_eq!(run(), Some(2));
        assert_eq!(calls.get(), 2);
        assert_eq!(guard.store().len(), 1);
    }

    /// Store that mangles every write, standing in for a concurrent
    /// overwrite landing between the guard's put and its return.
    struct ManglingStore(MemoryStore<String>);

    impl CacheStore<String> for ManglingStore {
        fn get(&self, key: &CallKey) -> Result<Option<Lookup<String>>, StoreError> {
            self.0.get(key)
        }

        fn put(&self, key: &CallKey, _value: CachedValue<String>) -> Result<(), StoreError> {
            self.0
                .put(key, CachedValue::Present("mangled".to_owned()))
        }
    }

    #[test]
    fn miss_returns_freshly_computed_value_not_store_contents() {
        let guard = CacheGuard::new(ManglingStore(MemoryStore::new()));
        let k = key("k");

        let value = guard
            .execute(&k, || Ok::<_, DivideByZero>(Some("fresh".to_owned())))
            .unwrap();
        assert_eq!(value.as_deref(), Some("fresh"));
    }

    /// Store whose every operation fails.
    struct BrokenStore;

    impl CacheStore<u32> for BrokenStore {
        fn get(&self, _key: &CallKey) -> Result<Option<Lookup<u32>>, StoreError> {
            Err(StoreError::Unavailable {
                reason: "down".to_owned(),
            })
        }

        fn put(&self, _key: &CallKey, _value: CachedValue<u32>) -> Result<(), StoreError> {
            Err(StoreError::Unavailable {
                reason: "down".to_owned(),
            })
        }
    }

    #[test]
    fn fail_closed_surfaces_store_errors_before_computing() {
        let guard = CacheGuard::new(BrokenStore);
        let calls = Cell::new(0u32);

        let err = guard
            .execute(&key("k"), || {
                calls.set(calls.get() + 1);
                Ok::<_, DivideByZero>(Some(1))
            })
            .unwrap_err();
        assert!(matches!(err, CacheError::Store(_)));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn fail_open_computes_through_a_broken_store() {
        let guard = CacheGuard::with_policy(BrokenStore, StoreFailurePolicy::FailOpen);
        let calls = Cell::new(0u32);

        let value = guard
            .execute(&key("k"), || {
                calls.set(calls.get() + 1);
                Ok::<_, DivideByZero>(Some(7))
            })
            .unwrap();
        assert_eq!(value, Some(7));
        assert_eq!(calls.get(), 1);
    }
}
