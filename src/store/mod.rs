//! Cache store boundary — the capability set the guard requires of a backend.
//!
//! The guard only ever asks a store two things: "what do you have at this
//! key?" ([`CacheStore::get`]) and "remember this at this key"
//! ([`CacheStore::put`]). Everything else a real cache engine does — eviction
//! policy, capacity limits, TTL bookkeeping, persistence, replication — stays
//! behind this trait and is the backend's business. The one piece of policy
//! the backend must report outward is whether a present entry has expired.
//!
//! [`MemoryStore`] is the in-process reference backend: a mutex-guarded map
//! with an optional per-store TTL. It is what the tests and demos use, and a
//! reasonable default for single-process callers; it is not an eviction
//! engine.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::key::CallKey;

/// Errors a store backend can surface from `get`/`put`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("cache store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored value could not be encoded or decoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A stored result, with "legitimately absent" as a first-class tagged
/// variant rather than a magic sentinel constant.
///
/// A computation can succeed and still produce no value (a lookup that found
/// nothing). Stores that cannot natively represent absence persist the tag;
/// the guard translates `Absent` back to `None` at the boundary, so the
/// variant itself never reaches callers.
///
/// # Examples
///
/// ```
/// use recache::store::CachedValue;
///
/// assert_eq!(CachedValue::wrap(Some(7)), CachedValue::Present(7));
/// assert_eq!(CachedValue::<i32>::wrap(None), CachedValue::Absent);
/// assert_eq!(CachedValue::Present(7).into_option(), Some(7));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum CachedValue<V> {
    /// The computation produced this value.
    Present(V),
    /// The computation succeeded but produced no value.
    Absent,
}

impl<V> CachedValue<V> {
    /// Wraps a computation result for storage.
    pub fn wrap(value: Option<V>) -> Self {
        match value {
            Some(v) => Self::Present(v),
            None => Self::Absent,
        }
    }

    /// Unwraps back to the caller-facing representation.
    pub fn into_option(self) -> Option<V> {
        match self {
            Self::Present(v) => Some(v),
            Self::Absent => None,
        }
    }
}

/// What a store reports for a present entry: the stored value and whether
/// the store considers it expired.
///
/// How expiry is decided (TTL arithmetic, clock source) is entirely the
/// store's; the guard only branches on the flag.
#[derive(Debug, Clone)]
pub struct Lookup<V> {
    pub value: CachedValue<V>,
    pub expired: bool,
}

/// The capability set the guard requires of a cache backend.
///
/// Implementations take `&self` and own their interior mutability; `get` and
/// `put` must each be individually safe for concurrent invocation when the
/// store is shared across threads. The guard never composes them atomically.
pub trait CacheStore<V> {
    /// Returns the entry at `key`, or `None` if the store holds nothing
    /// for it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend could not answer (connectivity,
    /// capacity, codec failure). The guard's failure policy decides whether
    /// that surfaces to the caller or degrades to a miss.
    fn get(&self, key: &CallKey) -> Result<Option<Lookup<V>>, StoreError>;

    /// Writes `value` at `key`, replacing any existing entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write could not be performed.
    fn put(&self, key: &CallKey, value: CachedValue<V>) -> Result<(), StoreError>;
}

struct MemoryEntry<V> {
    value: CachedValue<V>,
    inserted_at: Instant,
}

/// In-process reference store: a mutex-guarded map with an optional TTL.
///
/// With a TTL set, `get` reports entries older than the TTL as expired but
/// leaves them in place; the guard's overwrite on the ensuing miss refreshes
/// them. Without a TTL, entries never expire.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use recache::store::MemoryStore;
///
/// let forever: MemoryStore<String> = MemoryStore::new();
/// let short_lived: MemoryStore<String> = MemoryStore::with_ttl(Duration::from_secs(30));
/// # let _ = (forever, short_lived);
/// ```
pub struct MemoryStore<V> {
    entries: Mutex<HashMap<CallKey, MemoryEntry<V>>>,
    ttl: Option<Duration>,
}

impl<V> MemoryStore<V> {
    /// Creates a store whose entries never expire.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: None,
        }
    }

    /// Creates a store whose entries expire `ttl` after insertion.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Some(ttl),
        }
    }

    /// Returns the number of entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    /// Returns `true` if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> CacheStore<V> for MemoryStore<V> {
    fn get(&self, key: &CallKey) -> Result<Option<Lookup<V>>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Unavailable {
            reason: "memory store lock poisoned".to_owned(),
        })?;
        Ok(entries.get(key).map(|entry| Lookup {
            value: entry.value.clone(),
            expired: self
                .ttl
                .is_some_and(|ttl| entry.inserted_at.elapsed() >= ttl),
        }))
    }

    fn put(&self, key: &CallKey, value: CachedValue<V>) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Unavailable {
            reason: "memory store lock poisoned".to_owned(),
        })?;
        entries.insert(
            *key,
            MemoryEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
        Ok(())
    }
}
