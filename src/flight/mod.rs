//! Single-flight layer — opt-in de-duplication of concurrent misses.
//!
//! The base [`CacheGuard`] contract deliberately does not serialize
//! concurrent callers: two threads missing on the same key both compute and
//! both write, last write wins. That is correct but wasteful when the
//! computation is expensive and the same key is hot.
//!
//! [`SingleFlight`] layers at-most-once-concurrently semantics per key on
//! top of a guard: while one caller is computing a key, other callers for
//! that key block, then re-run the lookup and observe the first caller's
//! write as a hit. Callers for different keys never block each other.
//!
//! This is an explicit opt-in. Nothing in the rest of the crate assumes it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::guard::{CacheError, CacheGuard};
use crate::key::CallKey;
use crate::store::CacheStore;

/// Per-key in-flight locks for de-duplicating concurrent misses.
///
/// One `SingleFlight` should be shared by every caller that wants the
/// de-duplication; separate instances know nothing of each other's flights.
///
/// # Examples
///
/// ```
/// use recache::{CacheGuard, KeyDeriver, MemoryStore, SingleFlight};
///
/// let guard = CacheGuard::new(MemoryStore::new());
/// let flight = SingleFlight::new();
/// let key = KeyDeriver::new("rates.spot")?.arg(&"EUR")?.finish();
///
/// let rate = flight.execute(&guard, &key, || {
///     Ok::<_, std::io::Error>(Some(1.0843f64))
/// })?;
/// assert_eq!(rate, Some(1.0843));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct SingleFlight {
    in_flight: Mutex<HashMap<CallKey, Arc<Mutex<()>>>>,
}

impl SingleFlight {
    /// Creates a layer with no flights in progress.
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `guard.execute(key, compute)` while holding the key's in-flight
    /// lock.
    ///
    /// Concurrent callers for the same key serialize here; whichever enters
    /// second re-runs the guard's lookup after the first finishes and, if
    /// the first call succeeded, observes its write as a hit without
    /// computing. Error semantics are exactly those of
    /// [`CacheGuard::execute`]: a failed computation writes nothing, so a
    /// blocked caller proceeds as a fresh miss once unblocked.
    ///
    /// The per-key lock exists only while some caller is inside this method;
    /// it is removed again once the last holder leaves, so the map does not
    /// grow with the key space.
    ///
    /// # Errors
    ///
    /// Propagates [`CacheError`] from the underlying guard unchanged.
    pub fn execute<S, V, E, F>(
        &self,
        guard: &CacheGuard<S>,
        key: &CallKey,
        compute: F,
    ) -> Result<Option<V>, CacheError<E>>
    where
        S: CacheStore<V>,
        V: Clone,
        F: FnOnce() -> Result<Option<V>, E>,
    {
        let slot = {
            let mut flights = self
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                flights
                    .entry(*key)
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };

        let held = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let result = guard.execute(key, compute);
        drop(held);

        let mut flights = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Two strong references mean the map's and ours; nobody else is
        // waiting on this key, so the slot can go. Waiters clone under the
        // same map lock, so this count cannot be stale.
        if let Some(existing) = flights.get(key) {
            if Arc::strong_count(existing) <= 2 {
                flights.remove(key);
            }
        }

        result
    }
}

impl Default for SingleFlight {
    fn default() -> Self {
        Self::new()
    }
}
