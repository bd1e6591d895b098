//! Call key derivation — deterministic identifiers for a call's shape.
//!
//! A [`CallKey`] identifies one "call shape": the invoked operation plus the
//! ordered argument values it was invoked with. Two calls with the same
//! operation identifier and equal arguments derive equal keys; anything else
//! derives a different key (up to SHA-256 collision probability).
//!
//! Keys are built with [`KeyDeriver`], which canonically encodes each argument
//! with `serde_json` and folds it into a running SHA-256 digest. Each encoded
//! component is length-prefixed, so argument boundaries matter: `["ab"]` and
//! `["a", "b"]` never collide.

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors that can occur while deriving a [`CallKey`].
///
/// A failed derivation must fail the call — a key silently derived from a
/// partial encoding could collide with an unrelated call.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("operation identifier must not be empty")]
    EmptyOperation,

    #[error("argument {index} could not be encoded for key derivation")]
    Unserializable {
        /// Zero-based position of the offending argument.
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// An opaque, immutable identifier for one call shape.
///
/// Internally a 32-byte SHA-256 digest over the operation identifier and the
/// canonically encoded argument sequence. `CallKey` is `Copy`, hashable, and
/// equatable, so it works directly as a map key in store implementations.
///
/// # Examples
///
/// ```
/// use recache::key::KeyDeriver;
///
/// let a = KeyDeriver::new("users.find")?.arg(&42u64)?.finish();
/// let b = KeyDeriver::new("users.find")?.arg(&42u64)?.finish();
/// assert_eq!(a, b);
/// # Ok::<(), recache::key::KeyError>(())
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallKey([u8; 32]);

impl CallKey {
    /// Reconstructs a key from a raw 32-byte digest.
    ///
    /// Intended for store backends that persist keys as raw bytes and need to
    /// rebuild them on the way back out.
    pub fn from_digest(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the full 64-character lowercase hex rendering of the digest.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns the first 12 hex characters of the digest.
    ///
    /// Short enough for log lines, long enough to tell keys apart while
    /// debugging.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Debug for CallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CallKey").field(&self.short_hex()).finish()
    }
}

impl fmt::Display for CallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Builder that folds an operation identifier and its arguments into a
/// [`CallKey`].
///
/// The deriver performs no I/O and has no side effects. The same identifier
/// and argument sequence always produce the same key, within a process and
/// across processes, so derived keys are safe to persist in external stores.
///
/// # Examples
///
/// ```
/// use recache::key::KeyDeriver;
///
/// let key = KeyDeriver::new("reports.monthly")?
///     .arg(&2024u16)?
///     .arg(&"north")?
///     .finish();
/// println!("cache key: {key}");
/// # Ok::<(), recache::key::KeyError>(())
/// ```
#[derive(Debug)]
pub struct KeyDeriver {
    hasher: Sha256,
    // Number of arguments folded in so far; reported in error positions.
    args: usize,
}

impl KeyDeriver {
    /// Starts a derivation for the given operation identifier.
    ///
    /// The identifier should be a stable token for the invoked operation,
    /// e.g. a fully-qualified function or method name. Zero arguments is
    /// valid: calling [`finish`](Self::finish) immediately yields a key
    /// derived purely from the identifier.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::EmptyOperation`] if `op` is empty.
    pub fn new(op: &str) -> Result<Self, KeyError> {
        if op.is_empty() {
            return Err(KeyError::EmptyOperation);
        }
        let mut hasher = Sha256::new();
        hasher.update((op.len() as u64).to_be_bytes());
        hasher.update(op.as_bytes());
        Ok(Self { hasher, args: 0 })
    }

    /// Appends one argument value to the derivation.
    ///
    /// The value is encoded to canonical JSON and folded into the digest with
    /// a length prefix, making the key order-sensitive over arguments and
    /// immune to boundary shifts between adjacent arguments.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Unserializable`] if the value cannot be encoded
    /// (for example, a map with non-string keys). Callers must treat this as
    /// a failure of the whole call, not fall back to a partial key.
    pub fn arg<T>(mut self, value: &T) -> Result<Self, KeyError>
    where
        T: Serialize + ?Sized,
    {
        let encoded = serde_json::to_vec(value).map_err(|e| KeyError::Unserializable {
            index: self.args,
            source: e,
        })?;
        self.hasher.update((encoded.len() as u64).to_be_bytes());
        self.hasher.update(&encoded);
        self.args += 1;
        Ok(self)
    }

    /// Finalizes the derivation into a [`CallKey`].
    pub fn finish(self) -> CallKey {
        CallKey(self.hasher.finalize().into())
    }
}
