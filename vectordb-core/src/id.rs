//! Monotonic-time + random-suffix id generation.
//!
//! Mirrors the `timestamp_randomsuffix` scheme used for backup ids
//! elsewhere in the workspace: a millisecond timestamp gives lexicographic
//! creation order without a global counter, and the random tail absorbs
//! same-millisecond collisions.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque, lexicographically-sortable identifier for a [`crate::types::VectorRecord`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct VectorId(String);

impl VectorId {
    /// Generate a new id: 13-digit zero-padded millisecond timestamp, a
    /// dash, and 8 hex digits of randomness.
    #[must_use]
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let random_suffix: String = (0..4)
            .map(|_| format!("{:02x}", rand::random::<u8>()))
            .collect();
        Self(format!("{millis:013}-{random_suffix}"))
    }

    /// Wrap an externally-supplied id string (e.g. from import).
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<VectorId> for String {
    fn from(id: VectorId) -> Self {
        id.0
    }
}

impl AsRef<str> for VectorId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
