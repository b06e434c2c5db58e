//! The versioned export/import document, specification §6.3.

use super::config::VectorDbConfig;
use super::record::VectorRecord;
use serde::{Deserialize, Serialize};

/// Current envelope version this crate produces and accepts.
pub const CURRENT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportEnvelope {
    pub version: String,
    pub config: VectorDbConfig,
    pub vectors: Vec<VectorRecord>,
    /// Opaque `AnnIndex::serialize` output, empty string if omitted.
    #[serde(default)]
    pub index: String,
    pub metadata: ExportMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub exported_at: i64,
    pub vector_count: usize,
    pub dimensions: usize,
}

/// Parsed semantic version, just enough to compare major/minor per the
/// compatibility rule in §6.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl EnvelopeVersion {
    /// Parse a `MAJOR.MINOR.PATCH` string.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the string doesn't have exactly three numeric,
    /// dot-separated components.
    pub fn parse(s: &str) -> Result<Self, String> {
        let parts: Vec<&str> = s.split('.').collect();
        let [major, minor, patch] = parts.as_slice() else {
            return Err(format!("malformed version string: {s}"));
        };
        let parse_part = |p: &str| p.parse::<u32>().map_err(|_| format!("malformed version string: {s}"));
        Ok(Self {
            major: parse_part(major)?,
            minor: parse_part(minor)?,
            patch: parse_part(patch)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_semver() {
        let v = EnvelopeVersion::parse("1.2.3").unwrap();
        assert_eq!(v, EnvelopeVersion { major: 1, minor: 2, patch: 3 });
    }

    #[test]
    fn rejects_malformed_version() {
        assert!(EnvelopeVersion::parse("1.2").is_err());
        assert!(EnvelopeVersion::parse("a.b.c").is_err());
    }
}
