//! Cache generations.
//!
//! A generation names the cache namespace owned by one deployment. It combines
//! the release identifier with the build timestamp, so a redeploy of
//! byte-identical assets still gets a fresh namespace.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of one deployment's cache store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheGeneration(String);

impl CacheGeneration {
    /// Compute the generation for a release built at `built_at`.
    ///
    /// The timestamp is rendered at full precision in a fixed UTC layout, so
    /// two builds that differ in either part never share a generation.
    pub fn new(release: &str, built_at: DateTime<Utc>) -> Self {
        Self(format!(
            "{}@{}",
            release,
            built_at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        ))
    }

    /// The namespace string handed to the cache storage.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exact namespace comparison. Prefixes and superstrings never match.
    pub fn matches(&self, namespace: &str) -> bool {
        self.0 == namespace
    }
}

impl fmt::Display for CacheGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheGeneration {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn built() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_generation_is_deterministic() {
        assert_eq!(
            CacheGeneration::new("5.2.3", built()),
            CacheGeneration::new("5.2.3", built())
        );
    }

    #[test]
    fn test_generation_differs_by_release() {
        assert_ne!(
            CacheGeneration::new("5.2.3", built()),
            CacheGeneration::new("5.2.4", built())
        );
    }

    #[test]
    fn test_generation_differs_by_timestamp() {
        let later = built() + Duration::milliseconds(1);
        assert_ne!(
            CacheGeneration::new("5.2.3", built()),
            CacheGeneration::new("5.2.3", later)
        );

        let sub_milli = built() + Duration::nanoseconds(500);
        assert_ne!(
            CacheGeneration::new("5.2.3", built()),
            CacheGeneration::new("5.2.3", sub_milli)
        );
    }

    #[test]
    fn test_generation_format() {
        let generation = CacheGeneration::new("5.2.3", built());
        assert_eq!(generation.as_str(), "5.2.3@2024-03-01T12:00:00Z");

        let millis = CacheGeneration::new("5.2.3", built() + Duration::milliseconds(250));
        assert_eq!(millis.as_str(), "5.2.3@2024-03-01T12:00:00.250Z");
    }

    #[test]
    fn test_matches_is_exact() {
        let generation = CacheGeneration::new("5.2.3", built());
        let name = generation.as_str().to_string();

        assert!(generation.matches(&name));
        assert!(!generation.matches(&format!("{name}-old")));
        assert!(!generation.matches(&name[..name.len() - 1]));
    }
}
