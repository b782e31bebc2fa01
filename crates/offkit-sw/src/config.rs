//! Worker configuration.
//!
//! [`WorkerSettings`] is the serde-facing form supplied by the build pipeline.
//! [`WorkerConfig`] is the validated value built from it once at startup and
//! shared read-only by every handler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::generation::CacheGeneration;
use crate::{Result, ServiceWorkerError};

fn default_api_marker() -> String {
    "/api/".to_string()
}

fn default_shell_path() -> String {
    "./".to_string()
}

/// Raw worker settings, as injected at build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Release identifier.
    pub release: String,

    /// Origin the worker serves.
    pub origin: Url,

    /// Build timestamp. Defaults to the moment the config is built.
    #[serde(default)]
    pub built_at: Option<DateTime<Utc>>,

    /// Asset manifest entries, absolute or relative to the origin.
    #[serde(default)]
    pub assets: Vec<String>,

    /// Statically known icons and logos precached with the manifest.
    #[serde(default)]
    pub extra_assets: Vec<String>,

    /// Requests whose path contains this marker are never intercepted.
    #[serde(default = "default_api_marker")]
    pub api_marker: String,

    /// Application shell root, served to failed navigations.
    #[serde(default = "default_shell_path")]
    pub shell_path: String,
}

impl WorkerSettings {
    /// Settings with defaults for everything but release and origin.
    pub fn new(release: impl Into<String>, origin: Url) -> Self {
        Self {
            release: release.into(),
            origin,
            built_at: None,
            assets: Vec::new(),
            extra_assets: Vec::new(),
            api_marker: default_api_marker(),
            shell_path: default_shell_path(),
        }
    }

    pub fn built_at(mut self, built_at: DateTime<Utc>) -> Self {
        self.built_at = Some(built_at);
        self
    }

    pub fn assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assets = assets.into_iter().map(Into::into).collect();
        self
    }

    pub fn extra_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_assets = assets.into_iter().map(Into::into).collect();
        self
    }

    pub fn api_marker(mut self, marker: impl Into<String>) -> Self {
        self.api_marker = marker.into();
        self
    }

    /// Validate and freeze.
    pub fn build(self) -> Result<WorkerConfig> {
        WorkerConfig::from_settings(self)
    }
}

/// Ordered, immutable list of absolute URLs to precache.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssetManifest(Vec<Url>);

impl AssetManifest {
    /// Resolve entries against `origin`, dropping duplicates but keeping first-seen order.
    pub fn resolve<'a, I>(origin: &Url, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut urls: Vec<Url> = Vec::new();
        for entry in entries {
            let url = origin.join(entry).map_err(|e| {
                ServiceWorkerError::InvalidConfig(format!("asset '{entry}': {e}"))
            })?;
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
        Ok(Self(urls))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Url> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, url: &Url) -> bool {
        self.0.contains(url)
    }
}

/// Validated worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    release: String,
    origin: Url,
    built_at: DateTime<Utc>,
    generation: CacheGeneration,
    manifest: AssetManifest,
    shell_url: Url,
    api_marker: String,
}

impl WorkerConfig {
    /// Validate settings and compute the generation.
    pub fn from_settings(settings: WorkerSettings) -> Result<Self> {
        if settings.release.trim().is_empty() {
            return Err(ServiceWorkerError::InvalidConfig(
                "release must not be empty".to_string(),
            ));
        }
        if !matches!(settings.origin.scheme(), "http" | "https")
            || settings.origin.host_str().is_none()
        {
            return Err(ServiceWorkerError::InvalidConfig(format!(
                "origin must be an http(s) URL with a host, got {}",
                settings.origin
            )));
        }
        if settings.api_marker.is_empty() {
            return Err(ServiceWorkerError::InvalidConfig(
                "api_marker must not be empty".to_string(),
            ));
        }

        let origin = settings.origin;
        let shell_url = origin.join(&settings.shell_path).map_err(|e| {
            ServiceWorkerError::InvalidConfig(format!("shell_path '{}': {e}", settings.shell_path))
        })?;

        let entries = settings
            .assets
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(settings.shell_path.as_str()))
            .chain(settings.extra_assets.iter().map(String::as_str));
        let manifest = AssetManifest::resolve(&origin, entries)?;

        let built_at = settings.built_at.unwrap_or_else(Utc::now);
        let generation = CacheGeneration::new(&settings.release, built_at);

        Ok(Self {
            release: settings.release,
            origin,
            built_at,
            generation,
            manifest,
            shell_url,
            api_marker: settings.api_marker,
        })
    }

    /// Parse settings from JSON and validate them.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: WorkerSettings = serde_json::from_str(json)
            .map_err(|e| ServiceWorkerError::InvalidConfig(e.to_string()))?;
        Self::from_settings(settings)
    }

    pub fn release(&self) -> &str {
        &self.release
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// The generation this worker is bound to for its lifetime.
    pub fn generation(&self) -> &CacheGeneration {
        &self.generation
    }

    pub fn manifest(&self) -> &AssetManifest {
        &self.manifest
    }

    pub fn shell_url(&self) -> &Url {
        &self.shell_url
    }

    pub fn api_marker(&self) -> &str {
        &self.api_marker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn origin() -> Url {
        Url::parse("https://app.example.com/").unwrap()
    }

    #[test]
    fn test_manifest_resolves_relative_entries() {
        let config = WorkerSettings::new("5.2.3", origin())
            .assets(["bundle.js", "/style.css", "https://app.example.com/vendor.js"])
            .extra_assets(["/assets/logo--black.svg"])
            .build()
            .unwrap();

        let urls: Vec<&str> = config.manifest().iter().map(Url::as_str).collect();
        assert_eq!(
            urls,
            vec![
                "https://app.example.com/bundle.js",
                "https://app.example.com/style.css",
                "https://app.example.com/vendor.js",
                "https://app.example.com/",
                "https://app.example.com/assets/logo--black.svg",
            ]
        );
    }

    #[test]
    fn test_manifest_deduplicates() {
        let config = WorkerSettings::new("1", origin())
            .assets(["/", "./", "/a.js", "a.js"])
            .build()
            .unwrap();
        assert_eq!(config.manifest().len(), 2);
    }

    #[test]
    fn test_shell_url_is_origin_root() {
        let config = WorkerSettings::new("1", origin()).build().unwrap();
        assert_eq!(config.shell_url().as_str(), "https://app.example.com/");
        assert!(config.manifest().contains(config.shell_url()));
    }

    #[test]
    fn test_generation_uses_release_and_timestamp() {
        let built_at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let config = WorkerSettings::new("5.2.3", origin())
            .built_at(built_at)
            .build()
            .unwrap();
        assert_eq!(config.generation(), &CacheGeneration::new("5.2.3", built_at));
    }

    #[test]
    fn test_rejects_bad_origin() {
        let result = WorkerSettings::new("1", Url::parse("file:///tmp/app").unwrap()).build();
        assert!(matches!(result, Err(ServiceWorkerError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_empty_release() {
        let result = WorkerSettings::new("  ", origin()).build();
        assert!(matches!(result, Err(ServiceWorkerError::InvalidConfig(_))));
    }

    #[test]
    fn test_from_json_defaults() {
        let config = WorkerConfig::from_json(
            r#"{"release":"5.2.3","origin":"https://app.example.com/","assets":["bundle.js"]}"#,
        )
        .unwrap();
        assert_eq!(config.api_marker(), "/api/");
        assert_eq!(config.manifest().len(), 2);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(WorkerConfig::from_json("{not json").is_err());
    }
}
