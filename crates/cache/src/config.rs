//! Cache configuration for tier capacities and disk storage.
//!
//! Configuration can be loaded from a JSON file, environment variables,
//! or created programmatically. Keys missing from a file keep their defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Namespace version baked into every persisted key.
///
/// Bump it when a release changes rendering quality so stale blobs are
/// orphaned instead of served.
pub const DEFAULT_NAMESPACE: &str = "pageflow-v1";

/// Configuration for the page cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum pages held in the display tier
    pub display_capacity: usize,
    /// Maximum pages held in the warm tier
    pub warm_capacity: usize,
    /// Disk cache budget in megabytes
    pub disk_cache_mb: usize,
    /// Directory for persisted page blobs
    pub disk_cache_dir: PathBuf,
    /// Namespace version prefix of persisted keys
    pub namespace: String,
    /// Persist warm pages on a writer thread instead of inline
    pub background_writes: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            display_capacity: 24,
            warm_capacity: 96,
            disk_cache_mb: 256,
            disk_cache_dir: Self::default_cache_dir(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            background_writes: true,
        }
    }
}

impl CacheConfig {
    /// Sets the display tier capacity.
    pub fn with_display_capacity(mut self, pages: usize) -> Self {
        self.display_capacity = pages;
        self
    }

    /// Sets the warm tier capacity.
    pub fn with_warm_capacity(mut self, pages: usize) -> Self {
        self.warm_capacity = pages;
        self
    }

    /// Sets the disk cache budget in megabytes.
    pub fn with_disk_mb(mut self, mb: usize) -> Self {
        self.disk_cache_mb = mb;
        self
    }

    /// Sets the disk cache directory.
    pub fn with_disk_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.disk_cache_dir = path.as_ref().to_path_buf();
        self
    }

    /// Sets the namespace version.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Enables or disables the background writer thread.
    pub fn with_background_writes(mut self, enabled: bool) -> Self {
        self.background_writes = enabled;
        self
    }

    /// Disk budget in bytes.
    pub fn disk_cache_bytes(&self) -> usize {
        self.disk_cache_mb.saturating_mul(1024 * 1024)
    }

    /// Returns the default cache directory for the current platform.
    ///
    /// - macOS: ~/Library/Caches/pageflow/pages
    /// - Linux: ~/.cache/pageflow/pages
    /// - Windows: %LOCALAPPDATA%\pageflow\pages
    pub fn default_cache_dir() -> PathBuf {
        if let Some(cache_dir) = dirs::cache_dir() {
            cache_dir.join("pageflow").join("pages")
        } else {
            PathBuf::from("cache/pages")
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PAGEFLOW_DISPLAY_CACHE_ENTRIES`: display tier capacity (default: 24)
    /// - `PAGEFLOW_WARM_CACHE_ENTRIES`: warm tier capacity (default: 96)
    /// - `PAGEFLOW_DISK_CACHE_MB`: disk budget in MB (default: 256)
    /// - `PAGEFLOW_CACHE_DIR`: disk cache directory path
    /// - `PAGEFLOW_CACHE_NAMESPACE`: namespace version prefix
    ///
    /// # Errors
    /// Returns an error if any numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Overlays environment variables onto an existing configuration.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = env_usize("PAGEFLOW_DISPLAY_CACHE_ENTRIES")? {
            self.display_capacity = value;
        }
        if let Some(value) = env_usize("PAGEFLOW_WARM_CACHE_ENTRIES")? {
            self.warm_capacity = value;
        }
        if let Some(value) = env_usize("PAGEFLOW_DISK_CACHE_MB")? {
            self.disk_cache_mb = value;
        }
        if let Ok(value) = std::env::var("PAGEFLOW_CACHE_DIR") {
            self.disk_cache_dir = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var("PAGEFLOW_CACHE_NAMESPACE") {
            if !value.trim().is_empty() {
                self.namespace = value.trim().to_string();
            }
        }
        Ok(())
    }

    /// Loads configuration from a JSON file.
    ///
    /// ```json
    /// { "display_capacity": 24, "disk_cache_mb": 512, "namespace": "pageflow-v2" }
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Saves configuration to a JSON file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        Ok(())
    }
}

/// Reads a numeric environment variable, `None` when unset.
pub fn env_usize(name: &str) -> Result<Option<usize>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(None),
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: [&str; 5] = [
        "PAGEFLOW_DISPLAY_CACHE_ENTRIES",
        "PAGEFLOW_WARM_CACHE_ENTRIES",
        "PAGEFLOW_DISK_CACHE_MB",
        "PAGEFLOW_CACHE_DIR",
        "PAGEFLOW_CACHE_NAMESPACE",
    ];

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.display_capacity, 24);
        assert_eq!(config.warm_capacity, 96);
        assert_eq!(config.disk_cache_bytes(), 256 * 1024 * 1024);
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    fn huge_disk_budget_saturates() {
        let config = CacheConfig::default().with_disk_mb(usize::MAX);
        assert_eq!(config.disk_cache_bytes(), usize::MAX);
    }

    #[test]
    fn test_builder_methods() {
        let config = CacheConfig::default()
            .with_display_capacity(6)
            .with_warm_capacity(12)
            .with_disk_mb(64)
            .with_disk_dir("/custom/path")
            .with_namespace("pageflow-v9")
            .with_background_writes(false);

        assert_eq!(config.display_capacity, 6);
        assert_eq!(config.warm_capacity, 12);
        assert_eq!(config.disk_cache_mb, 64);
        assert_eq!(config.disk_cache_dir, PathBuf::from("/custom/path"));
        assert_eq!(config.namespace, "pageflow-v9");
        assert!(!config.background_writes);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        let _guard = EnvGuard::new(&VARS);

        env::set_var("PAGEFLOW_DISPLAY_CACHE_ENTRIES", "10");
        env::set_var("PAGEFLOW_WARM_CACHE_ENTRIES", "40");
        env::set_var("PAGEFLOW_DISK_CACHE_MB", "32");
        env::set_var("PAGEFLOW_CACHE_DIR", "/tmp/pageflow-test");
        env::set_var("PAGEFLOW_CACHE_NAMESPACE", "pageflow-v2");

        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.display_capacity, 10);
        assert_eq!(config.warm_capacity, 40);
        assert_eq!(config.disk_cache_mb, 32);
        assert_eq!(config.disk_cache_dir, PathBuf::from("/tmp/pageflow-test"));
        assert_eq!(config.namespace, "pageflow-v2");
    }

    #[test]
    #[serial]
    fn test_from_env_partial() {
        let _guard = EnvGuard::new(&VARS);
        for name in VARS {
            env::remove_var(name);
        }
        env::set_var("PAGEFLOW_WARM_CACHE_ENTRIES", "50");

        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.warm_capacity, 50);
        assert_eq!(config.display_capacity, 24);
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    #[serial]
    fn test_from_env_invalid() {
        let _guard = EnvGuard::new(&["PAGEFLOW_DISK_CACHE_MB"]);

        env::set_var("PAGEFLOW_DISK_CACHE_MB", "lots");
        let result = CacheConfig::from_env();
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    // Saves and restores environment variables
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(var_names: &[&str]) -> Self {
            let vars = var_names
                .iter()
                .map(|name| (name.to_string(), env::var(name).ok()))
                .collect();
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn test_file_save_and_load() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("cache.json");

        let config = CacheConfig::default().with_disk_mb(12).with_disk_dir("/tmp/pages");
        config.save_to_file(&path).unwrap();

        let loaded = CacheConfig::from_file(&path).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("cache.json");
        fs::write(&path, r#"{ "warm_capacity": 10 }"#).unwrap();

        let loaded = CacheConfig::from_file(&path).unwrap();
        assert_eq!(loaded.warm_capacity, 10);
        assert_eq!(loaded.display_capacity, 24);
    }

    #[test]
    fn test_malformed_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("cache.json");
        fs::write(&path, "warm_capacity = 10").unwrap();

        assert!(matches!(CacheConfig::from_file(&path), Err(ConfigError::Parse(_))));
    }
}
