//! Configuration
//!
//! File-backed contexts are described by a [`CacheConfig`], read from YAML and
//! then overridden from the environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `PERSISTCACHE_DIR` | `cache_dir` |
//! | `PERSISTCACHE_SETTINGS_FILE` | `settings_file` |
//! | `PERSISTCACHE_ATOMIC_WRITES` | `atomic_writes` |
//!
//! ```yaml
//! cache_dir: /var/cache/app
//! file_extension: cache
//! atomic_writes: true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adapters::DEFAULT_EXTENSION;
use crate::cache::validate_name;
use crate::error::{Error, Result};

pub const ENV_CACHE_DIR: &str = "PERSISTCACHE_DIR";
pub const ENV_SETTINGS_FILE: &str = "PERSISTCACHE_SETTINGS_FILE";
pub const ENV_ATOMIC_WRITES: &str = "PERSISTCACHE_ATOMIC_WRITES";

/// Name of the settings document inside the cache directory. Cache names
/// cannot start with a dot, so it never collides with a cache file.
pub const DEFAULT_SETTINGS_FILE: &str = ".settings.json";

/// Where and how cache files are stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding one file per cache
    pub cache_dir: PathBuf,
    /// Settings document; defaults to `.settings.json` in `cache_dir`
    pub settings_file: Option<PathBuf>,
    pub file_extension: String,
    /// Write through a temp file and rename into place
    pub atomic_writes: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("persistcache"),
            settings_file: None,
            file_extension: DEFAULT_EXTENSION.to_string(),
            atomic_writes: true,
        }
    }
}

impl CacheConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::Config(format!("invalid YAML: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("reading config {}", path.display()), e))?;
        debug!("Loaded cache config from {}", path.display());
        Self::from_yaml_str(&text)
    }

    /// Apply `PERSISTCACHE_*` environment variables on top of this config.
    pub fn apply_env_overrides(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(dir) = lookup(ENV_CACHE_DIR) {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(file) = lookup(ENV_SETTINGS_FILE) {
            self.settings_file = Some(PathBuf::from(file));
        }
        if let Some(flag) = lookup(ENV_ATOMIC_WRITES) {
            self.atomic_writes = parse_flag(&flag).ok_or_else(|| {
                Error::Config(format!("{} must be true or false, got '{}'", ENV_ATOMIC_WRITES, flag))
            })?;
        }
        Ok(self)
    }

    /// Reject a settings document that a cache file could overwrite.
    pub fn validate(&self) -> Result<()> {
        let settings = self.settings_path();
        if settings.parent() != Some(self.cache_dir.as_path()) {
            return Ok(());
        }
        let Some(file_name) = settings.file_name().and_then(|name| name.to_str()) else {
            return Ok(());
        };

        let suffix = format!(".{}", self.file_extension);
        let temp_suffix = format!("{}.tmp", suffix);
        let shadowing = file_name
            .strip_suffix(suffix.as_str())
            .or_else(|| file_name.strip_suffix(temp_suffix.as_str()))
            .filter(|name| validate_name(name).is_ok());

        match shadowing {
            Some(name) => Err(Error::Config(format!(
                "settings file {} is the cache file of '{}'",
                settings.display(),
                name
            ))),
            None => Ok(()),
        }
    }

    /// Resolved path of the settings document
    pub fn settings_path(&self) -> PathBuf {
        self.settings_file
            .clone()
            .unwrap_or_else(|| self.cache_dir.join(DEFAULT_SETTINGS_FILE))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Log output settings for [`crate::telemetry::init_logging`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.file_extension, "cache");
        assert!(config.atomic_writes);
        assert_eq!(config.settings_path(), config.cache_dir.join(".settings.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_settings_inside_cache_namespace_is_rejected() {
        let config = CacheConfig {
            cache_dir: PathBuf::from("/srv/caches"),
            settings_file: Some(PathBuf::from("/srv/caches/settings.cache")),
            ..CacheConfig::default()
        };
        assert_matches!(config.validate(), Err(Error::Config(_)));

        let temp = CacheConfig {
            settings_file: Some(PathBuf::from("/srv/caches/settings.cache.tmp")),
            ..config.clone()
        };
        assert_matches!(temp.validate(), Err(Error::Config(_)));

        // other extension, other directory, or the default dotfile
        for settings_file in [
            Some(PathBuf::from("/srv/caches/settings.json")),
            Some(PathBuf::from("/srv/settings.cache")),
            None,
        ] {
            let config = CacheConfig {
                settings_file,
                ..config.clone()
            };
            assert!(config.validate().is_ok(), "{:?}", config.settings_file);
        }
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = CacheConfig::from_yaml_str("cache_dir: /srv/caches\natomic_writes: false\n").unwrap();

        assert_eq!(config.cache_dir, PathBuf::from("/srv/caches"));
        assert!(!config.atomic_writes);
        assert_eq!(config.file_extension, "cache");
        assert_eq!(config.settings_path(), PathBuf::from("/srv/caches/.settings.json"));
    }

    #[test]
    fn test_invalid_yaml() {
        assert_matches!(
            CacheConfig::from_yaml_str("atomic_writes: [1, 2"),
            Err(Error::Config(_))
        );
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.yaml");
        std::fs::write(&path, "file_extension: jsonl\nsettings_file: /tmp/s.json\n").unwrap();

        let config = CacheConfig::from_file(&path).unwrap();
        assert_eq!(config.file_extension, "jsonl");
        assert_eq!(config.settings_path(), PathBuf::from("/tmp/s.json"));

        assert!(CacheConfig::from_file(dir.path().join("missing.yaml"))
            .unwrap_err()
            .is_io());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_CACHE_DIR, "/data/caches"),
            (ENV_ATOMIC_WRITES, "off"),
        ]
        .into_iter()
        .collect();

        let config = CacheConfig::default()
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/data/caches"));
        assert!(!config.atomic_writes);
        assert_eq!(config.settings_file, None);

        let bad = CacheConfig::default()
            .apply_overrides(|key| (key == ENV_ATOMIC_WRITES).then(|| "maybe".to_string()));
        assert_matches!(bad, Err(Error::Config(_)));
    }

    #[test]
    fn test_log_config_yaml() {
        let log: LogConfig = serde_yaml::from_str("json: true").unwrap();
        assert_eq!(log.level, "info");
        assert!(log.json);
    }
}
