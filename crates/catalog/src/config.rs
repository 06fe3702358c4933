//! Catalog configuration via `catalog.toml`
//!
//! Every knob has a default, so an empty file (or no file at all) yields a
//! working catalog. Settings are read once when the catalog is opened and
//! never change afterwards.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use strata_core::{StrataError, StrataResult};
use strata_storage::arena::DEFAULT_STRING_CHUNK_BYTES;
use strata_storage::{ArenaLimits, DEFAULT_BURST_THRESHOLD, DEFAULT_RANGE_PAGE_SIZE};

/// Config file name
pub const CONFIG_FILE_NAME: &str = "catalog.toml";

/// Smallest accepted string arena chunk
pub const MIN_STRING_CHUNK_BYTES: usize = 256;

/// `[storage]` section
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// Entries a trie node holds before it bursts into a flat map
    #[serde(default = "default_burst_threshold")]
    pub burst_threshold: usize,
    /// Entries fetched per page by listings
    #[serde(default = "default_range_page_size")]
    pub range_page_size: usize,
}

fn default_burst_threshold() -> usize {
    DEFAULT_BURST_THRESHOLD
}

fn default_range_page_size() -> usize {
    DEFAULT_RANGE_PAGE_SIZE
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            burst_threshold: default_burst_threshold(),
            range_page_size: default_range_page_size(),
        }
    }
}

/// `[arena]` section
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Chunk size of the shared string arena
    #[serde(default = "default_string_chunk_bytes")]
    pub string_chunk_bytes: usize,
    /// Hard limit on stored key bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_string_bytes: Option<usize>,
    /// Hard limit on live entries per store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_objects: Option<usize>,
}

fn default_string_chunk_bytes() -> usize {
    DEFAULT_STRING_CHUNK_BYTES
}

impl Default for ArenaConfig {
    fn default() -> Self {
        ArenaConfig {
            string_chunk_bytes: default_string_chunk_bytes(),
            max_string_bytes: None,
            max_objects: None,
        }
    }
}

/// `[gc]` section
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GcConfig {
    /// Run the background collector
    #[serde(default = "default_gc_enabled")]
    pub enabled: bool,
    /// Pause between collection passes
    #[serde(default = "default_gc_interval_ms")]
    pub interval_ms: u64,
}

fn default_gc_enabled() -> bool {
    true
}

fn default_gc_interval_ms() -> u64 {
    1000
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            enabled: default_gc_enabled(),
            interval_ms: default_gc_interval_ms(),
        }
    }
}

/// Catalog configuration loaded from `catalog.toml`.
///
/// # Example
///
/// ```toml
/// [storage]
/// burst_threshold = 32
///
/// [gc]
/// enabled = false
/// ```
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Structure shape
    #[serde(default)]
    pub storage: StorageConfig,
    /// Allocator sizing and limits
    #[serde(default)]
    pub arena: ArenaConfig,
    /// Background garbage collection
    #[serde(default)]
    pub gc: GcConfig,
}

impl CatalogConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Strata catalog configuration

[storage]
# Entries a trie node holds before it bursts into a sorted index (>= 1)
burst_threshold = 32
# Entries fetched per page when listing (>= 1)
range_page_size = 64

[arena]
# Chunk size of the key arena in bytes (>= 256)
string_chunk_bytes = 65536
# Hard limit on key bytes; creates fail with ArenaExhausted beyond it
# max_string_bytes = 67108864
# Hard limit on live entries per store
# max_objects = 1000000

[gc]
# Prune versions no open transaction can see
enabled = true
# Milliseconds between passes (>= 1)
interval_ms = 1000
"#
    }

    /// Parse and validate config text.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::Config` if the text is not valid TOML or a
    /// value is out of range.
    pub fn from_toml_str(content: &str) -> StrataResult<Self> {
        let config: CatalogConfig = toml::from_str(content)
            .map_err(|e| StrataError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate config from a file path.
    pub fn from_file(path: &Path) -> StrataResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StrataError::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            StrataError::Config { message } => {
                StrataError::config(format!("{}: {}", path.display(), message))
            }
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> StrataResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                StrataError::config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> StrataResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| StrataError::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            StrataError::config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Check every value is in range
    pub fn validate(&self) -> StrataResult<()> {
        if self.storage.burst_threshold == 0 {
            return Err(StrataError::config("storage.burst_threshold must be >= 1"));
        }
        if self.storage.range_page_size == 0 {
            return Err(StrataError::config("storage.range_page_size must be >= 1"));
        }
        if self.arena.string_chunk_bytes < MIN_STRING_CHUNK_BYTES {
            return Err(StrataError::config(format!(
                "arena.string_chunk_bytes must be >= {}, got {}",
                MIN_STRING_CHUNK_BYTES, self.arena.string_chunk_bytes
            )));
        }
        if self.arena.max_objects == Some(0) {
            return Err(StrataError::config("arena.max_objects must be >= 1"));
        }
        if self.gc.interval_ms == 0 {
            return Err(StrataError::config("gc.interval_ms must be >= 1"));
        }
        Ok(())
    }

    /// Allocator sizing for the stores
    pub fn arena_limits(&self) -> ArenaLimits {
        ArenaLimits {
            string_chunk_bytes: self.arena.string_chunk_bytes,
            max_string_bytes: self.arena.max_string_bytes,
            max_objects: self.arena.max_objects,
        }
    }

    /// Pause between collector passes
    pub fn gc_interval(&self) -> Duration {
        Duration::from_millis(self.gc.interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_toml_parses_to_default() {
        let config = CatalogConfig::from_toml_str(CatalogConfig::default_toml()).unwrap();
        assert_eq!(config, CatalogConfig::default());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = CatalogConfig::from_toml_str("").unwrap();
        assert_eq!(config.storage.burst_threshold, 32);
        assert_eq!(config.storage.range_page_size, 64);
        assert!(config.gc.enabled);
        assert_eq!(config.gc_interval(), Duration::from_secs(1));
    }

    #[test]
    fn partial_sections() {
        let config = CatalogConfig::from_toml_str(
            "[arena]\nmax_objects = 10\n\n[gc]\nenabled = false\n",
        )
        .unwrap();
        assert_eq!(config.arena.max_objects, Some(10));
        assert_eq!(config.arena.string_chunk_bytes, DEFAULT_STRING_CHUNK_BYTES);
        assert!(!config.gc.enabled);
        assert_eq!(config.arena_limits().max_objects, Some(10));
    }

    #[test]
    fn out_of_range_values_rejected() {
        for text in [
            "[storage]\nburst_threshold = 0\n",
            "[storage]\nrange_page_size = 0\n",
            "[arena]\nstring_chunk_bytes = 16\n",
            "[gc]\ninterval_ms = 0\n",
        ] {
            let err = CatalogConfig::from_toml_str(text).unwrap_err();
            assert_eq!(err.error_code(), "Config", "{}", text);
        }
    }

    #[test]
    fn malformed_toml_rejected() {
        let err = CatalogConfig::from_toml_str("[storage\n").unwrap_err();
        assert!(matches!(err, StrataError::Config { .. }));
    }

    #[test]
    fn write_default_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        assert!(!path.exists());

        CatalogConfig::write_default_if_missing(&path).unwrap();
        assert!(path.exists());
        assert_eq!(
            CatalogConfig::from_file(&path).unwrap(),
            CatalogConfig::default()
        );
    }

    #[test]
    fn write_default_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[gc]\nenabled = false\n").unwrap();

        CatalogConfig::write_default_if_missing(&path).unwrap();
        assert!(!CatalogConfig::from_file(&path).unwrap().gc.enabled);
    }

    #[test]
    fn write_to_file_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut config = CatalogConfig::default();
        config.storage.burst_threshold = 8;
        config.arena.max_string_bytes = Some(1 << 20);

        config.write_to_file(&path).unwrap();
        assert_eq!(CatalogConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = CatalogConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, StrataError::Config { .. }));
    }
}
