//! Configuration for schema caches, resource discovery and payload encoding
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (filter.toml)
//! - Environment variables (PROTO_FILTER__*)
//!
//! ## Example config file (filter.toml):
//! ```toml
//! [cache]
//! schema_capacity = 1024
//! payload_capacity = 1024
//! time_to_idle_secs = 3600
//!
//! [discovery]
//! roots = ["./descriptors"]
//! pattern = '^\w+\.desc$'
//!
//! [codec]
//! compression_level = 6
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::compress::DEFAULT_LEVEL;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Cache sizing
    #[serde(default)]
    pub cache: CacheConfig,

    /// Where descriptor resources are found
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Payload encoding
    #[serde(default)]
    pub codec: CodecConfig,
}

/// Bounds shared by every schema and payload cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Max reconstructed schemas held per cache
    #[serde(default = "default_capacity")]
    pub schema_capacity: u64,

    /// Max encoded payloads held by a registry
    #[serde(default = "default_capacity")]
    pub payload_capacity: u64,

    /// Evict entries not touched for this long; unset keeps them until
    /// capacity pressure
    #[serde(default)]
    pub time_to_idle_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Directories scanned for descriptor resources
    #[serde(default = "default_roots")]
    pub roots: Vec<PathBuf>,

    /// File name pattern of descriptor resources
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecConfig {
    /// gzip level, 0-9
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
}

fn default_capacity() -> u64 {
    1024
}

fn default_roots() -> Vec<PathBuf> {
    vec![PathBuf::from(".")]
}

fn default_pattern() -> String {
    r"^\w+\.desc$".to_string()
}

fn default_compression_level() -> u32 {
    DEFAULT_LEVEL
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            schema_capacity: default_capacity(),
            payload_capacity: default_capacity(),
            time_to_idle_secs: None,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            pattern: default_pattern(),
        }
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            compression_level: default_compression_level(),
        }
    }
}

impl CacheConfig {
    pub fn time_to_idle(&self) -> Option<Duration> {
        self.time_to_idle_secs.map(Duration::from_secs)
    }
}

impl FilterConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering a specific file over the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["filter.toml", ".filter.toml", "config/filter.toml"];
        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "proto-filter", "proto-filter") {
            let xdg_config = config_dir.config_dir().join("filter.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // PROTO_FILTER__CACHE__SCHEMA_CAPACITY=64
        builder = builder.add_source(
            Environment::with_prefix("PROTO_FILTER")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}
