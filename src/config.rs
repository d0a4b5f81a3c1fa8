//! Reader configuration file support
//!
//! Handles parsing of `.input-mapping.toml` configuration files and
//! environment variable overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{InputMappingError, InputMappingResult};

/// Default configuration filename
pub const CONFIG_FILENAME: &str = ".input-mapping.toml";

/// Environment variable for the manifest format
pub const ENV_MANIFEST_FORMAT: &str = "INPUT_MAPPING_MANIFEST_FORMAT";

/// Environment variable for the export ceiling in bytes
pub const ENV_MAX_EXPORT_SIZE_BYTES: &str = "INPUT_MAPPING_MAX_EXPORT_SIZE_BYTES";

/// Environment variable for the default number of listed files
pub const ENV_DEFAULT_FILE_LIMIT: &str = "INPUT_MAPPING_DEFAULT_FILE_LIMIT";

/// Tables larger than this are refused for file-based staging (100 GB)
pub const DEFAULT_MAX_EXPORT_SIZE_BYTES: u64 = 100_000_000_000;

/// Files listed per mapping when the mapping has no `limit`
pub const DEFAULT_FILE_LIMIT: u32 = 100;

/// Manifest serialization format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestFormat {
    #[default]
    Json,
    Yaml,
}

impl ManifestFormat {
    /// Encode a manifest record
    pub fn encode<T: Serialize>(&self, value: &T) -> InputMappingResult<String> {
        match self {
            ManifestFormat::Json => Ok(serde_json::to_string_pretty(value)?),
            ManifestFormat::Yaml => Ok(serde_yaml::to_string(value)?),
        }
    }
}

impl std::str::FromStr for ManifestFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ManifestFormat::Json),
            "yaml" | "yml" => Ok(ManifestFormat::Yaml),
            _ => Err(format!(
                "Unknown manifest format: {}. Use 'json' or 'yaml'.",
                s
            )),
        }
    }
}

impl std::fmt::Display for ManifestFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestFormat::Json => write!(f, "json"),
            ManifestFormat::Yaml => write!(f, "yaml"),
        }
    }
}

/// Staging configuration section
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StagingSection {
    /// Format of the manifests written next to staged data
    #[serde(default)]
    pub manifest_format: ManifestFormat,
}

/// Limits configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsSection {
    /// Export ceiling used when the project reports none
    #[serde(default = "default_max_export_size_bytes")]
    pub max_export_size_bytes: u64,

    /// Files listed per mapping when the mapping has no `limit`
    #[serde(default = "default_file_limit")]
    pub default_file_limit: u32,
}

fn default_max_export_size_bytes() -> u64 {
    DEFAULT_MAX_EXPORT_SIZE_BYTES
}

fn default_file_limit() -> u32 {
    DEFAULT_FILE_LIMIT
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_export_size_bytes: default_max_export_size_bytes(),
            default_file_limit: default_file_limit(),
        }
    }
}

/// Main configuration structure
///
/// Represents the `.input-mapping.toml` configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReaderConfig {
    #[serde(default)]
    pub staging: StagingSection,

    #[serde(default)]
    pub limits: LimitsSection,
}

impl ReaderConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration writing manifests in the given format
    pub fn with_format(format: ManifestFormat) -> Self {
        Self {
            staging: StagingSection {
                manifest_format: format,
            },
            ..Default::default()
        }
    }

    /// Load configuration from a directory
    ///
    /// Looks for `.input-mapping.toml` in the directory.
    /// Falls back to defaults if not found.
    pub fn load(dir: &Path) -> InputMappingResult<Self> {
        let config_path = dir.join(CONFIG_FILENAME);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::parse(&content)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> InputMappingResult<Self> {
        toml::from_str(content).map_err(|e| {
            InputMappingError::configuration(format!("Failed to parse config: {}", e))
        })
    }

    /// Convert configuration to TOML string
    pub fn to_toml(&self) -> InputMappingResult<String> {
        toml::to_string_pretty(self).map_err(|e| {
            InputMappingError::Serialization(format!("Failed to serialize config: {}", e))
        })
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(format) = std::env::var(ENV_MANIFEST_FORMAT)
            && let Ok(format) = format.parse()
        {
            self.staging.manifest_format = format;
        }

        if let Ok(limit) = std::env::var(ENV_MAX_EXPORT_SIZE_BYTES)
            && let Ok(limit) = limit.parse()
        {
            self.limits.max_export_size_bytes = limit;
        }

        if let Ok(limit) = std::env::var(ENV_DEFAULT_FILE_LIMIT)
            && let Ok(limit) = limit.parse()
        {
            self.limits.default_file_limit = limit;
        }
    }

    pub fn manifest_format(&self) -> ManifestFormat {
        self.staging.manifest_format
    }
}
