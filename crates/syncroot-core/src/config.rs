//! Configuration module for syncroot.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for syncroot.
///
/// Missing sections fall back to their defaults, so a YAML file only needs
/// the values it overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transfer: TransferConfig,
    pub hydration: HydrationConfig,
    pub mapping: MappingConfig,
    pub logging: LoggingConfig,
}

/// Revision transfer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Capacity of the relay pipe, in chunks.
    pub pipe_capacity_chunks: u32,
    /// Size of a single relay chunk (in KiB).
    pub chunk_size_kb: u32,
}

/// Placeholder hydration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HydrationConfig {
    /// Number of hydration demands served in parallel.
    pub max_concurrent: u8,
}

/// Synchronized root settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Maximum number of on-demand sync roots the local registry accepts.
    pub max_on_demand_roots: u32,
    /// File backing the local on-demand sync root registry.
    pub registry_file: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl TransferConfig {
    /// Chunk size in bytes.
    pub fn chunk_size_bytes(&self) -> usize {
        self.chunk_size_kb as usize * 1024
    }
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/syncroot/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("syncroot")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Section defaults
// ---------------------------------------------------------------------------

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            pipe_capacity_chunks: 16,
            chunk_size_kb: 64,
        }
    }
}

impl Default for HydrationConfig {
    fn default() -> Self {
        Self { max_concurrent: 8 }
    }
}

impl Default for MappingConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("syncroot");
        Self {
            max_on_demand_roots: 8,
            registry_file: data_dir.join("sync_roots.json"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"transfer.chunk_size_kb"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Upper bound for `transfer.chunk_size_kb` (16 MiB).
const MAX_CHUNK_SIZE_KB: u32 = 16 * 1024;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- transfer ---
        if self.transfer.pipe_capacity_chunks == 0 || self.transfer.pipe_capacity_chunks > 1024 {
            errors.push(ValidationError {
                field: "transfer.pipe_capacity_chunks".into(),
                message: "must be in range 1..=1024".into(),
            });
        }
        if self.transfer.chunk_size_kb == 0 {
            errors.push(ValidationError {
                field: "transfer.chunk_size_kb".into(),
                message: "must be greater than 0".into(),
            });
        } else if self.transfer.chunk_size_kb > MAX_CHUNK_SIZE_KB {
            errors.push(ValidationError {
                field: "transfer.chunk_size_kb".into(),
                message: format!("must not exceed {MAX_CHUNK_SIZE_KB}"),
            });
        }

        // --- hydration ---
        if self.hydration.max_concurrent == 0 || self.hydration.max_concurrent > 32 {
            errors.push(ValidationError {
                field: "hydration.max_concurrent".into(),
                message: "must be in range 1..=32".into(),
            });
        }

        // --- mapping ---
        if self.mapping.max_on_demand_roots == 0 {
            errors.push(ValidationError {
                field: "mapping.max_on_demand_roots".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.mapping.registry_file.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "mapping.registry_file".into(),
                message: "must not be empty".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use syncroot_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .transfer_pipe_capacity_chunks(32)
///     .hydration_max_concurrent(4)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder pre-populated with default values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // -- transfer --

    pub fn transfer_pipe_capacity_chunks(mut self, n: u32) -> Self {
        self.config.transfer.pipe_capacity_chunks = n;
        self
    }

    pub fn transfer_chunk_size_kb(mut self, kb: u32) -> Self {
        self.config.transfer.chunk_size_kb = kb;
        self
    }

    // -- hydration --

    pub fn hydration_max_concurrent(mut self, n: u8) -> Self {
        self.config.hydration.max_concurrent = n;
        self
    }

    // -- mapping --

    pub fn mapping_max_on_demand_roots(mut self, n: u32) -> Self {
        self.config.mapping.max_on_demand_roots = n;
        self
    }

    pub fn mapping_registry_file(mut self, file: PathBuf) -> Self {
        self.config.mapping.registry_file = file;
        self
    }

    // -- logging --

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    /// Consume the builder and return the [`Config`] without validation.
    pub fn build(self) -> Config {
        self.config
    }

    /// Consume the builder, validate, and return the [`Config`] or the
    /// list of validation errors.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let errors = self.config.validate();
        if errors.is_empty() {
            Ok(self.config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    // -- Defaults --

    #[test]
    fn default_config_has_sensible_values() {
        let cfg = Config::default();
        assert_eq!(cfg.transfer.pipe_capacity_chunks, 16);
        assert_eq!(cfg.transfer.chunk_size_kb, 64);
        assert_eq!(cfg.transfer.chunk_size_bytes(), 64 * 1024);
        assert_eq!(cfg.hydration.max_concurrent, 8);
        assert_eq!(cfg.mapping.max_on_demand_roots, 8);
        assert!(cfg.mapping.registry_file.ends_with("syncroot/sync_roots.json"));
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.logging.json);
    }

    #[test]
    fn default_config_passes_validation() {
        let errors = Config::default().validate();
        assert!(errors.is_empty(), "unexpected validation errors: {errors:?}");
    }

    // -- Loading --

    #[test]
    fn load_from_yaml_file() {
        let yaml = r#"
transfer:
  pipe_capacity_chunks: 4
  chunk_size_kb: 128
hydration:
  max_concurrent: 2
mapping:
  max_on_demand_roots: 3
  registry_file: /tmp/roots.json
logging:
  level: debug
  json: true
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.transfer.pipe_capacity_chunks, 4);
        assert_eq!(cfg.transfer.chunk_size_kb, 128);
        assert_eq!(cfg.hydration.max_concurrent, 2);
        assert_eq!(cfg.mapping.max_on_demand_roots, 3);
        assert_eq!(cfg.mapping.registry_file, PathBuf::from("/tmp/roots.json"));
        assert_eq!(cfg.logging.level, "debug");
        assert!(cfg.logging.json);
    }

    #[test]
    fn partial_yaml_uses_section_defaults() {
        let yaml = "hydration:\n  max_concurrent: 3\n";
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load partial config");
        assert_eq!(cfg.hydration.max_concurrent, 3);
        assert_eq!(cfg.transfer.pipe_capacity_chunks, 16);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn load_or_default_returns_default_on_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/config.yaml"));
        assert_eq!(cfg.hydration.max_concurrent, 8);
    }

    #[test]
    fn load_returns_error_on_invalid_yaml() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"not: [valid: yaml: {{{").unwrap();
        tmp.flush().unwrap();

        let result = Config::load(tmp.path());
        assert!(result.is_err());
    }

    // -- Validation --

    #[test]
    fn validate_catches_pipe_capacity_out_of_range() {
        let mut cfg = Config::default();
        cfg.transfer.pipe_capacity_chunks = 0;
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "transfer.pipe_capacity_chunks"));

        cfg.transfer.pipe_capacity_chunks = 2048;
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "transfer.pipe_capacity_chunks"));
    }

    #[test]
    fn validate_catches_chunk_size_bounds() {
        let mut cfg = Config::default();
        cfg.transfer.chunk_size_kb = 0;
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "transfer.chunk_size_kb" && e.message.contains("greater")));

        cfg.transfer.chunk_size_kb = MAX_CHUNK_SIZE_KB + 1;
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "transfer.chunk_size_kb" && e.message.contains("must not exceed")));
    }

    #[test]
    fn validate_catches_invalid_hydration_concurrency() {
        let mut cfg = Config::default();
        cfg.hydration.max_concurrent = 0;
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "hydration.max_concurrent"));

        cfg.hydration.max_concurrent = 33;
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "hydration.max_concurrent"));
    }

    #[test]
    fn validate_catches_mapping_values() {
        let mut cfg = Config::default();
        cfg.mapping.max_on_demand_roots = 0;
        cfg.mapping.registry_file = PathBuf::new();
        let fields: Vec<String> = cfg.validate().into_iter().map(|e| e.field).collect();
        assert!(fields.contains(&"mapping.max_on_demand_roots".to_string()));
        assert!(fields.contains(&"mapping.registry_file".to_string()));
    }

    #[test]
    fn validate_catches_invalid_log_level() {
        let mut cfg = Config::default();
        cfg.logging.level = "verbose".to_string();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "logging.level"));
    }

    // -- Builder --

    #[test]
    fn builder_starts_from_defaults() {
        let cfg = ConfigBuilder::new().build();
        assert_eq!(cfg.transfer.pipe_capacity_chunks, 16);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn builder_overrides_fields() {
        let cfg = ConfigBuilder::new()
            .transfer_pipe_capacity_chunks(32)
            .transfer_chunk_size_kb(256)
            .hydration_max_concurrent(4)
            .mapping_max_on_demand_roots(2)
            .mapping_registry_file(PathBuf::from("/var/lib/syncroot/roots.json"))
            .logging_level("trace")
            .logging_json(true)
            .build();

        assert_eq!(cfg.transfer.pipe_capacity_chunks, 32);
        assert_eq!(cfg.transfer.chunk_size_kb, 256);
        assert_eq!(cfg.hydration.max_concurrent, 4);
        assert_eq!(cfg.mapping.max_on_demand_roots, 2);
        assert_eq!(
            cfg.mapping.registry_file,
            PathBuf::from("/var/lib/syncroot/roots.json")
        );
        assert_eq!(cfg.logging.level, "trace");
        assert!(cfg.logging.json);
    }

    #[test]
    fn builder_build_validated_fails_for_invalid_config() {
        let result = ConfigBuilder::new()
            .hydration_max_concurrent(0)
            .logging_level("nope")
            .build_validated();
        let errors = result.unwrap_err();
        assert!(errors.len() >= 2);
    }

    #[test]
    fn builder_build_validated_succeeds_for_valid_config() {
        assert!(ConfigBuilder::new().build_validated().is_ok());
    }

    // -- default_path --

    #[test]
    fn default_path_ends_with_config_yaml() {
        let p = Config::default_path();
        assert!(p.ends_with("syncroot/config.yaml"));
    }

    // -- ValidationError Display --

    #[test]
    fn validation_error_display() {
        let err = ValidationError {
            field: "hydration.max_concurrent".into(),
            message: "must be in range 1..=32".into(),
        };
        assert_eq!(
            err.to_string(),
            "hydration.max_concurrent: must be in range 1..=32"
        );
    }
}
