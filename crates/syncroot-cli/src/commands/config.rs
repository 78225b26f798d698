//! Config command - View and manage syncroot configuration
//!
//! Provides the `syncroot config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Sets individual configuration values via dot-notation keys
//! 3. Validates the configuration file and reports errors

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use syncroot_core::config::Config;
use tracing::info;

use crate::output::OutputFormat;

/// Keys accepted by `config set`, with a short description
const SUPPORTED_KEYS: &[(&str, &str)] = &[
    ("transfer.pipe_capacity_chunks", "Relay pipe capacity in chunks"),
    ("transfer.chunk_size_kb", "Relay chunk size (KiB)"),
    ("hydration.max_concurrent", "Parallel hydration demands"),
    ("mapping.max_on_demand_roots", "On-demand root quota"),
    ("mapping.registry_file", "On-demand root registry file"),
    ("logging.level", "trace|debug|info|warn|error"),
    ("logging.json", "true|false"),
];

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "transfer.chunk_size_kb")
        key: String,
        /// New value
        value: String,
    },
    /// Validate the configuration file
    Validate,
}

impl ConfigCommand {
    /// Execute the config command against the file at `config_path`
    pub fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(format, config_path),
            ConfigCommand::Set { key, value } => execute_set(format, config_path, key, value),
            ConfigCommand::Validate => execute_validate(format, config_path),
        }
    }
}

fn execute_show(format: OutputFormat, config_path: &Path) -> Result<()> {
    let formatter = format.formatter();
    let config = Config::load_or_default(config_path);

    info!(config_path = %config_path.display(), "Showing configuration");

    if format.is_json() {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        formatter.success(&format!("Configuration ({})", config_path.display()));
        formatter.info("");
        let yaml =
            serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
    }
    Ok(())
}

fn execute_set(format: OutputFormat, config_path: &Path, key: &str, value: &str) -> Result<()> {
    let formatter = format.formatter();
    let mut config = Config::load_or_default(config_path);

    info!(key = %key, value = %value, "Setting configuration value");

    if let Err(e) = apply_config_value(&mut config, key, value) {
        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": false,
                "key": key,
                "error": e.to_string(),
            }));
        } else {
            formatter.error(&format!("Failed to set '{key}': {e}"));
            formatter.info("");
            formatter.info("Supported keys:");
            for (name, description) in SUPPORTED_KEYS {
                formatter.info(&format!("  {name:<32} - {description}"));
            }
        }
        anyhow::bail!("invalid configuration key or value");
    }

    let errors = config.validate();
    if !errors.is_empty() {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": false,
                "key": key,
                "errors": messages,
            }));
        } else {
            formatter.error(&format!("Invalid value for '{key}': {}", messages.join("; ")));
        }
        anyhow::bail!("configuration would be invalid");
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
    }
    let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
    std::fs::write(config_path, yaml).context("Failed to write configuration file")?;

    if format.is_json() {
        formatter.print_json(&serde_json::json!({
            "success": true,
            "key": key,
            "value": value,
            "config_path": config_path.display().to_string(),
        }));
    } else {
        formatter.success(&format!("Set {key} = {value}"));
        formatter.info(&format!("Saved to {}", config_path.display()));
    }
    Ok(())
}

fn execute_validate(format: OutputFormat, config_path: &Path) -> Result<()> {
    let formatter = format.formatter();

    if !config_path.exists() {
        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "valid": true,
                "config_path": config_path.display().to_string(),
                "errors": [],
                "defaults": true,
            }));
        } else {
            formatter.success("No configuration file; defaults are in effect");
            formatter.info(&format!("Expected at {}", config_path.display()));
        }
        return Ok(());
    }

    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": config_path.display().to_string(),
                    "errors": [format!("Failed to parse configuration: {e}")],
                }));
            } else {
                formatter.error(&format!("Failed to parse configuration: {e}"));
                formatter.info(&format!("File: {}", config_path.display()));
            }
            anyhow::bail!("configuration could not be parsed");
        }
    };

    info!(config_path = %config_path.display(), "Validating configuration");
    let errors = config.validate();

    if format.is_json() {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": config_path.display().to_string(),
            "errors": messages,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", config_path.display()));
    } else {
        formatter.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        ));
        formatter.info(&format!("File: {}", config_path.display()));
        for error in &errors {
            formatter.info(&format!("  {} - {}", error.field, error.message));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("configuration is invalid")
    }
}

/// Apply a dot-notation key/value pair to a Config struct
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "transfer.pipe_capacity_chunks" => {
            config.transfer.pipe_capacity_chunks =
                value.parse().context("Expected a positive integer")?;
        }
        "transfer.chunk_size_kb" => {
            config.transfer.chunk_size_kb = value.parse().context("Expected a positive integer")?;
        }
        "hydration.max_concurrent" => {
            config.hydration.max_concurrent =
                value.parse().context("Expected an integer between 1 and 32")?;
        }
        "mapping.max_on_demand_roots" => {
            config.mapping.max_on_demand_roots =
                value.parse().context("Expected a positive integer")?;
        }
        "mapping.registry_file" => {
            config.mapping.registry_file = PathBuf::from(value);
        }
        "logging.level" => {
            config.logging.level = value.to_string();
        }
        "logging.json" => {
            config.logging.json = value.parse().context("Expected true or false")?;
        }
        _ => anyhow::bail!("Unknown configuration key: {key}"),
    }
    Ok(())
}
