//! Root commands - Set up, remove and list synchronized roots
//!
//! Uses the local adapters: folder protection through permission bits and
//! the JSON registry configured under `mapping.registry_file`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use syncroot_core::config::Config;
use syncroot_core::domain::{
    MappingErrorCode, MappingId, MappingType, RemoteRoot, RemoteToLocalMapping,
};
use syncroot_mapping::{FileSyncRootRegistry, LocalFolderProtector, MappingManager};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::output::OutputFormat;

/// Kind of synchronized root
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RootKind {
    CloudFiles,
    HostDevice,
    ForeignDevice,
    Shared,
}

impl From<RootKind> for MappingType {
    fn from(kind: RootKind) -> Self {
        match kind {
            RootKind::CloudFiles => MappingType::CloudFiles,
            RootKind::HostDevice => MappingType::HostDeviceFolder,
            RootKind::ForeignDevice => MappingType::ForeignDevice,
            RootKind::Shared => MappingType::SharedWithMeItem,
        }
    }
}

/// Identifies the mapping a root command works on
#[derive(Debug, Args)]
pub struct RootArgs {
    /// Local root folder
    pub path: PathBuf,

    /// Mapping identifier
    #[arg(long, default_value_t = 1)]
    pub id: u64,

    /// Kind of root
    #[arg(long, value_enum, default_value = "foreign-device")]
    pub kind: RootKind,
}

impl RootArgs {
    fn mapping(&self) -> Result<RemoteToLocalMapping> {
        let path = if self.path.is_absolute() {
            self.path.clone()
        } else {
            std::env::current_dir()
                .context("Cannot resolve the working directory")?
                .join(&self.path)
        };
        let root_folder_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string);
        Ok(RemoteToLocalMapping::new(
            MappingId::new(self.id),
            self.kind.into(),
            path,
            RemoteRoot {
                root_folder_name,
                ..RemoteRoot::default()
            },
        ))
    }
}

/// Root subcommands
#[derive(Debug, Subcommand)]
pub enum RootCommand {
    /// Protect the folder and register it as an on-demand root
    Setup(RootArgs),
    /// Unregister the root and remove folder protection
    Remove(RootArgs),
    /// List registered on-demand roots
    List,
}

impl RootCommand {
    pub async fn execute(&self, format: OutputFormat, config: &Config) -> Result<()> {
        let registry = Arc::new(FileSyncRootRegistry::from_config(&config.mapping));
        match self {
            RootCommand::Setup(args) => {
                let manager = MappingManager::new(Arc::new(LocalFolderProtector::new()), registry);
                let mapping = args.mapping()?;

                let cancel = CancellationToken::new();
                let on_interrupt = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        on_interrupt.cancel();
                    }
                });

                let code = manager.finish_setup(&mapping, &cancel).await?;
                report(format, "setup", &mapping, code)
            }
            RootCommand::Remove(args) => {
                let manager = MappingManager::new(Arc::new(LocalFolderProtector::new()), registry);
                let mapping = args.mapping()?;
                let code = manager.remove_mapping(&mapping).await?;
                report(format, "remove", &mapping, code)
            }
            RootCommand::List => list(format, &registry).await,
        }
    }
}

fn report(
    format: OutputFormat,
    action: &str,
    mapping: &RemoteToLocalMapping,
    code: MappingErrorCode,
) -> Result<()> {
    let formatter = format.formatter();
    let path = mapping
        .local
        .path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    info!(mapping_id = %mapping.id, action, code = %code, "Root command finished");

    if format.is_json() {
        formatter.print_json(&serde_json::json!({
            "success": code.is_success(),
            "action": action,
            "mapping_id": mapping.id.get(),
            "kind": mapping.kind.to_string(),
            "path": path,
            "code": code,
        }));
    } else if code.is_success() {
        formatter.success(&format!("Root {action} complete: {path}"));
        formatter.info(&format!("Mapping {} ({})", mapping.id, mapping.kind));
    } else {
        formatter.error(&format!("Root {action} failed for {path}: {code}"));
    }

    if code.is_success() {
        Ok(())
    } else {
        anyhow::bail!("root {action} failed: {code}")
    }
}

async fn list(format: OutputFormat, registry: &FileSyncRootRegistry) -> Result<()> {
    let formatter = format.formatter();
    let entries = registry.entries().await?;

    if format.is_json() {
        formatter.print_json(&serde_json::json!({
            "registry": registry.path().display().to_string(),
            "roots": entries,
        }));
        return Ok(());
    }

    if entries.is_empty() {
        formatter.success("No on-demand roots registered");
        return Ok(());
    }
    formatter.success(&format!("{} on-demand root(s)", entries.len()));
    for entry in &entries {
        formatter.info(&format!(
            "{:>4}  {:<20} {}  (since {})",
            entry.mapping_id,
            entry.kind.to_string(),
            entry.path.display(),
            entry.registered_at.format("%Y-%m-%d %H:%M")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            MappingType::from(RootKind::ForeignDevice),
            MappingType::ForeignDevice
        );
        assert_eq!(
            MappingType::from(RootKind::HostDevice),
            MappingType::HostDeviceFolder
        );
        assert_eq!(
            MappingType::from(RootKind::Shared),
            MappingType::SharedWithMeItem
        );
    }

    #[test]
    fn test_relative_path_is_made_absolute() {
        let args = RootArgs {
            path: PathBuf::from("Devices/Laptop"),
            id: 3,
            kind: RootKind::ForeignDevice,
        };
        let mapping = args.mapping().unwrap();
        let path = mapping.local.path.unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("Devices/Laptop"));
        assert_eq!(mapping.remote.root_folder_name.as_deref(), Some("Laptop"));
    }

    #[tokio::test]
    async fn test_host_device_setup_registers_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path().join("Documents");
        std::fs::create_dir(&root).unwrap();
        let mut config = Config::default();
        config.mapping.registry_file = dir.path().join("roots.json");

        let cmd = RootCommand::Setup(RootArgs {
            path: root,
            id: 1,
            kind: RootKind::HostDevice,
        });
        cmd.execute(OutputFormat::Quiet, &config).await.unwrap();

        let registry = FileSyncRootRegistry::from_config(&config.mapping);
        assert!(registry.entries().await.unwrap().is_empty());
    }
}
