//! File-backed on-demand sync root registry.
//!
//! Registered roots are kept in a JSON document:
//!
//! ```json
//! {
//!   "roots": [
//!     { "mapping_id": 7, "kind": "foreign_device",
//!       "path": "/home/user/Devices/Laptop",
//!       "registered_at": "2024-05-01T10:00:00Z" }
//!   ]
//! }
//! ```
//!
//! Registering the same mapping again is a no-op; a path already held by a
//! different mapping and a full registry are reported as error codes.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use syncroot_core::config::MappingConfig;
use syncroot_core::domain::{
    MappingErrorCode, MappingErrorInfo, MappingId, MappingType, RemoteToLocalMapping,
};
use syncroot_core::ports::OnDemandSyncRootRegistry;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// One registered on-demand root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredRoot {
    pub mapping_id: MappingId,
    pub kind: MappingType,
    pub path: PathBuf,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDocument {
    roots: Vec<RegisteredRoot>,
}

/// [`OnDemandSyncRootRegistry`] persisted to a JSON file
#[derive(Debug)]
pub struct FileSyncRootRegistry {
    path: PathBuf,
    max_roots: u32,
    // serializes read-modify-write cycles on the file
    lock: Mutex<()>,
}

impl FileSyncRootRegistry {
    /// Creates a registry stored at `path` that accepts up to `max_roots`
    pub fn new(path: impl Into<PathBuf>, max_roots: u32) -> Self {
        Self {
            path: path.into(),
            max_roots,
            lock: Mutex::new(()),
        }
    }

    /// Creates a registry from the `mapping` configuration section
    pub fn from_config(config: &MappingConfig) -> Self {
        Self::new(&config.registry_file, config.max_on_demand_roots)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lists the registered roots
    pub async fn entries(&self) -> anyhow::Result<Vec<RegisteredRoot>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.roots)
    }

    async fn load(&self) -> anyhow::Result<RegistryDocument> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("corrupt registry file {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RegistryDocument::default()),
            Err(e) => Err(e).with_context(|| format!("cannot read {}", self.path.display())),
        }
    }

    async fn store(&self, document: &RegistryDocument) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        let json = serde_json::to_vec_pretty(document)?;
        tokio::fs::write(&staging, json)
            .await
            .with_context(|| format!("cannot write {}", staging.display()))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .with_context(|| format!("cannot replace {}", self.path.display()))?;
        Ok(())
    }

    async fn register(
        &self,
        mapping: &RemoteToLocalMapping,
        root: &Path,
    ) -> anyhow::Result<Option<MappingErrorInfo>> {
        let _guard = self.lock.lock().await;
        let mut document = self.load().await?;

        if let Some(existing) = document.roots.iter().find(|r| r.path == root) {
            if existing.mapping_id == mapping.id {
                debug!(mapping_id = %mapping.id, "On-demand root already registered");
                return Ok(None);
            }
            return Ok(Some(
                MappingErrorInfo::new(MappingErrorCode::LocalFolderAlreadyRegistered)
                    .with_message(format!("held by mapping {}", existing.mapping_id)),
            ));
        }
        if document.roots.len() >= self.max_roots as usize {
            return Ok(Some(
                MappingErrorInfo::new(MappingErrorCode::OnDemandSyncRootQuotaExceeded)
                    .with_message(format!("{} roots registered", document.roots.len())),
            ));
        }

        document.roots.push(RegisteredRoot {
            mapping_id: mapping.id,
            kind: mapping.kind,
            path: root.to_path_buf(),
            registered_at: Utc::now(),
        });
        self.store(&document).await?;
        info!(mapping_id = %mapping.id, path = %root.display(), "On-demand root registered");
        Ok(None)
    }

    async fn unregister(&self, mapping: &RemoteToLocalMapping) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let mut document = self.load().await?;
        let before = document.roots.len();
        document.roots.retain(|r| r.mapping_id != mapping.id);
        if document.roots.len() != before {
            self.store(&document).await?;
            info!(mapping_id = %mapping.id, "On-demand root unregistered");
        }
        Ok(())
    }
}

#[async_trait]
impl OnDemandSyncRootRegistry for FileSyncRootRegistry {
    async fn try_add_on_demand_sync_root(
        &self,
        mapping: &RemoteToLocalMapping,
    ) -> Option<MappingErrorInfo> {
        let Some(root) = mapping.local.path.as_deref() else {
            return Some(
                MappingErrorInfo::new(MappingErrorCode::OnDemandSyncRootRegistrationFailed)
                    .with_message("mapping has no local path"),
            );
        };
        match self.register(mapping, root).await {
            Ok(result) => result,
            Err(e) => Some(
                MappingErrorInfo::new(MappingErrorCode::OnDemandSyncRootRegistrationFailed)
                    .with_message(format!("{e:#}")),
            ),
        }
    }

    async fn remove_on_demand_sync_root(
        &self,
        mapping: &RemoteToLocalMapping,
    ) -> Option<MappingErrorInfo> {
        self.unregister(mapping).await.err().map(|e| {
            MappingErrorInfo::new(MappingErrorCode::LocalFileSystemAccessFailed)
                .with_message(format!("{e:#}"))
        })
    }

    async fn registered_root_paths(&self) -> Vec<PathBuf> {
        match self.entries().await {
            Ok(entries) => entries.into_iter().map(|root| root.path).collect(),
            Err(e) => {
                let error = format!("{e:#}");
                warn!(registry = %self.path.display(), %error, "Cannot list registered roots");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use syncroot_core::domain::RemoteRoot;
    use tempfile::TempDir;

    use super::*;

    fn mapping(id: u64, path: &Path) -> RemoteToLocalMapping {
        RemoteToLocalMapping::new(
            MappingId::new(id),
            MappingType::ForeignDevice,
            path.to_path_buf(),
            RemoteRoot::default(),
        )
    }

    #[tokio::test]
    async fn registers_and_persists_roots() {
        let dir = TempDir::new().unwrap();
        let registry = FileSyncRootRegistry::new(dir.path().join("state/roots.json"), 4);
        let root = dir.path().join("Laptop");

        assert_eq!(registry.try_add_on_demand_sync_root(&mapping(1, &root)).await, None);
        // same mapping again is accepted
        assert_eq!(registry.try_add_on_demand_sync_root(&mapping(1, &root)).await, None);

        let reopened = FileSyncRootRegistry::new(registry.path(), 4);
        let entries = reopened.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].mapping_id, MappingId::new(1));
        assert_eq!(entries[0].path, root);
    }

    #[tokio::test]
    async fn path_held_by_other_mapping_is_rejected() {
        let dir = TempDir::new().unwrap();
        let registry = FileSyncRootRegistry::new(dir.path().join("roots.json"), 4);
        let root = dir.path().join("Laptop");
        registry.try_add_on_demand_sync_root(&mapping(1, &root)).await;

        let info = registry
            .try_add_on_demand_sync_root(&mapping(2, &root))
            .await
            .unwrap();
        assert_eq!(info.code, MappingErrorCode::LocalFolderAlreadyRegistered);
    }

    #[tokio::test]
    async fn quota_is_enforced() {
        let dir = TempDir::new().unwrap();
        let registry = FileSyncRootRegistry::new(dir.path().join("roots.json"), 1);
        registry
            .try_add_on_demand_sync_root(&mapping(1, &dir.path().join("a")))
            .await;

        let info = registry
            .try_add_on_demand_sync_root(&mapping(2, &dir.path().join("b")))
            .await
            .unwrap();
        assert_eq!(info.code, MappingErrorCode::OnDemandSyncRootQuotaExceeded);
    }

    #[tokio::test]
    async fn removal_frees_the_slot() {
        let dir = TempDir::new().unwrap();
        let registry = FileSyncRootRegistry::new(dir.path().join("roots.json"), 1);
        let first = mapping(1, &dir.path().join("a"));
        registry.try_add_on_demand_sync_root(&first).await;

        assert_eq!(registry.remove_on_demand_sync_root(&first).await, None);
        // removing an unknown mapping is fine too
        assert_eq!(registry.remove_on_demand_sync_root(&first).await, None);
        assert_eq!(
            registry
                .try_add_on_demand_sync_root(&mapping(2, &dir.path().join("b")))
                .await,
            None
        );
    }

    #[tokio::test]
    async fn corrupt_file_is_a_registration_failure() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("roots.json");
        std::fs::write(&file, b"not json").unwrap();
        let registry = FileSyncRootRegistry::new(&file, 4);

        let info = registry
            .try_add_on_demand_sync_root(&mapping(1, &dir.path().join("a")))
            .await
            .unwrap();
        assert_eq!(info.code, MappingErrorCode::OnDemandSyncRootRegistrationFailed);
        assert!(info.message.unwrap().contains("corrupt"));
    }

    #[tokio::test]
    async fn lists_registered_root_paths() {
        let dir = TempDir::new().unwrap();
        let registry = FileSyncRootRegistry::new(dir.path().join("roots.json"), 4);
        assert!(registry.registered_root_paths().await.is_empty());

        let laptop = dir.path().join("Devices/Laptop");
        let desktop = dir.path().join("Devices/Desktop");
        registry.try_add_on_demand_sync_root(&mapping(1, &laptop)).await;
        registry.try_add_on_demand_sync_root(&mapping(2, &desktop)).await;

        assert_eq!(registry.registered_root_paths().await, vec![laptop, desktop]);
    }
}
