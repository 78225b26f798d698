//! Synchronized root OS services
//!
//! Ports used by the mapping manager while establishing or tearing down a
//! synchronized root: folder protection and on-demand sync root registration.
//!
//! ## Design Notes
//!
//! - Both ports report expected failures as values (`bool`,
//!   `Option<MappingErrorInfo>`), never as errors. Setup failures are
//!   user-actionable outcomes, not faults.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{MappingErrorInfo, RemoteToLocalMapping};

/// Which folder of a synchronized root is being protected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderProtectionType {
    /// The folder containing the root; guards against destructive operations on it
    Ancestor,
    /// The root folder itself; guards against direct deletion or rename
    Leaf,
}

impl fmt::Display for FolderProtectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FolderProtectionType::Ancestor => write!(f, "ancestor"),
            FolderProtectionType::Leaf => write!(f, "leaf"),
        }
    }
}

/// Applies and removes OS-level folder protection
#[async_trait]
pub trait FolderProtector: Send + Sync {
    /// Protects `path`; returns false when protection could not be applied
    async fn protect_folder(&self, path: &Path, kind: FolderProtectionType) -> bool;

    /// Removes protection from `path`; returns false when it could not be removed
    async fn unprotect_folder(&self, path: &Path, kind: FolderProtectionType) -> bool;
}

/// Registers synchronized roots with the OS on-demand mechanism
#[async_trait]
pub trait OnDemandSyncRootRegistry: Send + Sync {
    /// Registers the mapping's local root; `None` on success
    async fn try_add_on_demand_sync_root(
        &self,
        mapping: &RemoteToLocalMapping,
    ) -> Option<MappingErrorInfo>;

    /// Unregisters the mapping's local root; `None` on success
    async fn remove_on_demand_sync_root(
        &self,
        mapping: &RemoteToLocalMapping,
    ) -> Option<MappingErrorInfo>;

    /// Local paths of every root currently registered.
    ///
    /// Registries that cannot enumerate their roots report none.
    async fn registered_root_paths(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}
