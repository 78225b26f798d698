//! Synchronized root setup state machine
//!
//! ```text
//!   Requested ──► FoldersProtected ──► RootRegistered ──► Active
//!       │                 │                   │
//!       └─────────────────┴───────────────────┴──► Failed(code)
//! ```
//!
//! Protection always goes ancestor first, then leaf. A failed step stops the
//! procedure and leaves earlier steps applied; calling
//! [`MappingManager::finish_setup`] again re-enters from the start and the
//! applied steps are repeated harmlessly.
//!
//! Sibling roots share their containing folder. Its protection is only
//! removed together with the last root under it, counting the roots this
//! manager protected and every root the registry still lists.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use syncroot_core::domain::{MappingErrorCode, MappingId, MappingStatus, RemoteToLocalMapping};
use syncroot_core::ports::{FolderProtectionType, FolderProtector, OnDemandSyncRootRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::MappingSetupError;

// ============================================================================
// SetupState
// ============================================================================

/// Step reached by an in-progress setup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetupState {
    Requested,
    FoldersProtected,
    RootRegistered,
    Active,
}

impl fmt::Display for SetupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SetupState::Requested => "Requested",
            SetupState::FoldersProtected => "FoldersProtected",
            SetupState::RootRegistered => "RootRegistered",
            SetupState::Active => "Active",
        };
        write!(f, "{name}")
    }
}

/// Local folders a mapping touches
struct RootFolders<'a> {
    leaf: &'a Path,
    ancestor: Option<PathBuf>,
}

// ============================================================================
// MappingManager
// ============================================================================

/// Establishes and tears down synchronized roots.
///
/// Expected failures come back as a [`MappingErrorCode`]; only caller bugs
/// and cancellation are errors. The lifecycle status of every mapping the
/// manager has handled is kept for [`MappingManager::status`].
pub struct MappingManager {
    protector: Arc<dyn FolderProtector>,
    registry: Arc<dyn OnDemandSyncRootRegistry>,
    statuses: DashMap<MappingId, MappingStatus>,
    // mappings relying on each protected ancestor folder
    ancestor_holders: DashMap<PathBuf, HashSet<MappingId>>,
}

impl MappingManager {
    /// Creates a manager.
    ///
    /// # Arguments
    ///
    /// * `protector` - Applies OS folder protection
    /// * `registry` - OS on-demand sync root registry
    pub fn new(
        protector: Arc<dyn FolderProtector>,
        registry: Arc<dyn OnDemandSyncRootRegistry>,
    ) -> Self {
        Self {
            protector,
            registry,
            statuses: DashMap::new(),
            ancestor_holders: DashMap::new(),
        }
    }

    /// Runs the setup procedure for `mapping`.
    ///
    /// `cancel` is checked between steps, never during one. On return the
    /// mapping's status is `Active` or `Failed(code)`.
    ///
    /// # Errors
    ///
    /// - [`MappingSetupError::PreconditionViolation`] when the mapping has no
    ///   usable local path or was already removed; nothing is touched
    /// - [`MappingSetupError::Cancelled`] when `cancel` fired before a step
    pub async fn finish_setup(
        &self,
        mapping: &RemoteToLocalMapping,
        cancel: &CancellationToken,
    ) -> Result<MappingErrorCode, MappingSetupError> {
        let folders = self.check_preconditions(mapping)?;

        info!(
            mapping_id = %mapping.id,
            kind = %mapping.kind,
            path = %folders.leaf.display(),
            "Setting up synchronized root"
        );
        self.set_status(mapping.id, MappingStatus::SettingUp);
        let mut state = SetupState::Requested;

        let code = check_local_folder(folders.leaf).await;
        if !code.is_success() {
            return Ok(self.fail(mapping, state, code));
        }

        self.checkpoint(mapping, state, cancel)?;
        if mapping.kind.requires_folder_protection() {
            // ancestor first: a protected leaf under an unprotected ancestor
            // is an orphan
            if let Some(ancestor) = &folders.ancestor {
                if !self
                    .protector
                    .protect_folder(ancestor, FolderProtectionType::Ancestor)
                    .await
                {
                    return Ok(self.fail(mapping, state, MappingErrorCode::LocalFolderNotProtected));
                }
                self.ancestor_holders
                    .entry(ancestor.clone())
                    .or_default()
                    .insert(mapping.id);
            }
            if !self
                .protector
                .protect_folder(folders.leaf, FolderProtectionType::Leaf)
                .await
            {
                return Ok(self.fail(mapping, state, MappingErrorCode::LocalFolderNotProtected));
            }
        }
        state = self.advance(mapping, state, SetupState::FoldersProtected);

        self.checkpoint(mapping, state, cancel)?;
        if mapping.kind.requires_on_demand_root() {
            if let Some(info) = self.registry.try_add_on_demand_sync_root(mapping).await {
                let code = match info.code {
                    MappingErrorCode::None => MappingErrorCode::OnDemandSyncRootRegistrationFailed,
                    code => code,
                };
                warn!(mapping_id = %mapping.id, error = %info, "On-demand root registration failed");
                return Ok(self.fail(mapping, state, code));
            }
        }
        state = self.advance(mapping, state, SetupState::RootRegistered);

        self.advance(mapping, state, SetupState::Active);
        self.set_status(mapping.id, MappingStatus::Active);
        info!(mapping_id = %mapping.id, "Synchronized root active");
        Ok(MappingErrorCode::None)
    }

    /// Tears down `mapping`: unregisters the on-demand root, then removes
    /// protection from the leaf and finally from the ancestor.
    ///
    /// A failed unregistration stops the teardown. A failed unprotect is
    /// reported but the remaining folders are still processed. The ancestor
    /// keeps its protection while another root under it is still set up.
    ///
    /// # Errors
    ///
    /// [`MappingSetupError::PreconditionViolation`] when the mapping has no
    /// usable local path.
    pub async fn remove_mapping(
        &self,
        mapping: &RemoteToLocalMapping,
    ) -> Result<MappingErrorCode, MappingSetupError> {
        let folders = root_folders(mapping)?;
        info!(mapping_id = %mapping.id, path = %folders.leaf.display(), "Removing synchronized root");

        if mapping.kind.requires_on_demand_root() {
            if let Some(info) = self.registry.remove_on_demand_sync_root(mapping).await {
                warn!(mapping_id = %mapping.id, error = %info, "On-demand root unregistration failed");
                let code = match info.code {
                    MappingErrorCode::None => MappingErrorCode::OnDemandSyncRootRegistrationFailed,
                    code => code,
                };
                self.set_status(mapping.id, MappingStatus::Failed(code));
                return Ok(code);
            }
        }

        let mut result = MappingErrorCode::None;
        if mapping.kind.requires_folder_protection() {
            let mut targets = vec![(folders.leaf.to_path_buf(), FolderProtectionType::Leaf)];
            if let Some(ancestor) = folders.ancestor {
                if self.ancestor_still_needed(mapping, &ancestor, folders.leaf).await {
                    info!(
                        mapping_id = %mapping.id,
                        path = %ancestor.display(),
                        "Ancestor still contains another root; keeping its protection"
                    );
                } else {
                    targets.push((ancestor, FolderProtectionType::Ancestor));
                }
            }
            for (path, kind) in targets {
                if !self.protector.unprotect_folder(&path, kind).await {
                    warn!(
                        mapping_id = %mapping.id,
                        path = %path.display(),
                        kind = %kind,
                        "Failed to remove folder protection"
                    );
                    if result.is_success() {
                        result = MappingErrorCode::LocalFileSystemAccessFailed;
                    }
                }
            }
        }

        if result.is_success() {
            self.set_status(mapping.id, MappingStatus::Removed);
            info!(mapping_id = %mapping.id, "Synchronized root removed");
        } else {
            self.set_status(mapping.id, MappingStatus::Failed(result));
        }
        Ok(result)
    }

    /// Lifecycle status of a mapping this manager has handled
    pub fn status(&self, mapping_id: MappingId) -> Option<MappingStatus> {
        self.statuses.get(&mapping_id).map(|entry| *entry)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Releases `mapping`'s hold on `ancestor` and reports whether another
    /// root still lives under it
    async fn ancestor_still_needed(
        &self,
        mapping: &RemoteToLocalMapping,
        ancestor: &Path,
        leaf: &Path,
    ) -> bool {
        let held_by_others = match self.ancestor_holders.get_mut(ancestor) {
            Some(mut holders) => {
                holders.remove(&mapping.id);
                !holders.is_empty()
            }
            None => false,
        };
        if held_by_others {
            return true;
        }
        self.ancestor_holders
            .remove_if(ancestor, |_, holders| holders.is_empty());

        self.registry
            .registered_root_paths()
            .await
            .iter()
            .any(|path| path.as_path() != leaf && path.parent() == Some(ancestor))
    }

    fn check_preconditions<'a>(
        &self,
        mapping: &'a RemoteToLocalMapping,
    ) -> Result<RootFolders<'a>, MappingSetupError> {
        let current = self.status(mapping.id).unwrap_or(mapping.status);
        if current == MappingStatus::Removed {
            return Err(MappingSetupError::PreconditionViolation(format!(
                "mapping {} was removed",
                mapping.id
            )));
        }
        root_folders(mapping)
    }

    fn checkpoint(
        &self,
        mapping: &RemoteToLocalMapping,
        state: SetupState,
        cancel: &CancellationToken,
    ) -> Result<(), MappingSetupError> {
        if cancel.is_cancelled() {
            info!(mapping_id = %mapping.id, state = %state, "Mapping setup cancelled");
            self.set_status(mapping.id, MappingStatus::Failed(MappingErrorCode::Cancelled));
            return Err(MappingSetupError::Cancelled);
        }
        Ok(())
    }

    fn advance(
        &self,
        mapping: &RemoteToLocalMapping,
        from: SetupState,
        to: SetupState,
    ) -> SetupState {
        debug!(mapping_id = %mapping.id, from = %from, to = %to, "Mapping setup step");
        to
    }

    fn fail(
        &self,
        mapping: &RemoteToLocalMapping,
        state: SetupState,
        code: MappingErrorCode,
    ) -> MappingErrorCode {
        warn!(mapping_id = %mapping.id, state = %state, code = %code, "Mapping setup failed");
        self.set_status(mapping.id, MappingStatus::Failed(code));
        code
    }

    fn set_status(&self, mapping_id: MappingId, status: MappingStatus) {
        self.statuses.insert(mapping_id, status);
    }
}

fn root_folders(mapping: &RemoteToLocalMapping) -> Result<RootFolders<'_>, MappingSetupError> {
    let Some(leaf) = mapping.local.path.as_deref() else {
        return Err(MappingSetupError::PreconditionViolation(format!(
            "mapping {} has no local path",
            mapping.id
        )));
    };
    if !leaf.is_absolute() {
        return Err(MappingSetupError::PreconditionViolation(format!(
            "mapping {} local path {} is not absolute",
            mapping.id,
            leaf.display()
        )));
    }

    let ancestor = leaf.parent().map(Path::to_path_buf);
    if mapping.kind.requires_folder_protection() && ancestor.is_none() {
        return Err(MappingSetupError::PreconditionViolation(format!(
            "mapping {} root {} has no containing folder",
            mapping.id,
            leaf.display()
        )));
    }
    Ok(RootFolders { leaf, ancestor })
}

async fn check_local_folder(path: &Path) -> MappingErrorCode {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => MappingErrorCode::None,
        Ok(_) => MappingErrorCode::LocalFolderNotAccessible,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            MappingErrorCode::LocalFolderDoesNotExist
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Cannot stat local root");
            MappingErrorCode::LocalFolderNotAccessible
        }
    }
}
