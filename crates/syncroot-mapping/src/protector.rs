//! Folder protection with Unix permission bits.
//!
//! - Ancestor: every write bit is cleared, so entries in the containing
//!   folder (the root among them) cannot be created, renamed or removed.
//! - Leaf: the sticky bit is set, so only owners may rename or delete
//!   entries inside the root.
//!
//! The mode found before protecting is remembered and restored on unprotect.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use syncroot_core::ports::{FolderProtectionType, FolderProtector};
use tracing::{debug, warn};

const WRITE_BITS: u32 = 0o222;
const STICKY_BIT: u32 = 0o1000;

/// [`FolderProtector`] backed by the local file system
#[derive(Debug, Default)]
pub struct LocalFolderProtector {
    original_modes: DashMap<(PathBuf, FolderProtectionType), u32>,
}

impl LocalFolderProtector {
    pub fn new() -> Self {
        Self::default()
    }

    fn protected_mode(mode: u32, kind: FolderProtectionType) -> u32 {
        match kind {
            FolderProtectionType::Ancestor => mode & !WRITE_BITS,
            FolderProtectionType::Leaf => mode | STICKY_BIT,
        }
    }

    fn unprotected_mode(mode: u32, kind: FolderProtectionType) -> u32 {
        match kind {
            FolderProtectionType::Ancestor => mode | 0o200,
            FolderProtectionType::Leaf => mode & !STICKY_BIT,
        }
    }

    async fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
    }
}

#[async_trait]
impl FolderProtector for LocalFolderProtector {
    async fn protect_folder(&self, path: &Path, kind: FolderProtectionType) -> bool {
        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => meta,
            Ok(_) => {
                warn!(path = %path.display(), kind = %kind, "Cannot protect a non-directory");
                return false;
            }
            Err(e) => {
                warn!(path = %path.display(), kind = %kind, error = %e, "Cannot stat folder");
                return false;
            }
        };

        let mode = meta.permissions().mode() & 0o7777;
        let key = (path.to_path_buf(), kind);
        // keep the first mode seen so a repeated protect does not overwrite it
        let original = *self.original_modes.entry(key).or_insert(mode);

        match Self::set_mode(path, Self::protected_mode(mode, kind)).await {
            Ok(()) => {
                let original = format!("{original:o}");
                debug!(path = %path.display(), kind = %kind, %original, "Folder protected");
                true
            }
            Err(e) => {
                warn!(path = %path.display(), kind = %kind, error = %e, "Failed to protect folder");
                false
            }
        }
    }

    async fn unprotect_folder(&self, path: &Path, kind: FolderProtectionType) -> bool {
        let key = (path.to_path_buf(), kind);
        let target = match self.original_modes.get(&key).map(|m| *m) {
            Some(original) => original,
            None => match tokio::fs::metadata(path).await {
                Ok(meta) => Self::unprotected_mode(meta.permissions().mode() & 0o7777, kind),
                Err(e) => {
                    warn!(path = %path.display(), kind = %kind, error = %e, "Cannot stat folder");
                    return false;
                }
            },
        };

        match Self::set_mode(path, target).await {
            Ok(()) => {
                self.original_modes.remove(&key);
                debug!(path = %path.display(), kind = %kind, "Folder protection removed");
                true
            }
            Err(e) => {
                warn!(path = %path.display(), kind = %kind, error = %e, "Failed to unprotect folder");
                false
            }
        }
    }
}
