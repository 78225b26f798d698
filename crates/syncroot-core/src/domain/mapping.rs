//! Synchronized root (mapping) model
//!
//! A [`RemoteToLocalMapping`] ties a local folder to a remote location.
//! Mappings are owned by the mapping manager; the adapter tree only refers
//! to them.
//!
//! ## Lifecycle
//!
//! ```text
//!   New ──► SettingUp ──► Active ──► Removed
//!               │
//!               └──► Failed(code)
//! ```

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::MappingId;

// ============================================================================
// MappingType
// ============================================================================

/// Kind of synchronized root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingType {
    /// The account's own cloud files folder, served on demand
    CloudFiles,
    /// A user folder on this device synced as-is
    HostDeviceFolder,
    /// A root that mirrors a folder owned by another device
    ForeignDevice,
    /// An item another user shared
    SharedWithMeItem,
}

impl MappingType {
    /// Whether setup must protect the local folders
    pub fn requires_folder_protection(&self) -> bool {
        matches!(self, MappingType::CloudFiles | MappingType::ForeignDevice)
    }

    /// Whether setup must register an on-demand sync root
    pub fn requires_on_demand_root(&self) -> bool {
        matches!(self, MappingType::CloudFiles | MappingType::ForeignDevice)
    }
}

impl fmt::Display for MappingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingType::CloudFiles => write!(f, "cloud_files"),
            MappingType::HostDeviceFolder => write!(f, "host_device_folder"),
            MappingType::ForeignDevice => write!(f, "foreign_device"),
            MappingType::SharedWithMeItem => write!(f, "shared_with_me_item"),
        }
    }
}

// ============================================================================
// MappingErrorCode
// ============================================================================

/// Expected, user-actionable outcome of a mapping setup step.
///
/// `None` denotes success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingErrorCode {
    #[default]
    None,
    LocalFolderDoesNotExist,
    LocalFolderNotAccessible,
    LocalFolderNotProtected,
    LocalFolderAlreadyRegistered,
    OnDemandSyncRootRegistrationFailed,
    OnDemandSyncRootQuotaExceeded,
    LocalFileSystemAccessFailed,
    Cancelled,
}

impl MappingErrorCode {
    /// True only for `None`
    pub fn is_success(&self) -> bool {
        matches!(self, MappingErrorCode::None)
    }
}

impl fmt::Display for MappingErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            MappingErrorCode::None => "none",
            MappingErrorCode::LocalFolderDoesNotExist => "local folder does not exist",
            MappingErrorCode::LocalFolderNotAccessible => "local folder is not accessible",
            MappingErrorCode::LocalFolderNotProtected => "local folder could not be protected",
            MappingErrorCode::LocalFolderAlreadyRegistered => {
                "local folder is already registered by another mapping"
            }
            MappingErrorCode::OnDemandSyncRootRegistrationFailed => {
                "on-demand sync root registration failed"
            }
            MappingErrorCode::OnDemandSyncRootQuotaExceeded => {
                "on-demand sync root quota exceeded"
            }
            MappingErrorCode::LocalFileSystemAccessFailed => "local file system access failed",
            MappingErrorCode::Cancelled => "cancelled",
        };
        write!(f, "{text}")
    }
}

/// Error details returned by an on-demand sync root registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingErrorInfo {
    pub code: MappingErrorCode,
    pub message: Option<String>,
}

impl MappingErrorInfo {
    pub fn new(code: MappingErrorCode) -> Self {
        Self {
            code,
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Display for MappingErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.code, message),
            None => write!(f, "{}", self.code),
        }
    }
}

// ============================================================================
// MappingStatus
// ============================================================================

/// Lifecycle status of a mapping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "code")]
pub enum MappingStatus {
    #[default]
    New,
    SettingUp,
    Active,
    Failed(MappingErrorCode),
    Removed,
}

impl MappingStatus {
    /// Returns the status name without error details
    pub fn name(&self) -> &'static str {
        match self {
            MappingStatus::New => "New",
            MappingStatus::SettingUp => "SettingUp",
            MappingStatus::Active => "Active",
            MappingStatus::Failed(_) => "Failed",
            MappingStatus::Removed => "Removed",
        }
    }
}

// ============================================================================
// Roots
// ============================================================================

/// Local side of a mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRoot {
    /// Root folder on disk; required for every mapping kind
    pub path: Option<PathBuf>,
    /// Serial of the volume the folder lives on, when known
    pub volume_serial: Option<u32>,
}

/// Remote side of a mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRoot {
    pub volume_id: String,
    pub share_id: String,
    pub link_id: String,
    pub root_folder_name: Option<String>,
}

// ============================================================================
// RemoteToLocalMapping
// ============================================================================

/// A configured synchronized root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteToLocalMapping {
    pub id: MappingId,
    pub kind: MappingType,
    pub local: LocalRoot,
    pub remote: RemoteRoot,
    pub status: MappingStatus,
    pub created_at: DateTime<Utc>,
}

impl RemoteToLocalMapping {
    /// Creates a mapping in the `New` status
    pub fn new(id: MappingId, kind: MappingType, local_path: PathBuf, remote: RemoteRoot) -> Self {
        Self {
            id,
            kind,
            local: LocalRoot {
                path: Some(local_path),
                volume_serial: None,
            },
            remote,
            status: MappingStatus::New,
            created_at: Utc::now(),
        }
    }
}
