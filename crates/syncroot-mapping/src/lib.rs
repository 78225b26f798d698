//! syncroot Mapping - Synchronized root lifecycle
//!
//! [`MappingManager`] drives a [`RemoteToLocalMapping`] through setup
//! (folder protection, on-demand root registration) and teardown, returning
//! typed [`MappingErrorCode`] values for expected failures.
//!
//! Local adapters for the two OS services it needs:
//! - [`LocalFolderProtector`] - Unix permission bits
//! - [`FileSyncRootRegistry`] - JSON registry file with a root quota
//!
//! [`RemoteToLocalMapping`]: syncroot_core::domain::RemoteToLocalMapping
//! [`MappingErrorCode`]: syncroot_core::domain::MappingErrorCode

pub mod error;
pub mod manager;
#[cfg(unix)]
pub mod protector;
pub mod registry;

pub use error::MappingSetupError;
pub use manager::MappingManager;
#[cfg(unix)]
pub use protector::LocalFolderProtector;
pub use registry::{FileSyncRootRegistry, RegisteredRoot};
