//! Domain entities
//!
//! This module contains the core domain types for syncroot:
//! - Newtypes for the two identity spaces and other validated values
//! - The adapter tree node model and enumeration records
//! - Synchronized root (mapping) model and its error codes
//! - Domain-specific error types

pub mod errors;
pub mod mapping;
pub mod newtypes;
pub mod node;

// Re-export commonly used types
pub use errors::{DomainError, TransferError};
pub use mapping::{
    LocalRoot, MappingErrorCode, MappingErrorInfo, MappingStatus, MappingType, RemoteRoot,
    RemoteToLocalMapping,
};
pub use newtypes::*;
pub use node::{AdapterTreeNode, NodeInfo, NodeKind};
