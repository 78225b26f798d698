//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! synchronization core. The core depends on these interfaces; the
//! operating system, network and storage layers implement them.
//!
//! ## Ports Overview
//!
//! - [`ReadableRevision`], [`RemoteSourceRevision`], [`RevisionSink`],
//!   [`WritableRevision`] - content endpoints moved by the transfer engine
//! - [`NodeInfoProvider`] - enumerates filesystem entries on either side
//! - [`HydrationSource`] / [`PlaceholderChannel`] - both ends of an OS
//!   hydration demand
//! - [`FolderProtector`] / [`OnDemandSyncRootRegistry`] - OS services used
//!   while setting up a synchronized root

pub mod node_info;
pub mod placeholder;
pub mod revision;
pub mod sync_root;

pub use node_info::NodeInfoProvider;
pub use placeholder::{HydrationDemand, HydrationSource, PlaceholderChannel};
pub use revision::{
    ContentReader, ContentWriter, DestinationRevision, ReadableRevision, RemoteSourceRevision,
    RevisionSink, SourceRevision, WritableRevision,
};
pub use sync_root::{FolderProtectionType, FolderProtector, OnDemandSyncRootRegistry};
