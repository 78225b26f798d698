//! syncroot Core - Domain types, ports and configuration
//!
//! This crate is the hub of the adapter synchronization core:
//! - **Domain types** - `SyncId`, `AltId`, `AdapterTreeNode`, `NodeInfo`,
//!   `RemoteToLocalMapping`, `MappingErrorCode`
//! - **Port definitions** - Traits implemented by adapters: revisions,
//!   `NodeInfoProvider`, `HydrationSource`, `PlaceholderChannel`,
//!   `FolderProtector`, `OnDemandSyncRootRegistry`
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! # Architecture
//!
//! Component crates (`syncroot-tree`, `syncroot-transfer`, `syncroot-hydration`,
//! `syncroot-mapping`) depend only on this crate. Ports define the trait
//! boundaries that the operating system, network and storage layers
//! implement; nothing in here performs I/O on its own.

pub mod config;
pub mod domain;
pub mod ports;
