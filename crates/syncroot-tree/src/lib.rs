//! syncroot Tree - dual-identity adapter tree
//!
//! The adapter tree is the single source of truth for identity
//! correspondence between the stable synchronization identity of an entry
//! ([`SyncId`](syncroot_core::domain::SyncId)) and its volatile platform
//! identity ([`AltId`](syncroot_core::domain::AltId)).
//!
//! # Architecture
//!
//! - [`AdapterTree`] stores nodes in an arena indexed by `SyncId`, with a
//!   secondary `AltId` index kept current on every mutation
//! - Structural mutations run under one tree-wide write lock that is never
//!   held across an `.await`, so hydration callbacks and sync passes never
//!   observe a half-applied rename or move
//! - [`LocalNodeInfoProvider`] enumerates a local folder, and
//!   [`AdapterTree::apply_node_info`] folds its records into the tree
//!
//! # Usage
//!
//! ```ignore
//! use syncroot_tree::AdapterTree;
//!
//! let tree = AdapterTree::new(NodeName::new("Laptop")?, None);
//! for info in provider.enumerate(&root).await? {
//!     tree.apply_node_info(&info)?;
//! }
//! let node = tree.lookup(alt_id);
//! ```

pub mod error;
pub mod ingest;
pub mod local;
pub mod tree;

pub use error::{ConsistencyViolation, TreeError};
pub use local::LocalNodeInfoProvider;
pub use tree::{AdapterTree, NodeUpdate, UpsertOutcome};
