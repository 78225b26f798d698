//! Adapter tree node model
//!
//! An [`AdapterTreeNode`] is one filesystem entry known to the sync engine.
//! It carries both identity spaces: the stable [`SyncId`] that owns the slot
//! in the tree and the optional platform [`AltId`] that OS-level events use
//! to find it again.
//!
//! [`NodeInfo`] is the raw shape an enumeration provider reports before the
//! tree has assigned a `SyncId`.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::newtypes::{AltId, NodeName, SyncId};

// ============================================================================
// NodeKind
// ============================================================================

/// Whether a node is a regular file or a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Directory,
}

impl NodeKind {
    /// Returns true for directories
    pub fn is_directory(&self) -> bool {
        matches!(self, NodeKind::Directory)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::File => write!(f, "file"),
            NodeKind::Directory => write!(f, "directory"),
        }
    }
}

// ============================================================================
// AdapterTreeNode
// ============================================================================

/// A filesystem entry tracked by the adapter tree.
///
/// ## Invariants
///
/// - `sync_id` is unique within the tree and never changes.
/// - `parent_sync_id` is `None` only for the root node.
/// - `version` is owned by the tree: it is bumped on every accepted
///   mutation and ignored on input except by `compare_and_swap`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterTreeNode {
    /// Stable synchronization identity
    pub sync_id: SyncId,

    /// Platform identity (None while the OS-level entry is pending)
    pub alt_id: Option<AltId>,

    /// Parent directory (None only for the root)
    pub parent_sync_id: Option<SyncId>,

    /// Entry name in the parent directory
    pub name: NodeName,

    /// File or directory
    pub kind: NodeKind,

    /// Size advertised to the OS; may be an estimate for placeholders
    pub size_hint: Option<u64>,

    /// Whether the local entry is a placeholder whose content is not local yet
    pub is_placeholder: bool,

    /// Mutation counter maintained by the tree
    pub version: u64,
}

impl AdapterTreeNode {
    /// Creates a file node under `parent`
    pub fn new_file(sync_id: SyncId, parent: SyncId, name: NodeName) -> Self {
        Self {
            sync_id,
            alt_id: None,
            parent_sync_id: Some(parent),
            name,
            kind: NodeKind::File,
            size_hint: None,
            is_placeholder: false,
            version: 0,
        }
    }

    /// Creates a directory node under `parent`
    pub fn new_directory(sync_id: SyncId, parent: SyncId, name: NodeName) -> Self {
        Self {
            kind: NodeKind::Directory,
            ..Self::new_file(sync_id, parent, name)
        }
    }

    /// Sets the platform identity
    #[must_use]
    pub fn with_alt_id(mut self, alt_id: AltId) -> Self {
        self.alt_id = Some(alt_id);
        self
    }

    /// Sets the advertised size
    #[must_use]
    pub fn with_size_hint(mut self, size: u64) -> Self {
        self.size_hint = Some(size);
        self
    }

    /// Marks the node as a placeholder
    #[must_use]
    pub fn as_placeholder(mut self) -> Self {
        self.is_placeholder = true;
        self
    }

    /// Returns true for the root node
    pub fn is_root(&self) -> bool {
        self.sync_id.is_root()
    }

    /// Compares everything except the tree-maintained version
    pub fn same_content(&self, other: &AdapterTreeNode) -> bool {
        self.sync_id == other.sync_id
            && self.alt_id == other.alt_id
            && self.parent_sync_id == other.parent_sync_id
            && self.name == other.name
            && self.kind == other.kind
            && self.size_hint == other.size_hint
            && self.is_placeholder == other.is_placeholder
    }
}

// ============================================================================
// NodeInfo
// ============================================================================

/// An entry as reported by a [`NodeInfoProvider`](crate::ports::NodeInfoProvider).
///
/// Carries only platform identities; the tree maps them onto sync identities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Platform identity of the entry
    pub alt_id: AltId,
    /// Platform identity of the parent (None for direct children of the root)
    pub parent_alt_id: Option<AltId>,
    /// Entry name
    pub name: NodeName,
    /// File or directory
    pub kind: NodeKind,
    /// Size in bytes (None for directories)
    pub size: Option<u64>,
    /// Whether the entry is a placeholder
    pub is_placeholder: bool,
}
