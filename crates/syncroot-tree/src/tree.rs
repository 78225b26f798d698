//! Adapter tree storage
//!
//! Nodes live in an arena of slots. Two indexes point into it:
//!
//! - `SyncId -> slot`: every node ever inserted, including tombstones, until
//!   [`AdapterTree::purge_tombstones`] frees them
//! - `AltId -> slot`: live nodes only, updated inside the same critical
//!   section as the mutation that changed the alt id
//!
//! Parent and child links are slot indexes, so the structure holds no
//! pointers and cannot form reference cycles. Structural cycles are refused
//! by [`AdapterTree::upsert`].
//!
//! ## Locking
//!
//! The whole state sits behind one `RwLock`. Every public mutation takes the
//! write lock for exactly one atomic change and releases it before
//! returning; no guard is ever held across an `.await`.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use syncroot_core::domain::{AdapterTreeNode, AltId, NodeKind, NodeName, SyncId};
use tracing::{debug, warn};

use crate::error::{violation, ConsistencyViolation, TreeError};

type SlotIndex = usize;

// ============================================================================
// Mutation outcomes
// ============================================================================

/// Result of an accepted [`AdapterTree::upsert`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The node did not exist before
    Inserted(AdapterTreeNode),
    /// The node existed and changed
    Updated {
        previous: AdapterTreeNode,
        current: AdapterTreeNode,
    },
    /// The node already had the proposed content; the version was not bumped
    Unchanged(AdapterTreeNode),
}

impl UpsertOutcome {
    /// The node as stored after the operation
    pub fn node(&self) -> &AdapterTreeNode {
        match self {
            UpsertOutcome::Inserted(node) | UpsertOutcome::Unchanged(node) => node,
            UpsertOutcome::Updated { current, .. } => current,
        }
    }

    /// Returns true if the tree changed
    pub fn is_change(&self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged(_))
    }
}

/// Result of [`AdapterTree::compare_and_swap`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeUpdate {
    /// The expected version matched and the mutation went through
    Applied(UpsertOutcome),
    /// Another writer got there first. Both states are handed back so the
    /// caller can pick a reconciliation policy.
    Conflicted {
        current: AdapterTreeNode,
        proposed: AdapterTreeNode,
    },
}

// ============================================================================
// Internal state
// ============================================================================

#[derive(Debug)]
struct Slot {
    node: AdapterTreeNode,
    children: Vec<SlotIndex>,
    tombstoned: bool,
}

#[derive(Debug)]
pub(crate) struct TreeState {
    slots: Vec<Option<Slot>>,
    free: Vec<SlotIndex>,
    by_sync_id: HashMap<SyncId, SlotIndex>,
    by_alt_id: HashMap<AltId, SlotIndex>,
    /// Ids of purged tombstones; they may never come back
    retired: HashSet<SyncId>,
    next_id: u64,
    /// Live nodes, root excluded
    live: usize,
}

impl TreeState {
    fn new(root: AdapterTreeNode) -> Self {
        let mut state = Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_sync_id: HashMap::new(),
            by_alt_id: HashMap::new(),
            retired: HashSet::new(),
            next_id: SyncId::ROOT.get() + 1,
            live: 0,
        };
        if let Some(alt_id) = root.alt_id {
            state.by_alt_id.insert(alt_id, 0);
        }
        state.by_sync_id.insert(root.sync_id, 0);
        state.slots.push(Some(Slot {
            node: root,
            children: Vec::new(),
            tombstoned: false,
        }));
        state
    }

    fn slot(&self, idx: SlotIndex) -> Option<&Slot> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, idx: SlotIndex) -> Option<&mut Slot> {
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }

    fn live_index(&self, sync_id: SyncId) -> Option<SlotIndex> {
        let idx = *self.by_sync_id.get(&sync_id)?;
        match self.slot(idx) {
            Some(slot) if !slot.tombstoned => Some(idx),
            _ => None,
        }
    }

    pub(crate) fn live_node(&self, sync_id: SyncId) -> Option<&AdapterTreeNode> {
        self.live_index(sync_id)
            .and_then(|idx| self.slot(idx))
            .map(|slot| &slot.node)
    }

    pub(crate) fn live_by_alt(&self, alt_id: AltId) -> Option<&AdapterTreeNode> {
        let idx = *self.by_alt_id.get(&alt_id)?;
        self.slot(idx)
            .filter(|slot| !slot.tombstoned)
            .map(|slot| &slot.node)
    }

    pub(crate) fn allocate(&mut self) -> SyncId {
        let id = SyncId::new(self.next_id);
        self.next_id += 1;
        id
    }

    fn live_children(&self, idx: SlotIndex) -> impl Iterator<Item = &Slot> + '_ {
        self.slot(idx)
            .map(|slot| slot.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|&child| self.slot(child))
            .filter(|slot| !slot.tombstoned)
    }

    // ------------------------------------------------------------------------
    // Upsert
    // ------------------------------------------------------------------------

    pub(crate) fn upsert(&mut self, node: AdapterTreeNode) -> Result<UpsertOutcome, TreeError> {
        if self.retired.contains(&node.sync_id) {
            return Err(violation(ConsistencyViolation::IdentityReused(
                node.sync_id,
            )));
        }
        match self.by_sync_id.get(&node.sync_id).copied() {
            Some(idx) => self.update_existing(idx, node),
            None => self.insert_new(node),
        }
    }

    fn insert_new(&mut self, mut node: AdapterTreeNode) -> Result<UpsertOutcome, TreeError> {
        let parent_idx = self.validate_parent(&node)?;

        if node.sync_id.get() >= self.next_id {
            self.next_id = node.sync_id.get() + 1;
        }
        node.version = 1;

        let idx = match self.free.pop() {
            Some(idx) => idx,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        self.slots[idx] = Some(Slot {
            node: node.clone(),
            children: Vec::new(),
            tombstoned: false,
        });
        self.by_sync_id.insert(node.sync_id, idx);
        if let Some(alt_id) = node.alt_id {
            self.claim_alt_id(alt_id, idx);
        }
        if let Some(parent) = self.slot_mut(parent_idx) {
            parent.children.push(idx);
        }
        self.live += 1;

        debug!(sync_id = %node.sync_id, alt_id = ?node.alt_id, name = %node.name, "Node inserted");
        Ok(UpsertOutcome::Inserted(node))
    }

    fn update_existing(
        &mut self,
        idx: SlotIndex,
        mut node: AdapterTreeNode,
    ) -> Result<UpsertOutcome, TreeError> {
        let (previous, tombstoned) = match self.slot(idx) {
            Some(slot) => (slot.node.clone(), slot.tombstoned),
            None => return Err(TreeError::NotFound(node.sync_id)),
        };
        if tombstoned {
            return Err(violation(ConsistencyViolation::IdentityReused(
                node.sync_id,
            )));
        }

        let new_parent_idx = if node.is_root() {
            if node.parent_sync_id.is_some() {
                return Err(violation(ConsistencyViolation::RootMutation(
                    "the root cannot have a parent".into(),
                )));
            }
            if !node.kind.is_directory() {
                return Err(violation(ConsistencyViolation::RootMutation(
                    "the root must be a directory".into(),
                )));
            }
            None
        } else {
            let parent_idx = self.validate_parent(&node)?;
            if node.parent_sync_id != previous.parent_sync_id {
                self.check_cycle(node.sync_id, parent_idx)?;
            }
            Some(parent_idx)
        };

        if !node.kind.is_directory() {
            if let Some(child) = self.live_children(idx).next() {
                return Err(violation(ConsistencyViolation::ParentNotDirectory {
                    node: child.node.sync_id,
                    parent: node.sync_id,
                }));
            }
        }

        if previous.same_content(&node) {
            return Ok(UpsertOutcome::Unchanged(previous));
        }
        node.version = previous.version + 1;

        if previous.alt_id != node.alt_id {
            if let Some(old) = previous.alt_id {
                self.release_alt_id(old, idx);
            }
            if let Some(new) = node.alt_id {
                self.claim_alt_id(new, idx);
            }
        }

        if previous.parent_sync_id != node.parent_sync_id {
            if let Some(old_parent) = previous
                .parent_sync_id
                .and_then(|id| self.by_sync_id.get(&id).copied())
            {
                if let Some(slot) = self.slot_mut(old_parent) {
                    slot.children.retain(|&child| child != idx);
                }
            }
            if let Some(new_parent) = new_parent_idx {
                if let Some(slot) = self.slot_mut(new_parent) {
                    slot.children.push(idx);
                }
            }
        }

        if let Some(slot) = self.slot_mut(idx) {
            slot.node = node.clone();
        }

        debug!(
            sync_id = %node.sync_id,
            alt_id = ?node.alt_id,
            name = %node.name,
            version = node.version,
            "Node updated"
        );
        Ok(UpsertOutcome::Updated {
            previous,
            current: node,
        })
    }

    /// Checks that a non-root node points at a live directory
    fn validate_parent(&self, node: &AdapterTreeNode) -> Result<SlotIndex, TreeError> {
        if node.is_root() {
            return Err(violation(ConsistencyViolation::RootMutation(
                "the root cannot be re-created".into(),
            )));
        }
        let parent = node.parent_sync_id.ok_or_else(|| {
            violation(ConsistencyViolation::RootMutation(format!(
                "node {} has no parent but is not the root",
                node.sync_id
            )))
        })?;
        let parent_idx = self.live_index(parent).ok_or_else(|| {
            violation(ConsistencyViolation::DanglingParent {
                node: node.sync_id,
                parent,
            })
        })?;
        let parent_is_dir = self
            .slot(parent_idx)
            .map(|slot| slot.node.kind.is_directory())
            .unwrap_or(false);
        if !parent_is_dir {
            return Err(violation(ConsistencyViolation::ParentNotDirectory {
                node: node.sync_id,
                parent,
            }));
        }
        Ok(parent_idx)
    }

    /// Refuses a move of `node` under `new_parent_idx` if `node` is one of
    /// the new parent's ancestors (or the new parent itself)
    fn check_cycle(&self, node: SyncId, new_parent_idx: SlotIndex) -> Result<(), TreeError> {
        let mut cursor = self.slot(new_parent_idx).map(|slot| &slot.node);
        let mut steps = 0usize;
        while let Some(current) = cursor {
            if current.sync_id == node || steps > self.slots.len() {
                return Err(violation(ConsistencyViolation::Cycle {
                    node,
                    parent: self
                        .slot(new_parent_idx)
                        .map(|slot| slot.node.sync_id)
                        .unwrap_or(node),
                }));
            }
            cursor = current
                .parent_sync_id
                .and_then(|id| self.by_sync_id.get(&id))
                .and_then(|&idx| self.slot(idx))
                .map(|slot| &slot.node);
            steps += 1;
        }
        Ok(())
    }

    /// Points `alt_id` at `idx`, detaching it from any other live holder
    fn claim_alt_id(&mut self, alt_id: AltId, idx: SlotIndex) {
        if let Some(holder) = self.by_alt_id.insert(alt_id, idx) {
            if holder != idx {
                if let Some(slot) = self.slot_mut(holder) {
                    if slot.node.alt_id == Some(alt_id) {
                        slot.node.alt_id = None;
                        slot.node.version += 1;
                        warn!(
                            alt_id = %alt_id,
                            displaced = %slot.node.sync_id,
                            "Platform id reassigned, previous holder detached"
                        );
                    }
                }
            }
        }
    }

    fn release_alt_id(&mut self, alt_id: AltId, idx: SlotIndex) {
        if self.by_alt_id.get(&alt_id) == Some(&idx) {
            self.by_alt_id.remove(&alt_id);
        }
    }

    // ------------------------------------------------------------------------
    // Single-node updates
    // ------------------------------------------------------------------------

    fn node_mut(&mut self, sync_id: SyncId) -> Result<&mut AdapterTreeNode, TreeError> {
        let idx = self
            .live_index(sync_id)
            .ok_or(TreeError::NotFound(sync_id))?;
        self.slot_mut(idx)
            .map(|slot| &mut slot.node)
            .ok_or(TreeError::NotFound(sync_id))
    }

    fn set_size_hint(&mut self, sync_id: SyncId, size: u64) -> Result<bool, TreeError> {
        let node = self.node_mut(sync_id)?;
        if node.size_hint == Some(size) {
            return Ok(false);
        }
        node.size_hint = Some(size);
        node.version += 1;
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Tombstones
    // ------------------------------------------------------------------------

    fn tombstone(&mut self, sync_id: SyncId) -> Result<Vec<SyncId>, TreeError> {
        if sync_id.is_root() {
            return Err(violation(ConsistencyViolation::RootMutation(
                "the root cannot be deleted".into(),
            )));
        }
        let idx = *self
            .by_sync_id
            .get(&sync_id)
            .ok_or(TreeError::NotFound(sync_id))?;
        if self.slot(idx).map(|slot| slot.tombstoned).unwrap_or(true) {
            return Ok(Vec::new());
        }

        let mut removed = Vec::new();
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            let Some(slot) = self.slot_mut(current) else {
                continue;
            };
            if slot.tombstoned {
                continue;
            }
            slot.tombstoned = true;
            slot.node.version += 1;
            let alt_id = slot.node.alt_id;
            removed.push(slot.node.sync_id);
            stack.extend(slot.children.iter().copied());

            if let Some(alt_id) = alt_id {
                self.release_alt_id(alt_id, current);
            }
            self.live -= 1;
        }
        Ok(removed)
    }

    fn find_tombstone(&self, parent: SyncId, name: &NodeName) -> Option<&AdapterTreeNode> {
        let parent_idx = *self.by_sync_id.get(&parent)?;
        self.slot(parent_idx)?
            .children
            .iter()
            .filter_map(|&child| self.slot(child))
            .filter(|slot| slot.tombstoned && &slot.node.name == name)
            .map(|slot| &slot.node)
            .max_by_key(|node| node.sync_id)
    }

    fn purge_tombstones(&mut self) -> usize {
        let dead: Vec<SlotIndex> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| match slot {
                Some(slot) if slot.tombstoned => Some(idx),
                _ => None,
            })
            .collect();

        for &idx in &dead {
            let Some(slot) = self.slots[idx].take() else {
                continue;
            };
            if let Some(parent_idx) = slot
                .node
                .parent_sync_id
                .and_then(|id| self.by_sync_id.get(&id).copied())
            {
                if let Some(parent) = self.slot_mut(parent_idx) {
                    parent.children.retain(|&child| child != idx);
                }
            }
            self.by_sync_id.remove(&slot.node.sync_id);
            self.retired.insert(slot.node.sync_id);
            self.free.push(idx);
        }
        dead.len()
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    fn children(&self, sync_id: SyncId) -> Vec<AdapterTreeNode> {
        let Some(idx) = self.live_index(sync_id) else {
            return Vec::new();
        };
        let mut children: Vec<AdapterTreeNode> =
            self.live_children(idx).map(|slot| slot.node.clone()).collect();
        children.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));
        children
    }

    fn path_of(&self, sync_id: SyncId) -> Option<PathBuf> {
        let mut names = Vec::new();
        let mut current = self.live_node(sync_id)?;
        while let Some(parent) = current.parent_sync_id {
            names.push(current.name.as_str());
            current = self.live_node(parent)?;
            if names.len() > self.slots.len() {
                return None;
            }
        }
        Some(names.iter().rev().collect())
    }
}

// ============================================================================
// AdapterTree
// ============================================================================

/// Dual-identity tree of filesystem entries.
///
/// Answers "find node by sync id" and "find node by alt id" with one hash
/// lookup each, and applies structural mutations atomically with respect to
/// concurrent readers.
///
/// Read methods return clones; nothing borrowed from the tree outlives the
/// lock.
#[derive(Debug)]
pub struct AdapterTree {
    state: RwLock<TreeState>,
}

impl AdapterTree {
    /// Creates a tree holding only the root directory.
    ///
    /// # Arguments
    ///
    /// * `root_name` - Display name of the synchronized root
    /// * `root_alt_id` - Platform identity of the root folder, if known
    pub fn new(root_name: NodeName, root_alt_id: Option<AltId>) -> Self {
        let root = AdapterTreeNode {
            sync_id: SyncId::ROOT,
            alt_id: root_alt_id,
            parent_sync_id: None,
            name: root_name,
            kind: NodeKind::Directory,
            size_hint: None,
            is_placeholder: false,
            version: 1,
        };
        Self {
            state: RwLock::new(TreeState::new(root)),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, TreeState>, TreeError> {
        self.state
            .read()
            .map_err(|_| violation(ConsistencyViolation::LockPoisoned))
    }

    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, TreeState>, TreeError> {
        self.state
            .write()
            .map_err(|_| violation(ConsistencyViolation::LockPoisoned))
    }

    /// Reserves a fresh sync id. Ids are never handed out twice.
    pub fn allocate_sync_id(&self) -> Result<SyncId, TreeError> {
        Ok(self.write()?.allocate())
    }

    /// Returns the root node
    pub fn root(&self) -> Option<AdapterTreeNode> {
        self.get(SyncId::ROOT)
    }

    /// Finds the live node currently holding `alt_id`
    pub fn lookup(&self, alt_id: AltId) -> Option<AdapterTreeNode> {
        self.read().ok()?.live_by_alt(alt_id).cloned()
    }

    /// Finds a live node by its sync id
    pub fn get(&self, sync_id: SyncId) -> Option<AdapterTreeNode> {
        self.read().ok()?.live_node(sync_id).cloned()
    }

    /// Inserts a node or updates the one with the same sync id.
    ///
    /// The node's `version` field is ignored on input and set by the tree.
    ///
    /// # Errors
    ///
    /// Returns a consistency violation if the parent is missing, tombstoned
    /// or not a directory, if the move would make the node its own ancestor,
    /// or if the sync id belongs to a deleted node.
    pub fn upsert(&self, node: AdapterTreeNode) -> Result<UpsertOutcome, TreeError> {
        self.write()?.upsert(node)
    }

    /// Applies `node` only if the stored version still equals `expected_version`.
    ///
    /// A stale proposal is not an error: the tree returns
    /// [`NodeUpdate::Conflicted`] with both states and leaves the decision
    /// to the caller.
    pub fn compare_and_swap(
        &self,
        expected_version: u64,
        node: AdapterTreeNode,
    ) -> Result<NodeUpdate, TreeError> {
        let mut state = self.write()?;
        let current = state
            .live_node(node.sync_id)
            .cloned()
            .ok_or(TreeError::NotFound(node.sync_id))?;
        if current.version != expected_version {
            debug!(
                sync_id = %node.sync_id,
                expected = expected_version,
                actual = current.version,
                "Compare-and-swap conflict"
            );
            return Ok(NodeUpdate::Conflicted {
                current,
                proposed: node,
            });
        }
        state.upsert(node).map(NodeUpdate::Applied)
    }

    /// Records the platform identity of a node created while its OS-level
    /// entry was still pending
    pub fn bind_alt_id(
        &self,
        sync_id: SyncId,
        alt_id: AltId,
    ) -> Result<AdapterTreeNode, TreeError> {
        let mut state = self.write()?;
        let mut node = state
            .live_node(sync_id)
            .cloned()
            .ok_or(TreeError::NotFound(sync_id))?;
        node.alt_id = Some(alt_id);
        state.upsert(node).map(|outcome| outcome.node().clone())
    }

    /// Sets the size hint of one node.
    ///
    /// Returns `Ok(false)` when the node already advertised `size`.
    pub fn update_size(&self, sync_id: SyncId, size: u64) -> Result<bool, TreeError> {
        self.write()?.set_size_hint(sync_id, size)
    }

    /// Marks a node and its whole subtree deleted.
    ///
    /// Tombstoned nodes keep their sync id reserved and stay findable via
    /// [`find_tombstone`](Self::find_tombstone), but disappear from lookups.
    /// Returns the ids tombstoned by this call (empty if already deleted).
    pub fn tombstone(&self, sync_id: SyncId) -> Result<Vec<SyncId>, TreeError> {
        let removed = self.write()?.tombstone(sync_id)?;
        if !removed.is_empty() {
            debug!(sync_id = %sync_id, count = removed.len(), "Subtree tombstoned");
        }
        Ok(removed)
    }

    /// Returns true if `sync_id` names a deleted node that has not been purged
    pub fn is_tombstoned(&self, sync_id: SyncId) -> bool {
        self.read()
            .map(|state| {
                state
                    .by_sync_id
                    .get(&sync_id)
                    .and_then(|&idx| state.slot(idx))
                    .map(|slot| slot.tombstoned)
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    /// Finds the most recently created deleted child of `parent` called `name`.
    ///
    /// Distinguishes "recreated after delete" from "never existed".
    pub fn find_tombstone(&self, parent: SyncId, name: &NodeName) -> Option<AdapterTreeNode> {
        self.read().ok()?.find_tombstone(parent, name).cloned()
    }

    /// Frees the slots of every tombstoned node. Their ids stay retired.
    pub fn purge_tombstones(&self) -> Result<usize, TreeError> {
        let purged = self.write()?.purge_tombstones();
        debug!(purged, "Tombstones purged");
        Ok(purged)
    }

    /// Live children of a node, sorted by name
    pub fn children(&self, sync_id: SyncId) -> Vec<AdapterTreeNode> {
        self.read()
            .map(|state| state.children(sync_id))
            .unwrap_or_default()
    }

    /// Path of a live node relative to the root (empty for the root)
    pub fn path_of(&self, sync_id: SyncId) -> Option<PathBuf> {
        self.read().ok()?.path_of(sync_id)
    }

    /// Depth-first listing of the live tree with each node's depth, children
    /// in name order
    pub fn walk(&self) -> Vec<(usize, AdapterTreeNode)> {
        let Ok(state) = self.read() else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(state.live + 1);
        let mut stack = vec![(0usize, SyncId::ROOT)];
        while let Some((depth, sync_id)) = stack.pop() {
            let Some(node) = state.live_node(sync_id) else {
                continue;
            };
            out.push((depth, node.clone()));
            for child in state.children(sync_id).iter().rev() {
                stack.push((depth + 1, child.sync_id));
            }
        }
        out
    }

    /// Number of live nodes, not counting the root
    pub fn len(&self) -> usize {
        self.read().map(|state| state.live).unwrap_or(0)
    }

    /// True when the tree holds nothing but the root
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
