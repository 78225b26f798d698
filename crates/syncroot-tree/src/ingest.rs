//! Folding enumeration results into the tree.
//!
//! A [`NodeInfoProvider`](syncroot_core::ports::NodeInfoProvider) only knows
//! platform identities. Ingest translates them: a known alt id means the
//! entry may have been renamed, moved or resized; an unknown one is a new
//! entry and gets a fresh sync id.

use std::collections::HashSet;

use syncroot_core::domain::{AdapterTreeNode, NodeInfo, SyncId};
use tracing::trace;

use crate::error::{violation, ConsistencyViolation, TreeError};
use crate::tree::{AdapterTree, TreeState, UpsertOutcome};

impl TreeState {
    fn apply_node_info(&mut self, info: &NodeInfo) -> Result<UpsertOutcome, TreeError> {
        let parent = match info.parent_alt_id {
            Some(parent_alt) => {
                self.live_by_alt(parent_alt)
                    .ok_or_else(|| violation(ConsistencyViolation::UnresolvedParent(parent_alt)))?
                    .sync_id
            }
            None => SyncId::ROOT,
        };

        let node = match self.live_by_alt(info.alt_id) {
            Some(existing) if existing.is_root() => {
                return Err(violation(ConsistencyViolation::RootMutation(format!(
                    "enumeration reported the root ({}) as an entry",
                    info.alt_id
                ))));
            }
            Some(existing) => AdapterTreeNode {
                parent_sync_id: Some(parent),
                name: info.name.clone(),
                kind: info.kind,
                size_hint: info.size,
                is_placeholder: info.is_placeholder,
                ..existing.clone()
            },
            None => {
                let sync_id = self.allocate();
                AdapterTreeNode {
                    sync_id,
                    alt_id: Some(info.alt_id),
                    parent_sync_id: Some(parent),
                    name: info.name.clone(),
                    kind: info.kind,
                    size_hint: info.size,
                    is_placeholder: info.is_placeholder,
                    version: 0,
                }
            }
        };

        trace!(alt_id = %info.alt_id, sync_id = %node.sync_id, "Applying node info");
        self.upsert(node)
    }
}

impl AdapterTree {
    /// Applies one enumerated entry under a single lock acquisition.
    ///
    /// # Errors
    ///
    /// Fails with [`ConsistencyViolation::UnresolvedParent`] if the entry's
    /// parent was not applied first, plus any violation
    /// [`upsert`](AdapterTree::upsert) can raise.
    pub fn apply_node_info(&self, info: &NodeInfo) -> Result<UpsertOutcome, TreeError> {
        self.write()?.apply_node_info(info)
    }

    /// Applies a whole enumeration in order, returning how many entries
    /// changed the tree.
    ///
    /// # Errors
    ///
    /// Fails with [`ConsistencyViolation::DuplicateAltId`] before touching
    /// the tree when two entries carry the same alt id (hard links, ids from
    /// different devices); otherwise as [`apply_node_info`](Self::apply_node_info).
    pub fn apply_all<'a>(
        &self,
        infos: impl IntoIterator<Item = &'a NodeInfo>,
    ) -> Result<usize, TreeError> {
        let infos: Vec<&NodeInfo> = infos.into_iter().collect();
        let mut seen = HashSet::with_capacity(infos.len());
        if let Some(dup) = infos.iter().find(|info| !seen.insert(info.alt_id)) {
            return Err(violation(ConsistencyViolation::DuplicateAltId(dup.alt_id)));
        }

        let mut changed = 0;
        for info in infos {
            if self.apply_node_info(info)?.is_change() {
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use syncroot_core::domain::{AltId, NodeKind, NodeName};

    use super::*;

    fn info(alt: u64, parent: Option<u64>, name: &str, kind: NodeKind) -> NodeInfo {
        NodeInfo {
            alt_id: AltId::new(alt),
            parent_alt_id: parent.map(AltId::new),
            name: NodeName::new(name).unwrap(),
            kind,
            size: if kind.is_directory() { None } else { Some(5) },
            is_placeholder: false,
        }
    }

    fn tree() -> AdapterTree {
        AdapterTree::new(NodeName::new("root").unwrap(), Some(AltId::new(1)))
    }

    #[test]
    fn new_entries_get_fresh_sync_ids() {
        let tree = tree();
        let dir = tree
            .apply_node_info(&info(10, None, "docs", NodeKind::Directory))
            .unwrap();
        let file = tree
            .apply_node_info(&info(11, Some(10), "a.txt", NodeKind::File))
            .unwrap();

        assert!(matches!(dir, UpsertOutcome::Inserted(_)));
        assert_ne!(dir.node().sync_id, file.node().sync_id);
        assert_eq!(file.node().parent_sync_id, Some(dir.node().sync_id));
        assert_eq!(
            tree.path_of(file.node().sync_id),
            Some(PathBuf::from("docs/a.txt"))
        );
    }

    #[test]
    fn known_alt_id_is_rename_not_new_node() {
        let tree = tree();
        let first = tree
            .apply_node_info(&info(11, None, "a.txt", NodeKind::File))
            .unwrap();
        let second = tree
            .apply_node_info(&info(11, None, "b.txt", NodeKind::File))
            .unwrap();

        assert_eq!(first.node().sync_id, second.node().sync_id);
        assert_eq!(second.node().name.as_str(), "b.txt");
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn reapplying_same_info_is_unchanged() {
        let tree = tree();
        let entries = vec![
            info(10, None, "docs", NodeKind::Directory),
            info(11, Some(10), "a.txt", NodeKind::File),
        ];
        assert_eq!(tree.apply_all(&entries).unwrap(), 2);
        assert_eq!(tree.apply_all(&entries).unwrap(), 0);
    }

    #[test]
    fn child_before_parent_is_rejected() {
        let tree = tree();
        let err = tree
            .apply_node_info(&info(11, Some(10), "a.txt", NodeKind::File))
            .unwrap_err();
        assert_eq!(
            err,
            TreeError::ConsistencyViolation(ConsistencyViolation::UnresolvedParent(AltId::new(
                10
            )))
        );
        assert!(tree.is_empty());
    }

    #[test]
    fn root_alt_id_as_entry_is_rejected() {
        let tree = tree();
        assert!(tree
            .apply_node_info(&info(1, None, "root", NodeKind::Directory))
            .is_err());
    }

    #[test]
    fn duplicate_alt_id_in_one_enumeration_is_rejected() {
        let tree = tree();
        let entries = vec![
            info(10, None, "a.txt", NodeKind::File),
            info(10, None, "b.txt", NodeKind::File),
        ];
        let err = tree.apply_all(&entries).unwrap_err();
        assert_eq!(
            err,
            TreeError::ConsistencyViolation(ConsistencyViolation::DuplicateAltId(AltId::new(10)))
        );
        // nothing was applied
        assert!(tree.is_empty());
    }
}
