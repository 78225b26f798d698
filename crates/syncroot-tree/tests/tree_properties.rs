//! Integration tests for adapter tree invariants under sequences of
//! mutations and concurrent access.

use std::sync::Arc;
use std::thread;

use syncroot_core::domain::{AdapterTreeNode, AltId, NodeInfo, NodeKind, NodeName, SyncId};
use syncroot_core::ports::NodeInfoProvider;
use syncroot_tree::{AdapterTree, LocalNodeInfoProvider};
use tempfile::TempDir;

fn name(s: &str) -> NodeName {
    NodeName::new(s).unwrap()
}

fn new_tree() -> AdapterTree {
    AdapterTree::new(name("root"), None)
}

/// Every live node's parent must be live too.
fn assert_no_dangling_parent(tree: &AdapterTree) {
    for (_, node) in tree.walk() {
        if let Some(parent) = node.parent_sync_id {
            assert!(
                tree.get(parent).is_some(),
                "node {} points at missing parent {}",
                node.sync_id,
                parent
            );
        }
    }
}

#[test]
fn identity_is_stable_across_renames() {
    let tree = new_tree();
    let id = tree.allocate_sync_id().unwrap();
    tree.upsert(AdapterTreeNode::new_file(id, SyncId::ROOT, name("v0")).with_alt_id(AltId::new(100)))
        .unwrap();

    for step in 1..=20u64 {
        let mut node = tree.get(id).unwrap();
        node.name = name(&format!("v{step}"));
        node.alt_id = Some(AltId::new(100 + step));
        tree.upsert(node).unwrap();

        let found = tree.lookup(AltId::new(100 + step)).unwrap();
        assert_eq!(found.sync_id, id);
        assert!(tree.lookup(AltId::new(100 + step - 1)).is_none());
    }
    assert_eq!(tree.get(id).unwrap().name.as_str(), "v20");
}

#[test]
fn stale_alt_id_never_resolves_to_wrong_node() {
    let tree = new_tree();
    let x = AltId::new(7);
    let y = AltId::new(8);
    let id = tree.allocate_sync_id().unwrap();
    tree.upsert(AdapterTreeNode::new_file(id, SyncId::ROOT, name("doc")).with_alt_id(x))
        .unwrap();

    let mut renamed = tree.get(id).unwrap();
    renamed.alt_id = Some(y);
    tree.upsert(renamed).unwrap();

    assert!(tree.lookup(x).is_none());
    assert_eq!(tree.lookup(y).unwrap().sync_id, id);
}

#[test]
fn no_dangling_parent_after_mixed_mutations() {
    let tree = new_tree();
    let mut dirs = vec![SyncId::ROOT];

    for i in 0..30u64 {
        let parent = dirs[(i as usize * 7) % dirs.len()];
        let id = tree.allocate_sync_id().unwrap();
        let node = if i % 3 == 0 {
            AdapterTreeNode::new_directory(id, parent, name(&format!("d{i}")))
        } else {
            AdapterTreeNode::new_file(id, parent, name(&format!("f{i}")))
        };
        let is_dir = node.kind.is_directory();
        tree.upsert(node.with_alt_id(AltId::new(1000 + i))).unwrap();
        if is_dir {
            dirs.push(id);
        }
    }

    // delete a few directories, then try to attach to them
    for victim in dirs.iter().skip(1).step_by(3).copied().collect::<Vec<_>>() {
        tree.tombstone(victim).unwrap();
        let id = tree.allocate_sync_id().unwrap();
        assert!(tree
            .upsert(AdapterTreeNode::new_file(id, victim, name("orphan")))
            .is_err());
    }

    assert_no_dangling_parent(&tree);
    tree.purge_tombstones().unwrap();
    assert_no_dangling_parent(&tree);
}

#[test]
fn concurrent_lookups_during_renames() {
    let tree = Arc::new(new_tree());
    let id = tree.allocate_sync_id().unwrap();
    tree.upsert(AdapterTreeNode::new_file(id, SyncId::ROOT, name("n0")).with_alt_id(AltId::new(0)))
        .unwrap();

    let writer = {
        let tree = Arc::clone(&tree);
        thread::spawn(move || {
            for i in 1..500u64 {
                let mut node = tree.get(id).unwrap();
                node.alt_id = Some(AltId::new(i));
                node.name = name(&format!("n{i}"));
                tree.upsert(node).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for i in 0..500u64 {
                    // any hit must be the renamed node with a matching alt id
                    if let Some(node) = tree.lookup(AltId::new(i)) {
                        assert_eq!(node.sync_id, id);
                        assert_eq!(node.alt_id, Some(AltId::new(i)));
                        assert_eq!(node.name.as_str(), format!("n{i}"));
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(tree.lookup(AltId::new(499)).unwrap().sync_id, id);
}

#[tokio::test]
async fn local_enumeration_builds_tree_and_tracks_renames() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("docs")).unwrap();
    std::fs::write(dir.path().join("docs/a.txt"), b"alpha").unwrap();

    let provider = LocalNodeInfoProvider::new();
    let root_alt = provider.root_alt_id(dir.path()).await.unwrap();
    let tree = AdapterTree::new(name("root"), Some(root_alt));

    let infos: Vec<NodeInfo> = provider.enumerate(dir.path()).await.unwrap();
    tree.apply_all(&infos).unwrap();
    assert_eq!(tree.len(), 2);

    let a_alt = infos.iter().find(|i| i.name.as_str() == "a.txt").unwrap().alt_id;
    let a_id = tree.lookup(a_alt).unwrap().sync_id;

    // rename keeps the inode, so the sync id must survive
    std::fs::rename(dir.path().join("docs/a.txt"), dir.path().join("b.txt")).unwrap();
    let infos = provider.enumerate(dir.path()).await.unwrap();
    tree.apply_all(&infos).unwrap();

    let moved = tree.lookup(a_alt).unwrap();
    assert_eq!(moved.sync_id, a_id);
    assert_eq!(moved.name.as_str(), "b.txt");
    assert_eq!(moved.parent_sync_id, Some(SyncId::ROOT));
    assert_eq!(moved.kind, NodeKind::File);
    assert_no_dangling_parent(&tree);
}

#[cfg(unix)]
#[tokio::test]
async fn hard_link_does_not_rename_its_first_entry() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
    std::fs::hard_link(dir.path().join("a.txt"), dir.path().join("b.txt")).unwrap();

    let provider = LocalNodeInfoProvider::new();
    let tree = AdapterTree::new(name("root"), Some(provider.root_alt_id(dir.path()).await.unwrap()));
    let infos = provider.enumerate(dir.path()).await.unwrap();
    tree.apply_all(&infos).unwrap();

    assert_eq!(tree.len(), infos.len());
    let children = tree.children(SyncId::ROOT);
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].name.as_str(), "a.txt");
}
