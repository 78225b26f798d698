//! Local folder enumeration.
//!
//! Walks a directory breadth-first with `tokio::fs` and reports every entry
//! with its inode number as the platform identity. Breadth-first order
//! guarantees parents are reported before their children.
//!
//! Inode numbers are only unique per device and per file, so the walk stays
//! on the root's device and reports each inode once: mount points below the
//! root and every hard link after the first are skipped with a warning.
//!
//! Placeholders are recognised the way sparse placeholder files look on
//! disk: a non-empty regular file with no allocated blocks.

use std::collections::{HashSet, VecDeque};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use syncroot_core::domain::{AltId, NodeInfo, NodeKind, NodeName};
use syncroot_core::ports::NodeInfoProvider;
use tracing::{debug, warn};

/// Why an entry is left out of an enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skip {
    OtherDevice,
    HardLink,
}

/// Identity bookkeeping for one walk
struct Identities {
    root_dev: u64,
    seen: HashSet<u64>,
}

impl Identities {
    fn new(root_dev: u64, root_ino: u64) -> Self {
        Self {
            root_dev,
            seen: HashSet::from([root_ino]),
        }
    }

    /// Claims `ino` for the entry; the first claim of an inode wins
    fn admit(&mut self, dev: u64, ino: u64) -> Result<(), Skip> {
        if dev != self.root_dev {
            return Err(Skip::OtherDevice);
        }
        if !self.seen.insert(ino) {
            return Err(Skip::HardLink);
        }
        Ok(())
    }
}

/// [`NodeInfoProvider`] over a local directory
#[derive(Debug, Clone, Default)]
pub struct LocalNodeInfoProvider {
    include_hidden: bool,
}

impl LocalNodeInfoProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also report entries whose name starts with a dot
    #[must_use]
    pub fn with_hidden(mut self, include_hidden: bool) -> Self {
        self.include_hidden = include_hidden;
        self
    }

    /// Returns the inode of `root` itself, used as the tree root's alt id
    pub async fn root_alt_id(&self, root: &Path) -> anyhow::Result<AltId> {
        let meta = tokio::fs::metadata(root)
            .await
            .with_context(|| format!("Failed to stat {}", root.display()))?;
        Ok(AltId::new(meta.ino()))
    }
}

#[async_trait]
impl NodeInfoProvider for LocalNodeInfoProvider {
    async fn enumerate(&self, root: &Path) -> anyhow::Result<Vec<NodeInfo>> {
        let root_meta = tokio::fs::metadata(root)
            .await
            .with_context(|| format!("Failed to stat {}", root.display()))?;
        let mut identities = Identities::new(root_meta.dev(), root_meta.ino());
        let mut entries = Vec::new();
        let mut queue: VecDeque<(PathBuf, Option<AltId>)> = VecDeque::new();
        queue.push_back((root.to_path_buf(), None));

        while let Some((dir, parent_alt_id)) = queue.pop_front() {
            let mut reader = tokio::fs::read_dir(&dir)
                .await
                .with_context(|| format!("Failed to read directory {}", dir.display()))?;

            let mut batch = Vec::new();
            while let Some(entry) = reader.next_entry().await? {
                batch.push(entry);
            }
            batch.sort_by_key(|entry| entry.file_name());

            for entry in batch {
                let file_name = entry.file_name();
                let Some(raw_name) = file_name.to_str() else {
                    warn!(path = %entry.path().display(), "Skipping entry with non UTF-8 name");
                    continue;
                };
                if !self.include_hidden && raw_name.starts_with('.') {
                    continue;
                }
                let name = match NodeName::new(raw_name) {
                    Ok(name) => name,
                    Err(e) => {
                        warn!(path = %entry.path().display(), error = %e, "Skipping entry");
                        continue;
                    }
                };

                // symlink_metadata: links are neither followed nor reported
                let meta = tokio::fs::symlink_metadata(entry.path())
                    .await
                    .with_context(|| format!("Failed to stat {}", entry.path().display()))?;
                match identities.admit(meta.dev(), meta.ino()) {
                    Ok(()) => {}
                    Err(Skip::OtherDevice) => {
                        warn!(path = %entry.path().display(), "Skipping entry on another device");
                        continue;
                    }
                    Err(Skip::HardLink) => {
                        warn!(
                            path = %entry.path().display(),
                            ino = meta.ino(),
                            "Skipping additional hard link to an enumerated file"
                        );
                        continue;
                    }
                }
                let alt_id = AltId::new(meta.ino());

                let (kind, size, is_placeholder) = if meta.is_dir() {
                    queue.push_back((entry.path(), Some(alt_id)));
                    (NodeKind::Directory, None, false)
                } else if meta.is_file() {
                    let sparse = meta.len() > 0 && meta.blocks() == 0;
                    (NodeKind::File, Some(meta.len()), sparse)
                } else {
                    continue;
                };

                entries.push(NodeInfo {
                    alt_id,
                    parent_alt_id,
                    name,
                    kind,
                    size,
                    is_placeholder,
                });
            }
        }

        debug!(root = %root.display(), count = entries.len(), "Enumerated local folder");
        Ok(entries)
    }
}
