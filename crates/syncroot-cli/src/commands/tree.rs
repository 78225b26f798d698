//! Tree command - Enumerates a local folder into an adapter tree
//!
//! Shows the sync id assigned to every entry next to its platform id
//! (the inode number), which is what hydration demands are resolved by.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use syncroot_core::domain::{AdapterTreeNode, NodeKind, NodeName};
use syncroot_core::ports::NodeInfoProvider;
use syncroot_tree::{AdapterTree, LocalNodeInfoProvider};
use tracing::info;

use crate::output::{format_bytes, OutputFormat};

/// Print the adapter tree of a local folder
#[derive(Debug, Args)]
pub struct TreeCommand {
    /// Folder to enumerate
    pub path: PathBuf,

    /// Include entries whose name starts with a dot
    #[arg(long)]
    pub hidden: bool,
}

impl TreeCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let formatter = format.formatter();
        let tree = build_tree(&self.path, self.hidden).await?;
        let nodes = tree.walk();

        info!(path = %self.path.display(), nodes = tree.len(), "Adapter tree built");

        if format.is_json() {
            let entries: Vec<serde_json::Value> = nodes
                .iter()
                .map(|(depth, node)| node_json(&tree, *depth, node))
                .collect();
            formatter.print_json(&serde_json::json!({
                "root": self.path.display().to_string(),
                "count": tree.len(),
                "nodes": entries,
            }));
            return Ok(());
        }

        formatter.success(&format!(
            "{} ({} entries)",
            self.path.display(),
            tree.len()
        ));
        for (depth, node) in nodes.iter().filter(|(_, node)| !node.is_root()) {
            formatter.info(&render_line(*depth, node));
        }
        Ok(())
    }
}

async fn build_tree(path: &Path, hidden: bool) -> Result<AdapterTree> {
    let provider = LocalNodeInfoProvider::new().with_hidden(hidden);
    let root_alt_id = provider.root_alt_id(path).await?;
    let canonical = tokio::fs::canonicalize(path)
        .await
        .with_context(|| format!("Cannot resolve {}", path.display()))?;
    let tree = AdapterTree::new(root_name(&canonical)?, Some(root_alt_id));

    let infos = provider.enumerate(path).await?;
    tree.apply_all(infos.iter())
        .with_context(|| format!("Inconsistent enumeration of {}", path.display()))?;
    Ok(tree)
}

/// The folder's own name, or `root` for `/` and names a node cannot carry
fn root_name(path: &Path) -> Result<NodeName> {
    let own = path
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| NodeName::new(name).ok());
    match own {
        Some(name) => Ok(name),
        None => Ok(NodeName::new("root")?),
    }
}

fn render_line(depth: usize, node: &AdapterTreeNode) -> String {
    let indent = "  ".repeat(depth.saturating_sub(1));
    let alt = node
        .alt_id
        .map(|alt| alt.to_string())
        .unwrap_or_else(|| "-".into());
    match node.kind {
        NodeKind::Directory => format!("{indent}{}/  [sync {} | alt {alt}]", node.name, node.sync_id),
        NodeKind::File => {
            let size = node.size_hint.map(format_bytes).unwrap_or_else(|| "?".into());
            let marker = if node.is_placeholder { " (placeholder)" } else { "" };
            format!(
                "{indent}{}  {size}{marker}  [sync {} | alt {alt}]",
                node.name, node.sync_id
            )
        }
    }
}

fn node_json(tree: &AdapterTree, depth: usize, node: &AdapterTreeNode) -> serde_json::Value {
    serde_json::json!({
        "depth": depth,
        "sync_id": node.sync_id.get(),
        "alt_id": node.alt_id.map(|alt| alt.get()),
        "parent_sync_id": node.parent_sync_id.map(|id| id.get()),
        "path": tree.path_of(node.sync_id).map(|p| p.display().to_string()),
        "kind": match node.kind {
            NodeKind::File => "file",
            NodeKind::Directory => "directory",
        },
        "size": node.size_hint,
        "placeholder": node.is_placeholder,
    })
}
