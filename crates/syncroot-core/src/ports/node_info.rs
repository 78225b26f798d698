//! Node enumeration port
//!
//! Enumerates filesystem entries under a root on either side of a mapping.
//! Providers report platform identities only; the adapter tree assigns the
//! synchronization identities.

use std::path::Path;

use async_trait::async_trait;

use crate::domain::NodeInfo;

/// Enumerates the entries below a synchronized root
#[async_trait]
pub trait NodeInfoProvider: Send + Sync {
    /// Returns every entry below `root`, excluding `root` itself.
    ///
    /// Parents always precede their children in the returned list.
    async fn enumerate(&self, root: &Path) -> anyhow::Result<Vec<NodeInfo>>;
}
