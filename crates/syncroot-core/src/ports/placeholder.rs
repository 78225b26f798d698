//! Placeholder hydration ports
//!
//! The operating system asks for placeholder content through a
//! [`HydrationDemand`]. Two ports serve it:
//!
//! - [`HydrationSource`] opens the authoritative content for a node
//! - [`PlaceholderChannel`] accepts streamed content back into the OS
//!   placeholder and updates the size the OS advertises
//!
//! ## Design Notes
//!
//! - The demand carries its own `CancellationToken`, tied to the lifetime
//!   of the OS request. Cancelling it must only affect that demand.
//! - Size lookups and placeholder metadata updates use `anyhow::Result`
//!   because their failures are adapter-specific.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::{AdapterTreeNode, AltId, ByteRange, DemandId, TransferError};
use crate::ports::revision::{DestinationRevision, SourceRevision};

// ============================================================================
// HydrationDemand
// ============================================================================

/// A request from the operating system to materialize placeholder content
#[derive(Debug, Clone)]
pub struct HydrationDemand {
    /// Identifier for bookkeeping and cancellation
    pub id: DemandId,
    /// Platform identity of the placeholder
    pub alt_id: AltId,
    /// Requested byte range
    pub range: ByteRange,
    /// Cancelled when the OS abandons the request
    pub cancel: CancellationToken,
}

impl HydrationDemand {
    /// Creates a demand with a fresh id
    pub fn new(alt_id: AltId, range: ByteRange, cancel: CancellationToken) -> Self {
        Self {
            id: DemandId::new(),
            alt_id,
            range,
            cancel,
        }
    }

    /// Creates a demand for the whole content with its own cancellation token
    pub fn full(alt_id: AltId) -> Self {
        Self::new(alt_id, ByteRange::full(), CancellationToken::new())
    }
}

// ============================================================================
// Ports
// ============================================================================

/// Authoritative content for tree nodes (usually the remote side)
#[async_trait]
pub trait HydrationSource: Send + Sync {
    /// Opens a source revision delivering `range` of the node's content
    async fn open_revision(
        &self,
        node: &AdapterTreeNode,
        range: ByteRange,
    ) -> Result<SourceRevision, TransferError>;

    /// Returns the true content length of the node
    async fn content_length(&self, node: &AdapterTreeNode) -> anyhow::Result<u64>;
}

/// The OS channel through which placeholder content is delivered
#[async_trait]
pub trait PlaceholderChannel: Send + Sync {
    /// Returns the destination that fills the placeholder for `demand`
    async fn hydration_target(
        &self,
        demand: &HydrationDemand,
    ) -> Result<DestinationRevision, TransferError>;

    /// Updates the file size the placeholder advertises to the OS
    async fn update_placeholder_size(&self, alt_id: AltId, size: u64) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_demand_covers_everything() {
        let demand = HydrationDemand::full(AltId::new(10));
        assert!(demand.range.is_full());
        assert!(!demand.cancel.is_cancelled());
    }

    #[test]
    fn demands_get_distinct_ids() {
        let a = HydrationDemand::full(AltId::new(1));
        let b = HydrationDemand::full(AltId::new(1));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn cloned_demand_shares_cancellation() {
        let demand = HydrationDemand::full(AltId::new(1));
        let clone = demand.clone();
        demand.cancel.cancel();
        assert!(clone.cancel.is_cancelled());
    }
}
