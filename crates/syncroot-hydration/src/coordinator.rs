//! Hydration coordinator.
//!
//! ```text
//! ┌──────────────┐  HydrationDemand   ┌──────────────────────┐
//! │  OS channel  │ ─────────────────► │ HydrationCoordinator │
//! └──────────────┘                    │                      │
//!        ▲                            │  active: DashMap     │
//!        │                            │  semaphore: permits  │
//!        │                            └──────────────────────┘
//!        │                               │ lookup(alt_id)   │ transfer()
//!        │                               ▼                  ▼
//!        │                      ┌──────────────┐   ┌────────────────┐
//!        │                      │ AdapterTree  │   │ TransferEngine │
//!        │                      └──────────────┘   └────────────────┘
//!        │  placeholder content + size                      │
//!        └──────────────────────────────────────────────────┘
//! ```
//!
//! The coordinator never holds the tree lock across an await: every tree
//! access is one lookup or one single-node update.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use syncroot_core::config::HydrationConfig;
use syncroot_core::domain::{AdapterTreeNode, AltId, DemandId, SyncId, TransferError};
use syncroot_core::ports::{HydrationDemand, HydrationSource, PlaceholderChannel};
use syncroot_transfer::{TransferEngine, TransferStrategy};
use syncroot_tree::AdapterTree;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::HydrationError;

// ============================================================================
// Bookkeeping
// ============================================================================

/// A demand currently being serviced
#[derive(Debug, Clone)]
pub struct ActiveDemand {
    pub id: DemandId,
    pub alt_id: AltId,
    pub sync_id: SyncId,
    pub started_at: DateTime<Utc>,
    cancel: CancellationToken,
}

/// Result of a serviced demand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HydrationOutcome {
    pub sync_id: SyncId,
    pub strategy: TransferStrategy,
    /// Bytes delivered into the placeholder
    pub bytes: u64,
    /// New advertised size, if the estimate had to be corrected
    pub corrected_size: Option<u64>,
}

/// Removes a demand from the active map however the hydration ends
struct ActiveGuard<'a> {
    active: &'a DashMap<DemandId, ActiveDemand>,
    id: DemandId,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.remove(&self.id);
    }
}

// ============================================================================
// HydrationCoordinator
// ============================================================================

/// Services placeholder hydration demands.
///
/// Ensures:
/// - **Resolution**: demands are matched to nodes through the tree's alt-id
///   index, so a renamed placeholder resolves to the same sync id and a
///   stale alt id fails cleanly
/// - **Concurrency limit**: at most `max_concurrent` transfers run at once
/// - **Isolation**: each demand runs under its own cancellation token
/// - **Size correction**: the advertised size is fixed after hydration
pub struct HydrationCoordinator {
    tree: Arc<AdapterTree>,
    source: Arc<dyn HydrationSource>,
    channel: Arc<dyn PlaceholderChannel>,
    engine: TransferEngine,
    semaphore: Semaphore,
    active: DashMap<DemandId, ActiveDemand>,
}

impl HydrationCoordinator {
    /// Creates a coordinator.
    ///
    /// # Arguments
    ///
    /// * `tree` - Adapter tree shared with the sync passes
    /// * `source` - Authoritative content for tree nodes
    /// * `channel` - OS placeholder channel
    /// * `engine` - Transfer engine used to move content
    /// * `max_concurrent` - Maximum number of parallel hydrations
    pub fn new(
        tree: Arc<AdapterTree>,
        source: Arc<dyn HydrationSource>,
        channel: Arc<dyn PlaceholderChannel>,
        engine: TransferEngine,
        max_concurrent: usize,
    ) -> Self {
        Self {
            tree,
            source,
            channel,
            engine,
            semaphore: Semaphore::new(max_concurrent.max(1)),
            active: DashMap::new(),
        }
    }

    /// Creates a coordinator limited by the `hydration` configuration section
    pub fn from_config(
        config: &HydrationConfig,
        tree: Arc<AdapterTree>,
        source: Arc<dyn HydrationSource>,
        channel: Arc<dyn PlaceholderChannel>,
        engine: TransferEngine,
    ) -> Self {
        Self::new(tree, source, channel, engine, config.max_concurrent as usize)
    }

    /// Services one demand end to end.
    ///
    /// # Errors
    ///
    /// - [`HydrationError::UnknownPlaceholder`] if the alt id does not resolve;
    ///   the demand is dropped without touching the source
    /// - [`HydrationError::Transfer`] if the content could not be delivered,
    ///   including cancellation of this demand
    pub async fn handle_hydration_demand(
        &self,
        demand: HydrationDemand,
    ) -> Result<HydrationOutcome, HydrationError> {
        let Some(node) = self.tree.lookup(demand.alt_id) else {
            warn!(
                demand_id = %demand.id,
                alt_id = %demand.alt_id,
                "Dropping hydration demand for unknown placeholder"
            );
            return Err(HydrationError::UnknownPlaceholder(demand.alt_id));
        };
        if node.kind.is_directory() {
            return Err(HydrationError::NotAFile(node.sync_id));
        }

        // child token: cancel(demand_id) must not cancel the OS request's token
        let cancel = demand.cancel.child_token();
        self.active.insert(
            demand.id,
            ActiveDemand {
                id: demand.id,
                alt_id: demand.alt_id,
                sync_id: node.sync_id,
                started_at: Utc::now(),
                cancel: cancel.clone(),
            },
        );
        let _guard = ActiveGuard {
            active: &self.active,
            id: demand.id,
        };

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled.into()),
            permit = self.semaphore.acquire() => permit
                .map_err(|_| HydrationError::Transfer(TransferError::Cancelled))?,
        };

        debug!(
            demand_id = %demand.id,
            sync_id = %node.sync_id,
            alt_id = %demand.alt_id,
            range = %demand.range,
            "Hydrating placeholder"
        );

        let source = self.source.open_revision(&node, demand.range).await?;
        let target = self.channel.hydration_target(&demand).await?;
        let report = self.engine.transfer(source, target, &cancel).await?;

        info!(
            demand_id = %demand.id,
            sync_id = %node.sync_id,
            bytes = report.bytes,
            strategy = %report.strategy,
            "Placeholder hydrated"
        );

        // content is committed at this point; size errors are only logged
        let corrected_size = match self.correct_size(&node, &demand).await {
            Ok(size) => size,
            Err(e) => {
                warn!(sync_id = %node.sync_id, error = %e, "Size correction failed");
                None
            }
        };

        Ok(HydrationOutcome {
            sync_id: node.sync_id,
            strategy: report.strategy,
            bytes: report.bytes,
            corrected_size,
        })
    }

    /// Re-reads the true content length and fixes the advertised size.
    ///
    /// Compares against the node as currently stored in the tree, so a
    /// second call with the same true size is a no-op. Returns the new size
    /// when a correction was made.
    ///
    /// # Arguments
    ///
    /// * `initial` - The node as it was when the demand was resolved
    /// * `demand` - The demand whose placeholder advertises the size
    pub async fn correct_size(
        &self,
        initial: &AdapterTreeNode,
        demand: &HydrationDemand,
    ) -> Result<Option<u64>, HydrationError> {
        let true_size = self
            .source
            .content_length(initial)
            .await
            .map_err(|e| HydrationError::Source(format!("{e:#}")))?;

        let Some(current) = self.tree.get(initial.sync_id) else {
            debug!(sync_id = %initial.sync_id, "Node removed before size correction");
            return Ok(None);
        };
        if current.size_hint == Some(true_size) {
            return Ok(None);
        }

        // placeholder first: if it fails the tree still shows the stale size
        // and the next call retries
        self.channel
            .update_placeholder_size(demand.alt_id, true_size)
            .await
            .map_err(|e| HydrationError::Placeholder(format!("{e:#}")))?;
        self.tree.update_size(initial.sync_id, true_size)?;

        info!(
            sync_id = %initial.sync_id,
            old_size = ?current.size_hint,
            new_size = true_size,
            "Placeholder size corrected"
        );
        Ok(Some(true_size))
    }

    /// Cancels one in-flight demand. Returns false if it is not active.
    pub fn cancel(&self, demand_id: DemandId) -> bool {
        match self.active.get(&demand_id) {
            Some(active) => {
                info!(demand_id = %demand_id, alt_id = %active.alt_id, "Cancelling hydration");
                active.cancel.cancel();
                true
            }
            None => {
                debug!(demand_id = %demand_id, "No active hydration to cancel");
                false
            }
        }
    }

    /// Number of demands currently being serviced (including those waiting
    /// for a permit)
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// True if some in-flight demand targets `alt_id`
    pub fn is_hydrating(&self, alt_id: AltId) -> bool {
        self.active.iter().any(|entry| entry.alt_id == alt_id)
    }

    /// Snapshot of the in-flight demands
    pub fn active_demands(&self) -> Vec<ActiveDemand> {
        self.active.iter().map(|entry| entry.value().clone()).collect()
    }
}
