//! Integration tests for concurrent hydration demands.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use syncroot_core::domain::{AdapterTreeNode, AltId, ByteRange, NodeName, SyncId, TransferError};
use syncroot_core::ports::{
    DestinationRevision, HydrationDemand, HydrationSource, PlaceholderChannel,
    RemoteSourceRevision, RevisionSink, SourceRevision,
};
use syncroot_hydration::{HydrationCoordinator, HydrationError};
use syncroot_transfer::{TransferEngine, TransferStrategy};
use syncroot_tree::AdapterTree;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test doubles
// ============================================================================

const CHUNK: usize = 4096;
const CHUNKS: usize = 10;

/// Remote revision that trickles `CHUNKS` chunks with a pause between them
struct SlowRemote {
    pause: Duration,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl RemoteSourceRevision for SlowRemote {
    async fn copy_content_to(
        &self,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
        cancel: &CancellationToken,
    ) -> Result<u64, TransferError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let result = async {
            for _ in 0..CHUNKS {
                if cancel.is_cancelled() {
                    return Err(TransferError::Cancelled);
                }
                writer.write_all(&[b'x'; CHUNK]).await?;
                tokio::time::sleep(self.pause).await;
            }
            writer.flush().await?;
            Ok((CHUNK * CHUNKS) as u64)
        }
        .await;

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

struct SlowSource {
    pause: Duration,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl SlowSource {
    fn new(pause: Duration) -> Self {
        Self {
            pause,
            running: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl HydrationSource for SlowSource {
    async fn open_revision(
        &self,
        _node: &AdapterTreeNode,
        _range: ByteRange,
    ) -> Result<SourceRevision, TransferError> {
        Ok(SourceRevision::OpaqueRemote(Box::new(SlowRemote {
            pause: self.pause,
            running: Arc::clone(&self.running),
            peak: Arc::clone(&self.peak),
        })))
    }

    async fn content_length(&self, _node: &AdapterTreeNode) -> anyhow::Result<u64> {
        Ok((CHUNK * CHUNKS) as u64)
    }
}

type Delivered = Arc<Mutex<HashMap<AltId, usize>>>;

struct PlaceholderSink {
    alt_id: AltId,
    delivered: Delivered,
}

#[async_trait]
impl RevisionSink for PlaceholderSink {
    async fn write_content(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        _cancel: &CancellationToken,
    ) -> Result<u64, TransferError> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        self.delivered.lock().unwrap().insert(self.alt_id, buf.len());
        Ok(buf.len() as u64)
    }

    async fn abandon(&self) {}
}

#[derive(Default)]
struct Channel {
    delivered: Delivered,
}

#[async_trait]
impl PlaceholderChannel for Channel {
    async fn hydration_target(
        &self,
        demand: &HydrationDemand,
    ) -> Result<DestinationRevision, TransferError> {
        Ok(DestinationRevision::OpaqueRemote(Box::new(PlaceholderSink {
            alt_id: demand.alt_id,
            delivered: Arc::clone(&self.delivered),
        })))
    }

    async fn update_placeholder_size(&self, _alt_id: AltId, _size: u64) -> anyhow::Result<()> {
        Ok(())
    }
}

fn tree_with_placeholders(alt_ids: &[u64]) -> Arc<AdapterTree> {
    let tree = Arc::new(AdapterTree::new(NodeName::new("root").unwrap(), None));
    for &alt in alt_ids {
        let id = tree.allocate_sync_id().unwrap();
        tree.upsert(
            AdapterTreeNode::new_file(id, SyncId::ROOT, NodeName::new(format!("f{alt}")).unwrap())
                .with_alt_id(AltId::new(alt))
                .with_size_hint(0)
                .as_placeholder(),
        )
        .unwrap();
    }
    tree
}

async fn wait_for_active(coordinator: &HydrationCoordinator, count: usize) {
    for _ in 0..200 {
        if coordinator.active_count() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("demands never became active");
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn demand_after_rename_resolves_new_alt_id_only() {
    let tree = tree_with_placeholders(&[70]);
    let channel = Arc::new(Channel::default());
    let coordinator = HydrationCoordinator::new(
        Arc::clone(&tree),
        Arc::new(SlowSource::new(Duration::ZERO)),
        channel.clone(),
        TransferEngine::default(),
        2,
    );

    let mut node = tree.lookup(AltId::new(70)).unwrap();
    node.alt_id = Some(AltId::new(71));
    tree.upsert(node.clone()).unwrap();

    let stale = coordinator
        .handle_hydration_demand(HydrationDemand::full(AltId::new(70)))
        .await
        .unwrap_err();
    assert!(matches!(stale, HydrationError::UnknownPlaceholder(alt) if alt == AltId::new(70)));

    let fresh = coordinator
        .handle_hydration_demand(HydrationDemand::full(AltId::new(71)))
        .await
        .unwrap();
    assert_eq!(fresh.sync_id, node.sync_id);
    assert_eq!(fresh.strategy, TransferStrategy::Relay);
    assert_eq!(
        channel.delivered.lock().unwrap().get(&AltId::new(71)),
        Some(&(CHUNK * CHUNKS))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelling_one_demand_leaves_the_other_running() {
    let tree = tree_with_placeholders(&[80, 81]);
    let channel = Arc::new(Channel::default());
    let coordinator = Arc::new(HydrationCoordinator::new(
        tree,
        Arc::new(SlowSource::new(Duration::from_millis(20))),
        channel.clone(),
        TransferEngine::default(),
        4,
    ));

    let a = HydrationDemand::full(AltId::new(80));
    let b = HydrationDemand::full(AltId::new(81));
    let (a_id, a_os_token) = (a.id, a.cancel.clone());

    let task_a = tokio::spawn({
        let coordinator = Arc::clone(&coordinator);
        async move { coordinator.handle_hydration_demand(a).await }
    });
    let task_b = tokio::spawn({
        let coordinator = Arc::clone(&coordinator);
        async move { coordinator.handle_hydration_demand(b).await }
    });

    wait_for_active(&coordinator, 2).await;
    assert!(coordinator.is_hydrating(AltId::new(80)));
    assert!(coordinator.cancel(a_id));

    let result_a = task_a.await.unwrap();
    let result_b = task_b.await.unwrap();

    assert!(result_a.unwrap_err().is_cancellation());
    assert!(!a_os_token.is_cancelled());
    assert_eq!(result_b.unwrap().bytes, (CHUNK * CHUNKS) as u64);
    assert_eq!(coordinator.active_count(), 0);
    assert_eq!(
        channel.delivered.lock().unwrap().get(&AltId::new(81)),
        Some(&(CHUNK * CHUNKS))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn os_cancellation_aborts_demand() {
    let tree = tree_with_placeholders(&[90]);
    let coordinator = Arc::new(HydrationCoordinator::new(
        tree,
        Arc::new(SlowSource::new(Duration::from_millis(20))),
        Arc::new(Channel::default()),
        TransferEngine::default(),
        1,
    ));

    let demand = HydrationDemand::full(AltId::new(90));
    let os_token = demand.cancel.clone();
    let task = tokio::spawn({
        let coordinator = Arc::clone(&coordinator);
        async move { coordinator.handle_hydration_demand(demand).await }
    });

    wait_for_active(&coordinator, 1).await;
    os_token.cancel();
    let err = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();
    assert!(err.is_cancellation());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_is_limited_by_semaphore() {
    let tree = tree_with_placeholders(&[1, 2, 3, 4]);
    let source = Arc::new(SlowSource::new(Duration::from_millis(2)));
    let peak = Arc::clone(&source.peak);
    let coordinator = Arc::new(HydrationCoordinator::new(
        tree,
        source,
        Arc::new(Channel::default()),
        TransferEngine::default(),
        2,
    ));

    let tasks: Vec<_> = (1..=4u64)
        .map(|alt| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .handle_hydration_demand(HydrationDemand::full(AltId::new(alt)))
                    .await
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(coordinator.active_count(), 0);
}
