//! The epoch sync daemon: detects unsealed epochs and seals them.
//!
//! One instance runs for the process lifetime. Epochs are processed in
//! strictly increasing order within each cycle, and the cursor only advances
//! past an epoch once it is observed sealed or this process's own sealing
//! transaction has confirmed. Because sealed-ness is always re-read from the
//! chain, another sealer racing this one (or a process restart with the
//! cursor back at zero) cannot cause a duplicate submission.

use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Address, U256};
use tracing::{debug, info, warn};

use crate::circuits::{Circuit, ProofRequest};
use crate::contract;
use crate::error::RelayError;
use crate::prover::ProofOrchestrator;
use crate::synchronizer::ChainSynchronizer;
use crate::tree;
use crate::txqueue::TransactionQueue;

/// Where seal transactions go and on whose behalf.
#[derive(Clone, Copy, Debug)]
pub struct SealTarget {
    pub contract: Address,
    pub attester_id: U256,
}

pub struct EpochSyncDaemon {
    synchronizer: Arc<dyn ChainSynchronizer>,
    orchestrator: Arc<ProofOrchestrator>,
    queue: Arc<dyn TransactionQueue>,
    target: SealTarget,
    interval: Duration,
    tree_capacity: usize,
    latest_sync_epoch: u64,
}

impl EpochSyncDaemon {
    pub fn new(
        synchronizer: Arc<dyn ChainSynchronizer>,
        orchestrator: Arc<ProofOrchestrator>,
        queue: Arc<dyn TransactionQueue>,
        target: SealTarget,
        interval: Duration,
        tree_capacity: usize,
    ) -> Self {
        Self {
            synchronizer,
            orchestrator,
            queue,
            target,
            interval,
            tree_capacity,
            latest_sync_epoch: 0,
        }
    }

    /// The last epoch observed sealed or sealed by this process. Monotonic.
    pub fn cursor(&self) -> u64 {
        self.latest_sync_epoch
    }

    /// Run forever. Per-cycle failures are logged and retried on the next
    /// interval; they never escape this loop.
    pub async fn run(mut self) {
        info!(interval = ?self.interval, "epoch sync daemon started");
        loop {
            if let Err(err) = self.sync_cycle().await {
                warn!(%err, "sync cycle failed, will retry next interval");
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// One scan: catch up the cursor over every ended epoch, sealing the
    /// ones nobody has sealed yet. A sealing failure aborts the remainder of
    /// the scan so later epochs are never attempted before earlier ones.
    pub async fn sync_cycle(&mut self) -> Result<(), RelayError> {
        self.synchronizer.wait_for_sync().await?;
        let current = self.synchronizer.current_epoch().await?;
        debug!(current, cursor = self.latest_sync_epoch, "scanning epochs");

        for epoch in self.latest_sync_epoch..current {
            if self.synchronizer.epoch_sealed(epoch).await? {
                self.latest_sync_epoch = epoch;
                continue;
            }
            info!(epoch, "sealing epoch");
            self.seal_epoch(epoch)
                .await
                .map_err(|source| RelayError::Seal {
                    epoch,
                    source: Box::new(source),
                })?;
            self.latest_sync_epoch = epoch;
        }
        Ok(())
    }

    /// Seal one epoch: build canonical tree inputs from its preimages,
    /// prove, submit, and wait for confirmation. The cursor is only advanced
    /// by the caller once this returns Ok.
    async fn seal_epoch(&self, epoch: u64) -> Result<(), RelayError> {
        let preimages = self.synchronizer.leaf_preimages(epoch).await?;
        debug!(epoch, count = preimages.len(), "building tree inputs");
        let inputs = tree::build_ordered_tree_inputs(&preimages, self.tree_capacity)?;
        let result = self
            .orchestrator
            .generate(ProofRequest {
                circuit: Circuit::BuildOrderedTree,
                inputs,
            })
            .await?;
        let calldata = contract::encode_seal_epoch(epoch, self.target.attester_id, &result);
        let hash = self.queue.enqueue(self.target.contract, calldata).await?;
        info!(epoch, %hash, "seal transaction broadcast");
        self.queue.await_confirmation(hash).await?;
        info!(epoch, %hash, "seal transaction confirmed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_orchestrator, FakeQueue, FakeSynchronizer};

    fn daemon(
        synchronizer: Arc<FakeSynchronizer>,
        queue: Arc<FakeQueue>,
    ) -> EpochSyncDaemon {
        EpochSyncDaemon::new(
            synchronizer,
            test_orchestrator(),
            queue,
            SealTarget {
                contract: Address::repeat_byte(0xca),
                attester_id: U256::from(7),
            },
            Duration::from_secs(10),
            16,
        )
    }

    #[tokio::test]
    async fn cursor_catches_up_over_sealed_epochs_without_submitting() {
        let sync = Arc::new(FakeSynchronizer::new(3));
        sync.seal(0).await;
        sync.seal(1).await;
        sync.seal(2).await;
        let queue = Arc::new(FakeQueue::default());
        let mut daemon = daemon(sync, queue.clone());

        daemon.sync_cycle().await.unwrap();
        assert_eq!(daemon.cursor(), 2);
        assert_eq!(queue.enqueued().await.len(), 0);
    }

    #[tokio::test]
    async fn unsealed_epoch_is_sealed_exactly_once() {
        let sync = Arc::new(FakeSynchronizer::new(3));
        sync.seal(0).await;
        sync.seal(1).await;
        sync.set_preimages(2, vec![U256::from(11), U256::from(3), U256::from(8)])
            .await;
        let queue = Arc::new(FakeQueue::default());
        let mut daemon = daemon(sync, queue.clone());

        daemon.sync_cycle().await.unwrap();
        assert_eq!(daemon.cursor(), 2);
        let enqueued = queue.enqueued().await;
        assert_eq!(enqueued.len(), 1);
        assert_eq!(queue.confirmed().await.len(), 1);
    }

    #[tokio::test]
    async fn seal_failure_aborts_the_rest_of_the_cycle() {
        let sync = Arc::new(FakeSynchronizer::new(4));
        sync.seal(0).await;
        // epochs 1, 2, 3 unsealed; enqueue fails
        let queue = Arc::new(FakeQueue::default());
        queue.fail_enqueue(true);
        let mut daemon = daemon(sync, queue.clone());

        let err = daemon.sync_cycle().await.unwrap_err();
        assert!(matches!(err, RelayError::Seal { epoch: 1, .. }));
        // cursor stops at the last sealed epoch, epoch 2 was never attempted
        assert_eq!(daemon.cursor(), 0);
        assert_eq!(queue.enqueued().await.len(), 1);
    }

    #[tokio::test]
    async fn cursor_is_monotonic_across_cycles() {
        let sync = Arc::new(FakeSynchronizer::new(2));
        sync.seal(0).await;
        sync.seal(1).await;
        let queue = Arc::new(FakeQueue::default());
        let mut daemon = daemon(sync.clone(), queue);

        daemon.sync_cycle().await.unwrap();
        let after_first = daemon.cursor();
        // chain does not advance; a second cycle must not move the cursor back
        daemon.sync_cycle().await.unwrap();
        assert_eq!(daemon.cursor(), after_first);
    }

    #[tokio::test]
    async fn confirmation_failure_leaves_cursor_untouched() {
        let sync = Arc::new(FakeSynchronizer::new(2));
        sync.seal(0).await;
        let queue = Arc::new(FakeQueue::default());
        queue.fail_confirmation(true);
        let mut daemon = daemon(sync, queue.clone());

        let err = daemon.sync_cycle().await.unwrap_err();
        assert!(matches!(err, RelayError::Seal { epoch: 1, .. }));
        assert_eq!(daemon.cursor(), 0);
    }

    #[tokio::test]
    async fn sync_unavailable_fails_the_cycle_before_any_reads() {
        let sync = Arc::new(FakeSynchronizer::new(5));
        sync.set_unavailable(true);
        let queue = Arc::new(FakeQueue::default());
        let mut daemon = daemon(sync, queue.clone());

        let err = daemon.sync_cycle().await.unwrap_err();
        assert!(matches!(err, RelayError::SyncUnavailable(_)));
        assert_eq!(queue.enqueued().await.len(), 0);
    }
}
