//! End-to-end sealing scenarios against scripted chain state.

use std::sync::Arc;
use std::time::Duration;

use ethers::abi::AbiDecode;
use ethers::types::{Address, U256};

use canon_relay::contract::SealEpochCall;
use canon_relay::daemon::{EpochSyncDaemon, SealTarget};
use canon_relay::error::RelayError;
use canon_relay::testing::{test_orchestrator, FakeQueue, FakeSynchronizer};

const ATTESTER: u64 = 7;

fn daemon(synchronizer: Arc<FakeSynchronizer>, queue: Arc<FakeQueue>) -> EpochSyncDaemon {
    EpochSyncDaemon::new(
        synchronizer,
        test_orchestrator(),
        queue,
        SealTarget {
            contract: Address::repeat_byte(0xca),
            attester_id: U256::from(ATTESTER),
        },
        Duration::from_secs(10),
        16,
    )
}

async fn sealed_epochs(queue: &FakeQueue) -> Vec<u64> {
    queue
        .enqueued()
        .await
        .iter()
        .map(|(_, calldata)| {
            let call = SealEpochCall::decode(calldata).expect("seal calldata");
            assert_eq!(call.attester_id, U256::from(ATTESTER));
            call.epoch.as_u64()
        })
        .collect()
}

#[tokio::test]
async fn catches_up_and_seals_the_one_unsealed_epoch() {
    // epochs [0, 1, 2] have ended; 0 and 1 already sealed on-chain
    let sync = Arc::new(FakeSynchronizer::new(3));
    sync.seal(0).await;
    sync.seal(1).await;
    sync.set_preimages(2, vec![U256::from(31), U256::from(5), U256::from(17)])
        .await;
    let queue = Arc::new(FakeQueue::default());
    let mut daemon = daemon(sync, queue.clone());

    daemon.sync_cycle().await.unwrap();

    assert_eq!(daemon.cursor(), 2);
    assert_eq!(sealed_epochs(&queue).await, vec![2]);
    assert_eq!(queue.confirmed().await.len(), 1);
}

#[tokio::test]
async fn restart_rescan_does_not_resubmit_sealed_epochs() {
    let sync = Arc::new(FakeSynchronizer::new(3));
    sync.seal(0).await;
    sync.seal(1).await;
    sync.set_preimages(2, vec![U256::from(9)]).await;
    let queue = Arc::new(FakeQueue::default());

    let mut first = daemon(sync.clone(), queue.clone());
    first.sync_cycle().await.unwrap();
    assert_eq!(sealed_epochs(&queue).await, vec![2]);

    // the confirmed seal lands on-chain, then the process restarts with its
    // cursor back at zero
    sync.seal(2).await;
    let mut restarted = daemon(sync, queue.clone());
    restarted.sync_cycle().await.unwrap();

    assert_eq!(restarted.cursor(), 2);
    assert_eq!(sealed_epochs(&queue).await, vec![2]);
}

#[tokio::test]
async fn epochs_are_sealed_strictly_in_order_across_cycles() {
    let sync = Arc::new(FakeSynchronizer::new(3));
    sync.set_preimages(1, vec![U256::from(2)]).await;
    sync.set_preimages(2, vec![U256::from(4)]).await;
    sync.seal(0).await;
    let queue = Arc::new(FakeQueue::default());
    let mut daemon = daemon(sync.clone(), queue.clone());

    // first cycle: sealing epoch 1 fails at confirmation, epoch 2 must not
    // be attempted
    queue.fail_confirmation(true);
    let err = daemon.sync_cycle().await.unwrap_err();
    assert!(matches!(err, RelayError::Seal { epoch: 1, .. }));
    assert_eq!(sealed_epochs(&queue).await, vec![1]);
    assert_eq!(daemon.cursor(), 0);

    // next cycle: confirmation works again and both epochs go through in
    // ascending order
    queue.fail_confirmation(false);
    daemon.sync_cycle().await.unwrap();
    assert_eq!(sealed_epochs(&queue).await, vec![1, 1, 2]);
    assert_eq!(daemon.cursor(), 2);
}

#[tokio::test]
async fn chain_advance_between_cycles_extends_the_scan() {
    let sync = Arc::new(FakeSynchronizer::new(1));
    let queue = Arc::new(FakeQueue::default());
    let mut daemon = daemon(sync.clone(), queue.clone());

    daemon.sync_cycle().await.unwrap();
    assert_eq!(sealed_epochs(&queue).await, vec![0]);

    sync.set_current(2);
    sync.seal(0).await;
    daemon.sync_cycle().await.unwrap();
    assert_eq!(sealed_epochs(&queue).await, vec![0, 1]);
    assert_eq!(daemon.cursor(), 1);
}

#[tokio::test]
async fn identical_preimage_sets_produce_identical_seal_submissions() {
    let preimages = vec![U256::from(12), U256::from(99), U256::from(4)];
    let queue_a = Arc::new(FakeQueue::default());
    let queue_b = Arc::new(FakeQueue::default());

    for (queue, order) in [
        (queue_a.clone(), preimages.clone()),
        (queue_b.clone(), preimages.iter().rev().cloned().collect()),
    ] {
        let sync = Arc::new(FakeSynchronizer::new(1));
        sync.set_preimages(0, order).await;
        let mut daemon = daemon(sync, queue);
        daemon.sync_cycle().await.unwrap();
    }

    // two independent sealers fed the same multiset submit equivalent proofs
    assert_eq!(queue_a.enqueued().await, queue_b.enqueued().await);
}
