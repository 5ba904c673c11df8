//! In-memory fakes for the daemon's collaborators.
//!
//! These stand in for the chain, the transaction queue and the external
//! prover so the sealing state machine and the inbound handlers can be
//! exercised deterministically.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, TxHash, U256};
use ethers::utils::keccak256;
use tokio::sync::Mutex;

use crate::circuits::{Circuit, Proof, ProofResult};
use crate::error::{ProofError, RelayError};
use crate::prover::{ProofOrchestrator, ProvingBackend};
use crate::synchronizer::ChainSynchronizer;
use crate::txqueue::TransactionQueue;

/// Scripted chain state: a current epoch, a sealed set and per-epoch
/// preimages.
pub struct FakeSynchronizer {
    current: AtomicU64,
    unavailable: AtomicBool,
    sealed: Mutex<HashSet<u64>>,
    preimages: Mutex<HashMap<u64, Vec<U256>>>,
}

impl FakeSynchronizer {
    pub fn new(current_epoch: u64) -> Self {
        Self {
            current: AtomicU64::new(current_epoch),
            unavailable: AtomicBool::new(false),
            sealed: Mutex::new(HashSet::new()),
            preimages: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_current(&self, epoch: u64) {
        self.current.store(epoch, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn seal(&self, epoch: u64) {
        self.sealed.lock().await.insert(epoch);
    }

    pub async fn set_preimages(&self, epoch: u64, preimages: Vec<U256>) {
        self.preimages.lock().await.insert(epoch, preimages);
    }
}

#[async_trait]
impl ChainSynchronizer for FakeSynchronizer {
    async fn wait_for_sync(&self) -> Result<(), RelayError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(RelayError::SyncUnavailable("scripted outage".to_string()))
        } else {
            Ok(())
        }
    }

    async fn current_epoch(&self) -> Result<u64, RelayError> {
        Ok(self.current.load(Ordering::SeqCst))
    }

    async fn epoch_sealed(&self, epoch: u64) -> Result<bool, RelayError> {
        Ok(self.sealed.lock().await.contains(&epoch))
    }

    async fn leaf_preimages(&self, epoch: u64) -> Result<Vec<U256>, RelayError> {
        Ok(self
            .preimages
            .lock()
            .await
            .get(&epoch)
            .cloned()
            .unwrap_or_default())
    }
}

/// Records every broadcast and confirmation; failures are scripted per call
/// site.
#[derive(Default)]
pub struct FakeQueue {
    fail_enqueue: AtomicBool,
    fail_confirmation: AtomicBool,
    enqueued: Mutex<Vec<(Address, Bytes)>>,
    confirmed: Mutex<Vec<TxHash>>,
}

impl FakeQueue {
    pub fn fail_enqueue(&self, fail: bool) {
        self.fail_enqueue.store(fail, Ordering::SeqCst);
    }

    pub fn fail_confirmation(&self, fail: bool) {
        self.fail_confirmation.store(fail, Ordering::SeqCst);
    }

    pub async fn enqueued(&self) -> Vec<(Address, Bytes)> {
        self.enqueued.lock().await.clone()
    }

    pub async fn confirmed(&self) -> Vec<TxHash> {
        self.confirmed.lock().await.clone()
    }
}

#[async_trait]
impl TransactionQueue for FakeQueue {
    async fn enqueue(&self, to: Address, calldata: Bytes) -> Result<TxHash, RelayError> {
        let mut enqueued = self.enqueued.lock().await;
        // deterministic hash from payload and position in the sequence
        let mut seed = calldata.to_vec();
        seed.extend_from_slice(&(enqueued.len() as u64).to_be_bytes());
        let hash = TxHash::from(keccak256(&seed));
        enqueued.push((to, calldata));
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(RelayError::Submission("scripted broadcast failure".to_string()));
        }
        Ok(hash)
    }

    async fn await_confirmation(&self, hash: TxHash) -> Result<(), RelayError> {
        if self.fail_confirmation.load(Ordering::SeqCst) {
            return Err(RelayError::ConfirmationTimeout {
                hash,
                timeout_secs: 0,
            });
        }
        self.confirmed.lock().await.push(hash);
        Ok(())
    }
}

/// Deterministic stand-in for the external prover. Proofs carry a digest of
/// their inputs; `verify` accepts exactly the proofs this backend produced
/// for the given signals.
#[derive(Default)]
pub struct FakeBackend;

impl FakeBackend {
    fn digest(values: &[U256]) -> U256 {
        let mut bytes = Vec::with_capacity(values.len() * 32);
        for v in values {
            let mut buf = [0u8; 32];
            v.to_big_endian(&mut buf);
            bytes.extend_from_slice(&buf);
        }
        U256::from_big_endian(&keccak256(&bytes))
    }

    /// A proof this backend would consider valid for `signals`.
    pub fn proof_for(signals: &[U256]) -> Proof {
        let mut limbs = [U256::zero(); 8];
        limbs[0] = Self::digest(signals);
        Proof(limbs)
    }
}

#[async_trait]
impl ProvingBackend for FakeBackend {
    async fn prove(
        &self,
        _circuit: Circuit,
        inputs: &serde_json::Value,
        _scratch: &Path,
    ) -> Result<ProofResult, ProofError> {
        let serialized = serde_json::to_vec(inputs)?;
        let public_signals = vec![U256::from_big_endian(&keccak256(&serialized))];
        let proof = Self::proof_for(&public_signals);
        Ok(ProofResult {
            public_signals,
            proof,
        })
    }

    async fn verify(
        &self,
        _vkey: &serde_json::Value,
        public_signals: &[U256],
        proof: &Proof,
    ) -> Result<bool, ProofError> {
        Ok(*proof == Self::proof_for(public_signals))
    }
}

/// An orchestrator wired to the fake backend with keys for every circuit.
pub fn test_orchestrator() -> Arc<ProofOrchestrator> {
    Arc::new(ProofOrchestrator::with_static_keys(
        Arc::new(FakeBackend),
        Circuit::ALL
            .into_iter()
            .map(|circuit| (circuit, serde_json::json!({ "circuit": circuit.name() }))),
    ))
}
