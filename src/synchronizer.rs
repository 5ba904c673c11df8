//! Read-only view of on-chain epoch state.
//!
//! The synchronizer is the daemon's oracle for the current epoch, per-epoch
//! sealed flags and accumulated leaf preimages. It is injected as a trait so
//! tests can script chain state deterministically.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, BlockNumber, U256};
use tracing::debug;

use crate::contract::CanonContract;
use crate::error::RelayError;

#[async_trait]
pub trait ChainSynchronizer: Send + Sync {
    /// Block until the local view has caught up to the chain head.
    async fn wait_for_sync(&self) -> Result<(), RelayError>;

    /// The epoch the chain is currently in.
    async fn current_epoch(&self) -> Result<u64, RelayError>;

    /// Whether `epoch` has been sealed on-chain for this attester.
    async fn epoch_sealed(&self, epoch: u64) -> Result<bool, RelayError>;

    /// The leaf preimages accumulated for `epoch`, in accumulation order.
    async fn leaf_preimages(&self, epoch: u64) -> Result<Vec<U256>, RelayError>;
}

/// Thin ethers-backed synchronizer scoped to one attester. Epoch arithmetic
/// uses the attester's start timestamp and epoch length, both read once from
/// the contract at construction.
pub struct EthSynchronizer {
    provider: Arc<Provider<Http>>,
    contract: CanonContract<Provider<Http>>,
    attester_id: U256,
    start_timestamp: u64,
    epoch_length: u64,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl EthSynchronizer {
    pub async fn connect(
        provider: Arc<Provider<Http>>,
        address: Address,
        attester_id: U256,
        retry_attempts: u32,
        retry_delay: Duration,
    ) -> Result<Self, RelayError> {
        let contract = CanonContract::new(address, provider.clone());
        let start_timestamp = contract
            .attester_start_timestamp(attester_id)
            .call()
            .await
            .map_err(|err| RelayError::Contract(err.to_string()))?
            .as_u64();
        let epoch_length = contract
            .attester_epoch_length(attester_id)
            .call()
            .await
            .map_err(|err| RelayError::Contract(err.to_string()))?
            .as_u64();
        if epoch_length == 0 {
            return Err(RelayError::Contract(format!(
                "attester {attester_id:#x} has zero epoch length"
            )));
        }
        Ok(Self {
            provider,
            contract,
            attester_id,
            start_timestamp,
            epoch_length,
            retry_attempts,
            retry_delay,
        })
    }
}

#[async_trait]
impl ChainSynchronizer for EthSynchronizer {
    async fn wait_for_sync(&self) -> Result<(), RelayError> {
        let mut last_err = String::new();
        for attempt in 0..self.retry_attempts {
            match self.provider.get_block_number().await {
                Ok(head) => {
                    debug!(%head, "chain head reachable");
                    return Ok(());
                }
                Err(err) => {
                    debug!(attempt, %err, "chain head not reachable yet");
                    last_err = err.to_string();
                }
            }
            tokio::time::sleep(self.retry_delay).await;
        }
        Err(RelayError::SyncUnavailable(last_err))
    }

    async fn current_epoch(&self) -> Result<u64, RelayError> {
        let block = self
            .provider
            .get_block(BlockNumber::Latest)
            .await
            .map_err(|err| RelayError::Contract(err.to_string()))?
            .ok_or_else(|| RelayError::Contract("no latest block".to_string()))?;
        let now = block.timestamp.as_u64();
        Ok(now.saturating_sub(self.start_timestamp) / self.epoch_length)
    }

    async fn epoch_sealed(&self, epoch: u64) -> Result<bool, RelayError> {
        self.contract
            .attester_epoch_sealed(self.attester_id, U256::from(epoch))
            .call()
            .await
            .map_err(|err| RelayError::Contract(err.to_string()))
    }

    async fn leaf_preimages(&self, epoch: u64) -> Result<Vec<U256>, RelayError> {
        let events = self
            .contract
            .epoch_preimage_filter()
            .from_block(0)
            .query()
            .await
            .map_err(|err| RelayError::Contract(err.to_string()))?;
        Ok(events
            .into_iter()
            .filter(|ev| ev.attester_id == self.attester_id && ev.epoch == U256::from(epoch))
            .map(|ev| ev.preimage)
            .collect())
    }
}
