//! Ordered transaction submission under a single signer.
//!
//! The queue owns the relayer's nonce sequence: concurrent callers (the
//! sealing daemon and any number of inbound handlers) are serialized through
//! one mutex so broadcasts always carry consecutive nonces.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, TxHash, U256};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::RelayError;

#[async_trait]
pub trait TransactionQueue: Send + Sync {
    /// Sign and broadcast a call to `to`, returning the transaction hash
    /// immediately. Confirmation is a separate, awaitable step.
    async fn enqueue(&self, to: Address, calldata: Bytes) -> Result<TxHash, RelayError>;

    /// Block until `hash` is mined, bounded by the configured deadline.
    async fn await_confirmation(&self, hash: TxHash) -> Result<(), RelayError>;
}

pub struct EthTransactionQueue {
    provider: Arc<Provider<Http>>,
    wallet: LocalWallet,
    nonce: Mutex<U256>,
    confirm_timeout: Duration,
    confirm_poll: Duration,
}

impl EthTransactionQueue {
    /// The starting nonce is read from the chain, so a restarted relay
    /// resumes the sequence where the previous process left off.
    pub async fn new(
        provider: Arc<Provider<Http>>,
        wallet: LocalWallet,
        confirm_timeout: Duration,
        confirm_poll: Duration,
    ) -> Result<Self, RelayError> {
        let nonce = provider
            .get_transaction_count(wallet.address(), None)
            .await
            .map_err(|err| RelayError::Submission(err.to_string()))?;
        debug!(%nonce, signer = %wallet.address(), "transaction queue initialized");
        Ok(Self {
            provider,
            wallet,
            nonce: Mutex::new(nonce),
            confirm_timeout,
            confirm_poll,
        })
    }
}

#[async_trait]
impl TransactionQueue for EthTransactionQueue {
    async fn enqueue(&self, to: Address, calldata: Bytes) -> Result<TxHash, RelayError> {
        // The lock is held across fill/sign/broadcast so the nonce sequence
        // stays consecutive under concurrent callers.
        let mut nonce = self.nonce.lock().await;
        debug!(
            selector = %hex::encode(&calldata[..calldata.len().min(4)]),
            bytes = calldata.len(),
            "enqueueing call"
        );
        let mut tx: TypedTransaction = TransactionRequest::new()
            .from(self.wallet.address())
            .to(to)
            .data(calldata)
            .nonce(*nonce)
            .into();

        let gas = self
            .provider
            .estimate_gas(&tx, None)
            .await
            .map_err(|err| RelayError::Submission(err.to_string()))?;
        tx.set_gas(gas);
        let gas_price = self
            .provider
            .get_gas_price()
            .await
            .map_err(|err| RelayError::Submission(err.to_string()))?;
        tx.set_gas_price(gas_price);

        let signature = self
            .wallet
            .sign_transaction(&tx)
            .await
            .map_err(|err| RelayError::Submission(err.to_string()))?;
        let pending = self
            .provider
            .send_raw_transaction(tx.rlp_signed(&signature))
            .await
            .map_err(|err| RelayError::Submission(err.to_string()))?;
        let hash = pending.tx_hash();
        *nonce += U256::one();
        info!(%hash, %to, "transaction broadcast");
        Ok(hash)
    }

    async fn await_confirmation(&self, hash: TxHash) -> Result<(), RelayError> {
        let deadline = Instant::now() + self.confirm_timeout;
        loop {
            match self.provider.get_transaction_receipt(hash).await {
                Ok(Some(receipt)) => {
                    return if receipt.status == Some(1.into()) {
                        Ok(())
                    } else {
                        Err(RelayError::Reverted { hash })
                    };
                }
                Ok(None) => {}
                Err(err) => debug!(%hash, %err, "receipt poll failed"),
            }
            if Instant::now() >= deadline {
                return Err(RelayError::ConfirmationTimeout {
                    hash,
                    timeout_secs: self.confirm_timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.confirm_poll).await;
        }
    }
}
