//! canon-relay
//!
//! Relay service for a group-scoped anonymous-reputation protocol.
//!
//! Architecture:
//! 1. The epoch sync daemon watches chain state for ended, unsealed epochs
//! 2. Each unsealed epoch is proven and sealed through the transaction queue
//! 3. Inbound user proofs are verified and relayed through the same queue
//! 4. All durable truth lives on-chain; the process is restart-safe

pub mod circuits;
pub mod config;
pub mod contract;
pub mod daemon;
pub mod error;
pub mod prover;
pub mod routes;
pub mod synchronizer;
pub mod testing;
pub mod tree;
pub mod txqueue;

pub use circuits::{Circuit, Proof, ProofRequest, ProofResult};
pub use config::RelayConfig;
pub use daemon::{EpochSyncDaemon, SealTarget};
pub use error::{ProofError, RelayError};
pub use prover::{ProofOrchestrator, ProvingBackend, SnarkBackend};
pub use routes::{app_router, AppState};
pub use synchronizer::{ChainSynchronizer, EthSynchronizer};
pub use txqueue::{EthTransactionQueue, TransactionQueue};
