//! Typed errors for the relay.

use ethers::types::TxHash;
use thiserror::Error;

/// Failures raised while driving the external proving system.
#[derive(Debug, Error)]
pub enum ProofError {
    #[error("failed to serialize circuit inputs: {0}")]
    InputSerialization(#[from] serde_json::Error),

    #[error("witness generation failed: {0}")]
    Witness(String),

    #[error("prover exited with status {status}: {stderr}")]
    ProverExit { status: i32, stderr: String },

    #[error("proving artifact missing: {0}")]
    MissingArtifact(String),

    #[error("malformed proving artifact {path}: {reason}")]
    MalformedArtifact { path: String, reason: String },

    #[error("no verification key for circuit {circuit}")]
    VerificationKeyNotFound { circuit: &'static str },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Top-level relay error taxonomy.
///
/// Everything except setup failures is recoverable: sealing errors are
/// contained within one daemon cycle and inbound errors within one request.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("synchronizer cannot reach the chain head: {0}")]
    SyncUnavailable(String),

    #[error(transparent)]
    Proof(#[from] ProofError),

    #[error("invalid proof")]
    InvalidProof,

    #[error("cannot build tree inputs: {0}")]
    TreeInputs(String),

    #[error("transaction submission failed: {0}")]
    Submission(String),

    #[error("transaction {hash} not confirmed within {timeout_secs}s")]
    ConfirmationTimeout { hash: TxHash, timeout_secs: u64 },

    #[error("transaction {hash} reverted")]
    Reverted { hash: TxHash },

    #[error("contract call failed: {0}")]
    Contract(String),

    #[error("failed to seal epoch {epoch}: {source}")]
    Seal {
        epoch: u64,
        #[source]
        source: Box<RelayError>,
    },
}

impl RelayError {
    /// Whether this error should be surfaced to an HTTP caller as a bad
    /// request rather than an internal failure.
    pub fn is_rejection(&self) -> bool {
        matches!(self, RelayError::InvalidProof)
    }
}
