//! Relay configuration.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use ethers::types::U256;

use crate::circuits::parse_u256;

/// Relay configuration, loaded from the environment.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// JSON-RPC endpoint of the target chain.
    pub rpc_url: String,
    /// Address of the reputation contract.
    pub contract_address: String,
    /// Relayer private key for signing transactions.
    pub relayer_private_key: String,
    /// Attester identity epochs are sealed for. Defaults to the relayer
    /// address when unset.
    pub attester_id: Option<U256>,
    /// Directory holding per-circuit proving artifacts and verification keys.
    pub keys_dir: PathBuf,
    /// Witness calculator / verifier binary.
    pub witness_bin: String,
    /// Proving binary.
    pub prover_bin: String,
    /// Address the HTTP payload boundary binds to.
    pub bind_addr: String,
    /// Seconds between epoch scan cycles.
    pub sync_interval: Duration,
    /// Ceiling on one external proving invocation.
    pub prove_timeout: Duration,
    /// Ceiling on one transaction confirmation wait.
    pub confirm_timeout: Duration,
    /// Receipt polling interval inside the confirmation wait.
    pub confirm_poll: Duration,
    /// Attempts before the synchronizer reports the chain head unreachable.
    pub sync_retry_attempts: u32,
    /// Delay between those attempts.
    pub sync_retry_delay: Duration,
    /// Leaf capacity of the ordered epoch tree.
    pub tree_capacity: usize,
}

impl RelayConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let rpc_url = env::var("CANON_RPC_URL").context("CANON_RPC_URL must be set")?;
        let contract_address =
            env::var("CANON_CONTRACT_ADDRESS").context("CANON_CONTRACT_ADDRESS must be set")?;
        let relayer_private_key = env::var("CANON_RELAYER_PRIVATE_KEY")
            .context("CANON_RELAYER_PRIVATE_KEY must be set")?;

        let attester_id = match env::var("CANON_ATTESTER_ID") {
            Ok(raw) => Some(
                parse_u256(&raw)
                    .with_context(|| format!("CANON_ATTESTER_ID '{raw}' is not a field element"))?,
            ),
            Err(_) => None,
        };

        let keys_dir = PathBuf::from(env::var("CANON_KEYS_DIR").unwrap_or_else(|_| "keys".into()));
        let witness_bin = env::var("CANON_WITNESS_BIN").unwrap_or_else(|_| "snarkjs".into());
        let prover_bin = env::var("CANON_PROVER_BIN").unwrap_or_else(|_| "rapidsnark".into());
        let bind_addr = env::var("CANON_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".into());

        Ok(Self {
            rpc_url,
            contract_address,
            relayer_private_key,
            attester_id,
            keys_dir,
            witness_bin,
            prover_bin,
            bind_addr,
            sync_interval: Duration::from_secs(env_u64("CANON_SYNC_INTERVAL_SECS", 10)),
            prove_timeout: Duration::from_secs(env_u64("CANON_PROVE_TIMEOUT_SECS", 300)),
            confirm_timeout: Duration::from_secs(env_u64("CANON_CONFIRM_TIMEOUT_SECS", 120)),
            confirm_poll: Duration::from_millis(env_u64("CANON_CONFIRM_POLL_MS", 2000)),
            sync_retry_attempts: env_u64("CANON_SYNC_RETRY_ATTEMPTS", 30) as u32,
            sync_retry_delay: Duration::from_millis(env_u64("CANON_SYNC_RETRY_DELAY_MS", 1000)),
            tree_capacity: env_u64("CANON_TREE_CAPACITY", 128) as usize,
        })
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_u64_falls_back_on_missing_or_garbage() {
        assert_eq!(env_u64("CANON_TEST_UNSET_VAR", 17), 17);
        env::set_var("CANON_TEST_GARBAGE_VAR", "not a number");
        assert_eq!(env_u64("CANON_TEST_GARBAGE_VAR", 17), 17);
        env::remove_var("CANON_TEST_GARBAGE_VAR");
    }
}
