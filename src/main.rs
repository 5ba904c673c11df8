use std::sync::Arc;

use anyhow::Context;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, U256};
use tracing::{error, info};

use canon_relay::daemon::{EpochSyncDaemon, SealTarget};
use canon_relay::prover::{ProofOrchestrator, SnarkBackend};
use canon_relay::routes::{app_router, AppState};
use canon_relay::synchronizer::EthSynchronizer;
use canon_relay::txqueue::EthTransactionQueue;
use canon_relay::RelayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "canon_relay=info".into()),
        )
        .init();

    dotenvy::dotenv().ok();
    let config = RelayConfig::from_env()?;

    info!("starting canon-relay");
    info!("rpc endpoint: {}", config.rpc_url);
    info!("contract: {}", config.contract_address);

    // Everything below is setup: failures here are fatal, since a relay that
    // cannot reach the chain or load keys would silently no-op forever.
    let provider = Arc::new(
        Provider::<Http>::try_from(config.rpc_url.as_str()).context("invalid rpc url")?,
    );
    let chain_id = provider
        .get_chainid()
        .await
        .context("cannot reach the chain")?;
    let wallet: LocalWallet = config
        .relayer_private_key
        .parse::<LocalWallet>()
        .context("invalid relayer private key")?
        .with_chain_id(chain_id.as_u64());
    let contract_address: Address = config
        .contract_address
        .parse()
        .context("invalid contract address")?;
    let attester_id = config
        .attester_id
        .unwrap_or_else(|| U256::from_big_endian(wallet.address().as_bytes()));
    info!("attester id: {attester_id:#x}");

    let synchronizer = Arc::new(
        EthSynchronizer::connect(
            provider.clone(),
            contract_address,
            attester_id,
            config.sync_retry_attempts,
            config.sync_retry_delay,
        )
        .await
        .context("cannot read attester config from contract")?,
    );

    let backend = Arc::new(SnarkBackend::new(
        config.keys_dir.clone(),
        config.witness_bin.clone(),
        config.prover_bin.clone(),
        config.prove_timeout,
    ));
    let orchestrator = Arc::new(ProofOrchestrator::new(backend, config.keys_dir.clone()));
    let loaded = orchestrator
        .preload_keys()
        .await
        .context("cannot load verification keys")?;
    if loaded == 0 {
        anyhow::bail!(
            "no verification keys found under {}",
            config.keys_dir.display()
        );
    }
    info!("loaded {loaded} verification keys");

    let queue = Arc::new(
        EthTransactionQueue::new(
            provider.clone(),
            wallet,
            config.confirm_timeout,
            config.confirm_poll,
        )
        .await
        .context("cannot initialize transaction queue")?,
    );

    let daemon = EpochSyncDaemon::new(
        synchronizer,
        orchestrator.clone(),
        queue.clone(),
        SealTarget {
            contract: contract_address,
            attester_id,
        },
        config.sync_interval,
        config.tree_capacity,
    );
    let daemon_handle = tokio::spawn(daemon.run());

    let state = AppState {
        orchestrator,
        queue,
        contract: contract_address,
    };
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("cannot bind {}", config.bind_addr))?;
    info!("listening on {}", config.bind_addr);
    let server_handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app_router(state)).await {
            error!("http server error: {err}");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down relay...");

    daemon_handle.abort();
    server_handle.abort();

    Ok(())
}
