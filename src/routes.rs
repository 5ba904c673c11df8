//! Inbound proof handlers and their HTTP payload contract.
//!
//! Unlike the sealing path, handlers return the broadcast hash immediately
//! and never wait for confirmation; the caller polls if it cares. An invalid
//! proof is rejected before anything touches the transaction queue.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ethers::types::{Address, TxHash, U256};
use ethers::utils::keccak256;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::circuits::{parse_payload, Circuit};
use crate::contract;
use crate::error::RelayError;
use crate::prover::ProofOrchestrator;
use crate::tree::FIELD_MODULUS;
use crate::txqueue::TransactionQueue;

/// Index of the data field in the epoch-key circuit's public signals; content
/// submissions must bind their content digest there.
const EPOCH_KEY_DATA_SIGNAL: usize = 3;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ProofOrchestrator>,
    pub queue: Arc<dyn TransactionQueue>,
    pub contract: Address,
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/transition", post(transition))
        .route("/api/action", post(action))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    pub public_signals: Vec<String>,
    pub proof: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub public_signals: Vec<String>,
    pub proof: Vec<String>,
    pub content: String,
}

async fn healthz() -> &'static str {
    "ok"
}

async fn transition(
    State(state): State<AppState>,
    Json(request): Json<TransitionRequest>,
) -> Response {
    respond(relay_transition(&state, request).await)
}

async fn action(State(state): State<AppState>, Json(request): Json<ActionRequest>) -> Response {
    respond(relay_action(&state, request).await)
}

/// Verify a user state-transition proof and relay it on-chain.
pub async fn relay_transition(
    state: &AppState,
    request: TransitionRequest,
) -> Result<TxHash, RelayError> {
    let (signals, proof) = parse_payload(&request.public_signals, &request.proof)
        .ok_or(RelayError::InvalidProof)?;
    if !state
        .orchestrator
        .verify(Circuit::UserStateTransition, &signals, &proof)
        .await?
    {
        return Err(RelayError::InvalidProof);
    }
    let calldata = contract::encode_user_state_transition(&signals, &proof);
    let hash = state.queue.enqueue(state.contract, calldata).await?;
    info!(%hash, "state transition relayed");
    Ok(hash)
}

/// Verify a content-attached epoch-key proof and relay it on-chain. The
/// content digest must match the proof's data signal, so a tampered content
/// field fails exactly like an invalid proof.
pub async fn relay_action(state: &AppState, request: ActionRequest) -> Result<TxHash, RelayError> {
    let (signals, proof) = parse_payload(&request.public_signals, &request.proof)
        .ok_or(RelayError::InvalidProof)?;
    let bound = signals
        .get(EPOCH_KEY_DATA_SIGNAL)
        .ok_or(RelayError::InvalidProof)?;
    if *bound != content_digest(&request.content) {
        warn!("content digest does not match proof data signal");
        return Err(RelayError::InvalidProof);
    }
    if !state
        .orchestrator
        .verify(Circuit::EpochKey, &signals, &proof)
        .await?
    {
        return Err(RelayError::InvalidProof);
    }
    let calldata = contract::encode_submit_attestation(&signals, &proof, &request.content);
    let hash = state.queue.enqueue(state.contract, calldata).await?;
    info!(%hash, "content attestation relayed");
    Ok(hash)
}

/// keccak256 of the raw content, reduced into the scalar field so it can sit
/// in a public signal.
pub fn content_digest(content: &str) -> U256 {
    U256::from_big_endian(&keccak256(content.as_bytes())) % *FIELD_MODULUS
}

fn respond(result: Result<TxHash, RelayError>) -> Response {
    match result {
        Ok(hash) => Json(json!({ "hash": hash })).into_response(),
        Err(err) if err.is_rejection() => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid proof" })),
        )
            .into_response(),
        Err(err) => {
            warn!(%err, "inbound relay failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}
