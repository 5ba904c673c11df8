//! Proof generation and verification orchestration.
//!
//! Proving is delegated to external, architecture-specific binaries; this
//! layer marshals inputs and outputs and translates process failures into
//! typed errors. Every invocation gets its own scratch directory so an
//! in-flight sealing proof and a concurrently handled inbound proof cannot
//! clobber each other's intermediate files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::U256;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::circuits::{Circuit, Proof, ProofRequest, ProofResult};
use crate::error::ProofError;

/// Capability interface over the external proving system. Swappable for an
/// in-process prover (or a fake in tests) without touching the orchestrator.
#[async_trait]
pub trait ProvingBackend: Send + Sync {
    /// Produce a proof for `circuit` from `inputs`, using `scratch` for
    /// intermediate artifacts. `scratch` is unique per invocation.
    async fn prove(
        &self,
        circuit: Circuit,
        inputs: &serde_json::Value,
        scratch: &Path,
    ) -> Result<ProofResult, ProofError>;

    /// Check `proof` against `vkey` and `public_signals`.
    async fn verify(
        &self,
        vkey: &serde_json::Value,
        public_signals: &[U256],
        proof: &Proof,
    ) -> Result<bool, ProofError>;
}

/// Subprocess-driven Groth16 backend: a snarkjs-style witness calculator
/// followed by a rapidsnark-style prover, both resolved from the key
/// directory's per-circuit artifacts.
pub struct SnarkBackend {
    keys_dir: PathBuf,
    witness_bin: String,
    prover_bin: String,
    timeout: Duration,
}

impl SnarkBackend {
    pub fn new(
        keys_dir: PathBuf,
        witness_bin: String,
        prover_bin: String,
        timeout: Duration,
    ) -> Self {
        Self {
            keys_dir,
            witness_bin,
            prover_bin,
            timeout,
        }
    }

    fn artifact(&self, circuit: Circuit, ext: &str) -> Result<PathBuf, ProofError> {
        let path = self.keys_dir.join(format!("{}.{ext}", circuit.name()));
        if path.exists() {
            Ok(path)
        } else {
            Err(ProofError::MissingArtifact(path.display().to_string()))
        }
    }

    /// Run a subprocess under the configured timeout, killing it on expiry.
    async fn run(&self, bin: &str, args: &[&Path]) -> Result<Output, ProofError> {
        let mut cmd = Command::new(bin);
        cmd.args(args).kill_on_drop(true);
        debug!(bin, ?args, "spawning prover subprocess");
        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(output) => Ok(output?),
            Err(_) => Err(ProofError::ProverExit {
                status: -1,
                stderr: format!("{bin} timed out after {:?}", self.timeout),
            }),
        }
    }
}

#[async_trait]
impl ProvingBackend for SnarkBackend {
    async fn prove(
        &self,
        circuit: Circuit,
        inputs: &serde_json::Value,
        scratch: &Path,
    ) -> Result<ProofResult, ProofError> {
        let wasm = self.artifact(circuit, "wasm")?;
        let zkey = self.artifact(circuit, "zkey")?;

        let input_path = scratch.join("input.json");
        let witness_path = scratch.join("witness.wtns");
        let proof_path = scratch.join("proof.json");
        let signals_path = scratch.join("public.json");

        tokio::fs::write(&input_path, serde_json::to_vec(inputs)?).await?;

        let output = self
            .run(
                &self.witness_bin,
                &[
                    Path::new("wtns"),
                    Path::new("calculate"),
                    &wasm,
                    &input_path,
                    &witness_path,
                ],
            )
            .await?;
        if !output.status.success() {
            return Err(ProofError::Witness(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }

        let output = self
            .run(
                &self.prover_bin,
                &[&zkey, &witness_path, &proof_path, &signals_path],
            )
            .await?;
        if !output.status.success() {
            return Err(ProofError::ProverExit {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let proof = read_json(&proof_path).await?;
        let signals = read_json(&signals_path).await?;
        Ok(ProofResult {
            public_signals: parse_signals(&signals, &signals_path)?,
            proof: Proof::from_snark_json(&proof)?,
        })
    }

    async fn verify(
        &self,
        vkey: &serde_json::Value,
        public_signals: &[U256],
        proof: &Proof,
    ) -> Result<bool, ProofError> {
        let scratch = tempfile::tempdir()?;
        let vkey_path = scratch.path().join("vkey.json");
        let signals_path = scratch.path().join("public.json");
        let proof_path = scratch.path().join("proof.json");

        tokio::fs::write(&vkey_path, serde_json::to_vec(vkey)?).await?;
        let signals: Vec<String> = public_signals.iter().map(|s| s.to_string()).collect();
        tokio::fs::write(&signals_path, serde_json::to_vec(&signals)?).await?;
        tokio::fs::write(&proof_path, serde_json::to_vec(&proof.to_snark_json())?).await?;

        // The verifier exits non-zero when the proof does not check out.
        let output = self
            .run(
                &self.witness_bin,
                &[
                    Path::new("groth16"),
                    Path::new("verify"),
                    &vkey_path,
                    &signals_path,
                    &proof_path,
                ],
            )
            .await?;
        if !output.status.success() {
            debug!(
                stderr = %String::from_utf8_lossy(&output.stderr),
                "proof rejected by external verifier"
            );
        }
        Ok(output.status.success())
    }
}

async fn read_json(path: &Path) -> Result<serde_json::Value, ProofError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|_| ProofError::MissingArtifact(path.display().to_string()))?;
    serde_json::from_slice(&bytes).map_err(|err| ProofError::MalformedArtifact {
        path: path.display().to_string(),
        reason: err.to_string(),
    })
}

fn parse_signals(value: &serde_json::Value, path: &Path) -> Result<Vec<U256>, ProofError> {
    value
        .as_array()
        .and_then(|arr| {
            arr.iter()
                .map(|v| v.as_str().and_then(|s| U256::from_dec_str(s).ok()))
                .collect::<Option<Vec<_>>>()
        })
        .ok_or_else(|| ProofError::MalformedArtifact {
            path: path.display().to_string(),
            reason: "expected array of decimal field elements".to_string(),
        })
}

/// Turns proof requests into proofs and checks inbound proofs against their
/// per-circuit verification keys.
pub struct ProofOrchestrator {
    backend: Arc<dyn ProvingBackend>,
    keys_dir: Option<PathBuf>,
    vkeys: RwLock<HashMap<Circuit, Arc<serde_json::Value>>>,
}

impl ProofOrchestrator {
    pub fn new(backend: Arc<dyn ProvingBackend>, keys_dir: PathBuf) -> Self {
        Self {
            backend,
            keys_dir: Some(keys_dir),
            vkeys: RwLock::new(HashMap::new()),
        }
    }

    /// Construct with a fixed verification-key set and no key directory.
    /// Circuits absent from `keys` report `VerificationKeyNotFound`.
    pub fn with_static_keys(
        backend: Arc<dyn ProvingBackend>,
        keys: impl IntoIterator<Item = (Circuit, serde_json::Value)>,
    ) -> Self {
        let vkeys = keys
            .into_iter()
            .map(|(circuit, vkey)| (circuit, Arc::new(vkey)))
            .collect();
        Self {
            backend,
            keys_dir: None,
            vkeys: RwLock::new(vkeys),
        }
    }

    /// Eagerly load every known circuit's verification key, returning how
    /// many were found. Individual missing keys are tolerated here; the
    /// caller decides whether zero keys is fatal.
    pub async fn preload_keys(&self) -> Result<usize, ProofError> {
        let mut loaded = 0;
        for circuit in Circuit::ALL {
            match self.vkey(circuit).await {
                Ok(_) => loaded += 1,
                Err(ProofError::VerificationKeyNotFound { .. }) => {
                    warn!(%circuit, "verification key not found, circuit disabled");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(loaded)
    }

    async fn vkey(&self, circuit: Circuit) -> Result<Arc<serde_json::Value>, ProofError> {
        if let Some(vkey) = self.vkeys.read().await.get(&circuit) {
            return Ok(vkey.clone());
        }
        let Some(keys_dir) = &self.keys_dir else {
            return Err(ProofError::VerificationKeyNotFound {
                circuit: circuit.name(),
            });
        };
        let path = keys_dir.join(format!("{}.vkey.json", circuit.name()));
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|_| ProofError::VerificationKeyNotFound {
                circuit: circuit.name(),
            })?;
        let vkey: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|err| ProofError::MalformedArtifact {
                path: path.display().to_string(),
                reason: err.to_string(),
            })?;
        let vkey = Arc::new(vkey);
        self.vkeys.write().await.insert(circuit, vkey.clone());
        Ok(vkey)
    }

    /// Generate a proof inside a per-invocation scratch directory, removed
    /// when the call returns.
    pub async fn generate(&self, request: ProofRequest) -> Result<ProofResult, ProofError> {
        let scratch = tempfile::tempdir()?;
        debug!(circuit = %request.circuit, scratch = %scratch.path().display(), "generating proof");
        self.backend
            .prove(request.circuit, &request.inputs, scratch.path())
            .await
    }

    /// Verify a proof against the circuit's verification key. Pure aside
    /// from the first key load, which is cached.
    pub async fn verify(
        &self,
        circuit: Circuit,
        public_signals: &[U256],
        proof: &Proof,
    ) -> Result<bool, ProofError> {
        let vkey = self.vkey(circuit).await?;
        self.backend.verify(&vkey, public_signals, proof).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;
    use serde_json::json;

    #[tokio::test]
    async fn missing_vkey_is_a_typed_error() {
        let orchestrator =
            ProofOrchestrator::with_static_keys(Arc::new(FakeBackend::default()), []);
        let err = orchestrator
            .verify(Circuit::EpochKey, &[], &Proof([U256::zero(); 8]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProofError::VerificationKeyNotFound { circuit: "epochKey" }
        ));
    }

    #[tokio::test]
    async fn generated_proofs_verify_against_their_signals() {
        let backend = Arc::new(FakeBackend::default());
        let orchestrator = ProofOrchestrator::with_static_keys(
            backend,
            [(Circuit::BuildOrderedTree, json!({}))],
        );
        let result = orchestrator
            .generate(ProofRequest {
                circuit: Circuit::BuildOrderedTree,
                inputs: json!({ "leaf_count": 3 }),
            })
            .await
            .unwrap();
        assert!(orchestrator
            .verify(
                Circuit::BuildOrderedTree,
                &result.public_signals,
                &result.proof
            )
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn identical_inputs_produce_identical_proofs() {
        let backend = Arc::new(FakeBackend::default());
        let orchestrator = ProofOrchestrator::with_static_keys(
            backend,
            [(Circuit::BuildOrderedTree, json!({}))],
        );
        let request = ProofRequest {
            circuit: Circuit::BuildOrderedTree,
            inputs: json!({ "sorted_leaf_preimages": ["1", "2"] }),
        };
        let a = orchestrator.generate(request.clone()).await.unwrap();
        let b = orchestrator.generate(request).await.unwrap();
        assert_eq!(a, b);
    }
}
