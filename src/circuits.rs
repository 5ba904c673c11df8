//! Circuit identifiers and proof payload types.

use std::fmt;

use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::error::ProofError;

/// The circuits this relay knows how to prove or verify.
///
/// Identifiers double as artifact file stems: `{name}.wasm`, `{name}.zkey`
/// and `{name}.vkey.json` under the configured key directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Circuit {
    /// Seals an epoch's accumulated leaf preimages into an ordered tree.
    BuildOrderedTree,
    /// A user's anonymous state transition between epochs.
    UserStateTransition,
    /// An epoch-key proof accompanying user content.
    EpochKey,
}

impl Circuit {
    pub const ALL: [Circuit; 3] = [
        Circuit::BuildOrderedTree,
        Circuit::UserStateTransition,
        Circuit::EpochKey,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Circuit::BuildOrderedTree => "buildOrderedTree",
            Circuit::UserStateTransition => "userStateTransition",
            Circuit::EpochKey => "epochKey",
        }
    }
}

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A Groth16 proof flattened into the 8-limb coordinate order the contract
/// takes: `[a.x, a.y, b.x1, b.x0, b.y1, b.y0, c.x, c.y]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof(pub [U256; 8]);

impl Proof {
    /// Parse a snarkjs/rapidsnark `proof.json` object.
    pub fn from_snark_json(value: &serde_json::Value) -> Result<Self, ProofError> {
        let field = |coords: &serde_json::Value, path: &str| -> Result<U256, ProofError> {
            coords
                .as_str()
                .and_then(|s| U256::from_dec_str(s).ok())
                .ok_or_else(|| ProofError::MalformedArtifact {
                    path: path.to_string(),
                    reason: "expected decimal field element".to_string(),
                })
        };
        let a = &value["pi_a"];
        let b = &value["pi_b"];
        let c = &value["pi_c"];
        Ok(Proof([
            field(&a[0], "pi_a[0]")?,
            field(&a[1], "pi_a[1]")?,
            field(&b[0][1], "pi_b[0][1]")?,
            field(&b[0][0], "pi_b[0][0]")?,
            field(&b[1][1], "pi_b[1][1]")?,
            field(&b[1][0], "pi_b[1][0]")?,
            field(&c[0], "pi_c[0]")?,
            field(&c[1], "pi_c[1]")?,
        ]))
    }

    /// Re-emit the snarkjs `proof.json` shape, the inverse of
    /// [`Proof::from_snark_json`]. The external verifier consumes this form.
    pub fn to_snark_json(&self) -> serde_json::Value {
        let p = &self.0;
        serde_json::json!({
            "pi_a": [p[0].to_string(), p[1].to_string(), "1"],
            "pi_b": [
                [p[3].to_string(), p[2].to_string()],
                [p[5].to_string(), p[4].to_string()],
                ["1", "0"],
            ],
            "pi_c": [p[6].to_string(), p[7].to_string(), "1"],
            "protocol": "groth16",
            "curve": "bn128",
        })
    }
}

/// A named circuit plus its structured inputs. Transient: lives only for the
/// duration of one proving call.
#[derive(Clone, Debug)]
pub struct ProofRequest {
    pub circuit: Circuit,
    pub inputs: serde_json::Value,
}

/// Output of a proving call, consumed exactly once by whoever submits it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofResult {
    pub public_signals: Vec<U256>,
    pub proof: Proof,
}

/// Parse a field element from a decimal or 0x-hex string.
pub fn parse_u256(s: &str) -> Option<U256> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        U256::from_str_radix(hex, 16).ok()
    } else {
        U256::from_dec_str(s).ok()
    }
}

/// Decode the `{publicSignals, proof}` wire representation used by inbound
/// requests: decimal or hex strings, proof exactly 8 limbs.
pub fn parse_payload(signals: &[String], proof: &[String]) -> Option<(Vec<U256>, Proof)> {
    let signals = signals
        .iter()
        .map(|s| parse_u256(s))
        .collect::<Option<Vec<_>>>()?;
    if proof.len() != 8 {
        return None;
    }
    let mut limbs = [U256::zero(); 8];
    for (limb, raw) in limbs.iter_mut().zip(proof) {
        *limb = parse_u256(raw)?;
    }
    Some((signals, Proof(limbs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snark_json_round_trips_through_flattened_form() {
        let raw = json!({
            "pi_a": ["12", "34", "1"],
            "pi_b": [["56", "78"], ["90", "11"], ["1", "0"]],
            "pi_c": ["13", "17", "1"],
            "protocol": "groth16",
            "curve": "bn128",
        });
        let proof = Proof::from_snark_json(&raw).unwrap();
        assert_eq!(
            proof.0,
            [
                U256::from(12),
                U256::from(34),
                U256::from(78),
                U256::from(56),
                U256::from(11),
                U256::from(90),
                U256::from(13),
                U256::from(17),
            ]
        );
        let reparsed = Proof::from_snark_json(&proof.to_snark_json()).unwrap();
        assert_eq!(reparsed, proof);
    }

    #[test]
    fn malformed_proof_json_is_rejected() {
        let raw = json!({ "pi_a": ["not a number"] });
        assert!(Proof::from_snark_json(&raw).is_err());
    }

    #[test]
    fn payload_accepts_decimal_and_hex() {
        let signals = vec!["42".to_string(), "0xff".to_string()];
        let proof: Vec<String> = (1..=8).map(|i| i.to_string()).collect();
        let (signals, proof) = parse_payload(&signals, &proof).unwrap();
        assert_eq!(signals, vec![U256::from(42), U256::from(255)]);
        assert_eq!(proof.0[7], U256::from(8));
    }

    #[test]
    fn payload_rejects_wrong_proof_arity() {
        let proof: Vec<String> = (1..=7).map(|i| i.to_string()).collect();
        assert!(parse_payload(&[], &proof).is_none());
    }
}
