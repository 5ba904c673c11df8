//! Bindings and calldata encoding for the reputation contract.

use ethers::abi::AbiEncode;
use ethers::prelude::abigen;
use ethers::types::{Bytes, U256};

use crate::circuits::{Proof, ProofResult};

abigen!(
    CanonContract,
    r#"[
        event EpochPreimage(uint160 indexed attesterId, uint256 indexed epoch, uint256 preimage)
        function sealEpoch(uint256 epoch, uint160 attesterId, uint256[] publicSignals, uint256[8] proof)
        function userStateTransition(uint256[] publicSignals, uint256[8] proof)
        function submitAttestation(uint256[] publicSignals, uint256[8] proof, string content)
        function attesterEpochSealed(uint160 attesterId, uint256 epoch) view returns (bool)
        function attesterStartTimestamp(uint160 attesterId) view returns (uint256)
        function attesterEpochLength(uint160 attesterId) view returns (uint256)
    ]"#
);

pub fn encode_seal_epoch(epoch: u64, attester_id: U256, result: &ProofResult) -> Bytes {
    SealEpochCall {
        epoch: U256::from(epoch),
        attester_id,
        public_signals: result.public_signals.clone(),
        proof: result.proof.0,
    }
    .encode()
    .into()
}

pub fn encode_user_state_transition(public_signals: &[U256], proof: &Proof) -> Bytes {
    UserStateTransitionCall {
        public_signals: public_signals.to_vec(),
        proof: proof.0,
    }
    .encode()
    .into()
}

pub fn encode_submit_attestation(public_signals: &[U256], proof: &Proof, content: &str) -> Bytes {
    SubmitAttestationCall {
        public_signals: public_signals.to_vec(),
        proof: proof.0,
        content: content.to_string(),
    }
    .encode()
    .into()
}
