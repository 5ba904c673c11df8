//! Canonical ordered-tree input construction.
//!
//! Sealing commits an epoch's leaf preimages as an ordered tree. Two
//! independent sealers must derive equivalent proofs from the same preimage
//! set, so the construction here depends only on the multiset of preimages,
//! never on accumulation order.

use ethers::types::U256;
use once_cell::sync::Lazy;
use serde_json::json;

use crate::error::RelayError;

/// BN254 scalar field modulus. Preimages are field elements and must be
/// strictly below this.
pub static FIELD_MODULUS: Lazy<U256> = Lazy::new(|| {
    U256::from_dec_str(
        "21888242871839275222246405745257275088548364400416034343698204186575808495617",
    )
    .expect("field modulus literal")
});

/// Build the `buildOrderedTree` circuit inputs for one epoch.
///
/// Preimages are validated against the field, sorted ascending, deduplicated
/// and padded with the max-field sentinel up to `capacity`, so the circuit
/// sees a strictly increasing leaf sequence.
pub fn build_ordered_tree_inputs(
    preimages: &[U256],
    capacity: usize,
) -> Result<serde_json::Value, RelayError> {
    for p in preimages {
        if *p >= *FIELD_MODULUS {
            return Err(RelayError::TreeInputs(format!(
                "preimage {p} is not a field element"
            )));
        }
    }

    let mut sorted: Vec<U256> = preimages.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let leaf_count = sorted.len();
    if leaf_count > capacity {
        return Err(RelayError::TreeInputs(format!(
            "{leaf_count} distinct preimages exceed tree capacity {capacity}"
        )));
    }

    let sentinel = *FIELD_MODULUS - U256::one();
    sorted.resize(capacity, sentinel);

    Ok(json!({
        "sorted_leaf_preimages": sorted.iter().map(|p| p.to_string()).collect::<Vec<_>>(),
        "leaf_count": leaf_count,
    }))
}
