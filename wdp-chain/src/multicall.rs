//! Multicall3-style batch encoding for the Signing Worker's BATCH mode
//! (spec §4.2). Assumes the aggregator contract already holds transfer
//! allowance for every batched token (SPEC_FULL.md §11 open-question
//! resolution: allowance pre-provisioning is out of scope here).

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};

sol! {
    interface IMulticall3 {
        struct Call3Value {
            address target;
            bool allowFailure;
            uint256 value;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3Value(Call3Value[] calldata calls) external payable returns (Result[] memory returnData);
    }
}

/// One constituent call folded into a multicall batch.
pub struct BatchCall {
    pub target: Address,
    pub call_data: Bytes,
    pub value: U256,
    /// If false, the whole multicall reverts when this call fails, which is
    /// what we want: a withdrawal request must not silently drop out of a
    /// batch (spec §4.2 batching invariant).
    pub allow_failure: bool,
}

/// Encodes `calls` as a single `aggregate3Value` invocation.
pub fn encode_batch(calls: Vec<BatchCall>) -> Bytes {
    let calls = calls
        .into_iter()
        .map(|c| IMulticall3::Call3Value {
            target: c.target,
            allowFailure: c.allow_failure,
            value: c.value,
            callData: c.call_data,
        })
        .collect();
    IMulticall3::aggregate3ValueCall { calls }
        .abi_encode()
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::erc20::encode_transfer;

    #[test]
    fn encodes_multiple_calls_into_one_payload() {
        let calls = vec![
            BatchCall {
                target: Address::ZERO,
                call_data: encode_transfer(Address::ZERO, U256::from(1u64)),
                value: U256::ZERO,
                allow_failure: false,
            },
            BatchCall {
                target: Address::ZERO,
                call_data: encode_transfer(Address::ZERO, U256::from(2u64)),
                value: U256::ZERO,
                allow_failure: false,
            },
        ];
        let encoded = encode_batch(calls);
        assert_eq!(&encoded[..4], &IMulticall3::aggregate3ValueCall::SELECTOR);
    }
}
