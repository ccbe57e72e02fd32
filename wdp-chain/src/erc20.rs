//! ERC-20 `transfer` call encoding for single-mode withdrawals (spec §4.2).

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};

sol! {
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

/// Encodes an ERC-20 `transfer(to, amount)` call.
pub fn encode_transfer(to: Address, amount: U256) -> Bytes {
    IERC20::transferCall { to, amount }.abi_encode().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_call_starts_with_the_transfer_selector() {
        let data = encode_transfer(Address::ZERO, U256::from(1u64));
        assert_eq!(&data[..4], &IERC20::transferCall::SELECTOR);
    }
}
