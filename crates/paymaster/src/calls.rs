//! Call envelope unwrapping for session-key scoping.
//!
//! Produces authorization metadata only; nothing here resolves or executes
//! a call. One level of the generic `execute(address,uint256,bytes)` wrapper
//! is understood; anything else degrades to a null target plus the outer
//! selector, leaving the caller to supply the target by other means.

use alloy::{
    primitives::{Address, FixedBytes},
    sol_types::SolCall,
};
use patron_contracts::IAccountExecute;

/// Selector of the `execute(address,uint256,bytes)` account wrapper.
pub const EXECUTE_SELECTOR: [u8; 4] = IAccountExecute::executeCall::SELECTOR;

/// Effective (target, selector) pair extracted from an opaque encoded call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodedCall {
    pub target: Address,
    pub selector: FixedBytes<4>,
}

/// Peel one `execute` wrapping off `call_data`. On a well-formed wrapper the
/// result is the inner target and the inner call's selector (zero if the
/// inner call is shorter than four bytes); otherwise the target is null and
/// the selector is the outer four bytes.
pub fn unwrap_execute(call_data: &[u8]) -> DecodedCall {
    let outer = leading_selector(call_data);
    if outer.as_slice() == EXECUTE_SELECTOR {
        if let Ok(call) = IAccountExecute::executeCall::abi_decode(call_data) {
            return DecodedCall {
                target: call.target,
                selector: leading_selector(&call.data),
            };
        }
    }
    DecodedCall {
        target: Address::ZERO,
        selector: outer,
    }
}

fn leading_selector(data: &[u8]) -> FixedBytes<4> {
    if data.len() < 4 {
        FixedBytes::ZERO
    } else {
        FixedBytes::from_slice(&data[..4])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Bytes, U256};

    fn encode_execute(target: Address, value: U256, data: Bytes) -> Vec<u8> {
        IAccountExecute::executeCall {
            target,
            value,
            data,
        }
        .abi_encode()
    }

    #[test]
    fn test_unwraps_execute_envelope() {
        let target = Address::from([0x42; 20]);
        let inner = Bytes::from(vec![0xaa, 0xbb, 0xcc, 0xdd, 0x01, 0x02]);
        let call_data = encode_execute(target, U256::ZERO, inner);

        let decoded = unwrap_execute(&call_data);
        assert_eq!(decoded.target, target);
        assert_eq!(decoded.selector, FixedBytes::from([0xaa, 0xbb, 0xcc, 0xdd]));
    }

    #[test]
    fn test_empty_inner_call_yields_zero_selector() {
        let target = Address::from([0x42; 20]);
        let call_data = encode_execute(target, U256::from(5), Bytes::new());

        let decoded = unwrap_execute(&call_data);
        assert_eq!(decoded.target, target);
        assert_eq!(decoded.selector, FixedBytes::ZERO);
    }

    #[test]
    fn test_non_execute_call_falls_back_to_outer_selector() {
        let call_data = [0x11, 0x22, 0x33, 0x44, 0xff, 0xff];

        let decoded = unwrap_execute(&call_data);
        assert_eq!(decoded.target, Address::ZERO);
        assert_eq!(decoded.selector, FixedBytes::from([0x11, 0x22, 0x33, 0x44]));
    }

    #[test]
    fn test_truncated_execute_payload_falls_back() {
        // right selector, garbage tail that cannot abi-decode
        let mut call_data = EXECUTE_SELECTOR.to_vec();
        call_data.extend_from_slice(&[0x00; 7]);

        let decoded = unwrap_execute(&call_data);
        assert_eq!(decoded.target, Address::ZERO);
        assert_eq!(decoded.selector, FixedBytes::from(EXECUTE_SELECTOR));
    }

    #[test]
    fn test_short_input_yields_zero_pair() {
        let decoded = unwrap_execute(&[0x01, 0x02]);
        assert_eq!(decoded.target, Address::ZERO);
        assert_eq!(decoded.selector, FixedBytes::ZERO);
    }
}
