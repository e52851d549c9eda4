//! Solidity-compatible storage slot math.

use alloy::primitives::{keccak256, Address, B256, U256};

pub const fn to_u256(slot: u64) -> U256 {
    U256::from_limbs([slot, 0, 0, 0])
}

/// Compute the storage slot for `mapping[key]` rooted at `base_slot`.
pub fn mapping_slot<T: AsRef<[u8]>>(key: T, base_slot: U256) -> U256 {
    let mut data = Vec::with_capacity(key.as_ref().len() + 32);
    data.extend_from_slice(key.as_ref());
    data.extend_from_slice(&base_slot.to_be_bytes::<32>());
    U256::from_be_bytes(keccak256(&data).0)
}

/// Compute the storage slot for `mapping[key1][key2]` rooted at `base_slot`.
pub fn double_mapping_slot<T: AsRef<[u8]>, U: AsRef<[u8]>>(
    key1: T,
    key2: U,
    base_slot: U256,
) -> U256 {
    let intermediate = mapping_slot(key1, base_slot);
    mapping_slot(key2, intermediate)
}

/// Collapse an address pair into one mapping key, for state keyed by three
/// values without triple nesting.
pub fn pair_key(a: Address, b: Address) -> B256 {
    let mut data = [0u8; 40];
    data[..20].copy_from_slice(a.as_slice());
    data[20..].copy_from_slice(b.as_slice());
    keccak256(data)
}

pub fn address_to_word(address: Address) -> U256 {
    U256::from_be_slice(address.as_slice())
}

pub fn word_to_address(word: U256) -> Address {
    Address::from_slice(&word.to_be_bytes::<32>()[12..])
}
