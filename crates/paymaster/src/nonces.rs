//! Monotonic replay counters.
//!
//! A signed message always commits to the counter value *before* increment:
//! callers read the current value into the struct hash, verify the
//! signature, then call [`consume`], which returns that same pre-increment
//! value and bumps the slot. The crate keeps three disjoint counter spaces
//! registry registration nonces, per-grant usage nonces, and one
//! charge-authorization mapping per ledger) which never share slots even
//! when they apply to the same session key.

use alloy::primitives::{Address, U256};

use crate::{error::PatronError, storage::StorageProvider, Result};

pub fn load<S: StorageProvider>(storage: &mut S, contract: Address, slot: U256) -> u64 {
    storage.sload(contract, slot).saturating_to::<u64>()
}

/// Read-then-increment: returns the value the current signature was checked
/// against and advances the counter.
pub fn consume<S: StorageProvider>(storage: &mut S, contract: Address, slot: U256) -> Result<u64> {
    let current = load(storage, contract, slot);
    let next = current
        .checked_add(1)
        .ok_or_else(|| PatronError::Fatal("nonce counter overflow".into()))?;
    storage.sstore(contract, slot, U256::from(next));
    Ok(current)
}
