pub mod hashmap;
pub mod slots;

pub use hashmap::HashMapStorageProvider;

use alloy::primitives::{Address, LogData, U256};

/// Host storage seam for the patron contracts.
///
/// All mutable shared state (balances, allowances, grants, nonces) lives
/// behind this trait; everything else in the crate is a pure function of its
/// inputs. Contract structs take an exclusive borrow of the provider, so
/// validate/post_op sequences touching the same keys are serialized by
/// construction on a single-threaded host. A concurrent host must supply
/// per-key serialization (or optimistic retry) underneath this trait.
pub trait StorageProvider {
    fn chain_id(&self) -> u64;

    /// Current block timestamp in seconds.
    fn timestamp(&self) -> u64;

    fn sstore(&mut self, address: Address, key: U256, value: U256);

    fn sload(&mut self, address: Address, key: U256) -> U256;

    fn emit_event(&mut self, address: Address, event: LogData);
}
