use std::collections::HashMap;

use alloy::primitives::{Address, LogData, U256};

use crate::storage::StorageProvider;

/// In-memory storage provider with a settable clock and recorded events.
/// Backs the test suites; real hosts implement [`StorageProvider`] over
/// their own state.
#[derive(Debug)]
pub struct HashMapStorageProvider {
    internals: HashMap<(Address, U256), U256>,
    pub events: HashMap<Address, Vec<LogData>>,
    chain_id: u64,
    timestamp: u64,
}

impl HashMapStorageProvider {
    pub fn new(chain_id: u64) -> Self {
        Self {
            internals: HashMap::new(),
            events: HashMap::new(),
            chain_id,
            // arbitrary fixed epoch so grant windows are expressible
            timestamp: 1_700_000_000,
        }
    }

    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }

    pub fn advance_time(&mut self, secs: u64) {
        self.timestamp += secs;
    }

    pub fn events_for(&self, address: Address) -> &[LogData] {
        self.events.get(&address).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl StorageProvider for HashMapStorageProvider {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn sstore(&mut self, address: Address, key: U256, value: U256) {
        self.internals.insert((address, key), value);
    }

    fn sload(&mut self, address: Address, key: U256) -> U256 {
        self.internals
            .get(&(address, key))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    fn emit_event(&mut self, address: Address, event: LogData) {
        self.events.entry(address).or_default().push(event);
    }
}
