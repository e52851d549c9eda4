//! Dispatcher reserve boundary.
//!
//! The dispatcher holds each paymaster's actual gas reserve (deposit plus
//! optional stake). That accounting is entirely separate from the sponsor
//! balances inside the ledgers; the paymasters only forward admin-gated
//! reserve management through this trait. The ABI shape of the real
//! dispatcher lives in `patron_contracts::IEntryPoint`.

use alloy::primitives::{Address, U256};
use std::collections::HashMap;

/// Reserve snapshot mirroring `IEntryPoint.DepositInfo`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepositInfo {
    pub deposit: U256,
    pub stake: U256,
    pub unstake_delay_secs: u32,
    pub withdraw_time: u64,
}

/// Host-side handle to the dispatcher's deposit/stake bookkeeping.
pub trait EntryPointReserve {
    fn balance_of(&self, account: Address) -> U256;

    fn deposit_to(&mut self, account: Address, amount: U256);

    /// Move `amount` of `from`'s deposit out to `to`. Returns false when the
    /// deposit is insufficient.
    fn withdraw_to(&mut self, from: Address, to: Address, amount: U256) -> bool;

    fn add_stake(&mut self, account: Address, amount: U256, unstake_delay_secs: u32);

    fn unlock_stake(&mut self, account: Address);

    fn withdraw_stake(&mut self, account: Address, to: Address);

    fn get_deposit_info(&self, account: Address) -> DepositInfo;
}

/// In-memory dispatcher reserve for tests and local hosts.
#[derive(Debug, Default)]
pub struct MockEntryPoint {
    deposits: HashMap<Address, U256>,
    stakes: HashMap<Address, (U256, u32, u64)>,
    unlocked: HashMap<Address, bool>,
    pub withdrawals: Vec<(Address, Address, U256)>,
}

impl MockEntryPoint {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntryPointReserve for MockEntryPoint {
    fn balance_of(&self, account: Address) -> U256 {
        self.deposits.get(&account).copied().unwrap_or(U256::ZERO)
    }

    fn deposit_to(&mut self, account: Address, amount: U256) {
        *self.deposits.entry(account).or_insert(U256::ZERO) += amount;
    }

    fn withdraw_to(&mut self, from: Address, to: Address, amount: U256) -> bool {
        let balance = self.balance_of(from);
        if balance < amount {
            return false;
        }
        self.deposits.insert(from, balance - amount);
        self.withdrawals.push((from, to, amount));
        true
    }

    fn add_stake(&mut self, account: Address, amount: U256, unstake_delay_secs: u32) {
        let entry = self
            .stakes
            .entry(account)
            .or_insert((U256::ZERO, unstake_delay_secs, 0));
        entry.0 += amount;
        entry.1 = unstake_delay_secs;
        self.unlocked.insert(account, false);
    }

    fn unlock_stake(&mut self, account: Address) {
        self.unlocked.insert(account, true);
    }

    fn withdraw_stake(&mut self, account: Address, to: Address) {
        if let Some((stake, _, _)) = self.stakes.remove(&account) {
            self.withdrawals.push((account, to, stake));
        }
    }

    fn get_deposit_info(&self, account: Address) -> DepositInfo {
        let (stake, unstake_delay_secs, withdraw_time) = self
            .stakes
            .get(&account)
            .copied()
            .unwrap_or((U256::ZERO, 0, 0));
        DepositInfo {
            deposit: self.balance_of(account),
            stake,
            unstake_delay_secs,
            withdraw_time,
        }
    }
}
