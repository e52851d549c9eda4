//! Price oracle boundary for the token paymaster.

use std::collections::HashMap;

use alloy::primitives::{Address, U256};

/// Conversion between base-asset cost and token amounts. Consumed by the
/// token paymaster; lookups must be pure reads with no side effects, since
/// validation and settlement may query different rates.
pub trait PriceOracle {
    /// Token units required to cover `cost` base-asset units, before markup.
    fn token_amount_for_cost(&self, token: Address, cost: U256) -> U256;

    /// Base-asset value of `amount` token units.
    fn cost_for_token_amount(&self, token: Address, amount: U256) -> U256;

    fn is_supported(&self, token: Address) -> bool;
}

/// Oracle with one fixed `numerator / denominator` rate per token. Used by
/// the test suites and suitable for stable-pair deployments.
#[derive(Debug, Default)]
pub struct FixedRateOracle {
    rates: HashMap<Address, (U256, U256)>,
}

impl FixedRateOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `token` at `numerator / denominator` token units per
    /// base-asset unit.
    pub fn with_rate(mut self, token: Address, numerator: u64, denominator: u64) -> Self {
        self.rates
            .insert(token, (U256::from(numerator), U256::from(denominator)));
        self
    }
}

impl PriceOracle for FixedRateOracle {
    fn token_amount_for_cost(&self, token: Address, cost: U256) -> U256 {
        match self.rates.get(&token) {
            Some((num, den)) => cost * num / den,
            None => U256::ZERO,
        }
    }

    fn cost_for_token_amount(&self, token: Address, amount: U256) -> U256 {
        match self.rates.get(&token) {
            Some((num, den)) if !num.is_zero() => amount * den / num,
            _ => U256::ZERO,
        }
    }

    fn is_supported(&self, token: Address) -> bool {
        self.rates.contains_key(&token)
    }
}
