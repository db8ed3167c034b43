//! Gas accounting for the scored address.
//!
//! Only non-duplicate, primary-chain transactions sent by the address accrue.
//! The per-transaction cost is `(gasPrice/1e18 + cumulativeGasUsed/1e18) * gasUsed`,
//! kept exactly as the scoring rules have always computed it even though it mixes
//! a per-block cumulative total into a per-transaction price.

use crate::types::Transaction;
use crate::utils::helpers::{same_address, BASE_UNITS_PER_TOKEN};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GasAccountant {
    total: f64,
}

impl GasAccountant {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cost attributed to one transaction, in whole-token units.
    pub fn fee_for(tx: &Transaction) -> f64 {
        (tx.gas_price_raw() / BASE_UNITS_PER_TOKEN
            + tx.cumulative_gas_used_raw() / BASE_UNITS_PER_TOKEN)
            * tx.gas_used_raw()
    }

    /// Whether `tx` counts toward the address's gas spend.
    pub fn is_accountable(tx: &Transaction, owner: &str, is_duplicate: bool) -> bool {
        !is_duplicate && tx.is_primary_chain() && same_address(owner, &tx.from)
    }

    /// Adds the fee of `tx` when it is accountable. Returns the fee added.
    pub fn accrue(&mut self, tx: &Transaction, owner: &str, is_duplicate: bool) -> f64 {
        if !Self::is_accountable(tx, owner, is_duplicate) {
            return 0.0;
        }
        let fee = Self::fee_for(tx);
        self.total += fee;
        fee
    }

    pub fn total(&self) -> f64 {
        self.total
    }
}
