// src/evaluators.rs

//! # Step Evaluators
//!
//! One handler per step rule. Each handler looks at a single transaction
//! (plus the list-valued holdings on the first transaction of a scan), updates
//! only the counters it owns, and returns a [`StepDecision`]. Handlers never
//! touch the completion log or the score; the scan loop does that exactly once
//! per completed step.

use crate::catalog::{AddressTargets, StepRule};
use crate::progress::StepKey;
use crate::types::{Holdings, Transaction};
use crate::utils::helpers::same_address;
use std::collections::{HashMap, HashSet};

/// Everything an evaluator may read about the transaction being visited.
#[derive(Debug, Clone, Copy)]
pub struct TxContext<'a> {
    pub tx: &'a Transaction,
    /// Lowercase address being scored.
    pub owner: &'a str,
    /// True only for the first non-failed transaction of the scan.
    pub is_first: bool,
    pub is_duplicate: bool,
    pub holdings: &'a Holdings,
    /// Gas spend accumulated so far, including this transaction.
    pub gas_spent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDecision {
    Pending,
    Complete,
}

impl StepDecision {
    fn when(condition: bool) -> Self {
        if condition {
            StepDecision::Complete
        } else {
            StepDecision::Pending
        }
    }
}

/// A sparse counter keyed by step position, plus the hashes each step has
/// already counted.
#[derive(Debug, Clone, Default)]
pub struct StepCounters {
    counts: HashMap<StepKey, u64>,
    counted_hashes: HashMap<StepKey, HashSet<String>>,
}

impl StepCounters {
    pub fn get(&self, key: StepKey) -> u64 {
        self.counts.get(&key).copied().unwrap_or(0)
    }

    pub fn increment(&mut self, key: StepKey) -> u64 {
        let entry = self.counts.entry(key).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Records `hash` against `key`. Returns false when the step already counted
    /// that hash. Records without a hash always count.
    pub fn claim(&mut self, key: StepKey, hash: &str) -> bool {
        hash.is_empty()
            || self
                .counted_hashes
                .entry(key)
                .or_default()
                .insert(hash.to_string())
    }

    /// Sets the counter only if it has not been touched yet.
    pub fn seed(&mut self, key: StepKey, value: u64) {
        self.counts.entry(key).or_insert(value);
    }
}

/// The per-scan counter state shared by all evaluators.
#[derive(Debug, Clone, Default)]
pub struct ScanCounters {
    pub sent: StepCounters,
    pub received: StepCounters,
    pub owned_tokens: StepCounters,
}

/// Dispatches to the handler for `rule`.
pub fn evaluate_step(
    rule: &StepRule,
    key: StepKey,
    ctx: &TxContext<'_>,
    counters: &mut ScanCounters,
) -> StepDecision {
    match rule {
        StepRule::TransactionToAddressCount { targets, count } => {
            transaction_to_address_count(targets, *count, key, ctx, &mut counters.sent)
        }
        StepRule::TransactionFromAddressCount { targets, count } => {
            transaction_from_address_count(targets, *count, key, ctx, &mut counters.received)
        }
        StepRule::SendEthAmount { amount } => send_eth_amount(*amount, ctx),
        StepRule::OwnTokenCount { count } => own_token_count(*count, ctx),
        StepRule::OwnPoapCount { count } => own_poap_count(*count, ctx),
        StepRule::SpendGasAmount { amount } => spend_gas_amount(*amount, ctx),
        StepRule::OwnTokenByAddress { targets, count } => {
            own_token_by_address(targets, *count, key, ctx, &mut counters.owned_tokens)
        }
    }
}

pub fn transaction_to_address_count(
    targets: &AddressTargets,
    count: u64,
    key: StepKey,
    ctx: &TxContext<'_>,
    sent: &mut StepCounters,
) -> StepDecision {
    if !targets.matches(ctx.owner, &ctx.tx.to) || !sent.claim(key, &ctx.tx.hash) {
        return StepDecision::Pending;
    }
    StepDecision::when(sent.increment(key) == count)
}

pub fn transaction_from_address_count(
    targets: &AddressTargets,
    count: u64,
    key: StepKey,
    ctx: &TxContext<'_>,
    received: &mut StepCounters,
) -> StepDecision {
    if !targets.matches(ctx.owner, &ctx.tx.from) || !received.claim(key, &ctx.tx.hash) {
        return StepDecision::Pending;
    }
    StepDecision::when(received.increment(key) == count)
}

/// Plain value transfers only: contract-bearing records are ignored.
pub fn send_eth_amount(amount: f64, ctx: &TxContext<'_>) -> StepDecision {
    if ctx.is_duplicate || !ctx.tx.is_primary_chain() {
        return StepDecision::Pending;
    }
    StepDecision::when(ctx.tx.value_in_tokens() >= amount && !ctx.tx.has_contract_address())
}

pub fn own_token_count(count: u64, ctx: &TxContext<'_>) -> StepDecision {
    StepDecision::when(ctx.is_first && ctx.holdings.tokens.len() as u64 >= count)
}

pub fn own_poap_count(count: u64, ctx: &TxContext<'_>) -> StepDecision {
    StepDecision::when(ctx.is_first && ctx.holdings.poaps.len() as u64 >= count)
}

pub fn spend_gas_amount(amount: f64, ctx: &TxContext<'_>) -> StepDecision {
    if ctx.is_duplicate || !ctx.tx.is_primary_chain() || !same_address(ctx.owner, &ctx.tx.from) {
        return StepDecision::Pending;
    }
    StepDecision::when(ctx.gas_spent >= amount)
}

/// Combines two signals: matches in the token-balance listing (read on the
/// first transaction) and per-transaction contract/recipient matches. On the
/// first transaction a listing hit takes the place of that transaction's own
/// match, so one holding is never tallied twice.
pub fn own_token_by_address(
    targets: &AddressTargets,
    count: u64,
    key: StepKey,
    ctx: &TxContext<'_>,
    owned: &mut StepCounters,
) -> StepDecision {
    let mut touched = false;
    let mut listed = 0;

    if ctx.is_first {
        listed = ctx
            .holdings
            .tokens
            .iter()
            .filter(|holding| targets.matches(ctx.owner, &holding.token_info.address))
            .count() as u64;
        if listed > 0 {
            owned.seed(key, listed);
            touched = true;
        }
    }

    let tx_match = targets.matches(ctx.owner, &ctx.tx.contract_address)
        || targets.matches(ctx.owner, &ctx.tx.to);
    if tx_match && owned.claim(key, &ctx.tx.hash) {
        touched = true;
        if listed == 0 {
            owned.increment(key);
        }
    }

    StepDecision::when(touched && owned.get(key) == count)
}
