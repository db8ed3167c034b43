// src/engine.rs

//! # Single-Pass Scan Engine
//!
//! Walks the merged transaction sequence exactly once, in order. For every
//! transaction it visits each incomplete achievement → goal → step, asks the
//! matching evaluator for a decision, and rolls completed steps up into goals
//! and completed goals up into achievements.
//!
//! Order matters: count-based steps complete on the N-th match and duplicate
//! detection is first-seen, so the loop is strictly sequential.

use crate::catalog::{Achievement, Catalog};
use crate::evaluators::{evaluate_step, ScanCounters, StepDecision, TxContext};
use crate::gas::GasAccountant;
use crate::progress::{ProgressMarker, ProgressTracker, StepKey};
use crate::types::{Holdings, Transaction};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, instrument};

/// Everything the result aggregator needs from one scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    pub score: u64,
    pub total_points_possible: u64,
    pub completed_achievements: usize,
    /// Transaction count after removing duplicates.
    pub total_transactions: u64,
    pub spent_on_gas: f64,
    /// Timestamp of the first transaction in list order.
    pub active_since: Option<DateTime<Utc>>,
    pub progress: Vec<ProgressMarker>,
}

/// Mutable state of one scan. Lives for a single evaluation call.
#[derive(Debug, Default)]
struct ScanState {
    tracker: ProgressTracker,
    counters: ScanCounters,
    gas: GasAccountant,
    score: u64,
}

impl ScanState {
    fn award(&mut self, marker: ProgressMarker, points: u64) -> bool {
        if self.tracker.mark_complete(marker) {
            self.score += points;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScanEngine<'c> {
    catalog: &'c Catalog,
}

impl<'c> ScanEngine<'c> {
    pub fn new(catalog: &'c Catalog) -> Self {
        Self { catalog }
    }

    /// Scores `transactions` from an empty progress log.
    pub fn scan(&self, owner: &str, transactions: &[Transaction], holdings: &Holdings) -> ScanOutcome {
        self.resume(owner, transactions, holdings, std::iter::empty())
    }

    /// Scores `transactions` on top of a previously persisted progress log.
    ///
    /// Prior markers are never re-awarded; their points seed the score so the
    /// score always equals the sum of points of every marker in the log. Markers
    /// that do not exist in the catalog are dropped.
    #[instrument(skip_all, fields(owner = %owner, transactions = transactions.len()))]
    pub fn resume<I>(
        &self,
        owner: &str,
        transactions: &[Transaction],
        holdings: &Holdings,
        prior: I,
    ) -> ScanOutcome
    where
        I: IntoIterator<Item = ProgressMarker>,
    {
        let owner = owner.to_lowercase();
        let mut state = ScanState::default();
        for marker in prior {
            match self.points_for(marker) {
                Some(points) => {
                    state.award(marker, points);
                }
                None => debug!(?marker, "Dropping progress marker unknown to the catalog"),
            }
        }

        let mut seen_hashes: HashSet<&str> = HashSet::with_capacity(transactions.len());
        let mut total_transactions = transactions.len() as u64;
        let mut is_first = true;

        for tx in transactions {
            if tx.is_failed() {
                continue;
            }

            let is_duplicate = !tx.hash.is_empty() && !seen_hashes.insert(tx.hash.as_str());
            if is_duplicate {
                total_transactions -= 1;
            }

            state.gas.accrue(tx, &owner, is_duplicate);

            let ctx = TxContext {
                tx,
                owner: &owner,
                is_first,
                is_duplicate,
                holdings,
                gas_spent: state.gas.total(),
            };
            self.visit(&ctx, &mut state);
            is_first = false;
        }

        let progress = state.tracker.into_markers();
        let completed_achievements = progress
            .iter()
            .filter(|m| matches!(m, ProgressMarker::Achievement(_)))
            .count();

        ScanOutcome {
            score: state.score,
            total_points_possible: self.catalog.total_points_possible(),
            completed_achievements,
            total_transactions,
            spent_on_gas: state.gas.total(),
            active_since: transactions.first().and_then(Transaction::timestamp_utc),
            progress,
        }
    }

    fn visit(&self, ctx: &TxContext<'_>, state: &mut ScanState) {
        for (j, achievement) in self.catalog.achievements.iter().enumerate() {
            if state.tracker.is_complete(ProgressMarker::Achievement(j)) {
                continue;
            }

            for (k, goal) in achievement.goals.iter().enumerate() {
                if state.tracker.is_complete(ProgressMarker::Goal(j, k)) {
                    continue;
                }

                for (l, step) in goal.steps.iter().enumerate() {
                    let key = StepKey::new(j, k, l);
                    if state.tracker.is_complete(key.into()) {
                        continue;
                    }
                    if evaluate_step(&step.rule, key, ctx, &mut state.counters) == StepDecision::Complete
                        && state.award(key.into(), step.points)
                    {
                        debug!(
                            achievement = %achievement.name,
                            goal = %goal.name,
                            step = %step.name,
                            step_type = step.rule.type_name(),
                            points = step.points,
                            hash = %ctx.tx.hash,
                            "Step completed"
                        );
                    }
                }

                // A goal without steps never completes.
                if !goal.steps.is_empty()
                    && state.tracker.count_steps_complete(j, k) == goal.steps.len()
                    && state.award(ProgressMarker::Goal(j, k), goal.points)
                {
                    debug!(achievement = %achievement.name, goal = %goal.name, points = goal.points, "Goal completed");
                }
            }

            if Self::all_goals_complete(achievement, j, &state.tracker)
                && state.award(ProgressMarker::Achievement(j), achievement.points)
            {
                debug!(achievement = %achievement.name, points = achievement.points, "Achievement completed");
            }
        }
    }

    fn all_goals_complete(achievement: &Achievement, j: usize, tracker: &ProgressTracker) -> bool {
        !achievement.goals.is_empty() && tracker.count_goals_complete(j) == achievement.goals.len()
    }

    /// Point value of the catalog node `marker` refers to, if it exists.
    pub fn points_for(&self, marker: ProgressMarker) -> Option<u64> {
        let achievements = &self.catalog.achievements;
        match marker {
            ProgressMarker::Achievement(j) => achievements.get(j).map(|a| a.points),
            ProgressMarker::Goal(j, k) => achievements.get(j)?.goals.get(k).map(|g| g.points),
            ProgressMarker::Step(j, k, l) => achievements
                .get(j)?
                .goals
                .get(k)?
                .steps
                .get(l)
                .map(|s| s.points),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::types::{Poap, TokenHolding};

    const OWNER: &str = "0x53db9542e3a0cdbfebb659d001799ba0b37b2275";
    const BRIDGE: &str = "0x1111111111111111111111111111111111111111";
    const FRIEND: &str = "0x3333333333333333333333333333333333333333";

    fn catalog() -> Catalog {
        Catalog::from_json_str(&format!(
            r#"{{
            "season": 2,
            "achievements": [
                {{ "name": "Bridger", "points": 100, "goals": [
                    {{ "name": "Use the bridge", "points": 40, "steps": [
                        {{ "name": "Bridge twice", "points": 10, "type": "transaction_to_address_count",
                           "params": {{ "address": "{BRIDGE}", "count": 2 }} }},
                        {{ "name": "Big send", "points": 20, "type": "send_eth_amount", "params": {{ "amount": 1.0 }} }}
                    ] }},
                    {{ "name": "Get paid", "points": 5, "steps": [
                        {{ "name": "Receive from a friend", "points": 3, "type": "transaction_from_address_count",
                           "params": {{ "address": "{FRIEND}", "count": 1 }} }}
                    ] }}
                ] }},
                {{ "name": "Collector", "points": 50, "goals": [
                    {{ "name": "Badges", "points": 7, "steps": [
                        {{ "name": "Two POAPs", "points": 4, "type": "own_poap_count", "params": {{ "count": 2 }} }},
                        {{ "name": "One token", "points": 6, "type": "own_token_count", "params": {{ "count": 1 }} }}
                    ] }}
                ] }},
                {{ "name": "Spender", "points": 9, "goals": [
                    {{ "name": "Burn gas", "points": 8, "steps": [
                        {{ "name": "Spend", "points": 2, "type": "spend_gas_amount", "params": {{ "amount": 0.5 }} }}
                    ] }}
                ] }}
            ]
        }}"#
        ))
        .unwrap()
    }

    fn tx(hash: &str, from: &str, to: &str) -> Transaction {
        Transaction {
            hash: hash.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            value: "0".to_string(),
            timestamp: "1600000000".to_string(),
            ..Default::default()
        }
    }

    fn marker_points(engine: &ScanEngine<'_>, progress: &[ProgressMarker]) -> u64 {
        progress.iter().map(|m| engine.points_for(*m).unwrap()).sum()
    }

    #[test]
    fn test_count_step_completes_without_premature_rollup() {
        let catalog = catalog();
        let engine = ScanEngine::new(&catalog);
        let txs = vec![tx("0x1", OWNER, BRIDGE), tx("0x2", OWNER, BRIDGE)];
        let outcome = engine.scan(OWNER, &txs, &Holdings::default());

        assert_eq!(outcome.progress, vec![ProgressMarker::Step(0, 0, 0)]);
        assert_eq!(outcome.score, 10);
        assert_eq!(outcome.completed_achievements, 0);
        assert_eq!(outcome.total_transactions, 2);
    }

    #[test]
    fn test_full_rollup_awards_goal_and_achievement_once() {
        let catalog = catalog();
        let engine = ScanEngine::new(&catalog);
        let mut big = tx("0x3", OWNER, FRIEND);
        big.value = "2000000000000000000".to_string();
        let txs = vec![
            tx("0x1", OWNER, BRIDGE),
            tx("0x2", OWNER, BRIDGE),
            big,
            tx("0x4", FRIEND, OWNER),
            tx("0x5", OWNER, BRIDGE),
        ];
        let outcome = engine.scan(OWNER, &txs, &Holdings::default());

        assert!(outcome.progress.contains(&ProgressMarker::Goal(0, 0)));
        assert!(outcome.progress.contains(&ProgressMarker::Goal(0, 1)));
        assert!(outcome.progress.contains(&ProgressMarker::Achievement(0)));
        assert_eq!(outcome.score, 10 + 20 + 40 + 3 + 5 + 100);
        assert_eq!(outcome.completed_achievements, 1);
        assert_eq!(outcome.score, marker_points(&engine, &outcome.progress));
    }

    #[test]
    fn test_duplicates_decrement_total_and_do_not_double_count() {
        let catalog = catalog();
        let engine = ScanEngine::new(&catalog);
        let txs = vec![tx("0x1", OWNER, BRIDGE), tx("0x1", OWNER, BRIDGE)];
        let outcome = engine.scan(OWNER, &txs, &Holdings::default());

        assert_eq!(outcome.total_transactions, 1);
        assert!(outcome.progress.is_empty());
        assert_eq!(outcome.score, 0);
    }

    #[test]
    fn test_token_row_sharing_a_swap_hash_still_counts() {
        let usdc = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
        let router = "0x7a250d5630b4cf539739df2c5dacb4c659f2488d";
        let catalog = Catalog::from_json_str(&format!(
            r#"{{"season":2,"achievements":[{{"name":"Stable","points":5,"goals":[
                {{"name":"Hold USDC","points":3,"steps":[
                    {{"name":"Own USDC","points":2,"type":"own_token_by_address",
                      "params":{{"address":"{usdc}","count":1}}}}
                ]}}
            ]}}]}}"#
        ))
        .unwrap();
        let engine = ScanEngine::new(&catalog);
        let router_call = tx("0xswap", OWNER, router);
        let mut token_row = tx("0xswap", router, OWNER);
        token_row.contract_address = usdc.to_string();

        let outcome = engine.scan(OWNER, &[router_call, token_row], &Holdings::default());

        assert_eq!(outcome.total_transactions, 1);
        assert_eq!(
            outcome.progress,
            vec![ProgressMarker::Step(0, 0, 0), ProgressMarker::Goal(0, 0), ProgressMarker::Achievement(0)]
        );
        assert_eq!(outcome.score, 10);
    }

    #[test]
    fn test_failed_transactions_are_skipped_but_counted() {
        let catalog = catalog();
        let engine = ScanEngine::new(&catalog);
        let mut failed = tx("0x1", OWNER, BRIDGE);
        failed.is_error = "1".to_string();
        let txs = vec![failed, tx("0x2", OWNER, BRIDGE)];
        let outcome = engine.scan(OWNER, &txs, &Holdings::default());

        assert_eq!(outcome.total_transactions, 2);
        assert!(outcome.progress.is_empty());
    }

    #[test]
    fn test_holdings_are_checked_on_first_processed_transaction() {
        let catalog = catalog();
        let engine = ScanEngine::new(&catalog);
        let holdings = Holdings {
            tokens: vec![TokenHolding::default()],
            poaps: vec![Poap::default(), Poap::default()],
        };
        let mut failed = tx("0x0", OWNER, BRIDGE);
        failed.is_error = "1".to_string();
        let txs = vec![failed, tx("0x1", FRIEND, OWNER), tx("0x2", FRIEND, OWNER)];
        let outcome = engine.scan(OWNER, &txs, &holdings);

        assert!(outcome.progress.contains(&ProgressMarker::Step(1, 0, 0)));
        assert!(outcome.progress.contains(&ProgressMarker::Step(1, 0, 1)));
        assert!(outcome.progress.contains(&ProgressMarker::Achievement(1)));
        assert_eq!(outcome.score, marker_points(&engine, &outcome.progress));
    }

    #[test]
    fn test_secondary_chain_send_does_not_complete() {
        let catalog = catalog();
        let engine = ScanEngine::new(&catalog);
        let mut big = tx("0x3", OWNER, FRIEND);
        big.value = "2000000000000000000".to_string();
        big.chain_id = Some(137);
        let outcome = engine.scan(OWNER, &[big], &Holdings::default());
        assert!(!outcome.progress.contains(&ProgressMarker::Step(0, 0, 1)));
    }

    #[test]
    fn test_gas_accumulates_and_completes_spend_step() {
        let catalog = catalog();
        let engine = ScanEngine::new(&catalog);
        let mut a = tx("0x1", OWNER, FRIEND);
        a.gas_price = "100000000000000000".to_string(); // 0.1 per unit
        a.gas_used = "3".to_string();
        let b = a.clone();
        let b = Transaction { hash: "0x2".to_string(), ..b };
        let outcome = engine.scan(OWNER, &[a.clone(), a, b], &Holdings::default());

        assert!((outcome.spent_on_gas - 0.6).abs() < 1e-9);
        assert!(outcome.progress.contains(&ProgressMarker::Achievement(2)));
        assert_eq!(outcome.total_transactions, 2);
    }

    #[test]
    fn test_resume_never_double_awards() {
        let catalog = catalog();
        let engine = ScanEngine::new(&catalog);
        let txs = vec![tx("0x1", OWNER, BRIDGE), tx("0x2", OWNER, BRIDGE), tx("0x4", FRIEND, OWNER)];
        let first = engine.scan(OWNER, &txs, &Holdings::default());
        let second = engine.resume(OWNER, &txs, &Holdings::default(), first.progress.clone());

        assert_eq!(first.score, second.score);
        assert_eq!(first.progress, second.progress);
        assert_eq!(second.score, marker_points(&engine, &second.progress));
    }

    #[test]
    fn test_resume_drops_unknown_markers() {
        let catalog = catalog();
        let engine = ScanEngine::new(&catalog);
        let outcome = engine.resume(
            OWNER,
            &[],
            &Holdings::default(),
            vec![ProgressMarker::Step(9, 9, 9), ProgressMarker::Step(0, 0, 0)],
        );
        assert_eq!(outcome.progress, vec![ProgressMarker::Step(0, 0, 0)]);
        assert_eq!(outcome.score, 10);
        assert_eq!(outcome.active_since, None);
    }

    #[test]
    fn test_empty_nodes_never_complete() {
        let catalog = Catalog::from_json_str(
            r#"{"season":2,"achievements":[
                {"name":"Empty","points":10,"goals":[]},
                {"name":"Hollow","points":10,"goals":[{"name":"nothing","points":5,"steps":[]}]}
            ]}"#,
        )
        .unwrap();
        let engine = ScanEngine::new(&catalog);
        let outcome = engine.scan(OWNER, &[tx("0x1", OWNER, FRIEND)], &Holdings::default());
        assert!(outcome.progress.is_empty());
        assert_eq!(outcome.score, 0);
        assert_eq!(outcome.total_points_possible, 25);
    }

    #[test]
    fn test_active_since_is_first_listed_transaction() {
        let catalog = catalog();
        let engine = ScanEngine::new(&catalog);
        let mut later = tx("0x2", OWNER, FRIEND);
        later.timestamp = "1700000000".to_string();
        let outcome = engine.scan(OWNER, &[tx("0x1", OWNER, FRIEND), later], &Holdings::default());
        assert_eq!(outcome.active_since.unwrap().timestamp(), 1600000000);
    }
}
