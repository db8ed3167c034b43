#![allow(dead_code)]

pub mod mocks;

use std::sync::Arc;

use chainscore::{
    cache::ScoreCache,
    catalog::Catalog,
    names::NameResolvers,
    providers::ChainDataSource,
    scorer::{AddressScorer, ScorerSettings},
    types::{Poap, PoapEvent, TokenHolding, TokenInfo, Transaction},
};

pub const OWNER: &str = "0x53db9542e3a0cdbfebb659d001799ba0b37b2275";
pub const BRIDGE: &str = "0x1111111111111111111111111111111111111111";
pub const FRIEND: &str = "0x3333333333333333333333333333333333333333";
pub const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

pub const ONE_ETH_WEI: &str = "1000000000000000000";
pub const TWO_ETH_WEI: &str = "2000000000000000000";

/// Three achievements worth 275 points in total.
///
/// - 0 "Bridger" (100): goal (40) = bridge twice (10) + send >= 1 ETH (20)
/// - 1 "Social" (30): goal (5) = receive from FRIEND once (3)
/// - 2 "Collector" (50): goal (7) = two POAPs (4) + one token (6)
pub fn test_catalog() -> Arc<Catalog> {
    let json = format!(
        r#"{{
        "season": 2,
        "achievements": [
            {{ "name": "Bridger", "points": 100, "goals": [
                {{ "name": "Bridge", "points": 40, "steps": [
                    {{ "name": "Bridge twice", "points": 10, "type": "transaction_to_address_count",
                       "params": {{ "address": "{BRIDGE}", "count": 2 }} }},
                    {{ "name": "Send one ETH", "points": 20, "type": "send_eth_amount", "params": {{ "amount": 1 }} }}
                ] }}
            ] }},
            {{ "name": "Social", "points": 30, "goals": [
                {{ "name": "Friends", "points": 5, "steps": [
                    {{ "name": "Paid by a friend", "points": 3, "type": "transaction_from_address_count",
                       "params": {{ "address": "{FRIEND}", "count": 1 }} }}
                ] }}
            ] }},
            {{ "name": "Collector", "points": 50, "goals": [
                {{ "name": "Holdings", "points": 7, "steps": [
                    {{ "name": "Two POAPs", "points": 4, "type": "own_poap_count", "params": {{ "count": 2 }} }},
                    {{ "name": "One token", "points": 6, "type": "own_token_count", "params": {{ "count": "1" }} }}
                ] }}
            ] }}
        ]
    }}"#
    );
    Arc::new(Catalog::from_json_str(&json).expect("test catalog parses"))
}

pub fn tx(hash: &str, from: &str, to: &str, value: &str, timestamp: u64) -> Transaction {
    Transaction {
        hash: hash.to_string(),
        from: from.to_string(),
        to: to.to_string(),
        value: value.to_string(),
        gas_price: "0".to_string(),
        gas_used: "21000".to_string(),
        cumulative_gas_used: "0".to_string(),
        is_error: "0".to_string(),
        timestamp: timestamp.to_string(),
        ..Default::default()
    }
}

pub fn token(address: &str) -> TokenHolding {
    TokenHolding {
        token_info: TokenInfo {
            address: address.to_string(),
            name: None,
            symbol: None,
        },
        balance: Some(1.0),
    }
}

pub fn poap(token_id: &str) -> Poap {
    Poap {
        token_id: token_id.to_string(),
        event: Some(PoapEvent {
            id: Some(1),
            name: Some("Test event".to_string()),
        }),
    }
}

pub fn build_scorer(
    source: Arc<dyn ChainDataSource>,
    resolvers: NameResolvers,
    cache: Arc<dyn ScoreCache>,
) -> AddressScorer {
    AddressScorer::new(test_catalog(), source, resolvers, cache, ScorerSettings::default())
}
