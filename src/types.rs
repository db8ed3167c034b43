// src/types.rs

//! # Shared Domain Types
//!
//! Records exchanged between the upstream data sources, the evaluation engine
//! and the outer request handler.

use crate::progress::ProgressMarker;
use crate::utils::helpers::{
    base_units_to_tokens, de_lenient_string, de_number_or_string, parse_f64_lenient,
};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

//================================================================================================//
//                                         CHAINS                                                 //
//================================================================================================//

/// Ledgers the service pulls activity from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// The primary ledger. Its records carry no chain tag.
    Ethereum,
    /// Secondary ledger whose records are tagged on merge.
    Polygon,
}

impl Chain {
    pub fn chain_id(&self) -> u64 {
        match self {
            Chain::Ethereum => 1,
            Chain::Polygon => 137,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Polygon => "polygon",
        }
    }
}

/// Explorer account-history listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferKind {
    /// Normal transactions (`txlist`).
    Normal,
    /// ERC-721 transfers (`tokennfttx`).
    Nft,
    /// ERC-20 transfers (`tokentx`).
    Token,
}

impl TransferKind {
    pub fn action(&self) -> &'static str {
        match self {
            TransferKind::Normal => "txlist",
            TransferKind::Nft => "tokennfttx",
            TransferKind::Token => "tokentx",
        }
    }
}

//================================================================================================//
//                                      TRANSACTIONS                                              //
//================================================================================================//

/// A flat transaction record as returned by an Etherscan-compatible explorer.
///
/// Numeric fields stay in their string form; the evaluators parse them on use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub hash: String,
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub from: String,
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub to: String,
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub value: String,
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub gas_price: String,
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub gas_used: String,
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub cumulative_gas_used: String,
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub is_error: String,
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub contract_address: String,
    #[serde(rename = "timeStamp", default, deserialize_with = "de_lenient_string")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub block_number: String,
    /// Set only on records from a secondary chain.
    #[serde(rename = "chainID", default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_name: Option<String>,
    #[serde(rename = "tokenID", default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
}

impl Transaction {
    pub fn is_failed(&self) -> bool {
        self.is_error == "1"
    }

    pub fn is_primary_chain(&self) -> bool {
        self.chain_id.is_none()
    }

    /// Transferred value in whole-token units.
    pub fn value_in_tokens(&self) -> f64 {
        base_units_to_tokens(&self.value)
    }

    pub fn has_contract_address(&self) -> bool {
        !self.contract_address.trim().is_empty()
    }

    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        let secs = self.timestamp.trim().parse::<i64>().ok()?;
        Utc.timestamp_opt(secs, 0).single()
    }

    pub fn gas_price_raw(&self) -> f64 {
        parse_f64_lenient(&self.gas_price)
    }

    pub fn gas_used_raw(&self) -> f64 {
        parse_f64_lenient(&self.gas_used)
    }

    pub fn cumulative_gas_used_raw(&self) -> f64 {
        parse_f64_lenient(&self.cumulative_gas_used)
    }
}

//================================================================================================//
//                                   HOLDINGS (TOKENS / POAPS)                                    //
//================================================================================================//

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
}

/// One entry of the token-balance listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenHolding {
    #[serde(default)]
    pub token_info: TokenInfo,
    #[serde(default, deserialize_with = "de_number_or_string")]
    pub balance: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoapEvent {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
}

/// One POAP badge held by the address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poap {
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub token_id: String,
    #[serde(default)]
    pub event: Option<PoapEvent>,
}

/// List-valued inputs that are consulted once per scan rather than per transaction.
#[derive(Debug, Clone, Default)]
pub struct Holdings {
    pub tokens: Vec<TokenHolding>,
    pub poaps: Vec<Poap>,
}

/// Everything fetched from upstream for one address, before merging.
#[derive(Debug, Clone, Default)]
pub struct ChainActivity {
    pub transactions: Vec<Transaction>,
    pub nft_transfers: Vec<Transaction>,
    pub token_transfers: Vec<Transaction>,
    pub secondary_transactions: Vec<Transaction>,
    pub secondary_nft_transfers: Vec<Transaction>,
    pub secondary_token_transfers: Vec<Transaction>,
    pub holdings: Holdings,
}

//================================================================================================//
//                                    REQUEST / RESPONSE                                          //
//================================================================================================//

/// Optional human-readable name supplied with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameHint {
    /// No name supplied: look the address up in reverse.
    Reverse,
    /// A domain-style name the caller claims for the address.
    Domain(String),
}

impl NameHint {
    pub fn from_optional(name: Option<&str>) -> Self {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => NameHint::Domain(n.to_lowercase()),
            None => NameHint::Reverse,
        }
    }

    pub fn domain(&self) -> Option<&str> {
        match self {
            NameHint::Domain(d) => Some(d.as_str()),
            NameHint::Reverse => None,
        }
    }
}

/// A request to score one address.
#[derive(Debug, Clone)]
pub struct ScoreRequest {
    pub address: String,
    pub name_hint: NameHint,
    pub season: u32,
    /// Forces a re-scan even when a fresh cached record exists.
    pub development: bool,
}

impl ScoreRequest {
    pub fn new(address: impl Into<String>, season: u32) -> Self {
        Self {
            address: address.into(),
            name_hint: NameHint::Reverse,
            season,
            development: false,
        }
    }

    pub fn with_name(mut self, name: Option<&str>) -> Self {
        self.name_hint = NameHint::from_optional(name);
        self
    }

    pub fn with_development(mut self, development: bool) -> Self {
        self.development = development;
        self
    }
}

/// The uniform response record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreReport {
    pub address: String,
    pub score: u64,
    pub total_transactions: u64,
    pub spent_on_gas: String,
    pub active_since: String,
    pub rank: u64,
    pub progress: Vec<ProgressMarker>,
    pub error: bool,
    pub name: String,
}

impl ScoreReport {
    /// The zeroed report returned on any fatal error.
    pub fn failed(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            score: 0,
            total_transactions: 0,
            spent_on_gas: "0".to_string(),
            active_since: String::new(),
            rank: 0,
            progress: Vec::new(),
            error: true,
            name: String::new(),
        }
    }
}
