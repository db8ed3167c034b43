// src/catalog.rs

//! # Achievement Catalog
//!
//! The immutable definition tree the engine scores against:
//! achievements → goals → steps. Every node carries a point value; every step
//! carries one rule from a closed vocabulary. Catalogs are authored as JSON,
//! one file per season.

use crate::errors::CatalogError;
use crate::utils::helpers::de_number_or_string;
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

//================================================================================================//
//                                        CATALOG TREE                                            //
//================================================================================================//

#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    pub season: u32,
    pub achievements: Vec<Achievement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Achievement {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub points: u64,
    #[serde(default)]
    pub goals: Vec<Goal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Goal {
    pub name: String,
    #[serde(default)]
    pub points: u64,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawStep")]
pub struct Step {
    pub name: String,
    pub points: u64,
    pub rule: StepRule,
}

/// Which addresses an address-matching rule compares against.
#[derive(Debug, Clone, PartialEq)]
pub enum AddressTargets {
    /// No address configured: match the address being scored.
    Owner,
    Listed(Vec<String>),
}

impl AddressTargets {
    /// Whether `candidate` is one of the targets. `owner` stands in for [`AddressTargets::Owner`].
    pub fn matches(&self, owner: &str, candidate: &str) -> bool {
        use crate::utils::helpers::same_address;
        match self {
            AddressTargets::Owner => same_address(owner, candidate),
            AddressTargets::Listed(list) => list.iter().any(|a| same_address(a, candidate)),
        }
    }
}

/// The closed set of step rules.
#[derive(Debug, Clone, PartialEq)]
pub enum StepRule {
    TransactionToAddressCount { targets: AddressTargets, count: u64 },
    TransactionFromAddressCount { targets: AddressTargets, count: u64 },
    SendEthAmount { amount: f64 },
    OwnTokenCount { count: u64 },
    OwnPoapCount { count: u64 },
    SpendGasAmount { amount: f64 },
    OwnTokenByAddress { targets: AddressTargets, count: u64 },
}

impl StepRule {
    pub fn type_name(&self) -> &'static str {
        match self {
            StepRule::TransactionToAddressCount { .. } => "transaction_to_address_count",
            StepRule::TransactionFromAddressCount { .. } => "transaction_from_address_count",
            StepRule::SendEthAmount { .. } => "send_eth_amount",
            StepRule::OwnTokenCount { .. } => "own_token_count",
            StepRule::OwnPoapCount { .. } => "own_poap_count",
            StepRule::SpendGasAmount { .. } => "spend_gas_amount",
            StepRule::OwnTokenByAddress { .. } => "own_token_by_address",
        }
    }
}

//================================================================================================//
//                                      JSON REPRESENTATION                                       //
//================================================================================================//

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawParams {
    #[serde(default)]
    address: Option<OneOrMany>,
    #[serde(default, deserialize_with = "de_number_or_string")]
    count: Option<f64>,
    #[serde(default, deserialize_with = "de_number_or_string")]
    amount: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawStep {
    name: String,
    #[serde(default)]
    points: u64,
    #[serde(rename = "type")]
    step_type: String,
    #[serde(default)]
    params: RawParams,
}

impl RawStep {
    fn missing(&self, param: &'static str) -> CatalogError {
        CatalogError::MissingParam {
            step: self.name.clone(),
            step_type: self.step_type.clone(),
            param,
        }
    }

    fn targets(&self) -> AddressTargets {
        match &self.params.address {
            None => AddressTargets::Owner,
            Some(OneOrMany::One(a)) if a.trim().is_empty() => AddressTargets::Owner,
            Some(OneOrMany::One(a)) => AddressTargets::Listed(vec![a.to_lowercase()]),
            Some(OneOrMany::Many(list)) => {
                AddressTargets::Listed(list.iter().map(|a| a.to_lowercase()).collect())
            }
        }
    }

    fn count(&self) -> Result<u64, CatalogError> {
        let raw = self.params.count.ok_or_else(|| self.missing("count"))?;
        if raw < 0.0 || raw.fract() != 0.0 {
            return Err(CatalogError::Parse(format!(
                "step '{}' has a non-integral count {}",
                self.name, raw
            )));
        }
        Ok(raw as u64)
    }

    fn amount(&self) -> Result<f64, CatalogError> {
        self.params.amount.ok_or_else(|| self.missing("amount"))
    }
}

impl TryFrom<RawStep> for Step {
    type Error = CatalogError;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        let rule = match raw.step_type.as_str() {
            "transaction_to_address_count" => StepRule::TransactionToAddressCount {
                targets: raw.targets(),
                count: raw.count()?,
            },
            "transaction_from_address_count" => StepRule::TransactionFromAddressCount {
                targets: raw.targets(),
                count: raw.count()?,
            },
            "send_eth_amount" => StepRule::SendEthAmount { amount: raw.amount()? },
            "own_token_count" => StepRule::OwnTokenCount { count: raw.count()? },
            "own_poap_count" => StepRule::OwnPoapCount { count: raw.count()? },
            "spend_gas_amount" => StepRule::SpendGasAmount { amount: raw.amount()? },
            "own_token_by_address" => StepRule::OwnTokenByAddress {
                targets: raw.targets(),
                count: raw.count()?,
            },
            other => return Err(CatalogError::UnknownStepType(other.to_string())),
        };
        Ok(Step {
            name: raw.name,
            points: raw.points,
            rule,
        })
    }
}

//================================================================================================//
//                                         LOADING                                                //
//================================================================================================//

impl Catalog {
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = serde_json::from_str(json)?;
        catalog.warn_on_empty_nodes();
        Ok(catalog)
    }

    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| CatalogError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let catalog = Self::from_json_str(&content)?;
        info!(
            season = catalog.season,
            achievements = catalog.achievements.len(),
            total_points = catalog.total_points_possible(),
            "Loaded achievement catalog from {}",
            path.display()
        );
        Ok(catalog)
    }

    /// Sum of every achievement, goal and step point value, whether completed or not.
    pub fn total_points_possible(&self) -> u64 {
        self.achievements.iter().map(Achievement::total_points).sum()
    }

    fn warn_on_empty_nodes(&self) {
        for (j, achievement) in self.achievements.iter().enumerate() {
            if achievement.goals.is_empty() {
                warn!(achievement = j, name = %achievement.name, "Achievement has no goals and can never complete");
            }
            for (k, goal) in achievement.goals.iter().enumerate() {
                if goal.steps.is_empty() {
                    warn!(achievement = j, goal = k, name = %goal.name, "Goal has no steps and can never complete");
                }
            }
        }
    }
}

impl Achievement {
    /// Achievement points plus the points of every goal and step beneath it.
    pub fn total_points(&self) -> u64 {
        self.points
            + self
                .goals
                .iter()
                .map(|g| g.points + g.steps.iter().map(|s| s.points).sum::<u64>())
                .sum::<u64>()
    }
}
