//! Achievement-based scoring of on-chain address activity.
//!
//! An address's transaction history across two chains, its token balances and
//! its POAP badges are scanned once against a catalog of achievements. The
//! result is a score, a progress log and a few activity statistics.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod errors;
pub mod evaluators;
pub mod gas;
pub mod metrics;
pub mod names;
pub mod normalizer;
pub mod progress;
pub mod providers;
pub mod rate_limiter;
pub mod scorer;
pub mod types;

pub mod utils {
    pub mod helpers;
}

pub use catalog::Catalog;
pub use engine::{ScanEngine, ScanOutcome};
pub use errors::ScoreError;
pub use scorer::AddressScorer;
pub use types::{ScoreReport, ScoreRequest};
