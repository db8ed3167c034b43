// src/scorer.rs

//! # Address Scorer
//!
//! The request handler: validates the address, consults the cache, resolves a
//! display name, fetches upstream activity, runs the scan engine, writes the
//! result back and looks up the rank.

use crate::cache::{CachedScore, InMemoryScoreCache, PgScoreCache, ScoreCache};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::engine::ScanEngine;
use crate::errors::ScoreError;
use crate::metrics::{
    CACHE_HITS, CACHE_WRITE_FAILURES, SCAN_DURATION_SECONDS, SCORE_REQUESTS, TRANSACTIONS_SCANNED,
};
use crate::names::NameResolvers;
use crate::normalizer::merge_activity;
use crate::progress::ProgressMarker;
use crate::providers::{fetch_activity, ChainDataSource, HttpChainDataSource};
use crate::rate_limiter::RateLimiterRegistry;
use crate::types::{Chain, NameHint, ScoreReport, ScoreRequest};
use crate::utils::helpers::{address_key, parse_address};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct ScorerSettings {
    pub cache_ttl: Duration,
    /// Bypasses fresh cached records for every request.
    pub development: bool,
    pub secondary_chain_id: u64,
}

impl ScorerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache_ttl: config.cache_ttl(),
            development: config.development,
            secondary_chain_id: config.secondary_chain_id,
        }
    }
}

impl Default for ScorerSettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::hours(24),
            development: false,
            secondary_chain_id: Chain::Polygon.chain_id(),
        }
    }
}

/// The hint actually used for name resolution.
///
/// Without a caller hint, a non-`.eth` cached name is looked up as a domain again.
pub fn effective_hint(requested: &NameHint, cached: Option<&CachedScore>) -> NameHint {
    match (requested, cached) {
        (NameHint::Reverse, Some(record)) if !record.name.is_empty() && !record.name.contains(".eth") => {
            NameHint::Domain(record.name.to_lowercase())
        }
        _ => requested.clone(),
    }
}

/// Whether a cached record can be served without re-scanning.
pub fn should_reuse(
    cached: &CachedScore,
    requested: &NameHint,
    development: bool,
    now: DateTime<Utc>,
    ttl: Duration,
) -> bool {
    if development || !cached.is_fresh(now, ttl) {
        return false;
    }
    if !cached.transactions.is_some_and(|t| t > 0) {
        return false;
    }
    match requested.domain() {
        Some(domain) => cached.name.eq_ignore_ascii_case(domain),
        None => true,
    }
}

fn format_gas(spent: f64) -> String {
    spent.to_string()
}

fn format_active_since(active_since: Option<DateTime<Utc>>) -> String {
    active_since.map(|t| t.to_rfc3339()).unwrap_or_default()
}

fn outcome_label(err: &ScoreError) -> &'static str {
    match err {
        ScoreError::InvalidAddress(_) => "invalid",
        ScoreError::InactiveAddress(_) => "inactive",
        _ => "failed",
    }
}

#[derive(Debug, Clone)]
pub struct AddressScorer {
    catalog: Arc<Catalog>,
    data_source: Arc<dyn ChainDataSource>,
    resolvers: NameResolvers,
    cache: Arc<dyn ScoreCache>,
    settings: ScorerSettings,
}

impl AddressScorer {
    pub fn new(
        catalog: Arc<Catalog>,
        data_source: Arc<dyn ChainDataSource>,
        resolvers: NameResolvers,
        cache: Arc<dyn ScoreCache>,
        settings: ScorerSettings,
    ) -> Self {
        Self {
            catalog,
            data_source,
            resolvers,
            cache,
            settings,
        }
    }

    /// Wires the HTTP data source, name resolvers and cache described by `config`.
    /// Falls back to an in-memory cache when no database is configured.
    pub async fn from_config(config: &Config, catalog: Arc<Catalog>) -> Result<Self, ScoreError> {
        let limiters = Arc::new(RateLimiterRegistry::new(config.rate_limiter_settings.clone()));
        let data_source = Arc::new(HttpChainDataSource::new(config, limiters)?);
        let resolvers = NameResolvers::from_config(config)?;

        let cache: Arc<dyn ScoreCache> = match config.secrets.database_url.as_deref() {
            Some(url) => {
                let pg = PgScoreCache::connect(url).await?;
                pg.ensure_schema().await?;
                Arc::new(pg)
            }
            None => {
                warn!("DATABASE_URL not set, scores are cached in memory only");
                Arc::new(InMemoryScoreCache::new())
            }
        };

        Ok(Self::new(
            catalog,
            data_source,
            resolvers,
            cache,
            ScorerSettings::from_config(config),
        ))
    }

    /// Scores an address. Any failure yields the uniform error report.
    pub async fn score(&self, request: ScoreRequest) -> ScoreReport {
        match self.evaluate(&request).await {
            Ok(report) => report,
            Err(e) => {
                SCORE_REQUESTS.with_label_values(&[outcome_label(&e)]).inc();
                match e {
                    ScoreError::InvalidAddress(_) | ScoreError::InactiveAddress(_) => {
                        info!(address = %request.address, error = %e, "Score request rejected")
                    }
                    _ => error!(address = %request.address, error = %e, "Score evaluation failed"),
                }
                ScoreReport::failed(request.address)
            }
        }
    }

    #[instrument(skip(self, request), fields(address = %request.address, season = request.season))]
    pub async fn evaluate(&self, request: &ScoreRequest) -> Result<ScoreReport, ScoreError> {
        let address = parse_address(&request.address)
            .ok_or_else(|| ScoreError::InvalidAddress(request.address.clone()))?;
        let key = address_key(&address);
        let season = request.season;
        if season != self.catalog.season {
            return Err(ScoreError::Config(format!(
                "season {} requested but the loaded catalog is for season {}",
                season, self.catalog.season
            )));
        }
        let now = Utc::now();
        let development = request.development || self.settings.development;

        let cached = self.cache.find(&key, season).await?;
        if cached.as_ref().is_some_and(|record| !record.active) {
            return Err(ScoreError::InactiveAddress(key));
        }

        if let Some(record) = cached.as_ref() {
            if should_reuse(record, &request.name_hint, development, now, self.settings.cache_ttl) {
                CACHE_HITS.inc();
                SCORE_REQUESTS.with_label_values(&["cached"]).inc();
                debug!(score = record.score, "Serving fresh cached score");
                return Ok(ScoreReport {
                    address: request.address.clone(),
                    score: record.score,
                    total_transactions: record.transactions.unwrap_or(0),
                    spent_on_gas: format_gas(record.spent_on_gas),
                    active_since: format_active_since(record.active_since),
                    rank: self.rank(season, record.score).await,
                    progress: record.progress.clone(),
                    error: false,
                    name: record.name.clone(),
                });
            }
        }

        // A fresh record that is being refreshed still seeds the progress log.
        let prior: Vec<ProgressMarker> = cached
            .as_ref()
            .filter(|record| !development && record.is_fresh(now, self.settings.cache_ttl))
            .map(|record| record.progress.clone())
            .unwrap_or_default();

        let hint = effective_hint(&request.name_hint, cached.as_ref());
        let (name, name_error) = self.resolve_name(&address, &hint).await;

        let mut activity = fetch_activity(self.data_source.as_ref(), &key).await?;
        let holdings = std::mem::take(&mut activity.holdings);
        let transactions = merge_activity(activity, self.settings.secondary_chain_id);

        let outcome = {
            let _timer = SCAN_DURATION_SECONDS.start_timer();
            ScanEngine::new(&self.catalog).resume(&key, &transactions, &holdings, prior)
        };
        TRANSACTIONS_SCANNED.inc_by(transactions.len() as u64);
        info!(
            score = outcome.score,
            total_points_possible = outcome.total_points_possible,
            completed_achievements = outcome.completed_achievements,
            total_transactions = outcome.total_transactions,
            "Scan complete"
        );

        let active_since = outcome.active_since.unwrap_or(now);
        let record = CachedScore {
            address: key.clone(),
            season,
            score: outcome.score,
            name: name.clone(),
            progress: outcome.progress.clone(),
            transactions: Some(outcome.total_transactions),
            spent_on_gas: outcome.spent_on_gas,
            active_since: Some(active_since),
            updated_at: now,
            active: true,
        };
        if let Err(e) = self.cache.upsert(&record).await {
            CACHE_WRITE_FAILURES.inc();
            warn!(error = %e, "Failed to write score cache, continuing");
        }

        SCORE_REQUESTS.with_label_values(&["scanned"]).inc();
        Ok(ScoreReport {
            address: request.address.clone(),
            score: outcome.score,
            total_transactions: outcome.total_transactions,
            spent_on_gas: format_gas(outcome.spent_on_gas),
            active_since: active_since.to_rfc3339(),
            rank: self.rank(season, outcome.score).await,
            progress: outcome.progress,
            error: name_error,
            name,
        })
    }

    /// Returns the display name and whether a supplied domain failed to verify.
    async fn resolve_name(&self, address: &ethers::types::Address, hint: &NameHint) -> (String, bool) {
        let resolver = self.resolvers.for_hint(hint);
        match resolver.resolve(address, hint).await {
            Ok(resolution) => (resolution.into_name().unwrap_or_default(), false),
            Err(e) => match hint {
                NameHint::Domain(domain) => {
                    warn!(resolver = resolver.name(), domain = %domain, error = %e, "Domain does not verify for address");
                    (String::new(), true)
                }
                NameHint::Reverse => {
                    debug!(resolver = resolver.name(), error = %e, "Reverse lookup failed, continuing without a name");
                    (String::new(), false)
                }
            },
        }
    }

    async fn rank(&self, season: u32, score: u64) -> u64 {
        match self.cache.count_at_or_above(season, score).await {
            Ok(rank) => rank,
            Err(e) => {
                warn!(error = %e, "Rank lookup failed, reporting rank 0");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cached(name: &str, transactions: Option<u64>, age_hours: i64) -> CachedScore {
        CachedScore {
            address: "0x53db9542e3a0cdbfebb659d001799ba0b37b2275".to_string(),
            season: 2,
            score: 42,
            name: name.to_string(),
            progress: vec![ProgressMarker::Step(0, 0, 0)],
            transactions,
            spent_on_gas: 0.1,
            active_since: None,
            updated_at: Utc::now() - Duration::hours(age_hours),
            active: true,
        }
    }

    #[test]
    fn test_reuse_requires_fresh_record_with_transactions() {
        let now = Utc::now();
        let ttl = Duration::hours(24);
        assert!(should_reuse(&cached("", Some(5), 1), &NameHint::Reverse, false, now, ttl));
        assert!(!should_reuse(&cached("", Some(5), 30), &NameHint::Reverse, false, now, ttl));
        assert!(!should_reuse(&cached("", Some(0), 1), &NameHint::Reverse, false, now, ttl));
        assert!(!should_reuse(&cached("", None, 1), &NameHint::Reverse, false, now, ttl));
        assert!(!should_reuse(&cached("", Some(5), 1), &NameHint::Reverse, true, now, ttl));
    }

    #[test]
    fn test_new_domain_hint_forces_refresh() {
        let now = Utc::now();
        let ttl = Duration::hours(24);
        let hint = NameHint::Domain("alice.crypto".to_string());
        assert!(!should_reuse(&cached("", Some(5), 1), &hint, false, now, ttl));
        assert!(!should_reuse(&cached("bob.crypto", Some(5), 1), &hint, false, now, ttl));
        assert!(should_reuse(&cached("Alice.crypto", Some(5), 1), &hint, false, now, ttl));
    }

    #[test]
    fn test_cached_domain_name_becomes_hint() {
        let record = cached("alice.crypto", Some(5), 1);
        assert_eq!(
            effective_hint(&NameHint::Reverse, Some(&record)),
            NameHint::Domain("alice.crypto".to_string())
        );

        let ens = cached("alice.eth", Some(5), 1);
        assert_eq!(effective_hint(&NameHint::Reverse, Some(&ens)), NameHint::Reverse);
        assert_eq!(effective_hint(&NameHint::Reverse, None), NameHint::Reverse);

        let explicit = NameHint::Domain("bob.crypto".to_string());
        assert_eq!(effective_hint(&explicit, Some(&record)), explicit);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(outcome_label(&ScoreError::InvalidAddress("x".into())), "invalid");
        assert_eq!(outcome_label(&ScoreError::InactiveAddress("x".into())), "inactive");
        assert_eq!(outcome_label(&ScoreError::Other("x".into())), "failed");
    }
}
