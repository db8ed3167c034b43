//! Score Cache
//!
//! Stores the last evaluation of each (address, season) and answers rank queries.
//! Postgres backs the service; the in-memory store serves tests and local runs.

use crate::errors::CacheError;
use crate::progress::ProgressMarker;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// One cached evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedScore {
    /// Lowercase `0x`-prefixed address.
    pub address: String,
    pub season: u32,
    pub score: u64,
    pub name: String,
    pub progress: Vec<ProgressMarker>,
    /// `None` for records written before transaction counts were stored.
    pub transactions: Option<u64>,
    pub spent_on_gas: f64,
    pub active_since: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    /// Inactive records are never re-scored. Writes never change this flag.
    pub active: bool,
}

impl CachedScore {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.signed_duration_since(self.updated_at) < ttl
    }
}

#[async_trait]
pub trait ScoreCache: Send + Sync + fmt::Debug {
    async fn find(&self, address: &str, season: u32) -> Result<Option<CachedScore>, CacheError>;

    /// Inserts or replaces the record for (address, season), keeping the stored active flag.
    async fn upsert(&self, record: &CachedScore) -> Result<(), CacheError>;

    /// Number of records in `season` with a score of at least `score`.
    async fn count_at_or_above(&self, season: u32, score: u64) -> Result<u64, CacheError>;
}

//================================================================================================//
//                                       IN-MEMORY                                                //
//================================================================================================//

#[derive(Debug, Clone, Default)]
pub struct InMemoryScoreCache {
    records: Arc<RwLock<HashMap<(String, u32), CachedScore>>>,
}

impl InMemoryScoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `record` as-is, including its active flag.
    pub async fn insert_raw(&self, record: CachedScore) {
        let key = (record.address.clone(), record.season);
        self.records.write().await.insert(key, record);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ScoreCache for InMemoryScoreCache {
    async fn find(&self, address: &str, season: u32) -> Result<Option<CachedScore>, CacheError> {
        Ok(self
            .records
            .read()
            .await
            .get(&(address.to_lowercase(), season))
            .cloned())
    }

    async fn upsert(&self, record: &CachedScore) -> Result<(), CacheError> {
        let mut records = self.records.write().await;
        let key = (record.address.to_lowercase(), record.season);
        let active = records.get(&key).map_or(true, |existing| existing.active);
        records.insert(
            key,
            CachedScore {
                active,
                ..record.clone()
            },
        );
        debug!(address = %record.address, season = record.season, "Cached score in memory");
        Ok(())
    }

    async fn count_at_or_above(&self, season: u32, score: u64) -> Result<u64, CacheError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.season == season && r.score >= score)
            .count() as u64)
    }
}

//================================================================================================//
//                                        POSTGRES                                                //
//================================================================================================//

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS address_scores (
    address      TEXT             NOT NULL,
    season       INTEGER          NOT NULL,
    score        BIGINT           NOT NULL DEFAULT 0,
    name         TEXT             NOT NULL DEFAULT '',
    progress     TEXT             NOT NULL DEFAULT '[]',
    transactions BIGINT,
    spent_on_gas DOUBLE PRECISION NOT NULL DEFAULT 0,
    active_since TIMESTAMPTZ,
    active       BOOLEAN          NOT NULL DEFAULT TRUE,
    updated_at   TIMESTAMPTZ      NOT NULL DEFAULT NOW(),
    PRIMARY KEY (address, season)
)"#;

const CREATE_RANK_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_address_scores_season_score ON address_scores (season, score)";

#[derive(Debug, FromRow)]
struct ScoreRow {
    address: String,
    season: i32,
    score: i64,
    name: String,
    progress: String,
    transactions: Option<i64>,
    spent_on_gas: f64,
    active_since: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    active: bool,
}

impl TryFrom<ScoreRow> for CachedScore {
    type Error = CacheError;

    fn try_from(row: ScoreRow) -> Result<Self, Self::Error> {
        let corrupt = |detail: String| CacheError::Corrupt {
            address: row.address.clone(),
            detail,
        };
        let progress: Vec<ProgressMarker> = serde_json::from_str(&row.progress)
            .map_err(|e| corrupt(format!("progress is not a marker list: {}", e)))?;
        let score = u64::try_from(row.score).map_err(|_| corrupt(format!("negative score {}", row.score)))?;
        let season =
            u32::try_from(row.season).map_err(|_| corrupt(format!("negative season {}", row.season)))?;

        Ok(CachedScore {
            season,
            score,
            name: row.name,
            progress,
            transactions: row.transactions.and_then(|t| u64::try_from(t).ok()),
            spent_on_gas: row.spent_on_gas,
            active_since: row.active_since,
            updated_at: row.updated_at,
            active: row.active,
            address: row.address,
        })
    }
}

fn to_db_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[derive(Debug, Clone)]
pub struct PgScoreCache {
    pool: PgPool,
}

impl PgScoreCache {
    pub async fn connect(database_url: &str) -> Result<Self, CacheError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        info!("Connected score cache to Postgres");
        Ok(Self { pool })
    }

    pub async fn ensure_schema(&self) -> Result<(), CacheError> {
        sqlx::query(CREATE_TABLE_SQL).execute(&self.pool).await?;
        sqlx::query(CREATE_RANK_INDEX_SQL).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ScoreCache for PgScoreCache {
    async fn find(&self, address: &str, season: u32) -> Result<Option<CachedScore>, CacheError> {
        let row = sqlx::query_as::<_, ScoreRow>(
            "SELECT address, season, score, name, progress, transactions, spent_on_gas, \
             active_since, updated_at, active \
             FROM address_scores WHERE address = $1 AND season = $2",
        )
        .bind(address.to_lowercase())
        .bind(season as i32)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CachedScore::try_from).transpose()
    }

    async fn upsert(&self, record: &CachedScore) -> Result<(), CacheError> {
        let progress = serde_json::to_string(&record.progress).map_err(|e| CacheError::Corrupt {
            address: record.address.clone(),
            detail: e.to_string(),
        })?;

        sqlx::query(
            "INSERT INTO address_scores \
             (address, season, score, name, progress, transactions, spent_on_gas, active_since, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (address, season) DO UPDATE SET \
             score = EXCLUDED.score, name = EXCLUDED.name, progress = EXCLUDED.progress, \
             transactions = EXCLUDED.transactions, spent_on_gas = EXCLUDED.spent_on_gas, \
             active_since = EXCLUDED.active_since, updated_at = EXCLUDED.updated_at",
        )
        .bind(record.address.to_lowercase())
        .bind(record.season as i32)
        .bind(to_db_int(record.score))
        .bind(&record.name)
        .bind(progress)
        .bind(record.transactions.map(to_db_int))
        .bind(record.spent_on_gas)
        .bind(record.active_since)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(address = %record.address, season = record.season, score = record.score, "Upserted cached score");
        Ok(())
    }

    async fn count_at_or_above(&self, season: u32, score: u64) -> Result<u64, CacheError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM address_scores WHERE season = $1 AND score >= $2",
        )
        .bind(season as i32)
        .bind(to_db_int(score))
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(address: &str, season: u32, score: u64) -> CachedScore {
        CachedScore {
            address: address.to_string(),
            season,
            score,
            name: String::new(),
            progress: vec![ProgressMarker::Step(0, 0, 0)],
            transactions: Some(3),
            spent_on_gas: 0.5,
            active_since: None,
            updated_at: Utc::now(),
            active: true,
        }
    }

    #[tokio::test]
    async fn test_upsert_keeps_stored_active_flag() {
        let cache = InMemoryScoreCache::new();
        let mut inactive = record("0xabc", 2, 10);
        inactive.active = false;
        cache.insert_raw(inactive).await;

        cache.upsert(&record("0xabc", 2, 50)).await.unwrap();

        let stored = cache.find("0xABC", 2).await.unwrap().unwrap();
        assert_eq!(stored.score, 50);
        assert!(!stored.active);
    }

    #[tokio::test]
    async fn test_rank_counts_within_season() {
        let cache = InMemoryScoreCache::new();
        cache.upsert(&record("0x1", 2, 10)).await.unwrap();
        cache.upsert(&record("0x2", 2, 30)).await.unwrap();
        cache.upsert(&record("0x3", 1, 99)).await.unwrap();

        assert_eq!(cache.count_at_or_above(2, 10).await.unwrap(), 2);
        assert_eq!(cache.count_at_or_above(2, 30).await.unwrap(), 1);
        assert_eq!(cache.count_at_or_above(2, 31).await.unwrap(), 0);
    }

    #[test]
    fn test_freshness_window() {
        let now = Utc::now();
        let mut r = record("0x1", 2, 0);
        r.updated_at = now - Duration::hours(23);
        assert!(r.is_fresh(now, Duration::hours(24)));
        r.updated_at = now - Duration::hours(25);
        assert!(!r.is_fresh(now, Duration::hours(24)));
    }
}
