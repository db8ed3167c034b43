use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chainscore::{
    cache::{CachedScore, InMemoryScoreCache, ScoreCache},
    errors::{CacheError, FetchError, NameError},
    names::{NameResolution, NameResolver},
    providers::ChainDataSource,
    types::{Chain, NameHint, Poap, TokenHolding, Transaction, TransferKind},
};
use ethers::types::Address;

// === Mock Chain Data Source ===
#[derive(Debug, Default)]
pub struct MockDataSource {
    pub listings: HashMap<(Chain, TransferKind), Vec<Transaction>>,
    pub tokens: Vec<TokenHolding>,
    pub poaps: Vec<Poap>,
    pub fail_poaps: bool,
    calls: AtomicUsize,
}

impl MockDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listing(mut self, chain: Chain, kind: TransferKind, txs: Vec<Transaction>) -> Self {
        self.listings.insert((chain, kind), txs);
        self
    }

    pub fn with_tokens(mut self, tokens: Vec<TokenHolding>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_poaps(mut self, poaps: Vec<Poap>) -> Self {
        self.poaps = poaps;
        self
    }

    /// The POAP listing answers with something that is not a list.
    pub fn failing(mut self) -> Self {
        self.fail_poaps = true;
        self
    }

    /// Total upstream calls made so far (eight per evaluation).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainDataSource for MockDataSource {
    async fn account_transfers(
        &self,
        chain: Chain,
        kind: TransferKind,
        _address: &str,
    ) -> Result<Vec<Transaction>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.listings.get(&(chain, kind)).cloned().unwrap_or_default())
    }

    async fn token_holdings(&self, _address: &str) -> Result<Vec<TokenHolding>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.tokens.clone())
    }

    async fn poaps(&self, _address: &str) -> Result<Vec<Poap>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_poaps {
            return Err(FetchError::UnexpectedShape {
                source_name: "poap".to_string(),
                detail: "badge listing is not a list".to_string(),
            });
        }
        Ok(self.poaps.clone())
    }
}

// === Mock Name Resolver ===
#[derive(Debug, Clone)]
pub enum MockName {
    Found(String),
    NotFound,
    Mismatch,
    Down,
}

#[derive(Debug)]
pub struct MockResolver {
    pub behavior: MockName,
    calls: AtomicUsize,
}

impl MockResolver {
    pub fn new(behavior: MockName) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NameResolver for MockResolver {
    async fn resolve(&self, _address: &Address, hint: &NameHint) -> Result<NameResolution, NameError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            MockName::Found(name) => Ok(NameResolution::Resolved(name.clone())),
            MockName::NotFound => Ok(NameResolution::NotFound),
            MockName::Mismatch => Err(NameError::Mismatch {
                domain: hint.domain().unwrap_or_default().to_string(),
                resolved: "0x0000000000000000000000000000000000000001".to_string(),
            }),
            MockName::Down => Err(NameError::Transport("connection refused".to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

// === Cache With Injected Failures ===
#[derive(Debug, Default)]
pub struct FailingCache {
    pub inner: InMemoryScoreCache,
    pub fail_reads: bool,
    pub fail_writes: bool,
    pub fail_rank: bool,
}

#[async_trait]
impl ScoreCache for FailingCache {
    async fn find(&self, address: &str, season: u32) -> Result<Option<CachedScore>, CacheError> {
        if self.fail_reads {
            return Err(CacheError::Database("read refused".to_string()));
        }
        self.inner.find(address, season).await
    }

    async fn upsert(&self, record: &CachedScore) -> Result<(), CacheError> {
        if self.fail_writes {
            return Err(CacheError::Database("write refused".to_string()));
        }
        self.inner.upsert(record).await
    }

    async fn count_at_or_above(&self, season: u32, score: u64) -> Result<u64, CacheError> {
        if self.fail_rank {
            return Err(CacheError::Database("rank refused".to_string()));
        }
        self.inner.count_at_or_above(season, score).await
    }
}
