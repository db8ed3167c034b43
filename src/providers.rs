// src/providers.rs

//! # Upstream Activity Providers
//!
//! Pulls everything the scan needs for one address: explorer account listings
//! for both chains, the token-balance listing and the POAP badge listing. All
//! HTTP calls go through the per-service rate limiters.

use crate::config::{Config, EndpointConfig, Secrets};
use crate::errors::FetchError;
use crate::metrics::UPSTREAM_FETCH_FAILURES;
use crate::rate_limiter::RateLimiterRegistry;
use crate::types::{Chain, ChainActivity, Holdings, Poap, TokenHolding, Transaction, TransferKind};
use async_trait::async_trait;
use futures::Future;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

//================================================================================================//
//                                         CONSTANTS                                             //
//================================================================================================//

const EXPLORER_END_BLOCK: &str = "99999999";
/// Ethplorer's public key, used when no key is configured.
const ETHPLORER_FREE_KEY: &str = "freekey";
const MAX_ERROR_BODY_CHARS: usize = 512;

//================================================================================================//
//                                      TRAIT DEFINITION                                          //
//================================================================================================//

/// A source of on-chain activity for an address.
#[async_trait]
pub trait ChainDataSource: Send + Sync + fmt::Debug {
    /// One explorer account listing, oldest first.
    async fn account_transfers(
        &self,
        chain: Chain,
        kind: TransferKind,
        address: &str,
    ) -> Result<Vec<Transaction>, FetchError>;

    /// Token balances held by the address.
    async fn token_holdings(&self, address: &str) -> Result<Vec<TokenHolding>, FetchError>;

    /// POAP badges held by the address.
    async fn poaps(&self, address: &str) -> Result<Vec<Poap>, FetchError>;
}

//================================================================================================//
//                                     HTTP IMPLEMENTATION                                        //
//================================================================================================//

/// Envelope shared by Etherscan-compatible explorers.
#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerResponse {
    #[serde(default)]
    pub status: Value,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub result: Value,
}

#[derive(Debug, Clone)]
pub struct HttpChainDataSource {
    client: Client,
    endpoints: EndpointConfig,
    secrets: Secrets,
    limiters: Arc<RateLimiterRegistry>,
}

impl HttpChainDataSource {
    pub fn new(config: &Config, limiters: Arc<RateLimiterRegistry>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(FetchError::from)?;
        Ok(Self {
            client,
            endpoints: config.endpoints.clone(),
            secrets: config.secrets.clone(),
            limiters,
        })
    }

    fn explorer_for(&self, chain: Chain) -> (&'static str, &str, Option<&str>) {
        match chain {
            Chain::Ethereum => (
                "etherscan",
                self.endpoints.etherscan.as_str(),
                self.secrets.etherscan_api_key.as_deref(),
            ),
            Chain::Polygon => (
                "polygonscan",
                self.endpoints.polygonscan.as_str(),
                self.secrets.polygonscan_api_key.as_deref(),
            ),
        }
    }

    fn request(&self, url: &str, query: &[(&str, String)], api_key_header: Option<&str>) -> RequestBuilder {
        let request = self.client.get(url).query(query);
        match api_key_header {
            Some(key) => request.header("X-API-Key", key),
            None => request,
        }
    }

    async fn fetch_value(
        &self,
        service: &str,
        url: &str,
        query: &[(&str, String)],
        api_key_header: Option<&str>,
    ) -> Result<Value, FetchError> {
        let response = self.request(url, query, api_key_header).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(MAX_ERROR_BODY_CHARS)
                .collect();
            return Err(FetchError::Status {
                source_name: service.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::UnexpectedShape {
                source_name: service.to_string(),
                detail: format!("body is not JSON: {}", e),
            })
    }
}

/// Query string of an explorer account listing, oldest first.
fn explorer_query(kind: TransferKind, address: &str, api_key: Option<&str>) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("module", "account".to_string()),
        ("action", kind.action().to_string()),
        ("address", address.to_string()),
        ("startblock", "0".to_string()),
        ("endblock", EXPLORER_END_BLOCK.to_string()),
        ("sort", "asc".to_string()),
    ];
    if let Some(key) = api_key {
        query.push(("apikey", key.to_string()));
    }
    query
}

#[async_trait]
impl ChainDataSource for HttpChainDataSource {
    #[instrument(skip(self), level = "debug")]
    async fn account_transfers(
        &self,
        chain: Chain,
        kind: TransferKind,
        address: &str,
    ) -> Result<Vec<Transaction>, FetchError> {
        let (service, url, api_key) = self.explorer_for(chain);
        let query = explorer_query(kind, address, api_key);
        let query = query.as_slice();

        let limiter = self.limiters.get_or_create(service);
        let transactions = limiter
            .execute(kind.action(), move || async move {
                let value = self.fetch_value(service, url, query, None).await?;
                parse_explorer_listing(service, value)
            })
            .await?;

        debug!(
            chain = chain.name(),
            service,
            action = kind.action(),
            count = transactions.len(),
            "Fetched explorer listing"
        );
        Ok(transactions)
    }

    #[instrument(skip(self), level = "debug")]
    async fn token_holdings(&self, address: &str) -> Result<Vec<TokenHolding>, FetchError> {
        let service = "ethplorer";
        let url = format!("{}/getAddressInfo/{}", self.endpoints.ethplorer.trim_end_matches('/'), address);
        let url = url.as_str();
        let api_key = self
            .secrets
            .ethplorer_api_key
            .clone()
            .unwrap_or_else(|| ETHPLORER_FREE_KEY.to_string());
        let query = [("apiKey", api_key)];
        let query = query.as_slice();

        let limiter = self.limiters.get_or_create(service);
        limiter
            .execute("getAddressInfo", move || async move {
                let value = self.fetch_value(service, url, query, None).await?;
                parse_token_holdings(service, value)
            })
            .await
    }

    #[instrument(skip(self), level = "debug")]
    async fn poaps(&self, address: &str) -> Result<Vec<Poap>, FetchError> {
        let service = "poap";
        let url = format!("{}/actions/scan/{}", self.endpoints.poap.trim_end_matches('/'), address);
        let url = url.as_str();
        let api_key = self.secrets.poap_api_key.as_deref();

        let limiter = self.limiters.get_or_create(service);
        limiter
            .execute("scan", move || async move {
                let value = self.fetch_value(service, url, &[], api_key).await?;
                parse_poaps(service, value)
            })
            .await
    }
}

//================================================================================================//
//                                     RESPONSE PARSING                                           //
//================================================================================================//

/// Explorers answer 200 with a string `result` on errors, including rate limiting.
pub fn parse_explorer_listing(service: &str, value: Value) -> Result<Vec<Transaction>, FetchError> {
    let response: ExplorerResponse =
        serde_json::from_value(value).map_err(|e| FetchError::UnexpectedShape {
            source_name: service.to_string(),
            detail: e.to_string(),
        })?;

    match response.result {
        Value::Array(_) => serde_json::from_value(response.result).map_err(|e| {
            FetchError::UnexpectedShape {
                source_name: service.to_string(),
                detail: format!("malformed transaction record: {}", e),
            }
        }),
        Value::String(ref text) if text.to_lowercase().contains("rate limit") => {
            Err(FetchError::RateLimited(service.to_string()))
        }
        other => Err(FetchError::UnexpectedShape {
            source_name: service.to_string(),
            detail: format!("result is not a list ({}): {}", response.message, other),
        }),
    }
}

/// A body without a `tokens` list means the address holds no tokens.
pub fn parse_token_holdings(service: &str, value: Value) -> Result<Vec<TokenHolding>, FetchError> {
    match value.get("tokens") {
        Some(tokens @ Value::Array(_)) => {
            serde_json::from_value(tokens.clone()).map_err(|e| FetchError::UnexpectedShape {
                source_name: service.to_string(),
                detail: format!("malformed token record: {}", e),
            })
        }
        _ => Ok(Vec::new()),
    }
}

pub fn parse_poaps(service: &str, value: Value) -> Result<Vec<Poap>, FetchError> {
    if !value.is_array() {
        return Err(FetchError::UnexpectedShape {
            source_name: service.to_string(),
            detail: "badge listing is not a list".to_string(),
        });
    }
    serde_json::from_value(value).map_err(|e| FetchError::UnexpectedShape {
        source_name: service.to_string(),
        detail: format!("malformed badge record: {}", e),
    })
}

//================================================================================================//
//                                      ACTIVITY FETCH                                            //
//================================================================================================//

async fn observed<T, Fut>(label: &'static str, fut: Fut) -> Result<T, FetchError>
where
    Fut: Future<Output = Result<T, FetchError>>,
{
    fut.await.map_err(|e| {
        UPSTREAM_FETCH_FAILURES.with_label_values(&[label]).inc();
        warn!(source = label, error = %e, "Upstream fetch failed");
        e
    })
}

/// Runs all eight upstream fetches concurrently. The first failure aborts the rest.
#[instrument(skip(source))]
pub async fn fetch_activity(
    source: &dyn ChainDataSource,
    address: &str,
) -> Result<ChainActivity, FetchError> {
    let (
        transactions,
        tokens,
        nft_transfers,
        token_transfers,
        poaps,
        secondary_transactions,
        secondary_nft_transfers,
        secondary_token_transfers,
    ) = tokio::try_join!(
        observed(
            "ethereum_txlist",
            source.account_transfers(Chain::Ethereum, TransferKind::Normal, address)
        ),
        observed("token_holdings", source.token_holdings(address)),
        observed(
            "ethereum_tokennfttx",
            source.account_transfers(Chain::Ethereum, TransferKind::Nft, address)
        ),
        observed(
            "ethereum_tokentx",
            source.account_transfers(Chain::Ethereum, TransferKind::Token, address)
        ),
        observed("poaps", source.poaps(address)),
        observed(
            "polygon_txlist",
            source.account_transfers(Chain::Polygon, TransferKind::Normal, address)
        ),
        observed(
            "polygon_tokennfttx",
            source.account_transfers(Chain::Polygon, TransferKind::Nft, address)
        ),
        observed(
            "polygon_tokentx",
            source.account_transfers(Chain::Polygon, TransferKind::Token, address)
        ),
    )?;

    Ok(ChainActivity {
        transactions,
        nft_transfers,
        token_transfers,
        secondary_transactions,
        secondary_nft_transfers,
        secondary_token_transfers,
        holdings: Holdings { tokens, poaps },
    })
}
