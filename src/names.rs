// src/names.rs

//! # Display Name Resolution
//!
//! Two ways of naming an address: a reverse lookup through an ENS-aware JSON-RPC
//! provider, and a forward lookup of a caller-supplied domain whose owner must
//! be the scored address. The request's [`NameHint`] selects which one runs.

use crate::config::Config;
use crate::errors::NameError;
use crate::types::NameHint;
use crate::utils::helpers::{address_key, same_address};
use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::Address;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameResolution {
    Resolved(String),
    NotFound,
}

impl NameResolution {
    pub fn into_name(self) -> Option<String> {
        match self {
            NameResolution::Resolved(name) => Some(name),
            NameResolution::NotFound => None,
        }
    }
}

#[async_trait]
pub trait NameResolver: Send + Sync + fmt::Debug {
    async fn resolve(&self, address: &Address, hint: &NameHint) -> Result<NameResolution, NameError>;

    fn name(&self) -> &'static str;
}

//================================================================================================//
//                                      REVERSE (ENS)                                             //
//================================================================================================//

#[derive(Debug, Clone)]
pub struct EnsReverseResolver {
    provider: Arc<Provider<Http>>,
}

impl EnsReverseResolver {
    pub fn new(rpc_url: &str) -> Result<Self, NameError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| NameError::Provider(format!("invalid RPC url: {}", e)))?;
        info!("Initialized ENS reverse resolver");
        Ok(Self {
            provider: Arc::new(provider),
        })
    }
}

#[async_trait]
impl NameResolver for EnsReverseResolver {
    async fn resolve(&self, address: &Address, _hint: &NameHint) -> Result<NameResolution, NameError> {
        let name = self
            .provider
            .lookup_address(*address)
            .await
            .map_err(|e| NameError::Provider(e.to_string()))?;
        if name.trim().is_empty() {
            return Ok(NameResolution::NotFound);
        }
        debug!(address = %address_key(address), name = %name, "Reverse lookup resolved");
        Ok(NameResolution::Resolved(name))
    }

    fn name(&self) -> &'static str {
        "ens_reverse"
    }
}

//================================================================================================//
//                                     FORWARD (DOMAIN)                                           //
//================================================================================================//

/// Forward lookup against an Unstoppable-style resolution API.
#[derive(Debug, Clone)]
pub struct DomainNameResolver {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl DomainNameResolver {
    pub fn new(config: &Config) -> Result<Self, NameError> {
        let client = Client::builder().timeout(config.http_timeout()).build()?;
        Ok(Self {
            client,
            base_url: config.endpoints.unstoppable.trim_end_matches('/').to_string(),
            api_key: config.secrets.unstoppable_api_key.clone(),
        })
    }
}

/// Address a domain points at: its ETH record, or the registry owner when unset.
pub fn domain_owner(value: &Value) -> Option<String> {
    let record = value
        .get("records")
        .and_then(|records| records.get("crypto.ETH.address"))
        .and_then(Value::as_str);
    let owner = value
        .get("meta")
        .and_then(|meta| meta.get("owner"))
        .and_then(Value::as_str);
    record
        .or(owner)
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl NameResolver for DomainNameResolver {
    async fn resolve(&self, address: &Address, hint: &NameHint) -> Result<NameResolution, NameError> {
        let Some(domain) = hint.domain() else {
            return Ok(NameResolution::NotFound);
        };

        let mut request = self.client.get(format!("{}/domains/{}", self.base_url, domain));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => return Err(NameError::Unresolved(domain.to_string())),
            status if !status.is_success() => {
                return Err(NameError::Provider(format!("domain lookup returned HTTP {}", status)))
            }
            _ => {}
        }
        let body: Value = response.json().await?;

        let resolved = domain_owner(&body).ok_or_else(|| NameError::Unresolved(domain.to_string()))?;
        if !same_address(&resolved, &address_key(address)) {
            return Err(NameError::Mismatch {
                domain: domain.to_string(),
                resolved,
            });
        }
        Ok(NameResolution::Resolved(domain.to_string()))
    }

    fn name(&self) -> &'static str {
        "domain"
    }
}

//================================================================================================//
//                                        SELECTION                                               //
//================================================================================================//

/// Stand-in when a lookup backend is not configured. Never finds a name.
#[derive(Debug, Clone, Default)]
pub struct NoopResolver;

#[async_trait]
impl NameResolver for NoopResolver {
    async fn resolve(&self, _address: &Address, _hint: &NameHint) -> Result<NameResolution, NameError> {
        Ok(NameResolution::NotFound)
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

#[derive(Debug, Clone)]
pub struct NameResolvers {
    pub reverse: Arc<dyn NameResolver>,
    pub domain: Arc<dyn NameResolver>,
}

impl NameResolvers {
    pub fn new(reverse: Arc<dyn NameResolver>, domain: Arc<dyn NameResolver>) -> Self {
        Self { reverse, domain }
    }

    /// Reverse lookups are wired only when an RPC url is configured.
    pub fn from_config(config: &Config) -> Result<Self, NameError> {
        let reverse: Arc<dyn NameResolver> = match config.secrets.eth_rpc_url.as_deref() {
            Some(url) => Arc::new(EnsReverseResolver::new(url)?),
            None => Arc::new(NoopResolver),
        };
        Ok(Self {
            reverse,
            domain: Arc::new(DomainNameResolver::new(config)?),
        })
    }

    pub fn for_hint(&self, hint: &NameHint) -> &dyn NameResolver {
        match hint {
            NameHint::Reverse => self.reverse.as_ref(),
            NameHint::Domain(_) => self.domain.as_ref(),
        }
    }
}

impl Default for NameResolvers {
    fn default() -> Self {
        Self::new(Arc::new(NoopResolver), Arc::new(NoopResolver))
    }
}
