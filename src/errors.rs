//! # Centralized Error Handling
//!
//! This module defines the hierarchical error enums for the scoring service.
//! Every external collaborator (upstream explorers, name services, the cache
//! store, the achievement catalog) has its own typed error, and all of them
//! fold into the top-level [`ScoreError`].

use thiserror::Error;

/// The top-level error type, encapsulating all possible failures of one evaluation.
#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Address {0} is flagged inactive")]
    InactiveAddress(String),
    #[error("Upstream fetch error: {0}")]
    Fetch(#[from] FetchError),
    #[error("Name resolution error: {0}")]
    Name(#[from] NameError),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Other error: {0}")]
    Other(String),
}

/// Errors raised while pulling transaction, token or POAP data from upstream APIs.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request to {source_name} failed: {message}")]
    Http { source_name: String, message: String },
    #[error("{source_name} returned HTTP {status}: {body}")]
    Status {
        source_name: String,
        status: u16,
        body: String,
    },
    #[error("Unexpected response shape from {source_name}: {detail}")]
    UnexpectedShape { source_name: String, detail: String },
    #[error("Rate limited by {0}")]
    RateLimited(String),
    #[error("Rate limiter for {0} timed out")]
    LimiterTimeout(String),
    #[error("Request to {0} timed out")]
    Timeout(String),
}

/// Errors related to resolving a display name for an address.
#[derive(Error, Debug)]
pub enum NameError {
    #[error("Name lookup transport error: {0}")]
    Transport(String),
    #[error("Domain {0} could not be resolved")]
    Unresolved(String),
    #[error("Domain {domain} resolves to {resolved}, not the requested address")]
    Mismatch { domain: String, resolved: String },
    #[error("Name provider error: {0}")]
    Provider(String),
}

/// Errors related to the persistent score cache and rank oracle.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Corrupt cache record for {address}: {detail}")]
    Corrupt { address: String, detail: String },
    #[error("Cache not configured: {0}")]
    NotConfigured(String),
}

/// Errors raised while loading or validating the achievement catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {message}")]
    Io { path: String, message: String },
    #[error("Failed to parse catalog: {0}")]
    Parse(String),
    #[error("Step '{step}' of type {step_type} is missing parameter '{param}'")]
    MissingParam {
        step: String,
        step_type: String,
        param: &'static str,
    },
    #[error("Unknown step type: {0}")]
    UnknownStepType(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        let source_name = e
            .url()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "upstream".to_string());
        if e.is_timeout() {
            FetchError::Timeout(source_name)
        } else {
            FetchError::Http {
                source_name,
                message: e.to_string(),
            }
        }
    }
}

impl From<reqwest::Error> for NameError {
    fn from(e: reqwest::Error) -> Self {
        NameError::Transport(format!("HTTP request failed: {}", e))
    }
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(e: serde_json::Error) -> Self {
        CatalogError::Parse(format!("line {}, column {}: {}", e.line(), e.column(), e))
    }
}

impl From<eyre::Report> for ScoreError {
    fn from(e: eyre::Report) -> Self {
        ScoreError::Config(format!("{:#}", e))
    }
}
