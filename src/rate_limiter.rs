// File: src/rate_limiter.rs

use crate::config::RateLimiterSettings;
use crate::errors::FetchError;
use crate::metrics::{UPSTREAM_LATENCY, UPSTREAM_RETRIES};
use dashmap::DashMap;
use futures::Future;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as GovernorRateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, trace, warn};

const RATE_LIMIT_ERRORS: &[&str] = &[
    "rate limit",
    "too many requests",
    "max rate limit reached",
    "429",
];

#[derive(Debug, Clone, Default)]
pub struct UpstreamCallMetrics {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub rate_limited_calls: u64,
    pub failed_calls: u64,
    pub total_wait_time_ms: u64,
}

/// Whether an upstream failure is worth retrying after a backoff.
fn is_rate_limited(err: &FetchError) -> bool {
    match err {
        FetchError::RateLimited(_) => true,
        FetchError::Status { status, .. } => *status == 429,
        FetchError::UnexpectedShape { detail, .. } | FetchError::Http { message: detail, .. } => {
            let lower = detail.to_lowercase();
            RATE_LIMIT_ERRORS.iter().any(|pattern| lower.contains(pattern))
        }
        _ => false,
    }
}

/// A governor-backed limiter for one upstream service (an explorer, Ethplorer, POAP).
#[derive(Debug)]
pub struct ApiRateLimiter {
    service: String,
    rate_limiter: DefaultDirectRateLimiter,
    metrics: RwLock<UpstreamCallMetrics>,
    settings: RateLimiterSettings,
}

impl ApiRateLimiter {
    pub fn new(service: &str, settings: RateLimiterSettings) -> Self {
        let rps_limit = settings.rps_for(service);
        let quota = Quota::per_second(NonZeroU32::new(rps_limit).unwrap_or(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::new(settings.burst_size).unwrap_or(NonZeroU32::MIN));

        info!(service = service, rps_limit = rps_limit, "Initialized upstream rate limiter");

        Self {
            service: service.to_string(),
            rate_limiter: GovernorRateLimiter::direct(quota),
            metrics: RwLock::new(UpstreamCallMetrics::default()),
            settings,
        }
    }

    async fn wait_on_limiter(&self, method_name: &str) -> Result<(), FetchError> {
        let wait_start = Instant::now();
        match timeout(
            Duration::from_secs(self.settings.limiter_timeout_secs),
            self.rate_limiter.until_ready(),
        )
        .await
        {
            Ok(_) => {
                let wait_time = wait_start.elapsed();
                self.metrics.write().await.total_wait_time_ms += wait_time.as_millis() as u64;
                trace!(
                    service = %self.service,
                    method = method_name,
                    wait_ms = wait_time.as_millis(),
                    "Rate limit check passed"
                );
                Ok(())
            }
            Err(_) => {
                self.metrics.write().await.rate_limited_calls += 1;
                error!(
                    service = %self.service,
                    method = method_name,
                    timeout_secs = self.settings.limiter_timeout_secs,
                    "Rate limiter timed out"
                );
                Err(FetchError::LimiterTimeout(self.service.clone()))
            }
        }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let backoff_ms = self.settings.initial_backoff_ms as f64
            * self.settings.backoff_multiplier.powf(attempt.saturating_sub(1) as f64);
        Duration::from_millis((backoff_ms as u64).min(self.settings.max_backoff_ms))
    }

    /// Runs `call_fn` under the limiter, retrying with exponential backoff when the
    /// upstream answers with a rate-limit reply. Any other failure returns immediately.
    pub async fn execute<F, Fut, T>(&self, method_name: &str, call_fn: F) -> Result<T, FetchError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let start_time = Instant::now();
        self.metrics.write().await.total_calls += 1;

        let max_attempts = self.settings.max_retries.saturating_add(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            if attempt > 1 {
                UPSTREAM_RETRIES.with_label_values(&[self.service.as_str()]).inc();
            }
            self.wait_on_limiter(method_name).await?;

            debug!(service = %self.service, method = method_name, attempt = attempt, "Calling upstream");

            match call_fn().await {
                Ok(result) => {
                    self.metrics.write().await.successful_calls += 1;
                    UPSTREAM_LATENCY
                        .with_label_values(&[self.service.as_str()])
                        .observe(start_time.elapsed().as_secs_f64());
                    return Ok(result);
                }
                Err(e) if is_rate_limited(&e) && attempt < max_attempts => {
                    let backoff = self.backoff_for(attempt);
                    warn!(
                        service = %self.service,
                        method = method_name,
                        attempt = attempt,
                        error = %e,
                        backoff_ms = backoff.as_millis(),
                        "Rate limit reply, retrying with backoff"
                    );
                    self.metrics.write().await.rate_limited_calls += 1;
                    sleep(backoff).await;
                }
                Err(e) => {
                    debug!(
                        service = %self.service,
                        method = method_name,
                        attempt = attempt,
                        error = %e,
                        "Upstream call failed (non-retryable or max attempts)"
                    );
                    self.metrics.write().await.failed_calls += 1;
                    return Err(e);
                }
            }
        }
    }

    pub async fn get_metrics(&self) -> UpstreamCallMetrics {
        self.metrics.read().await.clone()
    }
}

/// Hands out one shared limiter per upstream service name.
#[derive(Debug)]
pub struct RateLimiterRegistry {
    limiters: DashMap<String, Arc<ApiRateLimiter>>,
    settings: RateLimiterSettings,
}

impl RateLimiterRegistry {
    pub fn new(settings: RateLimiterSettings) -> Self {
        Self {
            limiters: DashMap::new(),
            settings,
        }
    }

    pub fn get_or_create(&self, service: &str) -> Arc<ApiRateLimiter> {
        self.limiters
            .entry(service.to_string())
            .or_insert_with(|| Arc::new(ApiRateLimiter::new(service, self.settings.clone())))
            .clone()
    }

    pub async fn get_all_metrics(&self) -> std::collections::HashMap<String, UpstreamCallMetrics> {
        let limiters: Vec<(String, Arc<ApiRateLimiter>)> = self
            .limiters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let mut all_metrics = std::collections::HashMap::new();
        for (service, limiter) in limiters {
            all_metrics.insert(service, limiter.get_metrics().await);
        }
        all_metrics
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}
