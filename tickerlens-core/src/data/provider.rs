//! Data provider trait and structured error types.
//!
//! The PriceProvider trait abstracts over the upstream source so the fetcher
//! can be exercised against a stub in tests. A provider makes exactly one
//! attempt per call; pacing and retry live in `RateLimitedFetcher`, which
//! hands the provider a `RequestGate` for the attempt.

use crate::domain::{Period, PriceSeries, Snapshot, Ticker};
use std::time::Duration;
use thiserror::Error;

/// What a single successful provider call yields.
///
/// An empty `series` is a valid outcome (the provider had no rows for the
/// window), not a failure.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProviderResponse {
    pub series: PriceSeries,
    pub snapshot: Snapshot,
}

/// Failure of a single upstream attempt.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("network unreachable: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited by provider")]
    RateLimited,

    #[error("HTTP {status} for {ticker}")]
    HttpStatus { status: u16, ticker: Ticker },

    #[error("response format changed: {0}")]
    ResponseFormat(String),

    #[error("symbol not found: {ticker}")]
    SymbolNotFound { ticker: Ticker },

    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

impl ProviderError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Network(_) | ProviderError::Timeout(_) | ProviderError::RateLimited => {
                true
            }
            ProviderError::HttpStatus { status, .. } => *status >= 500,
            ProviderError::ResponseFormat(_)
            | ProviderError::SymbolNotFound { .. }
            | ProviderError::Client(_) => false,
        }
    }
}

/// Admission to the upstream for the requests of one attempt.
///
/// A provider calls `admit` before every HTTP request it issues, however many
/// one attempt needs. The gate waits out the pacing interval and returns what
/// is left of the attempt's time budget, to be used as that request's timeout.
pub trait RequestGate {
    /// Fails with `ProviderError::Timeout` once the budget is spent.
    fn admit(&self) -> Result<Duration, ProviderError>;
}

/// Trait for upstream price providers.
pub trait PriceProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch the daily history for `period` plus the current snapshot.
    ///
    /// Every upstream request goes through `gate` first.
    fn fetch(
        &self,
        ticker: &Ticker,
        period: Period,
        gate: &dyn RequestGate,
    ) -> Result<ProviderResponse, ProviderError>;
}

impl<P: PriceProvider + ?Sized> PriceProvider for std::sync::Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(
        &self,
        ticker: &Ticker,
        period: Period,
        gate: &dyn RequestGate,
    ) -> Result<ProviderResponse, ProviderError> {
        (**self).fetch(ticker, period, gate)
    }
}
