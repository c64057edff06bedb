//! MarketDataService: the single entry point for consumers.
//!
//! Resolves the ticker against the roster, asks the cache for the best
//! available data (which refreshes through the fetcher when needed), and
//! annotates the series with indicators.
//!
//! The service owns its cache; it is created once at start-up and the cache
//! only empties through `clear_cache()`.

use crate::config::TickerlensConfig;
use crate::data::{
    CacheError, CacheStats, PriceProvider, ProviderError, RateLimitedFetcher, StaleCache,
    Staleness, YahooProvider,
};
use crate::domain::{ParsePeriodError, Period, Roster, Snapshot, Ticker};
use crate::indicators::{AnnotatedSeries, IndicatorEngine};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unknown ticker '{0}': not on the company roster")]
    UnknownTicker(String),

    #[error(transparent)]
    InvalidPeriod(#[from] ParsePeriodError),

    #[error(transparent)]
    NoDataAvailable(#[from] CacheError),
}

/// Everything the presentation layer needs for one (ticker, period) view.
#[derive(Debug, Clone)]
pub struct MarketView {
    pub ticker: Ticker,
    pub company: String,
    pub period: Period,
    pub annotated: AnnotatedSeries,
    pub snapshot: Snapshot,
    pub staleness: Staleness,
    pub fetched_at: DateTime<Utc>,
}

impl MarketView {
    pub fn is_stale(&self) -> bool {
        self.staleness.is_stale()
    }
}

pub struct MarketDataService<P> {
    roster: Roster,
    fetcher: RateLimitedFetcher<P>,
    cache: StaleCache,
    engine: IndicatorEngine,
}

impl<P: PriceProvider> MarketDataService<P> {
    pub fn new(roster: Roster, fetcher: RateLimitedFetcher<P>, cache: StaleCache) -> Self {
        Self {
            roster,
            fetcher,
            cache,
            engine: IndicatorEngine,
        }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Best available annotated series for `query` (symbol or company name).
    ///
    /// Fails only for an unknown ticker, or when the provider is down and no
    /// earlier success for this key exists.
    pub fn get_annotated(&self, query: &str, period: Period) -> Result<MarketView, ServiceError> {
        let entry = self
            .roster
            .resolve(query)
            .ok_or_else(|| ServiceError::UnknownTicker(query.trim().to_string()))?;
        let ticker = entry.ticker.clone();

        let cached = self
            .cache
            .get_or_refresh(&ticker, period, || self.fetcher.fetch(&ticker, period))?;

        let annotated = self.engine.annotate(cached.entry.series.clone());

        Ok(MarketView {
            company: entry.name.clone(),
            ticker,
            period,
            annotated,
            snapshot: cached.entry.snapshot.clone(),
            staleness: cached.staleness,
            fetched_at: cached.entry.fetched_at,
        })
    }

    /// Same as `get_annotated` with the period given in its wire form.
    pub fn get_annotated_str(&self, query: &str, period: &str) -> Result<MarketView, ServiceError> {
        let period: Period = period.parse()?;
        self.get_annotated(query, period)
    }

    /// Drop every cached entry, fresh and fallback alike.
    ///
    /// Callers are expected to rate-limit this themselves (a UI cooldown).
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl MarketDataService<YahooProvider> {
    /// Service backed by Yahoo Finance, wired from configuration.
    pub fn yahoo(config: &TickerlensConfig) -> Result<Self, ProviderError> {
        let provider = YahooProvider::new(config.fetch.timeout())?
            .with_base_url(config.provider.base_url.clone())
            .with_cookie_url(config.provider.cookie_url.clone())
            .with_summary(config.provider.fetch_summary);
        let fetcher = RateLimitedFetcher::new(provider, config.retry_policy());
        let cache = StaleCache::new(config.cache.fresh_ttl());
        Ok(Self::new(config.roster(), fetcher, cache))
    }
}
