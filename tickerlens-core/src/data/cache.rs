//! In-memory two-layer cache in front of the fetcher.
//!
//! Layers, keyed by `(Ticker, Period)`:
//! - fresh: entries younger than `fresh_ttl` are served without calling the
//!   refresh function at all.
//! - fallback: the last successful entry for the key, kept until `clear()`.
//!   Served (marked stale) when a refresh fails.
//!
//! Both layers share one `Mutex`. The lock is never held while the refresh
//! function runs, and an entry is always replaced whole, so a reader sees
//! either the old entry or the new one.

use super::clock::{Clock, SystemClock};
use super::fetcher::FetchError;
use super::provider::ProviderResponse;
use crate::domain::{Period, PriceSeries, Snapshot, Ticker};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Default fresh-window TTL: 15 minutes.
pub const DEFAULT_FRESH_TTL: Duration = Duration::from_secs(15 * 60);

pub type CacheKey = (Ticker, Period);

/// One successful fetch. Never modified after insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub ticker: Ticker,
    pub period: Period,
    pub series: PriceSeries,
    pub snapshot: Snapshot,
    /// Wall-clock time of the fetch, for display.
    pub fetched_at: DateTime<Utc>,
    /// Monotonic time of the fetch, for TTL checks.
    stored_at: Instant,
}

/// Whether data came from a fresh fetch/fresh-window hit or from the fallback layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Staleness {
    Fresh,
    Stale,
}

impl Staleness {
    pub fn is_stale(&self) -> bool {
        matches!(self, Staleness::Stale)
    }
}

#[derive(Debug, Clone)]
pub struct CachedData {
    pub entry: Arc<CacheEntry>,
    pub staleness: Staleness,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("no data available for {ticker} ({period}): {source}")]
    NoDataAvailable {
        ticker: Ticker,
        period: Period,
        source: FetchError,
    },
}

/// Counters for diagnostics. Survive `clear()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub fresh_entries: usize,
    pub fallback_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub stale_serves: u64,
}

#[derive(Default)]
struct CacheState {
    fresh: HashMap<CacheKey, Arc<CacheEntry>>,
    fallback: HashMap<CacheKey, Arc<CacheEntry>>,
    hits: u64,
    misses: u64,
    stale_serves: u64,
}

pub struct StaleCache {
    state: Mutex<CacheState>,
    fresh_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl StaleCache {
    pub fn new(fresh_ttl: Duration) -> Self {
        Self::with_clock(fresh_ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(fresh_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            fresh_ttl,
            clock,
        }
    }

    /// Serve from the fresh window, else refresh, else fall back to the last
    /// success for the key.
    ///
    /// `refresh` is called at most once per invocation.
    pub fn get_or_refresh<F>(
        &self,
        ticker: &Ticker,
        period: Period,
        refresh: F,
    ) -> Result<CachedData, CacheError>
    where
        F: FnOnce() -> Result<ProviderResponse, FetchError>,
    {
        let key = (ticker.clone(), period);

        {
            let mut state = self.lock();
            let now = self.clock.now();
            if let Some(entry) = state.fresh.get(&key) {
                if now.saturating_duration_since(entry.stored_at) < self.fresh_ttl {
                    let entry = Arc::clone(entry);
                    state.hits += 1;
                    debug!(%ticker, %period, "fresh-window cache hit");
                    return Ok(CachedData {
                        entry,
                        staleness: Staleness::Fresh,
                    });
                }
            }
            state.misses += 1;
        }

        match refresh() {
            Ok(response) => {
                let entry = Arc::new(CacheEntry {
                    ticker: ticker.clone(),
                    period,
                    series: response.series,
                    snapshot: response.snapshot,
                    fetched_at: Utc::now(),
                    stored_at: self.clock.now(),
                });
                let mut state = self.lock();
                state.fresh.insert(key.clone(), Arc::clone(&entry));
                state.fallback.insert(key, Arc::clone(&entry));
                Ok(CachedData {
                    entry,
                    staleness: Staleness::Fresh,
                })
            }
            Err(source) => {
                let mut state = self.lock();
                match state.fallback.get(&key).cloned() {
                    Some(entry) => {
                        state.stale_serves += 1;
                        warn!(
                            %ticker,
                            %period,
                            fetched_at = %entry.fetched_at,
                            error = %source,
                            "refresh failed, serving stale data"
                        );
                        Ok(CachedData {
                            entry,
                            staleness: Staleness::Stale,
                        })
                    }
                    None => Err(CacheError::NoDataAvailable {
                        ticker: ticker.clone(),
                        period,
                        source,
                    }),
                }
            }
        }
    }

    /// Drop every entry from both layers.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.fresh.clear();
        state.fallback.clear();
        debug!("cache cleared");
    }

    /// Drop fresh-window entries past their TTL. Fallback entries are kept.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.fresh_ttl;
        let mut state = self.lock();
        let before = state.fresh.len();
        state
            .fresh
            .retain(|_, e| now.saturating_duration_since(e.stored_at) < ttl);
        before - state.fresh.len()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            fresh_entries: state.fresh.len(),
            fallback_entries: state.fallback.len(),
            hits: state.hits,
            misses: state.misses,
            stale_serves: state.stale_serves,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for StaleCache {
    fn default() -> Self {
        Self::new(DEFAULT_FRESH_TTL)
    }
}
