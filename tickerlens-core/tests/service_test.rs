//! Integration tests for MarketDataService with a stub provider and a manual clock.
//!
//! Covers:
//! 1. Fresh-window hits do not reach the provider
//! 2. Expired entries are refetched
//! 3. Provider outage falls back to the last success, marked stale
//! 4. No earlier success → NoDataAvailable
//! 5. Unknown tickers never reach the provider
//! 6. Pacing and backoff timing
//! 7. clear_cache drops the fallback layer too

use chrono::NaiveDate;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tickerlens_core::data::{
    Clock, ManualClock, PriceProvider, ProviderError, ProviderResponse, RateLimitedFetcher,
    RequestGate, RetryPolicy, StaleCache, Staleness,
};
use tickerlens_core::domain::{Period, PricePoint, PriceSeries, Roster, Snapshot, Ticker};
use tickerlens_core::indicators::Trend;
use tickerlens_core::{MarketDataService, ServiceError};

// ── Helpers ──────────────────────────────────────────────────────────

const TTL: Duration = Duration::from_secs(15 * 60);

/// Provider whose health can be toggled from the test.
#[derive(Default)]
struct StubProvider {
    calls: AtomicUsize,
    failing: AtomicBool,
    permanent_failure: AtomicBool,
    empty: AtomicBool,
    requested: Mutex<Vec<(Ticker, Period)>>,
}

impl StubProvider {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl PriceProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    fn fetch(
        &self,
        ticker: &Ticker,
        period: Period,
        gate: &dyn RequestGate,
    ) -> Result<ProviderResponse, ProviderError> {
        gate.admit()?;
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested
            .lock()
            .unwrap()
            .push((ticker.clone(), period));

        if self.permanent_failure.load(Ordering::SeqCst) {
            return Err(ProviderError::SymbolNotFound {
                ticker: ticker.clone(),
            });
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::Network("connection refused".into()));
        }
        if self.empty.load(Ordering::SeqCst) {
            return Ok(ProviderResponse::default());
        }

        // Rising closes; the call number nudges the last close so successive
        // fetches are distinguishable.
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let mut points = make_points(&closes);
        if let Some(last) = points.last_mut() {
            last.close += n as f64 / 100.0;
        }
        Ok(ProviderResponse {
            series: PriceSeries::new(points),
            snapshot: Snapshot {
                current_price: Some(129.0),
                previous_close: Some(128.0),
                long_name: Some(format!("{ticker} Corp")),
                ..Default::default()
            },
        })
    }
}

fn make_points(closes: &[f64]) -> Vec<PricePoint> {
    let base = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| PricePoint {
            date: base + chrono::Duration::days(i as i64),
            open: close - 0.5,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: Some(1_000_000),
        })
        .collect()
}

struct Harness {
    service: MarketDataService<Arc<StubProvider>>,
    provider: Arc<StubProvider>,
    clock: Arc<ManualClock>,
}

fn harness_with(policy: RetryPolicy) -> Harness {
    let provider = Arc::new(StubProvider::default());
    let clock = Arc::new(ManualClock::new());
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let fetcher = RateLimitedFetcher::with_clock(Arc::clone(&provider), policy, dyn_clock.clone());
    let cache = StaleCache::with_clock(TTL, dyn_clock);
    Harness {
        service: MarketDataService::new(Roster::default_roster(), fetcher, cache),
        provider,
        clock,
    }
}

fn harness() -> Harness {
    harness_with(RetryPolicy::default())
}

// ── Fresh window ─────────────────────────────────────────────────────

#[test]
fn second_request_within_ttl_is_served_from_cache() {
    let h = harness();

    let first = h.service.get_annotated("AAPL", Period::OneYear).unwrap();
    h.clock.advance(Duration::from_secs(60));
    let second = h.service.get_annotated("aapl", Period::OneYear).unwrap();

    assert_eq!(h.provider.calls(), 1);
    assert_eq!(first.staleness, Staleness::Fresh);
    assert_eq!(second.staleness, Staleness::Fresh);
    assert_eq!(first.fetched_at, second.fetched_at);
    assert_eq!(first.annotated.series, second.annotated.series);

    let stats = h.service.cache_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[test]
fn periods_are_cached_independently() {
    let h = harness();
    h.service.get_annotated("MSFT", Period::OneYear).unwrap();
    h.service.get_annotated("MSFT", Period::SixMonths).unwrap();
    assert_eq!(h.provider.calls(), 2);
    assert_eq!(h.service.cache_stats().fresh_entries, 2);
}

#[test]
fn expired_entry_is_refetched() {
    let h = harness();
    h.service.get_annotated("AAPL", Period::OneYear).unwrap();
    h.clock.advance(TTL + Duration::from_secs(1));
    let view = h.service.get_annotated("AAPL", Period::OneYear).unwrap();

    assert_eq!(h.provider.calls(), 2);
    assert_eq!(view.staleness, Staleness::Fresh);
    // Second fetch carries call index 1 in the last close.
    assert!((view.annotated.latest_close().unwrap() - 129.01).abs() < 1e-9);
}

// ── Stale fallback ───────────────────────────────────────────────────

#[test]
fn outage_serves_last_success_marked_stale() {
    let h = harness();
    let fresh = h.service.get_annotated("AAPL", Period::OneYear).unwrap();

    h.clock.advance(TTL + Duration::from_secs(1));
    h.provider.set_failing(true);
    let stale = h.service.get_annotated("AAPL", Period::OneYear).unwrap();

    assert!(stale.is_stale());
    assert_eq!(stale.fetched_at, fresh.fetched_at);
    assert_eq!(stale.annotated.series, fresh.annotated.series);
    assert_eq!(stale.snapshot, fresh.snapshot);
    // One success, then three failed attempts.
    assert_eq!(h.provider.calls(), 4);
    assert_eq!(h.service.cache_stats().stale_serves, 1);
}

#[test]
fn recovery_after_outage_is_fresh_again() {
    let h = harness();
    h.service.get_annotated("AAPL", Period::OneYear).unwrap();
    h.clock.advance(TTL + Duration::from_secs(1));
    h.provider.set_failing(true);
    assert!(h.service.get_annotated("AAPL", Period::OneYear).unwrap().is_stale());

    h.provider.set_failing(false);
    let view = h.service.get_annotated("AAPL", Period::OneYear).unwrap();
    assert_eq!(view.staleness, Staleness::Fresh);
}

#[test]
fn outage_without_history_is_no_data_available() {
    let h = harness();
    h.provider.set_failing(true);

    let err = h.service.get_annotated("TSLA", Period::OneYear).unwrap_err();
    match err {
        ServiceError::NoDataAvailable(cache_err) => {
            let msg = cache_err.to_string();
            assert!(msg.contains("TSLA"), "{msg}");
            assert!(msg.contains("3 attempt"), "{msg}");
        }
        other => panic!("expected NoDataAvailable, got {other:?}"),
    }
    assert_eq!(h.provider.calls(), 3);
}

#[test]
fn permanent_failure_is_not_retried() {
    let h = harness();
    h.provider.permanent_failure.store(true, Ordering::SeqCst);
    let err = h.service.get_annotated("IBM", Period::OneMonth).unwrap_err();
    assert!(matches!(err, ServiceError::NoDataAvailable(_)));
    assert_eq!(h.provider.calls(), 1);
    assert!(h.clock.sleeps().is_empty());
}

#[test]
fn empty_success_replaces_cached_series() {
    let h = harness();
    h.service.get_annotated("KO", Period::OneYear).unwrap();
    h.clock.advance(TTL + Duration::from_secs(1));
    h.provider.empty.store(true, Ordering::SeqCst);

    let view = h.service.get_annotated("KO", Period::OneYear).unwrap();
    assert_eq!(view.staleness, Staleness::Fresh);
    assert!(view.annotated.is_empty());
    assert_eq!(view.annotated.indicators.trend, None);
}

// ── Ticker resolution ────────────────────────────────────────────────

#[test]
fn unknown_ticker_never_reaches_provider() {
    let h = harness();
    let err = h.service.get_annotated("ZZZZ", Period::OneYear).unwrap_err();
    assert!(matches!(err, ServiceError::UnknownTicker(ref t) if t == "ZZZZ"));
    assert_eq!(h.provider.calls(), 0);
}

#[test]
fn company_name_resolves_to_symbol() {
    let h = harness();
    let view = h.service.get_annotated("Apple Inc.", Period::ThreeMonths).unwrap();
    assert_eq!(view.ticker.as_str(), "AAPL");
    assert_eq!(view.company, "Apple Inc.");
    let requested = h.provider.requested.lock().unwrap().clone();
    assert_eq!(requested, vec![(Ticker::new("AAPL"), Period::ThreeMonths)]);
}

#[test]
fn period_string_is_validated() {
    let h = harness();
    let err = h.service.get_annotated_str("AAPL", "7y").unwrap_err();
    assert!(matches!(err, ServiceError::InvalidPeriod(_)));
    assert_eq!(h.provider.calls(), 0);

    let view = h.service.get_annotated_str("AAPL", "6MO").unwrap();
    assert_eq!(view.period, Period::SixMonths);
}

// ── Timing ───────────────────────────────────────────────────────────

#[test]
fn back_to_back_fetches_are_paced() {
    let h = harness();
    h.service.get_annotated("AAPL", Period::OneYear).unwrap();
    h.service.get_annotated("MSFT", Period::OneYear).unwrap();
    h.clock.advance(Duration::from_millis(400));
    h.service.get_annotated("GOOGL", Period::OneYear).unwrap();

    assert_eq!(
        h.clock.sleeps(),
        vec![Duration::from_secs(1), Duration::from_millis(600)]
    );
}

#[test]
fn retries_back_off_linearly() {
    let h = harness();
    h.provider.set_failing(true);
    let _ = h.service.get_annotated("NVDA", Period::OneYear);

    // 2s then 4s; each backoff already exceeds the 1s pacing interval.
    assert_eq!(
        h.clock.sleeps(),
        vec![Duration::from_secs(2), Duration::from_secs(4)]
    );
}

// ── Cache management ─────────────────────────────────────────────────

#[test]
fn clear_cache_drops_fallback_layer() {
    let h = harness();
    h.service.get_annotated("AAPL", Period::OneYear).unwrap();
    h.service.clear_cache();
    h.provider.set_failing(true);

    let err = h.service.get_annotated("AAPL", Period::OneYear).unwrap_err();
    assert!(matches!(err, ServiceError::NoDataAvailable(_)));
    let stats = h.service.cache_stats();
    assert_eq!(stats.fresh_entries, 0);
    assert_eq!(stats.fallback_entries, 0);
}

#[test]
fn clear_cache_forces_refetch() {
    let h = harness_with(RetryPolicy::immediate(1));
    h.service.get_annotated("AAPL", Period::OneYear).unwrap();
    h.service.clear_cache();
    h.service.get_annotated("AAPL", Period::OneYear).unwrap();
    assert_eq!(h.provider.calls(), 2);
}

// ── Annotation through the service ───────────────────────────────────

#[test]
fn view_carries_indicators_and_snapshot() {
    let h = harness_with(RetryPolicy::immediate(1));
    let view = h.service.get_annotated("AAPL", Period::OneYear).unwrap();

    assert_eq!(view.annotated.len(), 30);
    assert_eq!(view.annotated.indicators.trend, Some(Trend::Above));
    assert!(view.annotated.latest_sma_20().is_some());
    assert!(view.annotated.latest_sma_50().is_none());
    assert_eq!(view.snapshot.price_change(), Some(1.0));
    assert_eq!(view.snapshot.long_name.as_deref(), Some("AAPL Corp"));
}

#[test]
fn concurrent_requests_share_one_service() {
    let h = harness_with(RetryPolicy::immediate(1));
    let service = &h.service;
    std::thread::scope(|s| {
        for symbol in ["AAPL", "MSFT", "AMZN", "META"] {
            s.spawn(move || {
                for _ in 0..5 {
                    let view = service.get_annotated(symbol, Period::OneYear).unwrap();
                    assert_eq!(view.ticker.as_str(), symbol);
                }
            });
        }
    });
    // Each key fetched at least once; repeat requests hit the fresh window
    // unless they raced the first fetch.
    assert!(h.provider.calls() >= 4);
    assert!(h.provider.calls() <= 20);
    assert_eq!(h.service.cache_stats().fresh_entries, 4);
}
