//! RateLimitedFetcher: pacing and bounded retry around a `PriceProvider`.
//!
//! Every upstream HTTP request (within an attempt, across attempts and across
//! callers) is spaced at least `policy.pacing` after the previous one, and all
//! requests of one attempt share a single `policy.attempt_timeout` budget.
//! Transient failures are retried up to `policy.max_attempts` with the
//! policy's backoff; permanent failures stop immediately. The fetcher holds no
//! data: memoization lives in `StaleCache`.

use super::clock::{Clock, SystemClock};
use super::provider::{PriceProvider, ProviderError, ProviderResponse, RequestGate};
use super::retry::RetryPolicy;
use crate::domain::{Period, Ticker};
use std::cell::Cell;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("provider unavailable for {ticker} ({period}) after {attempts} attempt(s): {last_error}")]
    ProviderUnavailable {
        ticker: Ticker,
        period: Period,
        attempts: u32,
        last_error: ProviderError,
    },
}

impl FetchError {
    /// Description of the underlying failure that ended the fetch.
    pub fn last_error(&self) -> &ProviderError {
        match self {
            FetchError::ProviderUnavailable { last_error, .. } => last_error,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            FetchError::ProviderUnavailable { attempts, .. } => *attempts,
        }
    }
}

pub struct RateLimitedFetcher<P> {
    provider: P,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    last_call: Mutex<Option<Instant>>,
}

impl<P: PriceProvider> RateLimitedFetcher<P> {
    pub fn new(provider: P, policy: RetryPolicy) -> Self {
        Self::with_clock(provider, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(provider: P, policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            provider,
            policy,
            clock,
            last_call: Mutex::new(None),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Fetch history and snapshot for `ticker` over `period`.
    ///
    /// An empty series is returned as `Ok`; it is never retried.
    pub fn fetch(&self, ticker: &Ticker, period: Period) -> Result<ProviderResponse, FetchError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = self.policy.delay_before_retry(attempt - 1);
                debug!(%ticker, %period, attempt, ?delay, "backing off before retry");
                self.clock.sleep(delay);
            }

            let gate = AttemptGate {
                fetcher: self,
                deadline: Cell::new(None),
            };

            match self.provider.fetch(ticker, period, &gate) {
                Ok(response) => {
                    if response.series.is_empty() {
                        info!(%ticker, %period, provider = self.provider.name(), "provider returned no rows");
                    } else {
                        info!(
                            %ticker,
                            %period,
                            rows = response.series.len(),
                            attempt,
                            "fetched price history"
                        );
                    }
                    return Ok(response);
                }
                Err(e) if e.is_transient() => {
                    warn!(%ticker, %period, attempt, max_attempts, error = %e, "fetch attempt failed");
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!(%ticker, %period, attempt, error = %e, "permanent provider failure, not retrying");
                    return Err(FetchError::ProviderUnavailable {
                        ticker: ticker.clone(),
                        period,
                        attempts: attempt,
                        last_error: e,
                    });
                }
            }
        }

        Err(FetchError::ProviderUnavailable {
            ticker: ticker.clone(),
            period,
            attempts: max_attempts,
            last_error: last_error
                .unwrap_or_else(|| ProviderError::Network("no attempt was made".into())),
        })
    }

    /// Block until `policy.pacing` has passed since the previous upstream request.
    ///
    /// The lock is held across the sleep so concurrent callers queue up behind
    /// each other instead of all firing once the interval elapses.
    fn pace(&self) {
        let mut last = self.last_call.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(prev) = *last {
            let since = self.clock.now().saturating_duration_since(prev);
            if since < self.policy.pacing {
                let wait = self.policy.pacing - since;
                debug!(?wait, "pacing upstream request");
                self.clock.sleep(wait);
            }
        }
        *last = Some(self.clock.now());
    }
}

/// Gate for one attempt: paces every request and enforces the attempt budget.
///
/// The deadline starts at the first admitted request, so waiting for the
/// pacing slot of that request is not charged to the attempt.
struct AttemptGate<'a, P> {
    fetcher: &'a RateLimitedFetcher<P>,
    deadline: Cell<Option<Instant>>,
}

impl<P: PriceProvider> RequestGate for AttemptGate<'_, P> {
    fn admit(&self) -> Result<Duration, ProviderError> {
        let budget = self.fetcher.policy.attempt_timeout;
        let expired = || ProviderError::Timeout(format!("attempt exceeded its {budget:?} budget"));

        if let Some(deadline) = self.deadline.get() {
            if self.fetcher.clock.now() >= deadline {
                return Err(expired());
            }
        }

        self.fetcher.pace();
        let now = self.fetcher.clock.now();
        let deadline = match self.deadline.get() {
            Some(deadline) => deadline,
            None => {
                let deadline = now + budget;
                self.deadline.set(Some(deadline));
                deadline
            }
        };

        let remaining = deadline.saturating_duration_since(now);
        if remaining.is_zero() {
            return Err(expired());
        }
        Ok(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::clock::ManualClock;
    use crate::domain::{PricePoint, PriceSeries};
    use chrono::NaiveDate;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Provider that replays a script of outcomes and counts calls.
    struct Scripted {
        outcomes: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl PriceProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn fetch(
            &self,
            _: &Ticker,
            _: Period,
            gate: &dyn RequestGate,
        ) -> Result<ProviderResponse, ProviderError> {
            gate.admit()?;
            *self.calls.lock().unwrap() += 1;
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ProviderError::Network("script exhausted".into())))
        }
    }

    /// Provider whose every attempt issues `requests` upstream requests, the
    /// way a chart call plus snapshot enrichment does.
    struct MultiRequest {
        requests: usize,
        budgets: Mutex<Vec<Duration>>,
    }

    impl PriceProvider for MultiRequest {
        fn name(&self) -> &str {
            "multi"
        }

        fn fetch(
            &self,
            _: &Ticker,
            _: Period,
            gate: &dyn RequestGate,
        ) -> Result<ProviderResponse, ProviderError> {
            for _ in 0..self.requests {
                let budget = gate.admit()?;
                self.budgets.lock().unwrap().push(budget);
            }
            Ok(one_row())
        }
    }

    fn multi_fetcher(
        requests: usize,
        policy: RetryPolicy,
    ) -> (RateLimitedFetcher<MultiRequest>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let provider = MultiRequest {
            requests,
            budgets: Mutex::new(Vec::new()),
        };
        (
            RateLimitedFetcher::with_clock(provider, policy, clock.clone()),
            clock,
        )
    }

    fn one_row() -> ProviderResponse {
        ProviderResponse {
            series: PriceSeries::new(vec![PricePoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: Some(10),
            }]),
            snapshot: Default::default(),
        }
    }

    fn fetcher(
        outcomes: Vec<Result<ProviderResponse, ProviderError>>,
    ) -> (RateLimitedFetcher<Scripted>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let policy = RetryPolicy::new(3, Duration::from_secs(2), Duration::from_millis(500));
        (
            RateLimitedFetcher::with_clock(Scripted::new(outcomes), policy, clock.clone()),
            clock,
        )
    }

    #[test]
    fn success_on_first_attempt_does_not_sleep() {
        let (f, clock) = fetcher(vec![Ok(one_row())]);
        let resp = f.fetch(&Ticker::new("AAPL"), Period::OneYear).unwrap();
        assert_eq!(resp.series.len(), 1);
        assert_eq!(f.provider().calls(), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn retries_transient_failures_with_linear_backoff() {
        let (f, clock) = fetcher(vec![
            Err(ProviderError::Network("reset".into())),
            Err(ProviderError::Timeout("10s".into())),
            Ok(one_row()),
        ]);
        assert!(f.fetch(&Ticker::new("AAPL"), Period::OneYear).is_ok());
        assert_eq!(f.provider().calls(), 3);
        // backoff 2s then 4s; pacing already satisfied by the backoff
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[test]
    fn exhausting_attempts_reports_last_error() {
        let (f, _) = fetcher(vec![
            Err(ProviderError::Network("a".into())),
            Err(ProviderError::Network("b".into())),
            Err(ProviderError::RateLimited),
        ]);
        let err = f.fetch(&Ticker::new("AAPL"), Period::OneMonth).unwrap_err();
        assert_eq!(err.attempts(), 3);
        assert_eq!(err.last_error(), &ProviderError::RateLimited);
        assert_eq!(f.provider().calls(), 3);
    }

    #[test]
    fn permanent_failure_is_not_retried() {
        let (f, clock) = fetcher(vec![Err(ProviderError::ResponseFormat("bad".into()))]);
        let err = f.fetch(&Ticker::new("AAPL"), Period::OneMonth).unwrap_err();
        assert_eq!(err.attempts(), 1);
        assert_eq!(f.provider().calls(), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn empty_response_is_success_without_retry() {
        let (f, _) = fetcher(vec![Ok(ProviderResponse::default())]);
        let resp = f.fetch(&Ticker::new("AAPL"), Period::OneMonth).unwrap();
        assert!(resp.series.is_empty());
        assert_eq!(f.provider().calls(), 1);
    }

    #[test]
    fn back_to_back_calls_are_paced() {
        let (f, clock) = fetcher(vec![Ok(one_row()), Ok(one_row())]);
        f.fetch(&Ticker::new("AAPL"), Period::OneYear).unwrap();
        clock.advance(Duration::from_millis(200));
        f.fetch(&Ticker::new("MSFT"), Period::OneYear).unwrap();
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(300)]);
    }

    #[test]
    fn every_request_within_an_attempt_is_paced() {
        let policy = RetryPolicy::new(1, Duration::ZERO, Duration::from_secs(1));
        let (f, clock) = multi_fetcher(4, policy);
        f.fetch(&Ticker::new("AAPL"), Period::OneYear).unwrap();
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1); 3]);
        // The budget shrinks as the attempt's requests eat into it.
        assert_eq!(
            *f.provider().budgets.lock().unwrap(),
            vec![
                Duration::from_secs(10),
                Duration::from_secs(9),
                Duration::from_secs(8),
                Duration::from_secs(7),
            ]
        );
    }

    #[test]
    fn attempt_budget_bounds_all_requests() {
        let policy = RetryPolicy::new(1, Duration::ZERO, Duration::from_secs(1))
            .with_attempt_timeout(Duration::from_millis(2500));
        let (f, clock) = multi_fetcher(4, policy);
        let err = f.fetch(&Ticker::new("AAPL"), Period::OneYear).unwrap_err();
        assert!(matches!(err.last_error(), ProviderError::Timeout(_)));
        assert_eq!(
            *f.provider().budgets.lock().unwrap(),
            vec![
                Duration::from_millis(2500),
                Duration::from_millis(1500),
                Duration::from_millis(500),
            ]
        );
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1); 3]);
    }

    #[test]
    fn each_retry_gets_a_fresh_budget() {
        let policy = RetryPolicy::new(2, Duration::from_secs(2), Duration::from_secs(1))
            .with_attempt_timeout(Duration::from_millis(1500));
        let (f, _) = multi_fetcher(3, policy);
        let err = f.fetch(&Ticker::new("AAPL"), Period::OneYear).unwrap_err();
        assert_eq!(err.attempts(), 2);
        assert_eq!(
            *f.provider().budgets.lock().unwrap(),
            vec![
                Duration::from_millis(1500),
                Duration::from_millis(500),
                Duration::from_millis(1500),
                Duration::from_millis(500),
            ]
        );
    }
}
