//! Yahoo Finance data provider.
//!
//! History comes from the v8 chart API, which also carries enough metadata for
//! the core snapshot fields (price, previous close, 52-week range, volume).
//! Market cap, P/E, dividend yield, average volume and the business summary
//! come from the quoteSummary API, which needs a cookie + crumb pair. That
//! second call is best-effort: if it fails the snapshot just has fewer fields.
//!
//! Each of the up to four requests of one fetch (chart, cookie, crumb,
//! summary) is admitted through the attempt's `RequestGate` and times out at
//! whatever is left of the attempt's budget.
//!
//! Yahoo Finance has no official API and is subject to unannounced format
//! changes, so every field is parsed as optional.

use super::provider::{PriceProvider, ProviderError, ProviderResponse, RequestGate};
use crate::domain::{Period, PricePoint, PriceSeries, Snapshot, Ticker};
use reqwest::header;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";
pub const DEFAULT_COOKIE_URL: &str = "https://fc.yahoo.com";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const SUMMARY_MODULES: &str = "price,summaryDetail,summaryProfile";

// ── Chart API models ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    previous_close: Option<f64>,
    fifty_two_week_high: Option<f64>,
    fifty_two_week_low: Option<f64>,
    regular_market_volume: Option<u64>,
    long_name: Option<String>,
    short_name: Option<String>,
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteData>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

// ── quoteSummary API models ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResponse {
    quote_summary: SummaryContainer,
}

#[derive(Debug, Deserialize)]
struct SummaryContainer {
    result: Option<Vec<SummaryResult>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResult {
    price: Option<SummaryPrice>,
    summary_detail: Option<SummaryDetail>,
    summary_profile: Option<SummaryProfile>,
}

/// Yahoo wraps numbers as `{"raw": 1.0, "fmt": "1.00"}`, or `{}` when absent.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct RawValue {
    raw: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryPrice {
    regular_market_price: Option<RawValue>,
    long_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryDetail {
    previous_close: Option<RawValue>,
    market_cap: Option<RawValue>,
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<RawValue>,
    dividend_yield: Option<RawValue>,
    fifty_two_week_high: Option<RawValue>,
    fifty_two_week_low: Option<RawValue>,
    volume: Option<RawValue>,
    average_volume: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryProfile {
    long_business_summary: Option<String>,
}

fn raw(v: Option<RawValue>) -> Option<f64> {
    v.and_then(|v| v.raw).filter(|x| x.is_finite())
}

fn raw_count(v: Option<RawValue>) -> Option<u64> {
    raw(v).filter(|x| *x >= 0.0).map(|x| x.round() as u64)
}

// ── Provider ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Crumb {
    cookie: String,
    crumb: String,
}

/// Yahoo Finance data provider.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    cookie_url: String,
    enrich_snapshot: bool,
    crumb: Mutex<Option<Crumb>>,
}

impl YahooProvider {
    /// Build a provider whose HTTP calls are never allowed more than `timeout`;
    /// the attempt budget handed out by the gate usually cuts them shorter.
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProviderError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            cookie_url: DEFAULT_COOKIE_URL.to_string(),
            enrich_snapshot: true,
            crumb: Mutex::new(None),
        })
    }

    /// Point the provider at a different host (a stub server in tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_cookie_url(mut self, cookie_url: impl Into<String>) -> Self {
        self.cookie_url = cookie_url.into();
        self
    }

    /// Enable or disable the quoteSummary enrichment call.
    pub fn with_summary(mut self, enabled: bool) -> Self {
        self.enrich_snapshot = enabled;
        self
    }

    fn chart_url(&self, ticker: &Ticker, period: Period) -> String {
        format!(
            "{}/v8/finance/chart/{ticker}?range={period}&interval=1d&includePrePost=false",
            self.base_url
        )
    }

    fn summary_url(&self, ticker: &Ticker, crumb: &str) -> String {
        format!(
            "{}/v10/finance/quoteSummary/{ticker}?modules={SUMMARY_MODULES}&crumb={crumb}",
            self.base_url
        )
    }

    fn transport_error(e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout(e.to_string())
        } else {
            ProviderError::Network(e.to_string())
        }
    }

    fn check_status(ticker: &Ticker, status: reqwest::StatusCode) -> Result<(), ProviderError> {
        if status.is_success() {
            return Ok(());
        }
        Err(match status {
            reqwest::StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
            reqwest::StatusCode::NOT_FOUND => ProviderError::SymbolNotFound {
                ticker: ticker.clone(),
            },
            other => ProviderError::HttpStatus {
                status: other.as_u16(),
                ticker: ticker.clone(),
            },
        })
    }

    fn fetch_chart(
        &self,
        ticker: &Ticker,
        period: Period,
        gate: &dyn RequestGate,
    ) -> Result<ChartResponse, ProviderError> {
        let url = self.chart_url(ticker, period);
        let budget = gate.admit()?;
        debug!(%url, ?budget, "requesting chart");
        let resp = self
            .client
            .get(&url)
            .timeout(budget)
            .send()
            .map_err(Self::transport_error)?;
        Self::check_status(ticker, resp.status())?;
        resp.json().map_err(|e| {
            ProviderError::ResponseFormat(format!("failed to parse chart for {ticker}: {e}"))
        })
    }

    /// Parse a chart response into rows plus the metadata-derived snapshot.
    fn parse_chart(ticker: &Ticker, resp: ChartResponse) -> Result<ProviderResponse, ProviderError> {
        let results = match (resp.chart.result, resp.chart.error) {
            (Some(results), _) => results,
            (None, Some(err)) if err.code == "Not Found" => {
                return Err(ProviderError::SymbolNotFound {
                    ticker: ticker.clone(),
                })
            }
            (None, Some(err)) => {
                return Err(ProviderError::ResponseFormat(format!(
                    "{}: {}",
                    err.code,
                    err.description.unwrap_or_default()
                )))
            }
            (None, None) => {
                return Err(ProviderError::ResponseFormat(
                    "empty result with no error".into(),
                ))
            }
        };

        // A present-but-empty result array means "no data", same as no timestamps.
        let Some(data) = results.into_iter().next() else {
            return Ok(ProviderResponse::default());
        };

        let meta = data.meta.unwrap_or_default();
        let offset = meta.gmtoffset.unwrap_or(0);
        let snapshot = Snapshot {
            current_price: meta.regular_market_price,
            previous_close: meta.previous_close,
            fifty_two_week_high: meta.fifty_two_week_high,
            fifty_two_week_low: meta.fifty_two_week_low,
            volume: meta.regular_market_volume,
            long_name: meta.long_name.or(meta.short_name),
            ..Default::default()
        };

        let timestamps = data.timestamp.unwrap_or_default();
        let quote = data
            .indicators
            .and_then(|i| i.quote.into_iter().next())
            .unwrap_or_default();

        let mut points = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let date = chrono::DateTime::from_timestamp(ts + offset, 0)
                .map(|dt| dt.naive_utc().date())
                .ok_or_else(|| {
                    ProviderError::ResponseFormat(format!("invalid timestamp: {ts}"))
                })?;

            // Rows without a close are holidays or half-published sessions.
            let Some(close) = quote.close.get(i).copied().flatten() else {
                continue;
            };
            let field = |v: &[Option<f64>]| v.get(i).copied().flatten().unwrap_or(close);

            points.push(PricePoint {
                date,
                open: field(&quote.open[..]),
                high: field(&quote.high[..]),
                low: field(&quote.low[..]),
                close,
                volume: quote.volume.get(i).copied().flatten(),
            });
        }

        Ok(ProviderResponse {
            series: PriceSeries::new(points),
            snapshot,
        })
    }

    fn ensure_crumb(&self, gate: &dyn RequestGate) -> Result<Crumb, ProviderError> {
        if let Some(crumb) = self.lock_crumb().as_ref() {
            return Ok(crumb.clone());
        }

        let budget = gate.admit()?;
        let resp = self
            .client
            .get(&self.cookie_url)
            .timeout(budget)
            .send()
            .map_err(Self::transport_error)?;
        let cookie = resp
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(';').next())
            .map(str::to_string)
            .ok_or_else(|| ProviderError::ResponseFormat("no Yahoo session cookie".into()))?;

        let budget = gate.admit()?;
        let crumb = self
            .client
            .get(format!("{}/v1/test/getcrumb", self.base_url))
            .header(header::COOKIE, &cookie)
            .timeout(budget)
            .send()
            .map_err(Self::transport_error)?
            .text()
            .map_err(Self::transport_error)?;

        if crumb.trim().is_empty() || crumb.contains('<') {
            return Err(ProviderError::ResponseFormat("invalid Yahoo crumb".into()));
        }

        let fresh = Crumb {
            cookie,
            crumb: crumb.trim().to_string(),
        };
        *self.lock_crumb() = Some(fresh.clone());
        Ok(fresh)
    }

    fn lock_crumb(&self) -> std::sync::MutexGuard<'_, Option<Crumb>> {
        self.crumb.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fetch_summary(
        &self,
        ticker: &Ticker,
        gate: &dyn RequestGate,
    ) -> Result<SummaryResult, ProviderError> {
        let crumb = self.ensure_crumb(gate)?;
        let budget = gate.admit()?;
        let resp = self
            .client
            .get(self.summary_url(ticker, &crumb.crumb))
            .header(header::COOKIE, &crumb.cookie)
            .timeout(budget)
            .send()
            .map_err(Self::transport_error)?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            *self.lock_crumb() = None;
        }
        Self::check_status(ticker, resp.status())?;

        let body: SummaryResponse = resp.json().map_err(|e| {
            ProviderError::ResponseFormat(format!("failed to parse quoteSummary for {ticker}: {e}"))
        })?;
        Ok(body
            .quote_summary
            .result
            .and_then(|r| r.into_iter().next())
            .unwrap_or_default())
    }

    /// Overlay quoteSummary fields onto a chart-derived snapshot.
    ///
    /// Summary values win where present; chart values are kept otherwise.
    fn merge_summary(mut snapshot: Snapshot, summary: SummaryResult) -> Snapshot {
        if let Some(price) = summary.price {
            snapshot.current_price = raw(price.regular_market_price).or(snapshot.current_price);
            snapshot.long_name = price.long_name.or(snapshot.long_name);
        }
        if let Some(detail) = summary.summary_detail {
            snapshot.previous_close = raw(detail.previous_close).or(snapshot.previous_close);
            snapshot.market_cap = raw(detail.market_cap);
            snapshot.trailing_pe = raw(detail.trailing_pe);
            snapshot.dividend_yield = raw(detail.dividend_yield);
            snapshot.fifty_two_week_high =
                raw(detail.fifty_two_week_high).or(snapshot.fifty_two_week_high);
            snapshot.fifty_two_week_low =
                raw(detail.fifty_two_week_low).or(snapshot.fifty_two_week_low);
            snapshot.volume = raw_count(detail.volume).or(snapshot.volume);
            snapshot.average_volume = raw_count(detail.average_volume);
        }
        if let Some(profile) = summary.summary_profile {
            snapshot.business_summary = profile.long_business_summary;
        }
        snapshot
    }
}

impl PriceProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch(
        &self,
        ticker: &Ticker,
        period: Period,
        gate: &dyn RequestGate,
    ) -> Result<ProviderResponse, ProviderError> {
        let chart = self.fetch_chart(ticker, period, gate)?;
        let mut response = Self::parse_chart(ticker, chart)?;

        // Enrichment runs on what is left of the attempt; running out of
        // budget here still returns the chart-derived snapshot.
        if self.enrich_snapshot && !response.series.is_empty() {
            match self.fetch_summary(ticker, gate) {
                Ok(summary) => {
                    response.snapshot = Self::merge_summary(response.snapshot, summary);
                }
                Err(e) => {
                    warn!(%ticker, error = %e, "quoteSummary unavailable, snapshot limited to chart metadata");
                }
            }
        }

        Ok(response)
    }
}
