//! PricePoint and PriceSeries: the raw OHLCV data the pipeline works on.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One trading session for one instrument.
///
/// Provider data is trusted: OHLC ordering is not re-validated here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// `None` when the provider published the session without a volume.
    pub volume: Option<u64>,
}

/// Ordered sequence of price points, strictly increasing by date.
///
/// Immutable once built. Indicators are attached separately in an
/// `AnnotatedSeries` rather than written into the points.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build a series, sorting by date and collapsing duplicate dates.
    ///
    /// When the same date appears more than once the last row wins, which is
    /// how the provider reports an intraday-updated final session.
    pub fn new(mut points: Vec<PricePoint>) -> Self {
        points.sort_by_key(|p| p.date);
        let mut deduped: Vec<PricePoint> = Vec::with_capacity(points.len());
        for point in points {
            match deduped.last_mut() {
                Some(prev) if prev.date == point.date => *prev = point,
                _ => deduped.push(point),
            }
        }
        Self { points: deduped }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }
}
