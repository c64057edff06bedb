//! Attach the dashboard's indicator set to a price series.
//!
//! Indicators are recomputed on every request; they are cheap next to a
//! network fetch and are never cached on their own.

use super::signals::{RsiBand, Trend, VolumeLevel};
use super::{Indicator, Rsi, Sma};
use crate::domain::{PricePoint, PriceSeries};
use serde::Serialize;

pub const SMA_SHORT: usize = 20;
pub const SMA_LONG: usize = 50;
pub const RSI_PERIOD: usize = 14;
pub const VOLUME_WINDOW: usize = 20;

/// Per-point indicator columns plus labels for the latest point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSet {
    pub sma_20: Vec<f64>,
    pub sma_50: Vec<f64>,
    pub rsi_14: Vec<f64>,
    pub trend: Option<Trend>,
    pub volume: Option<VolumeLevel>,
    pub rsi_band: Option<RsiBand>,
    /// Mean volume of the trailing window used for `volume`.
    pub volume_average: Option<f64>,
}

/// A price series with its indicator columns.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedSeries {
    pub series: PriceSeries,
    pub indicators: IndicatorSet,
}

/// One point with its indicator values; `None` where undefined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnotatedRow<'a> {
    pub point: &'a PricePoint,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub rsi_14: Option<f64>,
}

fn defined(v: f64) -> Option<f64> {
    (!v.is_nan()).then_some(v)
}

impl AnnotatedSeries {
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = AnnotatedRow<'_>> + '_ {
        self.series
            .points()
            .iter()
            .enumerate()
            .map(move |(i, point)| AnnotatedRow {
                point,
                sma_20: defined(self.indicators.sma_20[i]),
                sma_50: defined(self.indicators.sma_50[i]),
                rsi_14: defined(self.indicators.rsi_14[i]),
            })
    }

    pub fn latest(&self) -> Option<AnnotatedRow<'_>> {
        self.rows().last()
    }

    pub fn latest_close(&self) -> Option<f64> {
        self.series.last().map(|p| p.close)
    }

    pub fn latest_sma_20(&self) -> Option<f64> {
        self.indicators.sma_20.last().copied().and_then(defined)
    }

    pub fn latest_sma_50(&self) -> Option<f64> {
        self.indicators.sma_50.last().copied().and_then(defined)
    }

    pub fn latest_rsi(&self) -> Option<f64> {
        self.indicators.rsi_14.last().copied().and_then(defined)
    }
}

/// Computes SMA(20), SMA(50), RSI(14) and the trend/volume/RSI labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndicatorEngine;

impl IndicatorEngine {
    pub fn annotate(&self, series: PriceSeries) -> AnnotatedSeries {
        let points = series.points();
        let sma_20 = Sma::new(SMA_SHORT).compute(points);
        let sma_50 = Sma::new(SMA_LONG).compute(points);
        let rsi_14 = Rsi::new(RSI_PERIOD).compute(points);

        let trend = match (points.last(), sma_20.last()) {
            (Some(p), Some(&sma)) => Trend::classify(p.close, sma),
            _ => None,
        };
        let rsi_band = rsi_14.last().copied().and_then(RsiBand::classify);

        let volume_average = trailing_volume_mean(points, VOLUME_WINDOW);
        let volume = match (points.last().and_then(|p| p.volume), volume_average) {
            (Some(latest), Some(avg)) => Some(VolumeLevel::classify(latest, avg)),
            _ => None,
        };

        AnnotatedSeries {
            indicators: IndicatorSet {
                sma_20,
                sma_50,
                rsi_14,
                trend,
                volume,
                rsi_band,
                volume_average,
            },
            series,
        }
    }
}

/// Annotate with the default engine.
pub fn annotate(series: PriceSeries) -> AnnotatedSeries {
    IndicatorEngine.annotate(series)
}

/// Mean volume of the last `window` points, the latest included.
///
/// Uses every point when fewer than `window` exist. Sessions without a
/// volume are left out of both the sum and the count; `None` when no
/// session in the window has one.
fn trailing_volume_mean(points: &[PricePoint], window: usize) -> Option<f64> {
    let tail = &points[points.len().saturating_sub(window)..];
    let (total, count) = tail
        .iter()
        .filter_map(|p| p.volume)
        .fold((0.0, 0usize), |(sum, n), v| (sum + v as f64, n + 1));
    (count > 0).then(|| total / count as f64)
}
