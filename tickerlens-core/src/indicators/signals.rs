//! Classification labels derived from the latest indicator values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Volume above this multiple of the trailing average counts as high.
pub const HIGH_VOLUME_MULTIPLE: f64 = 1.5;

pub const RSI_OVERSOLD: f64 = 30.0;
pub const RSI_OVERBOUGHT: f64 = 70.0;

/// Latest close relative to the latest SMA(20).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Above,
    Below,
}

impl Trend {
    /// `None` when the SMA is undefined.
    pub fn classify(close: f64, sma: f64) -> Option<Self> {
        if sma.is_nan() || close.is_nan() {
            return None;
        }
        Some(if close > sma { Trend::Above } else { Trend::Below })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Above => "above",
            Trend::Below => "below",
        }
    }
}

/// Latest volume relative to the trailing average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeLevel {
    High,
    Normal,
}

impl VolumeLevel {
    pub fn classify(latest: u64, trailing_mean: f64) -> Self {
        if latest as f64 > HIGH_VOLUME_MULTIPLE * trailing_mean {
            VolumeLevel::High
        } else {
            VolumeLevel::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeLevel::High => "high",
            VolumeLevel::Normal => "normal",
        }
    }
}

/// Display band for an RSI reading. 30 and 70 themselves are neutral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RsiBand {
    Oversold,
    Neutral,
    Overbought,
}

impl RsiBand {
    /// `None` for an undefined (NaN) reading.
    pub fn classify(rsi: f64) -> Option<Self> {
        if rsi.is_nan() {
            None
        } else if rsi > RSI_OVERBOUGHT {
            Some(RsiBand::Overbought)
        } else if rsi < RSI_OVERSOLD {
            Some(RsiBand::Oversold)
        } else {
            Some(RsiBand::Neutral)
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RsiBand::Oversold => "oversold",
            RsiBand::Neutral => "neutral",
            RsiBand::Overbought => "overbought",
        }
    }
}

macro_rules! display_as_str {
    ($($t:ty),*) => {
        $(impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(Trend, VolumeLevel, RsiBand);
