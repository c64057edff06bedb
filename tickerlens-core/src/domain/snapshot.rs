//! Snapshot: the instrument's latest known state.
//!
//! Every field is optional: providers routinely omit market cap, P/E or
//! dividend yield, and an absent value must never be confused with zero.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub current_price: Option<f64>,
    pub previous_close: Option<f64>,
    pub market_cap: Option<f64>,
    pub fifty_two_week_high: Option<f64>,
    pub fifty_two_week_low: Option<f64>,
    pub volume: Option<u64>,
    pub average_volume: Option<u64>,
    pub trailing_pe: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub long_name: Option<String>,
    pub business_summary: Option<String>,
}

impl Snapshot {
    /// Absolute change since the previous close.
    pub fn price_change(&self) -> Option<f64> {
        Some(self.current_price? - self.previous_close?)
    }

    /// Percent change since the previous close.
    pub fn change_percent(&self) -> Option<f64> {
        let prev = self.previous_close?;
        if prev == 0.0 {
            return None;
        }
        Some(self.price_change()? / prev * 100.0)
    }

    /// Business summary cut to `max_chars` characters, with `...` appended
    /// when something was cut.
    pub fn summary_excerpt(&self, max_chars: usize) -> Option<String> {
        let summary = self.business_summary.as_deref()?;
        if summary.chars().count() <= max_chars {
            return Some(summary.to_string());
        }
        let cut: String = summary.chars().take(max_chars).collect();
        Some(format!("{cut}..."))
    }

    /// Key metrics in display order.
    pub fn metrics(&self) -> Vec<(&'static str, Option<MetricValue>)> {
        vec![
            ("Market Cap", self.market_cap.map(MetricValue::MarketCap)),
            ("P/E Ratio", self.trailing_pe.map(MetricValue::Ratio)),
            ("52W High", self.fifty_two_week_high.map(MetricValue::Price)),
            ("52W Low", self.fifty_two_week_low.map(MetricValue::Price)),
            ("Volume", self.volume.map(MetricValue::Volume)),
            ("Avg Volume", self.average_volume.map(MetricValue::Volume)),
        ]
    }
}

/// A present snapshot metric, tagged with how it should be displayed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    /// Dollar amount shown in billions.
    MarketCap(f64),
    Price(f64),
    Ratio(f64),
    Volume(u64),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::MarketCap(v) => write!(f, "${:.2}B", v / 1e9),
            MetricValue::Price(v) => write!(f, "${v:.2}"),
            MetricValue::Ratio(v) => write!(f, "{v:.2}"),
            MetricValue::Volume(v) => f.write_str(&group_thousands(*v)),
        }
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
