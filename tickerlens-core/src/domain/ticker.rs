//! Ticker symbols and the company roster.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque instrument identifier. Always stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct Ticker(String);

impl Ticker {
    pub fn new(symbol: impl AsRef<str>) -> Self {
        Self(symbol.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Ticker {
    fn from(symbol: String) -> Self {
        Self::new(symbol)
    }
}

impl From<Ticker> for String {
    fn from(ticker: Ticker) -> Self {
        ticker.0
    }
}

impl AsRef<str> for Ticker {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One company on the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub name: String,
    pub ticker: Ticker,
}

impl RosterEntry {
    pub fn new(name: impl Into<String>, symbol: &str) -> Self {
        Self {
            name: name.into(),
            ticker: Ticker::new(symbol),
        }
    }
}

const DEFAULT_COMPANIES: [(&str, &str); 20] = [
    ("Apple Inc.", "AAPL"),
    ("Microsoft Corporation", "MSFT"),
    ("Amazon.com Inc.", "AMZN"),
    ("Alphabet Inc. (Google)", "GOOGL"),
    ("Tesla Inc.", "TSLA"),
    ("Meta Platforms Inc.", "META"),
    ("NVIDIA Corporation", "NVDA"),
    ("Netflix Inc.", "NFLX"),
    ("JPMorgan Chase & Co.", "JPM"),
    ("Johnson & Johnson", "JNJ"),
    ("Procter & Gamble Co.", "PG"),
    ("Visa Inc.", "V"),
    ("Mastercard Inc.", "MA"),
    ("Coca-Cola Company", "KO"),
    ("Walt Disney Company", "DIS"),
    ("Nike Inc.", "NKE"),
    ("McDonald's Corporation", "MCD"),
    ("Intel Corporation", "INTC"),
    ("Cisco Systems Inc.", "CSCO"),
    ("IBM Corporation", "IBM"),
];

/// The fixed set of companies the dashboard knows about.
///
/// A ticker is only considered valid if it appears here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    pub fn new(entries: Vec<RosterEntry>) -> Self {
        Self { entries }
    }

    /// The twenty large-cap US companies shown by default.
    pub fn default_roster() -> Self {
        Self::new(
            DEFAULT_COMPANIES
                .iter()
                .map(|(name, sym)| RosterEntry::new(*name, sym))
                .collect(),
        )
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a company by symbol (case-insensitive) or by exact display name.
    pub fn resolve(&self, query: &str) -> Option<&RosterEntry> {
        let query = query.trim();
        self.entries
            .iter()
            .find(|e| e.ticker.as_str().eq_ignore_ascii_case(query))
            .or_else(|| self.entries.iter().find(|e| e.name == query))
    }
}

impl Default for Roster {
    fn default() -> Self {
        Self::default_roster()
    }
}
