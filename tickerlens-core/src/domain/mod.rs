//! Domain types: tickers, periods, price series, snapshots.

pub mod period;
pub mod price;
pub mod snapshot;
pub mod ticker;

pub use period::{ParsePeriodError, Period};
pub use price::{PricePoint, PriceSeries};
pub use snapshot::{MetricValue, Snapshot};
pub use ticker::{Roster, RosterEntry, Ticker};
