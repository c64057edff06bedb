//! Market data acquisition: provider boundary, Yahoo provider, paced retrying
//! fetcher and the stale-fallback cache in front of it.

pub mod cache;
pub mod clock;
pub mod fetcher;
pub mod provider;
pub mod retry;
pub mod yahoo;

pub use cache::{CacheEntry, CacheError, CacheStats, CachedData, StaleCache, Staleness};
pub use clock::{Clock, ManualClock, SystemClock};
pub use fetcher::{FetchError, RateLimitedFetcher};
pub use provider::{PriceProvider, ProviderError, ProviderResponse, RequestGate};
pub use retry::{Backoff, RetryPolicy};
pub use yahoo::YahooProvider;
