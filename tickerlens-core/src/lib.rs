//! Tickerlens Core: market data pipeline for a stock dashboard.
//!
//! - Domain types (tickers, periods, price series, snapshots, the roster)
//! - Yahoo Finance provider behind the `PriceProvider` trait
//! - Paced, retrying fetcher and a cache with a stale fallback
//! - SMA / RSI indicators and trend, volume and RSI labels
//! - `MarketDataService`, the single entry point for consumers

pub mod config;
pub mod data;
pub mod domain;
pub mod export;
pub mod indicators;
pub mod service;

pub use config::{ConfigError, TickerlensConfig};
pub use service::{MarketDataService, MarketView, ServiceError};
