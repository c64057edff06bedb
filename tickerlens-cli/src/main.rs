//! Tickerlens CLI: show, watch and export market data for the company roster.
//!
//! Commands:
//! - `show`: fetch, annotate and print a ticker's snapshot and indicators
//! - `roster`: list the companies that can be queried
//! - `export`: write the annotated series to CSV
//! - `watch`: poll a ticker, serving from the cache between refreshes

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tickerlens_core::data::YahooProvider;
use tickerlens_core::domain::Period;
use tickerlens_core::export::export_to_path;
use tickerlens_core::{MarketDataService, MarketView, TickerlensConfig};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "tickerlens",
    about = "Tickerlens: stock prices, snapshot metrics and technical indicators"
)]
struct Cli {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a ticker and print its snapshot and latest indicators.
    Show {
        /// Ticker symbol or company name from the roster.
        ticker: String,

        /// History period: 1mo, 3mo, 6mo, 1y, 2y, 5y.
        #[arg(long, default_value = "1y")]
        period: Period,

        /// Print JSON instead of text.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Also print the last N rows of the annotated series.
        #[arg(long, default_value_t = 0)]
        rows: usize,
    },
    /// List the company roster.
    Roster,
    /// Write the annotated series to a CSV file.
    Export {
        ticker: String,

        #[arg(long, default_value = "1y")]
        period: Period,

        /// Output CSV path.
        #[arg(long)]
        out: PathBuf,
    },
    /// Poll a ticker repeatedly; between refreshes the cache answers.
    Watch {
        ticker: String,

        #[arg(long, default_value = "1y")]
        period: Period,

        /// Seconds between polls.
        #[arg(long, default_value_t = 60)]
        interval_secs: u64,

        /// Stop after this many polls. Runs until interrupted when omitted.
        #[arg(long)]
        count: Option<u64>,

        /// Clear the cache every K polls to force a refetch.
        #[arg(long)]
        refresh_every: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Show {
            ticker,
            period,
            json,
            rows,
        } => run_show(&config, &ticker, period, json, rows),
        Commands::Roster => run_roster(&config),
        Commands::Export {
            ticker,
            period,
            out,
        } => run_export(&config, &ticker, period, &out),
        Commands::Watch {
            ticker,
            period,
            interval_secs,
            count,
            refresh_every,
        } => run_watch(
            &config,
            &ticker,
            period,
            Duration::from_secs(interval_secs),
            count,
            refresh_every,
        ),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn load_config(path: Option<&Path>) -> Result<TickerlensConfig> {
    match path {
        Some(path) => TickerlensConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(TickerlensConfig::default()),
    }
}

fn build_service(config: &TickerlensConfig) -> Result<MarketDataService<YahooProvider>> {
    MarketDataService::yahoo(config).context("failed to build Yahoo Finance client")
}

fn run_show(
    config: &TickerlensConfig,
    ticker: &str,
    period: Period,
    json: bool,
    rows: usize,
) -> Result<()> {
    let service = build_service(config)?;
    let view = service.get_annotated(ticker, period)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view_json(&view, rows))?);
    } else {
        print_view(&view, rows);
    }
    Ok(())
}

fn run_roster(config: &TickerlensConfig) -> Result<()> {
    let roster = config.roster();
    println!("{:<8} Company", "Ticker");
    println!("{}", "-".repeat(40));
    for entry in roster.entries() {
        println!("{:<8} {}", entry.ticker, entry.name);
    }
    Ok(())
}

fn run_export(config: &TickerlensConfig, ticker: &str, period: Period, out: &Path) -> Result<()> {
    let service = build_service(config)?;
    let view = service.get_annotated(ticker, period)?;
    export_to_path(&view.annotated, out)?;
    println!(
        "Wrote {} rows for {} ({}) to {}{}",
        view.annotated.len(),
        view.ticker,
        view.period,
        out.display(),
        stale_suffix(&view)
    );
    Ok(())
}

fn run_watch(
    config: &TickerlensConfig,
    ticker: &str,
    period: Period,
    interval: Duration,
    count: Option<u64>,
    refresh_every: Option<u64>,
) -> Result<()> {
    let service = build_service(config)?;
    let mut poll: u64 = 0;

    loop {
        poll += 1;
        if let Some(k) = refresh_every.filter(|k| *k > 0) {
            if poll > 1 && (poll - 1) % k == 0 {
                service.clear_cache();
            }
        }

        match service.get_annotated(ticker, period) {
            Ok(view) => println!(
                "{} {} close={} sma20={} rsi14={} trend={} fetched={}{}",
                chrono::Local::now().format("%H:%M:%S"),
                view.ticker,
                fmt_price(view.annotated.latest_close()),
                fmt_price(view.annotated.latest_sma_20()),
                fmt_num(view.annotated.latest_rsi()),
                label(view.annotated.indicators.trend),
                view.fetched_at.format("%H:%M:%S"),
                stale_suffix(&view)
            ),
            // Keep polling; the provider may come back.
            Err(err) => eprintln!("poll {poll}: {err}"),
        }

        if count.is_some_and(|n| poll >= n) {
            break;
        }
        std::thread::sleep(interval);
    }

    let stats = service.cache_stats();
    tracing::info!(
        hits = stats.hits,
        misses = stats.misses,
        stale_serves = stats.stale_serves,
        "watch finished"
    );
    Ok(())
}

fn print_view(view: &MarketView, rows: usize) {
    let snap = &view.snapshot;
    println!(
        "{} - {} ({}){}",
        view.ticker,
        snap.long_name.as_deref().unwrap_or(&view.company),
        view.period,
        stale_suffix(view)
    );

    let price = snap.current_price.or(view.annotated.latest_close());
    match (price, snap.price_change(), snap.change_percent()) {
        (Some(p), Some(change), Some(pct)) => {
            println!("Price: ${p:.2}  {change:+.2} ({pct:+.2}%)")
        }
        (Some(p), _, _) => println!("Price: ${p:.2}"),
        _ => println!("Price: N/A"),
    }
    println!();

    for (name, value) in snap.metrics() {
        let shown = value.map(|v| v.to_string()).unwrap_or_else(|| "N/A".into());
        println!("{name:<12} {shown}");
    }
    if let Some(dy) = snap.dividend_yield {
        println!("{:<12} {:.2}%", "Div Yield", dy * 100.0);
    }
    println!();

    let ind = &view.annotated.indicators;
    println!("Close        {}", fmt_price(view.annotated.latest_close()));
    println!("SMA 20       {}", fmt_price(view.annotated.latest_sma_20()));
    println!("SMA 50       {}", fmt_price(view.annotated.latest_sma_50()));
    println!("RSI 14       {}", fmt_num(view.annotated.latest_rsi()));
    println!("Trend        {}", label(ind.trend));
    println!("RSI band     {}", label(ind.rsi_band));
    println!("Volume       {}", label(ind.volume));

    if let Some(summary) = snap.summary_excerpt(200) {
        println!();
        println!("{summary}");
    }

    if rows > 0 {
        println!();
        println!(
            "{:<12} {:>10} {:>10} {:>10} {:>8} {:>14}",
            "Date", "Close", "SMA20", "SMA50", "RSI14", "Volume"
        );
        println!("{}", "-".repeat(69));
        let skip = view.annotated.len().saturating_sub(rows);
        for row in view.annotated.rows().skip(skip) {
            println!(
                "{:<12} {:>10.2} {:>10} {:>10} {:>8} {:>14}",
                row.point.date,
                row.point.close,
                fmt_cell(row.sma_20),
                fmt_cell(row.sma_50),
                fmt_cell(row.rsi_14),
                row.point.volume.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
            );
        }
    }

    println!();
    println!(
        "Fetched {}",
        view.fetched_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
    );
}

fn view_json(view: &MarketView, rows: usize) -> serde_json::Value {
    let ind = &view.annotated.indicators;
    let skip = view.annotated.len().saturating_sub(rows);
    let tail: Vec<serde_json::Value> = view
        .annotated
        .rows()
        .skip(skip)
        .map(|row| {
            serde_json::json!({
                "date": row.point.date,
                "open": row.point.open,
                "high": row.point.high,
                "low": row.point.low,
                "close": row.point.close,
                "volume": row.point.volume,
                "sma_20": row.sma_20,
                "sma_50": row.sma_50,
                "rsi_14": row.rsi_14,
            })
        })
        .collect();

    serde_json::json!({
        "ticker": view.ticker,
        "company": view.company,
        "period": view.period,
        "stale": view.is_stale(),
        "fetched_at": view.fetched_at,
        "snapshot": view.snapshot,
        "price_change": view.snapshot.price_change(),
        "change_percent": view.snapshot.change_percent(),
        "latest": {
            "close": view.annotated.latest_close(),
            "sma_20": view.annotated.latest_sma_20(),
            "sma_50": view.annotated.latest_sma_50(),
            "rsi_14": view.annotated.latest_rsi(),
            "trend": ind.trend,
            "rsi_band": ind.rsi_band,
            "volume": ind.volume,
            "volume_average": ind.volume_average,
        },
        "points": view.annotated.len(),
        "rows": tail,
    })
}

fn stale_suffix(view: &MarketView) -> String {
    if view.is_stale() {
        format!(
            "  [STALE: provider unavailable, data from {}]",
            view.fetched_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M")
        )
    } else {
        String::new()
    }
}

fn fmt_price(v: Option<f64>) -> String {
    v.map(|v| format!("${v:.2}")).unwrap_or_else(|| "N/A".into())
}

fn fmt_num(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.2}")).unwrap_or_else(|| "N/A".into())
}

fn fmt_cell(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".into())
}

fn label<T: std::fmt::Display>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "N/A".into())
}
