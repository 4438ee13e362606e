use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use candle_source::providers::hitbtc_rest::HitBtcProvider;
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use candle_sync::{
    aggregate::Aggregator,
    collector::Collector,
    config::AppConfig,
    db::connection::connect_sqlite,
    indicators::IchimokuLines,
    store::{MinuteStore, SqliteMinuteStore},
    symbol::Symbol,
    tz,
};

#[derive(Parser)]
#[command(version, about = "Minute candle collector")]
struct Cli {
    /// TOML config file; defaults apply when omitted.
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Overrides `collector.symbol`.
    #[arg(long, global = true)]
    symbol: Option<Symbol>,

    /// Overrides `DATABASE_URL` and `store.database_url`.
    #[arg(long, value_name = "PATH", global = true)]
    database_url: Option<String>,

    /// Evaluate queries as of this RFC-3339 instant instead of now.
    #[arg(long, value_name = "RFC3339", global = true, value_parser = parse_as_of)]
    as_of: Option<DateTime<Utc>>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Seed history, then keep the store current until Ctrl-C or the cycle budget.
    Sync {
        #[arg(long)]
        cycles: Option<u64>,
    },
    /// Raw minute records of the last N minutes.
    Minmax {
        #[arg(long)]
        minutes: usize,
    },
    /// Sliding high/low windows.
    Highlow {
        /// Window length in minutes.
        #[arg(long)]
        minutes: usize,
        /// Number of windows.
        #[arg(long)]
        windows: usize,
    },
    /// Known closing prices.
    Closes {
        #[arg(long)]
        minutes: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Conversion, base and leading-span lines.
    Ichimoku {
        #[arg(long, default_value_t = 60)]
        points: usize,
    },
    /// Minutes with no record in the last N minutes.
    Gaps {
        #[arg(long)]
        minutes: usize,
    },
}

fn parse_as_of(s: &str) -> Result<DateTime<Utc>, String> {
    tz::parse_ts_to_utc(s).map_err(|e| e.to_string())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut cfg = AppConfig::load(cli.config.as_deref())?;
    if let Some(symbol) = cli.symbol {
        cfg.collector.symbol = symbol;
    }
    let db_url = match cli.database_url {
        Some(url) => url,
        None => cfg.database_url()?,
    };
    let as_of = cli.as_of.unwrap_or_else(Utc::now);

    let mut conn = connect_sqlite(&db_url).with_context(|| format!("open {db_url}"))?;

    match cli.cmd {
        Cmd::Sync { cycles } => {
            if cycles.is_some() {
                cfg.collector.cycles = cycles;
            }
            let source = HitBtcProvider::from_env(&cfg.exchange.base_url, cfg.timeout())?;
            let collector = Collector::new(Arc::new(source), conn, cfg.collector_config())?;
            info!(symbol = %cfg.collector.symbol, db = %db_url, "starting collector");

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("interrupt received; stopping after the current cycle");
                    on_signal.cancel();
                }
            });

            let status = collector
                .spawn(cancel)
                .await
                .context("collector task panicked")??;
            print_json(&status)?;
        }
        Cmd::Minmax { minutes } => {
            let store = SqliteMinuteStore::open(&mut conn, &cfg.collector.symbol)?;
            let records = Aggregator::new(&store).get_minmax_over_time_at(&mut conn, minutes, as_of)?;
            print_json(&records)?;
        }
        Cmd::Highlow { minutes, windows } => {
            let store = SqliteMinuteStore::open(&mut conn, &cfg.collector.symbol)?;
            let out = Aggregator::new(&store).get_highlow_over_time_at(&mut conn, minutes, windows, as_of)?;
            print_json(&out)?;
        }
        Cmd::Closes { minutes, offset } => {
            let store = SqliteMinuteStore::open(&mut conn, &cfg.collector.symbol)?;
            let out = Aggregator::new(&store)
                .get_closing_prices_over_time_at(&mut conn, minutes, offset, as_of)?;
            print_json(&out)?;
        }
        Cmd::Ichimoku { points } => {
            let store = SqliteMinuteStore::open(&mut conn, &cfg.collector.symbol)?;
            let lines = IchimokuLines::compute(&store, &mut conn, cfg.indicators, points, as_of)?;
            print_json(&lines.to_series_map())?;
        }
        Cmd::Gaps { minutes } => {
            let store = SqliteMinuteStore::open(&mut conn, &cfg.collector.symbol)?;
            let to = candle_sync::bucket::truncate_to_minute(as_of)
                .checked_add_signed(Duration::minutes(1))
                .context("--as-of is at the end of the calendar range")?;
            let from = minutes
                .checked_sub(1)
                .and_then(|back| candle_sync::bucket::minutes_before(as_of, back))
                .with_context(|| format!("--minutes {minutes} must be within 1 and the calendar range"))?;
            let gaps = store.coverage_gaps(&mut conn, from, to)?;
            print_json(&gaps)?;
        }
    }

    Ok(())
}
