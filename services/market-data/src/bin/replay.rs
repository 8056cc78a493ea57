//! Replay CLI
//!
//! Replays a normalized CSV feed through a book with sparse ladders and
//! writes TAQ quote/trade files.
//!
//! Exit codes: 0 success, 1 runtime error, 2 bad arguments or unreadable
//! input, 3 replay failure.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use market_data::replay::{ReplayOptions, Replayer};
use market_data::{load_normalized_csv, TaqWriter};
use matching_engine::{BookCore, SparseLadder};
use types::prelude::Side;

#[derive(Parser, Debug)]
#[command(name = "replay")]
#[command(about = "Replay a normalized feed through the order book and write TAQ output")]
struct Cli {
    /// Normalized CSV file with columns: ts_ns,type,side,price,qty
    #[arg(long)]
    file: PathBuf,

    /// Playback speed, e.g. "1x", "10x", "50x" or a bare multiplier
    #[arg(long, default_value = "1x")]
    speed: String,

    /// TAQ quote sampling cadence in milliseconds
    #[arg(long = "cadence-ms", default_value_t = 50)]
    cadence_ms: i64,

    /// Quotes CSV path
    #[arg(long = "quotes-out", default_value = "taq_quotes.csv")]
    quotes_out: PathBuf,

    /// Trades CSV path
    #[arg(long = "trades-out", default_value = "taq_trades.csv")]
    trades_out: PathBuf,

    /// Do not sleep between events (still samples on the event-time grid)
    #[arg(long = "no-sleep")]
    no_sleep: bool,
}

fn parse_speed(s: &str) -> f64 {
    let trimmed = s.strip_suffix(['x', 'X']).unwrap_or(s);
    let speed = trimmed.parse::<f64>().unwrap_or(1.0);
    if speed > 0.0 {
        speed
    } else {
        1.0
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut events = match load_normalized_csv(&cli.file) {
        Ok(events) => events,
        Err(e) => {
            error!(file = %cli.file.display(), "failed to load feed: {e}");
            return ExitCode::from(2);
        }
    };
    if events.is_empty() {
        error!(file = %cli.file.display(), "no rows in input");
        return ExitCode::from(2);
    }
    // Enforce time order even if the producer was sloppy.
    events.sort_by_key(|e| e.ts_ns);

    let mut taq = match TaqWriter::create(&cli.quotes_out, &cli.trades_out) {
        Ok(w) => w,
        Err(e) => {
            error!("failed to open TAQ outputs: {e}");
            return ExitCode::from(2);
        }
    };

    let mut book = BookCore::new(SparseLadder::new(Side::Bid), SparseLadder::new(Side::Ask));
    let cadence_ms = if cli.cadence_ms > 0 { cli.cadence_ms } else { 50 };
    let opts = ReplayOptions {
        speed: parse_speed(&cli.speed),
        cadence_ns: cadence_ms * 1_000_000,
        realtime_sleep: !cli.no_sleep,
    };

    match Replayer::new(&mut book, &mut taq).run(&events, &opts) {
        Ok(stats) => {
            println!(
                "Replay complete: {} book events, {} trades, {} quote rows",
                stats.book_events, stats.trade_events, stats.quote_rows
            );
            println!("Quotes written to: {}", cli.quotes_out.display());
            println!("Trades written to: {}", cli.trades_out.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("replay failed: {e}");
            ExitCode::from(3)
        }
    }
}
