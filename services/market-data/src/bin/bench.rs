//! Bench CLI
//!
//! Feeds a deterministic synthetic limit-order workload through a book
//! with sparse ladders, measures per-submit latency, and prints
//! throughput plus latency percentiles. Optionally dumps the raw
//! latencies and a 0–100µs histogram as CSV.
//!
//! Exit codes: 0 success, 1 runtime error, 2 bad arguments.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use matching_engine::{BookCore, SparseLadder};
use types::prelude::{Flags, NewOrder, Side};

#[derive(Parser, Debug)]
#[command(name = "bench")]
#[command(about = "Measure per-event matching latency on a synthetic workload")]
struct Cli {
    /// Number of timed messages
    #[arg(long, default_value_t = 2_000_000)]
    msgs: u64,

    /// Untimed warmup messages
    #[arg(long, default_value_t = 50_000)]
    warmup: u64,

    /// Write raw per-message latencies (µs, one per line) to this CSV
    #[arg(long = "out-csv")]
    out_csv: Option<PathBuf>,

    /// Write a 0-100µs latency histogram (bucket,count) to this CSV
    #[arg(long)]
    hist: Option<PathBuf>,
}

/// 0–100µs buckets plus one overflow bucket.
struct Histo {
    buckets: [u64; Histo::MAX_US + 1],
}

impl Histo {
    const MAX_US: usize = 100;

    fn new() -> Self {
        Self {
            buckets: [0; Self::MAX_US + 1],
        }
    }

    fn add(&mut self, us: f64) {
        let i = if us < Self::MAX_US as f64 {
            us as usize
        } else {
            Self::MAX_US
        };
        self.buckets[i] += 1;
    }

    fn write(&self, path: &Path) -> std::io::Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        for (i, count) in self.buckets.iter().enumerate() {
            writeln!(w, "{},{}", i, count)?;
        }
        w.flush()
    }
}

/// Alternating-side limit orders over a 25-tick band around 1000.
fn synthetic_order(i: u64, id_base: u64, user: u64) -> NewOrder {
    let side = if i % 2 == 0 { Side::Bid } else { Side::Ask };
    NewOrder {
        seq: i,
        ts: 0,
        id: id_base + i,
        user,
        side,
        price: 1_000 + (i % 25) as i64,
        qty: 1,
        flags: Flags::NONE,
    }
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (q * (sorted.len() - 1) as f64 + 0.5) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut book = BookCore::new(SparseLadder::new(Side::Bid), SparseLadder::new(Side::Ask));

    for i in 0..cli.warmup {
        let _ = book.submit_limit(synthetic_order(i, 0, 1));
    }

    let mut latencies_us = Vec::with_capacity(cli.msgs as usize);
    let mut histo = Histo::new();

    let t0 = Instant::now();
    for i in 0..cli.msgs {
        let order = synthetic_order(i, 1_000_000_000, 2);
        let start = Instant::now();
        let _ = book.submit_limit(order);
        let us = start.elapsed().as_secs_f64() * 1e6;
        latencies_us.push(us);
        histo.add(us);
    }
    let wall_s = t0.elapsed().as_secs_f64();

    let rate = cli.msgs as f64 / wall_s;
    latencies_us.sort_by(|a, b| a.total_cmp(b));

    println!("msgs={}, time={:.3}s, rate={:.1} msgs/s", cli.msgs, wall_s, rate);
    println!(
        "latency_us: p50={:.2} p90={:.2} p99={:.2} p99.9={:.2}",
        percentile(&latencies_us, 0.50),
        percentile(&latencies_us, 0.90),
        percentile(&latencies_us, 0.99),
        percentile(&latencies_us, 0.999),
    );

    if let Some(path) = &cli.out_csv {
        let write = || -> std::io::Result<()> {
            let mut w = BufWriter::new(File::create(path)?);
            for us in &latencies_us {
                writeln!(w, "{us}")?;
            }
            w.flush()
        };
        if let Err(e) = write() {
            error!(path = %path.display(), "failed to write latency CSV: {e}");
            return ExitCode::from(1);
        }
    }

    if let Some(path) = &cli.hist {
        if let Err(e) = histo.write(path) {
            error!(path = %path.display(), "failed to write histogram CSV: {e}");
            return ExitCode::from(1);
        }
    }

    ExitCode::SUCCESS
}
