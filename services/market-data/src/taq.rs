//! TAQ output writer
//!
//! Two CSV files: quotes sampled on a fixed time grid and raw trade
//! prints. All timestamps are nanoseconds since the UNIX epoch; rows are
//! expected in non-decreasing time order, and violations log a warning
//! rather than fail the run.
//!
//! Quote columns: `ts_ns,bid_px,bid_sz,ask_px,ask_sz,mid,spread,microprice`.
//! A side is present when its size is positive and its price finite.
//! Mid falls back to the one present side; spread and microprice need
//! both. Absent values are written as empty fields.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use thiserror::Error;
use tracing::warn;
use types::prelude::{Side, TsNanos};

#[derive(Error, Debug)]
pub enum TaqError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// CSV writer for sampled quotes and raw trades.
pub struct TaqWriter {
    quotes: BufWriter<File>,
    trades: BufWriter<File>,
    last_quote_ts: Option<TsNanos>,
    last_trade_ts: Option<TsNanos>,
}

impl TaqWriter {
    /// Create (truncate) both output files and write their headers.
    pub fn create(quotes_path: &Path, trades_path: &Path) -> Result<Self, TaqError> {
        let mut quotes = BufWriter::new(File::create(quotes_path)?);
        let mut trades = BufWriter::new(File::create(trades_path)?);
        writeln!(quotes, "ts_ns,bid_px,bid_sz,ask_px,ask_sz,mid,spread,microprice")?;
        writeln!(trades, "ts_ns,price,qty,side")?;
        Ok(Self {
            quotes,
            trades,
            last_quote_ts: None,
            last_trade_ts: None,
        })
    }

    /// Write one sampled quote row. Absent sides produce empty fields.
    pub fn write_quote_row(
        &mut self,
        ts_ns: TsNanos,
        bid_px: f64,
        bid_sz: f64,
        ask_px: f64,
        ask_sz: f64,
    ) -> Result<(), TaqError> {
        if let Some(last) = self.last_quote_ts {
            if ts_ns < last {
                warn!(ts_ns, last, "non-monotonic quote timestamp");
            }
        }
        self.last_quote_ts = Some(ts_ns);

        let have_bid = bid_sz > 0.0 && bid_px.is_finite();
        let have_ask = ask_sz > 0.0 && ask_px.is_finite();

        let mut mid = f64::NAN;
        let mut spread = f64::NAN;
        let mut micro = f64::NAN;
        if have_bid && have_ask {
            mid = 0.5 * (bid_px + ask_px);
            spread = ask_px - bid_px;
            let denom = bid_sz + ask_sz;
            micro = if denom > 0.0 {
                (bid_px * ask_sz + ask_px * bid_sz) / denom
            } else {
                mid
            };
        } else if have_bid {
            mid = bid_px;
        } else if have_ask {
            mid = ask_px;
        }

        let (bid_px_s, bid_sz_s) = if have_bid {
            (field(bid_px), field(bid_sz))
        } else {
            (String::new(), String::new())
        };
        let (ask_px_s, ask_sz_s) = if have_ask {
            (field(ask_px), field(ask_sz))
        } else {
            (String::new(), String::new())
        };

        writeln!(
            self.quotes,
            "{},{},{},{},{},{},{},{}",
            ts_ns,
            bid_px_s,
            bid_sz_s,
            ask_px_s,
            ask_sz_s,
            field(mid),
            field(spread),
            field(micro),
        )?;
        Ok(())
    }

    /// Write one trade print. Side is the aggressor when known
    /// (`B` buy / `A` sell).
    pub fn write_trade_row(
        &mut self,
        ts_ns: TsNanos,
        price: f64,
        qty: f64,
        side: Side,
    ) -> Result<(), TaqError> {
        if let Some(last) = self.last_trade_ts {
            if ts_ns < last {
                warn!(ts_ns, last, "non-monotonic trade timestamp");
            }
        }
        self.last_trade_ts = Some(ts_ns);

        let side_char = match side {
            Side::Bid => 'B',
            Side::Ask => 'A',
        };
        writeln!(self.trades, "{},{},{},{}", ts_ns, field(price), field(qty), side_char)?;
        Ok(())
    }

    /// Flush both files.
    pub fn flush(&mut self) -> Result<(), TaqError> {
        self.quotes.flush()?;
        self.trades.flush()?;
        Ok(())
    }
}

/// Numeric field rendering: NaN becomes an empty field.
fn field(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        format!("{}", v)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn writer(tmp: &TempDir) -> (TaqWriter, std::path::PathBuf, std::path::PathBuf) {
        let q = tmp.path().join("quotes.csv");
        let t = tmp.path().join("trades.csv");
        (TaqWriter::create(&q, &t).unwrap(), q, t)
    }

    #[test]
    fn test_headers() {
        let tmp = TempDir::new().unwrap();
        let (mut w, q, t) = writer(&tmp);
        w.flush().unwrap();

        assert_eq!(
            fs::read_to_string(&q).unwrap().lines().next().unwrap(),
            "ts_ns,bid_px,bid_sz,ask_px,ask_sz,mid,spread,microprice"
        );
        assert_eq!(
            fs::read_to_string(&t).unwrap().lines().next().unwrap(),
            "ts_ns,price,qty,side"
        );
    }

    #[test]
    fn test_quote_row_with_both_sides() {
        let tmp = TempDir::new().unwrap();
        let (mut w, q, _) = writer(&tmp);
        w.write_quote_row(1_000, 100.0, 3.0, 101.0, 1.0).unwrap();
        w.flush().unwrap();

        let text = fs::read_to_string(&q).unwrap();
        let row = text.lines().nth(1).unwrap();
        // mid = 100.5, spread = 1, micro = (100*1 + 101*3)/4 = 100.75
        assert_eq!(row, "1000,100,3,101,1,100.5,1,100.75");
    }

    #[test]
    fn test_quote_row_one_sided_and_empty() {
        let tmp = TempDir::new().unwrap();
        let (mut w, q, _) = writer(&tmp);
        w.write_quote_row(1_000, 100.0, 3.0, f64::NAN, 0.0).unwrap();
        w.write_quote_row(2_000, f64::NAN, 0.0, f64::NAN, 0.0).unwrap();
        w.flush().unwrap();

        let text = fs::read_to_string(&q).unwrap();
        let rows: Vec<&str> = text.lines().skip(1).collect();
        // Bid only: mid falls back to the bid price, no spread/micro.
        assert_eq!(rows[0], "1000,100,3,,,100,,");
        // Empty book: everything absent.
        assert_eq!(rows[1], "2000,,,,,,,");
    }

    #[test]
    fn test_zero_size_side_is_absent() {
        let tmp = TempDir::new().unwrap();
        let (mut w, q, _) = writer(&tmp);
        w.write_quote_row(1_000, 100.0, 0.0, 101.0, 2.0).unwrap();
        w.flush().unwrap();

        let text = fs::read_to_string(&q).unwrap();
        assert_eq!(text.lines().nth(1).unwrap(), "1000,,,101,2,101,,");
    }

    #[test]
    fn test_trade_rows() {
        let tmp = TempDir::new().unwrap();
        let (mut w, _, t) = writer(&tmp);
        w.write_trade_row(1_000, 100.5, 2.0, Side::Bid).unwrap();
        w.write_trade_row(2_000, 100.25, 1.5, Side::Ask).unwrap();
        w.flush().unwrap();

        let text = fs::read_to_string(&t).unwrap();
        let rows: Vec<&str> = text.lines().skip(1).collect();
        assert_eq!(rows, vec!["1000,100.5,2,B", "2000,100.25,1.5,A"]);
    }

    #[test]
    fn test_non_monotonic_timestamps_do_not_fail() {
        let tmp = TempDir::new().unwrap();
        let (mut w, q, _) = writer(&tmp);
        w.write_quote_row(2_000, 100.0, 1.0, 101.0, 1.0).unwrap();
        w.write_quote_row(1_000, 100.0, 1.0, 101.0, 1.0).unwrap();
        w.flush().unwrap();

        assert_eq!(fs::read_to_string(&q).unwrap().lines().count(), 3);
    }
}
