//! Normalized feed ingestion
//!
//! Loads a normalized CSV feed with columns `ts_ns,type,side,price,qty`.
//! `type` is `book` (level size update) or `trade`; both are matched
//! case-insensitively. The side vocabulary is permissive (`b`, `bid`,
//! `buy`, `a`, `ask`, `sell`, `s`), and an empty side is tolerated for
//! trade rows where the aggressor is unknown. Malformed rows are skipped
//! with a warning; a bad header is an error.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use thiserror::Error;
use tracing::warn;
use types::prelude::{Side, TsNanos};

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("empty CSV: {0}")]
    Empty(String),

    #[error("unexpected header '{0}'; expected columns ts_ns,type,side,price,qty")]
    BadHeader(String),
}

// ── Events ──────────────────────────────────────────────────────────

/// Row type of the normalized feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormKind {
    /// Aggregate level size update.
    Book,
    /// Executed trade print.
    Trade,
}

/// One normalized feed event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormEvent {
    pub ts_ns: TsNanos,
    pub kind: NormKind,
    pub side: Side,
    pub price: f64,
    pub qty: f64,
}

/// Parse the `type` column. Case-insensitive.
pub fn parse_kind(s: &str) -> Option<NormKind> {
    match s.to_ascii_lowercase().as_str() {
        "book" => Some(NormKind::Book),
        "trade" => Some(NormKind::Trade),
        _ => None,
    }
}

/// Parse the `side` column. Case-insensitive, with an empty value
/// defaulting to the ask side (unknown aggressor on trade rows).
pub fn parse_side(s: &str) -> Option<Side> {
    if s.is_empty() {
        return Some(Side::Ask);
    }
    match s.to_ascii_lowercase().as_str() {
        "b" | "bid" | "buy" => Some(Side::Bid),
        "a" | "ask" | "sell" | "s" => Some(Side::Ask),
        _ => None,
    }
}

/// Load every well-formed row of a normalized CSV feed, in file order.
pub fn load_normalized_csv(path: &Path) -> Result<Vec<NormEvent>, IngestError> {
    let file = File::open(path)?;
    let mut lines = BufReader::new(file).lines();

    let header = match lines.next() {
        Some(line) => line?,
        None => return Err(IngestError::Empty(path.display().to_string())),
    };
    for column in ["ts_ns", "type", "side", "price", "qty"] {
        if !header.contains(column) {
            return Err(IngestError::BadHeader(header.trim_end().to_string()));
        }
    }

    let mut events = Vec::new();
    for (line_no, line) in lines.enumerate() {
        let line = line?;
        let row = line_no + 2; // 1-based, after the header

        let mut fields = line.split(',').map(str::trim);
        let f_ts = fields.next().unwrap_or("");
        let f_type = fields.next().unwrap_or("");
        let f_side = fields.next().unwrap_or("");
        let f_px = fields.next().unwrap_or("");
        let f_qty = fields.next().unwrap_or("");

        if f_ts.is_empty() {
            continue;
        }

        let ts_ns = match f_ts.parse::<TsNanos>() {
            Ok(v) => v,
            Err(_) => {
                warn!(row, value = f_ts, "bad ts_ns, skipping row");
                continue;
            }
        };
        let kind = match parse_kind(f_type) {
            Some(k) => k,
            None => {
                warn!(row, value = f_type, "bad type, skipping row");
                continue;
            }
        };
        let side = match parse_side(f_side) {
            Some(s) => s,
            None => {
                warn!(row, value = f_side, "bad side, skipping row");
                continue;
            }
        };
        let price = match f_px.parse::<f64>() {
            Ok(v) => v,
            Err(_) => {
                warn!(row, value = f_px, "bad price, skipping row");
                continue;
            }
        };
        let qty = match f_qty.parse::<f64>() {
            Ok(v) => v,
            Err(_) => {
                warn!(row, value = f_qty, "bad qty, skipping row");
                continue;
            }
        };

        events.push(NormEvent {
            ts_ns,
            kind,
            side,
            price,
            qty,
        });
    }

    Ok(events)
}

// ── Tests ───────────────────────────────────────────────────────────
