//! JSONL event sink
//!
//! An [`EventLogger`] implementation that writes one JSON object per line
//! for every event the engine reports. Intended for offline inspection
//! and diffing of replay runs; the binary operation log remains the
//! recovery source of truth.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use matching_engine::events::{
    BookEvent, EventLogger, OrderAccepted, OrderCanceled, OrderModified, TradeExecuted,
};

#[derive(Error, Debug)]
pub enum JsonlError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Line-oriented JSON event writer.
///
/// Write failures are counted rather than propagated, since the engine's
/// logger hooks cannot return errors; callers inspect
/// [`write_errors`](Self::write_errors) and [`sync`](Self::sync).
pub struct JsonlLogger {
    writer: BufWriter<File>,
    path: PathBuf,
    write_errors: u64,
}

impl JsonlLogger {
    /// Open (append) a JSONL file, creating parent directories as needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, JsonlError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            write_errors: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of events dropped due to serialization or write failures.
    pub fn write_errors(&self) -> u64 {
        self.write_errors
    }

    /// Flush buffers and fsync to disk.
    pub fn sync(&mut self) -> Result<(), JsonlError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    fn write_event(&mut self, event: &BookEvent) {
        let ok = serde_json::to_writer(&mut self.writer, event)
            .map_err(io::Error::from)
            .and_then(|_| self.writer.write_all(b"\n"));
        if ok.is_err() {
            self.write_errors += 1;
        }
    }
}

impl EventLogger for JsonlLogger {
    fn on_accept(&mut self, ev: &OrderAccepted) {
        self.write_event(&BookEvent::Accepted(*ev));
    }

    fn on_trade(&mut self, ev: &TradeExecuted) {
        self.write_event(&BookEvent::Trade(*ev));
    }

    fn on_cancel(&mut self, ev: &OrderCanceled) {
        self.write_event(&BookEvent::Canceled(*ev));
    }

    fn on_modify(&mut self, ev: &OrderModified) {
        self.write_event(&BookEvent::Modified(*ev));
    }
}
