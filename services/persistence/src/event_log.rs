//! Operation log: append-only binary log with checksums
//!
//! Records the input operations applied to an engine (new limit, new
//! market, cancel, modify) so that state can be rebuilt by replaying them
//! through the public operations. This is a write-ahead log from the
//! driving application's point of view; engine output events are not
//! stored here.
//!
//! # Binary Format (per record)
//! ```text
//! [body_len: u32]
//! [seq:  u64]
//! [ts:   i64]
//! [kind: u8]
//! [payload_len: u32][payload: bincode bytes]
//! [checksum: u32]  // CRC32C over seq+ts+kind+payload
//! ```
//! All integers little-endian. A truncated final record (partial write on
//! crash) is tolerated on read; a checksum mismatch is not.

use crc32c::crc32c;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use types::prelude::{ModifyOrder, NewOrder, OrderId, SeqNo, TsNanos};

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum EventLogError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error at byte offset {offset}: {detail}")]
    Decode { offset: usize, detail: String },

    #[error("Checksum mismatch at byte offset {offset} (seq={seq})")]
    ChecksumMismatch { offset: usize, seq: u64 },

    #[error("Unknown record kind {0}")]
    UnknownKind(u8),
}

// ── Records ─────────────────────────────────────────────────────────

/// Kind tag of a logged operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    NewLimit = 0,
    NewMarket = 1,
    Cancel = 2,
    Modify = 3,
}

impl RecordKind {
    fn from_u8(v: u8) -> Result<Self, EventLogError> {
        match v {
            0 => Ok(RecordKind::NewLimit),
            1 => Ok(RecordKind::NewMarket),
            2 => Ok(RecordKind::Cancel),
            3 => Ok(RecordKind::Modify),
            other => Err(EventLogError::UnknownKind(other)),
        }
    }
}

/// A decoded operation, ready to apply to an engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoggedOp {
    NewLimit(NewOrder),
    NewMarket(NewOrder),
    Cancel { id: OrderId },
    Modify(ModifyOrder),
}

/// One persisted operation record.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub seq: SeqNo,
    pub ts: TsNanos,
    pub kind: RecordKind,
    pub payload: Vec<u8>,
    pub checksum: u32,
}

impl LogRecord {
    /// Create a record, computing its checksum.
    pub fn new(seq: SeqNo, ts: TsNanos, kind: RecordKind, payload: Vec<u8>) -> Self {
        let checksum = Self::compute_checksum(seq, ts, kind, &payload);
        Self {
            seq,
            ts,
            kind,
            payload,
            checksum,
        }
    }

    pub fn new_limit(o: &NewOrder) -> Result<Self, EventLogError> {
        let payload = bincode::serialize(o).map_err(|e| EventLogError::Encode(e.to_string()))?;
        Ok(Self::new(o.seq, o.ts, RecordKind::NewLimit, payload))
    }

    pub fn new_market(o: &NewOrder) -> Result<Self, EventLogError> {
        let payload = bincode::serialize(o).map_err(|e| EventLogError::Encode(e.to_string()))?;
        Ok(Self::new(o.seq, o.ts, RecordKind::NewMarket, payload))
    }

    pub fn cancel(seq: SeqNo, ts: TsNanos, id: OrderId) -> Result<Self, EventLogError> {
        let payload = bincode::serialize(&id).map_err(|e| EventLogError::Encode(e.to_string()))?;
        Ok(Self::new(seq, ts, RecordKind::Cancel, payload))
    }

    pub fn modify(m: &ModifyOrder) -> Result<Self, EventLogError> {
        let payload = bincode::serialize(m).map_err(|e| EventLogError::Encode(e.to_string()))?;
        Ok(Self::new(m.seq, m.ts, RecordKind::Modify, payload))
    }

    /// Decode the payload back into an applicable operation.
    pub fn decode_op(&self) -> Result<LoggedOp, EventLogError> {
        let decode_err = |e: bincode::Error| EventLogError::Decode {
            offset: 0,
            detail: e.to_string(),
        };
        match self.kind {
            RecordKind::NewLimit => Ok(LoggedOp::NewLimit(
                bincode::deserialize(&self.payload).map_err(decode_err)?,
            )),
            RecordKind::NewMarket => Ok(LoggedOp::NewMarket(
                bincode::deserialize(&self.payload).map_err(decode_err)?,
            )),
            RecordKind::Cancel => Ok(LoggedOp::Cancel {
                id: bincode::deserialize(&self.payload).map_err(decode_err)?,
            }),
            RecordKind::Modify => Ok(LoggedOp::Modify(
                bincode::deserialize(&self.payload).map_err(decode_err)?,
            )),
        }
    }

    /// CRC32C over the concatenation of (seq, ts, kind, payload).
    pub fn compute_checksum(seq: SeqNo, ts: TsNanos, kind: RecordKind, payload: &[u8]) -> u32 {
        let mut buf = Vec::with_capacity(8 + 8 + 1 + payload.len());
        buf.extend_from_slice(&seq.to_le_bytes());
        buf.extend_from_slice(&ts.to_le_bytes());
        buf.push(kind as u8);
        buf.extend_from_slice(payload);
        crc32c(&buf)
    }

    pub fn verify_checksum(&self) -> bool {
        self.checksum == Self::compute_checksum(self.seq, self.ts, self.kind, &self.payload)
    }

    /// Serialize to the binary wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let payload_len = self.payload.len() as u32;
        // body = 8 (seq) + 8 (ts) + 1 (kind) + 4 (payload_len) + payload + 4 (crc)
        let body_len: u32 = 8 + 8 + 1 + 4 + payload_len + 4;

        let mut buf = Vec::with_capacity(4 + body_len as usize);
        buf.extend_from_slice(&body_len.to_le_bytes());
        buf.extend_from_slice(&self.seq.to_le_bytes());
        buf.extend_from_slice(&self.ts.to_le_bytes());
        buf.push(self.kind as u8);
        buf.extend_from_slice(&payload_len.to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Deserialize one record from the front of `data`.
    ///
    /// Returns `Ok(None)` when `data` holds only an incomplete record
    /// (a truncated tail after a crash); returns `(record, consumed)` on
    /// success. `offset` is only used to report error positions.
    pub fn from_bytes(data: &[u8], offset: usize) -> Result<Option<(Self, usize)>, EventLogError> {
        if data.len() < 4 {
            return Ok(None);
        }
        let body_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;

        // body must at least hold seq + ts + kind + payload_len + crc
        const MIN_BODY: usize = 8 + 8 + 1 + 4 + 4;
        if body_len < MIN_BODY {
            return Err(EventLogError::Decode {
                offset,
                detail: format!("implausible body length {}", body_len),
            });
        }

        let total = 4 + body_len;
        if data.len() < total {
            return Ok(None);
        }

        let body = &data[4..total];
        let seq = u64::from_le_bytes(body[0..8].try_into().expect("sized slice"));
        let ts = i64::from_le_bytes(body[8..16].try_into().expect("sized slice"));
        let kind = RecordKind::from_u8(body[16])?;
        let payload_len = u32::from_le_bytes(body[17..21].try_into().expect("sized slice")) as usize;

        if 21 + payload_len + 4 != body.len() {
            return Err(EventLogError::Decode {
                offset,
                detail: format!(
                    "payload length {} inconsistent with body length {}",
                    payload_len, body_len
                ),
            });
        }

        let payload = body[21..21 + payload_len].to_vec();
        let checksum =
            u32::from_le_bytes(body[21 + payload_len..].try_into().expect("sized slice"));

        let record = Self {
            seq,
            ts,
            kind,
            payload,
            checksum,
        };
        if !record.verify_checksum() {
            return Err(EventLogError::ChecksumMismatch { offset, seq });
        }
        Ok(Some((record, total)))
    }
}

// ── Writer ──────────────────────────────────────────────────────────

/// Buffered append-only writer for one log file.
pub struct EventLogWriter {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl EventLogWriter {
    /// Open the log for appending, creating parent directories as needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, EventLogError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, record: &LogRecord) -> Result<(), EventLogError> {
        self.writer.write_all(&record.to_bytes())?;
        Ok(())
    }

    /// Flush buffers and fsync to disk.
    pub fn sync(&mut self) -> Result<(), EventLogError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}

// ── Reader ──────────────────────────────────────────────────────────

/// Read every valid record of a log file.
///
/// Stops cleanly at a truncated final record; fails on checksum
/// mismatches and structural corruption.
pub fn read_all(path: &Path) -> Result<Vec<LogRecord>, EventLogError> {
    let mut data = Vec::new();
    File::open(path)?.read_to_end(&mut data)?;

    let mut records = Vec::new();
    let mut pos = 0usize;
    while pos < data.len() {
        match LogRecord::from_bytes(&data[pos..], pos)? {
            Some((record, consumed)) => {
                records.push(record);
                pos += consumed;
            }
            None => break, // truncated tail
        }
    }
    Ok(records)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use types::prelude::{Flags, Side};

    fn sample_order(seq: SeqNo, id: OrderId) -> NewOrder {
        NewOrder {
            seq,
            ts: 1_700_000_000_000_000_000 + seq as i64,
            id,
            user: 42,
            side: Side::Bid,
            price: 105,
            qty: 7,
            flags: Flags::NONE,
        }
    }

    #[test]
    fn test_record_roundtrip() {
        let record = LogRecord::new_limit(&sample_order(1, 11)).unwrap();
        assert!(record.verify_checksum());

        let bytes = record.to_bytes();
        let (decoded, consumed) = LogRecord::from_bytes(&bytes, 0).unwrap().unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, record);
        assert_eq!(decoded.decode_op().unwrap(), LoggedOp::NewLimit(sample_order(1, 11)));
    }

    #[test]
    fn test_all_kinds_decode() {
        let o = sample_order(1, 11);
        let m = ModifyOrder {
            seq: 2,
            ts: 5,
            id: 11,
            new_price: 104,
            new_qty: 3,
            flags: Flags::NONE,
        };

        assert!(matches!(
            LogRecord::new_market(&o).unwrap().decode_op().unwrap(),
            LoggedOp::NewMarket(got) if got == o
        ));
        assert!(matches!(
            LogRecord::cancel(3, 6, 11).unwrap().decode_op().unwrap(),
            LoggedOp::Cancel { id: 11 }
        ));
        assert!(matches!(
            LogRecord::modify(&m).unwrap().decode_op().unwrap(),
            LoggedOp::Modify(got) if got == m
        ));
    }

    #[test]
    fn test_checksum_detects_tamper() {
        let mut record = LogRecord::new_limit(&sample_order(1, 11)).unwrap();
        record.payload[0] ^= 0xFF;
        assert!(!record.verify_checksum());

        let bytes = record.to_bytes();
        assert!(matches!(
            LogRecord::from_bytes(&bytes, 0),
            Err(EventLogError::ChecksumMismatch { seq: 1, .. })
        ));
    }

    #[test]
    fn test_write_then_read_all() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ops.bin");

        let mut writer = EventLogWriter::open(&path).unwrap();
        for seq in 1..=10u64 {
            writer.append(&LogRecord::new_limit(&sample_order(seq, seq)).unwrap()).unwrap();
        }
        writer.sync().unwrap();

        let records = read_all(&path).unwrap();
        assert_eq!(records.len(), 10);
        assert_eq!(records[9].seq, 10);
    }

    #[test]
    fn test_truncated_tail_is_tolerated() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ops.bin");

        let mut writer = EventLogWriter::open(&path).unwrap();
        for seq in 1..=3u64 {
            writer.append(&LogRecord::new_limit(&sample_order(seq, seq)).unwrap()).unwrap();
        }
        writer.sync().unwrap();

        // Simulate a partial final write.
        let mut data = fs::read(&path).unwrap();
        data.extend_from_slice(&100u32.to_le_bytes());
        data.extend_from_slice(&[0u8; 10]);
        fs::write(&path, &data).unwrap();

        let records = read_all(&path).unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_append_resumes_existing_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ops.bin");

        {
            let mut writer = EventLogWriter::open(&path).unwrap();
            writer.append(&LogRecord::cancel(1, 1, 99).unwrap()).unwrap();
            writer.sync().unwrap();
        }
        {
            let mut writer = EventLogWriter::open(&path).unwrap();
            writer.append(&LogRecord::cancel(2, 2, 98).unwrap()).unwrap();
            writer.sync().unwrap();
        }

        let records = read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].seq, 1);
        assert_eq!(records[1].seq, 2);
    }

    #[test]
    fn test_unknown_kind_is_an_error() {
        let record = LogRecord::cancel(1, 1, 5).unwrap();
        let mut bytes = record.to_bytes();
        // kind byte sits at offset 4 + 8 + 8
        bytes[20] = 9;
        let err = LogRecord::from_bytes(&bytes, 0).unwrap_err();
        assert!(matches!(err, EventLogError::UnknownKind(9)));
    }
}
