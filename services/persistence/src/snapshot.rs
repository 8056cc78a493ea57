//! Book snapshots: binary resting-state images with integrity
//!
//! A snapshot captures every resting order of an engine, level by level,
//! so that a book can be rebuilt without replaying history. Loading
//! restores the nodes and then repopulates the id index through
//! `rebuild_index_from_books`.
//!
//! # Binary Format
//! ```text
//! header:
//!   [magic:    u32]  // 0x4C4F4253
//!   [version:  u32]
//!   [seq:      u64]  // last applied sequence
//!   [ts:       i64]
//!   [n_levels: u32]
//!   [n_orders: u32]
//! body, per level (bids first, most aggressive first):
//!   [side: u8][px: i64][n: u32]
//!   then n orders in FIFO order:
//!     [id: u64][user: u64][qty: i64][ts: i64][flags: u32]
//! trailer:
//!   [checksum: u32]  // CRC32C over header + body
//! ```
//! All integers little-endian.

use crc32c::crc32c;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;
use thiserror::Error;

use matching_engine::{BookCore, PriceLadder, RestingOrder};
use types::prelude::{Flags, SeqNo, Side, TsNanos};

/// Magic word at the head of every snapshot file ("LOBS").
pub const SNAPSHOT_MAGIC: u32 = 0x4C4F_4253;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

const HEADER_LEN: usize = 4 + 4 + 8 + 8 + 4 + 4;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Bad magic {found:#010x}, expected {SNAPSHOT_MAGIC:#010x}")]
    BadMagic { found: u32 },

    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),

    #[error("Checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("Snapshot file truncated ({0} bytes)")]
    Truncated(usize),

    #[error("Invalid side tag {0}")]
    BadSide(u8),

    #[error("Target book is not empty")]
    BookNotEmpty,
}

/// Header fields of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotMeta {
    pub seq: SeqNo,
    pub ts: TsNanos,
    pub n_levels: u32,
    pub n_orders: u32,
}

// ── Writer ──────────────────────────────────────────────────────────

/// Serialize all resting state of `book` to `path`.
///
/// Written atomically: a temporary file is fsynced and renamed into
/// place. `seq` and `ts` record where in the operation stream the image
/// was taken.
pub fn write_snapshot<L: PriceLadder>(
    path: &Path,
    book: &BookCore<L>,
    seq: SeqNo,
    ts: TsNanos,
) -> Result<SnapshotMeta, SnapshotError> {
    let mut body = Vec::new();
    let mut n_levels: u32 = 0;
    let mut n_orders: u32 = 0;

    for side in [Side::Bid, Side::Ask] {
        for (px, orders) in book.side_levels(side) {
            body.push(side as u8);
            body.extend_from_slice(&px.to_le_bytes());
            body.extend_from_slice(&(orders.len() as u32).to_le_bytes());
            for o in &orders {
                body.extend_from_slice(&o.id.to_le_bytes());
                body.extend_from_slice(&o.user.to_le_bytes());
                body.extend_from_slice(&o.qty.to_le_bytes());
                body.extend_from_slice(&o.ts.to_le_bytes());
                body.extend_from_slice(&o.flags.bits().to_le_bytes());
                n_orders += 1;
            }
            n_levels += 1;
        }
    }

    let meta = SnapshotMeta {
        seq,
        ts,
        n_levels,
        n_orders,
    };

    let mut buf = Vec::with_capacity(HEADER_LEN + body.len() + 4);
    buf.extend_from_slice(&SNAPSHOT_MAGIC.to_le_bytes());
    buf.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    buf.extend_from_slice(&seq.to_le_bytes());
    buf.extend_from_slice(&ts.to_le_bytes());
    buf.extend_from_slice(&n_levels.to_le_bytes());
    buf.extend_from_slice(&n_orders.to_le_bytes());
    buf.extend_from_slice(&body);
    let checksum = crc32c(&buf);
    buf.extend_from_slice(&checksum.to_le_bytes());

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&buf)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;

    Ok(meta)
}

// ── Loader ──────────────────────────────────────────────────────────

/// Restore a snapshot into an empty `book` and rebuild its id index.
pub fn load_snapshot<L: PriceLadder>(
    path: &Path,
    book: &mut BookCore<L>,
) -> Result<SnapshotMeta, SnapshotError> {
    if book.resting_count() != 0
        || !book.is_side_empty(Side::Bid)
        || !book.is_side_empty(Side::Ask)
    {
        return Err(SnapshotError::BookNotEmpty);
    }

    let mut data = Vec::new();
    File::open(path)?.read_to_end(&mut data)?;
    if data.len() < HEADER_LEN + 4 {
        return Err(SnapshotError::Truncated(data.len()));
    }

    let stored =
        u32::from_le_bytes(data[data.len() - 4..].try_into().expect("sized slice"));
    let computed = crc32c(&data[..data.len() - 4]);
    if stored != computed {
        return Err(SnapshotError::ChecksumMismatch { stored, computed });
    }

    let mut cur = Cursor::new(&data[..data.len() - 4]);
    let magic = cur.u32()?;
    if magic != SNAPSHOT_MAGIC {
        return Err(SnapshotError::BadMagic { found: magic });
    }
    let version = cur.u32()?;
    if version > SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(version));
    }
    let meta = SnapshotMeta {
        seq: cur.u64()?,
        ts: cur.i64()?,
        n_levels: cur.u32()?,
        n_orders: cur.u32()?,
    };

    for _ in 0..meta.n_levels {
        let side = match cur.u8()? {
            0 => Side::Bid,
            1 => Side::Ask,
            other => return Err(SnapshotError::BadSide(other)),
        };
        let px = cur.i64()?;
        let n = cur.u32()?;
        for _ in 0..n {
            let order = RestingOrder {
                id: cur.u64()?,
                user: cur.u64()?,
                qty: cur.i64()?,
                ts: cur.i64()?,
                flags: Flags::from_bits(cur.u32()?),
            };
            book.restore_resting(side, px, order);
        }
    }

    book.rebuild_index_from_books();
    Ok(meta)
}

/// Bounds-checked little-endian cursor over the snapshot bytes.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SnapshotError> {
        if self.pos + n > self.data.len() {
            return Err(SnapshotError::Truncated(self.data.len()));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, SnapshotError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, SnapshotError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().expect("sized slice")))
    }

    fn u64(&mut self) -> Result<u64, SnapshotError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().expect("sized slice")))
    }

    fn i64(&mut self) -> Result<i64, SnapshotError> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().expect("sized slice")))
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use matching_engine::SparseLadder;
    use tempfile::TempDir;
    use types::prelude::{NewOrder, Quantity, Tick};

    fn sparse_book() -> BookCore<SparseLadder> {
        BookCore::new(SparseLadder::new(Side::Bid), SparseLadder::new(Side::Ask))
    }

    fn rest(book: &mut BookCore<SparseLadder>, seq: u64, id: u64, side: Side, px: Tick, qty: Quantity) {
        let r = book.submit_limit(NewOrder {
            seq,
            ts: 1_000 + seq as i64,
            id,
            user: 40 + id,
            side,
            price: px,
            qty,
            flags: Flags::NONE,
        });
        assert_eq!(r.remaining, qty);
    }

    fn populated_book() -> BookCore<SparseLadder> {
        let mut book = sparse_book();
        rest(&mut book, 1, 101, Side::Bid, 105, 5);
        rest(&mut book, 2, 102, Side::Bid, 105, 7);
        rest(&mut book, 3, 103, Side::Bid, 103, 2);
        rest(&mut book, 4, 201, Side::Ask, 108, 4);
        book
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("book.snap");
        let book = populated_book();

        let meta = write_snapshot(&path, &book, 4, 1_004).unwrap();
        assert_eq!(meta.n_levels, 3);
        assert_eq!(meta.n_orders, 4);

        let mut restored = sparse_book();
        let loaded = load_snapshot(&path, &mut restored).unwrap();
        assert_eq!(loaded, meta);

        restored.check_invariants();
        assert_eq!(restored.best(Side::Bid), 105);
        assert_eq!(restored.best(Side::Ask), 108);
        assert_eq!(restored.side_levels(Side::Bid), book.side_levels(Side::Bid));
        assert_eq!(restored.side_levels(Side::Ask), book.side_levels(Side::Ask));

        // Index is live again: cancel by id works.
        assert!(restored.cancel(102));
        assert_eq!(restored.total_at(Side::Bid, 105), 5);
    }

    #[test]
    fn test_snapshot_preserves_fifo_order() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("book.snap");
        let book = populated_book();
        write_snapshot(&path, &book, 4, 1_004).unwrap();

        let mut restored = sparse_book();
        load_snapshot(&path, &mut restored).unwrap();
        let ids: Vec<u64> = restored
            .level_orders(Side::Bid, 105)
            .iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, vec![101, 102]);
    }

    #[test]
    fn test_empty_book_snapshot() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.snap");
        let book = sparse_book();

        let meta = write_snapshot(&path, &book, 0, 0).unwrap();
        assert_eq!(meta.n_levels, 0);
        assert_eq!(meta.n_orders, 0);

        let mut restored = sparse_book();
        load_snapshot(&path, &mut restored).unwrap();
        assert!(restored.is_side_empty(Side::Bid));
        assert!(restored.is_side_empty(Side::Ask));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("book.snap");
        write_snapshot(&path, &populated_book(), 4, 1_004).unwrap();

        let mut data = fs::read(&path).unwrap();
        data[0] = 0x00;
        // Re-seal the checksum so only the magic is wrong.
        let len = data.len();
        let crc = crc32c(&data[..len - 4]);
        data[len - 4..].copy_from_slice(&crc.to_le_bytes());
        fs::write(&path, &data).unwrap();

        let mut restored = sparse_book();
        assert!(matches!(
            load_snapshot(&path, &mut restored),
            Err(SnapshotError::BadMagic { .. })
        ));
    }

    #[test]
    fn test_corruption_detected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("book.snap");
        write_snapshot(&path, &populated_book(), 4, 1_004).unwrap();

        let mut data = fs::read(&path).unwrap();
        let mid = data.len() / 2;
        data[mid] ^= 0xFF;
        fs::write(&path, &data).unwrap();

        let mut restored = sparse_book();
        assert!(matches!(
            load_snapshot(&path, &mut restored),
            Err(SnapshotError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_load_into_nonempty_book_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("book.snap");
        write_snapshot(&path, &populated_book(), 4, 1_004).unwrap();

        let mut busy = populated_book();
        assert!(matches!(
            load_snapshot(&path, &mut busy),
            Err(SnapshotError::BookNotEmpty)
        ));
    }

    #[test]
    fn test_deterministic_bytes() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.snap");
        let b = tmp.path().join("b.snap");
        write_snapshot(&a, &populated_book(), 4, 1_004).unwrap();
        write_snapshot(&b, &populated_book(), 4, 1_004).unwrap();
        assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
    }
}
