//! # cardfile — container-format header primitives
//!
//! Low-level read/write/patch support for the textual-header container format
//! used by the tabstore storage engine.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ SECTION 0: primary header (no data)           │
//! │                                               │
//! │ SIMPLE  =                    T                │
//! │ BITPIX  =                    8                │
//! │ NAXIS   =                    0                │
//! │ EXTEND  =                    T                │
//! │ END                                           │
//! │ ... space padding to a 2880-byte block ...    │
//! ├───────────────────────────────────────────────┤
//! │ SECTION 1..N: one binary table each           │
//! │                                               │
//! │ header: XTENSION/NAXIS1/NAXIS2/TTYPE1/...     │
//! │         (80-byte cards, END, block padding)   │
//! │ data:   NAXIS2 rows of NAXIS1 bytes,          │
//! │         zero-padded to a block boundary       │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! Every header is a sequence of fixed-width 80-byte "cards" terminated by an
//! `END` card and space-padded to a 2880-byte block boundary. Values occupy a
//! fixed-width field inside the card, so rewriting a value in place (the
//! stub-then-patch pattern used for deferred row counts) never changes the
//! header's byte length.
//!
//! This crate knows nothing about chunks or backends; it only models cards,
//! headers, block sizing, and section scanning.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use thiserror::Error;

mod card;
mod header;
mod scan;

pub use card::{Card, Value, CARD_SIZE};
pub use header::Header;
pub use scan::{find_table, open_table, read_header_at, table_shape, TableLocation};

/// Size of one format block in bytes. Headers and data sections are both
/// padded to this granularity.
pub const BLOCK_SIZE: usize = 2880;

/// Number of cards in one header block.
pub const CARDS_PER_BLOCK: usize = BLOCK_SIZE / CARD_SIZE;

/// Failures raised by header encoding, decoding, and section scanning.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("truncated block (container file ends mid-block)")]
    Truncated,
    #[error("header has no END card before end of file")]
    MissingEnd,
    #[error("bad header card: {0}")]
    BadCard(String),
    #[error("missing header keyword {0}")]
    MissingKeyword(String),
    #[error("container has no section {0}")]
    NoSuchSection(usize),
    #[error("patched header length changed ({old} -> {new} bytes)")]
    PatchSizeChanged { old: u64, new: u64 },
}

/// Rounds a byte count up to whole blocks.
pub fn bytes_to_blocks(n: u64) -> u64 {
    n.div_ceil(BLOCK_SIZE as u64)
}

/// Converts a block count back to bytes.
pub fn blocks_to_bytes(blocks: u64) -> u64 {
    blocks * BLOCK_SIZE as u64
}

/// Returns how many padding bytes follow `n` content bytes up to the next
/// block boundary (zero when `n` is already block-aligned).
pub fn block_padding(n: u64) -> usize {
    (blocks_to_bytes(bytes_to_blocks(n)) - n) as usize
}

/// Returns `true` if the file at `path` starts with a valid primary-header
/// magic card (`SIMPLE = T`).
///
/// Any open, read, or parse failure yields `false` — this is a cheap
/// precondition probe, not a full validation pass.
pub fn is_container_file<P: AsRef<Path>>(path: P) -> bool {
    let mut raw = [0u8; CARD_SIZE];
    let Ok(mut f) = File::open(path) else {
        return false;
    };
    if f.read_exact(&mut raw).is_err() {
        return false;
    }
    match Card::parse(&raw) {
        Ok(Some(card)) => {
            card.keyword() == "SIMPLE" && matches!(card.value(), Some(Value::Logical(true)))
        }
        _ => false,
    }
}

/// Reads the primary header (section 0) of the container at `path`.
pub fn read_primary_header<P: AsRef<Path>>(path: P) -> Result<Header, FormatError> {
    let mut f = File::open(path)?;
    let (header, _) = Header::read_from(&mut f)?;
    Ok(header)
}

/// Writes the primary header at the writer's current position (which should
/// be offset 0) and returns the end offset of the written header.
pub fn write_primary<W: Write + Seek>(w: &mut W, header: &Header) -> Result<u64, FormatError> {
    header.write_to(w)?;
    Ok(w.stream_position()?)
}

/// Rewrites the primary header in place.
///
/// `end` must be the end offset returned by [`write_primary`]; the re-encoded
/// header must still occupy exactly `end` bytes. The stream position is
/// restored afterwards.
pub fn patch_primary<W: Write + Seek>(
    w: &mut W,
    header: &Header,
    end: u64,
) -> Result<(), FormatError> {
    patch_header(w, header, 0, end)
}

/// Writes a table header at the writer's current position, returning the
/// `(start, end)` byte span it occupies.
pub fn write_header<W: Write + Seek>(w: &mut W, header: &Header) -> Result<(u64, u64), FormatError> {
    let start = w.stream_position()?;
    header.write_to(w)?;
    let end = w.stream_position()?;
    Ok((start, end))
}

/// Rewrites a previously written header over its original `(start, end)`
/// span.
///
/// Fails with [`FormatError::PatchSizeChanged`] if the header no longer
/// encodes to `end - start` bytes (value fields are fixed-width, so this only
/// happens if cards were added or removed). The stream position is restored
/// afterwards, so a write pipeline can keep appending where it left off.
pub fn patch_header<W: Write + Seek>(
    w: &mut W,
    header: &Header,
    start: u64,
    end: u64,
) -> Result<(), FormatError> {
    let new_len = header.byte_len() as u64;
    if new_len != end - start {
        return Err(FormatError::PatchSizeChanged {
            old: end - start,
            new: new_len,
        });
    }
    let pos = w.stream_position()?;
    w.seek(SeekFrom::Start(start))?;
    header.write_to(w)?;
    w.seek(SeekFrom::Start(pos))?;
    Ok(())
}
