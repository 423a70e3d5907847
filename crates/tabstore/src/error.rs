//! Error taxonomy for container open, write, and read operations.
//!
//! Every variant carries enough context (table name, file path, expected vs.
//! found values) to diagnose a malformed or truncated container without
//! inspecting raw bytes. In-memory containers have an empty path.

use std::io;
use std::path::{Path, PathBuf};

use cardfile::FormatError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The file failed the container-format magic check on open-for-read.
    #[error("file {path:?} is not a container-format file")]
    NotAContainer { path: PathBuf },

    /// An open/read/write/seek/close failure at the backend.
    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A header could not be parsed, patched, or introspected.
    #[error("malformed header in {path:?}: {source}")]
    MalformedHeader {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    /// A required table was absent on read.
    #[error("table {table:?} not found in {path:?}")]
    TableNotFound { table: String, path: PathBuf },

    /// Discovered row count or row width disagrees with the expectation.
    #[error("table {table:?} in {path:?}: expected {expected} {what}, found {found}")]
    ShapeMismatch {
        table: String,
        path: PathBuf,
        /// Which dimension disagreed: `"rows"` or `"bytes per row"`.
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// The section's reserved byte size disagrees with the expected data
    /// length rounded to block granularity.
    #[error(
        "table {table:?} in {path:?}: expected {expected_bytes} bytes \
         ({expected_blocks} blocks), section reserves {found_blocks} blocks"
    )]
    SizeMismatch {
        table: String,
        path: PathBuf,
        expected_bytes: usize,
        expected_blocks: u64,
        found_blocks: u64,
    },

    /// The memory-map call for a table's data failed.
    #[error("failed to map table {table:?} in {path:?}: {source}")]
    Mapping {
        table: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Error::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Maps a format-layer failure: raw I/O errors keep their kind, anything
    /// else is a malformed header.
    pub(crate) fn format(path: &Path, source: FormatError) -> Self {
        match source {
            FormatError::Io(source) => Error::io(path, source),
            other => Error::MalformedHeader {
                path: path.to_path_buf(),
                source: other,
            },
        }
    }
}
