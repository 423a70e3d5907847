//! # RowBuffer
//!
//! An append-only, in-memory buffer of fixed-width binary rows.
//!
//! The tabstore engine stages table rows here in two places: while a chunk is
//! being written to an in-memory container (the "pending rows" buffer), and
//! inside each finalized in-memory extension (the committed snapshot). Rows
//! are homogeneous — every row is exactly `item_size` bytes — and are stored
//! contiguously, so the whole buffer can be handed to a writer or copied out
//! in one shot.
//!
//! ## Key properties
//! - **Fixed row width**: the width is set at construction and never changes.
//! - **Append-only**: rows are pushed at the end; there is no removal.
//! - **Random access**: any row can be borrowed by index.
//! - **Contiguous storage**: `as_bytes()` exposes all rows back-to-back.
//!
//! ## Example
//! ```rust
//! use rowbuf::RowBuffer;
//!
//! let mut buf = RowBuffer::new(4);
//! buf.push(&[1, 2, 3, 4]);
//! buf.push(&[5, 6, 7, 8]);
//! assert_eq!(buf.n_rows(), 2);
//! assert_eq!(buf.row(1), &[5, 6, 7, 8]);
//! ```

/// An append-only buffer of fixed-width byte rows backed by a `Vec<u8>`.
///
/// Rows are stored contiguously in insertion order. The row width
/// (`item_size`) is fixed at construction; pushing a slice of any other
/// length is a caller bug and panics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowBuffer {
    item_size: usize,
    bytes: Vec<u8>,
}

impl RowBuffer {
    /// Creates an empty buffer for rows of `item_size` bytes each.
    ///
    /// # Panics
    ///
    /// Panics if `item_size` is zero.
    pub fn new(item_size: usize) -> Self {
        assert!(item_size > 0, "row width must be non-zero");
        Self {
            item_size,
            bytes: Vec::new(),
        }
    }

    /// Creates an empty buffer with space reserved for `rows` rows.
    pub fn with_capacity(item_size: usize, rows: usize) -> Self {
        assert!(item_size > 0, "row width must be non-zero");
        Self {
            item_size,
            bytes: Vec::with_capacity(item_size * rows),
        }
    }

    /// Returns the fixed width of one row in bytes.
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Appends a single row.
    ///
    /// # Panics
    ///
    /// Panics if `row.len() != item_size`.
    pub fn push(&mut self, row: &[u8]) {
        assert_eq!(
            row.len(),
            self.item_size,
            "row length {} does not match row width {}",
            row.len(),
            self.item_size
        );
        self.bytes.extend_from_slice(row);
    }

    /// Appends zero or more rows stored back-to-back in `rows`.
    ///
    /// # Panics
    ///
    /// Panics if `rows.len()` is not a multiple of the row width.
    pub fn extend_from_rows(&mut self, rows: &[u8]) {
        assert_eq!(
            rows.len() % self.item_size,
            0,
            "byte length {} is not a multiple of row width {}",
            rows.len(),
            self.item_size
        );
        self.bytes.extend_from_slice(rows);
    }

    /// Borrows row `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= n_rows()`.
    pub fn row(&self, i: usize) -> &[u8] {
        let start = i * self.item_size;
        &self.bytes[start..start + self.item_size]
    }

    /// Returns the number of rows currently stored.
    pub fn n_rows(&self) -> usize {
        self.bytes.len() / self.item_size
    }

    /// Returns `true` if the buffer holds zero rows.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Borrows all rows as one contiguous byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the buffer and returns the contiguous row bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Removes all rows, keeping the allocation and row width.
    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}
