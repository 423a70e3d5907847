//! Chunk descriptors and their materialized data.
//!
//! A chunk is one named, fixed-row-width table inside a container. The chunk
//! itself is backend-agnostic: it carries the table name, the (possibly
//! not-yet-known) shape, the cached table header, and — after a read —
//! either a mapped view or an owned copy of the rows.

use cardfile::{FormatError, Header};

use crate::mapping::MappedRegion;

/// A stable handle to a registered chunk, valid for the lifetime of the
/// container that returned it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHandle(pub(crate) usize);

/// The expected shape of a chunk, as seen by a read-header hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkShape {
    /// Bytes per row.
    pub item_size: usize,
    /// Number of rows.
    pub row_count: usize,
}

/// Callback invoked during the read pipeline after the table's header has
/// been loaded and unspecified shape fields adopted, but before validation.
///
/// The hook receives the stored header and may adjust the expected shape —
/// e.g. derive the row width from application-specific header cards that
/// were unknown when the chunk was registered.
pub type ReadHook = Box<dyn FnMut(&Header, &mut ChunkShape) -> Result<(), FormatError> + Send>;

/// Configuration for registering a chunk with a container.
///
/// Shape fields left unset mean "adopt whatever the stored table has" on
/// read; for writing, `item_size` must be set before the first pipeline
/// step.
pub struct ChunkSpec {
    pub(crate) name: String,
    pub(crate) item_size: usize,
    pub(crate) row_count: usize,
    pub(crate) required: bool,
    pub(crate) read_hook: Option<ReadHook>,
}

impl ChunkSpec {
    /// A spec for the table `name` with no shape expectations, not required.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            item_size: 0,
            row_count: 0,
            required: false,
            read_hook: None,
        }
    }

    /// Sets the row width in bytes (mandatory before writing; an expectation
    /// to validate on read).
    pub fn item_size(mut self, item_size: usize) -> Self {
        self.item_size = item_size;
        self
    }

    /// Sets the starting row count for writes, or the exact row count to
    /// validate on read.
    pub fn row_count(mut self, row_count: usize) -> Self {
        self.row_count = row_count;
        self
    }

    /// Marks the chunk as required: failing to locate it on read fails the
    /// whole read operation.
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Installs a read-header hook (see [`ReadHook`]).
    pub fn read_hook(
        mut self,
        hook: impl FnMut(&Header, &mut ChunkShape) -> Result<(), FormatError> + Send + 'static,
    ) -> Self {
        self.read_hook = Some(Box::new(hook));
        self
    }
}

/// The materialized data of a chunk after a read.
pub(crate) enum ChunkData {
    /// Nothing materialized (pre-read, or an optional table that was absent,
    /// or a zero-row table).
    Empty,
    /// An owned copy of the rows (in-memory backend).
    Owned(Vec<u8>),
    /// A zero-copy view into the container file (file backend); released
    /// when the chunk is dropped.
    Mapped(MappedRegion),
}

/// One named, fixed-row-width table registered with a container.
///
/// Chunks are created through [`Container::register`] and addressed by the
/// returned [`ChunkHandle`]; they never outlive their container, which keeps
/// any mapped data valid for as long as the chunk is reachable.
///
/// [`Container::register`]: crate::Container::register
pub struct Chunk {
    pub(crate) name: String,
    /// Bytes per row; 0 until configured or discovered.
    pub(crate) item_size: usize,
    /// Rows written so far (write pipeline) or discovered (read pipeline).
    pub(crate) nrows: usize,
    pub(crate) required: bool,
    /// Cached table header, materialized on first use and patched in place.
    pub(crate) header: Option<Header>,
    pub(crate) data: ChunkData,
    /// Byte span of the header within the file (file write mode).
    pub(crate) header_span: Option<(u64, u64)>,
    pub(crate) read_hook: Option<ReadHook>,
}

impl Chunk {
    pub(crate) fn from_spec(spec: ChunkSpec) -> Self {
        Self {
            name: spec.name,
            item_size: spec.item_size,
            nrows: spec.row_count,
            required: spec.required,
            header: None,
            data: ChunkData::Empty,
            header_span: None,
            read_hook: spec.read_hook,
        }
    }

    /// The table name used for lookup.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes per row; 0 if not yet configured or discovered.
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Current number of rows.
    pub fn n_rows(&self) -> usize {
        self.nrows
    }

    /// Whether a failed lookup of this chunk fails the whole read.
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// `true` once a read has materialized data for this chunk.
    pub fn has_data(&self) -> bool {
        !matches!(self.data, ChunkData::Empty)
    }

    /// The materialized rows, back-to-back; empty if nothing has been read.
    pub fn data(&self) -> &[u8] {
        match &self.data {
            ChunkData::Empty => &[],
            ChunkData::Owned(bytes) => bytes,
            ChunkData::Mapped(region) => region.bytes(),
        }
    }

    /// Borrows row `i` of the materialized data.
    ///
    /// # Panics
    ///
    /// Panics if no data is materialized or `i` is out of range.
    pub fn row(&self, i: usize) -> &[u8] {
        let start = i * self.item_size;
        &self.data()[start..start + self.item_size]
    }

    /// The cached table header, if one has been materialized or loaded.
    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    /// Returns the cached table header, building it from the current name
    /// and shape on first call. Subsequent calls return the cached header
    /// unchanged — later row-count updates only reach it through the
    /// finalize step's explicit patch.
    pub(crate) fn table_header(&mut self) -> &Header {
        let name = &self.name;
        let (item_size, nrows) = (self.item_size, self.nrows);
        self.header
            .get_or_insert_with(|| Header::bintable(name, item_size, nrows))
    }
}
