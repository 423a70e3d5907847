//! Storage backends: the capability interface behind a container.
//!
//! A backend is chosen once when the container is opened and exposes the
//! operations both pipelines need — stub-header write, row append, finalize,
//! table location, header load, shape introspection, and materialization.
//! The pipelines call these methods and never branch on the storage mode
//! themselves.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::time::Instant;

use cardfile::{Header, TableLocation};
use log::{debug, trace};
use rowbuf::RowBuffer;

use crate::chunk::{Chunk, ChunkData};
use crate::error::{Error, Result};
use crate::mapping::MappedRegion;

/// An immutable snapshot of a finalized chunk in an in-memory container:
/// the table name, an owned copy of the patched header, and the committed
/// rows. Never mutated after creation; repeated reads copy rows out of it.
pub(crate) struct Extension {
    name: String,
    header: Header,
    rows: RowBuffer,
}

/// Where a located table lives, in backend-specific terms.
pub(crate) enum Located {
    File(TableLocation),
    Memory(usize),
}

/// The storage capability behind a container, selected at open time.
pub(crate) enum Backend {
    File(FileBackend),
    Memory(MemoryBackend),
}

pub(crate) struct FileBackend {
    file: File,
    writable: bool,
}

#[derive(Default)]
pub(crate) struct MemoryBackend {
    extensions: Vec<Extension>,
    /// Rows accumulated for the chunk currently being written; at most one
    /// chunk is mid-write at a time. Transferred into a new [`Extension`]
    /// at finalize.
    pending: Option<RowBuffer>,
}

impl FileBackend {
    pub(crate) fn new(file: File, writable: bool) -> Self {
        Self { file, writable }
    }

    fn require_writable(&self, path: &Path) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(Error::io(
                path,
                io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "container is not open for writing",
                ),
            ))
        }
    }

    fn require_readable(&self, path: &Path) -> Result<()> {
        if self.writable {
            Err(Error::io(
                path,
                io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "container is not open for reading",
                ),
            ))
        } else {
            Ok(())
        }
    }
}

impl Backend {
    pub(crate) fn in_memory() -> Self {
        Backend::Memory(MemoryBackend::default())
    }

    pub(crate) fn is_memory(&self) -> bool {
        matches!(self, Backend::Memory(_))
    }

    // ---- primary header ----

    /// Writes the primary header; returns its end offset in file mode.
    pub(crate) fn write_primary(&mut self, header: &Header, path: &Path) -> Result<Option<u64>> {
        match self {
            Backend::File(fb) => {
                fb.require_writable(path)?;
                let end = cardfile::write_primary(&mut fb.file, header)
                    .map_err(|e| Error::format(path, e))?;
                Ok(Some(end))
            }
            // the header exists only as an object; nothing to write
            Backend::Memory(_) => Ok(None),
        }
    }

    /// Rewrites the primary header over its original span.
    pub(crate) fn patch_primary(
        &mut self,
        header: &Header,
        end: Option<u64>,
        path: &Path,
    ) -> Result<()> {
        match self {
            Backend::File(fb) => {
                fb.require_writable(path)?;
                let end = end.ok_or_else(|| {
                    Error::io(
                        path,
                        io::Error::other("primary header was never written"),
                    )
                })?;
                cardfile::patch_primary(&mut fb.file, header, end)
                    .map_err(|e| Error::format(path, e))
            }
            Backend::Memory(_) => Ok(()),
        }
    }

    // ---- write pipeline ----

    /// Writes the chunk's stub header (file mode: appended at the current
    /// position, span recorded for the later patch; memory mode: the header
    /// is only materialized and cached).
    pub(crate) fn write_stub_header(&mut self, chunk: &mut Chunk, path: &Path) -> Result<()> {
        match self {
            Backend::File(fb) => {
                fb.require_writable(path)?;
                let span = cardfile::write_header(&mut fb.file, chunk.table_header())
                    .map_err(|e| Error::format(path, e))?;
                chunk.header_span = Some(span);
            }
            Backend::Memory(_) => {
                chunk.table_header();
            }
        }
        Ok(())
    }

    /// Appends raw row bytes (file mode: straight to the file; memory mode:
    /// into the pending buffer).
    pub(crate) fn append_rows(
        &mut self,
        item_size: usize,
        rows: &[u8],
        path: &Path,
    ) -> Result<()> {
        match self {
            Backend::File(fb) => {
                fb.require_writable(path)?;
                fb.file.write_all(rows).map_err(|e| Error::io(path, e))?;
            }
            Backend::Memory(mb) => {
                let pending = mb.pending.get_or_insert_with(|| RowBuffer::new(item_size));
                pending.extend_from_rows(rows);
            }
        }
        Ok(())
    }

    /// Finalizes a chunk: patches the cached header's row count, then — in
    /// file mode — pads the data section to block granularity and rewrites
    /// the stub header in place, or — in memory mode — publishes the header
    /// and pending rows as a new extension. After this the chunk's data is
    /// authoritative for readers.
    pub(crate) fn finalize(&mut self, chunk: &mut Chunk, path: &Path) -> Result<()> {
        let nrows = chunk.nrows;
        let item_size = chunk.item_size;
        chunk.table_header();
        if let Some(header) = chunk.header.as_mut() {
            header.set_integer("NAXIS2", nrows as i64);
        }
        match self {
            Backend::File(fb) => {
                fb.require_writable(path)?;
                let (start, end) = chunk.header_span.ok_or_else(|| {
                    Error::io(
                        path,
                        io::Error::other("chunk header was never written"),
                    )
                })?;
                let pad = cardfile::block_padding((item_size * nrows) as u64);
                if pad > 0 {
                    fb.file
                        .write_all(&vec![0u8; pad])
                        .map_err(|e| Error::io(path, e))?;
                }
                if let Some(header) = chunk.header.as_ref() {
                    cardfile::patch_header(&mut fb.file, header, start, end)
                        .map_err(|e| Error::format(path, e))?;
                }
            }
            Backend::Memory(mb) => {
                let rows = mb
                    .pending
                    .take()
                    .unwrap_or_else(|| RowBuffer::new(item_size));
                trace!(
                    "publishing in-memory extension {:?} ({} rows)",
                    chunk.name,
                    rows.n_rows()
                );
                mb.extensions.push(Extension {
                    name: chunk.name.clone(),
                    header: chunk.table_header().clone(),
                    rows,
                });
            }
        }
        Ok(())
    }

    // ---- read pipeline ----

    /// Looks up a table by name (case-insensitive). `Ok(None)` means the
    /// table is absent; whether that is fatal is the pipeline's decision.
    pub(crate) fn locate(&mut self, name: &str, path: &Path) -> Result<Option<Located>> {
        match self {
            Backend::File(fb) => {
                fb.require_readable(path)?;
                let t = Instant::now();
                let loc = cardfile::find_table(&mut fb.file, name)
                    .map_err(|e| Error::format(path, e))?;
                debug!("find_table({name:?}) took {:?}", t.elapsed());
                Ok(loc.map(Located::File))
            }
            Backend::Memory(mb) => Ok(mb
                .extensions
                .iter()
                .position(|ext| ext.name.eq_ignore_ascii_case(name))
                .map(Located::Memory)),
        }
    }

    /// Loads the header of a located table.
    pub(crate) fn load_header(&mut self, loc: &Located, path: &Path) -> Result<Header> {
        match (self, loc) {
            (Backend::File(fb), Located::File(table)) => {
                cardfile::read_header_at(&mut fb.file, table.section)
                    .map_err(|e| Error::format(path, e))
            }
            (Backend::Memory(mb), Located::Memory(i)) => Ok(mb.extensions[*i].header.clone()),
            _ => unreachable!("location does not belong to this backend"),
        }
    }

    /// Reports the stored shape `(row_count, item_size)` of a located table.
    pub(crate) fn shape(&self, loc: &Located, header: &Header, path: &Path) -> Result<(usize, usize)> {
        match (self, loc) {
            (Backend::File(_), Located::File(_)) => {
                cardfile::table_shape(header).map_err(|e| Error::format(path, e))
            }
            (Backend::Memory(mb), Located::Memory(i)) => {
                let ext = &mb.extensions[*i];
                Ok((ext.rows.n_rows(), ext.rows.item_size()))
            }
            _ => unreachable!("location does not belong to this backend"),
        }
    }

    /// Materializes a validated chunk's data: file mode maps the section
    /// read-only (checking the reserved size first), memory mode copies the
    /// extension's rows out.
    pub(crate) fn materialize(&self, chunk: &mut Chunk, loc: &Located, path: &Path) -> Result<()> {
        let expected = chunk.item_size * chunk.nrows;
        match (self, loc) {
            (Backend::File(fb), Located::File(table)) => {
                let expected_blocks = cardfile::bytes_to_blocks(expected as u64);
                if cardfile::blocks_to_bytes(expected_blocks) != table.data_size {
                    return Err(Error::SizeMismatch {
                        table: chunk.name.clone(),
                        path: path.to_path_buf(),
                        expected_bytes: expected,
                        expected_blocks,
                        found_blocks: cardfile::bytes_to_blocks(table.data_size),
                    });
                }
                chunk.data = if expected == 0 {
                    ChunkData::Empty
                } else {
                    let region = MappedRegion::map_range(&fb.file, table.data_start, expected)
                        .map_err(|e| Error::Mapping {
                            table: chunk.name.clone(),
                            path: path.to_path_buf(),
                            source: e,
                        })?;
                    ChunkData::Mapped(region)
                };
            }
            (Backend::Memory(mb), Located::Memory(i)) => {
                chunk.data = ChunkData::Owned(mb.extensions[*i].rows.as_bytes().to_vec());
            }
            _ => unreachable!("location does not belong to this backend"),
        }
        Ok(())
    }

    // ---- teardown ----

    /// Releases the backend. File mode flushes written data to disk before
    /// the handle is dropped; failures are reported to the caller.
    pub(crate) fn close(self, path: &Path) -> Result<()> {
        match self {
            Backend::File(fb) => {
                if fb.writable {
                    fb.file.sync_all().map_err(|e| Error::io(path, e))?;
                }
                Ok(())
            }
            Backend::Memory(_) => Ok(()),
        }
    }
}
