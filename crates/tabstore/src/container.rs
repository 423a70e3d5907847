//! The container: owner of one storage backend and a set of chunks.
//!
//! # Write Path
//!
//! 1. [`Container::open_for_writing`] (or [`open_in_memory`]) — fresh
//!    default primary header, empty chunk list.
//! 2. [`Container::write_primary_header`] — section 0 on disk (no-op in
//!    memory mode).
//! 3. Per chunk: [`register`] → [`write_chunk_header`] (stub with the
//!    starting row count) → [`append_rows`] / [`append_rows_flipped`] →
//!    [`finalize_chunk`] (pads the data section and patches the stub's row
//!    count in place; in memory mode publishes the extension). The one-shot
//!    [`write_chunk`] / [`write_chunk_flipped`] drive all three steps.
//! 4. [`Container::close`].
//!
//! # Read Path
//!
//! 1. [`Container::open_for_reading`] — magic check, primary header load.
//! 2. Per chunk: [`register`] → [`read_chunk`], or [`read_all`] for every
//!    registered chunk in order. Each read locates the table by name
//!    (case-insensitive), loads its header, adopts unspecified shape
//!    fields, runs the chunk's read hook, validates shape and reserved
//!    size, then materializes the rows (file: page-aligned read-only map;
//!    memory: copy out of the extension).
//!
//! [`open_in_memory`]: Container::open_in_memory
//! [`register`]: Container::register
//! [`write_chunk_header`]: Container::write_chunk_header
//! [`append_rows`]: Container::append_rows
//! [`append_rows_flipped`]: Container::append_rows_flipped
//! [`finalize_chunk`]: Container::finalize_chunk
//! [`write_chunk`]: Container::write_chunk
//! [`write_chunk_flipped`]: Container::write_chunk_flipped
//! [`read_chunk`]: Container::read_chunk
//! [`read_all`]: Container::read_all

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use cardfile::Header;
use log::{debug, warn};

use crate::backend::{Backend, FileBackend};
use crate::chunk::{Chunk, ChunkHandle, ChunkShape, ChunkSpec};
use crate::error::{Error, Result};
use crate::swap::swap_words;

/// A chunked binary-table container: one backend (file or in-memory), one
/// primary header, and any number of registered chunks.
///
/// The container exclusively owns its backend handle, its primary header,
/// and every chunk (including their cached headers and mappings); mapped
/// chunk data is valid exactly as long as the container is alive.
pub struct Container {
    path: PathBuf,
    backend: Backend,
    primary: Header,
    primary_end: Option<u64>,
    chunks: Vec<Chunk>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("path", &self.path)
            .field("primary_end", &self.primary_end)
            .field("chunks", &self.chunks.len())
            .finish_non_exhaustive()
    }
}

impl Container {
    /// Opens an existing container file for reading.
    ///
    /// Fails with [`Error::Io`] if the file cannot be opened or its primary
    /// header cannot be read, and with [`Error::NotAContainer`] if the magic
    /// check fails. No chunks are registered yet.
    pub fn open_for_reading<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path).map_err(|e| Error::io(&path, e))?;
        if !cardfile::is_container_file(&path) {
            return Err(Error::NotAContainer { path });
        }
        let (primary, _) = Header::read_from(&mut file).map_err(|e| Error::format(&path, e))?;
        debug!("opened container {path:?} for reading");
        Ok(Self {
            path,
            backend: Backend::File(FileBackend::new(file, false)),
            primary,
            primary_end: None,
            chunks: Vec::new(),
        })
    }

    /// Creates (or truncates) a container file for writing.
    ///
    /// The primary header starts as the default container header; add cards
    /// through [`Container::primary_header_mut`] before writing it.
    pub fn open_for_writing<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;
        debug!("opened container {path:?} for writing");
        Ok(Self {
            path,
            backend: Backend::File(FileBackend::new(file, true)),
            primary: Header::primary_default(),
            primary_end: None,
            chunks: Vec::new(),
        })
    }

    /// Creates an in-memory container that never touches a filesystem.
    ///
    /// Chunks written and finalized here become readable (by name) from the
    /// same container; the path is empty.
    pub fn open_in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            backend: Backend::in_memory(),
            primary: Header::primary_default(),
            primary_end: None,
            chunks: Vec::new(),
        }
    }

    /// The container's file path (empty for in-memory containers).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `true` for containers created with [`Container::open_in_memory`].
    pub fn is_in_memory(&self) -> bool {
        self.backend.is_memory()
    }

    // ---- chunk registry ----

    /// Registers a chunk; the returned handle stays valid for the
    /// container's lifetime.
    pub fn register(&mut self, spec: ChunkSpec) -> ChunkHandle {
        self.chunks.push(Chunk::from_spec(spec));
        ChunkHandle(self.chunks.len() - 1)
    }

    /// Number of registered chunks.
    pub fn n_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Borrows a registered chunk.
    pub fn chunk(&self, handle: ChunkHandle) -> &Chunk {
        &self.chunks[handle.0]
    }

    /// Iterates over the registered chunks in registration order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    /// Returns the chunk's table header, building and caching it from the
    /// current name and shape on first call.
    pub fn chunk_header(&mut self, handle: ChunkHandle) -> &Header {
        self.chunks[handle.0].table_header()
    }

    /// Byte offset where the chunk's data starts in the file, once its
    /// header has been written (file mode only).
    pub fn data_start(&self, handle: ChunkHandle) -> Option<u64> {
        self.chunks[handle.0].header_span.map(|(_, end)| end)
    }

    // ---- primary header ----

    pub fn primary_header(&self) -> &Header {
        &self.primary
    }

    pub fn primary_header_mut(&mut self) -> &mut Header {
        &mut self.primary
    }

    /// Writes the primary header (section 0). Must precede any chunk header
    /// in file mode; a no-op for in-memory containers.
    pub fn write_primary_header(&mut self) -> Result<()> {
        self.primary_end = self.backend.write_primary(&self.primary, &self.path)?;
        Ok(())
    }

    /// Rewrites the primary header over its original span, e.g. after
    /// adding summary cards once all chunks are written. The re-encoded
    /// header must still fit the span.
    pub fn fix_primary_header(&mut self) -> Result<()> {
        self.backend
            .patch_primary(&self.primary, self.primary_end, &self.path)
    }

    // ---- write pipeline ----

    /// Writes the chunk's stub header with its current (usually zero) row
    /// count. File mode records the header's byte span for the later patch.
    ///
    /// # Panics
    ///
    /// Panics if the chunk's `item_size` was never configured.
    pub fn write_chunk_header(&mut self, handle: ChunkHandle) -> Result<()> {
        let chunk = &mut self.chunks[handle.0];
        assert!(
            chunk.item_size > 0,
            "chunk {:?}: row width must be configured before writing",
            chunk.name
        );
        self.backend.write_stub_header(chunk, &self.path)
    }

    /// Appends rows stored back-to-back in `rows`; the chunk's row count
    /// grows immediately. On a backend failure the count reflects only what
    /// was recorded before the error — there is no rollback.
    ///
    /// # Panics
    ///
    /// Panics if `rows.len()` is not a multiple of the chunk's `item_size`,
    /// or if `item_size` was never configured.
    pub fn append_rows(&mut self, handle: ChunkHandle, rows: &[u8]) -> Result<()> {
        let chunk = &mut self.chunks[handle.0];
        assert!(
            chunk.item_size > 0,
            "chunk {:?}: row width must be configured before writing",
            chunk.name
        );
        assert_eq!(
            rows.len() % chunk.item_size,
            0,
            "chunk {:?}: byte length {} is not a multiple of row width {}",
            chunk.name,
            rows.len(),
            chunk.item_size
        );
        self.backend.append_rows(chunk.item_size, rows, &self.path)?;
        chunk.nrows += rows.len() / chunk.item_size;
        Ok(())
    }

    /// Like [`Container::append_rows`], but reverses the byte order of every
    /// `word_size`-wide word in a private copy before writing. The caller's
    /// buffer is never modified. Word boundaries cannot straddle rows
    /// because the row width must be a multiple of the word size.
    ///
    /// # Panics
    ///
    /// Panics if `word_size` is zero or does not evenly divide the chunk's
    /// `item_size`, in addition to the [`Container::append_rows`] panics.
    pub fn append_rows_flipped(
        &mut self,
        handle: ChunkHandle,
        rows: &[u8],
        word_size: usize,
    ) -> Result<()> {
        let item_size = self.chunks[handle.0].item_size;
        assert!(word_size > 0, "word size must be non-zero");
        assert_eq!(
            item_size % word_size,
            0,
            "chunk {:?}: row width {} is not a multiple of word size {}",
            self.chunks[handle.0].name,
            item_size,
            word_size
        );
        let mut flipped = rows.to_vec();
        swap_words(&mut flipped, word_size);
        self.append_rows(handle, &flipped)
    }

    /// Finalizes the chunk: patches the cached header's row count and — in
    /// file mode — pads the data to block granularity and rewrites the stub
    /// header in place, or — in memory mode — publishes the header and
    /// accumulated rows as an extension. Only after this step is the
    /// chunk's data visible to readers.
    pub fn finalize_chunk(&mut self, handle: ChunkHandle) -> Result<()> {
        let chunk = &mut self.chunks[handle.0];
        assert!(
            chunk.item_size > 0,
            "chunk {:?}: row width must be configured before writing",
            chunk.name
        );
        self.backend.finalize(chunk, &self.path)
    }

    /// Writes a whole chunk in one call: stub header, rows, finalize.
    pub fn write_chunk(&mut self, handle: ChunkHandle, rows: &[u8]) -> Result<()> {
        self.write_chunk_header(handle)?;
        self.append_rows(handle, rows)?;
        self.finalize_chunk(handle)
    }

    /// Writes a whole chunk with byte-order normalization (see
    /// [`Container::append_rows_flipped`]).
    pub fn write_chunk_flipped(
        &mut self,
        handle: ChunkHandle,
        rows: &[u8],
        word_size: usize,
    ) -> Result<()> {
        self.write_chunk_header(handle)?;
        self.append_rows_flipped(handle, rows, word_size)?;
        self.finalize_chunk(handle)
    }

    // ---- read pipeline ----

    /// Reads one chunk: locate, load header, adopt/validate shape,
    /// materialize data.
    ///
    /// A missing table is an error only if the chunk is required; otherwise
    /// the chunk is simply left without data and `Ok(())` is returned.
    /// Shape and size disagreements are always errors, and nothing is
    /// materialized for the chunk in that case.
    pub fn read_chunk(&mut self, handle: ChunkHandle) -> Result<()> {
        self.read_chunk_at(handle.0)
    }

    /// Reads every registered chunk in registration order.
    ///
    /// A failing chunk aborts the whole call only if it is required; failed
    /// optional chunks are skipped with a warning. Chunks already
    /// materialized before a failure keep their data.
    pub fn read_all(&mut self) -> Result<()> {
        for i in 0..self.chunks.len() {
            if let Err(err) = self.read_chunk_at(i) {
                if self.chunks[i].required {
                    return Err(err);
                }
                warn!("skipping optional chunk {:?}: {err}", self.chunks[i].name);
            }
        }
        Ok(())
    }

    fn read_chunk_at(&mut self, index: usize) -> Result<()> {
        let chunk = &mut self.chunks[index];
        let path = &self.path;

        let Some(location) = self.backend.locate(&chunk.name, path)? else {
            if chunk.required {
                return Err(Error::TableNotFound {
                    table: chunk.name.clone(),
                    path: path.clone(),
                });
            }
            debug!("optional table {:?} not present", chunk.name);
            return Ok(());
        };

        let header = self.backend.load_header(&location, path)?;
        let (stored_rows, stored_width) = self.backend.shape(&location, &header, path)?;

        // adopt whatever was not pre-specified, then give the hook a chance
        // to adjust the expectation before it is enforced
        if chunk.item_size == 0 {
            chunk.item_size = stored_width;
        }
        if chunk.nrows == 0 {
            chunk.nrows = stored_rows;
        }
        if let Some(hook) = chunk.read_hook.as_mut() {
            let mut shape = ChunkShape {
                item_size: chunk.item_size,
                row_count: chunk.nrows,
            };
            hook(&header, &mut shape).map_err(|e| Error::format(path, e))?;
            chunk.item_size = shape.item_size;
            chunk.nrows = shape.row_count;
        }
        chunk.header = Some(header);

        if chunk.nrows != stored_rows {
            return Err(Error::ShapeMismatch {
                table: chunk.name.clone(),
                path: path.clone(),
                what: "rows",
                expected: chunk.nrows,
                found: stored_rows,
            });
        }
        if chunk.item_size != stored_width {
            return Err(Error::ShapeMismatch {
                table: chunk.name.clone(),
                path: path.clone(),
                what: "bytes per row",
                expected: chunk.item_size,
                found: stored_width,
            });
        }

        self.backend.materialize(chunk, &location, path)
    }

    // ---- teardown ----

    /// Releases every resource: chunk mappings and headers, the extension
    /// registry, and the backend handle. All releases are attempted; the
    /// first observable error (flushing a written file) is returned.
    pub fn close(self) -> Result<()> {
        let Container {
            path,
            backend,
            chunks,
            ..
        } = self;
        // mappings must go before the file handle they point into
        drop(chunks);
        backend.close(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use byteorder::{BigEndian, ByteOrder, LittleEndian};
    use tempfile::tempdir;

    fn rows_u64_le(values: &[u64]) -> Vec<u8> {
        let mut bytes = vec![0u8; values.len() * 8];
        LittleEndian::write_u64_into(values, &mut bytes);
        bytes
    }

    // -------------------- File-mode round trip --------------------

    #[test]
    fn file_roundtrip_single_chunk() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("stars.tab");
        let rows = rows_u64_le(&[10, 20, 30]);

        let mut out = Container::open_for_writing(&path)?;
        out.write_primary_header()?;
        let w = out.register(ChunkSpec::new("xy").item_size(8));
        out.write_chunk_header(w)?;
        out.append_rows(w, &rows)?;
        assert_eq!(out.chunk(w).n_rows(), 3);
        out.finalize_chunk(w)?;
        out.close()?;

        let mut inp = Container::open_for_reading(&path)?;
        let r = inp.register(ChunkSpec::new("xy").required(true));
        inp.read_chunk(r)?;
        let chunk = inp.chunk(r);
        assert_eq!(chunk.n_rows(), 3);
        assert_eq!(chunk.item_size(), 8);
        assert_eq!(chunk.data(), &rows[..]);
        assert_eq!(chunk.row(1), &rows[8..16]);
        inp.close()?;
        Ok(())
    }

    #[test]
    fn file_roundtrip_multiple_chunks() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("multi.tab");
        let a = vec![1u8; 12];
        let b: Vec<u8> = (0..100).collect();

        let mut out = Container::open_for_writing(&path)?;
        out.write_primary_header()?;
        let ha = out.register(ChunkSpec::new("alpha").item_size(4));
        let hb = out.register(ChunkSpec::new("beta").item_size(10));
        out.write_chunk(ha, &a)?;
        out.write_chunk(hb, &b)?;
        out.close()?;

        let mut inp = Container::open_for_reading(&path)?;
        // registration order independent of storage order
        let rb = inp.register(ChunkSpec::new("beta").required(true));
        let ra = inp.register(ChunkSpec::new("alpha").required(true));
        inp.read_all()?;
        assert_eq!(inp.chunk(ra).data(), &a[..]);
        assert_eq!(inp.chunk(rb).data(), &b[..]);
        assert_eq!(inp.chunk(ra).n_rows(), 3);
        assert_eq!(inp.chunk(rb).n_rows(), 10);
        Ok(())
    }

    #[test]
    fn zero_row_chunk_roundtrip() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("empty.tab");

        let mut out = Container::open_for_writing(&path)?;
        out.write_primary_header()?;
        let h = out.register(ChunkSpec::new("empty").item_size(16));
        out.write_chunk_header(h)?;
        out.finalize_chunk(h)?;
        out.close()?;

        let mut inp = Container::open_for_reading(&path)?;
        let r = inp.register(ChunkSpec::new("empty").required(true));
        inp.read_chunk(r)?;
        assert_eq!(inp.chunk(r).n_rows(), 0);
        assert_eq!(inp.chunk(r).item_size(), 16);
        assert!(inp.chunk(r).data().is_empty());
        Ok(())
    }

    #[test]
    fn lookup_is_case_insensitive() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("case.tab");

        let mut out = Container::open_for_writing(&path)?;
        out.write_primary_header()?;
        let h = out.register(ChunkSpec::new("Quads").item_size(2));
        out.write_chunk(h, &[1, 2, 3, 4])?;
        out.close()?;

        let mut inp = Container::open_for_reading(&path)?;
        let r = inp.register(ChunkSpec::new("qUADS").required(true));
        inp.read_chunk(r)?;
        assert_eq!(inp.chunk(r).n_rows(), 2);
        Ok(())
    }

    // -------------------- Open failures --------------------

    #[test]
    fn open_for_reading_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.bin");
        std::fs::write(&path, vec![0x55u8; 8192]).unwrap();
        let err = Container::open_for_reading(&path).unwrap_err();
        assert!(matches!(err, Error::NotAContainer { .. }));
    }

    #[test]
    fn open_for_reading_missing_file_is_io() {
        let err = Container::open_for_reading("/no/such/container.tab").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn write_through_read_container_fails() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("ro.tab");
        let mut out = Container::open_for_writing(&path)?;
        out.write_primary_header()?;
        let h = out.register(ChunkSpec::new("t").item_size(2));
        out.write_chunk(h, &[1, 2])?;
        out.close()?;

        let mut inp = Container::open_for_reading(&path)?;
        let h = inp.register(ChunkSpec::new("t2").item_size(2));
        let err = inp.write_chunk_header(h).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        Ok(())
    }

    // -------------------- Byte-order normalization --------------------

    #[test]
    fn flipped_roundtrip_restores_values() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("flip.tab");
        let values = [0x0102_0304u32, 0xAABB_CCDD, 7];
        let mut native = vec![0u8; 12];
        LittleEndian::write_u32_into(&values, &mut native);
        let source = native.clone();

        let mut out = Container::open_for_writing(&path)?;
        out.write_primary_header()?;
        let h = out.register(ChunkSpec::new("ints").item_size(4));
        out.write_chunk_flipped(h, &native, 4)?;
        out.close()?;

        // the caller's buffer is never mutated by the flipped path
        assert_eq!(native, source);

        let mut inp = Container::open_for_reading(&path)?;
        let r = inp.register(ChunkSpec::new("ints").required(true));
        inp.read_chunk(r)?;
        // on disk the words are byte-reversed...
        let mut stored = [0u32; 3];
        BigEndian::read_u32_into(inp.chunk(r).data(), &mut stored);
        assert_eq!(stored, values);
        // ...and swapping once more restores the original bytes
        let mut back = inp.chunk(r).data().to_vec();
        crate::swap::swap_words(&mut back, 4);
        assert_eq!(back, source);
        Ok(())
    }

    // -------------------- Shape validation --------------------

    #[test]
    fn wrong_row_count_is_shape_mismatch() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("shape.tab");
        let mut out = Container::open_for_writing(&path)?;
        out.write_primary_header()?;
        let h = out.register(ChunkSpec::new("t").item_size(8));
        out.write_chunk(h, &[0u8; 24])?;
        out.close()?;

        let mut inp = Container::open_for_reading(&path)?;
        let r = inp.register(ChunkSpec::new("t").item_size(8).row_count(4).required(true));
        let err = inp.read_chunk(r).unwrap_err();
        assert!(
            matches!(&err, Error::ShapeMismatch { what, expected: 4, found: 3, .. } if *what == "rows")
        );
        // nothing was materialized for the failing chunk
        assert!(!inp.chunk(r).has_data());
        Ok(())
    }

    #[test]
    fn wrong_row_width_is_shape_mismatch() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("width.tab");
        let mut out = Container::open_for_writing(&path)?;
        out.write_primary_header()?;
        let h = out.register(ChunkSpec::new("t").item_size(8));
        out.write_chunk(h, &[0u8; 16])?;
        out.close()?;

        let mut inp = Container::open_for_reading(&path)?;
        let r = inp.register(ChunkSpec::new("t").item_size(6).required(true));
        let err = inp.read_chunk(r).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { what: "bytes per row", .. }));
        Ok(())
    }

    // -------------------- Required vs. optional --------------------

    #[test]
    fn missing_required_chunk_fails_read() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("req.tab");
        let mut out = Container::open_for_writing(&path)?;
        out.write_primary_header()?;
        let h = out.register(ChunkSpec::new("present").item_size(2));
        out.write_chunk(h, &[1, 2])?;
        out.close()?;

        let mut inp = Container::open_for_reading(&path)?;
        inp.register(ChunkSpec::new("absent").required(true));
        let err = inp.read_all().unwrap_err();
        assert!(matches!(err, Error::TableNotFound { table, .. } if table == "absent"));
        Ok(())
    }

    #[test]
    fn missing_optional_chunk_is_skipped() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("opt.tab");
        let mut out = Container::open_for_writing(&path)?;
        out.write_primary_header()?;
        let h = out.register(ChunkSpec::new("present").item_size(2));
        out.write_chunk(h, &[1, 2])?;
        out.close()?;

        let mut inp = Container::open_for_reading(&path)?;
        let missing = inp.register(ChunkSpec::new("absent"));
        let present = inp.register(ChunkSpec::new("present").required(true));
        inp.read_all()?;
        assert!(!inp.chunk(missing).has_data());
        assert_eq!(inp.chunk(missing).n_rows(), 0);
        assert_eq!(inp.chunk(present).data(), &[1, 2]);
        Ok(())
    }

    #[test]
    fn earlier_chunks_keep_data_when_later_required_fails() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("partial.tab");
        let mut out = Container::open_for_writing(&path)?;
        out.write_primary_header()?;
        let h = out.register(ChunkSpec::new("good").item_size(2));
        out.write_chunk(h, &[9, 9])?;
        out.close()?;

        let mut inp = Container::open_for_reading(&path)?;
        let good = inp.register(ChunkSpec::new("good").required(true));
        inp.register(ChunkSpec::new("bad").required(true));
        assert!(inp.read_all().is_err());
        assert_eq!(inp.chunk(good).data(), &[9, 9]);
        Ok(())
    }

    // -------------------- Read hooks --------------------

    #[test]
    fn read_hook_can_infer_row_width() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("hook.tab");
        let mut out = Container::open_for_writing(&path)?;
        out.write_primary_header()?;
        let h = out.register(ChunkSpec::new("t").item_size(6));
        out.write_chunk(h, &[0u8; 18])?;
        out.close()?;

        let mut inp = Container::open_for_reading(&path)?;
        let r = inp.register(ChunkSpec::new("t").required(true).read_hook(|header, shape| {
            // derive the width from the stored header rather than trusting
            // the adopted value blindly
            if let Some(width) = header.integer("NAXIS1") {
                shape.item_size = width as usize;
            }
            Ok(())
        }));
        inp.read_chunk(r)?;
        assert_eq!(inp.chunk(r).item_size(), 6);
        assert_eq!(inp.chunk(r).n_rows(), 3);
        Ok(())
    }

    #[test]
    fn failing_read_hook_aborts_chunk() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("hookfail.tab");
        let mut out = Container::open_for_writing(&path)?;
        out.write_primary_header()?;
        let h = out.register(ChunkSpec::new("t").item_size(2));
        out.write_chunk(h, &[1, 2])?;
        out.close()?;

        let mut inp = Container::open_for_reading(&path)?;
        let r = inp.register(ChunkSpec::new("t").required(true).read_hook(|header, _| {
            Err(cardfile::FormatError::MissingKeyword(
                header.text("NOPE").unwrap_or("SCALE").to_owned(),
            ))
        }));
        let err = inp.read_chunk(r).unwrap_err();
        assert!(matches!(err, Error::MalformedHeader { .. }));
        assert!(!inp.chunk(r).has_data());
        Ok(())
    }

    // -------------------- Cached header materialization --------------------

    #[test]
    fn chunk_header_is_cached_until_finalize() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("cache.tab");
        let mut out = Container::open_for_writing(&path)?;
        out.write_primary_header()?;
        let h = out.register(ChunkSpec::new("t").item_size(4));
        out.write_chunk_header(h)?;
        let stub = out.chunk_header(h).clone();
        out.append_rows(h, &[0u8; 8])?;
        // appending rows must not rebuild the cached header
        assert_eq!(out.chunk_header(h), &stub);
        assert_eq!(out.chunk_header(h).integer("NAXIS2"), Some(0));
        out.finalize_chunk(h)?;
        assert_eq!(out.chunk_header(h).integer("NAXIS2"), Some(2));
        out.close()?;
        Ok(())
    }

    #[test]
    fn primary_header_patch_roundtrip() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("primary.tab");

        let mut out = Container::open_for_writing(&path)?;
        out.primary_header_mut().set_integer("NSTARS", 0);
        out.write_primary_header()?;
        let h = out.register(ChunkSpec::new("stars").item_size(4));
        out.write_chunk(h, &[0u8; 12])?;
        // true star count only known after the chunk is written
        out.primary_header_mut().set_integer("NSTARS", 3);
        out.fix_primary_header()?;
        out.close()?;

        let inp = Container::open_for_reading(&path)?;
        assert_eq!(inp.primary_header().integer("NSTARS"), Some(3));
        assert_eq!(inp.primary_header().logical("SIMPLE"), Some(true));
        inp.close()?;
        Ok(())
    }

    #[test]
    fn fix_primary_before_write_is_an_error() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nofix.tab");
        let mut out = Container::open_for_writing(&path)?;
        assert!(matches!(out.fix_primary_header(), Err(Error::Io { .. })));
        Ok(())
    }

    // -------------------- In-memory mode --------------------

    #[test]
    fn memory_roundtrip() -> Result<()> {
        let mut c = Container::open_in_memory();
        assert!(c.is_in_memory());
        assert!(c.path().as_os_str().is_empty());
        c.write_primary_header()?; // no-op, must succeed

        let w = c.register(ChunkSpec::new("a").item_size(3));
        c.write_chunk_header(w)?;
        c.append_rows(w, &[1, 2, 3, 4, 5, 6])?;
        c.finalize_chunk(w)?;

        let r = c.register(ChunkSpec::new("a").required(true));
        c.read_chunk(r)?;
        assert_eq!(c.chunk(r).n_rows(), 2);
        assert_eq!(c.chunk(r).item_size(), 3);
        assert_eq!(c.chunk(r).data(), &[1, 2, 3, 4, 5, 6]);
        c.close()?;
        Ok(())
    }

    #[test]
    fn memory_missing_optional_then_required() -> Result<()> {
        let mut c = Container::open_in_memory();
        let w = c.register(ChunkSpec::new("a").item_size(2));
        c.write_chunk(w, &[1, 2, 3, 4])?;

        // "b" was never written: optional read succeeds with empty data
        let opt = c.register(ChunkSpec::new("b"));
        c.read_chunk(opt)?;
        assert!(!c.chunk(opt).has_data());
        assert_eq!(c.chunk(opt).n_rows(), 0);

        // ...but a required read fails with TableNotFound
        let req = c.register(ChunkSpec::new("b").required(true));
        let err = c.read_chunk(req).unwrap_err();
        assert!(matches!(err, Error::TableNotFound { table, .. } if table == "b"));
        Ok(())
    }

    #[test]
    fn memory_rows_invisible_until_finalize() -> Result<()> {
        let mut c = Container::open_in_memory();
        let w = c.register(ChunkSpec::new("a").item_size(2));
        c.write_chunk_header(w)?;
        c.append_rows(w, &[1, 2])?;

        let r = c.register(ChunkSpec::new("a").required(true));
        assert!(matches!(
            c.read_chunk(r),
            Err(Error::TableNotFound { .. })
        ));

        c.finalize_chunk(w)?;
        let r2 = c.register(ChunkSpec::new("a").required(true));
        c.read_chunk(r2)?;
        assert_eq!(c.chunk(r2).data(), &[1, 2]);
        Ok(())
    }

    #[test]
    fn memory_chunk_is_readable_repeatedly() -> Result<()> {
        let mut c = Container::open_in_memory();
        let w = c.register(ChunkSpec::new("a").item_size(1));
        c.write_chunk(w, &[7, 8, 9])?;

        for _ in 0..2 {
            let r = c.register(ChunkSpec::new("a").required(true));
            c.read_chunk(r)?;
            assert_eq!(c.chunk(r).data(), &[7, 8, 9]);
        }
        Ok(())
    }

    #[test]
    fn memory_two_chunks_roundtrip() -> Result<()> {
        let mut c = Container::open_in_memory();
        let wa = c.register(ChunkSpec::new("a").item_size(2));
        c.write_chunk(wa, &[1, 2])?;
        let wb = c.register(ChunkSpec::new("b").item_size(4));
        c.write_chunk(wb, &[3, 4, 5, 6])?;

        let ra = c.register(ChunkSpec::new("A").required(true));
        let rb = c.register(ChunkSpec::new("B").required(true));
        c.read_all()?;
        assert_eq!(c.chunk(ra).data(), &[1, 2]);
        assert_eq!(c.chunk(rb).data(), &[3, 4, 5, 6]);
        Ok(())
    }

    #[test]
    fn memory_flipped_roundtrip() -> Result<()> {
        let mut c = Container::open_in_memory();
        let source = vec![1u8, 2, 3, 4];
        let w = c.register(ChunkSpec::new("f").item_size(4));
        c.write_chunk_flipped(w, &source, 2)?;
        assert_eq!(source, [1, 2, 3, 4]);

        let r = c.register(ChunkSpec::new("f").required(true));
        c.read_chunk(r)?;
        assert_eq!(c.chunk(r).data(), &[2, 1, 4, 3]);
        Ok(())
    }

    #[test]
    fn memory_shape_mismatch_detected() -> Result<()> {
        let mut c = Container::open_in_memory();
        let w = c.register(ChunkSpec::new("a").item_size(2));
        c.write_chunk(w, &[1, 2, 3, 4])?;

        let r = c.register(ChunkSpec::new("a").row_count(3).required(true));
        let err = c.read_chunk(r).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
        Ok(())
    }

    // -------------------- Full write/read walkthrough --------------------

    #[test]
    fn scenario_xy_full_cycle() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("xy.tab");
        let rows: Vec<u8> = (0..24).collect();

        let mut out = Container::open_for_writing(&path)?;
        out.write_primary_header()?;
        let w = out.register(ChunkSpec::new("xy").item_size(8));
        out.write_chunk_header(w)?;
        out.append_rows(w, &rows)?;
        assert_eq!(out.chunk(w).n_rows(), 3);
        out.finalize_chunk(w)?;
        assert_eq!(out.chunk_header(w).integer("NAXIS2"), Some(3));
        out.close()?;

        // no pre-specified shape on the way back in
        let mut inp = Container::open_for_reading(&path)?;
        let r = inp.register(ChunkSpec::new("xy").required(true));
        inp.read_all()?;
        let chunk = inp.chunk(r);
        assert_eq!(chunk.n_rows(), 3);
        assert_eq!(chunk.item_size(), 8);
        assert_eq!(chunk.data(), &rows[..]);
        for (i, row) in rows.chunks(8).enumerate() {
            assert_eq!(chunk.row(i), row);
        }
        Ok(())
    }
}
