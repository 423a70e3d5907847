//! Page-aligned read-only file mappings.
//!
//! `mmap` requires the file offset to be a multiple of the platform page
//! size, but table data starts on a block boundary, not a page boundary.
//! [`mapping_window`] widens a logical byte range to the enclosing
//! page-aligned window as a pure function, and [`MappedRegion`] owns the
//! resulting map plus the sub-range view into it.

use std::fs::File;
use std::io;

use memmap2::{Mmap, MmapOptions};

/// A page-aligned window covering a logical byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapWindow {
    /// Start of the mapping; a multiple of the page size, `<=` the logical
    /// start.
    pub map_start: u64,
    /// Length of the mapping; covers the logical range end.
    pub map_len: usize,
    /// Offset of the logical start within the mapping.
    pub offset: usize,
}

/// Computes the page-aligned window for the logical range
/// `[start, start + len)`.
///
/// # Panics
///
/// Panics if `page_size` is zero.
pub fn mapping_window(start: u64, len: usize, page_size: u64) -> MapWindow {
    assert!(page_size > 0, "page size must be non-zero");
    let map_start = start - start % page_size;
    let offset = (start - map_start) as usize;
    MapWindow {
        map_start,
        map_len: offset + len,
        offset,
    }
}

/// The platform page size in bytes.
pub fn page_size() -> u64 {
    // sysconf(_SC_PAGESIZE) cannot fail on any supported platform
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as u64 }
}

/// A read-only, shared mapping of a byte range within a file.
///
/// The mapping itself is page-aligned and may start before and end after the
/// logical range; [`MappedRegion::bytes`] exposes exactly the logical range.
/// The map is released when the region is dropped.
pub struct MappedRegion {
    map: Mmap,
    offset: usize,
    len: usize,
}

impl MappedRegion {
    /// Maps the logical range `[start, start + len)` of `file` read-only.
    ///
    /// `len` must be non-zero (mapping an empty range is a caller bug and is
    /// rejected by the kernel).
    pub fn map_range(file: &File, start: u64, len: usize) -> io::Result<Self> {
        let window = mapping_window(start, len, page_size());
        // SAFETY: the map is read-only and private to this region; the file
        // is not truncated while the container (which owns both) is alive.
        let map = unsafe {
            MmapOptions::new()
                .offset(window.map_start)
                .len(window.map_len)
                .map(file)?
        };
        Ok(Self {
            map,
            offset: window.offset,
            len,
        })
    }

    /// The logical byte range this region was created for.
    pub fn bytes(&self) -> &[u8] {
        &self.map[self.offset..self.offset + self.len]
    }

    /// Length of the logical range in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` if the logical range is empty (never constructed in practice).
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total size of the underlying mapping, including alignment slack.
    pub fn mapped_len(&self) -> usize {
        self.map.len()
    }
}
