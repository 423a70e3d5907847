//! Sequential section scanning: locating tables by name and reading headers
//! or shapes at a given section index.
//!
//! The container has no central directory; sections are found by walking the
//! file from offset 0, reading each header and skipping its (block-rounded)
//! data. Containers hold a handful of sections, so the linear scan is cheap
//! relative to the mapping and copying that follows it.

use std::io::{Read, Seek, SeekFrom};

use log::trace;

use crate::{blocks_to_bytes, bytes_to_blocks, FormatError, Header};

/// Keyword carrying the table name in a binary-table header.
const NAME_KEYWORD: &str = "TTYPE1";

/// Where a named table's data lives inside a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLocation {
    /// Byte offset of the first data byte (just past the table header).
    pub data_start: u64,
    /// Reserved size of the data in bytes; always block-granular, so it may
    /// exceed `rows * width`.
    pub data_size: u64,
    /// Index of the section containing the table (0 is the primary header).
    pub section: usize,
}

/// One step of the section walk: the header at the current position plus the
/// spans it implies. `None` when the reader is at a clean end-of-file.
fn next_section<R: Read + Seek>(
    r: &mut R,
    pos: u64,
) -> Result<Option<(Header, u64, u64)>, FormatError> {
    let Some((header, header_bytes)) = Header::read_from_opt(r)? else {
        return Ok(None);
    };
    let data_size = blocks_to_bytes(bytes_to_blocks(header.data_len()?));
    let data_start = pos + header_bytes as u64;
    // skip the data to land on the next section's header
    r.seek(SeekFrom::Start(data_start + data_size))?;
    Ok(Some((header, data_start, data_size)))
}

/// Scans the container for a table whose name card matches `name`
/// (case-insensitive).
///
/// Returns `Ok(None)` when no section carries the name. The primary header
/// (section 0) is never matched. The reader is left at an unspecified
/// position.
pub fn find_table<R: Read + Seek>(
    r: &mut R,
    name: &str,
) -> Result<Option<TableLocation>, FormatError> {
    r.seek(SeekFrom::Start(0))?;
    let mut pos = 0u64;
    let mut section = 0usize;
    while let Some((header, data_start, data_size)) = next_section(r, pos)? {
        if section > 0 {
            let matched = header
                .text(NAME_KEYWORD)
                .is_some_and(|t| t.eq_ignore_ascii_case(name));
            trace!(
                "section {section}: name {:?}, data {data_size} bytes at {data_start}",
                header.text(NAME_KEYWORD)
            );
            if matched {
                return Ok(Some(TableLocation {
                    data_start,
                    data_size,
                    section,
                }));
            }
        }
        pos = data_start + data_size;
        section += 1;
    }
    Ok(None)
}

/// Reads the header of section `section_index` (0 = primary).
pub fn read_header_at<R: Read + Seek>(
    r: &mut R,
    section_index: usize,
) -> Result<Header, FormatError> {
    r.seek(SeekFrom::Start(0))?;
    let mut pos = 0u64;
    let mut section = 0usize;
    while let Some((header, data_start, data_size)) = next_section(r, pos)? {
        if section == section_index {
            return Ok(header);
        }
        pos = data_start + data_size;
        section += 1;
    }
    Err(FormatError::NoSuchSection(section_index))
}

/// Reads the shape `(row_count, row_width)` of the table in section
/// `section_index`.
pub fn open_table<R: Read + Seek>(
    r: &mut R,
    section_index: usize,
) -> Result<(usize, usize), FormatError> {
    table_shape(&read_header_at(r, section_index)?)
}

/// Extracts `(row_count, row_width)` from a table header.
pub fn table_shape(header: &Header) -> Result<(usize, usize), FormatError> {
    let width = header
        .integer("NAXIS1")
        .ok_or_else(|| FormatError::MissingKeyword("NAXIS1".to_owned()))?;
    let rows = header
        .integer("NAXIS2")
        .ok_or_else(|| FormatError::MissingKeyword("NAXIS2".to_owned()))?;
    if width < 0 || rows < 0 {
        return Err(FormatError::BadCard(format!(
            "negative table shape ({rows} rows of {width} bytes)"
        )));
    }
    Ok((rows as usize, width as usize))
}
