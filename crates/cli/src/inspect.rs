//! Container inspection: validate a file and summarize its table sections.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;

use anyhow::{Context, Result};
use cardfile::{blocks_to_bytes, bytes_to_blocks, table_shape, Header};
use tabstore::Container;

/// Summary of one table section in a container file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub section: usize,
    pub name: String,
    pub rows: usize,
    pub width: usize,
    pub blocks: u64,
}

/// Validates the container at `path` and returns a summary of every table
/// section, in file order.
pub fn list_tables(path: &Path) -> Result<Vec<TableInfo>> {
    // opening through the storage layer performs the magic check and
    // primary-header parse
    let container =
        Container::open_for_reading(path).with_context(|| format!("cannot open {path:?}"))?;
    container.close()?;

    let mut f = File::open(path)?;
    let mut infos = Vec::new();
    let mut pos = 0u64;
    let mut section = 0usize;
    while let Some((header, header_bytes)) = Header::read_from_opt(&mut f)? {
        let data_bytes = blocks_to_bytes(bytes_to_blocks(header.data_len()?));
        if section > 0 {
            let (rows, width) = table_shape(&header)
                .with_context(|| format!("section {section} has no table shape"))?;
            infos.push(TableInfo {
                section,
                name: header.text("TTYPE1").unwrap_or_default().to_owned(),
                rows,
                width,
                blocks: bytes_to_blocks(data_bytes),
            });
        }
        pos += header_bytes as u64 + data_bytes;
        f.seek(SeekFrom::Start(pos))?;
        section += 1;
    }
    Ok(infos)
}

/// Prints a human-readable table listing for `path`.
pub fn print_summary(path: &Path) -> Result<()> {
    let tables = list_tables(path)?;
    println!("{}: {} table(s)", path.display(), tables.len());
    for t in &tables {
        println!(
            "  {:>3}  {:<16} {:>10} rows x {:>6} bytes  ({} block(s))",
            t.section, t.name, t.rows, t.width, t.blocks
        );
    }
    Ok(())
}
