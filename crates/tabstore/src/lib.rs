//! # tabstore — chunked binary-table storage
//!
//! Named, fixed-row-width binary tables ("chunks") stored in a columnar
//! container file — or entirely in memory for callers that never touch a
//! filesystem. Writing is streaming with a two-phase header (stub written
//! first, row count patched in place once it is known); reading is zero-copy
//! through page-aligned read-only memory maps.
//!
//! ## Container layout (file mode)
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ PRIMARY HEADER (section 0, no data)           │
//! ├───────────────────────────────────────────────┤
//! │ CHUNK "xy"                                    │
//! │   table header: name, row width, row count    │
//! │   data: rows back-to-back, zero-padded to a   │
//! │         2880-byte block boundary              │
//! ├───────────────────────────────────────────────┤
//! │ CHUNK "quads"                                 │
//! │   ... repeated for each chunk ...             │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! In-memory containers keep the same observable behavior without a file:
//! finalized chunks become immutable "extensions" that later reads look up
//! by name, exactly like tables in a file.
//!
//! ## Example
//! ```no_run
//! use tabstore::{ChunkSpec, Container};
//!
//! # fn main() -> tabstore::Result<()> {
//! let mut out = Container::open_for_writing("stars.tab")?;
//! out.write_primary_header()?;
//! let xy = out.register(ChunkSpec::new("xy").item_size(8));
//! out.write_chunk(xy, &[0u8; 24])?; // three 8-byte rows
//! out.close()?;
//!
//! let mut inp = Container::open_for_reading("stars.tab")?;
//! let xy = inp.register(ChunkSpec::new("xy").required(true));
//! inp.read_all()?;
//! assert_eq!(inp.chunk(xy).n_rows(), 3);
//! # Ok(())
//! # }
//! ```

mod backend;
mod chunk;
mod container;
mod error;
pub mod mapping;
pub mod swap;

pub use cardfile::Header;
pub use chunk::{Chunk, ChunkHandle, ChunkShape, ChunkSpec, ReadHook};
pub use container::Container;
pub use error::{Error, Result};
pub use mapping::MappedRegion;
