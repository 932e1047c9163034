/*
    Copyright (C) 2025 resarc developers

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU General Public License as published by
    the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU General Public License for more details.

    You should have received a copy of the GNU General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

//! Parser, editor and serializer for the Android compiled resource
//! container format: `resources.arsc`, `AndroidManifest.xml` and every
//! compiled `res/*.xml` in an application package.
//!
//! A document is loaded from a byte slice into a tree of chunks
//! ([`ResourceFile`]), inspected and mutated through typed accessors, and
//! serialized back. An untouched document serialized with the default
//! options reproduces its input byte for byte; chunk kinds outside the
//! catalogue are carried verbatim.
//!
//! ```no_run
//! use resarc::{ResourceFile, SerializeFlags};
//!
//! # fn main() -> resarc::StreamResult<()> {
//! # let data: Vec<u8> = Vec::new();
//! let file = ResourceFile::parse(&data)?;
//! for chunk in file.chunks() {
//!     if let Some(table) = chunk.as_table() {
//!         for package in table.packages() {
//!             println!("{} ({} type chunks)", package.package_name(),
//!                 package.type_chunks().count());
//!         }
//!     }
//! }
//! let out = file.to_bytes(SerializeFlags::empty())?;
//! assert_eq!(out, data);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod defs;
pub mod res_value;
pub mod stream;
pub mod string_pool;
pub mod table;
pub mod xmltree;

pub use defs::{Chunk, ChunkType, ResourceFile, SerializeFlags};
pub use stream::{StreamError, StreamResult};

/// Align an offset to a certain boundary
///
/// # Arguments
///
/// * `pos` - position to align
/// * `alignment` - number of bytes to align the position to
///
/// # Returns
///
/// The next position which is aligned to the specified boundary
pub fn align(pos: u64, alignment: u64) -> u64 {
    let remaining = pos % alignment;
    if remaining == 0 {
        return pos;
    }

    pos + (alignment - remaining)
}
