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

//! Little-endian cursor primitives shared by every chunk codec.
//!
//! The whole input is a byte slice and the whole output is a byte vector;
//! nothing in here performs real I/O. [`Reader`] tracks its own position so
//! every failure can report the offset it happened at, and [`Writer`]
//! supports the back-patching that chunk headers need (total size,
//! styles-start, package pool offsets).

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use thiserror::Error;

pub type StreamResult<T> = Result<T, StreamError>;

/// Errors raised while decoding, encoding or mutating a resource container.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The byte slice ended in the middle of a field.
    #[error("input ended at offset {offset:#x}")]
    UnexpectedEnd { offset: u64 },

    /// Structurally invalid input.
    #[error("malformed data at offset {offset:#x}: {reason}")]
    Malformed { offset: u64, reason: String },

    /// A known container held a chunk kind it must not contain.
    #[error("chunk type {code:#06x} at offset {offset:#x} is not valid inside a {container} chunk")]
    UnexpectedChild {
        code: u16,
        offset: u64,
        container: &'static str,
    },

    /// A mutation or emit would break a format invariant.
    #[error("invariant violated: {reason}")]
    Invariant { reason: String },

    /// A resource value carried a type byte outside the enumerated set.
    #[error("unsupported resource value type {code:#04x} at offset {offset:#x}")]
    UnsupportedValueType { code: u8, offset: u64 },

    /// Context wrapper naming the chunk whose decode failed.
    #[error("in chunk {code:#06x} at offset {offset:#x}: {source}")]
    InChunk {
        code: u16,
        offset: u64,
        #[source]
        source: Box<StreamError>,
    },
}

impl StreamError {
    pub fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        StreamError::Malformed {
            offset,
            reason: reason.into(),
        }
    }

    pub fn invariant(reason: impl Into<String>) -> Self {
        StreamError::Invariant {
            reason: reason.into(),
        }
    }

    /// Wraps `self` with the type code and offset of the enclosing chunk.
    pub fn in_chunk(self, code: u16, offset: u64) -> Self {
        StreamError::InChunk {
            code,
            offset,
            source: Box::new(self),
        }
    }
}

/// A little-endian reader over a borrowed byte slice.
pub struct Reader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    pub fn pos(&self) -> u64 {
        self.cursor.position()
    }

    pub fn len(&self) -> u64 {
        self.cursor.get_ref().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.cursor.get_ref().is_empty()
    }

    pub fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.pos())
    }

    /// Repositions the reader. Seeking past the end of the input is an error;
    /// seeking exactly to the end is allowed.
    pub fn seek(&mut self, pos: u64) -> StreamResult<()> {
        if pos > self.len() {
            return Err(StreamError::malformed(
                self.pos(),
                format!(
                    "seek to {pos:#x} is past the end of the input ({:#x})",
                    self.len()
                ),
            ));
        }
        self.cursor.set_position(pos);
        Ok(())
    }

    fn eof(&self) -> StreamError {
        StreamError::UnexpectedEnd { offset: self.pos() }
    }

    pub fn u8(&mut self) -> StreamResult<u8> {
        self.cursor.read_u8().map_err(|_| self.eof())
    }

    pub fn u16(&mut self) -> StreamResult<u16> {
        self.cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| self.eof())
    }

    pub fn u32(&mut self) -> StreamResult<u32> {
        self.cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| self.eof())
    }

    /// Reads `count` raw bytes.
    pub fn bytes(&mut self, count: usize) -> StreamResult<&'a [u8]> {
        let start = self.pos() as usize;
        let data = *self.cursor.get_ref();
        let end = start.checked_add(count).ok_or_else(|| self.eof())?;
        if end > data.len() {
            return Err(self.eof());
        }
        self.cursor.set_position(end as u64);
        Ok(&data[start..end])
    }

    pub fn skip(&mut self, count: u64) -> StreamResult<()> {
        let target = self.pos().checked_add(count).ok_or_else(|| self.eof())?;
        self.seek(target)
    }
}

/// A little-endian writer over a growable byte vector.
///
/// Chunk emitters write a provisional header through one of these, render
/// their payload into a second one, then patch the computed fields back into
/// the header before concatenation.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Writes zero bytes until the length is a multiple of 4.
    pub fn pad4(&mut self) {
        let target = crate::align(self.buf.len() as u64, 4) as usize;
        self.buf.resize(target, 0);
    }

    /// Overwrites a previously written 32-bit word at `offset`.
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        self.buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
