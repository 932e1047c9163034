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

//! Chunk framing: the 8-byte metadata header, the polymorphic [`Chunk`]
//! tree, and the top-level [`ResourceFile`].
//!
//! Every chunk starts with a 16-bit type code, a 16-bit header size and a
//! 32-bit total size. A single framing routine reads the metadata,
//! dispatches on the type code and hands the matching decoder the rest of
//! the chunk; after the payload is decoded the cursor is repositioned to the
//! declared chunk end regardless of what the decoder consumed, which is what
//! lets intra-chunk slack and unknown chunk variants survive a round trip.

use bitflags::bitflags;
use log::{debug, warn};

use crate::stream::{Reader, StreamError, StreamResult, Writer};
use crate::string_pool::StringPoolChunk;
use crate::table::{LibraryChunk, PackageChunk, ResourceTableChunk, TypeChunk, TypeSpecChunk};
use crate::xmltree::{
    XmlCdataChunk, XmlChunk, XmlEndElementChunk, XmlNamespaceChunk, XmlResourceMapChunk,
    XmlStartElementChunk,
};

/// The number of bytes of metadata at the front of every chunk: type code,
/// header size, chunk size.
pub const METADATA_SIZE: u16 = 8;

bitflags! {
    /// Options passed to the serializer. The empty set is the default and
    /// reproduces the input byte-for-byte for untouched documents.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SerializeFlags: u32 {
        /// Deduplicate strings and styles by content when re-emitting pools.
        const SHRINK = 1 << 0;
        /// Strip the public bit from type-spec masks and type entry flags.
        const PRIVATE_RESOURCES = 1 << 1;
    }
}

impl Default for SerializeFlags {
    fn default() -> Self {
        SerializeFlags::empty()
    }
}

/// The chunk kinds this library interprets. Any other type code is carried
/// as an opaque [`UnknownChunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkType {
    StringPool,
    Table,
    Xml,
    XmlStartNamespace,
    XmlEndNamespace,
    XmlStartElement,
    XmlEndElement,
    XmlCdata,
    XmlResourceMap,
    TablePackage,
    TableType,
    TableTypeSpec,
    TableLibrary,
}

impl ChunkType {
    pub fn code(self) -> u16 {
        match self {
            ChunkType::StringPool => 0x0001,
            ChunkType::Table => 0x0002,
            ChunkType::Xml => 0x0003,
            ChunkType::XmlStartNamespace => 0x0100,
            ChunkType::XmlEndNamespace => 0x0101,
            ChunkType::XmlStartElement => 0x0102,
            ChunkType::XmlEndElement => 0x0103,
            ChunkType::XmlCdata => 0x0104,
            ChunkType::XmlResourceMap => 0x0180,
            ChunkType::TablePackage => 0x0200,
            ChunkType::TableType => 0x0201,
            ChunkType::TableTypeSpec => 0x0202,
            ChunkType::TableLibrary => 0x0203,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0x0001 => ChunkType::StringPool,
            0x0002 => ChunkType::Table,
            0x0003 => ChunkType::Xml,
            0x0100 => ChunkType::XmlStartNamespace,
            0x0101 => ChunkType::XmlEndNamespace,
            0x0102 => ChunkType::XmlStartElement,
            0x0103 => ChunkType::XmlEndElement,
            0x0104 => ChunkType::XmlCdata,
            0x0180 => ChunkType::XmlResourceMap,
            0x0200 => ChunkType::TablePackage,
            0x0201 => ChunkType::TableType,
            0x0202 => ChunkType::TableTypeSpec,
            0x0203 => ChunkType::TableLibrary,
            _ => return None,
        })
    }
}

/// Metadata of the chunk currently being decoded, handed to each decoder.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChunkHeader {
    /// Absolute offset of the chunk within the input.
    pub offset: u64,
    pub type_code: u16,
    pub header_size: u16,
    pub size: u32,
}

impl ChunkHeader {
    /// Absolute offset one past the last byte of the chunk.
    pub fn end(&self) -> u64 {
        self.offset + self.size as u64
    }
}

/// Emit interface implemented by every concrete chunk struct.
///
/// A chunk is serialized by writing its metadata with a zero size
/// placeholder, the rest of its header, then its payload into a scratch
/// buffer; the payload writer may patch computed offsets back into the
/// header before the final size is patched in and the two parts are joined.
pub(crate) trait ChunkBody {
    fn header_size(&self) -> u16;
    fn write_header(&self, out: &mut Writer) -> StreamResult<()>;
    fn write_payload(
        &self,
        out: &mut Writer,
        header: &mut Writer,
        options: SerializeFlags,
    ) -> StreamResult<()>;
}

pub(crate) fn emit_chunk(
    type_code: u16,
    body: &dyn ChunkBody,
    options: SerializeFlags,
) -> StreamResult<Vec<u8>> {
    let mut header = Writer::new();
    header.u16(type_code);
    header.u16(body.header_size());
    header.u32(0);
    body.write_header(&mut header)?;
    if header.len() != body.header_size() as usize {
        return Err(StreamError::invariant(format!(
            "chunk {type_code:#06x} wrote a {} byte header but declares {}",
            header.len(),
            body.header_size()
        )));
    }

    let mut payload = Writer::new();
    body.write_payload(&mut payload, &mut header, options)?;

    let size = (header.len() + payload.len()) as u32;
    header.patch_u32(4, size);

    let mut bytes = header.into_bytes();
    bytes.extend_from_slice(&payload.into_bytes());
    Ok(bytes)
}

/// One chunk of a resource container.
///
/// The shared metadata prefix lives in the framing; the arm-specific fields
/// live in the variant structs.
#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
    StringPool(StringPoolChunk),
    Table(ResourceTableChunk),
    Xml(XmlChunk),
    XmlStartNamespace(XmlNamespaceChunk),
    XmlEndNamespace(XmlNamespaceChunk),
    XmlStartElement(XmlStartElementChunk),
    XmlEndElement(XmlEndElementChunk),
    XmlCdata(XmlCdataChunk),
    XmlResourceMap(XmlResourceMapChunk),
    Package(PackageChunk),
    Type(TypeChunk),
    TypeSpec(TypeSpecChunk),
    Library(LibraryChunk),
    /// A chunk whose type code is not in the catalogue; its bytes are
    /// preserved verbatim and re-emitted unchanged.
    Unknown(UnknownChunk),
}

impl Chunk {
    /// Decodes one chunk at the reader's current position. On return the
    /// reader sits at the declared end of the chunk.
    pub fn parse(r: &mut Reader) -> StreamResult<Chunk> {
        let offset = r.pos();
        let type_code = r.u16()?;
        let header_size = r.u16()?;
        let size = r.u32()?;

        if header_size < METADATA_SIZE {
            return Err(StreamError::malformed(
                offset,
                format!("chunk header size {header_size} is smaller than the {METADATA_SIZE} byte metadata"),
            ));
        }
        if size < header_size as u32 {
            return Err(StreamError::malformed(
                offset,
                format!("chunk size {size} is smaller than its header size {header_size}"),
            ));
        }
        if offset + size as u64 > r.len() {
            return Err(StreamError::malformed(
                offset,
                format!("chunk size {size} runs past the end of the input"),
            ));
        }

        let header = ChunkHeader {
            offset,
            type_code,
            header_size,
            size,
        };
        debug!("chunk {type_code:#06x} at {offset:#x}, {size} bytes");

        let result = match ChunkType::from_code(type_code) {
            Some(ChunkType::StringPool) => {
                StringPoolChunk::parse(r, &header).map(Chunk::StringPool)
            }
            Some(ChunkType::Table) => ResourceTableChunk::parse(r, &header).map(Chunk::Table),
            Some(ChunkType::Xml) => XmlChunk::parse(r, &header).map(Chunk::Xml),
            Some(ChunkType::XmlStartNamespace) => {
                XmlNamespaceChunk::parse(r, &header).map(Chunk::XmlStartNamespace)
            }
            Some(ChunkType::XmlEndNamespace) => {
                XmlNamespaceChunk::parse(r, &header).map(Chunk::XmlEndNamespace)
            }
            Some(ChunkType::XmlStartElement) => {
                XmlStartElementChunk::parse(r, &header).map(Chunk::XmlStartElement)
            }
            Some(ChunkType::XmlEndElement) => {
                XmlEndElementChunk::parse(r, &header).map(Chunk::XmlEndElement)
            }
            Some(ChunkType::XmlCdata) => XmlCdataChunk::parse(r, &header).map(Chunk::XmlCdata),
            Some(ChunkType::XmlResourceMap) => {
                XmlResourceMapChunk::parse(r, &header).map(Chunk::XmlResourceMap)
            }
            Some(ChunkType::TablePackage) => PackageChunk::parse(r, &header).map(Chunk::Package),
            Some(ChunkType::TableType) => TypeChunk::parse(r, &header).map(Chunk::Type),
            Some(ChunkType::TableTypeSpec) => TypeSpecChunk::parse(r, &header).map(Chunk::TypeSpec),
            Some(ChunkType::TableLibrary) => LibraryChunk::parse(r, &header).map(Chunk::Library),
            None => {
                warn!("unknown chunk type {type_code:#06x} at {offset:#x}, preserving verbatim");
                UnknownChunk::parse(r, &header).map(Chunk::Unknown)
            }
        };
        let chunk = result.map_err(|e| e.in_chunk(type_code, offset))?;

        // Absorb intra-chunk slack and trailing bytes the decoder did not
        // account for.
        r.seek(offset + size as u64)?;
        Ok(chunk)
    }

    /// The 16-bit on-disk type code of this chunk.
    pub fn type_code(&self) -> u16 {
        match self {
            Chunk::StringPool(_) => ChunkType::StringPool.code(),
            Chunk::Table(_) => ChunkType::Table.code(),
            Chunk::Xml(_) => ChunkType::Xml.code(),
            Chunk::XmlStartNamespace(_) => ChunkType::XmlStartNamespace.code(),
            Chunk::XmlEndNamespace(_) => ChunkType::XmlEndNamespace.code(),
            Chunk::XmlStartElement(_) => ChunkType::XmlStartElement.code(),
            Chunk::XmlEndElement(_) => ChunkType::XmlEndElement.code(),
            Chunk::XmlCdata(_) => ChunkType::XmlCdata.code(),
            Chunk::XmlResourceMap(_) => ChunkType::XmlResourceMap.code(),
            Chunk::Package(_) => ChunkType::TablePackage.code(),
            Chunk::Type(_) => ChunkType::TableType.code(),
            Chunk::TypeSpec(_) => ChunkType::TableTypeSpec.code(),
            Chunk::Library(_) => ChunkType::TableLibrary.code(),
            Chunk::Unknown(unknown) => unknown.type_code,
        }
    }

    /// Serializes this chunk, including its children.
    pub fn to_bytes(&self, options: SerializeFlags) -> StreamResult<Vec<u8>> {
        let body: &dyn ChunkBody = match self {
            Chunk::StringPool(c) => c,
            Chunk::Table(c) => c,
            Chunk::Xml(c) => c,
            Chunk::XmlStartNamespace(c) => c,
            Chunk::XmlEndNamespace(c) => c,
            Chunk::XmlStartElement(c) => c,
            Chunk::XmlEndElement(c) => c,
            Chunk::XmlCdata(c) => c,
            Chunk::XmlResourceMap(c) => c,
            Chunk::Package(c) => c,
            Chunk::Type(c) => c,
            Chunk::TypeSpec(c) => c,
            Chunk::Library(c) => c,
            Chunk::Unknown(c) => c,
        };
        emit_chunk(self.type_code(), body, options)
    }

    /// The serialized size of this chunk in bytes under the given options.
    /// A chunk's current size is simply the length of its serialized form;
    /// the size it had when first parsed is available as `original_size` on
    /// the concrete chunk types that track it.
    pub fn size(&self, options: SerializeFlags) -> StreamResult<usize> {
        Ok(self.to_bytes(options)?.len())
    }

    pub fn as_string_pool(&self) -> Option<&StringPoolChunk> {
        match self {
            Chunk::StringPool(pool) => Some(pool),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&ResourceTableChunk> {
        match self {
            Chunk::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn as_table_mut(&mut self) -> Option<&mut ResourceTableChunk> {
        match self {
            Chunk::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn as_xml(&self) -> Option<&XmlChunk> {
        match self {
            Chunk::Xml(xml) => Some(xml),
            _ => None,
        }
    }

    pub fn as_xml_mut(&mut self) -> Option<&mut XmlChunk> {
        match self {
            Chunk::Xml(xml) => Some(xml),
            _ => None,
        }
    }
}

/// Parses the children of a container chunk up to `end`, returning each
/// child together with its absolute offset. Children may not cross the
/// parent's declared end.
pub(crate) fn parse_children(
    r: &mut Reader,
    end: u64,
    container: &'static str,
) -> StreamResult<Vec<(u64, Chunk)>> {
    let mut children = Vec::new();
    while r.pos() < end {
        let child_offset = r.pos();
        let chunk = Chunk::parse(r)?;
        if r.pos() > end {
            return Err(StreamError::malformed(
                child_offset,
                format!(
                    "child chunk ends at {:#x}, past its {container} parent's end at {end:#x}",
                    r.pos()
                ),
            ));
        }
        children.push((child_offset, chunk));
    }
    Ok(children)
}

/// A chunk of a kind outside the catalogue. Header and payload bytes are
/// kept exactly as read; serialization reproduces them unchanged whatever
/// the options.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownChunk {
    pub type_code: u16,
    header_size: u16,
    header_bytes: Vec<u8>,
    payload: Vec<u8>,
}

impl UnknownChunk {
    pub(crate) fn parse(r: &mut Reader, header: &ChunkHeader) -> StreamResult<Self> {
        let header_bytes = r
            .bytes((header.header_size - METADATA_SIZE) as usize)?
            .to_vec();
        let payload = r.bytes((header.size - header.header_size as u32) as usize)?.to_vec();
        Ok(Self {
            type_code: header.type_code,
            header_size: header.header_size,
            header_bytes,
            payload,
        })
    }
}

impl ChunkBody for UnknownChunk {
    fn header_size(&self) -> u16 {
        self.header_size
    }

    fn write_header(&self, out: &mut Writer) -> StreamResult<()> {
        out.bytes(&self.header_bytes);
        Ok(())
    }

    fn write_payload(
        &self,
        out: &mut Writer,
        _header: &mut Writer,
        _options: SerializeFlags,
    ) -> StreamResult<()> {
        out.bytes(&self.payload);
        Ok(())
    }
}

/// A whole compiled resource file: the ordered sequence of root chunks.
///
/// A `resources.arsc` holds a single resource table root; a compiled XML
/// file holds a single XML root. The sequence form covers both and keeps
/// anything unusual intact.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceFile {
    chunks: Vec<Chunk>,
}

impl ResourceFile {
    /// Parses a resource file from a byte slice.
    pub fn parse(data: &[u8]) -> StreamResult<Self> {
        let mut r = Reader::new(data);
        let mut chunks = Vec::new();
        while r.remaining() > 0 {
            chunks.push(Chunk::parse(&mut r)?);
        }
        Ok(Self { chunks })
    }

    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunks_mut(&mut self) -> &mut [Chunk] {
        &mut self.chunks
    }

    /// Serializes every root chunk in order. With the default options the
    /// result is byte-identical to the input for an untouched file.
    pub fn to_bytes(&self, options: SerializeFlags) -> StreamResult<Vec<u8>> {
        let mut out = Vec::new();
        for chunk in &self.chunks {
            out.extend_from_slice(&chunk.to_bytes(options)?);
        }
        Ok(out)
    }
}

impl TryFrom<&[u8]> for ResourceFile {
    type Error = StreamError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        ResourceFile::parse(value)
    }
}

impl TryFrom<&ResourceFile> for Vec<u8> {
    type Error = StreamError;

    fn try_from(value: &ResourceFile) -> Result<Self, Self::Error> {
        value.to_bytes(SerializeFlags::empty())
    }
}
