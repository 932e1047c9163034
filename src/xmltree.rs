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

//! Compiled XML documents.
//!
//! An XML chunk's children are a string pool, an optional resource map and a
//! flat stream of namespace / element / cdata node chunks. Nodes store only
//! string indices; they resolve against the enclosing document's pool, so
//! the resolving accessors here take the document as a handle instead of
//! keeping parent back-links.

use std::collections::HashMap;

use crate::defs::{parse_children, Chunk, ChunkBody, ChunkHeader, SerializeFlags};
use crate::res_value::{ResourceIdentifier, ResourceValue, ValueType};
use crate::stream::{Reader, StreamError, StreamResult, Writer};
use crate::string_pool::StringPoolChunk;

/// The index value standing in for "no string" (-1 as an unsigned word).
pub const NO_STRING: u32 = 0xFFFF_FFFF;

/// Header size of every XML node chunk: metadata, line number, comment.
const NODE_HEADER_SIZE: u16 = 16;

/// A compiled XML document chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlChunk {
    header_size: u16,
    original_size: u32,
    children: Vec<Chunk>,
}

impl XmlChunk {
    pub const HEADER_SIZE: u16 = 8;

    pub fn new(string_pool: StringPoolChunk) -> Self {
        Self {
            header_size: Self::HEADER_SIZE,
            original_size: 0,
            children: vec![Chunk::StringPool(string_pool)],
        }
    }

    pub(crate) fn parse(r: &mut Reader, header: &ChunkHeader) -> StreamResult<Self> {
        r.seek(header.offset + header.header_size as u64)?;
        let children: Vec<Chunk> = parse_children(r, header.end(), "xml document")?
            .into_iter()
            .map(|(offset, chunk)| match &chunk {
                Chunk::StringPool(_)
                | Chunk::XmlResourceMap(_)
                | Chunk::XmlStartNamespace(_)
                | Chunk::XmlEndNamespace(_)
                | Chunk::XmlStartElement(_)
                | Chunk::XmlEndElement(_)
                | Chunk::XmlCdata(_)
                | Chunk::Unknown(_) => Ok(chunk),
                other => Err(StreamError::UnexpectedChild {
                    code: other.type_code(),
                    offset,
                    container: "xml document",
                }),
            })
            .collect::<StreamResult<_>>()?;
        Ok(Self {
            header_size: header.header_size,
            original_size: header.size,
            children,
        })
    }

    /// The size of this chunk when it was parsed. A chunk's size can
    /// deviate from this once its data is modified; constructed chunks
    /// report 0.
    pub fn original_size(&self) -> u32 {
        self.original_size
    }

    pub fn children(&self) -> &[Chunk] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [Chunk] {
        &mut self.children
    }

    /// Appends a child chunk, rejecting kinds an XML document cannot hold.
    pub fn add_chunk(&mut self, chunk: Chunk) -> StreamResult<()> {
        match &chunk {
            Chunk::StringPool(_)
            | Chunk::XmlResourceMap(_)
            | Chunk::XmlStartNamespace(_)
            | Chunk::XmlEndNamespace(_)
            | Chunk::XmlStartElement(_)
            | Chunk::XmlEndElement(_)
            | Chunk::XmlCdata(_)
            | Chunk::Unknown(_) => {
                self.children.push(chunk);
                Ok(())
            }
            other => Err(StreamError::UnexpectedChild {
                code: other.type_code(),
                offset: 0,
                container: "xml document",
            }),
        }
    }

    /// The document's embedded string pool.
    pub fn string_pool(&self) -> Option<&StringPoolChunk> {
        self.children.iter().find_map(Chunk::as_string_pool)
    }

    pub fn string_pool_mut(&mut self) -> Option<&mut StringPoolChunk> {
        self.children.iter_mut().find_map(|c| match c {
            Chunk::StringPool(pool) => Some(pool),
            _ => None,
        })
    }

    pub fn resource_map(&self) -> Option<&XmlResourceMapChunk> {
        self.children.iter().find_map(|c| match c {
            Chunk::XmlResourceMap(map) => Some(map),
            _ => None,
        })
    }

    /// Resolves a string index against the document pool. [`NO_STRING`]
    /// resolves to `None`.
    pub fn string(&self, index: u32) -> Option<&str> {
        if index == NO_STRING {
            return None;
        }
        self.string_pool()?.string(index as usize)
    }

    /// Rewrites every reference-typed attribute value in the document whose
    /// data word is a key of `mapping`.
    pub fn remap_references(&mut self, mapping: &HashMap<u32, u32>) {
        for child in &mut self.children {
            if let Chunk::XmlStartElement(element) = child {
                element.remap_references(mapping);
            }
        }
    }
}

impl ChunkBody for XmlChunk {
    fn header_size(&self) -> u16 {
        self.header_size
    }

    fn write_header(&self, _out: &mut Writer) -> StreamResult<()> {
        Ok(())
    }

    fn write_payload(
        &self,
        out: &mut Writer,
        _header: &mut Writer,
        options: SerializeFlags,
    ) -> StreamResult<()> {
        for child in &self.children {
            out.bytes(&child.to_bytes(options)?);
            out.pad4();
        }
        Ok(())
    }
}

/// The start or end of a namespace scope. Whether it opens or closes the
/// scope is carried by the enclosing [`Chunk`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XmlNamespaceChunk {
    /// Line number in the original source at which this node appeared.
    pub line_number: u32,
    /// String index of the node's comment; [`NO_STRING`] if none.
    pub comment: u32,
    /// String index of the namespace prefix.
    pub prefix: u32,
    /// String index of the namespace URI.
    pub uri: u32,
}

impl XmlNamespaceChunk {
    pub fn new(line_number: u32, prefix: u32, uri: u32) -> Self {
        Self {
            line_number,
            comment: NO_STRING,
            prefix,
            uri,
        }
    }

    pub(crate) fn parse(r: &mut Reader, _header: &ChunkHeader) -> StreamResult<Self> {
        Ok(Self {
            line_number: r.u32()?,
            comment: r.u32()?,
            prefix: r.u32()?,
            uri: r.u32()?,
        })
    }

    pub fn prefix<'a>(&self, document: &'a XmlChunk) -> Option<&'a str> {
        document.string(self.prefix)
    }

    pub fn uri<'a>(&self, document: &'a XmlChunk) -> Option<&'a str> {
        document.string(self.uri)
    }

    pub fn comment<'a>(&self, document: &'a XmlChunk) -> Option<&'a str> {
        document.string(self.comment)
    }
}

impl ChunkBody for XmlNamespaceChunk {
    fn header_size(&self) -> u16 {
        NODE_HEADER_SIZE
    }

    fn write_header(&self, out: &mut Writer) -> StreamResult<()> {
        out.u32(self.line_number);
        out.u32(self.comment);
        Ok(())
    }

    fn write_payload(
        &self,
        out: &mut Writer,
        _header: &mut Writer,
        _options: SerializeFlags,
    ) -> StreamResult<()> {
        out.u32(self.prefix);
        out.u32(self.uri);
        Ok(())
    }
}

/// An XML attribute: three string indices plus the typed value, 20 bytes on
/// disk. Attributes are plain data; replacing one means writing a new record
/// over the old index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XmlAttribute {
    /// String index of the namespace URI; [`NO_STRING`] if none.
    pub namespace_index: u32,
    /// String index of the attribute name.
    pub name_index: u32,
    /// String index of the raw character value; [`NO_STRING`] if none.
    pub raw_value_index: u32,
    pub typed_value: ResourceValue,
}

impl XmlAttribute {
    /// The serialized size in bytes of an attribute.
    pub const SIZE: u16 = 20;

    pub fn new(
        namespace_index: u32,
        name_index: u32,
        raw_value_index: u32,
        typed_value: ResourceValue,
    ) -> Self {
        Self {
            namespace_index,
            name_index,
            raw_value_index,
            typed_value,
        }
    }

    fn parse(r: &mut Reader) -> StreamResult<Self> {
        Ok(Self {
            namespace_index: r.u32()?,
            name_index: r.u32()?,
            raw_value_index: r.u32()?,
            typed_value: ResourceValue::parse(r)?,
        })
    }

    fn write(&self, out: &mut Writer) {
        out.u32(self.namespace_index);
        out.u32(self.name_index);
        out.u32(self.raw_value_index);
        self.typed_value.write(out);
    }

    pub fn namespace<'a>(&self, document: &'a XmlChunk) -> Option<&'a str> {
        document.string(self.namespace_index)
    }

    pub fn name<'a>(&self, document: &'a XmlChunk) -> Option<&'a str> {
        document.string(self.name_index)
    }

    pub fn raw_value<'a>(&self, document: &'a XmlChunk) -> Option<&'a str> {
        document.string(self.raw_value_index)
    }
}

/// The beginning of an XML element, with its attribute table.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlStartElementChunk {
    pub line_number: u32,
    /// String index of the node's comment; [`NO_STRING`] if none.
    pub comment: u32,
    /// String index of the namespace URI; [`NO_STRING`] if none.
    pub namespace: u32,
    /// String index of the element name.
    pub name: u32,
    // The id/class/style attribute indices are stored as on disk: 1-based,
    // with 0 meaning "absent".
    id_index: u16,
    class_index: u16,
    style_index: u16,
    attributes: Vec<XmlAttribute>,
}

impl XmlStartElementChunk {
    pub fn new(line_number: u32, namespace: u32, name: u32) -> Self {
        Self {
            line_number,
            comment: NO_STRING,
            namespace,
            name,
            id_index: 0,
            class_index: 0,
            style_index: 0,
            attributes: Vec::new(),
        }
    }

    pub(crate) fn parse(r: &mut Reader, header: &ChunkHeader) -> StreamResult<Self> {
        let line_number = r.u32()?;
        let comment = r.u32()?;
        let namespace = r.u32()?;
        let name = r.u32()?;
        let attribute_start = r.u16()?;
        let size_pos = r.pos();
        let attribute_size = r.u16()?;
        if attribute_size != XmlAttribute::SIZE {
            return Err(StreamError::malformed(
                size_pos,
                format!(
                    "attribute size is {attribute_size}, expected {}",
                    XmlAttribute::SIZE
                ),
            ));
        }
        let attribute_count = r.u16()?;
        let id_index = r.u16()?;
        let class_index = r.u16()?;
        let style_index = r.u16()?;

        // Attributes start attribute_start bytes past the node header.
        r.seek(header.offset + header.header_size as u64 + attribute_start as u64)?;
        let mut attributes = Vec::with_capacity(attribute_count as usize);
        for _ in 0..attribute_count {
            attributes.push(XmlAttribute::parse(r)?);
        }

        Ok(Self {
            line_number,
            comment,
            namespace,
            name,
            id_index,
            class_index,
            style_index,
            attributes,
        })
    }

    pub fn namespace<'a>(&self, document: &'a XmlChunk) -> Option<&'a str> {
        document.string(self.namespace)
    }

    pub fn name<'a>(&self, document: &'a XmlChunk) -> Option<&'a str> {
        document.string(self.name)
    }

    pub fn comment<'a>(&self, document: &'a XmlChunk) -> Option<&'a str> {
        document.string(self.comment)
    }

    pub fn attributes(&self) -> &[XmlAttribute] {
        &self.attributes
    }

    pub fn push_attribute(&mut self, attribute: XmlAttribute) {
        self.attributes.push(attribute);
    }

    /// The 0-based index of the "id" attribute, if present.
    pub fn id_index(&self) -> Option<u16> {
        self.id_index.checked_sub(1)
    }

    /// The 0-based index of the "class" attribute, if present.
    pub fn class_index(&self) -> Option<u16> {
        self.class_index.checked_sub(1)
    }

    /// The 0-based index of the "style" attribute, if present.
    pub fn style_index(&self) -> Option<u16> {
        self.style_index.checked_sub(1)
    }

    /// Finds the attribute with the given name.
    pub fn attribute<'a>(&'a self, document: &XmlChunk, name: &str) -> Option<&'a XmlAttribute> {
        self.attributes
            .iter()
            .find(|a| a.name(document) == Some(name))
    }

    /// Rewrites every reference-typed attribute whose data word is a key of
    /// `mapping`, replacing the attribute record in place.
    pub fn remap_references(&mut self, mapping: &HashMap<u32, u32>) {
        for attribute in &mut self.attributes {
            if attribute.typed_value.value_type != ValueType::Reference {
                continue;
            }
            if let Some(&new_value) = mapping.get(&attribute.typed_value.data) {
                *attribute = XmlAttribute {
                    typed_value: attribute.typed_value.with_data(new_value),
                    ..*attribute
                };
            }
        }
    }
}

impl ChunkBody for XmlStartElementChunk {
    fn header_size(&self) -> u16 {
        NODE_HEADER_SIZE
    }

    fn write_header(&self, out: &mut Writer) -> StreamResult<()> {
        out.u32(self.line_number);
        out.u32(self.comment);
        Ok(())
    }

    fn write_payload(
        &self,
        out: &mut Writer,
        _header: &mut Writer,
        _options: SerializeFlags,
    ) -> StreamResult<()> {
        out.u32(self.namespace);
        out.u32(self.name);
        out.u16(XmlAttribute::SIZE); // attribute start: right after these fields
        out.u16(XmlAttribute::SIZE);
        out.u16(self.attributes.len() as u16);
        out.u16(self.id_index);
        out.u16(self.class_index);
        out.u16(self.style_index);
        for attribute in &self.attributes {
            attribute.write(out);
        }
        Ok(())
    }
}

/// The end of an XML element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XmlEndElementChunk {
    pub line_number: u32,
    /// String index of the node's comment; [`NO_STRING`] if none.
    pub comment: u32,
    /// String index of the namespace URI; [`NO_STRING`] if none.
    pub namespace: u32,
    /// String index of the element name.
    pub name: u32,
}

impl XmlEndElementChunk {
    pub fn new(line_number: u32, namespace: u32, name: u32) -> Self {
        Self {
            line_number,
            comment: NO_STRING,
            namespace,
            name,
        }
    }

    pub(crate) fn parse(r: &mut Reader, _header: &ChunkHeader) -> StreamResult<Self> {
        Ok(Self {
            line_number: r.u32()?,
            comment: r.u32()?,
            namespace: r.u32()?,
            name: r.u32()?,
        })
    }

    pub fn namespace<'a>(&self, document: &'a XmlChunk) -> Option<&'a str> {
        document.string(self.namespace)
    }

    pub fn name<'a>(&self, document: &'a XmlChunk) -> Option<&'a str> {
        document.string(self.name)
    }
}

impl ChunkBody for XmlEndElementChunk {
    fn header_size(&self) -> u16 {
        NODE_HEADER_SIZE
    }

    fn write_header(&self, out: &mut Writer) -> StreamResult<()> {
        out.u32(self.line_number);
        out.u32(self.comment);
        Ok(())
    }

    fn write_payload(
        &self,
        out: &mut Writer,
        _header: &mut Writer,
        _options: SerializeFlags,
    ) -> StreamResult<()> {
        out.u32(self.namespace);
        out.u32(self.name);
        Ok(())
    }
}

/// A CDATA node: the raw character data plus its parsed typed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XmlCdataChunk {
    pub line_number: u32,
    /// String index of the node's comment; [`NO_STRING`] if none.
    pub comment: u32,
    /// String index of the raw character data.
    pub raw_value: u32,
    pub typed_value: ResourceValue,
}

impl XmlCdataChunk {
    pub(crate) fn parse(r: &mut Reader, _header: &ChunkHeader) -> StreamResult<Self> {
        Ok(Self {
            line_number: r.u32()?,
            comment: r.u32()?,
            raw_value: r.u32()?,
            typed_value: ResourceValue::parse(r)?,
        })
    }

    pub fn raw_value<'a>(&self, document: &'a XmlChunk) -> Option<&'a str> {
        document.string(self.raw_value)
    }
}

impl ChunkBody for XmlCdataChunk {
    fn header_size(&self) -> u16 {
        NODE_HEADER_SIZE
    }

    fn write_header(&self, out: &mut Writer) -> StreamResult<()> {
        out.u32(self.line_number);
        out.u32(self.comment);
        Ok(())
    }

    fn write_payload(
        &self,
        out: &mut Writer,
        _header: &mut Writer,
        _options: SerializeFlags,
    ) -> StreamResult<()> {
        out.u32(self.raw_value);
        self.typed_value.write(out);
        Ok(())
    }
}

/// Maps the string indices of attribute names to the resource ids of the
/// attribute resources defining them. Entry `i` corresponds to string `i` of
/// the document pool.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlResourceMapChunk {
    header_size: u16,
    original_size: u32,
    resources: Vec<u32>,
}

impl XmlResourceMapChunk {
    pub const HEADER_SIZE: u16 = 8;

    pub fn new(resources: Vec<u32>) -> Self {
        Self {
            header_size: Self::HEADER_SIZE,
            original_size: 0,
            resources,
        }
    }

    pub(crate) fn parse(r: &mut Reader, header: &ChunkHeader) -> StreamResult<Self> {
        let resource_count = (header.size - header.header_size as u32) / 4;
        let mut resources = Vec::with_capacity(resource_count as usize);
        for _ in 0..resource_count {
            resources.push(r.u32()?);
        }
        Ok(Self {
            header_size: header.header_size,
            original_size: header.size,
            resources,
        })
    }

    /// The size of this chunk when it was parsed. A chunk's size can
    /// deviate from this once its data is modified; constructed chunks
    /// report 0.
    pub fn original_size(&self) -> u32 {
        self.original_size
    }

    pub fn resources(&self) -> &[u32] {
        &self.resources
    }

    /// The resource id the given attribute string index maps to.
    pub fn resource_id(&self, attribute_index: usize) -> Option<ResourceIdentifier> {
        self.resources
            .get(attribute_index)
            .map(|&raw| ResourceIdentifier::from(raw))
    }
}

impl ChunkBody for XmlResourceMapChunk {
    fn header_size(&self) -> u16 {
        self.header_size
    }

    fn write_header(&self, _out: &mut Writer) -> StreamResult<()> {
        Ok(())
    }

    fn write_payload(
        &self,
        out: &mut Writer,
        _header: &mut Writer,
        _options: SerializeFlags,
    ) -> StreamResult<()> {
        for resource in &self.resources {
            out.u32(*resource);
        }
        Ok(())
    }
}
