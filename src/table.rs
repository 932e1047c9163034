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

//! The resource table tree: table, package, type, type-spec and library
//! chunks.
//!
//! A table owns the global value string pool and one package per application
//! package. A package owns a type-string pool naming its resource types, a
//! key-string pool naming its entries, one type-spec chunk per type id and
//! one type chunk per (type id, configuration) pair. Entries reference the
//! pools by index only; pool mutations fan out through
//! [`ResourceTableChunk::delete_strings`] and
//! [`PackageChunk::delete_key_strings`].

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::config::ResourceConfiguration;
use crate::defs::{parse_children, Chunk, ChunkBody, ChunkHeader, SerializeFlags};
use crate::res_value::{ResourceIdentifier, ResourceValue, ValueType};
use crate::stream::{Reader, StreamError, StreamResult, Writer};
use crate::string_pool::StringPoolChunk;

/// Number of UTF-16 code units in the fixed-width package name field.
const PACKAGE_NAME_UNITS: usize = 128;

/// Sentinel in a dense offset table marking an absent entry.
pub const NO_ENTRY: u32 = 0xFFFF_FFFF;

/// Type-spec mask bit marking an entry as public.
pub const SPEC_PUBLIC: u32 = 0x4000_0000;

fn read_package_name(r: &mut Reader) -> StreamResult<String> {
    let start = r.pos();
    let mut units = Vec::with_capacity(PACKAGE_NAME_UNITS);
    for _ in 0..PACKAGE_NAME_UNITS {
        units.push(r.u16()?);
    }
    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    String::from_utf16(&units[..end])
        .map_err(|_| StreamError::malformed(start, "package name is not valid UTF-16"))
}

fn write_package_name(out: &mut Writer, name: &str) -> StreamResult<()> {
    let units: Vec<u16> = name.encode_utf16().collect();
    if units.len() >= PACKAGE_NAME_UNITS {
        return Err(StreamError::invariant(format!(
            "package name {name:?} does not fit the {PACKAGE_NAME_UNITS} unit field"
        )));
    }
    for unit in &units {
        out.u16(*unit);
    }
    for _ in units.len()..PACKAGE_NAME_UNITS {
        out.u16(0);
    }
    Ok(())
}

/// One resource entry in a [`TypeChunk`]: either a single value (simple) or
/// a parent reference plus a map of sub-values (complex). Plain data with
/// structural equality; consumers key maps by entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeEntry {
    /// Number of bytes in the entry header: 8 for simple, 16 for complex.
    pub header_size: u16,
    pub flags: u16,
    /// Index into the owning package's key string pool naming this entry.
    pub key_index: u32,
    /// The value, when this is a simple entry.
    pub value: Option<ResourceValue>,
    /// The (attribute id, value) pairs of a complex entry, in file order.
    pub values: Vec<(u32, ResourceValue)>,
    /// Entry id of the parent mapping of a complex entry, or 0.
    pub parent_entry: u32,
}

impl TypeEntry {
    /// Set when this is a complex entry carrying name/value mappings.
    pub const FLAG_COMPLEX: u16 = 0x0001;

    /// Set when this entry is public, allowing libraries to reference it.
    pub const FLAG_PUBLIC: u16 = 0x0002;

    pub const SIMPLE_HEADER_SIZE: u16 = 8;
    pub const COMPLEX_HEADER_SIZE: u16 = 16;

    /// Serialized size of one (attribute id, value) mapping.
    const MAPPING_SIZE: usize = 4 + ResourceValue::SIZE;

    pub fn simple(key_index: u32, value: ResourceValue) -> Self {
        Self {
            header_size: Self::SIMPLE_HEADER_SIZE,
            flags: 0,
            key_index,
            value: Some(value),
            values: Vec::new(),
            parent_entry: 0,
        }
    }

    pub fn complex(key_index: u32, parent_entry: u32, values: Vec<(u32, ResourceValue)>) -> Self {
        Self {
            header_size: Self::COMPLEX_HEADER_SIZE,
            flags: Self::FLAG_COMPLEX,
            key_index,
            value: None,
            values,
            parent_entry,
        }
    }

    pub fn is_complex(&self) -> bool {
        self.flags & Self::FLAG_COMPLEX != 0
    }

    pub fn is_public(&self) -> bool {
        self.flags & Self::FLAG_PUBLIC != 0
    }

    /// The total number of bytes this entry occupies on disk.
    pub fn size(&self) -> usize {
        self.header_size as usize
            + if self.is_complex() {
                self.values.len() * Self::MAPPING_SIZE
            } else {
                ResourceValue::SIZE
            }
    }

    pub fn with_key_index(self, key_index: u32) -> Self {
        Self { key_index, ..self }
    }

    pub fn with_value(self, value: Option<ResourceValue>) -> Self {
        Self { value, ..self }
    }

    pub fn with_values(self, values: Vec<(u32, ResourceValue)>) -> Self {
        Self { values, ..self }
    }

    /// The key name of this entry, resolved against its package.
    pub fn key_name<'a>(&self, package: &'a PackageChunk) -> Option<&'a str> {
        package
            .key_string_pool()
            .and_then(|pool| pool.string(self.key_index as usize))
    }

    fn parse(r: &mut Reader) -> StreamResult<Self> {
        let header_size = r.u16()?;
        let flags = r.u16()?;
        let key_index = r.u32()?;
        let mut value = None;
        let mut values = Vec::new();
        let mut parent_entry = 0;
        if flags & Self::FLAG_COMPLEX != 0 {
            parent_entry = r.u32()?;
            let value_count = r.u32()?;
            values.reserve(value_count as usize);
            for _ in 0..value_count {
                values.push((r.u32()?, ResourceValue::parse(r)?));
            }
        } else {
            value = Some(ResourceValue::parse(r)?);
        }
        Ok(Self {
            header_size,
            flags,
            key_index,
            value,
            values,
            parent_entry,
        })
    }

    fn write(&self, out: &mut Writer, options: SerializeFlags) -> StreamResult<()> {
        let flag_mask = if options.contains(SerializeFlags::PRIVATE_RESOURCES) {
            !Self::FLAG_PUBLIC
        } else {
            !0
        };
        out.u16(self.header_size);
        out.u16(self.flags & flag_mask);
        out.u32(self.key_index);
        if self.is_complex() {
            out.u32(self.parent_entry);
            out.u32(self.values.len() as u32);
            for (attribute, value) in &self.values {
                out.u32(*attribute);
                value.write(out);
            }
        } else {
            let value = self
                .value
                .as_ref()
                .ok_or_else(|| StreamError::invariant("a simple entry must carry a value"))?;
            value.write(out);
        }
        Ok(())
    }
}

/// The resource values for one (type id, configuration) pair.
///
/// Entries form a sparse map from the 0-based entry index to the entry; the
/// total entry count includes absent indices, which serialize as the
/// [`NO_ENTRY`] sentinel in the dense layout and are simply omitted in the
/// sparse layout.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeChunk {
    header_size: u16,
    original_size: u32,
    id: u8,
    flags: u8,
    entry_count: u32,
    configuration: ResourceConfiguration,
    entries: BTreeMap<u16, TypeEntry>,
}

impl TypeChunk {
    /// Flag bit: entries are encoded as (index, offset/4) pairs instead of a
    /// dense offset table.
    pub const FLAG_SPARSE: u8 = 0x01;

    pub fn new(id: u8, configuration: ResourceConfiguration, total_entry_count: u32) -> Self {
        let header_size = 20 + configuration.size as u16;
        Self {
            header_size,
            original_size: 0,
            id,
            flags: 0,
            entry_count: total_entry_count,
            configuration,
            entries: BTreeMap::new(),
        }
    }

    pub(crate) fn parse(r: &mut Reader, header: &ChunkHeader) -> StreamResult<Self> {
        let id = r.u8()?;
        let flags = r.u8()?;
        let _reserved = r.u16()?;
        let entry_count = r.u32()?;
        if entry_count > 0x10000 {
            return Err(StreamError::malformed(
                header.offset,
                format!("type chunk declares {entry_count} entries; the entry index space is 16-bit"),
            ));
        }
        let entries_start = r.u32()?;
        let configuration = ResourceConfiguration::parse(r)?;

        // The offset table sits immediately after the declared header.
        r.seek(header.offset + header.header_size as u64)?;
        let base = header.offset + entries_start as u64;
        let mut entries = BTreeMap::new();
        if flags & Self::FLAG_SPARSE != 0 {
            let mut pairs = Vec::with_capacity(entry_count as usize);
            for _ in 0..entry_count {
                let index = r.u16()?;
                let quarter_offset = r.u16()?;
                pairs.push((index, quarter_offset as u64 * 4));
            }
            for (index, offset) in pairs {
                r.seek(base + offset)?;
                entries.insert(index, TypeEntry::parse(r)?);
            }
        } else {
            let mut offsets = Vec::with_capacity(entry_count as usize);
            for _ in 0..entry_count {
                offsets.push(r.u32()?);
            }
            for (index, offset) in offsets.into_iter().enumerate() {
                if offset == NO_ENTRY {
                    continue;
                }
                r.seek(base + offset as u64)?;
                entries.insert(index as u16, TypeEntry::parse(r)?);
            }
        }

        Ok(Self {
            header_size: header.header_size,
            original_size: header.size,
            id,
            flags,
            entry_count,
            configuration,
            entries,
        })
    }

    /// The size of this chunk when it was parsed. A chunk's size can
    /// deviate from this once its data is modified; constructed chunks
    /// report 0.
    pub fn original_size(&self) -> u32 {
        self.original_size
    }

    /// The 1-based type id into the owning package's type string pool.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Changes this chunk's type id, validated against the owning package's
    /// type string pool.
    pub fn set_id(&mut self, new_id: u8, type_string_pool: &StringPoolChunk) -> StreamResult<()> {
        if new_id < 1 {
            return Err(StreamError::invariant("type ids are 1-based; 0 is invalid"));
        }
        if type_string_pool.string_count() < new_id as usize {
            return Err(StreamError::invariant(format!(
                "type id {new_id} exceeds the type string pool's {} entries",
                type_string_pool.string_count()
            )));
        }
        self.id = new_id;
        Ok(())
    }

    pub fn has_sparse_entries(&self) -> bool {
        self.flags & Self::FLAG_SPARSE != 0
    }

    /// Selects the sparse or dense on-disk layout; the logical entry set is
    /// unchanged.
    pub fn set_sparse_entries(&mut self, sparse: bool) {
        self.flags = (self.flags & !Self::FLAG_SPARSE) | if sparse { Self::FLAG_SPARSE } else { 0 };
    }

    pub fn configuration(&self) -> &ResourceConfiguration {
        &self.configuration
    }

    pub fn set_configuration(&mut self, configuration: ResourceConfiguration) {
        self.header_size = 20 + configuration.size as u16;
        self.configuration = configuration;
    }

    /// The total entry count including absent indices.
    pub fn total_entry_count(&self) -> u32 {
        self.entry_count
    }

    pub fn set_total_entry_count(&mut self, entry_count: u32) {
        self.entry_count = entry_count;
    }

    /// The sparse map of present entries: dense index to entry.
    pub fn entries(&self) -> &BTreeMap<u16, TypeEntry> {
        &self.entries
    }

    pub(crate) fn entries_mut(&mut self) -> &mut BTreeMap<u16, TypeEntry> {
        &mut self.entries
    }

    /// The name of the type this chunk holds (e.g. `string`, `attr`),
    /// resolved against the owning package.
    pub fn type_name<'a>(&self, package: &'a PackageChunk) -> Option<&'a str> {
        package.type_string(self.id)
    }

    /// Overrides the entry at `index`; `None` removes it. Indices outside
    /// `0..total_entry_count` are a no-op.
    pub fn override_entry(&mut self, index: u16, entry: Option<TypeEntry>) {
        if (index as u32) < self.entry_count {
            match entry {
                Some(entry) => {
                    self.entries.insert(index, entry);
                }
                None => {
                    self.entries.remove(&index);
                }
            }
        }
    }

    /// Overrides the entries at every index:entry pair in `entries`, with
    /// the same semantics as [`TypeChunk::override_entry`].
    pub fn override_entries(&mut self, entries: BTreeMap<u16, Option<TypeEntry>>) {
        for (index, entry) in entries {
            self.override_entry(index, entry);
        }
    }

    /// True if `id` addresses an entry present in this chunk, given the id
    /// of the owning package.
    pub fn contains_resource(&self, package_id: u32, id: ResourceIdentifier) -> bool {
        id.package_id as u32 == package_id
            && id.type_id == self.id
            && self.entries.contains_key(&id.entry_id)
    }

    fn offset_table_size(&self) -> u32 {
        self.entry_count * 4
    }
}

impl ChunkBody for TypeChunk {
    fn header_size(&self) -> u16 {
        self.header_size
    }

    fn write_header(&self, out: &mut Writer) -> StreamResult<()> {
        out.u8(self.id);
        out.u8(self.flags);
        out.u16(0);
        out.u32(self.entry_count);
        out.u32(self.header_size as u32 + self.offset_table_size());
        self.configuration.write(out);
        Ok(())
    }

    fn write_payload(
        &self,
        out: &mut Writer,
        _header: &mut Writer,
        options: SerializeFlags,
    ) -> StreamResult<()> {
        let mut offsets = Writer::new();
        let mut data = Writer::new();
        if self.has_sparse_entries() {
            let mut entry_offset = 0usize;
            for (&index, entry) in &self.entries {
                if entry_offset / 4 > u16::MAX as usize {
                    return Err(StreamError::invariant(
                        "sparse entry data exceeds the 16-bit quarter-offset range",
                    ));
                }
                offsets.u16(index);
                offsets.u16((entry_offset / 4) as u16);
                let start = data.len();
                entry.write(&mut data, options)?;
                entry_offset += data.len() - start;
                if entry_offset % 4 != 0 {
                    return Err(StreamError::invariant(
                        "sparse entry offsets must stay a multiple of 4",
                    ));
                }
            }
        } else {
            let mut entry_offset = 0usize;
            for index in 0..self.entry_count {
                match self.entries.get(&(index as u16)) {
                    None => offsets.u32(NO_ENTRY),
                    Some(entry) => {
                        offsets.u32(entry_offset as u32);
                        let start = data.len();
                        entry.write(&mut data, options)?;
                        entry_offset += data.len() - start;
                    }
                }
            }
        }
        data.pad4();
        out.bytes(&offsets.into_bytes());
        out.bytes(&data.into_bytes());
        Ok(())
    }
}

/// Per-type configuration masks: one 32-bit word per entry of the type,
/// with [`SPEC_PUBLIC`] marking public entries.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeSpecChunk {
    header_size: u16,
    original_size: u32,
    id: u8,
    masks: Vec<u32>,
}

impl TypeSpecChunk {
    pub const HEADER_SIZE: u16 = 16;

    pub fn new(id: u8, masks: Vec<u32>) -> Self {
        Self {
            header_size: Self::HEADER_SIZE,
            original_size: 0,
            id,
            masks,
        }
    }

    pub(crate) fn parse(r: &mut Reader, header: &ChunkHeader) -> StreamResult<Self> {
        let id = r.u8()?;
        r.skip(3)?;
        let entry_count = r.u32()?;
        let mut masks = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            masks.push(r.u32()?);
        }
        Ok(Self {
            header_size: header.header_size,
            original_size: header.size,
            id,
            masks,
        })
    }

    /// The size of this chunk when it was parsed. A chunk's size can
    /// deviate from this once its data is modified; constructed chunks
    /// report 0.
    pub fn original_size(&self) -> u32 {
        self.original_size
    }

    /// The 1-based type id this spec describes.
    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn set_id(&mut self, new_id: u8) -> StreamResult<()> {
        if new_id < 1 {
            return Err(StreamError::invariant("type ids are 1-based; 0 is invalid"));
        }
        self.id = new_id;
        Ok(())
    }

    /// The configuration-change masks, one per entry.
    pub fn masks(&self) -> &[u32] {
        &self.masks
    }

    pub fn set_masks(&mut self, masks: Vec<u32>) {
        self.masks = masks;
    }

    /// True if the entry at `index` is marked public.
    pub fn is_public(&self, index: usize) -> bool {
        self.masks
            .get(index)
            .is_some_and(|mask| mask & SPEC_PUBLIC != 0)
    }
}

impl ChunkBody for TypeSpecChunk {
    fn header_size(&self) -> u16 {
        self.header_size
    }

    fn write_header(&self, out: &mut Writer) -> StreamResult<()> {
        // The id byte plus its three reserved bytes pack into one word.
        out.u32(self.id as u32);
        out.u32(self.masks.len() as u32);
        Ok(())
    }

    fn write_payload(
        &self,
        out: &mut Writer,
        _header: &mut Writer,
        options: SerializeFlags,
    ) -> StreamResult<()> {
        let mask_filter = if options.contains(SerializeFlags::PRIVATE_RESOURCES) {
            !SPEC_PUBLIC
        } else {
            !0
        };
        for mask in &self.masks {
            out.u32(mask & mask_filter);
        }
        Ok(())
    }
}

/// A shared-library package-id to package-name entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LibraryEntry {
    /// The package id assigned to the shared library at build time.
    pub package_id: u32,
    pub package_name: String,
}

/// Maps the package ids of shared libraries used by a resource table to
/// their package names, so dynamic references can be rebound at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryChunk {
    header_size: u16,
    original_size: u32,
    entries: Vec<LibraryEntry>,
}

impl LibraryChunk {
    pub const HEADER_SIZE: u16 = 12;

    pub fn new(entries: Vec<LibraryEntry>) -> Self {
        Self {
            header_size: Self::HEADER_SIZE,
            original_size: 0,
            entries,
        }
    }

    pub(crate) fn parse(r: &mut Reader, header: &ChunkHeader) -> StreamResult<Self> {
        let entry_count = r.u32()?;
        let mut entries = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            entries.push(LibraryEntry {
                package_id: r.u32()?,
                package_name: read_package_name(r)?,
            });
        }
        Ok(Self {
            header_size: header.header_size,
            original_size: header.size,
            entries,
        })
    }

    /// The size of this chunk when it was parsed. A chunk's size can
    /// deviate from this once its data is modified; constructed chunks
    /// report 0.
    pub fn original_size(&self) -> u32 {
        self.original_size
    }

    pub fn entries(&self) -> &[LibraryEntry] {
        &self.entries
    }
}

impl ChunkBody for LibraryChunk {
    fn header_size(&self) -> u16 {
        self.header_size
    }

    fn write_header(&self, out: &mut Writer) -> StreamResult<()> {
        out.u32(self.entries.len() as u32);
        Ok(())
    }

    fn write_payload(
        &self,
        out: &mut Writer,
        _header: &mut Writer,
        _options: SerializeFlags,
    ) -> StreamResult<()> {
        for entry in &self.entries {
            out.u32(entry.package_id);
            write_package_name(out, &entry.package_name)?;
        }
        Ok(())
    }
}

/// Offset from the package chunk start of the type-strings offset field.
const TYPE_OFFSET_OFFSET: usize = 268;

/// Offset from the package chunk start of the key-strings offset field.
const KEY_OFFSET_OFFSET: usize = 276;

/// A collection of resource data for one application package.
///
/// Children keep their original order; the type-string and key-string pools
/// are recognised among them by the offsets the header declared, and those
/// offsets are re-observed and back-patched as the children are written out.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageChunk {
    header_size: u16,
    original_size: u32,
    id: u32,
    package_name: String,
    type_strings_offset: u32,
    last_public_type: u32,
    key_strings_offset: u32,
    last_public_key: u32,
    type_id_offset: u32,
    /// (offset tag, chunk) pairs. For parsed packages the tag is the child's
    /// original offset from the chunk start; for constructed packages it is
    /// a synthetic unique tag. Tags only serve to recognise the two pools.
    children: Vec<(u32, Chunk)>,
}

impl PackageChunk {
    pub const HEADER_SIZE: u16 = 288;

    /// Builds a package whose first children are its type-string pool and
    /// key-string pool, in that order.
    pub fn new(
        id: u32,
        package_name: &str,
        type_strings: StringPoolChunk,
        key_strings: StringPoolChunk,
    ) -> Self {
        Self {
            header_size: Self::HEADER_SIZE,
            original_size: 0,
            id,
            package_name: package_name.to_string(),
            type_strings_offset: 1,
            last_public_type: 0,
            key_strings_offset: 2,
            last_public_key: 0,
            type_id_offset: 0,
            children: vec![
                (1, Chunk::StringPool(type_strings)),
                (2, Chunk::StringPool(key_strings)),
            ],
        }
    }

    pub(crate) fn parse(r: &mut Reader, header: &ChunkHeader) -> StreamResult<Self> {
        let id = r.u32()?;
        let package_name = read_package_name(r)?;
        let type_strings_offset = r.u32()?;
        let last_public_type = r.u32()?;
        let key_strings_offset = r.u32()?;
        let last_public_key = r.u32()?;
        let type_id_offset = r.u32()?;

        r.seek(header.offset + header.header_size as u64)?;
        let children: Vec<(u32, Chunk)> = parse_children(r, header.end(), "package")?
            .into_iter()
            .map(|(abs, chunk)| ((abs - header.offset) as u32, chunk))
            .collect();

        for (offset, child) in &children {
            match child {
                Chunk::Type(_) | Chunk::TypeSpec(_) | Chunk::StringPool(_) | Chunk::Unknown(_) => {}
                Chunk::Library(_) => {
                    if children
                        .iter()
                        .filter(|(_, c)| matches!(c, Chunk::Library(_)))
                        .count()
                        > 1
                    {
                        return Err(StreamError::malformed(
                            header.offset + *offset as u64,
                            "package contains more than one library chunk",
                        ));
                    }
                }
                other => {
                    return Err(StreamError::UnexpectedChild {
                        code: other.type_code(),
                        offset: header.offset + *offset as u64,
                        container: "package",
                    })
                }
            }
        }

        let has_pool_at = |offset: u32| {
            children
                .iter()
                .any(|(o, c)| *o == offset && matches!(c, Chunk::StringPool(_)))
        };
        if !has_pool_at(type_strings_offset) {
            return Err(StreamError::malformed(
                header.offset,
                format!("no type string pool at declared offset {type_strings_offset:#x}"),
            ));
        }
        if !has_pool_at(key_strings_offset) {
            return Err(StreamError::malformed(
                header.offset,
                format!("no key string pool at declared offset {key_strings_offset:#x}"),
            ));
        }

        Ok(Self {
            header_size: header.header_size,
            original_size: header.size,
            id,
            package_name,
            type_strings_offset,
            last_public_type,
            key_strings_offset,
            last_public_key,
            type_id_offset,
            children,
        })
    }

    /// The size of this chunk when it was parsed. A chunk's size can
    /// deviate from this once its data is modified; constructed chunks
    /// report 0.
    pub fn original_size(&self) -> u32 {
        self.original_size
    }

    /// The package id if this is a base package, or 0 if not.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn set_id(&mut self, id: u32) {
        self.id = id;
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn set_package_name(&mut self, package_name: impl Into<String>) {
        self.package_name = package_name.into();
    }

    /// Last index into the type string pool that is public.
    pub fn last_public_type(&self) -> u32 {
        self.last_public_type
    }

    /// Last index into the key string pool that is public.
    pub fn last_public_key(&self) -> u32 {
        self.last_public_key
    }

    pub fn type_id_offset(&self) -> u32 {
        self.type_id_offset
    }

    fn pool_at(&self, offset: u32) -> Option<&StringPoolChunk> {
        self.children.iter().find_map(|(o, c)| {
            if *o == offset {
                c.as_string_pool()
            } else {
                None
            }
        })
    }

    fn pool_at_mut(&mut self, offset: u32) -> Option<&mut StringPoolChunk> {
        self.children.iter_mut().find_map(|(o, c)| {
            if *o == offset {
                match c {
                    Chunk::StringPool(pool) => Some(pool),
                    _ => None,
                }
            } else {
                None
            }
        })
    }

    /// The pool naming this package's resource types (`string`, `attr`, ...).
    pub fn type_string_pool(&self) -> Option<&StringPoolChunk> {
        self.pool_at(self.type_strings_offset)
    }

    pub fn type_string_pool_mut(&mut self) -> Option<&mut StringPoolChunk> {
        self.pool_at_mut(self.type_strings_offset)
    }

    /// The pool naming this package's entries.
    pub fn key_string_pool(&self) -> Option<&StringPoolChunk> {
        self.pool_at(self.key_strings_offset)
    }

    pub fn key_string_pool_mut(&mut self) -> Option<&mut StringPoolChunk> {
        self.pool_at_mut(self.key_strings_offset)
    }

    /// The type name for a 1-based type id.
    pub fn type_string(&self, id: u8) -> Option<&str> {
        self.type_string_pool()?.string(id as usize - 1)
    }

    /// Every type chunk in this package, in file order.
    pub fn type_chunks(&self) -> impl Iterator<Item = &TypeChunk> {
        self.children.iter().filter_map(|(_, c)| match c {
            Chunk::Type(chunk) => Some(chunk),
            _ => None,
        })
    }

    pub fn type_chunks_mut(&mut self) -> impl Iterator<Item = &mut TypeChunk> {
        self.children.iter_mut().filter_map(|(_, c)| match c {
            Chunk::Type(chunk) => Some(chunk),
            _ => None,
        })
    }

    /// The type chunks holding the given 1-based type id, in file order; the
    /// first is the default configuration's chunk, an ordering downstream
    /// tools rely on.
    pub fn type_chunks_with_id(&self, id: u8) -> impl Iterator<Item = &TypeChunk> {
        self.type_chunks().filter(move |chunk| chunk.id() == id)
    }

    /// The type chunks whose type name matches `name`.
    pub fn type_chunks_with_name(&self, name: &str) -> Vec<&TypeChunk> {
        match self
            .type_string_pool()
            .and_then(|pool| pool.index_of(name))
        {
            Some(index) => self.type_chunks_with_id(index as u8 + 1).collect(),
            None => Vec::new(),
        }
    }

    pub fn type_specs(&self) -> impl Iterator<Item = &TypeSpecChunk> {
        self.children.iter().filter_map(|(_, c)| match c {
            Chunk::TypeSpec(chunk) => Some(chunk),
            _ => None,
        })
    }

    /// The type spec for a 1-based type id.
    pub fn type_spec(&self, id: u8) -> Option<&TypeSpecChunk> {
        self.type_specs().find(|spec| spec.id() == id)
    }

    pub fn library(&self) -> Option<&LibraryChunk> {
        self.children.iter().find_map(|(_, c)| match c {
            Chunk::Library(chunk) => Some(chunk),
            _ => None,
        })
    }

    /// Appends a child chunk. Only type, type-spec, library, string pool and
    /// unknown chunks may live inside a package; a second library chunk is
    /// rejected.
    pub fn add_chunk(&mut self, chunk: Chunk) -> StreamResult<()> {
        match &chunk {
            Chunk::Type(_) | Chunk::TypeSpec(_) | Chunk::StringPool(_) | Chunk::Unknown(_) => {}
            Chunk::Library(_) => {
                if self.library().is_some() {
                    return Err(StreamError::invariant(
                        "package already contains a library chunk",
                    ));
                }
            }
            other => {
                return Err(StreamError::UnexpectedChild {
                    code: other.type_code(),
                    offset: 0,
                    container: "package",
                })
            }
        }
        let tag = self
            .children
            .iter()
            .map(|(tag, _)| *tag)
            .max()
            .unwrap_or(0)
            + 1;
        self.children.push((tag, chunk));
        Ok(())
    }

    /// Deletes the given keys from the key string pool, rewrites every
    /// entry's key index through the returned remap, drops entries whose key
    /// was deleted, removes type chunks left with no entries, and removes a
    /// type spec once no type chunk shares its id. Returns the number of
    /// type chunks removed.
    pub fn delete_key_strings(&mut self, keys: &BTreeSet<usize>) -> StreamResult<usize> {
        let key_offset = self.key_strings_offset;
        let remap = self
            .pool_at_mut(key_offset)
            .ok_or_else(|| StreamError::invariant("package has no key string pool"))?
            .delete_strings(keys)?;

        let mut delete_positions = Vec::new();
        let mut deleted_ids = Vec::new();
        for (position, (_, child)) in self.children.iter_mut().enumerate() {
            let Chunk::Type(type_chunk) = child else {
                continue;
            };
            let mut all_deleted = true;
            let mut replacements: BTreeMap<u16, Option<TypeEntry>> = BTreeMap::new();
            for (&index, entry) in type_chunk.entries() {
                let old = entry.key_index as usize;
                let new = *remap.get(old).ok_or_else(|| {
                    StreamError::invariant(format!("entry key index {old} is outside the key pool"))
                })?;
                all_deleted = all_deleted && new == -1;
                replacements.insert(
                    index,
                    if new == -1 {
                        None
                    } else {
                        Some(entry.clone().with_key_index(new as u32))
                    },
                );
            }
            type_chunk.override_entries(replacements);
            if all_deleted {
                delete_positions.push(position);
                deleted_ids.push(type_chunk.id());
            }
        }

        for position in delete_positions.iter().rev() {
            self.children.remove(*position);
        }
        deleted_ids.sort_unstable();
        deleted_ids.dedup();
        for id in deleted_ids {
            if self.type_chunks_with_id(id).next().is_some() {
                continue;
            }
            let spec_position = self
                .children
                .iter()
                .position(|(_, c)| matches!(c, Chunk::TypeSpec(spec) if spec.id() == id))
                .ok_or_else(|| {
                    StreamError::invariant(format!("no type spec found for type id {id}"))
                })?;
            self.children.remove(spec_position);
        }

        debug!(
            "deleted {} type chunks from package {}",
            delete_positions.len(),
            self.package_name
        );
        Ok(delete_positions.len())
    }

    pub(crate) fn remap_string_values(&mut self, remap: &[i32]) -> StreamResult<()> {
        for type_chunk in self.type_chunks_mut() {
            for entry in type_chunk.entries_mut().values_mut() {
                if entry.is_complex() {
                    for (_, value) in entry.values.iter_mut() {
                        remap_string_value(value, remap)?;
                    }
                } else if let Some(value) = entry.value.as_mut() {
                    remap_string_value(value, remap)?;
                }
            }
        }
        Ok(())
    }
}

/// Rewrites one string-typed value through a pool remap. A value whose
/// string was deleted becomes the null value; the entry keeps its slot
/// because a sibling configuration may depend on the index existing.
fn remap_string_value(value: &mut ResourceValue, remap: &[i32]) -> StreamResult<()> {
    if value.value_type != ValueType::String {
        return Ok(());
    }
    let old = value.data as usize;
    let new = *remap.get(old).ok_or_else(|| {
        StreamError::invariant(format!("string value index {old} is outside the pool"))
    })?;
    if new < 0 {
        *value = ResourceValue::null();
    } else {
        value.data = new as u32;
    }
    Ok(())
}

impl ChunkBody for PackageChunk {
    fn header_size(&self) -> u16 {
        self.header_size
    }

    fn write_header(&self, out: &mut Writer) -> StreamResult<()> {
        out.u32(self.id);
        write_package_name(out, &self.package_name)?;
        out.u32(0); // type strings offset, patched once the payload lands
        out.u32(self.last_public_type);
        out.u32(0); // key strings offset, patched once the payload lands
        out.u32(self.last_public_key);
        out.u32(self.type_id_offset);
        Ok(())
    }

    fn write_payload(
        &self,
        out: &mut Writer,
        header: &mut Writer,
        options: SerializeFlags,
    ) -> StreamResult<()> {
        let mut type_offset = 0u32;
        let mut key_offset = 0u32;
        let mut payload_offset = 0usize;
        for (tag, child) in &self.children {
            if *tag == self.type_strings_offset {
                type_offset = self.header_size as u32 + payload_offset as u32;
            }
            if *tag == self.key_strings_offset {
                key_offset = self.header_size as u32 + payload_offset as u32;
            }
            let bytes = child.to_bytes(options)?;
            out.bytes(&bytes);
            out.pad4();
            payload_offset = out.len();
        }
        header.patch_u32(TYPE_OFFSET_OFFSET, type_offset);
        header.patch_u32(KEY_OFFSET_OFFSET, key_offset);
        Ok(())
    }
}

/// The root of a `resources.arsc`: the global value string pool followed by
/// one or more packages.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceTableChunk {
    header_size: u16,
    original_size: u32,
    children: Vec<Chunk>,
}

impl ResourceTableChunk {
    pub const HEADER_SIZE: u16 = 12;

    pub fn new(string_pool: StringPoolChunk) -> Self {
        Self {
            header_size: Self::HEADER_SIZE,
            original_size: 0,
            children: vec![Chunk::StringPool(string_pool)],
        }
    }

    pub(crate) fn parse(r: &mut Reader, header: &ChunkHeader) -> StreamResult<Self> {
        let package_count = r.u32()?;
        if package_count < 1 {
            return Err(StreamError::malformed(
                header.offset,
                "resource table declares no packages",
            ));
        }

        r.seek(header.offset + header.header_size as u64)?;
        let children: Vec<Chunk> = parse_children(r, header.end(), "resource table")?
            .into_iter()
            .map(|(offset, chunk)| match &chunk {
                Chunk::StringPool(_) | Chunk::Package(_) | Chunk::Unknown(_) => Ok(chunk),
                other => Err(StreamError::UnexpectedChild {
                    code: other.type_code(),
                    offset,
                    container: "resource table",
                }),
            })
            .collect::<StreamResult<_>>()?;

        if !children.iter().any(|c| matches!(c, Chunk::StringPool(_))) {
            return Err(StreamError::malformed(
                header.offset,
                "resource table has no value string pool",
            ));
        }

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

    /// The pool holding every string value in the table.
    pub fn string_pool(&self) -> Option<&StringPoolChunk> {
        self.children.iter().find_map(Chunk::as_string_pool)
    }

    pub fn string_pool_mut(&mut self) -> Option<&mut StringPoolChunk> {
        self.children.iter_mut().find_map(|c| match c {
            Chunk::StringPool(pool) => Some(pool),
            _ => None,
        })
    }

    pub fn packages(&self) -> impl Iterator<Item = &PackageChunk> {
        self.children.iter().filter_map(|c| match c {
            Chunk::Package(package) => Some(package),
            _ => None,
        })
    }

    pub fn packages_mut(&mut self) -> impl Iterator<Item = &mut PackageChunk> {
        self.children.iter_mut().filter_map(|c| match c {
            Chunk::Package(package) => Some(package),
            _ => None,
        })
    }

    /// The package with the given name, if any.
    pub fn package(&self, package_name: &str) -> Option<&PackageChunk> {
        self.packages().find(|p| p.package_name() == package_name)
    }

    pub fn package_mut(&mut self, package_name: &str) -> Option<&mut PackageChunk> {
        self.packages_mut()
            .find(|p| p.package_name() == package_name)
    }

    pub fn add_package(&mut self, package: PackageChunk) {
        self.children.push(Chunk::Package(package));
    }

    /// Resolves a packed identifier to its entry in the first type chunk
    /// that holds it (the default configuration's chunk comes first).
    pub fn lookup(&self, id: ResourceIdentifier) -> Option<&TypeEntry> {
        let package = self.packages().find(|p| p.id() == id.package_id as u32)?;
        package
            .type_chunks_with_id(id.type_id)
            .find_map(|chunk| chunk.entries().get(&id.entry_id))
    }

    /// Deletes the given indexes from the global string pool and rewrites
    /// every string-typed value in every entry of every package through the
    /// remap. Simple entries whose string was deleted become null entries;
    /// complex entries have each sub-value rewritten independently. Returns
    /// the remap.
    pub fn delete_strings(&mut self, indexes: &BTreeSet<usize>) -> StreamResult<Vec<i32>> {
        let mut remap = None;
        for child in &mut self.children {
            if let Chunk::StringPool(pool) = child {
                remap = Some(pool.delete_strings(indexes)?);
                break;
            }
        }
        let remap =
            remap.ok_or_else(|| StreamError::invariant("resource table has no string pool"))?;
        for child in &mut self.children {
            if let Chunk::Package(package) = child {
                package.remap_string_values(&remap)?;
            }
        }
        Ok(remap)
    }
}

impl ChunkBody for ResourceTableChunk {
    fn header_size(&self) -> u16 {
        self.header_size
    }

    fn write_header(&self, out: &mut Writer) -> StreamResult<()> {
        out.u32(self.packages().count() as u32);
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
