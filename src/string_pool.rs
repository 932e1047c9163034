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

//! The string pool chunk and the pool's string codec.
//!
//! A pool is an array of UTF-8 or UTF-16 strings plus an optional parallel
//! array of style records. On disk the chunk holds per-string and per-style
//! offset tables followed by the packed string data and the packed style
//! data. Offsets may overlap: aapt shares the bytes of equal strings, and a
//! pool whose original offsets were not strictly increasing is remembered as
//! "originally deduplicated" so re-emission dedups again even under the
//! default options.

use std::collections::{BTreeSet, HashMap};

use log::debug;

use crate::defs::{ChunkBody, ChunkHeader, SerializeFlags};
use crate::stream::{Reader, StreamError, StreamResult, Writer};

/// Flag bit: the string index is sorted by string value.
const SORTED_FLAG: u32 = 1 << 0;

/// Flag bit: strings are encoded in UTF-8 rather than UTF-16.
const UTF8_FLAG: u32 = 1 << 8;

/// Offset from the chunk start of the styles-start header field, patched
/// after the payload is laid out.
const STYLE_START_OFFSET: usize = 24;

/// Sentinel terminating a span array, and written twice after the last
/// style to match the on-device format.
pub const SPAN_END: u32 = 0xFFFF_FFFF;

/// The encoding of every string in a pool, selected by the pool's flag word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringEncoding {
    Utf8,
    Utf16,
}

/// A typed range within a styled string: the name of the span tag and the
/// inclusive first and last UTF-16 code units it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StringPoolSpan {
    /// Index into the same pool of the string naming the span tag.
    pub name_index: u32,
    pub start: u32,
    pub stop: u32,
}

impl StringPoolSpan {
    /// The serialized length of a span in bytes.
    pub const SIZE: usize = 12;
}

/// All of the spans styling one string. Styles sit in a vector parallel to
/// the strings; `styles[3]` styles `strings[3]`. There are never more styles
/// than strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StringPoolStyle {
    pub spans: Vec<StringPoolSpan>,
}

impl StringPoolStyle {
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Writer::new();
        for span in &self.spans {
            out.u32(span.name_index);
            out.u32(span.start);
            out.u32(span.stop);
        }
        out.u32(SPAN_END);
        out.into_bytes()
    }
}

/// A deduplicated, optionally styled string pool chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct StringPoolChunk {
    header_size: u16,
    original_size: u32,
    flags: u32,
    strings: Vec<String>,
    styles: Vec<StringPoolStyle>,
    /// Set while decoding when the original offsets were not strictly
    /// increasing, i.e. the pool shared string bytes. Such a pool re-emits
    /// deduplicated even without `SHRINK`, or the round trip would grow it.
    always_dedup: bool,
}

impl StringPoolChunk {
    /// Size of the pool header: metadata plus the five header words.
    pub const HEADER_SIZE: u16 = 28;

    pub fn new(utf8: bool, sorted: bool) -> Self {
        let mut flags = 0;
        if utf8 {
            flags |= UTF8_FLAG;
        }
        if sorted {
            flags |= SORTED_FLAG;
        }
        Self {
            header_size: Self::HEADER_SIZE,
            original_size: 0,
            flags,
            strings: Vec::new(),
            styles: Vec::new(),
            always_dedup: false,
        }
    }

    pub(crate) fn parse(r: &mut Reader, header: &ChunkHeader) -> StreamResult<Self> {
        let string_count = r.u32()?;
        let style_count = r.u32()?;
        let flags = r.u32()?;
        let strings_start = r.u32()?;
        let styles_start = r.u32()?;

        let mut string_offsets = Vec::with_capacity(string_count as usize);
        for _ in 0..string_count {
            string_offsets.push(r.u32()?);
        }
        let mut style_offsets = Vec::with_capacity(style_count as usize);
        for _ in 0..style_count {
            style_offsets.push(r.u32()?);
        }

        let encoding = if flags & UTF8_FLAG != 0 {
            StringEncoding::Utf8
        } else {
            StringEncoding::Utf16
        };
        let chunk_end = header.end();

        let mut strings = Vec::with_capacity(string_count as usize);
        let mut always_dedup = false;
        let mut previous: i64 = -1;
        let string_base = header.offset + strings_start as u64;
        for offset in string_offsets {
            let target = string_base + offset as u64;
            if target >= chunk_end {
                return Err(StreamError::malformed(
                    target,
                    format!("string offset {offset:#x} points past the pool's end at {chunk_end:#x}"),
                ));
            }
            if target as i64 <= previous {
                always_dedup = true;
            }
            previous = target as i64;
            r.seek(target)?;
            strings.push(decode_string(r, encoding)?);
        }

        let mut styles = Vec::with_capacity(style_count as usize);
        let style_base = header.offset + styles_start as u64;
        for offset in style_offsets {
            let target = style_base + offset as u64;
            if target >= chunk_end {
                return Err(StreamError::malformed(
                    target,
                    format!("style offset {offset:#x} points past the pool's end at {chunk_end:#x}"),
                ));
            }
            r.seek(target)?;
            let mut spans = Vec::new();
            loop {
                let name_index = r.u32()?;
                if name_index == SPAN_END {
                    break;
                }
                spans.push(StringPoolSpan {
                    name_index,
                    start: r.u32()?,
                    stop: r.u32()?,
                });
            }
            styles.push(StringPoolStyle { spans });
        }

        Ok(Self {
            header_size: header.header_size,
            original_size: header.size,
            flags,
            strings,
            styles,
            always_dedup,
        })
    }

    /// The size of this chunk when it was parsed. A chunk's size can
    /// deviate from this once its data is modified; constructed chunks
    /// report 0.
    pub fn original_size(&self) -> u32 {
        self.original_size
    }

    pub fn is_utf8(&self) -> bool {
        self.flags & UTF8_FLAG != 0
    }

    pub fn is_sorted(&self) -> bool {
        self.flags & SORTED_FLAG != 0
    }

    pub fn encoding(&self) -> StringEncoding {
        if self.is_utf8() {
            StringEncoding::Utf8
        } else {
            StringEncoding::Utf16
        }
    }

    /// True if the original offsets showed shared string bytes.
    pub fn always_dedup(&self) -> bool {
        self.always_dedup
    }

    /// Forces (or clears) deduplication on re-emission regardless of options.
    pub fn set_always_dedup(&mut self, always_dedup: bool) {
        self.always_dedup = always_dedup;
    }

    pub fn string_count(&self) -> usize {
        self.strings.len()
    }

    pub fn string(&self, index: usize) -> Option<&str> {
        self.strings.get(index).map(String::as_str)
    }

    pub fn strings(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(String::as_str)
    }

    /// The 0-based index of the first occurrence of `string`, if present.
    /// Runs in O(n).
    pub fn index_of(&self, string: &str) -> Option<usize> {
        self.strings.iter().position(|s| s == string)
    }

    /// Appends a string and returns its new index.
    pub fn add_string(&mut self, value: impl Into<String>) -> usize {
        self.strings.push(value.into());
        self.strings.len() - 1
    }

    /// Replaces the string at `index` in place; indices stay stable.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn set_string(&mut self, index: usize, value: impl Into<String>) {
        self.strings[index] = value.into();
    }

    pub fn style_count(&self) -> usize {
        self.styles.len()
    }

    pub fn style(&self, index: usize) -> Option<&StringPoolStyle> {
        self.styles.get(index)
    }

    pub fn styles(&self) -> &[StringPoolStyle] {
        &self.styles
    }

    /// Appends a style record for the string at the same ordinal.
    pub fn add_style(&mut self, style: StringPoolStyle) {
        self.styles.push(style);
    }

    /// Deletes the strings at the given 0-based indexes, along with their
    /// styles. A string that a surviving style's span still names is
    /// protected and survives. Returns the remap array: element `i` is the
    /// new index of the string previously at `i`, or -1 if it was deleted.
    ///
    /// Every consumer holding indices into this pool must apply the remap
    /// before reading the pool again.
    pub fn delete_strings(&mut self, indexes: &BTreeSet<usize>) -> StreamResult<Vec<i32>> {
        let previous_string_count = self.strings.len();
        let previous_style_count = self.styles.len();
        for &index in indexes {
            if index >= previous_string_count {
                return Err(StreamError::invariant(format!(
                    "cannot delete string {index}: pool holds {previous_string_count} strings"
                )));
            }
        }

        let mut to_delete = indexes.clone();
        self.protect_referenced_names(&mut to_delete);

        let mut remap = vec![0i32; previous_string_count];
        let mut new_strings = Vec::with_capacity(previous_string_count - to_delete.len());
        let mut new_styles = Vec::new();
        let mut deleted_so_far = 0usize;
        for i in 0..previous_string_count {
            if to_delete.contains(&i) {
                remap[i] = -1;
                deleted_so_far += 1;
                continue;
            }
            remap[i] = (i - deleted_so_far) as i32;
            new_strings.push(self.strings[i].clone());
            if i < previous_style_count {
                new_styles.push(self.styles[i].clone());
            }
        }

        self.strings = new_strings;
        self.styles = fix_up_styles(new_styles, &remap)?;
        debug!(
            "deleted {} of {} pool strings",
            deleted_so_far, previous_string_count
        );
        Ok(remap)
    }

    /// Removes from `to_delete` any index that a surviving style's span
    /// names. String A's style may name string B as its tag; deleting B
    /// would leave a dangling reference from A.
    fn protect_referenced_names(&self, to_delete: &mut BTreeSet<usize>) {
        let mut to_save = Vec::new();
        for (i, style) in self.styles.iter().enumerate() {
            if to_delete.contains(&i) {
                // The style dies with its string; its spans don't matter.
                continue;
            }
            for span in &style.spans {
                if to_delete.contains(&(span.name_index as usize)) {
                    to_save.push(span.name_index as usize);
                }
            }
        }
        for index in to_save {
            to_delete.remove(&index);
        }
    }

    fn offset_table_size(&self) -> usize {
        (self.strings.len() + self.styles.len()) * 4
    }

    fn write_strings(
        &self,
        offsets: &mut Writer,
        data: &mut Writer,
        options: SerializeFlags,
    ) -> StreamResult<u32> {
        let should_dedup = options.contains(SerializeFlags::SHRINK) || self.always_dedup;
        let mut used: HashMap<&str, u32> = HashMap::new();
        let mut string_offset = 0u32;
        for string in &self.strings {
            if should_dedup {
                if let Some(&offset) = used.get(string.as_str()) {
                    offsets.u32(offset);
                    continue;
                }
            }
            let encoded = encode_string(string, self.encoding())?;
            data.bytes(&encoded);
            used.insert(string.as_str(), string_offset);
            offsets.u32(string_offset);
            string_offset += encoded.len() as u32;
        }
        data.pad4();
        Ok(data.len() as u32)
    }

    fn write_styles(&self, offsets: &mut Writer, data: &mut Writer, options: SerializeFlags) {
        if self.styles.is_empty() {
            return;
        }
        let should_dedup = options.contains(SerializeFlags::SHRINK) || self.always_dedup;
        let mut used: HashMap<&StringPoolStyle, u32> = HashMap::new();
        let mut style_offset = 0u32;
        for style in &self.styles {
            if should_dedup {
                if let Some(&offset) = used.get(style) {
                    offsets.u32(offset);
                    continue;
                }
            }
            let encoded = style.to_bytes();
            data.bytes(&encoded);
            used.insert(style, style_offset);
            offsets.u32(style_offset);
            style_offset += encoded.len() as u32;
        }
        // The span stream ends with one more sentinel, then a second one
        // that the on-device format carries without an evident purpose.
        data.u32(SPAN_END);
        data.u32(SPAN_END);
        data.pad4();
    }
}

impl ChunkBody for StringPoolChunk {
    fn header_size(&self) -> u16 {
        self.header_size
    }

    fn write_header(&self, out: &mut Writer) -> StreamResult<()> {
        if self.styles.len() > self.strings.len() {
            return Err(StreamError::invariant(format!(
                "pool has {} styles but only {} strings",
                self.styles.len(),
                self.strings.len()
            )));
        }
        out.u32(self.strings.len() as u32);
        out.u32(self.styles.len() as u32);
        out.u32(self.flags);
        // aapt writes strings-start as header + offset table even for an
        // empty pool; only styles-start is zero when absent.
        out.u32(self.header_size as u32 + self.offset_table_size() as u32);
        out.u32(0);
        Ok(())
    }

    fn write_payload(
        &self,
        out: &mut Writer,
        header: &mut Writer,
        options: SerializeFlags,
    ) -> StreamResult<()> {
        let mut offsets = Writer::new();
        let mut data = Writer::new();

        let string_data_len = self.write_strings(&mut offsets, &mut data, options)?;
        self.write_styles(&mut offsets, &mut data, options);

        out.bytes(&offsets.into_bytes());
        out.bytes(&data.into_bytes());

        if !self.styles.is_empty() {
            header.patch_u32(
                STYLE_START_OFFSET,
                self.header_size as u32 + self.offset_table_size() as u32 + string_data_len,
            );
        }
        Ok(())
    }
}

/// Rewrites every span's name index through the remap. The deletion
/// protection pass guarantees no surviving span names a deleted string; a
/// negative remap surviving to this point means the pool state is corrupt.
fn fix_up_styles(styles: Vec<StringPoolStyle>, remap: &[i32]) -> StreamResult<Vec<StringPoolStyle>> {
    let mut result = Vec::with_capacity(styles.len());
    for style in styles {
        let mut spans = Vec::with_capacity(style.spans.len());
        for span in style.spans {
            let new_index = *remap.get(span.name_index as usize).ok_or_else(|| {
                StreamError::invariant(format!(
                    "span name index {} is outside the pool",
                    span.name_index
                ))
            })?;
            if new_index < 0 {
                return Err(StreamError::invariant(format!(
                    "span name index {} survived deletion of its string",
                    span.name_index
                )));
            }
            spans.push(StringPoolSpan {
                name_index: new_index as u32,
                ..span
            });
        }
        result.push(StringPoolStyle { spans });
    }
    Ok(result)
}

/// Encodes a string the way a pool of the given encoding stores it:
/// length prefix(es), encoded bytes, terminator.
///
/// UTF-8 strings carry two packed prefixes, the UTF-16 code unit count and
/// the encoded byte count, each one byte below 0x80 and two bytes up to
/// 0x7FFF. UTF-16 strings carry the code unit count as one 16-bit word, or
/// two words with the high bit set for counts of 0x8000 and above.
pub fn encode_string(s: &str, encoding: StringEncoding) -> StreamResult<Vec<u8>> {
    let mut out = Writer::new();
    match encoding {
        StringEncoding::Utf8 => {
            let character_count = s.encode_utf16().count();
            encode_length8(&mut out, character_count)?;
            encode_length8(&mut out, s.len())?;
            out.bytes(s.as_bytes());
            out.u8(0);
        }
        StringEncoding::Utf16 => {
            let units: Vec<u16> = s.encode_utf16().collect();
            encode_length16(&mut out, units.len());
            for unit in &units {
                out.u16(*unit);
            }
            out.u16(0);
        }
    }
    Ok(out.into_bytes())
}

/// Decodes one pool string at the reader's current position.
pub fn decode_string(r: &mut Reader, encoding: StringEncoding) -> StreamResult<String> {
    match encoding {
        StringEncoding::Utf8 => {
            let character_count = decode_length8(r)?;
            let _byte_count = decode_length8(r)?;
            decode_modified_utf8(r, character_count)
        }
        StringEncoding::Utf16 => {
            let start = r.pos();
            let unit_count = decode_length16(r)?;
            let mut units = Vec::with_capacity(unit_count as usize);
            for _ in 0..unit_count {
                units.push(r.u16()?);
            }
            String::from_utf16(&units)
                .map_err(|_| StreamError::malformed(start, "invalid UTF-16 string data"))
        }
    }
}

fn encode_length8(out: &mut Writer, length: usize) -> StreamResult<()> {
    if length > 0x7FFF {
        return Err(StreamError::invariant(format!(
            "string length {length} exceeds the UTF-8 pool maximum of 0x7fff"
        )));
    }
    if length > 0x7F {
        out.u8(((length >> 8) as u8) | 0x80);
        out.u8(length as u8);
    } else {
        out.u8(length as u8);
    }
    Ok(())
}

fn encode_length16(out: &mut Writer, length: usize) {
    if length > 0x7FFF {
        out.u16(((length >> 16) as u16) | 0x8000);
        out.u16(length as u16);
    } else {
        out.u16(length as u16);
    }
}

fn decode_length8(r: &mut Reader) -> StreamResult<u32> {
    let first = r.u8()? as u32;
    if first & 0x80 != 0 {
        Ok(((first & 0x7F) << 8) | r.u8()? as u32)
    } else {
        Ok(first)
    }
}

fn decode_length16(r: &mut Reader) -> StreamResult<u32> {
    let first = r.u16()? as u32;
    if first & 0x8000 != 0 {
        Ok(((first & 0x7FFF) << 16) | r.u16()? as u32)
    } else {
        Ok(first)
    }
}

/// Decodes modified UTF-8 into a string of `character_count` UTF-16 code
/// units. Handles both standard 4-byte sequences and the surrogate-half
/// 3-byte sequences Android's runtime produces: a 4-byte code point is
/// split into two units via `(cp >> 10) + 0xD7C0` and
/// `(cp & 0x3FF) + 0xDC00`.
fn decode_modified_utf8(r: &mut Reader, character_count: u32) -> StreamResult<String> {
    let start = r.pos();
    let mut units: Vec<u16> = Vec::with_capacity(character_count as usize);
    while (units.len() as u32) < character_count {
        let one = r.u8()?;
        if one & 0x80 == 0 {
            units.push(one as u16);
            continue;
        }
        let two = r.u8()?;
        if one & 0x20 == 0 {
            units.push((((one & 0x1F) as u16) << 6) | (two & 0x3F) as u16);
            continue;
        }
        let three = r.u8()?;
        if one & 0x10 == 0 {
            units.push(
                (((one & 0x0F) as u16) << 12)
                    | (((two & 0x3F) as u16) << 6)
                    | (three & 0x3F) as u16,
            );
            continue;
        }
        let four = r.u8()?;
        let code_point = (((one & 0x0F) as u32) << 18)
            | (((two & 0x3F) as u32) << 12)
            | (((three & 0x3F) as u32) << 6)
            | (four & 0x3F) as u32;
        units.push(((code_point >> 10) + 0xD7C0) as u16);
        units.push(((code_point & 0x03FF) + 0xDC00) as u16);
    }
    if units.len() as u32 != character_count {
        return Err(StreamError::malformed(
            start,
            "modified UTF-8 data does not line up with its declared character count",
        ));
    }
    String::from_utf16(&units)
        .map_err(|_| StreamError::malformed(start, "invalid surrogate data in modified UTF-8"))
}

impl Default for StringPoolChunk {
    fn default() -> Self {
        Self::new(false, false)
    }
}
