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

use std::collections::BTreeSet;

use resarc::stream::Reader;
use resarc::string_pool::{
    decode_string, encode_string, StringEncoding, StringPoolChunk, StringPoolSpan, StringPoolStyle,
};
use resarc::{Chunk, SerializeFlags};

/// Chosen because its encoded byte length differs from its character length.
const TEST_STRING: &str = "ābĉ123";

const UTF8_STRING: &[u8] = &[
    0x06, 0x08, // 6 characters; 8 bytes
    0xC4, 0x81, 0x62, 0xC4, 0x89, 0x31, 0x32, 0x33, // ābĉ123
    0x00, // null terminator
];

const UTF16_STRING: &[u8] = &[
    0x06, 0x00, // length in code units
    0x01, 0x01, 0x62, 0x00, 0x09, 0x01, 0x31, 0x00, 0x32, 0x00, 0x33, 0x00, // ābĉ123
    0x00, 0x00, // null terminator
];

#[test]
fn encode_utf8_string() {
    assert_eq!(
        encode_string(TEST_STRING, StringEncoding::Utf8).unwrap(),
        UTF8_STRING
    );
}

#[test]
fn encode_utf16_string() {
    assert_eq!(
        encode_string(TEST_STRING, StringEncoding::Utf16).unwrap(),
        UTF16_STRING
    );
}

#[test]
fn decode_utf8_string() {
    let mut r = Reader::new(UTF8_STRING);
    assert_eq!(
        decode_string(&mut r, StringEncoding::Utf8).unwrap(),
        TEST_STRING
    );
}

#[test]
fn decode_utf16_string() {
    let mut r = Reader::new(UTF16_STRING);
    assert_eq!(
        decode_string(&mut r, StringEncoding::Utf16).unwrap(),
        TEST_STRING
    );
}

#[test]
fn utf8_length_byte_prefix() {
    // 255 characters need the two-byte form of both prefixes.
    let s = "a".repeat(0xFF);
    let encoded = encode_string(&s, StringEncoding::Utf8).unwrap();
    assert_eq!(&encoded[..4], &[0x80, 0xFF, 0x80, 0xFF]);
    let mut r = Reader::new(&encoded);
    assert_eq!(decode_string(&mut r, StringEncoding::Utf8).unwrap(), s);
}

#[test]
fn utf16_length_byte_prefix() {
    let s = "a".repeat(0xFF);
    let encoded = encode_string(&s, StringEncoding::Utf16).unwrap();
    assert_eq!(&encoded[..2], &[0xFF, 0x00]);
    let mut r = Reader::new(&encoded);
    assert_eq!(decode_string(&mut r, StringEncoding::Utf16).unwrap(), s);
}

#[test]
fn utf16_length_word_prefix() {
    let s = "a".repeat(0xFFFF);
    let encoded = encode_string(&s, StringEncoding::Utf16).unwrap();
    assert_eq!(&encoded[..4], &[0x00, 0x80, 0xFF, 0xFF]);
    let mut r = Reader::new(&encoded);
    assert_eq!(decode_string(&mut r, StringEncoding::Utf16).unwrap(), s);
}

#[test]
fn decode_is_inverse_of_encode_at_boundary_lengths() {
    for length in [0usize, 1, 127, 128, 255, 32767] {
        let s = "x".repeat(length);
        let utf8 = encode_string(&s, StringEncoding::Utf8).unwrap();
        assert_eq!(
            decode_string(&mut Reader::new(&utf8), StringEncoding::Utf8).unwrap(),
            s,
            "utf8 length {length}"
        );
    }
    for length in [0usize, 1, 127, 128, 255, 32767, 32768, 65535] {
        let s = "x".repeat(length);
        let utf16 = encode_string(&s, StringEncoding::Utf16).unwrap();
        assert_eq!(
            decode_string(&mut Reader::new(&utf16), StringEncoding::Utf16).unwrap(),
            s,
            "utf16 length {length}"
        );
    }
}

#[test]
fn utf8_rejects_lengths_past_0x7fff() {
    let s = "x".repeat(0x8000);
    assert!(encode_string(&s, StringEncoding::Utf8).is_err());
}

#[test]
fn decode_modified_utf8_surrogate_pair() {
    // U+10400 as two 3-byte surrogate halves (CESU-8), as Android's runtime
    // writes non-BMP code points.
    let data = [
        0x02, 0x06, // 2 code units, 6 bytes
        0xED, 0xA0, 0x81, 0xED, 0xB0, 0x80, // D801 DC00
        0x00,
    ];
    let mut r = Reader::new(&data);
    assert_eq!(
        decode_string(&mut r, StringEncoding::Utf8).unwrap(),
        "\u{10400}"
    );
}

/// A UTF-8 pool of ["a", "b", "a"] whose third offset reuses the first
/// string's bytes, as aapt emits deduplicated pools.
const DEDUPED_POOL: &[u8] = &[
    0x01, 0x00, 0x1C, 0x00, 0x30, 0x00, 0x00, 0x00, // string pool, header 28, size 48
    0x03, 0x00, 0x00, 0x00, // string count
    0x00, 0x00, 0x00, 0x00, // style count
    0x00, 0x01, 0x00, 0x00, // flags: UTF-8
    0x28, 0x00, 0x00, 0x00, // strings start
    0x00, 0x00, 0x00, 0x00, // styles start
    0x00, 0x00, 0x00, 0x00, // offset of "a"
    0x04, 0x00, 0x00, 0x00, // offset of "b"
    0x00, 0x00, 0x00, 0x00, // offset of "a" again
    0x01, 0x01, 0x61, 0x00, // "a"
    0x01, 0x01, 0x62, 0x00, // "b"
];

#[test]
fn parse_deduplicated_pool() {
    let mut r = Reader::new(DEDUPED_POOL);
    let chunk = Chunk::parse(&mut r).unwrap();
    let pool = chunk.as_string_pool().unwrap();
    assert!(pool.is_utf8());
    assert!(pool.always_dedup());
    assert_eq!(
        pool.strings().collect::<Vec<_>>(),
        vec!["a", "b", "a"]
    );
}

#[test]
fn deduplicated_pool_round_trips_under_default_options() {
    let mut r = Reader::new(DEDUPED_POOL);
    let chunk = Chunk::parse(&mut r).unwrap();
    let out = chunk.to_bytes(SerializeFlags::empty()).unwrap();
    assert_eq!(out, DEDUPED_POOL);
}

/// The same strings without sharing: repeats keep their own bytes and must
/// stay duplicated under the default options.
const PLAIN_POOL: &[u8] = &[
    0x01, 0x00, 0x1C, 0x00, 0x2C, 0x00, 0x00, 0x00, // string pool, header 28, size 44
    0x02, 0x00, 0x00, 0x00, // string count
    0x00, 0x00, 0x00, 0x00, // style count
    0x00, 0x01, 0x00, 0x00, // flags: UTF-8
    0x24, 0x00, 0x00, 0x00, // strings start
    0x00, 0x00, 0x00, 0x00, // styles start
    0x00, 0x00, 0x00, 0x00, // offset of first "a"
    0x04, 0x00, 0x00, 0x00, // offset of second "a"
    0x01, 0x01, 0x61, 0x00, // "a"
    0x01, 0x01, 0x61, 0x00, // "a" again
];

#[test]
fn undeduplicated_pool_round_trips_without_shrinking() {
    let mut r = Reader::new(PLAIN_POOL);
    let chunk = Chunk::parse(&mut r).unwrap();
    assert!(!chunk.as_string_pool().unwrap().always_dedup());
    let out = chunk.to_bytes(SerializeFlags::empty()).unwrap();
    assert_eq!(out, PLAIN_POOL);
}

#[test]
fn shrink_deduplicates_repeated_strings() {
    let mut r = Reader::new(PLAIN_POOL);
    let chunk = Chunk::parse(&mut r).unwrap();
    let out = chunk.to_bytes(SerializeFlags::SHRINK).unwrap();
    assert!(out.len() < PLAIN_POOL.len());

    let reparsed = Chunk::parse(&mut Reader::new(&out)).unwrap();
    let pool = reparsed.as_string_pool().unwrap();
    assert_eq!(pool.strings().collect::<Vec<_>>(), vec!["a", "a"]);
    assert!(pool.always_dedup());
}

fn styled_pool() -> StringPoolChunk {
    let mut pool = StringPoolChunk::new(true, false);
    pool.add_string("styled text");
    pool.add_string("plain");
    pool.add_string("b");
    pool.add_style(StringPoolStyle {
        spans: vec![StringPoolSpan {
            name_index: 2,
            start: 0,
            stop: 5,
        }],
    });
    pool
}

#[test]
fn styled_pool_round_trips() {
    let pool = styled_pool();
    let bytes = Chunk::StringPool(pool.clone())
        .to_bytes(SerializeFlags::empty())
        .unwrap();

    let reparsed = Chunk::parse(&mut Reader::new(&bytes)).unwrap();
    let parsed = reparsed.as_string_pool().unwrap();
    assert_eq!(parsed.strings().collect::<Vec<_>>(), vec!["styled text", "plain", "b"]);
    assert_eq!(parsed.styles(), pool.styles());

    let again = reparsed.to_bytes(SerializeFlags::empty()).unwrap();
    assert_eq!(again, bytes);
}

#[test]
fn style_data_ends_with_two_sentinels() {
    let bytes = Chunk::StringPool(styled_pool())
        .to_bytes(SerializeFlags::empty())
        .unwrap();
    let end = bytes.len();
    assert_eq!(&bytes[end - 8..], &[0xFF; 8]);
}

#[test]
fn delete_strings_returns_remap_and_compacts() {
    let mut pool = StringPoolChunk::new(false, false);
    for s in ["keep0", "drop1", "keep2", "drop3", "keep4"] {
        pool.add_string(s);
    }
    let remap = pool
        .delete_strings(&BTreeSet::from([1usize, 3]))
        .unwrap();
    assert_eq!(remap, vec![0, -1, 1, -1, 2]);
    assert_eq!(
        pool.strings().collect::<Vec<_>>(),
        vec!["keep0", "keep2", "keep4"]
    );
}

#[test]
fn delete_strings_protects_span_name_targets() {
    let mut pool = styled_pool();
    // Index 2 is the tag name of the surviving style on index 0, so asking
    // to delete it must leave it alone; index 1 really goes away.
    let remap = pool.delete_strings(&BTreeSet::from([1usize, 2])).unwrap();
    assert_eq!(remap, vec![0, -1, 1]);
    assert_eq!(
        pool.strings().collect::<Vec<_>>(),
        vec!["styled text", "b"]
    );
    assert_eq!(pool.style(0).unwrap().spans[0].name_index, 1);
}

#[test]
fn delete_strings_drops_style_with_its_string() {
    let mut pool = styled_pool();
    let remap = pool.delete_strings(&BTreeSet::from([0usize])).unwrap();
    assert_eq!(remap, vec![-1, 0, 1]);
    assert_eq!(pool.style_count(), 0);
    assert_eq!(pool.strings().collect::<Vec<_>>(), vec!["plain", "b"]);
}

#[test]
fn empty_pool_still_declares_strings_start() {
    let bytes = Chunk::StringPool(StringPoolChunk::new(false, false))
        .to_bytes(SerializeFlags::empty())
        .unwrap();
    assert_eq!(bytes.len(), 28);
    // strings-start is header-size even with no strings; styles-start is 0.
    assert_eq!(&bytes[20..24], &28u32.to_le_bytes());
    assert_eq!(&bytes[24..28], &0u32.to_le_bytes());
}

#[test]
fn pool_flag_bits() {
    let pool = StringPoolChunk::new(false, false);
    assert!(!pool.is_utf8());
    assert!(!pool.is_sorted());

    let pool = StringPoolChunk::new(true, false);
    assert!(pool.is_utf8());
    assert!(!pool.is_sorted());

    let pool = StringPoolChunk::new(false, true);
    assert!(!pool.is_utf8());
    assert!(pool.is_sorted());

    let pool = StringPoolChunk::new(true, true);
    assert!(pool.is_utf8());
    assert!(pool.is_sorted());
}

#[test]
fn set_and_add_string() {
    let mut pool = StringPoolChunk::new(true, false);
    assert_eq!(pool.add_string("first"), 0);
    assert_eq!(pool.add_string("second"), 1);
    pool.set_string(1, "changed");
    assert_eq!(pool.string(1), Some("changed"));
    assert_eq!(pool.index_of("changed"), Some(1));
    assert_eq!(pool.index_of("missing"), None);
}
