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

use resarc::config::ResourceConfiguration;
use resarc::res_value::{ResourceIdentifier, ResourceValue, ValueType};
use resarc::stream::{Reader, StreamError};
use resarc::string_pool::StringPoolChunk;
use resarc::table::{
    LibraryChunk, LibraryEntry, PackageChunk, ResourceTableChunk, TypeChunk, TypeEntry,
    TypeSpecChunk, SPEC_PUBLIC,
};
use resarc::{Chunk, ResourceFile, SerializeFlags};

fn sample_table() -> ResourceTableChunk {
    let mut global = StringPoolChunk::new(true, false);
    global.add_string("Hello");
    global.add_string("World");

    let mut type_pool = StringPoolChunk::new(true, false);
    type_pool.add_string("string");

    let mut key_pool = StringPoolChunk::new(true, false);
    key_pool.add_string("greeting");
    key_pool.add_string("farewell");

    let mut package = PackageChunk::new(0x7F, "com.example.app", type_pool, key_pool);
    package
        .add_chunk(Chunk::TypeSpec(TypeSpecChunk::new(1, vec![0, SPEC_PUBLIC])))
        .unwrap();

    let mut type_chunk = TypeChunk::new(1, ResourceConfiguration::default(), 2);
    type_chunk.override_entry(
        0,
        Some(TypeEntry::simple(0, ResourceValue::new(ValueType::String, 0))),
    );
    let mut public_entry = TypeEntry::simple(1, ResourceValue::new(ValueType::String, 1));
    public_entry.flags |= TypeEntry::FLAG_PUBLIC;
    type_chunk.override_entry(1, Some(public_entry));
    package.add_chunk(Chunk::Type(type_chunk)).unwrap();

    let mut table = ResourceTableChunk::new(global);
    table.add_package(package);
    table
}

fn serialize(table: &ResourceTableChunk) -> Vec<u8> {
    Chunk::Table(table.clone())
        .to_bytes(SerializeFlags::empty())
        .unwrap()
}

fn reparse(bytes: &[u8]) -> ResourceTableChunk {
    let file = ResourceFile::parse(bytes).unwrap();
    assert_eq!(file.chunks().len(), 1);
    file.chunks()[0].as_table().unwrap().clone()
}

#[test]
fn table_round_trips_byte_for_byte() {
    let bytes = serialize(&sample_table());
    let file = ResourceFile::parse(&bytes).unwrap();
    assert_eq!(file.to_bytes(SerializeFlags::empty()).unwrap(), bytes);
}

#[test]
fn parsed_table_exposes_its_structure() {
    let table = reparse(&serialize(&sample_table()));

    assert_eq!(table.string_pool().unwrap().string(0), Some("Hello"));
    let package = table.package("com.example.app").unwrap();
    assert_eq!(package.id(), 0x7F);
    assert_eq!(package.type_string(1), Some("string"));
    assert_eq!(package.type_chunks().count(), 1);
    assert_eq!(package.type_chunks_with_name("string").len(), 1);
    assert_eq!(package.type_spec(1).unwrap().masks(), &[0, SPEC_PUBLIC]);
    assert!(package.type_spec(1).unwrap().is_public(1));

    let type_chunk = package.type_chunks().next().unwrap();
    assert_eq!(type_chunk.id(), 1);
    assert_eq!(type_chunk.type_name(package), Some("string"));
    assert!(type_chunk.configuration().is_default());
    assert_eq!(type_chunk.total_entry_count(), 2);
    assert_eq!(type_chunk.entries().len(), 2);

    let entry = &type_chunk.entries()[&0];
    assert_eq!(entry.key_name(package), Some("greeting"));
    assert!(!entry.is_complex());
    assert_eq!(entry.value.unwrap().value_type, ValueType::String);
    assert_eq!(entry.size(), 16);
}

#[test]
fn lookup_resolves_packed_identifiers() {
    let table = reparse(&serialize(&sample_table()));
    let entry = table.lookup(ResourceIdentifier::from(0x7F010001)).unwrap();
    assert_eq!(entry.key_index, 1);
    assert!(entry.is_public());
    assert!(table.lookup(ResourceIdentifier::from(0x7F010002)).is_none());
    assert!(table.lookup(ResourceIdentifier::from(0x7E010000)).is_none());
}

#[test]
fn pool_offsets_in_serialized_package_locate_the_pools() {
    let bytes = serialize(&sample_table());

    // The global pool is the first child of the table; the package follows.
    let pool_size = u32::from_le_bytes(bytes[16..20].try_into().unwrap()) as usize;
    let package_offset = 12 + pool_size;
    assert_eq!(
        u16::from_le_bytes(bytes[package_offset..package_offset + 2].try_into().unwrap()),
        0x0200
    );

    let type_off =
        u32::from_le_bytes(bytes[package_offset + 268..package_offset + 272].try_into().unwrap());
    let key_off =
        u32::from_le_bytes(bytes[package_offset + 276..package_offset + 280].try_into().unwrap());

    let mut r = Reader::new(&bytes);
    r.seek((package_offset as u64) + type_off as u64).unwrap();
    let type_pool = Chunk::parse(&mut r).unwrap();
    assert_eq!(type_pool.as_string_pool().unwrap().string(0), Some("string"));

    r.seek((package_offset as u64) + key_off as u64).unwrap();
    let key_pool = Chunk::parse(&mut r).unwrap();
    assert_eq!(key_pool.as_string_pool().unwrap().string(0), Some("greeting"));
}

#[test]
fn private_resources_strips_public_bits() {
    let bytes = Chunk::Table(sample_table())
        .to_bytes(SerializeFlags::PRIVATE_RESOURCES)
        .unwrap();
    let table = reparse(&bytes);
    let package = table.packages().next().unwrap();
    assert_eq!(package.type_spec(1).unwrap().masks(), &[0, 0]);
    let entry = table.lookup(ResourceIdentifier::from(0x7F010001)).unwrap();
    assert!(!entry.is_public());
}

#[test]
fn delete_key_strings_rewrites_entry_keys() {
    let mut table = sample_table();
    let package = table.packages_mut().next().unwrap();

    let removed = package.delete_key_strings(&BTreeSet::from([0usize])).unwrap();
    assert_eq!(removed, 0);
    assert_eq!(
        package.key_string_pool().unwrap().strings().collect::<Vec<_>>(),
        vec!["farewell"]
    );
    let type_chunk = package.type_chunks().next().unwrap();
    assert_eq!(type_chunk.entries().len(), 1);
    assert_eq!(type_chunk.entries()[&1].key_index, 0);

    // Byte-exact round trip still holds after the mutation.
    let bytes = serialize(&table);
    assert_eq!(serialize(&reparse(&bytes)), bytes);
}

#[test]
fn deleting_every_key_removes_the_type_chunk_and_its_spec() {
    let mut table = sample_table();
    let package = table.packages_mut().next().unwrap();

    let removed = package
        .delete_key_strings(&BTreeSet::from([0usize, 1]))
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(package.type_chunks().count(), 0);
    assert!(package.type_spec(1).is_none());
    assert_eq!(package.key_string_pool().unwrap().string_count(), 0);
}

#[test]
fn delete_strings_nulls_simple_entries_and_remaps_the_rest() {
    let mut table = sample_table();
    let remap = table.delete_strings(&BTreeSet::from([0usize])).unwrap();
    assert_eq!(remap, vec![-1, 0]);

    assert_eq!(
        table.string_pool().unwrap().strings().collect::<Vec<_>>(),
        vec!["World"]
    );
    let entry = table.lookup(ResourceIdentifier::from(0x7F010000)).unwrap();
    // The slot survives as a null entry; a sibling configuration may depend
    // on the index existing.
    assert_eq!(entry.value.unwrap().value_type, ValueType::Null);
    let entry = table.lookup(ResourceIdentifier::from(0x7F010001)).unwrap();
    assert_eq!(entry.value.unwrap().data, 0);
    assert_eq!(entry.value.unwrap().value_type, ValueType::String);
}

#[test]
fn complex_entries_round_trip_and_remap_per_value() {
    let mut table = sample_table();
    {
        let package = table.packages_mut().next().unwrap();
        let type_chunk = package.type_chunks_mut().next().unwrap();
        type_chunk.override_entry(
            0,
            Some(TypeEntry::complex(
                0,
                0x7F010001,
                vec![
                    (0x01000000, ResourceValue::new(ValueType::String, 1)),
                    (0x01000001, ResourceValue::new(ValueType::IntDec, 42)),
                ],
            )),
        );
    }

    let bytes = serialize(&table);
    let parsed = reparse(&bytes);
    let entry = parsed.lookup(ResourceIdentifier::from(0x7F010000)).unwrap();
    assert!(entry.is_complex());
    assert_eq!(entry.parent_entry, 0x7F010001);
    assert_eq!(entry.values.len(), 2);
    assert_eq!(entry.size(), 16 + 2 * 12);
    assert_eq!(serialize(&parsed), bytes);

    // Deleting "World" nulls only the string-typed sub-value.
    let mut mutated = parsed;
    mutated.delete_strings(&BTreeSet::from([1usize])).unwrap();
    let entry = mutated.lookup(ResourceIdentifier::from(0x7F010000)).unwrap();
    assert_eq!(entry.values[0].1.value_type, ValueType::Null);
    assert_eq!(entry.values[1].1.data, 42);
}

#[test]
fn sparse_type_chunks_round_trip() {
    let mut table = sample_table();
    table
        .packages_mut()
        .next()
        .unwrap()
        .type_chunks_mut()
        .next()
        .unwrap()
        .set_sparse_entries(true);

    let bytes = serialize(&table);
    let parsed = reparse(&bytes);
    let package = parsed.packages().next().unwrap();
    let type_chunk = package.type_chunks().next().unwrap();
    assert!(type_chunk.has_sparse_entries());
    assert_eq!(type_chunk.entries().len(), 2);
    assert_eq!(type_chunk.entries()[&0].key_index, 0);
    assert_eq!(serialize(&parsed), bytes);
}

#[test]
fn dense_layout_writes_sentinels_for_missing_entries() {
    let mut table = sample_table();
    {
        let package = table.packages_mut().next().unwrap();
        let type_chunk = package.type_chunks_mut().next().unwrap();
        type_chunk.set_total_entry_count(3);
        type_chunk.override_entry(0, None);
    }

    let bytes = serialize(&table);
    let parsed = reparse(&bytes);
    let type_chunk = parsed
        .packages()
        .next()
        .unwrap()
        .type_chunks()
        .next()
        .unwrap();
    assert_eq!(type_chunk.total_entry_count(), 3);
    assert_eq!(type_chunk.entries().keys().copied().collect::<Vec<_>>(), vec![1]);
    assert_eq!(serialize(&parsed), bytes);
}

#[test]
fn library_chunk_round_trips() {
    let mut table = sample_table();
    table
        .packages_mut()
        .next()
        .unwrap()
        .add_chunk(Chunk::Library(LibraryChunk::new(vec![LibraryEntry {
            package_id: 2,
            package_name: "com.example.shared".to_string(),
        }])))
        .unwrap();

    let bytes = serialize(&table);
    let parsed = reparse(&bytes);
    let library = parsed.packages().next().unwrap().library().unwrap();
    assert_eq!(library.entries().len(), 1);
    assert_eq!(library.entries()[0].package_id, 2);
    assert_eq!(library.entries()[0].package_name, "com.example.shared");
    assert_eq!(serialize(&parsed), bytes);
}

#[test]
fn second_library_chunk_is_rejected() {
    let mut table = sample_table();
    let package = table.packages_mut().next().unwrap();
    package
        .add_chunk(Chunk::Library(LibraryChunk::new(Vec::new())))
        .unwrap();
    assert!(package
        .add_chunk(Chunk::Library(LibraryChunk::new(Vec::new())))
        .is_err());
}

#[test]
fn type_chunk_may_not_sit_directly_in_a_table() {
    // A table whose only child is a type spec chunk.
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&[0x02, 0x00, 0x0C, 0x00]);
    bytes.extend_from_slice(&28u32.to_le_bytes());
    bytes.extend_from_slice(&1u32.to_le_bytes()); // package count
    bytes.extend_from_slice(&[0x02, 0x02, 0x10, 0x00]); // type spec, header 16
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u32.to_le_bytes()); // id
    bytes.extend_from_slice(&0u32.to_le_bytes()); // mask count

    match ResourceFile::parse(&bytes) {
        Err(StreamError::InChunk { source, .. }) => {
            assert!(matches!(*source, StreamError::UnexpectedChild { code: 0x0202, .. }));
        }
        other => panic!("expected UnexpectedChild, got {other:?}"),
    }
}

#[test]
fn set_id_validates_against_the_type_pool() {
    let mut type_pool = StringPoolChunk::new(true, false);
    type_pool.add_string("string");
    let mut type_chunk = TypeChunk::new(1, ResourceConfiguration::default(), 0);
    assert!(type_chunk.set_id(0, &type_pool).is_err());
    assert!(type_chunk.set_id(2, &type_pool).is_err());
    assert!(type_chunk.set_id(1, &type_pool).is_ok());

    let mut spec = TypeSpecChunk::new(1, Vec::new());
    assert!(spec.set_id(0).is_err());
    assert!(spec.set_id(3).is_ok());
}
