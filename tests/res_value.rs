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

use resarc::res_value::{ResourceIdentifier, ResourceValue, ValueType};
use resarc::stream::{Reader, StreamError, Writer};

fn parse_value(data: &[u8]) -> Result<ResourceValue, StreamError> {
    ResourceValue::parse(&mut Reader::new(data))
}

fn value_bytes(value: &ResourceValue) -> Vec<u8> {
    let mut out = Writer::new();
    value.write(&mut out);
    out.into_bytes()
}

#[test]
fn parse_null_value() {
    let value = parse_value(b"\x08\x00\x00\x00\x00\x00\x00\x00").unwrap();
    assert_eq!(value.size, 8);
    assert_eq!(value.value_type, ValueType::Null);
    assert_eq!(value.data, 0);
}

#[test]
fn parse_string_value() {
    let value = parse_value(b"\x08\x00\x00\x03\x2a\x00\x00\x00").unwrap();
    assert_eq!(value.value_type, ValueType::String);
    assert_eq!(value.data, 42);
}

#[test]
fn parse_reference_value() {
    let value = parse_value(b"\x08\x00\x00\x01\x67\x45\x23\x01").unwrap();
    assert_eq!(value.value_type, ValueType::Reference);
    assert_eq!(value.data, 0x01234567);
}

#[test]
fn write_value_round_trips() {
    for value_type in [
        ValueType::Null,
        ValueType::Reference,
        ValueType::Attribute,
        ValueType::String,
        ValueType::Float,
        ValueType::Dimension,
        ValueType::Fraction,
        ValueType::DynamicReference,
        ValueType::DynamicAttribute,
        ValueType::IntDec,
        ValueType::IntHex,
        ValueType::IntBoolean,
        ValueType::IntColorArgb8,
        ValueType::IntColorRgb8,
        ValueType::IntColorArgb4,
        ValueType::IntColorRgb4,
    ] {
        let value = ResourceValue::new(value_type, 0xCAFEBABE);
        let bytes = value_bytes(&value);
        assert_eq!(bytes.len(), ResourceValue::SIZE);
        assert_eq!(parse_value(&bytes).unwrap(), value);
    }
}

#[test]
fn unknown_value_type_is_rejected() {
    // 0x0b is not in the enumerated set.
    match parse_value(b"\x08\x00\x00\x0b\x00\x00\x00\x00") {
        Err(StreamError::UnsupportedValueType { code, offset }) => {
            assert_eq!(code, 0x0b);
            assert_eq!(offset, 3);
        }
        other => panic!("expected UnsupportedValueType, got {other:?}"),
    }
}

#[test]
fn truncated_value_is_rejected() {
    assert!(matches!(
        parse_value(b"\x08\x00\x00\x03\x2a"),
        Err(StreamError::UnexpectedEnd { .. })
    ));
}

#[test]
fn identifier_unpacks_the_packed_form() {
    let id = ResourceIdentifier::from(0x01234567);
    assert_eq!(id.package_id, 0x01);
    assert_eq!(id.type_id, 0x23);
    assert_eq!(id.entry_id, 0x4567);
    assert_eq!(u32::from(id), 0x01234567);

    let id = ResourceIdentifier::from(0xFEDCBA98);
    assert_eq!(id.package_id, 0xFE);
    assert_eq!(id.type_id, 0xDC);
    assert_eq!(id.entry_id, 0xBA98);
    assert_eq!(u32::from(id), 0xFEDCBA98);
}

#[test]
fn identifier_repacks_its_parts() {
    let id = ResourceIdentifier::new(0x7F, 0x01, 0x0000);
    assert_eq!(u32::from(id), 0x7F010000);
    assert_eq!(id.to_string(), "@0x7f010000");
}

#[test]
fn with_data_keeps_the_type() {
    let value = ResourceValue::new(ValueType::Reference, 0x7F010000);
    let rewritten = value.with_data(0x7F020000);
    assert_eq!(rewritten.value_type, ValueType::Reference);
    assert_eq!(rewritten.data, 0x7F020000);
}
