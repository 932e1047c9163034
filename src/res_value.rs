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

//! Typed resource values and packed resource identifiers.

use std::fmt::{self, Display};

use crate::stream::{Reader, StreamError, StreamResult, Writer};

/// The data type of a [`ResourceValue`], stored as a single byte on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// The data is either 0 (undefined) or 1 (empty).
    Null,
    /// The data holds a reference to another resource table entry.
    Reference,
    /// The data holds an attribute resource identifier.
    Attribute,
    /// The data holds an index into the containing resource table's string pool.
    String,
    /// The data holds a single-precision floating point number.
    Float,
    /// The data holds a complex number encoding a dimension value, such as "100in".
    Dimension,
    /// The data holds a complex number encoding a fraction of a container.
    Fraction,
    /// The data holds a dynamic reference that must be resolved before use.
    DynamicReference,
    /// The data holds a dynamic attribute identifier that must be resolved before use.
    DynamicAttribute,
    /// The data is a raw integer value of the form n..n.
    IntDec,
    /// The data is a raw integer value of the form 0xn..n.
    IntHex,
    /// The data is either 0 (false) or 1 (true).
    IntBoolean,
    /// The data is a raw integer value of the form #aarrggbb.
    IntColorArgb8,
    /// The data is a raw integer value of the form #rrggbb.
    IntColorRgb8,
    /// The data is a raw integer value of the form #argb.
    IntColorArgb4,
    /// The data is a raw integer value of the form #rgb.
    IntColorRgb4,
}

impl ValueType {
    pub fn code(self) -> u8 {
        match self {
            ValueType::Null => 0x00,
            ValueType::Reference => 0x01,
            ValueType::Attribute => 0x02,
            ValueType::String => 0x03,
            ValueType::Float => 0x04,
            ValueType::Dimension => 0x05,
            ValueType::Fraction => 0x06,
            ValueType::DynamicReference => 0x07,
            ValueType::DynamicAttribute => 0x08,
            ValueType::IntDec => 0x10,
            ValueType::IntHex => 0x11,
            ValueType::IntBoolean => 0x12,
            ValueType::IntColorArgb8 => 0x1c,
            ValueType::IntColorRgb8 => 0x1d,
            ValueType::IntColorArgb4 => 0x1e,
            ValueType::IntColorRgb4 => 0x1f,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => ValueType::Null,
            0x01 => ValueType::Reference,
            0x02 => ValueType::Attribute,
            0x03 => ValueType::String,
            0x04 => ValueType::Float,
            0x05 => ValueType::Dimension,
            0x06 => ValueType::Fraction,
            0x07 => ValueType::DynamicReference,
            0x08 => ValueType::DynamicAttribute,
            0x10 => ValueType::IntDec,
            0x11 => ValueType::IntHex,
            0x12 => ValueType::IntBoolean,
            0x1c => ValueType::IntColorArgb8,
            0x1d => ValueType::IntColorRgb8,
            0x1e => ValueType::IntColorArgb4,
            0x1f => ValueType::IntColorRgb4,
            _ => return None,
        })
    }
}

/// A single typed resource value.
///
/// Serialized as 8 bytes: a 16-bit structure size (8 in practice), one
/// reserved byte, the type byte, and a 32-bit data word whose interpretation
/// depends on the type. The data word is kept raw so that values hash and
/// compare structurally regardless of their type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceValue {
    /// The length in bytes of this value structure.
    pub size: u16,
    pub value_type: ValueType,
    /// The raw 4-byte payload; interpretation depends on `value_type`.
    pub data: u32,
}

impl ResourceValue {
    /// The serialized size in bytes of a resource value.
    pub const SIZE: usize = 8;

    pub fn new(value_type: ValueType, data: u32) -> Self {
        Self {
            size: Self::SIZE as u16,
            value_type,
            data,
        }
    }

    /// The null value an entry takes when its string is deleted.
    pub fn null() -> Self {
        Self::new(ValueType::Null, 0)
    }

    /// Returns a copy of this value with a different data word.
    pub fn with_data(self, data: u32) -> Self {
        Self { data, ..self }
    }

    pub fn parse(r: &mut Reader) -> StreamResult<Self> {
        let size = r.u16()?;
        let _res0 = r.u8()?;
        let type_pos = r.pos();
        let code = r.u8()?;
        let value_type = ValueType::from_code(code).ok_or(StreamError::UnsupportedValueType {
            code,
            offset: type_pos,
        })?;
        let data = r.u32()?;
        Ok(Self {
            size,
            value_type,
            data,
        })
    }

    pub fn write(&self, out: &mut Writer) {
        out.u16(self.size);
        out.u8(0);
        out.u8(self.value_type.code());
        out.u32(self.data);
    }
}

/// A packed reference to a unique entry in a resource table.
///
/// The 32-bit form is 0xpptteeee, where pp is the package id, tt is the type
/// id within that package and eeee is the entry index within that type.
/// Package and type ids start at 1; an id of 0 marks an unresolved reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceIdentifier {
    pub package_id: u8,
    pub type_id: u8,
    pub entry_id: u16,
}

impl ResourceIdentifier {
    pub fn new(package_id: u8, type_id: u8, entry_id: u16) -> Self {
        Self {
            package_id,
            type_id,
            entry_id,
        }
    }
}

impl From<u32> for ResourceIdentifier {
    fn from(value: u32) -> Self {
        Self {
            package_id: (value >> 24) as u8,
            type_id: (value >> 16) as u8,
            entry_id: value as u16,
        }
    }
}

impl From<ResourceIdentifier> for u32 {
    fn from(id: ResourceIdentifier) -> Self {
        ((id.package_id as u32) << 24) | ((id.type_id as u32) << 16) | id.entry_id as u32
    }
}

impl Display for ResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{:#010x}", u32::from(*self))
    }
}
