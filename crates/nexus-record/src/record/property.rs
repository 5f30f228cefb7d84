//! Property records and block encoding
//!
//! A property record holds up to [`MAX_PROPERTY_BLOCKS`] blocks. Each block
//! is a key token, a type tag and a 64-bit payload. Scalar values are stored
//! inline in the payload; strings and arrays store the head id of a chain in
//! the STRING or ARRAY dynamic store.

use super::{DynamicStoreKind, NONE, Record};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of blocks per property record
pub const MAX_PROPERTY_BLOCKS: usize = 4;

/// Property value types
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    Bool = 1,
    Byte = 2,
    Short = 3,
    Char = 4,
    Int = 5,
    Long = 6,
    Float = 7,
    Double = 8,
    /// Head of a STRING chain
    String = 9,
    /// Head of an ARRAY chain
    Array = 10,
}

impl PropertyType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => PropertyType::Bool,
            2 => PropertyType::Byte,
            3 => PropertyType::Short,
            4 => PropertyType::Char,
            5 => PropertyType::Int,
            6 => PropertyType::Long,
            7 => PropertyType::Float,
            8 => PropertyType::Double,
            9 => PropertyType::String,
            10 => PropertyType::Array,
            _ => return None,
        })
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// The dynamic store holding values of this type, if they are not inline
    pub fn dynamic_store(self) -> Option<DynamicStoreKind> {
        match self {
            PropertyType::String => Some(DynamicStoreKind::String),
            PropertyType::Array => Some(DynamicStoreKind::Array),
            _ => None,
        }
    }
}

/// Decoded property value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Char(char),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// Head id of the value's STRING chain
    String(u64),
    /// Head id of the value's ARRAY chain
    Array(u64),
}

impl PropertyValue {
    pub fn property_type(&self) -> PropertyType {
        match self {
            PropertyValue::Bool(_) => PropertyType::Bool,
            PropertyValue::Byte(_) => PropertyType::Byte,
            PropertyValue::Short(_) => PropertyType::Short,
            PropertyValue::Char(_) => PropertyType::Char,
            PropertyValue::Int(_) => PropertyType::Int,
            PropertyValue::Long(_) => PropertyType::Long,
            PropertyValue::Float(_) => PropertyType::Float,
            PropertyValue::Double(_) => PropertyType::Double,
            PropertyValue::String(_) => PropertyType::String,
            PropertyValue::Array(_) => PropertyType::Array,
        }
    }

    fn payload(&self) -> u64 {
        match *self {
            PropertyValue::Bool(b) => u64::from(b),
            PropertyValue::Byte(v) => u64::from(v as u8),
            PropertyValue::Short(v) => u64::from(v as u16),
            PropertyValue::Char(c) => u64::from(u32::from(c)),
            PropertyValue::Int(v) => u64::from(v as u32),
            PropertyValue::Long(v) => v as u64,
            PropertyValue::Float(v) => u64::from(v.to_bits()),
            PropertyValue::Double(v) => v.to_bits(),
            PropertyValue::String(head) | PropertyValue::Array(head) => head,
        }
    }
}

/// Why a block failed to decode
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyDecodeError {
    #[error("unknown property type tag {0}")]
    UnknownType(u8),

    #[error("payload {payload:#x} is not a valid {property_type:?}")]
    InvalidValue {
        property_type: PropertyType,
        payload: u64,
    },
}

/// One key/value slot of a property record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyBlock {
    pub key_id: u32,
    pub type_tag: u8,
    pub payload: u64,
}

impl PropertyBlock {
    pub fn new(key_id: u32, value: PropertyValue) -> Self {
        Self {
            key_id,
            type_tag: value.property_type().tag(),
            payload: value.payload(),
        }
    }

    pub fn property_type(&self) -> Option<PropertyType> {
        PropertyType::from_tag(self.type_tag)
    }

    pub fn decode(&self) -> Result<PropertyValue, PropertyDecodeError> {
        let property_type =
            PropertyType::from_tag(self.type_tag).ok_or(PropertyDecodeError::UnknownType(self.type_tag))?;
        let payload = self.payload;
        let invalid = PropertyDecodeError::InvalidValue {
            property_type,
            payload,
        };
        let value = match property_type {
            PropertyType::Bool => match payload {
                0 => PropertyValue::Bool(false),
                1 => PropertyValue::Bool(true),
                _ => return Err(invalid),
            },
            PropertyType::Byte => PropertyValue::Byte(u8::try_from(payload).map_err(|_| invalid)? as i8),
            PropertyType::Short => {
                PropertyValue::Short(u16::try_from(payload).map_err(|_| invalid)? as i16)
            }
            PropertyType::Char => {
                let code = u32::try_from(payload).map_err(|_| invalid)?;
                PropertyValue::Char(char::from_u32(code).ok_or(invalid)?)
            }
            PropertyType::Int => PropertyValue::Int(u32::try_from(payload).map_err(|_| invalid)? as i32),
            PropertyType::Long => PropertyValue::Long(payload as i64),
            PropertyType::Float => {
                PropertyValue::Float(f32::from_bits(u32::try_from(payload).map_err(|_| invalid)?))
            }
            PropertyType::Double => PropertyValue::Double(f64::from_bits(payload)),
            PropertyType::String | PropertyType::Array if payload == NONE => return Err(invalid),
            PropertyType::String => PropertyValue::String(payload),
            PropertyType::Array => PropertyValue::Array(payload),
        };
        Ok(value)
    }

    /// Dynamic chain referenced by this block, if it holds a string or array
    pub fn value_chain(&self) -> Option<(DynamicStoreKind, u64)> {
        match self.decode() {
            Ok(PropertyValue::String(head)) => Some((DynamicStoreKind::String, head)),
            Ok(PropertyValue::Array(head)) => Some((DynamicStoreKind::Array, head)),
            _ => None,
        }
    }
}

/// Property record in a doubly-linked property chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub id: u64,
    pub in_use: bool,
    pub prev_prop: u64,
    pub next_prop: u64,
    pub blocks: Vec<PropertyBlock>,
}

impl PropertyRecord {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            in_use: true,
            prev_prop: NONE,
            next_prop: NONE,
            blocks: Vec::new(),
        }
    }

    /// Dynamic chains referenced by the blocks of this record
    pub fn value_chains(&self) -> impl Iterator<Item = (DynamicStoreKind, u64)> + '_ {
        self.blocks.iter().filter_map(PropertyBlock::value_chain)
    }
}

impl Record for PropertyRecord {
    fn id(&self) -> u64 {
        self.id
    }

    fn in_use(&self) -> bool {
        self.in_use
    }

    fn not_in_use(id: u64) -> Self {
        Self {
            in_use: false,
            ..Self::new(id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_values_decode() {
        let values = [
            PropertyValue::Bool(true),
            PropertyValue::Byte(-3),
            PropertyValue::Short(-300),
            PropertyValue::Char('ß'),
            PropertyValue::Int(-70_000),
            PropertyValue::Long(i64::MIN),
            PropertyValue::Float(1.5),
            PropertyValue::Double(-2.25),
        ];
        for value in values {
            let block = PropertyBlock::new(1, value);
            assert_eq!(block.decode(), Ok(value));
            assert_eq!(block.value_chain(), None);
        }
    }

    #[test]
    fn test_unknown_type_tag() {
        let block = PropertyBlock {
            key_id: 0,
            type_tag: 0,
            payload: 0,
        };
        assert_eq!(block.property_type(), None);
        assert_eq!(block.decode(), Err(PropertyDecodeError::UnknownType(0)));
    }

    #[test]
    fn test_out_of_range_payloads_are_invalid() {
        let cases = [
            (PropertyType::Bool, 2),
            (PropertyType::Byte, 0x100),
            (PropertyType::Short, 0x1_0000),
            (PropertyType::Int, 0x1_0000_0000),
            (PropertyType::Float, 0x1_0000_0000),
            (PropertyType::Char, 0xD800),
            (PropertyType::String, NONE),
            (PropertyType::Array, NONE),
        ];
        for (property_type, payload) in cases {
            let block = PropertyBlock {
                key_id: 0,
                type_tag: property_type.tag(),
                payload,
            };
            assert_eq!(
                block.decode(),
                Err(PropertyDecodeError::InvalidValue {
                    property_type,
                    payload
                }),
                "{property_type:?}"
            );
        }
    }

    #[test]
    fn test_value_chains() {
        let mut record = PropertyRecord::new(0);
        record.blocks.push(PropertyBlock::new(1, PropertyValue::String(4)));
        record.blocks.push(PropertyBlock::new(2, PropertyValue::Int(4)));
        record.blocks.push(PropertyBlock::new(3, PropertyValue::Array(8)));
        let chains: Vec<_> = record.value_chains().collect();
        assert_eq!(
            chains,
            vec![(DynamicStoreKind::String, 4), (DynamicStoreKind::Array, 8)]
        );
    }
}
