//!
//! The Records module contains the in-memory representation of one stored row.  [RecordID],
//! [FieldValue] and [Record] are re-exported to the public interface.
//!

use core::fmt;

use serde::{Serialize, Deserialize};

/// A unique identifier for a record within a [RecordStore](crate::RecordStore)
///
/// RecordIDs are dense and start at 0, and the store uses them directly for addressing: record `i`
/// lives at byte offset `i * record_length` of the store file.
///
/// NOTE: the RecordID is 32 bits, which is also the index type of the in-memory cache, so a store with
/// more than `u32::MAX` records can be formatted and read with seeks but never cached.
#[derive(Copy, Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, derive_more::Display, Serialize, Deserialize)]
pub struct RecordID(pub u32);

impl RecordID {
    pub fn from(id : u32) -> Self {
        RecordID(id)
    }
    pub fn index(&self) -> usize {
        self.0 as usize
    }
    /// Byte offset of this record in a store whose records are `record_length` bytes long
    pub fn byte_offset(&self, record_length : usize) -> u64 {
        self.0 as u64 * record_length as u64
    }
}

/// One typed field value of a [Record]
///
/// `Missing` stands for the census "no value" markers.  It's a distinct variant rather than a magic
/// number so that records compare and hash structurally, which lets a `Vec<FieldValue>` serve as a
/// composite index key.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum FieldValue {
    Int(i32),
    Short(i16),
    Byte(i8),
    Bool(bool),
    Code(String),
    Missing,
}

impl FieldValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Missing)
    }

    /// Widens any integer value to an `i64`.  Returns `None` for codes, booleans and missing values
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v as i64),
            FieldValue::Short(v) => Some(*v as i64),
            FieldValue::Byte(v) => Some(*v as i64),
            _ => None
        }
    }

    pub fn as_code(&self) -> Option<&str> {
        match self {
            FieldValue::Code(code) => Some(code.as_str()),
            _ => None
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Short(v) => write!(f, "{v}"),
            FieldValue::Byte(v) => write!(f, "{v}"),
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Code(v) => f.write_str(v),
            FieldValue::Missing => f.write_str("NA"),
        }
    }
}

/// A single decoded row.  The values are positional, and only meaningful together with the
/// [RecordSchema](crate::RecordSchema) that produced them
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Record {
    values : Vec<FieldValue>,
}

impl Record {
    /// Wraps values without checking them against a schema.  Use
    /// [RecordSchema::record](crate::RecordSchema::record) to get a checked record.
    pub(crate) fn from_values(values : Vec<FieldValue>) -> Self {
        Self{ values }
    }
    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }
    pub fn value(&self, idx : usize) -> Option<&FieldValue> {
        self.values.get(idx)
    }
    pub fn into_values(self) -> Vec<FieldValue> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_addressing() {
        assert_eq!(RecordID(0).byte_offset(17), 0);
        assert_eq!(RecordID(4).byte_offset(17), 68);
        assert_eq!(RecordID(u32::MAX).byte_offset(8), u32::MAX as u64 * 8);
    }

    #[test]
    fn test_field_value_accessors() {
        assert_eq!(FieldValue::Short(-3).as_i64(), Some(-3));
        assert_eq!(FieldValue::Code("E01".to_string()).as_code(), Some("E01"));
        assert_eq!(FieldValue::Missing.as_i64(), None);
        assert!(FieldValue::Missing.is_missing());
        assert_eq!(FieldValue::Missing.to_string(), "NA");
    }
}
