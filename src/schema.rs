//!
//! The Schema module contains the declarative description of a record type, and the generic
//! parse / encode / decode logic driven by it.  [FieldKind], [FieldSpec], [RecordSchema] and [RowError]
//! are re-exported.
//!

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num_traits::{Bounded, NumCast};
use serde::{Serialize, Deserialize};

use crate::error::{CensusError, Result};
use crate::records::{FieldValue, Record};

/// The binary type of one field.  Every kind has a fixed width, which is what makes every record of
/// a schema the same length on disk.
///
/// | Kind       | Width | Encoding                         | Missing marker |
/// |------------|-------|----------------------------------|----------------|
/// | `Int`      | 4     | big-endian `i32`                 | `i32::MIN`     |
/// | `Short`    | 2     | big-endian `i16`                 | `i16::MIN`     |
/// | `Byte`     | 1     | `i8`                             | `i8::MIN`      |
/// | `Bool`     | 1     | `0` or `1`                       | `0xFF`         |
/// | `Code(n)`  | n     | ASCII, right-padded with spaces  | n zero bytes   |
///
/// The missing markers are reserved.  A concrete value equal to one is refused, otherwise it would
/// come back from the store as [FieldValue::Missing].
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum FieldKind {
    Int,
    Short,
    Byte,
    Bool,
    Code(usize),
}

const BOOL_MISSING : u8 = 0xFF;

impl FieldKind {
    /// The number of bytes the field occupies in an encoded record
    pub const fn width(&self) -> usize {
        match self {
            FieldKind::Int => 4,
            FieldKind::Short => 2,
            FieldKind::Byte | FieldKind::Bool => 1,
            FieldKind::Code(width) => *width,
        }
    }
}

/// One field of a [RecordSchema]: its name, its binary kind, and the column of the source file
/// the value is read from
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name : String,
    pub kind : FieldKind,
    pub column : usize,
    /// Whether a missing token is accepted as [FieldValue::Missing].  When `false` a missing token
    /// makes the row unusable.
    #[serde(default)]
    pub nullable : bool,
    /// Inclusive bounds for integer fields.  Values outside are census sentinel codes and the row
    /// is skipped.
    #[serde(default)]
    pub range : Option<(i64, i64)>,
}

impl FieldSpec {
    pub fn new(name : &str, kind : FieldKind, column : usize) -> Self {
        Self{
            name : name.to_string(),
            kind,
            column,
            nullable : false,
            range : None,
        }
    }
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
    pub fn range(mut self, min : i64, max : i64) -> Self {
        self.range = Some((min, max));
        self
    }
}

/// Why a source row couldn't be turned into a record.  Collected by the format pass rather than
/// raised.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    #[error("expected at least {expected} columns, found {found}")]
    TooFewColumns { expected : usize, found : usize },
    #[error("field '{field}' is missing")]
    MissingValue { field : String },
    #[error("field '{field}' could not parse '{token}'")]
    Unparsable { field : String, token : String },
    #[error("field '{field}' value {value} is outside {min}..={max}")]
    OutOfRange { field : String, value : i64, min : i64, max : i64 },
    #[error("field '{field}' code '{code}' does not fit in {width} ASCII characters")]
    CodeTooWide { field : String, code : String, width : usize },
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
}

/// The declarative layout of one record type
///
/// The schema drives everything a record type needs: parsing a source row, encoding to the fixed
/// binary layout, decoding it back, and printing.  Fields are encoded in declaration order with no
/// padding between them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordSchema {
    name : String,
    fields : Vec<FieldSpec>,
    missing_tokens : Vec<String>,
    record_length : usize,
}

impl RecordSchema {

    /// Creates a schema.  By default only the empty token counts as missing
    ///
    /// A `Code(0)` field is refused: with no bytes to hold it, every value would decode as missing.
    pub fn new(name : &str, fields : Vec<FieldSpec>) -> Result<Self> {
        if let Some(field) = fields.iter().find(|field| field.kind == FieldKind::Code(0)) {
            return Err(CensusError::InvalidValue{
                field : field.name.clone(),
                reason : format!("code fields of {name} need a width of at least 1"),
            });
        }
        let record_length = fields.iter().map(|field| field.kind.width()).sum();
        Ok(Self{
            name : name.to_string(),
            fields,
            missing_tokens : vec![String::new()],
            record_length,
        })
    }

    /// Replaces the set of tokens that count as a missing value
    pub fn with_missing_tokens(mut self, tokens : &[&str]) -> Self {
        self.missing_tokens = tokens.iter().map(|token| token.to_string()).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// The exact number of bytes of every encoded record of this schema
    pub fn record_length(&self) -> usize {
        self.record_length
    }

    /// `(name, byte offset, width)` for every field, in encoding order
    pub fn layout(&self) -> Vec<(&str, usize, usize)> {
        let mut offset = 0;
        self.fields.iter().map(|field| {
            let entry = (field.name.as_str(), offset, field.kind.width());
            offset += field.kind.width();
            entry
        }).collect()
    }

    pub fn index_of(&self, field_name : &str) -> Result<usize> {
        self.fields.iter()
            .position(|field| field.name == field_name)
            .ok_or_else(|| CensusError::UnknownField{ schema : self.name.clone(), field : field_name.to_string() })
    }

    /// Returns the named value of a record
    pub fn value<'a>(&self, record : &'a Record, field_name : &str) -> Result<&'a FieldValue> {
        let idx = self.index_of(field_name)?;
        record.value(idx).ok_or_else(|| CensusError::InvalidValue{
            field : field_name.to_string(),
            reason : "record has fewer values than the schema has fields".to_string()
        })
    }

    /// Builds a record from values, checking each one against its field
    pub fn record(&self, values : Vec<FieldValue>) -> Result<Record> {
        self.check_values(&values)?;
        Ok(Record::from_values(values))
    }

    fn check_values(&self, values : &[FieldValue]) -> Result<()> {
        if values.len() != self.fields.len() {
            return Err(CensusError::InvalidValue{
                field : self.name.clone(),
                reason : format!("expected {} values, got {}", self.fields.len(), values.len())
            });
        }
        for (field, value) in self.fields.iter().zip(values) {
            check_value(field, value)?;
        }
        Ok(())
    }

    /// Parses one tokenized source row
    pub fn parse_row(&self, row : &csv::StringRecord) -> std::result::Result<Record, RowError> {

        let expected = self.fields.iter().map(|field| field.column + 1).max().unwrap_or(0);
        if row.len() < expected {
            return Err(RowError::TooFewColumns{ expected, found : row.len() });
        }

        let mut values = Vec::with_capacity(self.fields.len());
        for field in self.fields.iter() {
            //The length check above guarantees the column exists
            let token = row.get(field.column).unwrap_or("").trim();
            values.push(self.parse_token(field, token)?);
        }
        Ok(Record::from_values(values))
    }

    fn parse_token(&self, field : &FieldSpec, token : &str) -> std::result::Result<FieldValue, RowError> {

        if self.missing_tokens.iter().any(|missing| missing == token) {
            return if field.nullable {
                Ok(FieldValue::Missing)
            } else {
                Err(RowError::MissingValue{ field : field.name.clone() })
            };
        }

        let unparsable = || RowError::Unparsable{ field : field.name.clone(), token : token.to_string() };

        match field.kind {
            FieldKind::Int => parse_integer::<i32>(field, token).map(FieldValue::Int),
            FieldKind::Short => parse_integer::<i16>(field, token).map(FieldValue::Short),
            FieldKind::Byte => parse_integer::<i8>(field, token).map(FieldValue::Byte),
            FieldKind::Bool => {
                match token.to_ascii_lowercase().as_str() {
                    "1" | "true" | "y" | "yes" => Ok(FieldValue::Bool(true)),
                    "0" | "false" | "n" | "no" => Ok(FieldValue::Bool(false)),
                    _ => Err(unparsable())
                }
            },
            FieldKind::Code(width) => {
                if token.len() > width || !is_storable_code(token) {
                    Err(RowError::CodeTooWide{ field : field.name.clone(), code : token.to_string(), width })
                } else {
                    Ok(FieldValue::Code(token.to_string()))
                }
            }
        }
    }

    /// Encodes a record into exactly [record_length](Self::record_length) bytes
    pub fn encode(&self, record : &Record) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.record_length);
        self.encode_into(record, &mut buf)?;
        Ok(buf)
    }

    /// Appends the encoding of a record to `buf`
    pub fn encode_into(&self, record : &Record, buf : &mut Vec<u8>) -> Result<()> {

        self.check_values(record.values())?;

        for (field, value) in self.fields.iter().zip(record.values()) {
            match (field.kind, value) {
                (FieldKind::Int, FieldValue::Int(v)) => buf.write_i32::<BigEndian>(*v)?,
                (FieldKind::Int, FieldValue::Missing) => buf.write_i32::<BigEndian>(i32::MIN)?,
                (FieldKind::Short, FieldValue::Short(v)) => buf.write_i16::<BigEndian>(*v)?,
                (FieldKind::Short, FieldValue::Missing) => buf.write_i16::<BigEndian>(i16::MIN)?,
                (FieldKind::Byte, FieldValue::Byte(v)) => buf.write_i8(*v)?,
                (FieldKind::Byte, FieldValue::Missing) => buf.write_i8(i8::MIN)?,
                (FieldKind::Bool, FieldValue::Bool(v)) => buf.write_u8(*v as u8)?,
                (FieldKind::Bool, FieldValue::Missing) => buf.write_u8(BOOL_MISSING)?,
                (FieldKind::Code(width), FieldValue::Code(code)) => {
                    buf.extend_from_slice(code.as_bytes());
                    buf.resize(buf.len() + width - code.len(), b' ');
                },
                (FieldKind::Code(width), FieldValue::Missing) => buf.resize(buf.len() + width, 0),
                //check_values already rejected every other pairing
                _ => unreachable!()
            }
        }
        Ok(())
    }

    /// Decodes one record from exactly [record_length](Self::record_length) bytes
    pub fn decode(&self, bytes : &[u8]) -> Result<Record> {

        if bytes.len() != self.record_length {
            return Err(CensusError::InvalidValue{
                field : self.name.clone(),
                reason : format!("encoded record is {} bytes, expected {}", bytes.len(), self.record_length)
            });
        }

        let mut cursor = Cursor::new(bytes);
        let mut values = Vec::with_capacity(self.fields.len());
        for field in self.fields.iter() {
            let value = match field.kind {
                FieldKind::Int => match cursor.read_i32::<BigEndian>()? {
                    i32::MIN => FieldValue::Missing,
                    v => FieldValue::Int(v)
                },
                FieldKind::Short => match cursor.read_i16::<BigEndian>()? {
                    i16::MIN => FieldValue::Missing,
                    v => FieldValue::Short(v)
                },
                FieldKind::Byte => match cursor.read_i8()? {
                    i8::MIN => FieldValue::Missing,
                    v => FieldValue::Byte(v)
                },
                FieldKind::Bool => match cursor.read_u8()? {
                    0 => FieldValue::Bool(false),
                    1 => FieldValue::Bool(true),
                    BOOL_MISSING => FieldValue::Missing,
                    other => return Err(CensusError::InvalidValue{
                        field : field.name.clone(),
                        reason : format!("invalid boolean byte {other:#04x}")
                    })
                },
                FieldKind::Code(width) => {
                    let start = cursor.position() as usize;
                    let raw = &bytes[start..start + width];
                    cursor.set_position((start + width) as u64);
                    if raw.iter().all(|b| *b == 0) {
                        FieldValue::Missing
                    } else {
                        let code = std::str::from_utf8(raw).map_err(|e| CensusError::InvalidValue{
                            field : field.name.clone(),
                            reason : e.to_string()
                        })?;
                        FieldValue::Code(code.trim_end_matches(' ').to_string())
                    }
                }
            };
            values.push(value);
        }
        Ok(Record::from_values(values))
    }

    /// Renders a record as `name=value` pairs, for logging and debugging
    pub fn display(&self, record : &Record) -> String {
        self.fields.iter()
            .zip(record.values())
            .map(|(field, value)| format!("{}={}", field.name, value))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn parse_integer<T>(field : &FieldSpec, token : &str) -> std::result::Result<T, RowError>
    where T : Bounded + NumCast + PartialEq
{
    let raw : i64 = token.parse().map_err(|_| RowError::Unparsable{ field : field.name.clone(), token : token.to_string() })?;

    let (min, max) = match field.range {
        Some(range) => range,
        None => {
            //The smallest value of the type is the missing marker, so it's not a legal value
            let type_min : i64 = NumCast::from(T::min_value()).unwrap_or(i64::MIN);
            let type_max : i64 = NumCast::from(T::max_value()).unwrap_or(i64::MAX);
            (type_min + 1, type_max)
        }
    };
    if raw < min || raw > max {
        return Err(RowError::OutOfRange{ field : field.name.clone(), value : raw, min, max });
    }

    let value : Option<T> = NumCast::from(raw);
    match value {
        Some(v) if v != T::min_value() => Ok(v),
        _ => Err(RowError::OutOfRange{ field : field.name.clone(), value : raw, min, max })
    }
}

fn is_storable_code(code : &str) -> bool {
    code.bytes().all(|b| b.is_ascii() && !b.is_ascii_control())
}

fn check_value(field : &FieldSpec, value : &FieldValue) -> Result<()> {

    let invalid = |reason : String| CensusError::InvalidValue{ field : field.name.clone(), reason };

    match (field.kind, value) {
        (_, FieldValue::Missing) if !field.nullable => Err(invalid("field is not nullable".to_string())),
        (_, FieldValue::Missing) => Ok(()),
        (FieldKind::Int, FieldValue::Int(i32::MIN)) |
        (FieldKind::Short, FieldValue::Short(i16::MIN)) |
        (FieldKind::Byte, FieldValue::Byte(i8::MIN)) => Err(invalid("value is reserved as the missing marker".to_string())),
        (FieldKind::Int, FieldValue::Int(_)) |
        (FieldKind::Short, FieldValue::Short(_)) |
        (FieldKind::Byte, FieldValue::Byte(_)) |
        (FieldKind::Bool, FieldValue::Bool(_)) => Ok(()),
        (FieldKind::Code(width), FieldValue::Code(code)) => {
            if code.len() > width || !is_storable_code(code) {
                Err(invalid(format!("code '{code}' does not fit in {width} ASCII characters")))
            } else if code.ends_with(' ') {
                Err(invalid(format!("code '{code}' has trailing spaces, which are used as padding")))
            } else {
                Ok(())
            }
        },
        (kind, value) => Err(invalid(format!("{value:?} is not a {kind:?} value")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_schema() -> RecordSchema {
        RecordSchema::new("test", vec![
            FieldSpec::new("area", FieldKind::Code(9), 0),
            FieldSpec::new("persons", FieldKind::Int, 1).nullable(),
            FieldSpec::new("age_band", FieldKind::Short, 2).range(1, 16),
            FieldSpec::new("sex", FieldKind::Byte, 3),
            FieldSpec::new("student", FieldKind::Bool, 4).nullable(),
        ]).unwrap()
    }

    fn row(tokens : &[&str]) -> csv::StringRecord {
        csv::StringRecord::from(tokens.to_vec())
    }

    #[test]
    fn test_record_length_is_sum_of_widths() {
        let schema = test_schema();
        assert_eq!(schema.record_length(), 9 + 4 + 2 + 1 + 1);
        let layout = schema.layout();
        assert_eq!(layout[2], ("age_band", 13, 2));
        assert_eq!(layout[4], ("student", 16, 1));
    }

    #[test]
    fn test_parse_row() {
        let schema = test_schema();
        let record = schema.parse_row(&row(&["E01000001", " 42 ", "3", "2", "y"])).unwrap();
        assert_eq!(schema.value(&record, "area").unwrap(), &FieldValue::Code("E01000001".to_string()));
        assert_eq!(schema.value(&record, "persons").unwrap(), &FieldValue::Int(42));
        assert_eq!(schema.value(&record, "student").unwrap(), &FieldValue::Bool(true));

        let record = schema.parse_row(&row(&["E01000001", "", "3", "2", ""])).unwrap();
        assert!(schema.value(&record, "persons").unwrap().is_missing());
        assert!(schema.value(&record, "student").unwrap().is_missing());
    }

    #[test]
    fn test_parse_row_failures() {
        let schema = test_schema();
        assert_eq!(schema.parse_row(&row(&["E01000001", "1", "3"])),
            Err(RowError::TooFewColumns{ expected : 5, found : 3 }));
        assert!(matches!(schema.parse_row(&row(&["E01000001", "x", "3", "2", "1"])),
            Err(RowError::Unparsable{ .. })));
        assert!(matches!(schema.parse_row(&row(&["E01000001", "1", "-9", "2", "1"])),
            Err(RowError::OutOfRange{ value : -9, .. })));
        assert!(matches!(schema.parse_row(&row(&["E01000001", "1", "3", "", "1"])),
            Err(RowError::MissingValue{ .. })));
        assert!(matches!(schema.parse_row(&row(&["E0100000199", "1", "3", "2", "1"])),
            Err(RowError::CodeTooWide{ .. })));
        //The smallest value of a type is reserved for the missing marker
        assert!(matches!(schema.parse_row(&row(&["E01", "1", "3", "-128", "1"])),
            Err(RowError::OutOfRange{ .. })));
    }

    #[test]
    fn test_encode_decode_with_missing_values() {
        let schema = test_schema();
        let records = [
            schema.record(vec![FieldValue::Code("E01000001".to_string()), FieldValue::Int(i32::MAX), FieldValue::Short(16), FieldValue::Byte(-1), FieldValue::Bool(false)]).unwrap(),
            schema.record(vec![FieldValue::Code(String::new()), FieldValue::Missing, FieldValue::Short(1), FieldValue::Byte(i8::MAX), FieldValue::Missing]).unwrap(),
        ];
        for record in records.iter() {
            let bytes = schema.encode(record).unwrap();
            assert_eq!(bytes.len(), schema.record_length());
            assert_eq!(&schema.decode(&bytes).unwrap(), record);
        }
    }

    #[test]
    fn test_reserved_and_mismatched_values_are_refused() {
        let schema = test_schema();
        assert!(schema.record(vec![FieldValue::Code("A".to_string()), FieldValue::Int(i32::MIN), FieldValue::Short(1), FieldValue::Byte(1), FieldValue::Bool(true)]).is_err());
        assert!(schema.record(vec![FieldValue::Missing, FieldValue::Int(1), FieldValue::Short(1), FieldValue::Byte(1), FieldValue::Bool(true)]).is_err());
        assert!(schema.record(vec![FieldValue::Code("A".to_string()), FieldValue::Short(1), FieldValue::Short(1), FieldValue::Byte(1), FieldValue::Bool(true)]).is_err());
        assert!(schema.record(vec![FieldValue::Code("A ".to_string()), FieldValue::Int(1), FieldValue::Short(1), FieldValue::Byte(1), FieldValue::Bool(true)]).is_err());
        assert!(schema.record(vec![FieldValue::Code("A".to_string())]).is_err());
    }

    #[test]
    fn test_zero_width_code_is_refused() {
        let fields = vec![
            FieldSpec::new("a", FieldKind::Byte, 0),
            FieldSpec::new("empty", FieldKind::Code(0), 1),
        ];
        match RecordSchema::new("tiny", fields) {
            Err(CensusError::InvalidValue{ field, .. }) => assert_eq!(field, "empty"),
            other => panic!("expected the zero-width field to be refused, got {other:?}"),
        }

        let schema = RecordSchema::new("tiny", vec![FieldSpec::new("code", FieldKind::Code(1), 0)]).unwrap();
        let record = schema.record(vec![FieldValue::Code("A".to_string())]).unwrap();
        assert_eq!(schema.decode(&schema.encode(&record).unwrap()).unwrap(), record);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let schema = test_schema();
        assert!(schema.decode(&[0u8; 3]).is_err());
    }

    #[test]
    fn test_display() {
        let schema = RecordSchema::new("tiny", vec![
            FieldSpec::new("a", FieldKind::Byte, 0),
            FieldSpec::new("b", FieldKind::Code(3), 1).nullable(),
        ]).unwrap();
        let record = schema.record(vec![FieldValue::Byte(7), FieldValue::Missing]).unwrap();
        assert_eq!(schema.display(&record), "a=7, b=NA");
    }
}
