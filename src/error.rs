//!
//! The Error module contains the single error type shared by every part of the crate.  [CensusError]
//! and the [Result] alias are re-exported.
//!

use std::path::PathBuf;

use thiserror::Error;

use crate::area::Level;
use crate::records::RecordID;

/// Every failure surfaced by the LUT builder, the area-code facade, and the record stores
///
/// NOTE: Rows that fail to parse while formatting a store are NOT reported through this type.
/// They are collected into a [FormatReport](crate::FormatReport) instead, because one bad row must
/// never abort the ingestion of the rest of the file.
#[derive(Debug, Error)]
pub enum CensusError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Encoding or decoding a LUT snapshot failed
    #[error("Codec error: {0}")]
    Codec(String),

    /// A correspondence file row is unusable.  Fatal for the whole LUT build.
    #[error("Malformed row in {path:?} at line {line}: {reason}")]
    MalformedRow { path : PathBuf, line : u64, reason : String },

    /// A later correspondence file names an area at a level that an earlier file populated, but the
    /// earlier file never mentioned that code
    #[error("{level} code '{code}' in {path:?} at line {line} is not present in the lookup tables built from earlier files")]
    UnknownAreaReference { level : Level, code : String, path : PathBuf, line : u64 },

    /// A child area was attributed to two different parents
    #[error("{child_level} '{child}' already belongs to {parent_level} '{existing}', cannot also belong to '{conflicting}'")]
    HierarchyConflict {
        child_level : Level,
        child : String,
        parent_level : Level,
        existing : String,
        conflicting : String,
    },

    /// A child area has no parent in a level pair that the lookup tables cover
    #[error("{child_level} '{child}' has no {parent_level} parent")]
    OrphanArea { child_level : Level, child : String, parent_level : Level },

    #[error("Area name not recognised: '{0}'")]
    AreaNotRecognised(String),

    #[error("Unknown geography level '{0}'. Valid levels: OA, LSOA, MSOA")]
    UnknownLevel(String),

    #[error("No {child} to {parent} relationship in the lookup tables")]
    UnknownLevelPair { child : Level, parent : Level },

    #[error("Unknown secondary index '{0}'")]
    UnknownIndex(String),

    #[error("Unknown field '{field}' in schema '{schema}'")]
    UnknownField { schema : String, field : String },

    #[error("Record {id} is out of range, store holds {record_count} records")]
    RecordOutOfRange { id : RecordID, record_count : u64 },

    /// The in-memory cache is indexed by [RecordID], so it cannot hold more records than that type addresses
    #[error("Store holds {record_count} records, exceeding the cache limit of {limit}")]
    AddressingOverflow { record_count : u64, limit : u64 },

    #[error("Corrupt store {path:?}: {reason}")]
    CorruptStore { path : PathBuf, reason : String },

    #[error("Invalid store state: {0}")]
    InvalidState(String),

    #[error("Invalid value for field '{field}': {reason}")]
    InvalidValue { field : String, reason : String },

    /// A record has no usable deprivation rank and the policy forbids substituting one
    #[error("Record has no rank in field '{0}'")]
    MissingRank(String),

    #[error("Snapshot was written by {found}, which is incompatible with {current}")]
    IncompatibleSnapshot { found : String, current : String },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, CensusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_offending_name() {
        let err = CensusError::AreaNotRecognised("Unknown District".to_string());
        assert!(err.to_string().contains("Unknown District"));

        let err = CensusError::UnknownLevel("ward".to_string());
        assert!(err.to_string().contains("'ward'"));

        let err = CensusError::RecordOutOfRange { id : RecordID(5), record_count : 5 };
        assert_eq!(err.to_string(), "Record 5 is out of range, store holds 5 records");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err : CensusError = io.into();
        assert!(matches!(err, CensusError::Io(_)));
    }
}
