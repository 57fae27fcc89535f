//! # census_store Overview
//!
//! A data-access layer for UK Census extracts.  It has two halves:
//!
//! - Geography lookup tables, which resolve published area codes (Output Areas, LSOAs, MSOAs and Local
//! Authority Districts) to compact surrogate IDs and answer hierarchy questions like "which LSOAs are
//! in Leeds".
//! - A fixed-length record store, which formats a delimited extract (the Samples of Anonymised Records,
//! workplace flows, deprivation indices, etc.) into a binary file with O(1) access by [RecordID], and
//! can sample records at random from secondary indexes.
//!
//! ## Lookup Tables & Areas
//!
//! [Luts] are built from an ordered list of correspondence files, each described by a
//! [CorrespondenceSchema] naming the columns that hold each level's codes.  Every code gets a surrogate
//! ID, typed by its level as an [AreaID], so an LSOA ID can't be passed where an OA ID is expected.
//!
//! Relationships that no single file states, such as LSOA to LAD when one file maps OAs to LSOAs and
//! another maps OAs to LADs, are derived while loading.  Contradictions between files are refused by
//! default; see [ConflictPolicy].
//!
//! The [Environment] wraps this for the common question "which codes at this level are inside this
//! district", building each [Vintage]'s tables the first time they're needed.
//!
//! ```
//! use census_store::{*};
//!
//! let dir = tempfile::tempdir().unwrap();
//! std::fs::write(dir.path().join("oa_lsoa.csv"), "OA,LSOA\nE00000001,E01000001\nE00000002,E01000001\n").unwrap();
//! std::fs::write(dir.path().join("oa_lad.csv"), "OA,LAD,LADNM\nE00000001,E08000035,Leeds\nE00000002,E08000035,Leeds\n").unwrap();
//!
//! let luts = Luts::load(&[
//!     CorrespondenceFile::new(dir.path().join("oa_lsoa.csv"), CorrespondenceSchema::new(&[(Level::Oa, 0), (Level::Lsoa, 1)])),
//!     CorrespondenceFile::new(dir.path().join("oa_lad.csv"), CorrespondenceSchema::new(&[(Level::Oa, 0), (Level::Lad, 1)]).with_names(&[(Level::Lad, 2)])),
//! ]).unwrap();
//!
//! //The LSOA to LAD relationship was derived from the two files
//! let lsoas = luts.codes_within(Level::Lsoa, Level::Lad, "Leeds").unwrap();
//! assert_eq!(lsoas.into_iter().collect::<Vec<_>>(), vec!["E01000001".to_string()]);
//!
//! let oa : AreaID<Oa> = luts.id("E00000002").unwrap();
//! let lsoa : AreaID<Lsoa> = luts.parent(oa).unwrap();
//! assert_eq!(luts.code(lsoa), Some("E01000001"));
//! ```
//!
//! ## Record Stores
//!
//! A [RecordStore] holds the records of one [RecordSchema].  A schema is a list of [FieldSpec]s, each a
//! name, a fixed-width [FieldKind], and the source column it's parsed from.  The schemas for the
//! published extracts are in [tables].
//!
//! ```
//! use census_store::{*};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let source = dir.path().join("hsar.tsv");
//! std::fs::write(&source, "id\tregion\tage\tsex\tpersons\ttenure\tcars\till\n\
//!     1\t3\t5\t1\t2\t1\t1\t0\n\
//!     2\t3\t5\t2\t4\t-9\t2\t1\n\
//!     3\t3\tx\t2\t4\t1\t2\t1\n").unwrap();
//!
//! let mut store = RecordStore::create(&dir.path().join("HSAR.dat"), tables::hsar().unwrap(), StoreConfig::default()).unwrap();
//! let report = store.format_source(&source, &SourceFormat::tab()).unwrap();
//! assert_eq!((report.loaded, report.skipped_count()), (2, 1));
//!
//! let record = store.get(RecordID(1)).unwrap();
//! assert!(store.schema().value(&record, "tenure").unwrap().is_missing());
//! ```
//!
//! Formatting never stops at a bad row: the row is skipped and listed in the [FormatReport].  I/O
//! errors are fatal.  Once formatted, [load_into_cache](RecordStore::load_into_cache) reads every
//! record into memory and builds the secondary indexes registered with
//! [add_index](RecordStore::add_index).
//!
//! ## Configuration
//!
//! Directory layout, the correspondence files of each vintage, and the I/O and conflict policies live
//! in a [CensusConfig], which can be loaded from YAML.  Lookup-table snapshots go through a [Coder],
//! [BincodeCoder] by default or [MsgPackCoder] under the `msgpack` feature.
//!
//! ## Logging
//!
//! Pass summaries and tolerated problems are reported with [tracing](https://docs.rs/tracing) macros.
//! This crate doesn't install a subscriber.
//!

mod error;
pub use error::{CensusError, Result};
mod area;
pub use area::{Level, AreaID, Geography, Oa, Lsoa, Msoa, Lad};
mod records;
pub use records::{RecordID, FieldValue, Record};
mod schema;
pub use schema::{FieldKind, FieldSpec, RecordSchema, RowError};
pub mod tables;
mod secondary_index;
pub use secondary_index::IndexSpec;
mod perf_counters;
pub use perf_counters::PerfCounterFields;
mod handler;
pub use handler::{RecordStore, StoreState, StoreConfig, SourceFormat, FormatReport, SkippedRow};
mod hierarchy;
mod luts;
pub use luts::{Luts, LutBuilder, CorrespondenceFile, CorrespondenceSchema, ConflictPolicy};
mod config;
pub use config::{CensusConfig, IoPolicy, Vintage, VintageLayout, CorrespondenceLayout};
mod environment;
pub use environment::Environment;
mod deprivation;
pub use deprivation::{BandingScheme, MissingRankPolicy, deprivation_class, TERMINAL_BAND};
mod encode_decode;
pub use encode_decode::Coder;
#[cfg(feature = "bincode")]
pub use encode_decode::bincode_interface::BincodeCoder;
#[cfg(feature = "msgpack")]
pub use encode_decode::msgpack_interface::MsgPackCoder;

/// The [Coder] used for lookup-table snapshots when no other is chosen
#[cfg(feature = "bincode")]
pub type DefaultCoder = BincodeCoder;
#[cfg(all(feature = "msgpack", not(feature = "bincode")))]
pub type DefaultCoder = MsgPackCoder;
