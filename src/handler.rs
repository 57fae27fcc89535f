//!
//! The Handler module contains the fixed-length record store, [RecordStore], and the types that
//! describe how a store is fed and configured.
//!

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Serialize, Deserialize};
use tracing::{debug, info, warn};

use crate::config::IoPolicy;
use crate::error::{CensusError, Result};
use crate::perf_counters::{PerfCounterFields, PerfCounters};
use crate::records::{FieldValue, Record, RecordID};
use crate::schema::{RecordSchema, RowError};
use crate::secondary_index::{IndexSpec, SecondaryIndex};

/// The lifecycle of a [RecordStore]
///
/// `Unformatted → Formatting → Formatted → Loaded`.  [RecordStore::unload_cache] goes back from
/// `Loaded` to `Formatted`, and [RecordStore::reset] goes back to `Unformatted` from anywhere.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StoreState {
    /// The store file is empty
    Unformatted,
    /// A format pass is writing the store file
    Formatting,
    /// The store file holds records, which are read by seeking
    Formatted,
    /// Every record is also held in memory, and the secondary indexes are built
    Loaded,
}

/// Per-store settings
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// The largest number of records [RecordStore::load_into_cache] will hold in memory
    ///
    /// Never more than `u32::MAX`, which is the range of [RecordID].
    #[serde(default = "StoreConfig::default_cache_limit")]
    pub cache_limit : u64,
    #[serde(default)]
    pub io_policy : IoPolicy,
}

impl StoreConfig {
    fn default_cache_limit() -> u64 {
        u32::MAX as u64
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self{
            cache_limit : Self::default_cache_limit(),
            io_policy : IoPolicy::default(),
        }
    }
}

/// How a delimited source file is tokenized
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFormat {
    pub delimiter : u8,
    pub has_header : bool,
    /// The quote character, or `None` to treat quotes as ordinary characters
    pub quote : Option<u8>,
}

impl Default for SourceFormat {
    fn default() -> Self {
        Self{
            delimiter : b',',
            has_header : true,
            quote : Some(b'"'),
        }
    }
}

impl SourceFormat {
    /// Tab-separated with a header line, which is how the SAR extracts are published
    pub fn tab() -> Self {
        Self{ delimiter : b'\t', ..Self::default() }
    }

    fn reader<R : Read>(&self, source : R) -> csv::Reader<R> {
        let mut builder = csv::ReaderBuilder::new();
        builder.delimiter(self.delimiter)
            .has_headers(self.has_header)
            .flexible(true);
        match self.quote {
            Some(quote) => builder.quote(quote),
            None => builder.quoting(false),
        };
        builder.from_reader(source)
    }
}

/// A source row that didn't become a record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedRow {
    /// 1-based line of the source file the row starts on
    pub line : u64,
    pub reason : RowError,
}

/// The outcome of [RecordStore::format_source]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormatReport {
    /// The number of records written, which is also the store's new record count
    pub loaded : u64,
    pub skipped : Vec<SkippedRow>,
}

impl FormatReport {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// A binary file of fixed-length records, addressed by [RecordID]
///
/// Every record of a store is [record_length](RecordSchema::record_length) bytes, and they're
/// concatenated with no header, footer or separator, so record `i` is at byte `i * record_length`.
/// That makes a random read one seek and one read, with or without the in-memory cache.
///
/// ## Formatting
///
/// A store gets its records from a delimited source file through [format_source](RecordStore::format_source).
/// Rows the schema can't parse are skipped and reported, never fatal; I/O failures are fatal.
///
/// ## Cache & Indexes
///
/// [load_into_cache](RecordStore::load_into_cache) reads the whole store into memory, after which
/// [get](RecordStore::get) is a vector lookup.  Secondary indexes ([IndexSpec]) group the RecordIDs of
/// cached records by a tuple of field values, and are rebuilt from scratch on every load.  They're
/// what [get_random](RecordStore::get_random) samples from.
pub struct RecordStore {
    path : PathBuf,
    schema : RecordSchema,
    config : StoreConfig,
    file : File,
    state : StoreState,
    record_count : u64,
    cache : Vec<Record>,
    indexes : Vec<SecondaryIndex>,
    perf_counters : PerfCounters,
}

impl RecordStore {

    /// Creates an empty store at `path`, replacing any file that is already there
    pub fn create(path : &Path, schema : RecordSchema, config : StoreConfig) -> Result<Self> {
        if schema.record_length() == 0 {
            return Err(CensusError::InvalidValue{ field : schema.name().to_string(), reason : "schema has zero-length records".to_string() });
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = config.io_policy.open(path, OpenOptions::new().read(true).write(true).create(true).truncate(true))?;
        Ok(Self::with_file(path, schema, config, file, StoreState::Unformatted, 0))
    }

    /// Opens a store a previous run formatted
    ///
    /// The file length must be a whole number of records, otherwise the store is refused as corrupt.
    pub fn open(path : &Path, schema : RecordSchema, config : StoreConfig) -> Result<Self> {
        let record_length = schema.record_length() as u64;
        if record_length == 0 {
            return Err(CensusError::InvalidValue{ field : schema.name().to_string(), reason : "schema has zero-length records".to_string() });
        }
        let file = config.io_policy.open_read(path)?;
        let file_len = file.metadata()?.len();
        if file_len % record_length != 0 {
            return Err(CensusError::CorruptStore{
                path : path.to_path_buf(),
                reason : format!("length {file_len} is not a multiple of the {record_length} byte {} record length", schema.name()),
            });
        }
        let record_count = file_len / record_length;
        let state = if record_count == 0 { StoreState::Unformatted } else { StoreState::Formatted };
        debug!("opened {:?} with {} {} records", path, record_count, schema.name());
        Ok(Self::with_file(path, schema, config, file, state, record_count))
    }

    fn with_file(path : &Path, schema : RecordSchema, config : StoreConfig, file : File, state : StoreState, record_count : u64) -> Self {
        Self{
            path : path.to_path_buf(),
            schema,
            config,
            file,
            state,
            record_count,
            cache : vec![],
            indexes : vec![],
            perf_counters : PerfCounters::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    pub fn state(&self) -> StoreState {
        self.state
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// The cached records in RecordID order.  Empty unless the store is [Loaded](StoreState::Loaded)
    pub fn records(&self) -> &[Record] {
        &self.cache
    }

    /// Replaces the store's contents with every parsable row of `source`
    ///
    /// Rows that fail to parse are skipped and listed in the returned [FormatReport].  An I/O error,
    /// on either side, aborts the pass and leaves the store empty and [Unformatted](StoreState::Unformatted).
    pub fn format_source(&mut self, source : &Path, format : &SourceFormat) -> Result<FormatReport> {

        match self.state {
            StoreState::Unformatted | StoreState::Formatted => {},
            state => return Err(CensusError::InvalidState(format!("cannot format a store that is {state:?}"))),
        }

        //Open the source before touching the store, so a missing source leaves the store as it was
        let source_file = self.config.io_policy.open_read(source)?;

        let report = self.format_from(source_file, format)?;
        info!("{}: {} rows loaded, {} rows skipped from {:?}", self.schema.name(), report.loaded, report.skipped_count(), source);
        Ok(report)
    }

    fn format_from<R : Read>(&mut self, source : R, format : &SourceFormat) -> Result<FormatReport> {

        self.cache.clear();
        for index in self.indexes.iter_mut() {
            index.rebuild(&[]);
        }
        self.state = StoreState::Formatting;

        let written = self.write_records(source, format)
            .and_then(|report| Ok((report, self.config.io_policy.open_read(&self.path)?)));

        match written {
            Ok((report, file)) => {
                self.file = file;
                self.record_count = report.loaded;
                self.state = StoreState::Formatted;
                Ok(report)
            },
            Err(err) => {
                //Partial records left behind would pass for a formatted store when it's reopened
                if let Err(reset_err) = self.reset() {
                    warn!("{}: could not empty {:?} after a failed format pass: {}", self.schema.name(), self.path, reset_err);
                    self.record_count = 0;
                    self.state = StoreState::Unformatted;
                }
                Err(err)
            }
        }
    }

    fn write_records<R : Read>(&self, source : R, format : &SourceFormat) -> Result<FormatReport> {

        let out_file = self.config.io_policy.open(&self.path, OpenOptions::new().write(true).create(true).truncate(true))?;
        let mut writer = BufWriter::new(out_file);
        let mut csv_reader = format.reader(BufReader::new(source));

        let mut report = FormatReport::default();
        let mut buf = Vec::with_capacity(self.schema.record_length());
        let mut row = csv::StringRecord::new();

        loop {
            let (line, parsed) = match csv_reader.read_record(&mut row) {
                Ok(false) => break,
                Ok(true) => (row.position().map(|pos| pos.line()).unwrap_or(0), self.schema.parse_row(&row)),
                Err(err) if is_io_error(&err) => return Err(err.into()),
                Err(err) => (err.position().map(|pos| pos.line()).unwrap_or(0), Err(RowError::Tokenizer(err.to_string()))),
            };

            match parsed {
                Ok(record) => {
                    buf.clear();
                    self.schema.encode_into(&record, &mut buf)?;
                    writer.write_all(&buf)?;
                    report.loaded += 1;
                },
                Err(reason) => {
                    debug!("{}: skipping line {}: {}", self.schema.name(), line, reason);
                    report.skipped.push(SkippedRow{ line, reason });
                }
            }
        }

        writer.flush()?;
        Ok(report)
    }

    /// Reads every record into memory and builds the secondary indexes
    pub fn load_into_cache(&mut self) -> Result<()> {

        match self.state {
            StoreState::Formatted | StoreState::Loaded => {},
            state => return Err(CensusError::InvalidState(format!("cannot load a store that is {state:?}"))),
        }

        let limit = self.config.cache_limit.min(u32::MAX as u64);
        if self.record_count > limit {
            return Err(CensusError::AddressingOverflow{ record_count : self.record_count, limit });
        }

        let record_length = self.schema.record_length();
        let mut cache = Vec::with_capacity(self.record_count as usize);
        let mut file = &self.file;
        file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(file);
        let mut buf = vec![0u8; record_length];
        for _ in 0..self.record_count {
            reader.read_exact(&mut buf)?;
            cache.push(self.schema.decode(&buf)?);
        }
        self.cache = cache;

        for index in self.indexes.iter_mut() {
            index.rebuild(&self.cache);
        }
        self.state = StoreState::Loaded;
        info!("{}: cached {} records, built {} indexes", self.schema.name(), self.cache.len(), self.indexes.len());
        Ok(())
    }

    /// Drops the cache and the index buckets, keeping the index definitions
    pub fn unload_cache(&mut self) {
        if self.state == StoreState::Loaded {
            self.cache = vec![];
            for index in self.indexes.iter_mut() {
                index.rebuild(&[]);
            }
            self.state = StoreState::Formatted;
        }
    }

    /// Returns a record, from the cache if it's loaded, otherwise from the store file
    pub fn get(&self, id : RecordID) -> Result<Record> {
        self.check_id(id)?;
        if self.state == StoreState::Loaded {
            self.perf_counters.update(|fields| fields.cache_hit_count += 1);
            return Ok(self.cache[id.index()].clone());
        }
        self.read_record(id)
    }

    /// Returns a record read from the store file, even if the cache is loaded
    pub fn read_direct(&self, id : RecordID) -> Result<Record> {
        self.check_id(id)?;
        self.read_record(id)
    }

    fn check_id(&self, id : RecordID) -> Result<()> {
        if id.0 as u64 >= self.record_count {
            return Err(CensusError::RecordOutOfRange{ id, record_count : self.record_count });
        }
        Ok(())
    }

    fn read_record(&self, id : RecordID) -> Result<Record> {
        let record_length = self.schema.record_length();
        let mut buf = vec![0u8; record_length];
        let mut file = &self.file;
        file.seek(SeekFrom::Start(id.byte_offset(record_length)))?;
        file.read_exact(&mut buf)?;
        self.perf_counters.update(|fields| fields.direct_read_count += 1);
        self.schema.decode(&buf)
    }

    /// Registers a secondary index.  It's built now if the cache is loaded, otherwise on the next load
    pub fn add_index(&mut self, spec : IndexSpec) -> Result<()> {
        if self.indexes.iter().any(|index| index.name() == spec.name) {
            return Err(CensusError::InvalidState(format!("index '{}' is already registered", spec.name)));
        }
        let mut index = SecondaryIndex::new(spec, &self.schema)?;
        if self.state == StoreState::Loaded {
            index.rebuild(&self.cache);
        }
        self.indexes.push(index);
        Ok(())
    }

    /// The specs of every registered index
    pub fn index_specs(&self) -> impl Iterator<Item=&IndexSpec> {
        self.indexes.iter().map(|index| index.spec())
    }

    fn loaded_index(&self, index_name : &str) -> Result<&SecondaryIndex> {
        if self.state != StoreState::Loaded {
            return Err(CensusError::InvalidState(format!("index '{index_name}' is only available once the cache is loaded")));
        }
        self.indexes.iter()
            .find(|index| index.name() == index_name)
            .ok_or_else(|| CensusError::UnknownIndex(index_name.to_string()))
    }

    /// The RecordIDs whose index fields equal `key`, in ascending order
    pub fn bucket(&self, index_name : &str, key : &[FieldValue]) -> Result<&[RecordID]> {
        Ok(self.loaded_index(index_name)?.bucket(key))
    }

    /// Picks a record uniformly at random from the bucket for `key`
    ///
    /// Returns `Ok(None)` when no record has that key.  Passing a seeded `rng` makes the draws
    /// reproducible.
    pub fn get_random<R : Rng + ?Sized>(&self, index_name : &str, key : &[FieldValue], rng : &mut R) -> Result<Option<Record>> {
        let index = self.loaded_index(index_name)?;
        match index.choose(key, rng) {
            Some(id) => {
                self.perf_counters.update(|fields| fields.random_draw_count += 1);
                Ok(Some(self.cache[id.index()].clone()))
            },
            None => {
                self.perf_counters.update(|fields| fields.empty_bucket_count += 1);
                Ok(None)
            }
        }
    }

    /// Empties the store file and returns it to [Unformatted](StoreState::Unformatted)
    pub fn reset(&mut self) -> Result<()> {
        let file = self.config.io_policy.open(&self.path, OpenOptions::new().read(true).write(true).create(true).truncate(true))?;
        self.file = file;
        self.cache = vec![];
        for index in self.indexes.iter_mut() {
            index.rebuild(&[]);
        }
        self.record_count = 0;
        self.state = StoreState::Unformatted;
        Ok(())
    }

    /// Returns the access counters.  All zero unless the `perf_counters` feature is enabled
    pub fn perf_counters(&self) -> PerfCounterFields {
        self.perf_counters.get()
    }

    pub fn reset_perf_counters(&self) {
        self.perf_counters.reset()
    }
}

fn is_io_error(err : &csv::Error) -> bool {
    matches!(err.kind(), csv::ErrorKind::Io(_))
}
