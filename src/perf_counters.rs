//!
//! The PerfCounters module contains everything associated with the "perf_counters" feature
//!

#[cfg(feature = "perf_counters")]
use core::cell::Cell;

/// Access counters for a [RecordStore](crate::RecordStore)
///
/// The counters can be reset, so they measure a single operation or sequence of operations rather
/// than the whole life of the store.
///
/// NOTE: In order to get valid data, you must enable the `perf_counters` feature in the `Cargo.toml` file
/// with an entry similar to this:
///
/// ```toml
/// [dependencies]
/// census_store = { version = "0.4.0", features = ["perf_counters"] }
/// ```
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct PerfCounterFields {

    /// The number of [get](crate::RecordStore::get) calls answered from the in-memory cache
    pub cache_hit_count : usize,

    /// The number of records read by seeking in the store file, either because the cache wasn't
    /// loaded or through [read_direct](crate::RecordStore::read_direct)
    pub direct_read_count : usize,

    /// The number of [get_random](crate::RecordStore::get_random) calls that found a non-empty bucket
    pub random_draw_count : usize,

    /// The number of [get_random](crate::RecordStore::get_random) calls whose bucket was empty
    ///
    /// A high ratio of empty draws to `random_draw_count` means the index key is finer than the
    /// population it's sampling.
    pub empty_bucket_count : usize,
}

impl PerfCounterFields {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "perf_counters")]
pub struct PerfCounters(Cell<PerfCounterFields>);

#[cfg(feature = "perf_counters")]
impl PerfCounters {
    pub fn new() -> Self {
        Self(Cell::new(PerfCounterFields::new()))
    }
    pub fn reset(&self) {
        self.0.set(PerfCounterFields::new())
    }
    pub fn update<F : Fn(&mut PerfCounterFields)>(&self, func : F) {
        let mut fields = self.0.get();
        func(&mut fields);
        self.0.set(fields);
    }
    pub fn get(&self) -> PerfCounterFields {
        self.0.get()
    }
}

#[cfg(not(feature = "perf_counters"))]
pub struct PerfCounters();

#[cfg(not(feature = "perf_counters"))]
impl PerfCounters {
    pub fn new() -> Self {
        Self()
    }
    pub fn reset(&self) {
    }
    pub fn update<F : Fn(&mut PerfCounterFields)>(&self, _func : F) {
    }
    pub fn get(&self) -> PerfCounterFields {
        PerfCounterFields::new()
    }
}
