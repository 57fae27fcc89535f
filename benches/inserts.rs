use std::fmt::Write as _;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use census_store::{*};

pub fn format_benchmark(c: &mut Criterion) {

    //A synthetic household extract, with the odd malformed row so the skip path is exercised too
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("hsar.tsv");
    let mut rng = Pcg64::seed_from_u64(2001);
    let mut rows = String::from("id\tregion\thrp_age\thrp_sex\tpersons\ttenure\tcars\tillness\n");
    for id in 0..20_000 {
        if id % 1000 == 999 {
            writeln!(rows, "{id}\t3\tunknown").unwrap();
            continue;
        }
        let cars = if rng.gen_bool(0.1) { "-9".to_string() } else { rng.gen_range(0..=4).to_string() };
        writeln!(rows, "{id}\t{}\t{}\t{}\t{}\t{}\t{cars}\t{}",
            rng.gen_range(1..=12), rng.gen_range(1..=16), rng.gen_range(1..=2), rng.gen_range(1..=8),
            rng.gen_range(1..=9), rng.gen_range(0..=1)).unwrap();
    }
    std::fs::write(&source, rows).unwrap();

    let mut store = RecordStore::create(&dir.path().join("HSAR.dat"), tables::hsar().unwrap(), StoreConfig::default()).unwrap();

    c.bench_function("format_hsar_20k", |b| b.iter(|| black_box( {
        let report = store.format_source(&source, &SourceFormat::tab()).unwrap();
        assert_eq!(report.skipped_count(), 20);
    })));

    store.add_index(tables::hsar_hrp_age_sex_index()).unwrap();
    c.bench_function("load_hsar_20k_with_index", |b| b.iter(|| black_box( {
        store.load_into_cache().unwrap();
        store.unload_cache();
    })));
}

pub fn lut_build_benchmark(c: &mut Criterion) {

    let dir = tempfile::tempdir().unwrap();
    let mut oa_lsoa_msoa = String::from("OA11CD,LSOA11CD,LSOA11NM,MSOA11CD\n");
    let mut oa_lad = String::from("OA01CD,OA11CD,CHGIND,UNUSED,LAD11CD,LAD11NM\n");
    for oa in 0..10_000 {
        let (lsoa, msoa, lad) = (oa / 5, oa / 25, oa / 500);
        writeln!(oa_lsoa_msoa, "E{oa:08},E01{lsoa:06},,E02{msoa:06}").unwrap();
        writeln!(oa_lad, "E{oa:08},E{oa:08},U,,E08{lad:06},\"District {lad}, North\"").unwrap();
    }
    std::fs::write(dir.path().join("OA11_LSOA11_MSOA11_EW_LU.csv"), oa_lsoa_msoa).unwrap();
    std::fs::write(dir.path().join("OA01_OA11_LAD11_EW_LU.csv"), oa_lad).unwrap();
    let files = CensusConfig::new(dir.path(), dir.path(), dir.path()).correspondence_files(Vintage::Census2011).unwrap();

    c.bench_function("build_luts_10k_oas", |b| b.iter(|| black_box( {
        let luts = Luts::load(&files).unwrap();
        assert_eq!(luts.level_len(Level::Lad), 20);
    })));
}

criterion_group!(benches, format_benchmark, lut_build_benchmark);
criterion_main!(benches);
