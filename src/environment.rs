//!
//! The Environment module contains the area-code query facade.  [Environment] is re-exported.
//!

use std::collections::BTreeSet;

use once_cell::unsync::OnceCell;
use tracing::info;

use crate::area::Level;
use crate::config::{CensusConfig, Vintage};
use crate::error::Result;
use crate::luts::{LutBuilder, Luts};

/// Answers "which area codes at level L are inside area P" for each census vintage
///
/// Each vintage's lookup tables are built on first use, from the correspondence files named by the
/// [CensusConfig], and reused for every later query on the same `Environment`.  A failed build is
/// returned to the caller and nothing is cached, so the next query tries again.
///
/// An `Environment` is single-threaded; it is neither `Sync` nor meant to be shared.
pub struct Environment {
    config : CensusConfig,
    luts : [OnceCell<Luts>; 2],
}

impl Environment {

    pub fn new(config : CensusConfig) -> Self {
        Self{
            config,
            luts : [OnceCell::new(), OnceCell::new()],
        }
    }

    pub fn config(&self) -> &CensusConfig {
        &self.config
    }

    /// Returns the lookup tables for a vintage, building them if this is the first access
    pub fn luts(&self, vintage : Vintage) -> Result<&Luts> {
        self.luts[vintage.index()].get_or_try_init(|| {
            info!("building {:?} lookup tables", vintage);
            let files = self.config.correspondence_files(vintage)?;
            LutBuilder::new()
                .with_conflict_policy(self.config.conflict_policy)
                .with_io_policy(self.config.io_policy)
                .load(&files)
        })
    }

    pub fn is_built(&self, vintage : Vintage) -> bool {
        self.luts[vintage.index()].get().is_some()
    }

    /// Returns the codes at `level_name` inside the local authority district called `area_name`
    ///
    /// `level_name` is one of `OA`, `LSOA` or `MSOA`, in any case.  The level is checked before the
    /// tables are built, so a bad level never costs a build.
    pub fn codes(&self, vintage : Vintage, level_name : &str, area_name : &str) -> Result<BTreeSet<String>> {
        let level = Level::parse_query_level(level_name)?;
        self.luts(vintage)?.codes_within(level, Level::Lad, area_name)
    }

    pub fn oa_codes(&self, vintage : Vintage, area_name : &str) -> Result<BTreeSet<String>> {
        self.luts(vintage)?.codes_within(Level::Oa, Level::Lad, area_name)
    }

    pub fn lsoa_codes(&self, vintage : Vintage, area_name : &str) -> Result<BTreeSet<String>> {
        self.luts(vintage)?.codes_within(Level::Lsoa, Level::Lad, area_name)
    }

    pub fn msoa_codes(&self, vintage : Vintage, area_name : &str) -> Result<BTreeSet<String>> {
        self.luts(vintage)?.codes_within(Level::Msoa, Level::Lad, area_name)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;
    use crate::error::CensusError;

    fn write_lookups(dir : &Path) {
        fs::write(dir.join("OA11_LSOA11_MSOA11_EW_LU.csv"), "OA11CD,LSOA11CD,LSOA11NM,MSOA11CD\n\
            E00000001,E01000001,Leeds 001A,E02000001\n\
            E00000002,E01000001,Leeds 001A,E02000001\n\
            E00000003,E01000002,Leeds 001B,E02000001\n").unwrap();
        fs::write(dir.join("OA01_OA11_LAD11_EW_LU.csv"), "OA01CD,OA11CD,CHGIND,UNUSED,LAD11CD,LAD11NM\n\
            E00000001,E00000001,U,,E08000035,Leeds\n\
            E00000002,E00000002,U,,E08000035,Leeds\n\
            E00000003,E00000003,U,,E08000035,Leeds\n").unwrap();
    }

    fn environment(dir : &Path) -> Environment {
        Environment::new(CensusConfig::new(dir.join("source"), dir.join("stores"), dir))
    }

    #[test]
    fn test_codes_by_level_name() {
        let dir = tempfile::tempdir().unwrap();
        write_lookups(dir.path());
        let env = environment(dir.path());

        assert_eq!(env.codes(Vintage::Census2011, "lsoa", "Leeds").unwrap().len(), 2);
        assert_eq!(env.codes(Vintage::Census2011, "MSOA", "Leeds").unwrap().into_iter().collect::<Vec<_>>(),
            vec!["E02000001".to_string()]);
        assert_eq!(env.oa_codes(Vintage::Census2011, "Leeds").unwrap().len(), 3);
        assert_eq!(env.lsoa_codes(Vintage::Census2011, "E08000035").unwrap(), env.codes(Vintage::Census2011, "LSOA", "Leeds").unwrap());
        assert_eq!(env.msoa_codes(Vintage::Census2011, "Leeds").unwrap().len(), 1);
    }

    #[test]
    fn test_tables_are_built_once() {
        let dir = tempfile::tempdir().unwrap();
        write_lookups(dir.path());
        let env = environment(dir.path());

        assert!(!env.is_built(Vintage::Census2011));
        let first = env.luts(Vintage::Census2011).unwrap() as *const Luts;
        assert!(env.is_built(Vintage::Census2011));

        //Removing the source files proves the second query doesn't rebuild
        fs::remove_file(dir.path().join("OA11_LSOA11_MSOA11_EW_LU.csv")).unwrap();
        let second = env.luts(Vintage::Census2011).unwrap() as *const Luts;
        assert_eq!(first, second);
        assert!(env.oa_codes(Vintage::Census2011, "Leeds").is_ok());
        assert!(!env.is_built(Vintage::Census2001));
    }

    #[test]
    fn test_failed_build_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let env = environment(dir.path());
        assert!(matches!(env.oa_codes(Vintage::Census2011, "Leeds"), Err(CensusError::Io(_))));
        assert!(!env.is_built(Vintage::Census2011));

        write_lookups(dir.path());
        assert_eq!(env.oa_codes(Vintage::Census2011, "Leeds").unwrap().len(), 3);
    }

    #[test]
    fn test_unknown_area_and_level() {
        let dir = tempfile::tempdir().unwrap();
        write_lookups(dir.path());
        let env = environment(dir.path());

        assert!(matches!(env.oa_codes(Vintage::Census2011, "Unknown District"),
            Err(CensusError::AreaNotRecognised(name)) if name == "Unknown District"));
        assert!(matches!(env.codes(Vintage::Census2011, "ward", "Leeds"), Err(CensusError::UnknownLevel(_))));
        assert!(matches!(env.codes(Vintage::Census2011, "LAD", "Leeds"), Err(CensusError::UnknownLevel(_))));

        //The level is refused before any build is attempted, so there's no IO error here
        let empty = tempfile::tempdir().unwrap();
        let env = environment(empty.path());
        assert!(matches!(env.codes(Vintage::Census2011, "ward", "Leeds"), Err(CensusError::UnknownLevel(_))));
        assert!(!env.is_built(Vintage::Census2011));
    }
}
