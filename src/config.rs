//!
//! The Config module contains the externally supplied configuration: where the raw extracts, the
//! binary stores and the correspondence files live, how each census vintage's lookup tables are
//! assembled, and the I/O policy.  Everything here is re-exported.
//!

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Serialize, Deserialize};
use tracing::warn;

use crate::area::Level;
use crate::error::{CensusError, Result};
use crate::luts::{ConflictPolicy, CorrespondenceFile, CorrespondenceSchema};

/// What to do when opening a file fails
///
/// The default is to fail immediately, which suits a one-shot offline run.  `Retry` is for sources on
/// flaky mounts; it is applied only to opening files, never to reads or writes partway through a pass.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum IoPolicy {
    #[default]
    FailFast,
    Retry { attempts : u32, delay_ms : u64 },
}

impl IoPolicy {

    /// Opens `path` with `options`, retrying according to the policy
    pub fn open(&self, path : &Path, options : &OpenOptions) -> io::Result<File> {
        match *self {
            IoPolicy::FailFast => options.open(path),
            IoPolicy::Retry { attempts, delay_ms } => {
                let mut attempt = 1;
                loop {
                    match options.open(path) {
                        Ok(file) => return Ok(file),
                        Err(err) if attempt < attempts.max(1) => {
                            warn!("open {:?} failed (attempt {}/{}): {}", path, attempt, attempts, err);
                            std::thread::sleep(Duration::from_millis(delay_ms));
                            attempt += 1;
                        },
                        Err(err) => return Err(err),
                    }
                }
            }
        }
    }

    /// Opens `path` read-only
    pub fn open_read(&self, path : &Path) -> io::Result<File> {
        self.open(path, OpenOptions::new().read(true))
    }
}

/// A census vintage.  Each vintage has its own geography, so each gets its own lookup tables.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Vintage {
    #[serde(rename = "census2001")]
    Census2001,
    #[serde(rename = "census2011")]
    Census2011,
}

impl Vintage {
    pub const ALL : [Vintage; 2] = [Vintage::Census2001, Vintage::Census2011];

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

/// One correspondence file of a vintage, with its path relative to [CensusConfig::lut_dir]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorrespondenceLayout {
    pub file : PathBuf,
    pub schema : CorrespondenceSchema,
}

/// The ordered correspondence files a vintage's lookup tables are built from
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VintageLayout {
    pub vintage : Vintage,
    pub files : Vec<CorrespondenceLayout>,
}

/// Top-level configuration
///
/// ```yaml
/// source_dir: /data/census/raw
/// store_dir: /data/census/stores
/// lut_dir: /data/census/lookups
/// io_policy:
///   mode: retry
///   attempts: 3
///   delay_ms: 500
/// conflict_policy: reject
/// ```
///
/// `vintages` may be omitted, in which case [CensusConfig::default_vintages] is used.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CensusConfig {
    /// Directory containing the raw extracts
    pub source_dir : PathBuf,
    /// Directory the binary stores are written to
    pub store_dir : PathBuf,
    /// Directory containing the correspondence files
    pub lut_dir : PathBuf,
    #[serde(default)]
    pub io_policy : IoPolicy,
    #[serde(default)]
    pub conflict_policy : ConflictPolicy,
    #[serde(default = "CensusConfig::default_vintages")]
    pub vintages : Vec<VintageLayout>,
}

impl Default for CensusConfig {
    fn default() -> Self {
        Self{
            source_dir : PathBuf::from("data/source"),
            store_dir : PathBuf::from("data/stores"),
            lut_dir : PathBuf::from("data/lookups"),
            io_policy : IoPolicy::default(),
            conflict_policy : ConflictPolicy::default(),
            vintages : Self::default_vintages(),
        }
    }
}

impl CensusConfig {

    /// Creates a config with the default vintage layouts, rooted at the given directories
    pub fn new(source_dir : impl Into<PathBuf>, store_dir : impl Into<PathBuf>, lut_dir : impl Into<PathBuf>) -> Self {
        Self{
            source_dir : source_dir.into(),
            store_dir : store_dir.into(),
            lut_dir : lut_dir.into(),
            ..Self::default()
        }
    }

    /// The published correspondence layouts.
    ///
    /// Both vintages take their OA / LSOA / MSOA nesting from a file with columns
    /// `OA, LSOA, LSOA name, MSOA`, then take LADs from the 2001-to-2011 OA lookup with columns
    /// `OA01, OA11, change flag, LAD11 code, LAD11 name`.
    pub fn default_vintages() -> Vec<VintageLayout> {
        let oa_lsoa_msoa = CorrespondenceSchema::new(&[(Level::Oa, 0), (Level::Lsoa, 1), (Level::Msoa, 3)]);
        vec![
            VintageLayout{
                vintage : Vintage::Census2001,
                files : vec![
                    CorrespondenceLayout{ file : PathBuf::from("OA01_LSOA01_MSOA01_EW_LU.csv"), schema : oa_lsoa_msoa.clone() },
                    CorrespondenceLayout{
                        file : PathBuf::from("OA01_OA11_LAD11_EW_LU.csv"),
                        schema : CorrespondenceSchema::new(&[(Level::Oa, 0), (Level::Lad, 4)]).with_names(&[(Level::Lad, 5)]),
                    },
                ],
            },
            VintageLayout{
                vintage : Vintage::Census2011,
                files : vec![
                    CorrespondenceLayout{ file : PathBuf::from("OA11_LSOA11_MSOA11_EW_LU.csv"), schema : oa_lsoa_msoa },
                    CorrespondenceLayout{
                        file : PathBuf::from("OA01_OA11_LAD11_EW_LU.csv"),
                        schema : CorrespondenceSchema::new(&[(Level::Oa, 1), (Level::Lad, 4)]).with_names(&[(Level::Lad, 5)]),
                    },
                ],
            },
        ]
    }

    pub fn from_yaml_str(yaml : &str) -> Result<Self> {
        let config : Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path : &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Checks every vintage has a usable layout
    pub fn validate(&self) -> Result<()> {
        for vintage in Vintage::ALL {
            if self.vintages.iter().filter(|layout| layout.vintage == vintage).count() > 1 {
                return Err(CensusError::Config(format!("{vintage:?} is configured more than once")));
            }
        }
        for layout in self.vintages.iter() {
            if layout.files.is_empty() {
                return Err(CensusError::Config(format!("{:?} has no correspondence files", layout.vintage)));
            }
            for file in layout.files.iter() {
                file.schema.validate().map_err(|reason| CensusError::Config(format!("{:?}: {}", file.file, reason)))?;
            }
        }
        Ok(())
    }

    /// The correspondence files for a vintage, resolved against [lut_dir](Self::lut_dir)
    pub fn correspondence_files(&self, vintage : Vintage) -> Result<Vec<CorrespondenceFile>> {
        let layout = self.vintages.iter()
            .find(|layout| layout.vintage == vintage)
            .ok_or_else(|| CensusError::Config(format!("no correspondence files configured for {vintage:?}")))?;

        Ok(layout.files.iter()
            .map(|file| CorrespondenceFile::new(self.lut_path(&file.file), file.schema.clone()))
            .collect())
    }

    pub fn source_path(&self, file_name : impl AsRef<Path>) -> PathBuf {
        self.source_dir.join(file_name)
    }

    pub fn lut_path(&self, file_name : impl AsRef<Path>) -> PathBuf {
        self.lut_dir.join(file_name)
    }

    /// Where the binary store for a table lives, e.g. `store_dir/HSAR.dat`
    pub fn store_path(&self, table_name : &str) -> PathBuf {
        self.store_dir.join(format!("{table_name}.dat"))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_yaml_loading_with_defaults() {
        let yaml = r#"
source_dir: /data/raw
store_dir: /data/stores
lut_dir: /data/lookups
"#;
        let config = CensusConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.io_policy, IoPolicy::FailFast);
        assert_eq!(config.conflict_policy, ConflictPolicy::Reject);
        assert_eq!(config.vintages, CensusConfig::default_vintages());
        assert_eq!(config.store_path("HSAR"), PathBuf::from("/data/stores/HSAR.dat"));

        let files = config.correspondence_files(Vintage::Census2011).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, PathBuf::from("/data/lookups/OA11_LSOA11_MSOA11_EW_LU.csv"));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut config = CensusConfig::new("a", "b", "c");
        config.io_policy = IoPolicy::Retry{ attempts : 3, delay_ms : 10 };
        config.conflict_policy = ConflictPolicy::Warn;

        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("mode: retry"));
        assert!(yaml.contains("census2011"));
        assert_eq!(CensusConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn test_yaml_file_loading() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "source_dir: s\nstore_dir: t\nlut_dir: u\nio_policy:\n  mode: fail_fast").unwrap();
        let config = CensusConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.lut_dir, PathBuf::from("u"));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let yaml = "source_dir: a\nstore_dir: b\nlut_dir: c\ncache_dir: d\n";
        assert!(matches!(CensusConfig::from_yaml_str(yaml), Err(CensusError::Yaml(_))));
    }

    #[test]
    fn test_invalid_layout_is_rejected() {
        let mut config = CensusConfig::default();
        config.vintages[0].files[0].schema = CorrespondenceSchema::new(&[(Level::Lsoa, 0), (Level::Oa, 1)]);
        assert!(matches!(config.validate(), Err(CensusError::Config(_))));

        let mut config = CensusConfig::default();
        config.vintages[1].files.clear();
        assert!(matches!(config.validate(), Err(CensusError::Config(_))));
    }

    #[test]
    fn test_fail_fast_and_retry_report_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.csv");
        assert!(IoPolicy::FailFast.open_read(&missing).is_err());
        assert!(IoPolicy::Retry{ attempts : 2, delay_ms : 1 }.open_read(&missing).is_err());
    }
}
