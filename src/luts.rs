//!
//! The Luts module contains the geography lookup tables and the builder that assembles them from
//! correspondence files.  [Luts], [LutBuilder], [CorrespondenceFile], [CorrespondenceSchema] and
//! [ConflictPolicy] are re-exported.
//!

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};
use tracing::{debug, info, warn};

use crate::area::{AreaID, Geography, Level};
use crate::config::IoPolicy;
use crate::encode_decode::Coder;
use crate::error::{CensusError, Result};
use crate::hierarchy::{LevelIndex, LevelPair};

/// Where the codes sit in one correspondence file
///
/// `levels` lists `(level, column)` finest to coarsest.  Each adjacent pair of levels in the list is
/// read as a child/parent edge.  `names` lists columns holding a human-readable name for the area
/// of a level that's also in `levels`, e.g. the LAD name next to the LAD code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorrespondenceSchema {
    pub levels : Vec<(Level, usize)>,
    #[serde(default)]
    pub names : Vec<(Level, usize)>,
    #[serde(default = "default_has_header")]
    pub has_header : bool,
}

fn default_has_header() -> bool {
    true
}

impl CorrespondenceSchema {
    pub fn new(levels : &[(Level, usize)]) -> Self {
        Self{
            levels : levels.to_vec(),
            names : vec![],
            has_header : true,
        }
    }
    pub fn with_names(mut self, names : &[(Level, usize)]) -> Self {
        self.names = names.to_vec();
        self
    }
    pub fn without_header(mut self) -> Self {
        self.has_header = false;
        self
    }

    /// The number of columns a row needs for every configured column to exist
    pub fn min_columns(&self) -> usize {
        self.levels.iter().chain(self.names.iter())
            .map(|(_level, column)| column + 1)
            .max()
            .unwrap_or(0)
    }

    /// Checks the levels are non-empty and strictly finest to coarsest, and every name column
    /// belongs to one of them
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.levels.is_empty() {
            return Err("a correspondence file must name at least one level".to_string());
        }
        if self.levels.windows(2).any(|pair| pair[0].0 >= pair[1].0) {
            return Err("levels must be listed finest to coarsest, without repeats".to_string());
        }
        if let Some((level, _)) = self.names.iter().find(|(level, _)| !self.levels.iter().any(|(l, _)| l == level)) {
            return Err(format!("name column given for {level}, which has no code column"));
        }
        Ok(())
    }
}

/// One correspondence file to load, with its schema
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrespondenceFile {
    pub path : PathBuf,
    pub schema : CorrespondenceSchema,
}

impl CorrespondenceFile {
    pub fn new(path : impl Into<PathBuf>, schema : CorrespondenceSchema) -> Self {
        Self{ path : path.into(), schema }
    }
}

/// What the builder does when a child area turns up with a second, different parent
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Abort the build with [CensusError::HierarchyConflict]
    #[default]
    Reject,
    /// Keep the first parent and log the conflict
    Warn,
}

/// The complete geography index: per-level code maps, and the parent/child maps for every pair of
/// levels the loaded files relate, directly or by derivation
///
/// A `Luts` is immutable once built.  Build one with [Luts::load] or a [LutBuilder], or reopen a
/// snapshot with [Luts::open].
///
/// ## Surrogate IDs
///
/// IDs are minted per level in the order codes are first seen while loading, starting at 0.  They're
/// stable for the life of the `Luts`, and across runs only through [Luts::save] / [Luts::open].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Luts {
    levels : BTreeMap<Level, LevelIndex>,
    pairs : BTreeMap<(Level, Level), LevelPair>,
    #[serde(default)]
    tolerated_conflicts : usize,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version : &'a str,
    luts : &'a Luts,
}

#[derive(Deserialize)]
struct Snapshot {
    version : String,
    luts : Luts,
}

impl Luts {

    /// Builds lookup tables from correspondence files, with the default policies
    pub fn load(files : &[CorrespondenceFile]) -> Result<Self> {
        LutBuilder::new().load(files)
    }

    /// The levels that have at least one area
    pub fn levels(&self) -> impl Iterator<Item=Level> + '_ {
        self.levels.keys().copied()
    }

    /// The number of areas at a level
    pub fn level_len(&self, level : Level) -> usize {
        self.levels.get(&level).map(|index| index.len()).unwrap_or(0)
    }

    /// Every code at a level, in surrogate ID order
    pub fn codes(&self, level : Level) -> Vec<&str> {
        self.levels.get(&level).map(|index| index.codes().collect()).unwrap_or_default()
    }

    /// The number of conflicting edges a [ConflictPolicy::Warn] build ignored.  Tables with any
    /// aren't held to the composition check in [Luts::validate].
    pub fn tolerated_conflicts(&self) -> usize {
        self.tolerated_conflicts
    }

    /// Whether the tables relate `child` areas to `parent` areas
    pub fn has_pair(&self, child : Level, parent : Level) -> bool {
        self.pairs.contains_key(&(child, parent))
    }

    /// Every `(child, parent)` level pair the tables relate
    pub fn pairs(&self) -> impl Iterator<Item=(Level, Level)> + '_ {
        self.pairs.keys().copied()
    }

    pub fn id<G : Geography>(&self, code : &str) -> Option<AreaID<G>> {
        self.levels.get(&G::LEVEL)?.id(code).map(AreaID::from_raw)
    }

    /// Looks an area up by its human-readable name
    pub fn id_by_name<G : Geography>(&self, name : &str) -> Option<AreaID<G>> {
        self.levels.get(&G::LEVEL)?.id_by_name(name).map(AreaID::from_raw)
    }

    pub fn code<G : Geography>(&self, id : AreaID<G>) -> Option<&str> {
        self.levels.get(&G::LEVEL)?.code(id.raw())
    }

    pub fn parent<C : Geography, P : Geography>(&self, id : AreaID<C>) -> Option<AreaID<P>> {
        self.pairs.get(&(C::LEVEL, P::LEVEL))?.parent(id.raw()).map(AreaID::from_raw)
    }

    /// The areas of level `C` inside an area of level `P`, in ID order
    pub fn children<P : Geography, C : Geography>(&self, id : AreaID<P>) -> Vec<AreaID<C>> {
        self.pairs.get(&(C::LEVEL, P::LEVEL))
            .and_then(|pair| pair.children(id.raw()))
            .map(|children| children.iter().map(|child| AreaID::from_raw(*child)).collect())
            .unwrap_or_default()
    }

    /// Returns the codes of every `level` area inside the `parent_level` area called `parent`
    ///
    /// `parent` is matched against area names first, then against codes.  An unrecognised parent is
    /// an error rather than an empty set, since an empty set would also mean "recognised, but has no
    /// areas at that level".
    pub fn codes_within(&self, level : Level, parent_level : Level, parent : &str) -> Result<BTreeSet<String>> {

        let pair = self.pairs.get(&(level, parent_level))
            .ok_or(CensusError::UnknownLevelPair{ child : level, parent : parent_level })?;
        let parent_id = self.levels.get(&parent_level)
            .and_then(|index| index.resolve(parent))
            .ok_or_else(|| CensusError::AreaNotRecognised(parent.to_string()))?;

        //Both of these are present whenever the pair is, so an absence means no children
        let (Some(children), Some(child_index)) = (pair.children(parent_id), self.levels.get(&level)) else {
            return Ok(BTreeSet::new());
        };
        Ok(children.iter()
            .filter_map(|child| child_index.code(*child))
            .map(|code| code.to_string())
            .collect())
    }

    /// Checks the structural invariants: every level's code maps are inverses, and for every level
    /// pair every child has exactly one parent and sits in exactly that parent's child set.
    ///
    /// Unless a [ConflictPolicy::Warn] build ignored conflicts, also checks that the pairs agree with
    /// each other: wherever the tables relate a→b, b→c and a→c, the c parent of every a area is the
    /// c parent of its b parent.
    pub fn validate(&self) -> Result<()> {

        for (level, index) in self.levels.iter() {
            if !index.is_bijective() {
                return Err(CensusError::InvalidState(format!("{level} code maps are not inverses")));
            }
        }

        for ((child_level, parent_level), pair) in self.pairs.iter() {
            let child_count = self.level_len(*child_level);
            if let Some(orphan) = pair.first_orphan(child_count) {
                return Err(CensusError::OrphanArea{
                    child_level : *child_level,
                    child : self.levels[child_level].code(orphan).unwrap_or_default().to_string(),
                    parent_level : *parent_level,
                });
            }

            let mut member_count = 0;
            for (parent, children) in pair.child_sets() {
                for child in children.iter() {
                    if pair.parent(*child) != Some(parent) {
                        return Err(CensusError::InvalidState(format!("{child_level} {child} is in the child set of {parent_level} {parent} but not its child")));
                    }
                }
                member_count += children.len();
            }
            if member_count != child_count {
                return Err(CensusError::InvalidState(format!("{child_level} to {parent_level} child sets hold {member_count} areas, expected {child_count}")));
            }
        }

        if self.tolerated_conflicts == 0 {
            self.check_composition()?;
        }
        Ok(())
    }

    fn check_composition(&self) -> Result<()> {
        for ((a, c), a_c) in self.pairs.iter() {
            for ((_, b), a_b) in self.pairs.range((*a, Level::Oa)..=(*a, Level::Lad)) {
                if b >= c {
                    continue;
                }
                let Some(b_c) = self.pairs.get(&(*b, *c)) else {
                    continue;
                };
                for (a_id, b_id) in a_b.edges() {
                    let (Some(direct), Some(through_b)) = (a_c.parent(a_id), b_c.parent(b_id)) else {
                        continue;
                    };
                    if direct != through_b {
                        return Err(CensusError::HierarchyConflict{
                            child_level : *a,
                            child : self.code_or_empty(*a, a_id),
                            parent_level : *c,
                            existing : self.code_or_empty(*c, direct),
                            conflicting : self.code_or_empty(*c, through_b),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn code_or_empty(&self, level : Level, id : u32) -> String {
        self.levels.get(&level).and_then(|index| index.code(id)).unwrap_or_default().to_string()
    }

    /// Writes the tables to `path`, so the same surrogate IDs can be used by a later run
    pub fn save<C : Coder>(&self, path : &Path, coder : &C) -> Result<()> {
        let snapshot = SnapshotRef{ version : env!("CARGO_PKG_VERSION"), luts : self };
        let bytes = coder.encode_to_buf(&snapshot).map_err(CensusError::Codec)?;
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Reopens tables written by [Luts::save]
    ///
    /// A snapshot from a version of this crate with a different major version (or, before 1.0, a
    /// different minor version) is refused.
    pub fn open<C : Coder>(path : &Path, coder : &C) -> Result<Self> {
        let bytes = fs::read(path)?;
        let snapshot : Snapshot = coder.decode_from_bytes(&bytes).map_err(CensusError::Codec)?;

        let incompatible = || CensusError::IncompatibleSnapshot{
            found : format!("{} {}", env!("CARGO_CRATE_NAME"), snapshot.version),
            current : format!("{} {}", env!("CARGO_CRATE_NAME"), env!("CARGO_PKG_VERSION")),
        };
        let found = semver::Version::parse(&snapshot.version).map_err(|_| incompatible())?;
        let current = semver::Version::parse(env!("CARGO_PKG_VERSION")).map_err(|_| incompatible())?;
        let compatible = found.major == current.major && (current.major > 0 || found.minor == current.minor);
        if !compatible {
            return Err(incompatible());
        }

        snapshot.luts.validate()?;
        Ok(snapshot.luts)
    }
}

/// Assembles [Luts] from an ordered list of correspondence files
///
/// Later files are read against what earlier files established.  A level that an earlier file
/// introduced is a *reference* level for every later file: its codes must already exist, and a code
/// that doesn't is a fatal [CensusError::UnknownAreaReference].  After each file, level pairs are
/// derived by composing chains (OA→LSOA→MSOA gives OA→MSOA), and by going through a shared finer
/// level (OA→LSOA from one file and OA→LAD from another give LSOA→LAD).  Derivation also runs into
/// pairs that already exist, so edges from a later file fill in what they imply.  Derived edges go
/// through the same first-assignment-wins check as direct ones, so two files that disagree can't
/// both be believed.
///
/// The builder is consumed by [LutBuilder::load], so a set of tables is only ever loaded once.
pub struct LutBuilder {
    luts : Luts,
    conflict_policy : ConflictPolicy,
    io_policy : IoPolicy,
    known_levels : BTreeSet<Level>,
    reported_conflicts : BTreeSet<(Level, u32, Level, u32)>,
}

impl Default for LutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LutBuilder {

    pub fn new() -> Self {
        Self{
            luts : Luts::default(),
            conflict_policy : ConflictPolicy::default(),
            io_policy : IoPolicy::default(),
            known_levels : BTreeSet::new(),
            reported_conflicts : BTreeSet::new(),
        }
    }

    pub fn with_conflict_policy(mut self, conflict_policy : ConflictPolicy) -> Self {
        self.conflict_policy = conflict_policy;
        self
    }

    pub fn with_io_policy(mut self, io_policy : IoPolicy) -> Self {
        self.io_policy = io_policy;
        self
    }

    /// Loads every file in order, derives level pairs after each one, and validates the result
    pub fn load(mut self, files : &[CorrespondenceFile]) -> Result<Luts> {

        for file in files {
            self.load_file(file)?;
            self.derive_pairs()?;
            self.known_levels.extend(file.schema.levels.iter().map(|(level, _)| *level));
        }

        self.luts.tolerated_conflicts = self.reported_conflicts.len();
        self.luts.validate()?;

        info!("built lookup tables from {} files: {}{}",
            files.len(),
            self.luts.levels.iter().map(|(level, index)| format!("{} {}", index.len(), level)).collect::<Vec<_>>().join(", "),
            if self.luts.tolerated_conflicts > 0 { format!(" ({} conflicting edges ignored)", self.luts.tolerated_conflicts) } else { String::new() });

        Ok(self.luts)
    }

    fn load_file(&mut self, file : &CorrespondenceFile) -> Result<()> {

        let path = file.path.as_path();
        let schema = &file.schema;
        schema.validate().map_err(|reason| CensusError::Config(format!("{path:?}: {reason}")))?;

        let reader = BufReader::new(self.io_policy.open_read(path)?);
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(schema.has_header)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let min_columns = schema.min_columns();
        let mut ids : Vec<(Level, u32)> = Vec::with_capacity(schema.levels.len());
        let mut row_count = 0u64;

        for result in csv_reader.records() {

            let row = result.map_err(|e| CensusError::MalformedRow{
                path : path.to_path_buf(),
                line : e.position().map(|pos| pos.line()).unwrap_or(0),
                reason : e.to_string(),
            })?;
            let line = row.position().map(|pos| pos.line()).unwrap_or(0);
            let malformed = |reason : String| CensusError::MalformedRow{ path : path.to_path_buf(), line, reason };

            if row.len() < min_columns {
                return Err(malformed(format!("expected at least {min_columns} columns, found {}", row.len())));
            }

            //Resolve or mint every level's ID
            ids.clear();
            for (level, column) in schema.levels.iter() {
                let code = row.get(*column).unwrap_or_default();
                if code.is_empty() {
                    return Err(malformed(format!("empty {level} code in column {column}")));
                }
                let index = self.luts.levels.entry(*level).or_default();
                let id = if self.known_levels.contains(level) {
                    index.id(code).ok_or_else(|| CensusError::UnknownAreaReference{
                        level : *level,
                        code : code.to_string(),
                        path : path.to_path_buf(),
                        line,
                    })?
                } else {
                    index.mint(code)
                };
                ids.push((*level, id));
            }

            for (level, column) in schema.names.iter() {
                let name = row.get(*column).unwrap_or_default();
                if name.is_empty() {
                    continue;
                }
                let id = ids.iter().find(|(l, _)| l == level).map(|(_, id)| *id).unwrap_or_default();
                let index = self.luts.levels.entry(*level).or_default();
                if let Err(existing) = index.add_name(name, id) {
                    let existing = index.code(existing).unwrap_or_default().to_string();
                    let code = index.code(id).unwrap_or_default().to_string();
                    return Err(malformed(format!("{level} name '{name}' is used by both '{existing}' and '{code}'")));
                }
            }

            for pair in ids.windows(2) {
                let (child_level, child) = pair[0];
                let (parent_level, parent) = pair[1];
                self.link(child_level, child, parent_level, parent)?;
            }
            row_count += 1;
        }

        debug!("loaded {} rows from {:?}", row_count, path);
        Ok(())
    }

    /// Adds one edge, applying the conflict policy.  Returns whether the edge is new.
    fn link(&mut self, child_level : Level, child : u32, parent_level : Level, parent : u32) -> Result<bool> {
        let existing = match self.luts.pairs.entry((child_level, parent_level)).or_default().link(child, parent) {
            Ok(added) => return Ok(added),
            Err(existing) => existing,
        };

        let conflict = CensusError::HierarchyConflict{
            child_level,
            child : self.luts.code_or_empty(child_level, child),
            parent_level,
            existing : self.luts.code_or_empty(parent_level, existing),
            conflicting : self.luts.code_or_empty(parent_level, parent),
        };
        match self.conflict_policy {
            ConflictPolicy::Reject => Err(conflict),
            ConflictPolicy::Warn => {
                //Derivation passes revisit the same edges, so each conflict is reported once
                if self.reported_conflicts.insert((child_level, child, parent_level, parent)) {
                    warn!("{}", conflict);
                }
                Ok(false)
            }
        }
    }

    /// Runs every derivation the loaded pairs allow, including into pairs that already exist, so
    /// edges a later file adds reach every pair they imply and any disagreement meets [Self::link].
    /// Stops once a full pass adds no edge.
    fn derive_pairs(&mut self) -> Result<()> {
        loop {
            let levels : Vec<Level> = self.luts.levels.keys().copied().collect();
            let mut added = 0;

            for (a_idx, a) in levels.iter().enumerate() {
                for c in levels[a_idx + 1..].iter() {
                    for b in levels.iter().filter(|b| *b > a && *b < c) {
                        if self.luts.has_pair(*a, *b) && self.luts.has_pair(*b, *c) {
                            added += self.compose(*a, *b, *c)?;
                        }
                    }
                    for s in levels.iter().filter(|s| *s < a) {
                        if self.luts.has_pair(*s, *a) && self.luts.has_pair(*s, *c) {
                            added += self.derive_through(*s, *a, *c)?;
                        }
                    }
                }
            }

            if added == 0 {
                return Ok(());
            }
        }
    }

    /// (a→b) and (b→c) give (a→c)
    fn compose(&mut self, a : Level, b : Level, c : Level) -> Result<usize> {
        let edges : Vec<(u32, u32)> = {
            let a_b = &self.luts.pairs[&(a, b)];
            let b_c = &self.luts.pairs[&(b, c)];
            a_b.edges()
                .filter_map(|(a_id, b_id)| b_c.parent(b_id).map(|c_id| (a_id, c_id)))
                .collect()
        };
        let added = self.link_all(a, c, edges)?;
        if added > 0 {
            debug!("derived {} {} to {} edges through {}", added, a, c, b);
        }
        Ok(added)
    }

    /// (s→a) and (s→c) give (a→c): every `a` inherits the `c` of the `s` areas inside it
    fn derive_through(&mut self, s : Level, a : Level, c : Level) -> Result<usize> {
        let edges : Vec<(u32, u32)> = {
            let s_a = &self.luts.pairs[&(s, a)];
            let s_c = &self.luts.pairs[&(s, c)];
            s_a.edges()
                .filter_map(|(s_id, a_id)| s_c.parent(s_id).map(|c_id| (a_id, c_id)))
                .collect()
        };
        let added = self.link_all(a, c, edges)?;
        if added > 0 {
            debug!("derived {} {} to {} edges from shared {}", added, a, c, s);
        }
        Ok(added)
    }

    fn link_all(&mut self, child_level : Level, parent_level : Level, edges : Vec<(u32, u32)>) -> Result<usize> {
        self.luts.pairs.entry((child_level, parent_level)).or_default();
        let mut added = 0;
        for (child, parent) in edges {
            if self.link(child_level, child, parent_level, parent)? {
                added += 1;
            }
        }
        Ok(added)
    }
}
