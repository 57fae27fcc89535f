//!
//! The Area module contains the geography levels and the typed surrogate keys for areas.  [Level],
//! [AreaID], [Geography] and the geography markers are re-exported.
//!

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::str::FromStr;

use serde::{Serialize, Deserialize};

use crate::error::CensusError;

/// A census geography level.  The variants are declared finest to coarsest, so the derived ordering
/// is the nesting order: every OA sits inside one LSOA, every LSOA inside one MSOA, and so on.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    /// Output Area
    Oa,
    /// Lower Layer Super Output Area
    Lsoa,
    /// Middle Layer Super Output Area
    Msoa,
    /// Local Authority District
    Lad,
}

impl Level {
    pub const ALL : [Level; 4] = [Level::Oa, Level::Lsoa, Level::Msoa, Level::Lad];

    /// Position in the nesting order, 0 being the finest level
    pub fn rank(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Oa => "OA",
            Level::Lsoa => "LSOA",
            Level::Msoa => "MSOA",
            Level::Lad => "LAD",
        }
    }

    /// Parses one of the levels that area-code queries may ask for.  Matching is case-insensitive,
    /// and LAD is not accepted because area names are resolved at that level.
    pub fn parse_query_level(name : &str) -> Result<Level, CensusError> {
        match name.parse::<Level>()? {
            Level::Lad => Err(CensusError::UnknownLevel(name.to_string())),
            level => Ok(level),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = CensusError;

    fn from_str(s : &str) -> Result<Self, Self::Err> {
        Level::ALL.iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| CensusError::UnknownLevel(s.to_string()))
    }
}

/// A zero-sized marker for one geography level, used to give each level its own [AreaID] type
pub trait Geography : 'static {
    const LEVEL : Level;
}

/// Marker for [Level::Oa]
#[derive(Copy, Clone, Debug)]
pub enum Oa {}
/// Marker for [Level::Lsoa]
#[derive(Copy, Clone, Debug)]
pub enum Lsoa {}
/// Marker for [Level::Msoa]
#[derive(Copy, Clone, Debug)]
pub enum Msoa {}
/// Marker for [Level::Lad]
#[derive(Copy, Clone, Debug)]
pub enum Lad {}

impl Geography for Oa { const LEVEL : Level = Level::Oa; }
impl Geography for Lsoa { const LEVEL : Level = Level::Lsoa; }
impl Geography for Msoa { const LEVEL : Level = Level::Msoa; }
impl Geography for Lad { const LEVEL : Level = Level::Lad; }

/// A surrogate key identifying one area at geography `G`
///
/// Keys are minted in first-seen order while the lookup tables are built, so they're only meaningful
/// together with the [Luts](crate::Luts) that minted them.  An `AreaID<Oa>` can't be passed where an
/// `AreaID<Lsoa>` is expected, because the two levels number their areas independently.
///
/// NOTE: The traits are implemented by hand rather than derived, since a derive would put bounds on
/// `G`, and the markers are uninhabited types that implement nothing.
pub struct AreaID<G : Geography> {
    id : u32,
    phantom : PhantomData<G>,
}

impl <G : Geography>AreaID<G> {
    pub fn from_raw(id : u32) -> Self {
        Self{ id, phantom : PhantomData }
    }
    pub fn raw(&self) -> u32 {
        self.id
    }
    pub fn level(&self) -> Level {
        G::LEVEL
    }
}

impl <G : Geography>Clone for AreaID<G> {
    fn clone(&self) -> Self {
        *self
    }
}
impl <G : Geography>Copy for AreaID<G> {}

impl <G : Geography>PartialEq for AreaID<G> {
    fn eq(&self, other : &Self) -> bool {
        self.id == other.id
    }
}
impl <G : Geography>Eq for AreaID<G> {}

impl <G : Geography>PartialOrd for AreaID<G> {
    fn partial_cmp(&self, other : &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl <G : Geography>Ord for AreaID<G> {
    fn cmp(&self, other : &Self) -> core::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl <G : Geography>Hash for AreaID<G> {
    fn hash<H : Hasher>(&self, state : &mut H) {
        self.id.hash(state)
    }
}

impl <G : Geography>fmt::Debug for AreaID<G> {
    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AreaID<{}>({})", G::LEVEL, self.id)
    }
}

impl <G : Geography>fmt::Display for AreaID<G> {
    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", G::LEVEL, self.id)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_level_parsing_is_case_insensitive() {
        assert_eq!("lsoa".parse::<Level>().unwrap(), Level::Lsoa);
        assert_eq!("Msoa".parse::<Level>().unwrap(), Level::Msoa);
        assert_eq!(Level::parse_query_level("oa").unwrap(), Level::Oa);
    }

    #[test]
    fn test_unknown_level_is_an_error() {
        assert!(matches!("ward".parse::<Level>(), Err(CensusError::UnknownLevel(name)) if name == "ward"));
        assert!(matches!(Level::parse_query_level("LAD"), Err(CensusError::UnknownLevel(_))));
        assert!(matches!(Level::parse_query_level(""), Err(CensusError::UnknownLevel(_))));
    }

    #[test]
    fn test_level_ordering_is_nesting_order() {
        assert!(Level::Oa < Level::Lsoa);
        assert!(Level::Lsoa < Level::Msoa);
        assert!(Level::Msoa < Level::Lad);
        assert_eq!(Level::Lad.rank(), 3);
    }

    #[test]
    fn test_area_ids_hash_and_display() {
        let a = AreaID::<Lsoa>::from_raw(3);
        let b = AreaID::<Lsoa>::from_raw(3);
        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b);
        assert_eq!(set.len(), 1);
        assert_eq!(a.to_string(), "LSOA#3");
        assert_eq!(a.level(), Level::Lsoa);
    }
}
