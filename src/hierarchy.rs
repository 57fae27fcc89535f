//!
//! The Hierarchy module contains the two building blocks of the lookup tables: the per-level code
//! index, and the per-level-pair parent/child maps.  Nothing from here should be re-exported.
//!

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Serialize, Deserialize};

/// The areas of one level: surrogate IDs are positions in `codes`, minted in first-seen order
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelIndex {
    codes : Vec<String>,
    code_ids : HashMap<String, u32>,
    name_ids : HashMap<String, u32>,
}

impl LevelIndex {

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn id(&self, code : &str) -> Option<u32> {
        self.code_ids.get(code).copied()
    }

    pub fn id_by_name(&self, name : &str) -> Option<u32> {
        self.name_ids.get(name).copied()
    }

    /// Resolves a human-readable name first, then falls back to treating it as a code
    pub fn resolve(&self, name_or_code : &str) -> Option<u32> {
        self.id_by_name(name_or_code).or_else(|| self.id(name_or_code))
    }

    pub fn code(&self, id : u32) -> Option<&str> {
        self.codes.get(id as usize).map(|code| code.as_str())
    }

    pub fn codes(&self) -> impl Iterator<Item=&str> {
        self.codes.iter().map(|code| code.as_str())
    }

    /// Returns the existing ID for a code, or mints the next one
    pub fn mint(&mut self, code : &str) -> u32 {
        if let Some(id) = self.id(code) {
            return id;
        }
        let id = self.codes.len() as u32;
        self.codes.push(code.to_string());
        self.code_ids.insert(code.to_string(), id);
        id
    }

    /// Records a human-readable name for an area.  If the name already belongs to a different area,
    /// nothing is changed and that area's ID is returned as the error.
    pub fn add_name(&mut self, name : &str, id : u32) -> Result<(), u32> {
        match self.name_ids.get(name) {
            Some(existing) if *existing != id => Err(*existing),
            Some(_) => Ok(()),
            None => {
                self.name_ids.insert(name.to_string(), id);
                Ok(())
            }
        }
    }

    /// Checks that `codes` and `code_ids` are inverses of each other
    pub fn is_bijective(&self) -> bool {
        self.codes.len() == self.code_ids.len() &&
            self.codes.iter().enumerate().all(|(id, code)| self.code_ids.get(code) == Some(&(id as u32)))
    }
}

/// The relationship between one child level and one coarser parent level
///
/// `parents` is indexed by child ID.  `children` is its inverse, kept in step by [LevelPair::link],
/// which is the only way to add an edge.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelPair {
    parents : Vec<Option<u32>>,
    children : BTreeMap<u32, BTreeSet<u32>>,
}

impl LevelPair {

    /// Makes `parent` the parent of `child`.  The first assignment wins: returns `Ok(true)` for a
    /// new edge, `Ok(false)` if the edge was already there, and `Err(existing_parent)` without
    /// changing anything if the child already has a different parent.
    pub fn link(&mut self, child : u32, parent : u32) -> Result<bool, u32> {
        let idx = child as usize;
        if self.parents.len() <= idx {
            self.parents.resize(idx + 1, None);
        }
        match self.parents[idx] {
            Some(existing) if existing == parent => Ok(false),
            Some(existing) => Err(existing),
            None => {
                self.parents[idx] = Some(parent);
                self.children.entry(parent).or_default().insert(child);
                Ok(true)
            }
        }
    }

    pub fn parent(&self, child : u32) -> Option<u32> {
        self.parents.get(child as usize).copied().flatten()
    }

    pub fn children(&self, parent : u32) -> Option<&BTreeSet<u32>> {
        self.children.get(&parent)
    }

    /// Every `(child, parent)` edge, in ascending child order
    pub fn edges(&self) -> impl Iterator<Item=(u32, u32)> + '_ {
        self.parents.iter()
            .enumerate()
            .filter_map(|(child, parent)| parent.map(|parent| (child as u32, parent)))
    }

    pub fn child_sets(&self) -> impl Iterator<Item=(u32, &BTreeSet<u32>)> {
        self.children.iter().map(|(parent, children)| (*parent, children))
    }

    /// Returns the first child ID below `child_count` that has no parent
    pub fn first_orphan(&self, child_count : usize) -> Option<u32> {
        (0..child_count).find(|child| self.parent(*child as u32).is_none()).map(|child| child as u32)
    }
}
