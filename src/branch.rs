//! C2: branch registry — parent/child relationships, per-branch extent, and
//! ancestry traversal (spec §4.2).
//!
//! Represented as an arena (spec §9): each branch gets an integer id and
//! holds its parent id (or `None` for the root); a separate map gives
//! children. Nothing else in the crate holds a back-reference to a branch —
//! everything downstream is keyed by [`BranchId`].

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::coord::{Tick, Turn};
use crate::error::EngineError;

/// An arena index into the branch registry. Cheap to copy, hash, and use as
/// a map key everywhere else in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchId(pub(crate) u32);

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct BranchRecord {
    name: String,
    parent: Option<BranchId>,
    parent_turn: Turn,
    parent_tick: Tick,
    end_turn: Turn,
    end_tick: Tick,
}

/// Owns all branch metadata. Branches are created by explicit [`fork`](Self::fork)
/// and are never destroyed except by a full reset of the registry.
#[derive(Debug, Clone)]
pub struct BranchRegistry {
    records: Vec<BranchRecord>,
    by_name: HashMap<String, BranchId>,
    children: HashMap<BranchId, HashSet<BranchId>>,
}

/// Conventional name of the root branch.
pub const TRUNK: &str = "trunk";

impl Default for BranchRegistry {
    fn default() -> Self {
        let mut reg = BranchRegistry {
            records: Vec::new(),
            by_name: HashMap::new(),
            children: HashMap::new(),
        };
        reg.records.push(BranchRecord {
            name: TRUNK.to_string(),
            parent: None,
            parent_turn: 0,
            parent_tick: 0,
            end_turn: 0,
            end_tick: 0,
        });
        reg.by_name.insert(TRUNK.to_string(), BranchId(0));
        reg
    }
}

impl BranchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from dumped `(name, parent, parent_turn,
    /// parent_tick, end_turn, end_tick)` rows (spec §6 `all_branches`).
    /// Rows must be ordered so a branch's parent appears before it, except
    /// for the root branch, whose `parent` is `None`.
    pub fn from_rows(
        rows: impl IntoIterator<Item = (String, Option<String>, Turn, Tick, Turn, Tick)>,
    ) -> Result<Self, EngineError> {
        let mut reg = BranchRegistry {
            records: Vec::new(),
            by_name: HashMap::new(),
            children: HashMap::new(),
        };
        for (name, parent_name, parent_turn, parent_tick, end_turn, end_tick) in rows {
            let parent = match parent_name {
                None => None,
                Some(p) => Some(
                    *reg.by_name
                        .get(&p)
                        .ok_or_else(|| EngineError::UnknownBranch(p.clone()))?,
                ),
            };
            let id = BranchId(reg.records.len() as u32);
            reg.records.push(BranchRecord {
                name: name.clone(),
                parent,
                parent_turn,
                parent_tick,
                end_turn,
                end_tick,
            });
            reg.by_name.insert(name, id);
            if let Some(p) = parent {
                reg.children.entry(p).or_default().insert(id);
            }
        }
        if !reg.by_name.contains_key(TRUNK) {
            return Err(EngineError::UnknownBranch(TRUNK.to_string()));
        }
        Ok(reg)
    }

    pub fn resolve(&self, name: &str) -> Option<BranchId> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, id: BranchId) -> &str {
        &self.records[id.0 as usize].name
    }

    pub fn trunk(&self) -> BranchId {
        self.by_name[TRUNK]
    }

    pub fn parent(&self, id: BranchId) -> Option<BranchId> {
        self.records[id.0 as usize].parent
    }

    pub fn fork_point(&self, id: BranchId) -> (Turn, Tick) {
        let rec = &self.records[id.0 as usize];
        (rec.parent_turn, rec.parent_tick)
    }

    pub fn extent(&self, id: BranchId) -> (Turn, Tick) {
        let rec = &self.records[id.0 as usize];
        (rec.end_turn, rec.end_tick)
    }

    fn within_extent(&self, id: BranchId, turn: Turn, tick: Tick) -> bool {
        let (end_turn, end_tick) = self.extent(id);
        (turn, tick) <= (end_turn, end_tick)
    }

    /// Create `new_branch` as a fork of `from_branch` at `(at_turn,
    /// at_tick)`. Fails with [`EngineError::BranchExists`] if `new_branch`
    /// is already known, [`EngineError::UnknownBranch`] if `from_branch`
    /// isn't, or [`EngineError::InvalidFork`] if the fork point is not
    /// within the parent's observed extent.
    pub fn fork(
        &mut self,
        new_branch: &str,
        from_branch: &str,
        at_turn: Turn,
        at_tick: Tick,
    ) -> Result<BranchId, EngineError> {
        if self.by_name.contains_key(new_branch) {
            return Err(EngineError::BranchExists(new_branch.to_string()));
        }
        let parent_id = self
            .resolve(from_branch)
            .ok_or_else(|| EngineError::UnknownBranch(from_branch.to_string()))?;
        if !self.within_extent(parent_id, at_turn, at_tick) {
            return Err(EngineError::InvalidFork(format!(
                "fork point ({at_turn}, {at_tick}) is beyond `{from_branch}`'s observed extent"
            )));
        }
        let id = BranchId(self.records.len() as u32);
        self.records.push(BranchRecord {
            name: new_branch.to_string(),
            parent: Some(parent_id),
            parent_turn: at_turn,
            parent_tick: at_tick,
            end_turn: at_turn,
            end_tick: at_tick,
        });
        self.by_name.insert(new_branch.to_string(), id);
        self.children.entry(parent_id).or_default().insert(id);
        Ok(id)
    }

    /// Grow `id`'s observed extent to at least `(turn, tick)`. Per spec §3,
    /// a branch's extent only grows except when explicitly truncated by
    /// paradox resolution.
    pub fn extend(&mut self, id: BranchId, turn: Turn, tick: Tick) {
        let rec = &mut self.records[id.0 as usize];
        if (turn, tick) > (rec.end_turn, rec.end_tick) {
            rec.end_turn = turn;
            rec.end_tick = tick;
        }
    }

    /// Shrink `id`'s observed extent to exactly `(turn, tick)`. Used only by
    /// contradiction resolution (spec §4.3).
    pub fn truncate_extent(&mut self, id: BranchId, turn: Turn, tick: Tick) {
        let rec = &mut self.records[id.0 as usize];
        rec.end_turn = turn;
        rec.end_tick = tick;
    }

    pub fn children(&self, id: BranchId) -> impl Iterator<Item = BranchId> + '_ {
        self.children.get(&id).into_iter().flatten().copied()
    }

    /// `true` if `maybe_ancestor` is a (non-strict except for itself)
    /// ancestor of `branch` — `trunk` is an ancestor of all; a branch is not
    /// its own descendant.
    pub fn is_descendant(&self, maybe_ancestor: BranchId, branch: BranchId) -> bool {
        let mut cur = self.parent(branch);
        while let Some(b) = cur {
            if b == maybe_ancestor {
                return true;
            }
            cur = self.parent(b);
        }
        false
    }

    /// Lazily yields `(branch, turn, tick)` starting at `(branch, turn,
    /// tick)` and proceeding through each parent at its fork point,
    /// terminating at the root or at `stop` (if given and reached).
    ///
    /// This drives every point-in-time lookup that must cross branch
    /// boundaries (spec §4.2).
    pub fn ancestors_with_fork_point(
        &self,
        branch: BranchId,
        turn: Turn,
        tick: Tick,
        stop: Option<(BranchId, Turn, Tick)>,
    ) -> AncestorWalk<'_> {
        AncestorWalk {
            registry: self,
            next: Some((branch, turn, tick)),
            stop,
        }
    }
}

/// Iterator returned by [`BranchRegistry::ancestors_with_fork_point`].
pub struct AncestorWalk<'a> {
    registry: &'a BranchRegistry,
    next: Option<(BranchId, Turn, Tick)>,
    stop: Option<(BranchId, Turn, Tick)>,
}

impl<'a> Iterator for AncestorWalk<'a> {
    type Item = (BranchId, Turn, Tick);

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        if let Some(stop) = self.stop {
            if current == stop {
                self.next = None;
                return Some(current);
            }
        }
        self.next = match self.registry.parent(current.0) {
            Some(parent) => {
                let (pt, px) = self.registry.fork_point(current.0);
                Some((parent, pt, px))
            }
            None => None,
        };
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trunk_exists_by_default() {
        let reg = BranchRegistry::new();
        let trunk = reg.resolve(TRUNK).unwrap();
        assert_eq!(reg.extent(trunk), (0, 0));
        assert_eq!(reg.parent(trunk), None);
    }

    #[test]
    fn fork_requires_known_parent_and_rejects_duplicate() {
        let mut reg = BranchRegistry::new();
        assert!(matches!(
            reg.fork("alt", "nope", 0, 0),
            Err(EngineError::UnknownBranch(_))
        ));
        reg.extend(reg.trunk(), 5, 0);
        reg.fork("alt", TRUNK, 0, 0).unwrap();
        assert!(matches!(
            reg.fork("alt", TRUNK, 0, 0),
            Err(EngineError::BranchExists(_))
        ));
    }

    #[test]
    fn fork_beyond_extent_is_invalid() {
        let mut reg = BranchRegistry::new();
        assert!(matches!(
            reg.fork("alt", TRUNK, 10, 0),
            Err(EngineError::InvalidFork(_))
        ));
    }

    #[test]
    fn ancestry_and_descendant_check() {
        let mut reg = BranchRegistry::new();
        reg.extend(reg.trunk(), 5, 0);
        let alt = reg.fork("alt", TRUNK, 0, 5).unwrap();
        assert!(reg.is_descendant(reg.trunk(), alt));
        assert!(!reg.is_descendant(alt, reg.trunk()));
        assert!(!reg.is_descendant(alt, alt));

        let walk: Vec<_> = reg
            .ancestors_with_fork_point(alt, 0, 6, None)
            .collect();
        assert_eq!(walk, vec![(alt, 0, 6), (reg.trunk(), 0, 5)]);
    }
}
