//! C5: keycache — LRU-bounded derived cache mapping `(entity, branch, turn,
//! tick)` to the set of attribute keys live on that entity at that moment
//! (spec §4.4).
//!
//! Each `(entity, branch)` gets a [`WindowDict`] from packed revision to key
//! set. A global recency list over `(entity, branch, turn, tick)` enforces
//! the LRU bound across all of them, mirroring how the teacher's
//! `repo::memoryrepo` bounds its in-memory blob table.

use std::collections::{HashMap, HashSet};

use crate::attribute_cache::AttributeCache;
use crate::branch::{BranchId, BranchRegistry};
use crate::coord::{Rev, Tick, Turn};
use crate::entity::{AttrKey, Entity};
use crate::journal::SettingJournal;
use crate::windowdict::WindowDict;

type KeySet = HashSet<AttrKey>;

/// `(entity, branch, turn, tick)`: the unit the LRU bound is enforced over.
type CacheSlot = (Entity, BranchId, Turn, Tick);

#[derive(Default)]
pub struct KeyCache {
    windows: HashMap<(Entity, BranchId), WindowDict<KeySet>>,
    /// Most-recently-used at the back.
    recency: Vec<CacheSlot>,
    capacity: usize,
}

fn value_at(win: &mut WindowDict<KeySet>, r: u128) -> Option<(u128, KeySet)> {
    win.seek(r);
    win.past_view().last().map(|(rev, v)| (*rev, v.clone()))
}

impl KeyCache {
    pub fn new(capacity: usize) -> Self {
        KeyCache {
            windows: HashMap::new(),
            recency: Vec::new(),
            capacity,
        }
    }

    fn touch(&mut self, slot: CacheSlot) {
        self.recency.retain(|s| s != &slot);
        self.recency.push(slot);
    }

    fn evict_if_needed(&mut self) {
        while self.recency.len() > self.capacity {
            let (entity, branch, turn, tick) = self.recency.remove(0);
            if let Some(win) = self.windows.get_mut(&(entity.clone(), branch)) {
                win.remove(Rev::new(turn, tick).pack());
                if win.is_empty() {
                    self.windows.remove(&(entity, branch));
                }
            }
        }
    }

    fn store(&mut self, entity: Entity, branch: BranchId, turn: Turn, tick: Tick, set: KeySet) {
        let slot = (entity.clone(), branch, turn, tick);
        self.windows
            .entry((entity, branch))
            .or_default()
            .set(Rev::new(turn, tick).pack(), set);
        self.touch(slot);
        self.evict_if_needed();
    }

    fn cold_recompute(
        &self,
        attribute_cache: &mut AttributeCache,
        registry: &BranchRegistry,
        entity: &Entity,
        branch: BranchId,
        turn: Turn,
        tick: Tick,
    ) -> KeySet {
        let candidates: Vec<AttrKey> = attribute_cache.keys_of_entity(entity).cloned().collect();
        candidates
            .into_iter()
            .filter(|k| {
                attribute_cache
                    .retrieve(registry, entity, k, branch, turn, tick)
                    .is_ok()
            })
            .collect()
    }

    /// Resolve the live key set for `entity` at `(branch, turn, tick)`.
    ///
    /// In `forward` mode, if an earlier cached set exists for the same
    /// `(entity, branch)`, builds incrementally from the setting journal
    /// rather than recomputing cold (spec §4.4).
    pub fn lookup(
        &mut self,
        attribute_cache: &mut AttributeCache,
        journal: &mut SettingJournal,
        registry: &BranchRegistry,
        entity: &Entity,
        branch: BranchId,
        turn: Turn,
        tick: Tick,
        forward: bool,
    ) -> KeySet {
        let target = Rev::new(turn, tick).pack();
        let prior = self
            .windows
            .get_mut(&(entity.clone(), branch))
            .and_then(|win| value_at(win, target));

        let set = match prior {
            Some((found, set)) if found == target => set,
            Some((found, mut set)) if forward => {
                let found_rev = Rev::unpack(found);
                let changes = journal.delta(
                    branch,
                    found_rev.turn,
                    found_rev.tick,
                    turn,
                    tick,
                );
                for (changed_entity, key, value) in changes {
                    if changed_entity != *entity {
                        continue;
                    }
                    if value.is_some() {
                        set.insert(key);
                    } else {
                        set.remove(&key);
                    }
                }
                set
            }
            _ => self.cold_recompute(attribute_cache, registry, entity, branch, turn, tick),
        };

        self.store(entity.clone(), branch, turn, tick, set.clone());
        set
    }

    /// Record that `key`'s liveness changed for `entity` at `(branch, turn,
    /// tick)`: updates (or creates) the key set stored at exactly that
    /// coordinate. Earlier cached entries are left untouched (spec §4.4:
    /// "later entries are not retroactively invalidated" — read the other
    /// direction too: updating the entry at the write's own coordinate is
    /// sufficient because later lookups either land on a newer cached entry
    /// or recompute).
    pub fn observe_write(
        &mut self,
        entity: Entity,
        branch: BranchId,
        turn: Turn,
        tick: Tick,
        key: AttrKey,
        live: bool,
    ) {
        let win = self.windows.entry((entity.clone(), branch)).or_default();
        let target = Rev::new(turn, tick).pack();
        // Seed from the nearest earlier cached set, not only an exact match
        // at `target`: a write landing on a fresh coordinate must still
        // carry forward every key already live, or the stored entry stops
        // being a sound snapshot (spec §8 keycache soundness).
        let mut set = value_at(win, target).map(|(_, s)| s).unwrap_or_default();
        if live {
            set.insert(key);
        } else {
            set.remove(&key);
        }
        self.store(entity, branch, turn, tick, set);
    }

    pub fn len(&self) -> usize {
        self.recency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recency.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ParentTuple, Value};

    fn n(graph: &str, id: &str) -> Entity {
        Entity::Node(graph.to_string(), id.to_string())
    }

    #[test]
    fn cold_recompute_matches_live_keys() {
        let mut ac = AttributeCache::new(64);
        let mut kc = KeyCache::new(8);
        let mut journal = SettingJournal::new();
        let reg = BranchRegistry::new();
        let b = reg.trunk();
        let entity = n("g", "n1");
        ac.store(
            ParentTuple::Node("g".into(), "n1".into()),
            entity.clone(),
            "hp".into(),
            b,
            0,
            0,
            Some(Value::Int(10)),
            false,
            None,
        )
        .unwrap();
        journal.record(b, 0, 0, entity.clone(), "hp".into(), None, Some(Value::Int(10)));

        let keys = kc.lookup(&mut ac, &mut journal, &reg, &entity, b, 0, 0, false);
        assert_eq!(keys, HashSet::from(["hp".to_string()]));
    }

    #[test]
    fn forward_build_adds_and_removes_keys() {
        let mut ac = AttributeCache::new(64);
        let mut kc = KeyCache::new(8);
        let mut journal = SettingJournal::new();
        let reg = BranchRegistry::new();
        let b = reg.trunk();
        let entity = n("g", "n1");
        let parent = ParentTuple::Node("g".into(), "n1".into());

        ac.store(parent.clone(), entity.clone(), "hp".into(), b, 0, 0, Some(Value::Int(10)), false, None).unwrap();
        journal.record(b, 0, 0, entity.clone(), "hp".into(), None, Some(Value::Int(10)));
        let at0 = kc.lookup(&mut ac, &mut journal, &reg, &entity, b, 0, 0, true);
        assert_eq!(at0, HashSet::from(["hp".to_string()]));

        ac.store(parent.clone(), entity.clone(), "mp".into(), b, 1, 0, Some(Value::Int(5)), false, None).unwrap();
        journal.record(b, 1, 0, entity.clone(), "mp".into(), None, Some(Value::Int(5)));
        ac.store(parent, entity.clone(), "hp".into(), b, 1, 0, None, false, None).unwrap();
        journal.record(b, 1, 0, entity.clone(), "hp".into(), Some(Value::Int(10)), None);

        let at1 = kc.lookup(&mut ac, &mut journal, &reg, &entity, b, 1, 0, true);
        assert_eq!(at1, HashSet::from(["mp".to_string()]));
    }

    #[test]
    fn lru_evicts_oldest_slot() {
        let mut kc = KeyCache::new(2);
        let b = BranchId(0);
        kc.store(n("g", "a"), b, 0, 0, HashSet::new());
        kc.store(n("g", "b"), b, 0, 0, HashSet::new());
        kc.store(n("g", "c"), b, 0, 0, HashSet::new());
        assert_eq!(kc.len(), 2);
        assert!(!kc.windows.contains_key(&(n("g", "a"), b)));
    }
}
