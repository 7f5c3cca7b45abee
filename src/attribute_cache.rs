//! C4: attribute cache — per-entity, per-key history of values, the core of
//! point-in-time retrieval (spec §4.3).
//!
//! Each `(entity, key)` gets, per branch, a single [`WindowDict`] keyed by
//! the packed `(turn, tick)` revision (see [`crate::coord::Rev::pack`]).
//! Packing preserves the lexicographic `(turn, tick)` order, so this one
//! flat window is behaviorally identical to the nested "turn → tick →
//! value" map spec §4.3 describes, while reusing C1 exactly as specified
//! ("Uses C1 internally") without a second indexing layer. See `DESIGN.md`
//! for the tradeoff.

use std::collections::HashMap;

use quick_cache::sync::Cache;

use crate::branch::{BranchId, BranchRegistry};
use crate::coord::{Rev, Tick, Turn};
use crate::entity::{AttrKey, Entity, ParentTuple, Value};
use crate::error::EngineError;
use crate::windowdict::{HistoryFault, WindowDict};

/// Monotone identifier tagging the writes made inside one `with_plan` block
/// (spec §4.7).
pub type PlanId = u64;

type History = WindowDict<Option<Value>>;

/// Result of a [`AttributeCache::store`] call: which plans (if any) must be
/// deleted because their future writes contradict this one, and, if so, the
/// coordinate the branch's observed extent should be truncated to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreOutcome {
    pub contradicted_plans: Vec<PlanId>,
    pub truncate_to: Option<(Turn, Tick)>,
}

type ShallowestKey = (Entity, AttrKey, BranchId, Turn, Tick, u64);

pub struct AttributeCache {
    primary: HashMap<(Entity, AttrKey), HashMap<BranchId, History>>,
    by_parent: HashMap<ParentTuple, std::collections::HashSet<(Entity, AttrKey)>>,
    /// Every key ever written for a given entity — a superset of the keys
    /// live at any one coordinate. The keycache's cold-recompute path
    /// narrows this down with [`retrieve`](Self::retrieve) at the query
    /// point.
    keys_by_entity: HashMap<Entity, std::collections::HashSet<AttrKey>>,
    /// Point-query hint cache. Keyed with a per-`(entity, key, branch)`
    /// generation counter rather than relying on eviction on write: a
    /// contradiction can retroactively delete history, and `quick_cache`
    /// has no way to invalidate by prefix, so a bumped generation just lets
    /// old entries age out instead.
    shallowest: Cache<ShallowestKey, Option<Value>>,
    generation: HashMap<(Entity, AttrKey, BranchId), u64>,
    time_entity: HashMap<(BranchId, u128), (ParentTuple, Entity, AttrKey)>,
    plan_writes: HashMap<PlanId, Vec<(BranchId, u128)>>,
    write_plan: HashMap<(BranchId, u128), PlanId>,
}

impl Default for AttributeCache {
    fn default() -> Self {
        AttributeCache::new(1024)
    }
}

impl AttributeCache {
    pub fn new(shallowest_capacity: usize) -> Self {
        AttributeCache {
            primary: HashMap::new(),
            by_parent: HashMap::new(),
            keys_by_entity: HashMap::new(),
            shallowest: Cache::new(shallowest_capacity),
            generation: HashMap::new(),
            time_entity: HashMap::new(),
            plan_writes: HashMap::new(),
            write_plan: HashMap::new(),
        }
    }

    fn generation_of(&self, entity: &Entity, key: &AttrKey, branch: BranchId) -> u64 {
        *self
            .generation
            .get(&(entity.clone(), key.clone(), branch))
            .unwrap_or(&0)
    }

    fn remember_shallowest(
        &mut self,
        entity: Entity,
        key: AttrKey,
        branch: BranchId,
        turn: Turn,
        tick: Tick,
        value: Option<Value>,
    ) {
        let gen = self.generation_of(&entity, &key, branch);
        self.shallowest.insert((entity, key, branch, turn, tick, gen), value);
    }

    /// Retroactive history change for `(entity, key)` in `branch`: bump its
    /// generation so stale `shallowest` hits simply miss instead of serving
    /// an answer that predates the deletion.
    fn bump_generation(&mut self, entity: &Entity, key: &AttrKey, branch: BranchId) {
        *self
            .generation
            .entry((entity.clone(), key.clone(), branch))
            .or_insert(0) += 1;
    }

    /// Write `value` (`None` = deletion) for `(entity, key)` at `(branch,
    /// turn, tick)`.
    ///
    /// If `planning` is `true`, the write is rejected with
    /// [`EngineError::TimeFault`] unless it lands strictly after the latest
    /// existing tick recorded for this `(entity, key)` *in the same turn*
    /// (the futurist constraint, scoped per turn — a planning write to a
    /// turn with no prior ticks of its own always succeeds, regardless of
    /// what other turns hold). If `planning` is `false` and the branch
    /// already has future entries for this `(entity, key)` with a different
    /// value, those entries are contradictions: the caller must delete every
    /// plan named in [`StoreOutcome::contradicted_plans`] and truncate the
    /// branch's observed extent to [`StoreOutcome::truncate_to`].
    #[allow(clippy::too_many_arguments)]
    pub fn store(
        &mut self,
        parent: ParentTuple,
        entity: Entity,
        key: AttrKey,
        branch: BranchId,
        turn: Turn,
        tick: Tick,
        value: Option<Value>,
        planning: bool,
        plan_id: Option<PlanId>,
    ) -> Result<StoreOutcome, EngineError> {
        let rev = Rev::new(turn, tick);
        let packed = rev.pack();
        let wd = self
            .primary
            .entry((entity.clone(), key.clone()))
            .or_default()
            .entry(branch)
            .or_default();

        let mut outcome = StoreOutcome::default();

        if planning {
            // Scoped to this turn only: the futurist check must not see
            // across turn boundaries, so restrict the "latest" lookup to the
            // packed-key range belonging to `turn` rather than the
            // WindowDict's global max (see `WindowDict::set_futurist`, which
            // is too broad for this purpose).
            let turn_lo = (turn as u128) << 64;
            let turn_hi = turn_lo | (u64::MAX as u128);
            let latest_in_turn = wd
                .slice(Some(turn_lo), Some(turn_hi), 1)
                .into_iter()
                .map(|(r, _)| r)
                .max();
            if let Some(latest) = latest_in_turn {
                if packed <= latest {
                    return Err(EngineError::TimeFault(
                        crate::error::TimeFaultKind::WriteNotInFuture,
                    ));
                }
            }
            wd.set(packed, value.clone());
        } else {
            wd.seek(packed);
            let contradicting: Vec<u128> = wd
                .future_view()
                .filter(|(_, v)| *v != value)
                .map(|(r, _)| *r)
                .collect();
            if !contradicting.is_empty() {
                for r in &contradicting {
                    if let Some(pid) = self.write_plan.get(&(branch, *r)) {
                        if !outcome.contradicted_plans.contains(pid) {
                            outcome.contradicted_plans.push(*pid);
                        }
                    }
                }
                outcome.truncate_to = Some((turn, tick));
            }
            wd.set(packed, value.clone());
            if !contradicting.is_empty() {
                wd.truncate(packed);
                self.bump_generation(&entity, &key, branch);
            }
        }

        if let Some(pid) = plan_id {
            self.write_plan.insert((branch, packed), pid);
            self.plan_writes.entry(pid).or_default().push((branch, packed));
        }

        self.time_entity
            .insert((branch, packed), (parent.clone(), entity.clone(), key.clone()));
        self.by_parent
            .entry(parent)
            .or_default()
            .insert((entity.clone(), key.clone()));
        self.keys_by_entity
            .entry(entity.clone())
            .or_default()
            .insert(key.clone());
        self.remember_shallowest(entity, key, branch, turn, tick, value);

        Ok(outcome)
    }

    /// Resolve `retrieve` using: the shallowest hint cache, then the
    /// branch's own history, then ancestors via the branch registry.
    pub fn retrieve(
        &mut self,
        registry: &BranchRegistry,
        entity: &Entity,
        key: &AttrKey,
        branch: BranchId,
        turn: Turn,
        tick: Tick,
    ) -> Result<Value, EngineError> {
        let gen = self.generation_of(entity, key, branch);
        if let Some(hit) = self
            .shallowest
            .get(&(entity.clone(), key.clone(), branch, turn, tick, gen))
        {
            return hit.ok_or(EngineError::HistoryFault { deleted: true });
        }

        let Some(per_branch) = self.primary.get_mut(&(entity.clone(), key.clone())) else {
            return Err(EngineError::HistoryFault { deleted: false });
        };

        for (b, t, x) in registry.ancestors_with_fork_point(branch, turn, tick, None) {
            let Some(wd) = per_branch.get_mut(&b) else {
                continue;
            };
            match wd.get(Rev::new(t, x).pack()) {
                Ok(value) => {
                    self.remember_shallowest(
                        entity.clone(),
                        key.clone(),
                        branch,
                        turn,
                        tick,
                        Some(value.clone()),
                    );
                    return Ok(value);
                }
                Err(HistoryFault::Deleted) => {
                    self.remember_shallowest(entity.clone(), key.clone(), branch, turn, tick, None);
                    return Err(EngineError::HistoryFault { deleted: true });
                }
                Err(HistoryFault::NoHistory) => continue,
            }
        }
        Err(EngineError::HistoryFault { deleted: false })
    }

    /// Undo a single write located via the reverse `time_entity` index.
    pub fn remove(&mut self, branch: BranchId, turn: Turn, tick: Tick) {
        let packed = Rev::new(turn, tick).pack();
        let Some((_, entity, key)) = self.time_entity.remove(&(branch, packed)) else {
            return;
        };
        if let Some(per_branch) = self.primary.get_mut(&(entity.clone(), key.clone())) {
            if let Some(wd) = per_branch.get_mut(&branch) {
                wd.remove(packed);
            }
        }
        self.write_plan.remove(&(branch, packed));
        self.bump_generation(&entity, &key, branch);
    }

    /// Delete every write tagged with `plan_id` (spec §4.7 `delete_plan`).
    pub fn delete_plan(&mut self, plan_id: PlanId) {
        let Some(writes) = self.plan_writes.remove(&plan_id) else {
            return;
        };
        for (branch, packed) in writes {
            let rev = Rev::unpack(packed);
            self.remove(branch, rev.turn, rev.tick);
        }
    }

    /// Drop everything strictly after `(turn, tick)` in `branch`, across
    /// every `(entity, key)` — a generic utility distinct from plan
    /// deletion.
    pub fn truncate(&mut self, branch: BranchId, turn: Turn, tick: Tick) {
        let packed = Rev::new(turn, tick).pack();
        for ((entity, key), per_branch) in self.primary.iter_mut() {
            if let Some(wd) = per_branch.get_mut(&branch) {
                wd.seek(packed);
                let had_future = wd.future_view().next().is_some();
                wd.truncate(packed);
                if had_future {
                    *self
                        .generation
                        .entry((entity.clone(), key.clone(), branch))
                        .or_insert(0) += 1;
                }
            }
        }
        self.time_entity
            .retain(|(b, r), _| *b != branch || *r <= packed);
    }

    /// All `(entity, key)` pairs ever stored under `parent` — the existence
    /// caches' cold-recompute path (spec §4.5: live nodes of a graph, live
    /// destinations of an origin).
    pub fn keys_under_parent(&self, parent: &ParentTuple) -> impl Iterator<Item = &(Entity, AttrKey)> {
        self.by_parent.get(parent).into_iter().flatten()
    }

    /// Every key ever written for `entity` — the keycache's cold-recompute
    /// path (spec §4.4).
    pub fn keys_of_entity(&self, entity: &Entity) -> impl Iterator<Item = &AttrKey> {
        self.keys_by_entity.get(entity).into_iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn g(name: &str) -> Entity {
        Entity::Graph(name.to_string())
    }
    fn p(name: &str) -> ParentTuple {
        ParentTuple::Graph(name.to_string())
    }

    #[test]
    fn store_then_retrieve_roundtrip() {
        let mut cache = AttributeCache::new(1024);
        let reg = BranchRegistry::new();
        let b = reg.trunk();
        cache
            .store(p("g"), g("g"), "a".into(), b, 0, 0, Some(Value::Int(1)), false, None)
            .unwrap();
        let v = cache.retrieve(&reg, &g("g"), &"a".to_string(), b, 0, 0).unwrap();
        assert_eq!(v, Value::Int(1));
    }

    #[test]
    fn retrieve_before_history_faults() {
        let mut cache = AttributeCache::new(1024);
        let reg = BranchRegistry::new();
        let b = reg.trunk();
        cache
            .store(p("g"), g("g"), "a".into(), b, 1, 0, Some(Value::Int(1)), false, None)
            .unwrap();
        let err = cache.retrieve(&reg, &g("g"), &"a".to_string(), b, 0, 0).unwrap_err();
        assert_eq!(err, EngineError::HistoryFault { deleted: false });
    }

    #[test]
    fn retrieve_of_deletion_faults_as_deleted() {
        let mut cache = AttributeCache::new(1024);
        let reg = BranchRegistry::new();
        let b = reg.trunk();
        cache
            .store(p("g"), g("g"), "a".into(), b, 0, 0, Some(Value::Int(1)), false, None)
            .unwrap();
        cache
            .store(p("g"), g("g"), "a".into(), b, 0, 1, None, false, None)
            .unwrap();
        let err = cache.retrieve(&reg, &g("g"), &"a".to_string(), b, 0, 1).unwrap_err();
        assert_eq!(err, EngineError::HistoryFault { deleted: true });
        let ok = cache.retrieve(&reg, &g("g"), &"a".to_string(), b, 0, 0).unwrap();
        assert_eq!(ok, Value::Int(1));
    }

    #[test]
    fn ancestry_falls_back_to_parent_branch() {
        let mut cache = AttributeCache::new(1024);
        let mut reg = BranchRegistry::new();
        let trunk = reg.trunk();
        cache
            .store(p("g"), g("g"), "a".into(), trunk, 0, 5, Some(Value::Int(1)), false, None)
            .unwrap();
        reg.extend(trunk, 0, 5);
        let alt = reg.fork("alt", "trunk", 0, 5).unwrap();
        cache
            .store(p("g"), g("g"), "a".into(), alt, 0, 6, Some(Value::Int(2)), false, None)
            .unwrap();
        assert_eq!(
            cache.retrieve(&reg, &g("g"), &"a".to_string(), trunk, 0, 6).unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            cache.retrieve(&reg, &g("g"), &"a".to_string(), alt, 0, 6).unwrap(),
            Value::Int(2)
        );
    }

    #[test]
    fn contradiction_flags_plan_for_deletion() {
        let mut cache = AttributeCache::new(1024);
        let reg = BranchRegistry::new();
        let b = reg.trunk();
        cache
            .store(p("g"), g("g"), "y".into(), b, 0, 0, Some(Value::Str("A".into())), false, None)
            .unwrap();
        cache
            .store(p("g"), g("g"), "y".into(), b, 1, 0, Some(Value::Str("B".into())), true, Some(7))
            .unwrap();
        let outcome = cache
            .store(p("g"), g("g"), "y".into(), b, 0, 1, Some(Value::Str("C".into())), false, None)
            .unwrap();
        assert_eq!(outcome.contradicted_plans, vec![7]);
        assert_eq!(outcome.truncate_to, Some((0, 1)));
    }

    #[test]
    fn planning_write_rejects_non_increasing_revision() {
        let mut cache = AttributeCache::new(1024);
        let reg = BranchRegistry::new();
        let b = reg.trunk();
        cache
            .store(p("g"), g("g"), "a".into(), b, 1, 0, Some(Value::Int(1)), true, Some(1))
            .unwrap();
        let err = cache
            .store(p("g"), g("g"), "a".into(), b, 1, 0, Some(Value::Int(2)), true, Some(1))
            .unwrap_err();
        assert!(matches!(err, EngineError::TimeFault(_)));
    }

    #[test]
    fn planning_write_to_earlier_turn_is_scoped_to_its_own_turn() {
        let mut cache = AttributeCache::new(1024);
        let reg = BranchRegistry::new();
        let b = reg.trunk();
        cache
            .store(p("g"), g("g"), "a".into(), b, 5, 0, Some(Value::Int(1)), true, Some(1))
            .unwrap();
        // Turn 2 has no ticks of its own yet, so this must succeed even
        // though turn 5 already holds a later packed revision.
        cache
            .store(p("g"), g("g"), "a".into(), b, 2, 0, Some(Value::Int(2)), true, Some(2))
            .unwrap();
        // A second planning write within turn 2 at tick 0 must still be
        // rejected as non-increasing within that turn.
        let err = cache
            .store(p("g"), g("g"), "a".into(), b, 2, 0, Some(Value::Int(3)), true, Some(2))
            .unwrap_err();
        assert!(matches!(err, EngineError::TimeFault(_)));
    }
}
