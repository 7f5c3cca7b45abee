//! C3: the append-only setting journal (spec §4.6).
//!
//! For each branch, two [`WindowDict`]-backed logs: `settings` records
//! `(entity, key, new_value)` and `presettings` records `(entity, key,
//! prev_value)`, both indexed by `(turn, tick)`. The pre/post split lets
//! both forward and backward deltas be computed by the same algorithm with
//! sign-flipped iteration.

use std::collections::HashMap;

use crate::branch::BranchId;
use crate::coord::{Rev, Tick, Turn};
use crate::entity::{AttrKey, Entity, Value};
use crate::windowdict::WindowDict;

/// One journal row: which `(entity, key)` changed, and the value on the
/// relevant side (new for `settings`, previous for `presettings`).
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub entity: Entity,
    pub key: AttrKey,
    pub value: Option<Value>,
}

#[derive(Default, Clone)]
struct BranchJournal {
    settings: WindowDict<Option<JournalEntry>>,
    presettings: WindowDict<Option<JournalEntry>>,
}

/// Owns every branch's setting journal.
#[derive(Default, Clone)]
pub struct SettingJournal {
    branches: HashMap<BranchId, BranchJournal>,
}

impl SettingJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one write, atomically alongside the corresponding primary
    /// store (spec §4.6 invariant).
    pub fn record(
        &mut self,
        branch: BranchId,
        turn: Turn,
        tick: Tick,
        entity: Entity,
        key: AttrKey,
        prev_value: Option<Value>,
        new_value: Option<Value>,
    ) {
        let rev = Rev::new(turn, tick).pack();
        let bj = self.branches.entry(branch).or_default();
        bj.settings.set(
            rev,
            Some(JournalEntry {
                entity: entity.clone(),
                key: key.clone(),
                value: new_value,
            }),
        );
        bj.presettings.set(
            rev,
            Some(JournalEntry {
                entity,
                key,
                value: prev_value,
            }),
        );
    }

    /// Truncate a branch's journal to drop everything strictly after
    /// `(turn, tick)` — used by contradiction resolution (spec §4.3).
    pub fn truncate(&mut self, branch: BranchId, turn: Turn, tick: Tick) {
        if let Some(bj) = self.branches.get_mut(&branch) {
            let rev = Rev::new(turn, tick).pack();
            bj.settings.truncate(rev);
            bj.presettings.truncate(rev);
        }
    }

    /// Produce a structured delta of every `(entity, key)` that changed
    /// between `(turn_from, tick_from)` and `(turn_to, tick_to)` in
    /// `branch` (spec §4.6).
    ///
    /// - If the destination is later, iterate `settings` forward; the last
    ///   write per `(entity, key)` in the window wins.
    /// - If the destination is earlier, iterate `presettings` in reverse;
    ///   the earliest write per `(entity, key)` in the reversed walk wins
    ///   (i.e. the value that was current just before the window started).
    /// - Equal coordinates produce an empty delta.
    pub fn delta(
        &mut self,
        branch: BranchId,
        turn_from: Turn,
        tick_from: Tick,
        turn_to: Turn,
        tick_to: Tick,
    ) -> Vec<(Entity, AttrKey, Option<Value>)> {
        let from = Rev::new(turn_from, tick_from);
        let to = Rev::new(turn_to, tick_to);
        if from == to {
            return Vec::new();
        }
        let Some(bj) = self.branches.get_mut(&branch) else {
            return Vec::new();
        };
        let mut out: Vec<(Entity, AttrKey, Option<Value>)> = Vec::new();
        if to > from {
            // Forward: settings, (from, to], last write wins, so we walk
            // ascending and overwrite earlier hits for the same key.
            let mut by_key: HashMap<(Entity, AttrKey), Option<Value>> = HashMap::new();
            for (_, entry) in bj.settings.slice(Some(from.pack() + 1), Some(to.pack()), 1) {
                if let Some(entry) = entry {
                    by_key.insert((entry.entity.clone(), entry.key.clone()), entry.value.clone());
                }
            }
            for ((entity, key), value) in by_key {
                out.push((entity, key, value));
            }
        } else {
            // Backward: presettings, (to, from], reverse order, earliest
            // hit (i.e. the *last* one visited) wins — equivalently the
            // first time we see a key while walking forward within the
            // window gives the "value just before the window", so collect
            // forward and let the *first* occurrence win.
            let mut by_key: HashMap<(Entity, AttrKey), Option<Value>> = HashMap::new();
            for (_, entry) in bj.presettings.slice(Some(to.pack() + 1), Some(from.pack()), 1) {
                if let Some(entry) = entry {
                    by_key
                        .entry((entry.entity.clone(), entry.key.clone()))
                        .or_insert_with(|| entry.value.clone());
                }
            }
            for ((entity, key), value) in by_key {
                out.push((entity, key, value));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn g(name: &str) -> Entity {
        Entity::Graph(name.to_string())
    }

    #[test]
    fn forward_delta_takes_last_write_per_key() {
        let mut j = SettingJournal::new();
        let b = BranchId(0);
        j.record(b, 0, 0, g("g"), "a".into(), None, Some(Value::Int(1)));
        j.record(b, 0, 1, g("g"), "a".into(), Some(Value::Int(1)), Some(Value::Int(2)));
        let d = j.delta(b, 0, 0, 0, 1);
        assert_eq!(d.len(), 1);
        assert_eq!(d[0].2, Some(Value::Int(2)));
    }

    #[test]
    fn backward_delta_recovers_prior_value() {
        let mut j = SettingJournal::new();
        let b = BranchId(0);
        j.record(b, 0, 0, g("g"), "a".into(), None, Some(Value::Int(1)));
        j.record(b, 0, 1, g("g"), "a".into(), Some(Value::Int(1)), Some(Value::Int(2)));
        let d = j.delta(b, 0, 1, 0, 0);
        assert_eq!(d.len(), 1);
        assert_eq!(d[0].2, Some(Value::Int(1)));
    }

    #[test]
    fn same_coordinate_has_empty_delta() {
        let mut j = SettingJournal::new();
        let b = BranchId(0);
        j.record(b, 0, 0, g("g"), "a".into(), None, Some(Value::Int(1)));
        assert!(j.delta(b, 0, 0, 0, 0).is_empty());
    }
}
