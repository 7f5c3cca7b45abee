//! C6: node/edge existence caches (spec §4.5) — specializations of C4 where
//! the stored value is boolean-or-null, plus the successor/predecessor side
//! indices and their LRU-bounded neighbor-set caches.

use std::collections::{HashMap, HashSet};

use crate::attribute_cache::AttributeCache;
use crate::branch::{BranchId, BranchRegistry};
use crate::coord::{Rev, Tick, Turn};
use crate::entity::{EdgeIndex, Entity, NodeId, ParentTuple, Value};
use crate::error::EngineError;
use crate::journal::SettingJournal;
use crate::windowdict::WindowDict;

/// Attribute key conventionally used on the presence row: existence is
/// recorded as `Entity → PRESENCE_KEY → Some(Value::Bool(true)) | None`,
/// reusing [`AttributeCache`] wholesale instead of re-deriving its history
/// bookkeeping (spec §4.5: "specializations of C4").
pub const PRESENCE_KEY: &str = "";

fn presence_value(exists: bool) -> Option<Value> {
    if exists {
        Some(Value::Bool(true))
    } else {
        None
    }
}

type Neighbor = (NodeId, EdgeIndex);
type NeighborSet = HashSet<Neighbor>;
type Anchor = (String, NodeId);
type NeighborSlot = (Anchor, BranchId, Turn, Tick);

/// An LRU-bounded cache of live-neighbor sets, structurally identical to
/// [`crate::keycache::KeyCache`] but keyed by `(graph, anchor)` and storing
/// `(neighbor, edge_index)` pairs instead of attribute keys.
#[derive(Default)]
struct NeighborCache {
    windows: HashMap<Anchor, WindowDict<NeighborSet>>,
    recency: Vec<NeighborSlot>,
    capacity: usize,
}

fn value_at(win: &mut WindowDict<NeighborSet>, r: u128) -> Option<(u128, NeighborSet)> {
    win.seek(r);
    win.past_view().last().map(|(rev, v)| (*rev, v.clone()))
}

impl NeighborCache {
    fn new(capacity: usize) -> Self {
        NeighborCache {
            windows: HashMap::new(),
            recency: Vec::new(),
            capacity,
        }
    }

    fn touch(&mut self, slot: NeighborSlot) {
        self.recency.retain(|s| s != &slot);
        self.recency.push(slot);
    }

    fn evict_if_needed(&mut self) {
        while self.recency.len() > self.capacity {
            let (anchor, branch, turn, tick) = self.recency.remove(0);
            if let Some(win) = self.windows.get_mut(&anchor) {
                win.remove(Rev::new(turn, tick).pack());
                if win.is_empty() {
                    self.windows.remove(&anchor);
                }
            }
        }
    }

    fn store(&mut self, anchor: Anchor, branch: BranchId, turn: Turn, tick: Tick, set: NeighborSet) {
        let slot = (anchor.clone(), branch, turn, tick);
        self.windows
            .entry(anchor)
            .or_default()
            .set(Rev::new(turn, tick).pack(), set);
        self.touch(slot);
        self.evict_if_needed();
    }

    #[allow(clippy::too_many_arguments)]
    fn lookup(
        &mut self,
        candidates: &HashSet<Neighbor>,
        edges: &mut AttributeCache,
        journal: &mut SettingJournal,
        registry: &BranchRegistry,
        graph: &str,
        anchor_node: &NodeId,
        edge_at: impl Fn(Neighbor) -> Entity,
        branch: BranchId,
        turn: Turn,
        tick: Tick,
        forward: bool,
    ) -> NeighborSet {
        let anchor = (graph.to_string(), anchor_node.clone());
        let target = Rev::new(turn, tick).pack();
        let prior = self.windows.get_mut(&anchor).and_then(|win| value_at(win, target));

        let set = match prior {
            Some((found, set)) if found == target => set,
            Some((found, set)) if forward => {
                let found_rev = Rev::unpack(found);
                let changes = journal.delta(branch, found_rev.turn, found_rev.tick, turn, tick);
                let mut set = set;
                for (changed_entity, key, value) in changes {
                    if key != PRESENCE_KEY {
                        continue;
                    }
                    if let Some(neighbor) = candidates.iter().find(|n| edge_at((*n).clone()) == changed_entity) {
                        if value.is_some() {
                            set.insert(neighbor.clone());
                        } else {
                            set.remove(neighbor);
                        }
                    }
                }
                set
            }
            _ => candidates
                .iter()
                .filter(|n| {
                    edges
                        .retrieve(registry, &edge_at((*n).clone()), &PRESENCE_KEY.to_string(), branch, turn, tick)
                        .is_ok()
                })
                .cloned()
                .collect(),
        };

        self.store(anchor, branch, turn, tick, set.clone());
        set
    }
}

/// Specializations of C4 for node and edge presence, plus the
/// successor/predecessor side indices (spec §4.5).
pub struct ExistenceCache {
    nodes: AttributeCache,
    edges: AttributeCache,
    /// All `(destination, index)` pairs ever recorded for a given
    /// `(graph, origin)` — the candidate pool `destcache` filters by
    /// liveness at a coordinate.
    origin_index: HashMap<Anchor, NeighborSet>,
    /// Symmetric index keyed by destination, feeding `origcache`.
    dest_index: HashMap<Anchor, NeighborSet>,
    destcache: NeighborCache,
    origcache: NeighborCache,
}

impl ExistenceCache {
    pub fn new(shallowest_capacity: usize, neighbor_cache_capacity: usize) -> Self {
        ExistenceCache {
            nodes: AttributeCache::new(shallowest_capacity),
            edges: AttributeCache::new(shallowest_capacity),
            origin_index: HashMap::new(),
            dest_index: HashMap::new(),
            destcache: NeighborCache::new(neighbor_cache_capacity),
            origcache: NeighborCache::new(neighbor_cache_capacity),
        }
    }

    pub fn store_node(
        &mut self,
        graph: &str,
        node: &NodeId,
        branch: BranchId,
        turn: Turn,
        tick: Tick,
        exists: bool,
        planning: bool,
        plan_id: Option<u64>,
    ) -> Result<crate::attribute_cache::StoreOutcome, EngineError> {
        self.nodes.store(
            ParentTuple::Graph(graph.to_string()),
            Entity::Node(graph.to_string(), node.clone()),
            PRESENCE_KEY.to_string(),
            branch,
            turn,
            tick,
            presence_value(exists),
            planning,
            plan_id,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn store_edge(
        &mut self,
        graph: &str,
        origin: &NodeId,
        destination: &NodeId,
        index: EdgeIndex,
        branch: BranchId,
        turn: Turn,
        tick: Tick,
        exists: bool,
        planning: bool,
        plan_id: Option<u64>,
    ) -> Result<crate::attribute_cache::StoreOutcome, EngineError> {
        let outcome = self.edges.store(
            ParentTuple::Node(graph.to_string(), origin.clone()),
            Entity::Edge(graph.to_string(), origin.clone(), destination.clone(), index),
            PRESENCE_KEY.to_string(),
            branch,
            turn,
            tick,
            presence_value(exists),
            planning,
            plan_id,
        )?;
        self.origin_index
            .entry((graph.to_string(), origin.clone()))
            .or_default()
            .insert((destination.clone(), index));
        self.dest_index
            .entry((graph.to_string(), destination.clone()))
            .or_default()
            .insert((origin.clone(), index));
        Ok(outcome)
    }

    pub fn retrieve_node(
        &mut self,
        registry: &BranchRegistry,
        graph: &str,
        node: &NodeId,
        branch: BranchId,
        turn: Turn,
        tick: Tick,
    ) -> Result<bool, EngineError> {
        match self.nodes.retrieve(
            registry,
            &Entity::Node(graph.to_string(), node.clone()),
            &PRESENCE_KEY.to_string(),
            branch,
            turn,
            tick,
        ) {
            Ok(_) => Ok(true),
            Err(EngineError::HistoryFault { deleted: true }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn retrieve_edge(
        &mut self,
        registry: &BranchRegistry,
        graph: &str,
        origin: &NodeId,
        destination: &NodeId,
        index: EdgeIndex,
        branch: BranchId,
        turn: Turn,
        tick: Tick,
    ) -> Result<bool, EngineError> {
        match self.edges.retrieve(
            registry,
            &Entity::Edge(graph.to_string(), origin.clone(), destination.clone(), index),
            &PRESENCE_KEY.to_string(),
            branch,
            turn,
            tick,
        ) {
            Ok(_) => Ok(true),
            Err(EngineError::HistoryFault { deleted: true }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Live destinations reachable from `(graph, origin)` at a coordinate
    /// (spec §4.5 `successors`/`destcache`).
    pub fn successors(
        &mut self,
        journal: &mut SettingJournal,
        registry: &BranchRegistry,
        graph: &str,
        origin: &NodeId,
        branch: BranchId,
        turn: Turn,
        tick: Tick,
        forward: bool,
    ) -> NeighborSet {
        let candidates = self
            .origin_index
            .get(&(graph.to_string(), origin.clone()))
            .cloned()
            .unwrap_or_default();
        let graph_owned = graph.to_string();
        let origin_owned = origin.clone();
        self.destcache.lookup(
            &candidates,
            &mut self.edges,
            journal,
            registry,
            graph,
            origin,
            move |(dest, idx)| Entity::Edge(graph_owned.clone(), origin_owned.clone(), dest, idx),
            branch,
            turn,
            tick,
            forward,
        )
    }

    /// Live origins reaching `(graph, destination)` at a coordinate (spec
    /// §4.5 `predecessors`/`origcache`).
    #[allow(clippy::too_many_arguments)]
    pub fn predecessors(
        &mut self,
        journal: &mut SettingJournal,
        registry: &BranchRegistry,
        graph: &str,
        destination: &NodeId,
        branch: BranchId,
        turn: Turn,
        tick: Tick,
        forward: bool,
    ) -> NeighborSet {
        let candidates = self
            .dest_index
            .get(&(graph.to_string(), destination.clone()))
            .cloned()
            .unwrap_or_default();
        let graph_owned = graph.to_string();
        let dest_owned = destination.clone();
        self.origcache.lookup(
            &candidates,
            &mut self.edges,
            journal,
            registry,
            graph,
            destination,
            move |(orig, idx)| Entity::Edge(graph_owned.clone(), orig, dest_owned.clone(), idx),
            branch,
            turn,
            tick,
            forward,
        )
    }

    /// For each edge incident to `node` that is still live at `(branch,
    /// turn, tick)`, the coordinate itself — the caller is about to store
    /// `node` as deleted there, and each entry returned names a contradiction
    /// that resolution must also account for (spec §4.5).
    pub fn contradictions_caused_by_node(
        &mut self,
        registry: &BranchRegistry,
        graph: &str,
        node: &NodeId,
        branch: BranchId,
        turn: Turn,
        tick: Tick,
    ) -> Vec<(Turn, Tick)> {
        let mut incident: Vec<Entity> = Vec::new();
        if let Some(dests) = self.origin_index.get(&(graph.to_string(), node.clone())) {
            for (dest, idx) in dests {
                incident.push(Entity::Edge(graph.to_string(), node.clone(), dest.clone(), *idx));
            }
        }
        if let Some(origs) = self.dest_index.get(&(graph.to_string(), node.clone())) {
            for (orig, idx) in origs {
                incident.push(Entity::Edge(graph.to_string(), orig.clone(), node.clone(), *idx));
            }
        }

        let mut out = Vec::new();
        for entity in incident {
            if self
                .edges
                .retrieve(registry, &entity, &PRESENCE_KEY.to_string(), branch, turn, tick)
                .is_ok()
            {
                out.push((turn, tick));
            }
        }
        out
    }

    pub fn delete_plan(&mut self, plan_id: u64) {
        self.nodes.delete_plan(plan_id);
        self.edges.delete_plan(plan_id);
    }

    pub fn truncate(&mut self, branch: BranchId, turn: Turn, tick: Tick) {
        self.nodes.truncate(branch, turn, tick);
        self.edges.truncate(branch, turn, tick);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_store_then_retrieve() {
        let mut ex = ExistenceCache::new(64, 16);
        let reg = BranchRegistry::new();
        let b = reg.trunk();
        ex.store_node("g", &"n1".to_string(), b, 0, 0, true, false, None).unwrap();
        assert!(ex.retrieve_node(&reg, "g", &"n1".to_string(), b, 0, 0).unwrap());
        ex.store_node("g", &"n1".to_string(), b, 0, 1, false, false, None).unwrap();
        assert!(!ex.retrieve_node(&reg, "g", &"n1".to_string(), b, 0, 1).unwrap());
    }

    #[test]
    fn successors_cold_recompute() {
        let mut ex = ExistenceCache::new(64, 16);
        let mut journal = SettingJournal::new();
        let reg = BranchRegistry::new();
        let b = reg.trunk();
        ex.store_edge("g", &"a".to_string(), &"b".to_string(), 0, b, 0, 0, true, false, None).unwrap();
        journal.record(
            b,
            0,
            0,
            Entity::Edge("g".into(), "a".into(), "b".into(), 0),
            PRESENCE_KEY.to_string(),
            None,
            Some(Value::Bool(true)),
        );
        let succ = ex.successors(&mut journal, &reg, "g", &"a".to_string(), b, 0, 0, false);
        assert_eq!(succ, HashSet::from([("b".to_string(), 0)]));
    }

    #[test]
    fn contradictions_detect_incident_edge() {
        let mut ex = ExistenceCache::new(64, 16);
        let reg = BranchRegistry::new();
        let b = reg.trunk();
        ex.store_edge("g", &"a".to_string(), &"b".to_string(), 0, b, 0, 0, true, false, None).unwrap();
        let hits = ex.contradictions_caused_by_node(&reg, "g", &"a".to_string(), b, 0, 0);
        assert_eq!(hits, vec![(0, 0)]);
    }
}
