//! C7: the engine — owns the `(branch, turn, tick)` cursor and the mode
//! flags, and orchestrates C2 through C6 plus the persistence gateway (spec
//! §4.7).
//!
//! An `Engine<G>` is generic over its [`Gateway`] so tests can run against
//! [`crate::gateway::memory::MemoryGateway`] and production code against
//! [`crate::gateway::pile::PileGateway`] without duplicating orchestration
//! logic.

use std::collections::{HashMap, HashSet};
use std::error::Error as StdError;
use std::fmt;

use crate::attribute_cache::{AttributeCache, PlanId, StoreOutcome};
use crate::branch::{BranchId, BranchRegistry};
use crate::config::EngineConfig;
use crate::coord::{Coord, Tick, Turn};
use crate::delta::Delta;
use crate::entity::{AttrKey, EdgeIndex, Entity, GraphKind, NodeId, ParentTuple, Value};
use crate::error::{EngineError, TimeFaultKind};
use crate::existence::{ExistenceCache, PRESENCE_KEY};
use crate::gateway::{
    EdgeExistRow, EdgeValRow, Gateway, GraphValRow, NodeExistRow, NodeValRow,
};
use crate::journal::SettingJournal;
use crate::keycache::KeyCache;

fn presence_value(exists: bool) -> Option<Value> {
    if exists {
        Some(Value::Bool(true))
    } else {
        None
    }
}

/// The three independent mode flags spec §4.7 describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineMode {
    /// Writes are tagged with the active plan id and do not advance
    /// `turn_end`; branch creation is forbidden.
    pub planning: bool,
    /// The cursor may only advance monotonically; `set_turn` must move to
    /// `current + 1` and `set_branch` is rejected.
    pub forward: bool,
    /// Keycache bookkeeping is suppressed; reads fall back to cold
    /// recompute.
    pub batch: bool,
}

/// A listener invoked after every cursor move with the previous coordinate,
/// the new one, and the delta between them (empty if the move crossed
/// branches). Spec §9's re-expression of the source's time-change signal as
/// a single explicit slot rather than a dispatch bus.
pub type TimeChangeListener = Box<dyn FnMut(Coord, Coord, &Delta)>;

/// Failure constructing an [`Engine`]: either the gateway itself failed, or
/// the rows it returned don't form a consistent branch history.
#[derive(Debug)]
pub enum InitError<E> {
    Gateway(E),
    Engine(EngineError),
}

impl<E: fmt::Display> fmt::Display for InitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::Gateway(e) => write!(f, "gateway error during rehydration: {e}"),
            InitError::Engine(e) => write!(f, "inconsistent rehydrated state: {e}"),
        }
    }
}

impl<E: StdError + 'static> StdError for InitError<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            InitError::Gateway(e) => Some(e),
            InitError::Engine(e) => Some(e),
        }
    }
}

/// A write queued since the last [`Engine::commit`]. Non-planning writes
/// only — plans are hypothetical and are never pushed through the gateway
/// (spec §4.7: `with_plan` "restores the cursor", it does not promise
/// durability for its writes).
enum PendingRow {
    NewBranch {
        branch: String,
        parent: String,
        turn: Turn,
        tick: Tick,
    },
    GraphKind {
        graph: String,
        kind: GraphKind,
    },
    Node(NodeExistRow),
    Edge(EdgeExistRow),
    GraphVal(GraphValRow),
    NodeVal(NodeValRow),
    EdgeVal(EdgeValRow),
}

/// Owns every cache (C2–C6), the cursor, and the persistence gateway.
/// Graph facades ([`crate::facade`]) borrow an `Engine` and translate
/// dictionary-style calls into the methods below.
pub struct Engine<G: Gateway> {
    gateway: G,
    config: EngineConfig,
    registry: BranchRegistry,
    journal: SettingJournal,
    /// Shared across graph, node, and edge attributes: `Entity` already
    /// discriminates the three, so one instance covers all of them (spec
    /// §4.3 names C4 once, not per entity kind).
    attrs: AttributeCache,
    keys: KeyCache,
    existence: ExistenceCache,
    graph_kinds: HashMap<String, GraphKind>,
    turn_end: HashMap<(BranchId, Turn), Tick>,
    turn_end_plan: HashMap<(BranchId, Turn), Tick>,
    cursor: Coord,
    mode: EngineMode,
    next_plan_id: PlanId,
    current_plan: Option<PlanId>,
    pending: Vec<PendingRow>,
    on_time_change: Option<TimeChangeListener>,
}

impl<G: Gateway> Engine<G> {
    /// Construct an engine over `gateway`, rehydrating branch records,
    /// turn-end bookkeeping, attribute/existence history, and the saved
    /// cursor (spec §4.7 "fresh-start sequencing"). A fresh gateway with no
    /// rows yields a `trunk` branch at `(0, 0)`.
    ///
    /// Panics if `config.keycache_capacity` is zero (see
    /// [`EngineConfig::validate`]).
    pub fn new(mut gateway: G, config: EngineConfig) -> Result<Self, InitError<G::Error>> {
        config.validate().expect("invalid engine configuration");

        let branch_rows = gateway.all_branches().map_err(InitError::Gateway)?;
        let registry = if branch_rows.is_empty() {
            BranchRegistry::new()
        } else {
            BranchRegistry::from_rows(branch_rows.into_iter().map(|r| {
                (r.branch, r.parent, r.parent_turn, r.parent_tick, r.end_turn, r.end_tick)
            }))
            .map_err(InitError::Engine)?
        };
        let trunk = registry.trunk();
        let capacity = config.keycache_capacity;

        let mut engine = Engine {
            gateway,
            config,
            registry,
            journal: SettingJournal::new(),
            attrs: AttributeCache::new(capacity),
            keys: KeyCache::new(capacity),
            existence: ExistenceCache::new(capacity, capacity),
            graph_kinds: HashMap::new(),
            turn_end: HashMap::new(),
            turn_end_plan: HashMap::new(),
            cursor: Coord::new(trunk, 0, 0),
            mode: EngineMode::default(),
            next_plan_id: 0,
            current_plan: None,
            pending: Vec::new(),
            on_time_change: None,
        };

        engine.rehydrate_kinds()?;
        engine.rehydrate_turns()?;
        engine.rehydrate_history()?;
        engine.rehydrate_cursor()?;

        Ok(engine)
    }

    fn rehydrate_kinds(&mut self) -> Result<(), InitError<G::Error>> {
        for (name, kind) in self.gateway.graphs_types().map_err(InitError::Gateway)? {
            self.graph_kinds.insert(name, kind);
        }
        Ok(())
    }

    fn rehydrate_turns(&mut self) -> Result<(), InitError<G::Error>> {
        for row in self.gateway.turns_dump().map_err(InitError::Gateway)? {
            let Some(branch) = self.registry.resolve(&row.branch) else {
                continue;
            };
            self.turn_end.insert((branch, row.turn), row.end_tick);
            self.turn_end_plan.insert((branch, row.turn), row.plan_end_tick);
        }
        Ok(())
    }

    /// Replays every dumped row into the attribute/existence caches and
    /// reconstructs the setting journal alongside them. The gateway
    /// contract has no journal dump (spec §6): `prev_value` is recovered by
    /// tracking the last value seen per `(entity, key, branch)` while
    /// replaying rows in the order the gateway yields them.
    fn rehydrate_history(&mut self) -> Result<(), InitError<G::Error>> {
        let mut last_value: HashMap<(Entity, AttrKey, BranchId), Option<Value>> = HashMap::new();

        for row in self.gateway.graph_val_dump().map_err(InitError::Gateway)? {
            let Some(branch) = self.registry.resolve(&row.branch) else {
                continue;
            };
            let entity = Entity::Graph(row.graph.clone());
            let parent = ParentTuple::Graph(row.graph.clone());
            let prev = last_value
                .get(&(entity.clone(), row.key.clone(), branch))
                .cloned()
                .flatten();
            self.attrs
                .store(parent, entity.clone(), row.key.clone(), branch, row.turn, row.tick, row.value.clone(), false, None)
                .map_err(InitError::Engine)?;
            self.journal
                .record(branch, row.turn, row.tick, entity.clone(), row.key.clone(), prev, row.value.clone());
            last_value.insert((entity, row.key, branch), row.value);
        }

        for row in self.gateway.node_val_dump().map_err(InitError::Gateway)? {
            let Some(branch) = self.registry.resolve(&row.branch) else {
                continue;
            };
            let entity = Entity::Node(row.graph.clone(), row.node.clone());
            let parent = ParentTuple::Graph(row.graph.clone());
            let prev = last_value
                .get(&(entity.clone(), row.key.clone(), branch))
                .cloned()
                .flatten();
            self.attrs
                .store(parent, entity.clone(), row.key.clone(), branch, row.turn, row.tick, row.value.clone(), false, None)
                .map_err(InitError::Engine)?;
            self.journal
                .record(branch, row.turn, row.tick, entity.clone(), row.key.clone(), prev, row.value.clone());
            last_value.insert((entity, row.key, branch), row.value);
        }

        for row in self.gateway.edge_val_dump().map_err(InitError::Gateway)? {
            let Some(branch) = self.registry.resolve(&row.branch) else {
                continue;
            };
            let entity = Entity::Edge(row.graph.clone(), row.origin.clone(), row.destination.clone(), row.index);
            let parent = ParentTuple::Node(row.graph.clone(), row.origin.clone());
            let prev = last_value
                .get(&(entity.clone(), row.key.clone(), branch))
                .cloned()
                .flatten();
            self.attrs
                .store(parent, entity.clone(), row.key.clone(), branch, row.turn, row.tick, row.value.clone(), false, None)
                .map_err(InitError::Engine)?;
            self.journal
                .record(branch, row.turn, row.tick, entity.clone(), row.key.clone(), prev, row.value.clone());
            last_value.insert((entity, row.key, branch), row.value);
        }

        let mut last_presence: HashMap<(Entity, BranchId), bool> = HashMap::new();

        for row in self.gateway.nodes_dump().map_err(InitError::Gateway)? {
            let Some(branch) = self.registry.resolve(&row.branch) else {
                continue;
            };
            let entity = Entity::Node(row.graph.clone(), row.node.clone());
            let prev = last_presence.get(&(entity.clone(), branch)).copied().unwrap_or(false);
            self.existence
                .store_node(&row.graph, &row.node, branch, row.turn, row.tick, row.exists, false, None)
                .map_err(InitError::Engine)?;
            self.journal.record(
                branch,
                row.turn,
                row.tick,
                entity.clone(),
                PRESENCE_KEY.to_string(),
                presence_value(prev),
                presence_value(row.exists),
            );
            last_presence.insert((entity, branch), row.exists);
        }

        for row in self.gateway.edges_dump().map_err(InitError::Gateway)? {
            let Some(branch) = self.registry.resolve(&row.branch) else {
                continue;
            };
            let entity = Entity::Edge(row.graph.clone(), row.origin.clone(), row.destination.clone(), row.index);
            let prev = last_presence.get(&(entity.clone(), branch)).copied().unwrap_or(false);
            self.existence
                .store_edge(&row.graph, &row.origin, &row.destination, row.index, branch, row.turn, row.tick, row.exists, false, None)
                .map_err(InitError::Engine)?;
            self.journal.record(
                branch,
                row.turn,
                row.tick,
                entity.clone(),
                PRESENCE_KEY.to_string(),
                presence_value(prev),
                presence_value(row.exists),
            );
            last_presence.insert((entity, branch), row.exists);
        }

        Ok(())
    }

    fn rehydrate_cursor(&mut self) -> Result<(), InitError<G::Error>> {
        let branch_name = self.gateway.global_get("cursor_branch").map_err(InitError::Gateway)?;
        let turn = self.gateway.global_get("cursor_turn").map_err(InitError::Gateway)?;
        let tick = self.gateway.global_get("cursor_tick").map_err(InitError::Gateway)?;

        let branch = branch_name
            .and_then(|n| self.registry.resolve(&n))
            .unwrap_or_else(|| self.registry.trunk());
        let turn = turn.and_then(|t| t.parse().ok()).unwrap_or(0);
        let tick = tick.and_then(|x| x.parse().ok()).unwrap_or(0);
        self.cursor = Coord::new(branch, turn, tick);
        Ok(())
    }

    /// Push every write queued since the last commit, the full turn-end
    /// bookkeeping, and the cursor through the gateway in one pass (spec
    /// §4.7 "push all cached writes and branch/turn bookkeeping ... in one
    /// transaction"). Turn rows are resent in full on every commit rather
    /// than tracked incrementally: [`Gateway::record_turn`] updates in
    /// place, so resending is idempotent and the row count is bounded by
    /// `branches × turns touched`, not by write volume.
    pub fn commit(&mut self) -> Result<(), G::Error> {
        for row in self.pending.drain(..) {
            match row {
                PendingRow::NewBranch { branch, parent, turn, tick } => {
                    self.gateway.new_branch(&branch, &parent, turn, tick)?
                }
                PendingRow::GraphKind { graph, kind } => self.gateway.record_graph_kind(&graph, kind)?,
                PendingRow::Node(row) => self.gateway.exist_node(row)?,
                PendingRow::Edge(row) => self.gateway.exist_edge(row)?,
                PendingRow::GraphVal(row) => self.gateway.graph_val_set(row)?,
                PendingRow::NodeVal(row) => self.gateway.node_val_set(row)?,
                PendingRow::EdgeVal(row) => self.gateway.edge_val_set(row)?,
            }
        }

        let turns: Vec<(BranchId, Turn)> = self.turn_end_plan.keys().copied().collect();
        for (branch, turn) in turns {
            let end_tick = self.turn_end.get(&(branch, turn)).copied().unwrap_or(0);
            let plan_end_tick = self.turn_end_plan.get(&(branch, turn)).copied().unwrap_or(0);
            let branch_name = self.registry.name(branch).to_string();
            self.gateway.record_turn(&branch_name, turn, end_tick, plan_end_tick)?;
        }

        self.gateway.global_set("cursor_branch", self.registry.name(self.cursor.branch).to_string())?;
        self.gateway.global_set("cursor_turn", self.cursor.turn.to_string())?;
        self.gateway.global_set("cursor_tick", self.cursor.tick.to_string())?;
        Ok(())
    }

    pub fn cursor(&self) -> Coord {
        self.cursor
    }

    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    pub fn branch_name(&self) -> &str {
        self.registry.name(self.cursor.branch)
    }

    pub fn registry(&self) -> &BranchRegistry {
        &self.registry
    }

    /// Number of entries currently held in the keycache, across all parent
    /// tuples (spec §4.4 LRU bound) — mainly useful for asserting that
    /// batch mode actually suppressed bookkeeping.
    pub fn keycache_len(&self) -> usize {
        self.keys.len()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Install the single `on_time_change` listener (spec §9), replacing
    /// any previous one.
    pub fn set_time_change_listener(&mut self, listener: impl FnMut(Coord, Coord, &Delta) + 'static) {
        self.on_time_change = Some(Box::new(listener));
    }

    pub fn clear_time_change_listener(&mut self) {
        self.on_time_change = None;
    }

    fn move_cursor(&mut self, branch: BranchId, turn: Turn, tick: Tick) {
        let prev = self.cursor;
        let next = Coord::new(branch, turn, tick);
        if prev == next {
            return;
        }
        let delta = if prev.branch == next.branch {
            let rows = self.journal.delta(branch, prev.turn, prev.tick, turn, tick);
            Delta::from_rows(rows)
        } else {
            Delta::new()
        };
        self.cursor = next;
        if let Some(listener) = self.on_time_change.as_mut() {
            listener(prev, next, &delta);
        }
    }

    fn bump_turn_end_plan(&mut self, branch: BranchId, turn: Turn, tick: Tick) {
        let entry = self.turn_end_plan.entry((branch, turn)).or_insert(0);
        if tick > *entry {
            *entry = tick;
        }
    }

    /// Advances `turn_end` and, to keep the `turn_end ≤ turn_end_plan`
    /// invariant (spec §9 open question) true on every mutation, advances
    /// `turn_end_plan` alongside it and extends the branch's observed
    /// extent in the registry.
    fn bump_turn_end(&mut self, branch: BranchId, turn: Turn, tick: Tick) {
        let entry = self.turn_end.entry((branch, turn)).or_insert(0);
        if tick > *entry {
            *entry = tick;
        }
        self.registry.extend(branch, turn, tick);
        self.bump_turn_end_plan(branch, turn, tick);
    }

    /// Resolve a [`StoreOutcome`]: delete every contradicted plan, then
    /// truncate the branch's extent, journal, and both history caches to
    /// the new write's coordinate (spec §4.3).
    fn apply_outcome(&mut self, branch: BranchId, outcome: StoreOutcome) {
        let Some((t, x)) = outcome.truncate_to else {
            return;
        };
        for pid in outcome.contradicted_plans {
            self.delete_plan(pid);
        }
        self.registry.truncate_extent(branch, t, x);
        self.journal.truncate(branch, t, x);
        self.attrs.truncate(branch, t, x);
        self.existence.truncate(branch, t, x);
        self.turn_end.retain(|&(b, turn), tick| b != branch || (turn, *tick) <= (t, x));
        self.turn_end_plan.retain(|&(b, turn), tick| b != branch || (turn, *tick) <= (t, x));
    }

    /// Delete every write tagged with `plan_id`, in both the attribute and
    /// existence caches (spec §4.7).
    pub fn delete_plan(&mut self, plan_id: PlanId) {
        self.attrs.delete_plan(plan_id);
        self.existence.delete_plan(plan_id);
    }

    /// Move to branch `name`, creating it as a fork of the current branch
    /// at the current `(turn, tick)` if it doesn't exist yet. Rejected
    /// while planning (forking is a durability-relevant act) or in forward
    /// mode (a branch switch is not a monotonic time advance).
    pub fn set_branch(&mut self, name: &str) -> Result<(), EngineError> {
        if self.mode.planning {
            return Err(EngineError::TimeFault(TimeFaultKind::PlanningRestricted));
        }
        if self.mode.forward {
            return Err(EngineError::TimeFault(TimeFaultKind::ForwardViolation));
        }
        let turn = self.cursor.turn;
        let branch = match self.registry.resolve(name) {
            Some(b) => b,
            None => {
                let from_name = self.registry.name(self.cursor.branch).to_string();
                let (t, x) = (self.cursor.turn, self.cursor.tick);
                let b = self.registry.fork(name, &from_name, t, x)?;
                self.turn_end.insert((b, t), x);
                self.turn_end_plan.insert((b, t), x);
                self.pending.push(PendingRow::NewBranch {
                    branch: name.to_string(),
                    parent: from_name,
                    turn: t,
                    tick: x,
                });
                b
            }
        };
        let tick = self.turn_end_plan.get(&(branch, turn)).copied().unwrap_or(0);
        self.move_cursor(branch, turn, tick);
        Ok(())
    }

    /// Move to turn `t` within the current branch. In forward mode, `t`
    /// must equal `current + 1`. Outside planning, moving beyond the
    /// branch's observed extent grows it; inside planning, the cursor may
    /// range freely ahead without mutating the observed extent (spec
    /// §4.7).
    pub fn set_turn(&mut self, t: Turn) -> Result<(), EngineError> {
        let branch = self.cursor.branch;
        if self.mode.forward && t != self.cursor.turn + 1 {
            return Err(EngineError::TimeFault(TimeFaultKind::ForwardViolation));
        }
        if !self.mode.planning {
            let (end_turn, _) = self.registry.extent(branch);
            if t > end_turn {
                self.registry.extend(branch, t, 0);
            }
        }
        let tick = if self.mode.planning {
            self.turn_end_plan.get(&(branch, t)).copied().unwrap_or(0)
        } else {
            self.turn_end.get(&(branch, t)).copied().unwrap_or(0)
        };
        self.move_cursor(branch, t, tick);
        Ok(())
    }

    /// Move within the current turn. Extends `turn_end_plan` always, and
    /// `turn_end` (plus the branch's observed extent) when not planning
    /// (spec §4.7).
    pub fn set_tick(&mut self, x: Tick) -> Result<(), EngineError> {
        let Coord { branch, turn, .. } = self.cursor;
        self.bump_turn_end_plan(branch, turn, x);
        if !self.mode.planning {
            self.bump_turn_end(branch, turn, x);
        }
        self.move_cursor(branch, turn, x);
        Ok(())
    }

    /// Atomically reserve the next tick for a write. Fails with
    /// [`EngineError::HistoryFault`] if the cursor sits before ticks that
    /// already exist in the current turn — observing the past is fine,
    /// writing into it through `next_tick` is not outside of a plan (spec
    /// §4.7).
    pub fn next_tick(&mut self) -> Result<(Turn, Tick), EngineError> {
        let Coord { branch, turn, tick } = self.cursor;
        if !self.mode.planning {
            let ceiling = self.turn_end.get(&(branch, turn)).copied().unwrap_or(0);
            if tick < ceiling {
                return Err(EngineError::TimeFault(TimeFaultKind::PastWrite));
            }
        }
        let new_tick = tick + 1;
        if self.mode.planning {
            self.bump_turn_end_plan(branch, turn, new_tick);
        } else {
            self.bump_turn_end(branch, turn, new_tick);
        }
        self.move_cursor(branch, turn, new_tick);
        Ok((turn, new_tick))
    }

    /// Snapshot the cursor, enter planning mode, run `f`, then restore the
    /// cursor and mode. Writes inside `f` are tagged with a fresh monotone
    /// plan id; `delete_plan` can later remove them en masse (spec §4.7).
    pub fn with_plan<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> Result<R, EngineError> {
        if self.mode.planning {
            return Err(EngineError::TimeFault(TimeFaultKind::NestedPlan));
        }
        let saved_cursor = self.cursor;
        let saved_mode = self.mode;
        self.mode.planning = true;
        self.next_plan_id += 1;
        self.current_plan = Some(self.next_plan_id);
        let result = f(self);
        self.cursor = saved_cursor;
        self.mode = saved_mode;
        self.current_plan = None;
        Ok(result)
    }

    /// Run `f` with forward mode asserted, restoring the previous setting
    /// afterward (spec §4.7).
    pub fn with_forward<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let prev = self.mode.forward;
        self.mode.forward = true;
        let result = f(self);
        self.mode.forward = prev;
        result
    }

    /// Run `f` with keycache bookkeeping suppressed (spec §4.7).
    pub fn with_batch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let prev = self.mode.batch;
        self.mode.batch = true;
        let result = f(self);
        self.mode.batch = prev;
        result
    }

    fn apply_write(
        &mut self,
        parent: ParentTuple,
        entity: Entity,
        key: AttrKey,
        value: Option<Value>,
    ) -> Result<(BranchId, Turn, Tick), EngineError> {
        let Coord { branch, turn, tick } = self.cursor;
        let prev = self.attrs.retrieve(&self.registry, &entity, &key, branch, turn, tick).ok();
        let outcome = self.attrs.store(
            parent,
            entity.clone(),
            key.clone(),
            branch,
            turn,
            tick,
            value.clone(),
            self.mode.planning,
            self.current_plan,
        )?;
        self.journal.record(branch, turn, tick, entity.clone(), key.clone(), prev, value.clone());
        if !self.mode.batch {
            self.keys.observe_write(entity, branch, turn, tick, key, value.is_some());
        }
        self.apply_outcome(branch, outcome);
        if self.mode.planning {
            self.bump_turn_end_plan(branch, turn, tick);
        } else {
            self.bump_turn_end(branch, turn, tick);
        }
        Ok((branch, turn, tick))
    }

    pub fn set_graph_attr(&mut self, graph: &str, key: &str, value: Option<Value>) -> Result<(), EngineError> {
        let (branch, turn, tick) = self.apply_write(
            ParentTuple::Graph(graph.to_string()),
            Entity::Graph(graph.to_string()),
            key.to_string(),
            value.clone(),
        )?;
        if !self.mode.planning {
            self.pending.push(PendingRow::GraphVal(GraphValRow {
                branch: self.registry.name(branch).to_string(),
                turn,
                tick,
                graph: graph.to_string(),
                key: key.to_string(),
                value,
            }));
        }
        Ok(())
    }

    pub fn get_graph_attr(&mut self, graph: &str, key: &str) -> Result<Value, EngineError> {
        let Coord { branch, turn, tick } = self.cursor;
        self.attrs
            .retrieve(&self.registry, &Entity::Graph(graph.to_string()), &key.to_string(), branch, turn, tick)
    }

    pub fn set_node_attr(&mut self, graph: &str, node: &NodeId, key: &str, value: Option<Value>) -> Result<(), EngineError> {
        let (branch, turn, tick) = self.apply_write(
            ParentTuple::Graph(graph.to_string()),
            Entity::Node(graph.to_string(), node.clone()),
            key.to_string(),
            value.clone(),
        )?;
        if !self.mode.planning {
            self.pending.push(PendingRow::NodeVal(NodeValRow {
                branch: self.registry.name(branch).to_string(),
                turn,
                tick,
                graph: graph.to_string(),
                node: node.clone(),
                key: key.to_string(),
                value,
            }));
        }
        Ok(())
    }

    pub fn get_node_attr(&mut self, graph: &str, node: &NodeId, key: &str) -> Result<Value, EngineError> {
        let Coord { branch, turn, tick } = self.cursor;
        self.attrs.retrieve(
            &self.registry,
            &Entity::Node(graph.to_string(), node.clone()),
            &key.to_string(),
            branch,
            turn,
            tick,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_edge_attr(
        &mut self,
        graph: &str,
        origin: &NodeId,
        destination: &NodeId,
        index: EdgeIndex,
        key: &str,
        value: Option<Value>,
    ) -> Result<(), EngineError> {
        let (branch, turn, tick) = self.apply_write(
            ParentTuple::Node(graph.to_string(), origin.clone()),
            Entity::Edge(graph.to_string(), origin.clone(), destination.clone(), index),
            key.to_string(),
            value.clone(),
        )?;
        if !self.mode.planning {
            self.pending.push(PendingRow::EdgeVal(EdgeValRow {
                branch: self.registry.name(branch).to_string(),
                turn,
                tick,
                graph: graph.to_string(),
                origin: origin.clone(),
                destination: destination.clone(),
                index,
                key: key.to_string(),
                value,
            }));
        }
        Ok(())
    }

    pub fn get_edge_attr(
        &mut self,
        graph: &str,
        origin: &NodeId,
        destination: &NodeId,
        index: EdgeIndex,
        key: &str,
    ) -> Result<Value, EngineError> {
        let Coord { branch, turn, tick } = self.cursor;
        self.attrs.retrieve(
            &self.registry,
            &Entity::Edge(graph.to_string(), origin.clone(), destination.clone(), index),
            &key.to_string(),
            branch,
            turn,
            tick,
        )
    }

    /// Register a graph's kind. Idempotent for a graph already registered
    /// with the same kind; mismatched re-registration is an
    /// [`EngineError::EntityCollision`].
    pub fn create_graph(&mut self, name: &str, kind: GraphKind) -> Result<(), EngineError> {
        if self.config.is_illegal_graph_name(name) {
            return Err(EngineError::GraphNameError(format!("`{name}` is a reserved graph name")));
        }
        match self.graph_kinds.get(name) {
            Some(existing) if *existing != kind => {
                return Err(EngineError::EntityCollision(format!(
                    "graph `{name}` already exists with a different kind"
                )));
            }
            Some(_) => return Ok(()),
            None => {}
        }
        self.graph_kinds.insert(name.to_string(), kind);
        self.pending.push(PendingRow::GraphKind { graph: name.to_string(), kind });
        Ok(())
    }

    pub fn graph_kind(&self, name: &str) -> Option<GraphKind> {
        self.graph_kinds.get(name).copied()
    }

    fn apply_existence_node(&mut self, graph: &str, node: &NodeId, exists: bool) -> Result<(BranchId, Turn, Tick), EngineError> {
        let Coord { branch, turn, tick } = self.cursor;
        let prev_exists = self.existence.retrieve_node(&self.registry, graph, node, branch, turn, tick).unwrap_or(false);
        let outcome = self
            .existence
            .store_node(graph, node, branch, turn, tick, exists, self.mode.planning, self.current_plan)?;
        let entity = Entity::Node(graph.to_string(), node.clone());
        self.journal.record(
            branch,
            turn,
            tick,
            entity,
            PRESENCE_KEY.to_string(),
            presence_value(prev_exists),
            presence_value(exists),
        );
        self.apply_outcome(branch, outcome);
        if self.mode.planning {
            self.bump_turn_end_plan(branch, turn, tick);
        } else {
            self.bump_turn_end(branch, turn, tick);
        }
        Ok((branch, turn, tick))
    }

    /// Create or delete a node's presence at the current cursor. Rejected
    /// for node names in `illegal_node_names` (spec §6), but only when
    /// creating (a delete of a name that was never legal to create still
    /// needs to be expressible so history stays consistent).
    pub fn set_node_exists(&mut self, graph: &str, node: &NodeId, exists: bool) -> Result<(), EngineError> {
        if exists && self.config.is_illegal_node_name(node) {
            return Err(EngineError::GraphNameError(format!("`{node}` is a reserved node name")));
        }
        let (branch, turn, tick) = self.apply_existence_node(graph, node, exists)?;
        if !self.mode.planning {
            self.pending.push(PendingRow::Node(NodeExistRow {
                branch: self.registry.name(branch).to_string(),
                turn,
                tick,
                graph: graph.to_string(),
                node: node.clone(),
                exists,
            }));
        }
        Ok(())
    }

    pub fn node_exists(&mut self, graph: &str, node: &NodeId) -> Result<bool, EngineError> {
        let Coord { branch, turn, tick } = self.cursor;
        self.existence.retrieve_node(&self.registry, graph, node, branch, turn, tick)
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_existence_edge(
        &mut self,
        graph: &str,
        origin: &NodeId,
        destination: &NodeId,
        index: EdgeIndex,
        exists: bool,
    ) -> Result<(BranchId, Turn, Tick), EngineError> {
        let Coord { branch, turn, tick } = self.cursor;
        let prev_exists = self
            .existence
            .retrieve_edge(&self.registry, graph, origin, destination, index, branch, turn, tick)
            .unwrap_or(false);
        let outcome = self.existence.store_edge(
            graph,
            origin,
            destination,
            index,
            branch,
            turn,
            tick,
            exists,
            self.mode.planning,
            self.current_plan,
        )?;
        let entity = Entity::Edge(graph.to_string(), origin.clone(), destination.clone(), index);
        self.journal.record(
            branch,
            turn,
            tick,
            entity,
            PRESENCE_KEY.to_string(),
            presence_value(prev_exists),
            presence_value(exists),
        );
        self.apply_outcome(branch, outcome);
        if self.mode.planning {
            self.bump_turn_end_plan(branch, turn, tick);
        } else {
            self.bump_turn_end(branch, turn, tick);
        }
        Ok((branch, turn, tick))
    }

    pub fn set_edge_exists(
        &mut self,
        graph: &str,
        origin: &NodeId,
        destination: &NodeId,
        index: EdgeIndex,
        exists: bool,
    ) -> Result<(), EngineError> {
        let (branch, turn, tick) = self.apply_existence_edge(graph, origin, destination, index, exists)?;
        if !self.mode.planning {
            self.pending.push(PendingRow::Edge(EdgeExistRow {
                branch: self.registry.name(branch).to_string(),
                turn,
                tick,
                graph: graph.to_string(),
                origin: origin.clone(),
                destination: destination.clone(),
                index,
                exists,
            }));
        }
        Ok(())
    }

    pub fn edge_exists(&mut self, graph: &str, origin: &NodeId, destination: &NodeId, index: EdgeIndex) -> Result<bool, EngineError> {
        let Coord { branch, turn, tick } = self.cursor;
        self.existence
            .retrieve_edge(&self.registry, graph, origin, destination, index, branch, turn, tick)
    }

    pub fn successors(&mut self, graph: &str, origin: &NodeId) -> HashSet<(NodeId, EdgeIndex)> {
        let Coord { branch, turn, tick } = self.cursor;
        let forward = self.mode.forward;
        self.existence
            .successors(&mut self.journal, &self.registry, graph, origin, branch, turn, tick, forward)
    }

    pub fn predecessors(&mut self, graph: &str, destination: &NodeId) -> HashSet<(NodeId, EdgeIndex)> {
        let Coord { branch, turn, tick } = self.cursor;
        let forward = self.mode.forward;
        self.existence
            .predecessors(&mut self.journal, &self.registry, graph, destination, branch, turn, tick, forward)
    }

    /// Coordinates at which an edge incident to `node` is still live — the
    /// caller is about to delete `node` there (spec §4.5).
    pub fn node_edge_contradictions(&mut self, graph: &str, node: &NodeId) -> Vec<(Turn, Tick)> {
        let Coord { branch, turn, tick } = self.cursor;
        self.existence.contradictions_caused_by_node(&self.registry, graph, node, branch, turn, tick)
    }

    pub fn graph_attr_keys(&mut self, graph: &str) -> HashSet<AttrKey> {
        let Coord { branch, turn, tick } = self.cursor;
        let forward = self.mode.forward;
        self.keys
            .lookup(&mut self.attrs, &mut self.journal, &self.registry, &Entity::Graph(graph.to_string()), branch, turn, tick, forward)
    }

    pub fn node_attr_keys(&mut self, graph: &str, node: &NodeId) -> HashSet<AttrKey> {
        let Coord { branch, turn, tick } = self.cursor;
        let forward = self.mode.forward;
        self.keys.lookup(
            &mut self.attrs,
            &mut self.journal,
            &self.registry,
            &Entity::Node(graph.to_string(), node.clone()),
            branch,
            turn,
            tick,
            forward,
        )
    }

    pub fn edge_attr_keys(&mut self, graph: &str, origin: &NodeId, destination: &NodeId, index: EdgeIndex) -> HashSet<AttrKey> {
        let Coord { branch, turn, tick } = self.cursor;
        let forward = self.mode.forward;
        self.keys.lookup(
            &mut self.attrs,
            &mut self.journal,
            &self.registry,
            &Entity::Edge(graph.to_string(), origin.clone(), destination.clone(), index),
            branch,
            turn,
            tick,
            forward,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::MemoryGateway;

    fn engine() -> Engine<MemoryGateway> {
        Engine::new(MemoryGateway::new(), EngineConfig::default()).unwrap()
    }

    #[test]
    fn linear_write_read_scenario() {
        let mut e = engine();
        e.set_node_exists("g", &"n".to_string(), true).unwrap();
        assert!(e.node_exists("g", &"n".to_string()).unwrap());

        e.set_tick(1).unwrap();
        e.set_node_exists("g", &"n".to_string(), false).unwrap();
        assert!(!e.node_exists("g", &"n".to_string()).unwrap());

        e.set_tick(0).unwrap();
        assert!(e.node_exists("g", &"n".to_string()).unwrap());
    }

    #[test]
    fn branch_fork_scenario() {
        let mut e = engine();
        e.set_tick(5).unwrap();
        e.set_graph_attr("g", "a", Some(Value::Int(1))).unwrap();

        e.set_branch("alt").unwrap();
        e.set_tick(6).unwrap();
        e.set_graph_attr("g", "a", Some(Value::Int(2))).unwrap();

        e.set_branch("trunk").unwrap();
        e.set_tick(6).unwrap();
        assert_eq!(e.get_graph_attr("g", "a").unwrap(), Value::Int(1));

        e.set_branch("alt").unwrap();
        assert_eq!(e.get_graph_attr("g", "a").unwrap(), Value::Int(2));
    }

    #[test]
    fn plan_writes_are_visible_but_do_not_move_turn_end() {
        let mut e = engine();
        e.set_turn(1).unwrap();
        e.with_plan(|eng| {
            eng.set_graph_attr("g", "x", Some(Value::Int(10))).unwrap();
        })
        .unwrap();

        assert_eq!(e.cursor().turn, 1);
        assert_eq!(e.cursor().tick, 0);
        e.set_turn(1).unwrap();
        assert_eq!(e.get_graph_attr("g", "x").unwrap(), Value::Int(10));
    }

    #[test]
    fn contradiction_deletes_plan_and_truncates_branch() {
        let mut e = engine();
        e.set_graph_attr("g", "y", Some(Value::Str("A".into()))).unwrap();

        e.set_turn(1).unwrap();
        e.with_plan(|eng| {
            eng.set_graph_attr("g", "y", Some(Value::Str("B".into()))).unwrap();
        })
        .unwrap();

        e.set_turn(0).unwrap();
        e.set_tick(1).unwrap();
        e.set_graph_attr("g", "y", Some(Value::Str("C".into()))).unwrap();

        let branch = e.cursor().branch;
        assert_eq!(e.registry.extent(branch), (0, 1));

        e.set_turn(1).unwrap();
        assert_eq!(e.get_graph_attr("g", "y").unwrap(), Value::Str("C".into()));
    }

    #[test]
    fn commit_then_rehydrate_round_trips() {
        let gw = MemoryGateway::new();
        let mut e = Engine::new(gw, EngineConfig::default()).unwrap();
        e.set_graph_attr("g", "z", Some(Value::Int(9))).unwrap();
        e.set_node_exists("g", &"n".to_string(), true).unwrap();
        e.commit().unwrap();

        let gw = e.gateway;
        let mut reloaded = Engine::new(gw, EngineConfig::default()).unwrap();
        assert_eq!(reloaded.get_graph_attr("g", "z").unwrap(), Value::Int(9));
        assert!(reloaded.node_exists("g", &"n".to_string()).unwrap());
    }
}
