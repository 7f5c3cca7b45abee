//! The persistence gateway contract (spec §6): a row-oriented key-value
//! store the engine rehydrates from on construction and flushes to on
//! `commit`. Two implementations ship with the crate: [`memory`] (a
//! reference backend for tests, mirroring the teacher's
//! `repo::memoryrepo::MemoryRepo`) and [`pile`] (an append-only,
//! memory-mapped file, mirroring the teacher's `repo::pile` layout scaled
//! down from a content-addressed blob store to a plain row log).
//!
//! Every row carries its own `(branch, turn, tick)` coordinate; the gateway
//! itself does not interpret ordering beyond "may not reorder writes within
//! a branch past tick order" (spec §6).

pub mod memory;
pub mod pile;

use crate::coord::{Tick, Turn};
use crate::entity::{AttrKey, EdgeIndex, GraphKind, NodeId, Value};

/// One row of [`Gateway::all_branches`].
#[derive(Debug, Clone, PartialEq)]
pub struct BranchRow {
    pub branch: String,
    pub parent: Option<String>,
    pub parent_turn: Turn,
    pub parent_tick: Tick,
    pub end_turn: Turn,
    pub end_tick: Tick,
}

/// One row of [`Gateway::turns_dump`]: the observed and planned extent of a
/// branch at a given turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRow {
    pub branch: String,
    pub turn: Turn,
    pub end_tick: Tick,
    pub plan_end_tick: Tick,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeExistRow {
    pub branch: String,
    pub turn: Turn,
    pub tick: Tick,
    pub graph: String,
    pub node: NodeId,
    pub exists: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeExistRow {
    pub branch: String,
    pub turn: Turn,
    pub tick: Tick,
    pub graph: String,
    pub origin: NodeId,
    pub destination: NodeId,
    pub index: EdgeIndex,
    pub exists: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphValRow {
    pub branch: String,
    pub turn: Turn,
    pub tick: Tick,
    pub graph: String,
    pub key: AttrKey,
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeValRow {
    pub branch: String,
    pub turn: Turn,
    pub tick: Tick,
    pub graph: String,
    pub node: NodeId,
    pub key: AttrKey,
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeValRow {
    pub branch: String,
    pub turn: Turn,
    pub tick: Tick,
    pub graph: String,
    pub origin: NodeId,
    pub destination: NodeId,
    pub index: EdgeIndex,
    pub key: AttrKey,
    pub value: Option<Value>,
}

/// A row store the engine rehydrates from and flushes to (spec §6). Modeled
/// on the teacher's `repo::BranchStore`/`repo::BlobStore` split: a small set
/// of narrow, coordinate-explicit operations rather than a generic
/// query interface, with backend-specific failures kept out of
/// [`crate::error::EngineError`] via an associated `Error` type.
pub trait Gateway {
    type Error: std::error::Error + 'static;

    fn global_get(&mut self, key: &str) -> Result<Option<String>, Self::Error>;
    fn global_set(&mut self, key: &str, value: String) -> Result<(), Self::Error>;
    fn global_del(&mut self, key: &str) -> Result<(), Self::Error>;

    fn all_branches(&mut self) -> Result<Vec<BranchRow>, Self::Error>;
    fn turns_dump(&mut self) -> Result<Vec<TurnRow>, Self::Error>;
    fn new_branch(&mut self, branch: &str, parent: &str, turn: Turn, tick: Tick) -> Result<(), Self::Error>;
    /// Record (or update) `(branch, turn)`'s observed/planned extent.
    ///
    /// Not in spec §6's contract table — `turns_dump` is listed dump-only,
    /// but a dump with no paired write can never yield anything. Added as
    /// the missing write-side of `turns_dump`.
    fn record_turn(&mut self, branch: &str, turn: Turn, end_tick: Tick, plan_end_tick: Tick) -> Result<(), Self::Error>;
    fn graphs_types(&mut self) -> Result<Vec<(String, GraphKind)>, Self::Error>;
    /// Register a graph's kind. Same gap as `record_turn`: `graphs_types`
    /// is dump-only in spec §6's table.
    fn record_graph_kind(&mut self, graph: &str, kind: GraphKind) -> Result<(), Self::Error>;

    fn nodes_dump(&mut self) -> Result<Vec<NodeExistRow>, Self::Error>;
    fn edges_dump(&mut self) -> Result<Vec<EdgeExistRow>, Self::Error>;
    fn graph_val_dump(&mut self) -> Result<Vec<GraphValRow>, Self::Error>;
    fn node_val_dump(&mut self) -> Result<Vec<NodeValRow>, Self::Error>;
    fn edge_val_dump(&mut self) -> Result<Vec<EdgeValRow>, Self::Error>;

    fn exist_node(&mut self, row: NodeExistRow) -> Result<(), Self::Error>;
    fn exist_edge(&mut self, row: EdgeExistRow) -> Result<(), Self::Error>;
    fn graph_val_set(&mut self, row: GraphValRow) -> Result<(), Self::Error>;
    fn node_val_set(&mut self, row: NodeValRow) -> Result<(), Self::Error>;
    fn edge_val_set(&mut self, row: EdgeValRow) -> Result<(), Self::Error>;
}
