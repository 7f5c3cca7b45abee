//! Entity identity and attribute values (spec §3).
//!
//! Graphs are identified by name; nodes by `(graph, node_id)`; edges by
//! `(graph, origin, destination, index)` where `index` is `0` for simple
//! graphs and a multi-edge discriminator for multigraphs.

use std::fmt;

/// A node or graph identifier. Kept as an owned `String` rather than an
/// interned symbol: the engine's hot path is the attribute cache, not
/// identifier comparison, and interning would be an optimization with no
/// counterpart requirement in the spec.
pub type NodeId = String;

/// A multi-edge discriminator; `0` for simple graphs.
pub type EdgeIndex = u32;

/// An attribute name, scoped to whatever entity it's looked up on.
pub type AttrKey = String;

/// The tagged union spec §9 recommends in place of the source's graph-kind
/// inheritance hierarchy. `kind` selects whether an `Entity::Edge`'s
/// `origin`/`destination` pair also needs predecessor bookkeeping (directed
/// variants) and whether `index` is meaningful (multigraph variants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphKind {
    Graph,
    DiGraph,
    MultiGraph,
    MultiDiGraph,
}

impl GraphKind {
    pub fn is_directed(self) -> bool {
        matches!(self, GraphKind::DiGraph | GraphKind::MultiDiGraph)
    }

    pub fn is_multi(self) -> bool {
        matches!(self, GraphKind::MultiGraph | GraphKind::MultiDiGraph)
    }
}

/// Identity of a node, edge, or graph — the `E` in "attribute K of entity E".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Entity {
    Graph(String),
    Node(String, NodeId),
    Edge(String, NodeId, NodeId, EdgeIndex),
}

impl Entity {
    /// The "parent tuple" a keycache entry is indexed by: the graph for a
    /// node's keys, the `(graph, origin)` pair for an edge's destinations,
    /// etc. See spec §3 "Keycache entry".
    pub fn parent(&self) -> ParentTuple {
        match self {
            Entity::Graph(g) => ParentTuple::Graph(g.clone()),
            Entity::Node(g, _) => ParentTuple::Graph(g.clone()),
            Entity::Edge(g, orig, _, _) => ParentTuple::Node(g.clone(), orig.clone()),
        }
    }

    pub fn graph(&self) -> &str {
        match self {
            Entity::Graph(g) | Entity::Node(g, _) | Entity::Edge(g, _, _, _) => g,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Graph(g) => write!(f, "graph:{g}"),
            Entity::Node(g, n) => write!(f, "node:{g}/{n}"),
            Entity::Edge(g, o, d, i) => write!(f, "edge:{g}/{o}->{d}#{i}"),
        }
    }
}

/// The "parent" an entity's keys/neighbors are grouped under for keycache
/// purposes (spec §3, §4.4).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParentTuple {
    Graph(String),
    Node(String, NodeId),
}

/// Attribute values. A small closed enum rather than an open/dynamic type:
/// the spec never requires more than equality and cloning, and the source's
/// pickled-Python values have no faithful Rust equivalent.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}
