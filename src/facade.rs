//! Graph facades: thin, borrowing dictionary-style views over an
//! [`Engine`], mirroring the `graph[attr]` / `graph.node[id][attr]` /
//! `graph.adj[orig][dest][attr]` contract of spec §4's external interface
//! table. Every read or write here is an ordinary engine call at the
//! current cursor — these types buffer nothing (spec §5).
//!
//! `std::ops::Index` can't return a `Result`, so reads/writes are plain
//! `get_attr`/`set_attr` methods instead of operator overloads; chained
//! `graph.node(id).adj(dest, 0)` plays the role of the bracketed
//! `graph.node[id].adj[dest][0]` the source language allows.

use std::collections::HashSet;

use crate::coord::Coord;
use crate::entity::{AttrKey, EdgeIndex, GraphKind, NodeId, Value};
use crate::error::EngineError;
use crate::gateway::Gateway;
use crate::engine::Engine;

impl<G: Gateway> Engine<G> {
    /// Borrow a dictionary-like view of `name` at the current cursor. Does
    /// not require `name` to have been registered with [`Engine::create_graph`]
    /// yet — reads before any write simply surface `HistoryFault`.
    pub fn graph(&mut self, name: &str) -> GraphFacade<'_, G> {
        GraphFacade {
            engine: self,
            graph: name.to_string(),
        }
    }
}

/// A view bound to one graph name, borrowing the engine mutably for the
/// duration of the view.
pub struct GraphFacade<'a, G: Gateway> {
    engine: &'a mut Engine<G>,
    graph: String,
}

impl<'a, G: Gateway> GraphFacade<'a, G> {
    pub fn name(&self) -> &str {
        &self.graph
    }

    pub fn kind(&self) -> Option<GraphKind> {
        self.engine.graph_kind(&self.graph)
    }

    pub fn cursor(&self) -> Coord {
        self.engine.cursor()
    }

    /// `graph[attr]`.
    pub fn get_attr(&mut self, key: &str) -> Result<Value, EngineError> {
        self.engine.get_graph_attr(&self.graph, key)
    }

    /// `graph[attr] = value`; `None` deletes.
    pub fn set_attr(&mut self, key: &str, value: Option<Value>) -> Result<(), EngineError> {
        self.engine.set_graph_attr(&self.graph, key, value)
    }

    pub fn keys(&mut self) -> HashSet<AttrKey> {
        self.engine.graph_attr_keys(&self.graph)
    }

    /// `graph.node[id]`.
    pub fn node(&mut self, id: &NodeId) -> NodeView<'_, G> {
        NodeView {
            engine: self.engine,
            graph: self.graph.clone(),
            node: id.clone(),
        }
    }

    /// Direct access to an edge without going through a [`NodeView`] first —
    /// equivalent to `graph.adj[origin][destination]` indexed by `index`.
    pub fn edge(&mut self, origin: &NodeId, destination: &NodeId, index: EdgeIndex) -> EdgeView<'_, G> {
        EdgeView {
            engine: self.engine,
            graph: self.graph.clone(),
            origin: origin.clone(),
            destination: destination.clone(),
            index,
        }
    }
}

/// A view bound to `(graph, node)`, borrowing the engine mutably.
pub struct NodeView<'a, G: Gateway> {
    engine: &'a mut Engine<G>,
    graph: String,
    node: NodeId,
}

impl<'a, G: Gateway> NodeView<'a, G> {
    pub fn id(&self) -> &NodeId {
        &self.node
    }

    pub fn exists(&mut self) -> Result<bool, EngineError> {
        self.engine.node_exists(&self.graph, &self.node)
    }

    pub fn set_exists(&mut self, exists: bool) -> Result<(), EngineError> {
        self.engine.set_node_exists(&self.graph, &self.node, exists)
    }

    /// `graph.node[id][attr]`.
    pub fn get_attr(&mut self, key: &str) -> Result<Value, EngineError> {
        self.engine.get_node_attr(&self.graph, &self.node, key)
    }

    pub fn set_attr(&mut self, key: &str, value: Option<Value>) -> Result<(), EngineError> {
        self.engine.set_node_attr(&self.graph, &self.node, key, value)
    }

    pub fn keys(&mut self) -> HashSet<AttrKey> {
        self.engine.node_attr_keys(&self.graph, &self.node)
    }

    /// `graph.adj[id]`: every `(destination, index)` this node currently
    /// reaches.
    pub fn successors(&mut self) -> HashSet<(NodeId, EdgeIndex)> {
        self.engine.successors(&self.graph, &self.node)
    }

    /// `graph.pred[id]`: every `(origin, index)` currently reaching this
    /// node. Symmetric to [`NodeView::successors`] for undirected graph
    /// kinds.
    pub fn predecessors(&mut self) -> HashSet<(NodeId, EdgeIndex)> {
        self.engine.predecessors(&self.graph, &self.node)
    }

    /// `graph.adj[id][destination]`, indexed by multi-edge key.
    pub fn adj(&mut self, destination: &NodeId, index: EdgeIndex) -> EdgeView<'_, G> {
        EdgeView {
            engine: self.engine,
            graph: self.graph.clone(),
            origin: self.node.clone(),
            destination: destination.clone(),
            index,
        }
    }

    /// `graph.pred[id][origin]`, indexed by multi-edge key.
    pub fn pred(&mut self, origin: &NodeId, index: EdgeIndex) -> EdgeView<'_, G> {
        EdgeView {
            engine: self.engine,
            graph: self.graph.clone(),
            origin: origin.clone(),
            destination: self.node.clone(),
            index,
        }
    }

    /// Coordinates at which deleting this node would contradict a live
    /// incident edge — surfaced so callers can decide whether to retract
    /// the edges first (spec §4.5's existence-cache contradiction path).
    pub fn edge_contradictions(&mut self) -> Vec<(crate::coord::Turn, crate::coord::Tick)> {
        self.engine.node_edge_contradictions(&self.graph, &self.node)
    }
}

/// A view bound to `(graph, origin, destination, index)`, borrowing the
/// engine mutably.
pub struct EdgeView<'a, G: Gateway> {
    engine: &'a mut Engine<G>,
    graph: String,
    origin: NodeId,
    destination: NodeId,
    index: EdgeIndex,
}

impl<'a, G: Gateway> EdgeView<'a, G> {
    pub fn origin(&self) -> &NodeId {
        &self.origin
    }

    pub fn destination(&self) -> &NodeId {
        &self.destination
    }

    pub fn index(&self) -> EdgeIndex {
        self.index
    }

    pub fn exists(&mut self) -> Result<bool, EngineError> {
        self.engine.edge_exists(&self.graph, &self.origin, &self.destination, self.index)
    }

    pub fn set_exists(&mut self, exists: bool) -> Result<(), EngineError> {
        self.engine
            .set_edge_exists(&self.graph, &self.origin, &self.destination, self.index, exists)
    }

    /// `graph.adj[orig][dest][attr]`.
    pub fn get_attr(&mut self, key: &str) -> Result<Value, EngineError> {
        self.engine.get_edge_attr(&self.graph, &self.origin, &self.destination, self.index, key)
    }

    pub fn set_attr(&mut self, key: &str, value: Option<Value>) -> Result<(), EngineError> {
        self.engine
            .set_edge_attr(&self.graph, &self.origin, &self.destination, self.index, key, value)
    }

    pub fn keys(&mut self) -> HashSet<AttrKey> {
        self.engine
            .edge_attr_keys(&self.graph, &self.origin, &self.destination, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::gateway::memory::MemoryGateway;

    fn engine() -> Engine<MemoryGateway> {
        Engine::new(MemoryGateway::new(), EngineConfig::default()).unwrap()
    }

    #[test]
    fn graph_attr_round_trips_through_facade() {
        let mut e = engine();
        e.graph("g").set_attr("color", Some(Value::Str("red".into()))).unwrap();
        assert_eq!(e.graph("g").get_attr("color").unwrap(), Value::Str("red".into()));
    }

    #[test]
    fn node_and_edge_views_chain_through_the_graph_view() {
        let mut e = engine();
        {
            let mut g = e.graph("g");
            let mut a = g.node(&"a".to_string());
            a.set_exists(true).unwrap();
            a.set_attr("hp", Some(Value::Int(10))).unwrap();
        }
        {
            let mut g = e.graph("g");
            let mut b = g.node(&"b".to_string());
            b.set_exists(true).unwrap();
        }
        e.set_tick(1).unwrap();
        {
            let mut g = e.graph("g");
            let mut a = g.node(&"a".to_string());
            let mut edge = a.adj(&"b".to_string(), 0);
            edge.set_exists(true).unwrap();
            edge.set_attr("weight", Some(Value::Float(2.5))).unwrap();
        }

        let mut g = e.graph("g");
        let mut a = g.node(&"a".to_string());
        assert_eq!(a.get_attr("hp").unwrap(), Value::Int(10));
        assert!(a.adj(&"b".to_string(), 0).exists().unwrap());
        assert_eq!(a.adj(&"b".to_string(), 0).get_attr("weight").unwrap(), Value::Float(2.5));
        assert!(a.successors().contains(&("b".to_string(), 0)));
    }
}
