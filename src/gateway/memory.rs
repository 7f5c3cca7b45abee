//! In-memory reference [`Gateway`](super::Gateway), for tests and ephemeral
//! engines where durability is not required — mirrors the teacher's
//! `repo::memoryrepo::MemoryRepo`.

use std::collections::HashMap;
use std::convert::Infallible;

use crate::coord::{Tick, Turn};
use crate::entity::GraphKind;
use crate::gateway::{
    BranchRow, EdgeExistRow, EdgeValRow, Gateway, GraphValRow, NodeExistRow, NodeValRow, TurnRow,
};

/// Holds every dumped row in a flat `Vec`, appended to in call order.
/// Trivial to construct, trivial to inspect in tests; no indexing beyond
/// what `Vec::retain`/iteration gives for free.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    globals: HashMap<String, String>,
    branches: Vec<BranchRow>,
    turns: Vec<TurnRow>,
    graph_kinds: Vec<(String, GraphKind)>,
    node_exist: Vec<NodeExistRow>,
    edge_exist: Vec<EdgeExistRow>,
    graph_val: Vec<GraphValRow>,
    node_val: Vec<NodeValRow>,
    edge_val: Vec<EdgeValRow>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Gateway for MemoryGateway {
    type Error = Infallible;

    fn global_get(&mut self, key: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.globals.get(key).cloned())
    }

    fn global_set(&mut self, key: &str, value: String) -> Result<(), Self::Error> {
        self.globals.insert(key.to_string(), value);
        Ok(())
    }

    fn global_del(&mut self, key: &str) -> Result<(), Self::Error> {
        self.globals.remove(key);
        Ok(())
    }

    fn all_branches(&mut self) -> Result<Vec<BranchRow>, Self::Error> {
        Ok(self.branches.clone())
    }

    fn turns_dump(&mut self) -> Result<Vec<TurnRow>, Self::Error> {
        Ok(self.turns.clone())
    }

    fn new_branch(&mut self, branch: &str, parent: &str, turn: Turn, tick: Tick) -> Result<(), Self::Error> {
        self.branches.push(BranchRow {
            branch: branch.to_string(),
            parent: Some(parent.to_string()),
            parent_turn: turn,
            parent_tick: tick,
            end_turn: turn,
            end_tick: tick,
        });
        Ok(())
    }

    fn record_turn(&mut self, branch: &str, turn: Turn, end_tick: Tick, plan_end_tick: Tick) -> Result<(), Self::Error> {
        if let Some(row) = self
            .turns
            .iter_mut()
            .find(|r| r.branch == branch && r.turn == turn)
        {
            row.end_tick = end_tick;
            row.plan_end_tick = plan_end_tick;
        } else {
            self.turns.push(TurnRow {
                branch: branch.to_string(),
                turn,
                end_tick,
                plan_end_tick,
            });
        }
        Ok(())
    }

    fn graphs_types(&mut self) -> Result<Vec<(String, GraphKind)>, Self::Error> {
        Ok(self.graph_kinds.clone())
    }

    fn record_graph_kind(&mut self, graph: &str, kind: GraphKind) -> Result<(), Self::Error> {
        if !self.graph_kinds.iter().any(|(g, _)| g == graph) {
            self.graph_kinds.push((graph.to_string(), kind));
        }
        Ok(())
    }

    fn nodes_dump(&mut self) -> Result<Vec<NodeExistRow>, Self::Error> {
        Ok(self.node_exist.clone())
    }

    fn edges_dump(&mut self) -> Result<Vec<EdgeExistRow>, Self::Error> {
        Ok(self.edge_exist.clone())
    }

    fn graph_val_dump(&mut self) -> Result<Vec<GraphValRow>, Self::Error> {
        Ok(self.graph_val.clone())
    }

    fn node_val_dump(&mut self) -> Result<Vec<NodeValRow>, Self::Error> {
        Ok(self.node_val.clone())
    }

    fn edge_val_dump(&mut self) -> Result<Vec<EdgeValRow>, Self::Error> {
        Ok(self.edge_val.clone())
    }

    fn exist_node(&mut self, row: NodeExistRow) -> Result<(), Self::Error> {
        self.node_exist.push(row);
        Ok(())
    }

    fn exist_edge(&mut self, row: EdgeExistRow) -> Result<(), Self::Error> {
        self.edge_exist.push(row);
        Ok(())
    }

    fn graph_val_set(&mut self, row: GraphValRow) -> Result<(), Self::Error> {
        self.graph_val.push(row);
        Ok(())
    }

    fn node_val_set(&mut self, row: NodeValRow) -> Result<(), Self::Error> {
        self.node_val.push(row);
        Ok(())
    }

    fn edge_val_set(&mut self, row: EdgeValRow) -> Result<(), Self::Error> {
        self.edge_val.push(row);
        Ok(())
    }
}
