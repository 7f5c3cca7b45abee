//! The structured delta spec §4.6 says `Setting Journal::delta` must
//! produce: a nested structure per graph, with sub-structures for graph
//! attributes, node presence, node attributes, edge presence, and edge
//! attributes. `None` denotes deletion.

use std::collections::HashMap;

use crate::entity::{AttrKey, Entity, EdgeIndex, NodeId, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphDelta {
    pub graph_attrs: HashMap<AttrKey, Option<Value>>,
    pub node_presence: HashMap<NodeId, Option<bool>>,
    pub node_attrs: HashMap<NodeId, HashMap<AttrKey, Option<Value>>>,
    pub edge_presence: HashMap<(NodeId, NodeId, EdgeIndex), Option<bool>>,
    pub edge_attrs: HashMap<(NodeId, NodeId, EdgeIndex), HashMap<AttrKey, Option<Value>>>,
}

/// A delta across every graph touched between two coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delta {
    pub graphs: HashMap<String, GraphDelta>,
}

impl Delta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one raw `(entity, key, value)` journal row into the structured
    /// delta. `existence` entities use the conventional key `""` and a
    /// boolean-or-null value (spec §4.5); everything else is a regular
    /// attribute.
    pub fn record(&mut self, entity: Entity, key: AttrKey, value: Option<Value>) {
        match entity {
            Entity::Graph(g) => {
                let gd = self.graphs.entry(g).or_default();
                gd.graph_attrs.insert(key, value);
            }
            Entity::Node(g, id) => {
                let gd = self.graphs.entry(g).or_default();
                if key.is_empty() {
                    let present = matches!(value, Some(Value::Bool(true)));
                    gd.node_presence.insert(id, Some(present));
                } else {
                    gd.node_attrs.entry(id).or_default().insert(key, value);
                }
            }
            Entity::Edge(g, orig, dest, idx) => {
                let gd = self.graphs.entry(g).or_default();
                if key.is_empty() {
                    let present = matches!(value, Some(Value::Bool(true)));
                    gd.edge_presence.insert((orig, dest, idx), Some(present));
                } else {
                    gd.edge_attrs
                        .entry((orig, dest, idx))
                        .or_default()
                        .insert(key, value);
                }
            }
        }
    }

    pub fn from_rows(rows: impl IntoIterator<Item = (Entity, AttrKey, Option<Value>)>) -> Self {
        let mut delta = Delta::new();
        for (entity, key, value) in rows {
            delta.record(entity, key, value);
        }
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_rows_by_graph_and_shape() {
        let rows = vec![
            (Entity::Graph("g".into()), "color".into(), Some(Value::Str("red".into()))),
            (Entity::Node("g".into(), "n1".into()), "".into(), Some(Value::Bool(true))),
            (Entity::Node("g".into(), "n1".into()), "hp".into(), Some(Value::Int(10))),
            (
                Entity::Edge("g".into(), "n1".into(), "n2".into(), 0),
                "".into(),
                None,
            ),
        ];
        let delta = Delta::from_rows(rows);
        let gd = &delta.graphs["g"];
        assert_eq!(gd.graph_attrs["color"], Some(Value::Str("red".into())));
        assert_eq!(gd.node_presence["n1"], Some(true));
        assert_eq!(gd.node_attrs["n1"]["hp"], Some(Value::Int(10)));
        assert_eq!(gd.edge_presence[&("n1".to_string(), "n2".to_string(), 0)], Some(false));
    }
}
