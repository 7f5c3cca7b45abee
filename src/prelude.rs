//! Convenience re-exports for callers that just want to drive an [`Engine`].
//!
//! `use chronograph::prelude::*;` pulls in the cursor types, the entity
//! model, the facade, and the error type without naming every module.

pub use crate::coord::{Rev, Tick, Turn};
pub use crate::engine::{Engine, EngineMode};
pub use crate::entity::{AttrKey, EdgeIndex, Entity, GraphKind, NodeId, ParentTuple, Value};
pub use crate::error::EngineError;
pub use crate::facade::{EdgeView, GraphFacade, NodeView};
pub use crate::gateway::Gateway;
pub use crate::EngineConfig;
