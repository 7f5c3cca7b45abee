//! Error kinds surfaced by the engine (spec §7).
//!
//! `Contradiction` is deliberately absent: it is resolved locally by
//! [`crate::attribute_cache`] and [`crate::existence`] (plan deletion plus
//! branch-extent truncation) and never reaches a caller.

use std::error::Error;
use std::fmt;

/// Every fault this crate can surface to an immediate caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Read before history exists, or read of an explicitly-deleted value.
    HistoryFault { deleted: bool },
    /// Write in the past outside a plan; forward-mode violation; plan
    /// nested inside plan.
    TimeFault(TimeFaultKind),
    /// Fork to a branch name that already exists.
    BranchExists(String),
    /// Fork at a coordinate preceding the parent's start, or from an
    /// unknown parent.
    InvalidFork(String),
    /// Reference to a branch the registry has never seen.
    UnknownBranch(String),
    /// Duplicate or illegal graph name.
    GraphNameError(String),
    /// Creating an entity whose identity is already bound to a different
    /// kind (e.g. a node id reused as an edge origin/destination pair under
    /// a name already bound to a graph attribute).
    EntityCollision(String),
}

/// Sub-kinds of [`EngineError::TimeFault`], named instead of stringified so
/// callers can match on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFaultKind {
    /// A non-planning write targeted a coordinate that is not strictly
    /// after the latest recorded revision (the "futurist" constraint).
    WriteNotInFuture,
    /// `set_turn`/`set_branch`/`next_tick` violated the forward-mode
    /// monotonicity assertion.
    ForwardViolation,
    /// `with_plan` was invoked while already planning.
    NestedPlan,
    /// A write was attempted while the cursor sits at a point in the past
    /// and no plan is active.
    PastWrite,
    /// `set_branch` (including the implicit fork it may perform) was called
    /// while planning; branch creation is forbidden in a plan (spec §4.7).
    PlanningRestricted,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::HistoryFault { deleted: true } => {
                write!(f, "value was explicitly deleted at or before this revision")
            }
            EngineError::HistoryFault { deleted: false } => {
                write!(f, "no history recorded at or before this revision")
            }
            EngineError::TimeFault(kind) => write!(f, "time travel violation: {kind}"),
            EngineError::BranchExists(name) => write!(f, "branch `{name}` already exists"),
            EngineError::InvalidFork(msg) => write!(f, "invalid fork: {msg}"),
            EngineError::UnknownBranch(name) => write!(f, "unknown branch `{name}`"),
            EngineError::GraphNameError(msg) => write!(f, "invalid graph name: {msg}"),
            EngineError::EntityCollision(msg) => write!(f, "entity collision: {msg}"),
        }
    }
}

impl fmt::Display for TimeFaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            TimeFaultKind::WriteNotInFuture => "write is not strictly after the latest revision",
            TimeFaultKind::ForwardViolation => "forward mode forbids this move",
            TimeFaultKind::NestedPlan => "a plan is already active",
            TimeFaultKind::PastWrite => "write in the past outside of a plan",
            TimeFaultKind::PlanningRestricted => "branch creation is forbidden while planning",
        };
        write!(f, "{msg}")
    }
}

impl Error for EngineError {}

/// Sentinel used on the hot retrieval path (spec §9: "prefer result types
/// with a sentinel `NotFound` variant ... reserve real errors for [§7]").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotFound;

pub type Lookup<T> = Result<T, NotFound>;
