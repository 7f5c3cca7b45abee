//! Disk-backed [`Gateway`]: an append-only file of length-prefixed records,
//! read back via [`memmap2`] on open. Scaled down from the teacher's
//! `repo::pile` (a content-addressed blob store keyed by hash) to a plain
//! row log: every mutating call appends one record and updates an
//! in-memory [`MemoryGateway`] mirror, so dumps never have to re-scan the
//! file. No hashing, no blob dedup — this gateway stores rows, not blobs.
//!
//! # File format
//!
//! Each record is `[magic: u32][kind: u8][len: u32][payload: len bytes]`,
//! written in little-endian. `magic` catches a file that isn't a pile at
//! all; `len` lets a reader skip a record kind it doesn't otherwise need to
//! interpret structurally.

use std::error::Error;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::coord::{Tick, Turn};
use crate::entity::{GraphKind, Value};
use crate::gateway::memory::MemoryGateway;
use crate::gateway::{
    BranchRow, EdgeExistRow, EdgeValRow, Gateway, GraphValRow, NodeExistRow, NodeValRow, TurnRow,
};

const MAGIC: u32 = 0x4348_5230; // "CHR0"

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum RecordKind {
    GlobalSet = 0,
    GlobalDel = 1,
    NewBranch = 2,
    GraphKindRow = 3,
    ExistNode = 4,
    ExistEdge = 5,
    GraphValSet = 6,
    NodeValSet = 7,
    EdgeValSet = 8,
    TurnRecord = 9,
}

impl RecordKind {
    fn from_u8(tag: u8) -> Result<Self, PileError> {
        Ok(match tag {
            0 => RecordKind::GlobalSet,
            1 => RecordKind::GlobalDel,
            2 => RecordKind::NewBranch,
            3 => RecordKind::GraphKindRow,
            4 => RecordKind::ExistNode,
            5 => RecordKind::ExistEdge,
            6 => RecordKind::GraphValSet,
            7 => RecordKind::NodeValSet,
            8 => RecordKind::EdgeValSet,
            9 => RecordKind::TurnRecord,
            other => return Err(PileError::Corrupt(format!("unknown record kind {other}"))),
        })
    }
}

/// Failures from the disk-backed gateway: I/O, or a record that doesn't
/// parse as this pile's format.
#[derive(Debug)]
pub enum PileError {
    Io(io::Error),
    Corrupt(String),
}

impl fmt::Display for PileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PileError::Io(e) => write!(f, "pile I/O error: {e}"),
            PileError::Corrupt(msg) => write!(f, "corrupt pile record: {msg}"),
        }
    }
}

impl Error for PileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PileError::Io(e) => Some(e),
            PileError::Corrupt(_) => None,
        }
    }
}

impl From<io::Error> for PileError {
    fn from(e: io::Error) -> Self {
        PileError::Io(e)
    }
}

fn push_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}
fn push_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn push_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn push_str(buf: &mut Vec<u8>, s: &str) {
    push_u32(buf, s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
}
fn push_value(buf: &mut Vec<u8>, value: &Option<Value>) {
    match value {
        None => push_u8(buf, 0),
        Some(Value::Bool(b)) => {
            push_u8(buf, 1);
            push_u8(buf, *b as u8);
        }
        Some(Value::Int(i)) => {
            push_u8(buf, 2);
            buf.extend_from_slice(&i.to_le_bytes());
        }
        Some(Value::Float(f)) => {
            push_u8(buf, 3);
            buf.extend_from_slice(&f.to_bits().to_le_bytes());
        }
        Some(Value::Str(s)) => {
            push_u8(buf, 4);
            push_str(buf, s);
        }
        Some(Value::Bytes(b)) => {
            push_u8(buf, 5);
            push_u32(buf, b.len() as u32);
            buf.extend_from_slice(b);
        }
    }
}

/// A read cursor over a parsed record's payload bytes.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Cursor { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], PileError> {
        if self.pos + n > self.bytes.len() {
            return Err(PileError::Corrupt("record truncated".to_string()));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, PileError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, PileError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64, PileError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn string(&mut self) -> Result<String, PileError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| PileError::Corrupt(e.to_string()))
    }

    fn bool(&mut self) -> Result<bool, PileError> {
        Ok(self.u8()? != 0)
    }

    fn value(&mut self) -> Result<Option<Value>, PileError> {
        Ok(match self.u8()? {
            0 => None,
            1 => Some(Value::Bool(self.bool()?)),
            2 => Some(Value::Int(self.u64()? as i64)),
            3 => Some(Value::Float(f64::from_bits(self.u64()?))),
            4 => Some(Value::Str(self.string()?)),
            5 => {
                let len = self.u32()? as usize;
                Some(Value::Bytes(self.take(len)?.to_vec()))
            }
            other => return Err(PileError::Corrupt(format!("unknown value tag {other}"))),
        })
    }
}

fn graph_kind_tag(kind: GraphKind) -> u8 {
    match kind {
        GraphKind::Graph => 0,
        GraphKind::DiGraph => 1,
        GraphKind::MultiGraph => 2,
        GraphKind::MultiDiGraph => 3,
    }
}

fn graph_kind_from_tag(tag: u8) -> Result<GraphKind, PileError> {
    Ok(match tag {
        0 => GraphKind::Graph,
        1 => GraphKind::DiGraph,
        2 => GraphKind::MultiGraph,
        3 => GraphKind::MultiDiGraph,
        other => return Err(PileError::Corrupt(format!("unknown graph kind tag {other}"))),
    })
}

/// Append-only, memory-mapped-on-open [`Gateway`] implementation.
pub struct PileGateway {
    path: PathBuf,
    file: File,
    mirror: MemoryGateway,
}

impl PileGateway {
    /// Open (creating if absent) the pile at `path` and replay its records
    /// into an in-memory mirror.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PileError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).read(true).append(true).open(&path)?;
        let mut gw = PileGateway {
            path,
            file,
            mirror: MemoryGateway::new(),
        };
        gw.rehydrate()?;
        Ok(gw)
    }

    fn rehydrate(&mut self) -> Result<(), PileError> {
        let reader = File::open(&self.path)?;
        if reader.metadata()?.len() == 0 {
            return Ok(());
        }
        // Safety: the file is exclusively owned by this process for the
        // lifetime of the mapping below; it is not truncated or written to
        // concurrently while this scan runs.
        let mmap = unsafe { Mmap::map(&reader)? };
        let bytes: &[u8] = &mmap;
        let mut pos = 0usize;
        while pos < bytes.len() {
            if pos + 9 > bytes.len() {
                return Err(PileError::Corrupt("truncated record header".to_string()));
            }
            let magic = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
            if magic != MAGIC {
                return Err(PileError::Corrupt(format!("bad magic at offset {pos}")));
            }
            let kind = RecordKind::from_u8(bytes[pos + 4])?;
            let len = u32::from_le_bytes(bytes[pos + 5..pos + 9].try_into().unwrap()) as usize;
            let payload_start = pos + 9;
            let payload_end = payload_start + len;
            if payload_end > bytes.len() {
                return Err(PileError::Corrupt("truncated record payload".to_string()));
            }
            self.replay(kind, &bytes[payload_start..payload_end])?;
            pos = payload_end;
        }
        Ok(())
    }

    fn replay(&mut self, kind: RecordKind, payload: &[u8]) -> Result<(), PileError> {
        let mut c = Cursor::new(payload);
        match kind {
            RecordKind::GlobalSet => {
                let key = c.string()?;
                let value = c.string()?;
                let _ = self.mirror.global_set(&key, value);
            }
            RecordKind::GlobalDel => {
                let key = c.string()?;
                let _ = self.mirror.global_del(&key);
            }
            RecordKind::NewBranch => {
                let branch = c.string()?;
                let parent = c.string()?;
                let turn = c.u64()?;
                let tick = c.u64()?;
                let _ = self.mirror.new_branch(&branch, &parent, turn, tick);
            }
            RecordKind::GraphKindRow => {
                let graph = c.string()?;
                let kind = graph_kind_from_tag(c.u8()?)?;
                self.mirror.record_graph_kind(&graph, kind).unwrap();
            }
            RecordKind::ExistNode => {
                let row = NodeExistRow {
                    branch: c.string()?,
                    turn: c.u64()?,
                    tick: c.u64()?,
                    graph: c.string()?,
                    node: c.string()?,
                    exists: c.bool()?,
                };
                let _ = self.mirror.exist_node(row);
            }
            RecordKind::ExistEdge => {
                let row = EdgeExistRow {
                    branch: c.string()?,
                    turn: c.u64()?,
                    tick: c.u64()?,
                    graph: c.string()?,
                    origin: c.string()?,
                    destination: c.string()?,
                    index: c.u32()?,
                    exists: c.bool()?,
                };
                let _ = self.mirror.exist_edge(row);
            }
            RecordKind::GraphValSet => {
                let row = GraphValRow {
                    branch: c.string()?,
                    turn: c.u64()?,
                    tick: c.u64()?,
                    graph: c.string()?,
                    key: c.string()?,
                    value: c.value()?,
                };
                let _ = self.mirror.graph_val_set(row);
            }
            RecordKind::NodeValSet => {
                let row = NodeValRow {
                    branch: c.string()?,
                    turn: c.u64()?,
                    tick: c.u64()?,
                    graph: c.string()?,
                    node: c.string()?,
                    key: c.string()?,
                    value: c.value()?,
                };
                let _ = self.mirror.node_val_set(row);
            }
            RecordKind::EdgeValSet => {
                let row = EdgeValRow {
                    branch: c.string()?,
                    turn: c.u64()?,
                    tick: c.u64()?,
                    graph: c.string()?,
                    origin: c.string()?,
                    destination: c.string()?,
                    index: c.u32()?,
                    key: c.string()?,
                    value: c.value()?,
                };
                let _ = self.mirror.edge_val_set(row);
            }
            RecordKind::TurnRecord => {
                let branch = c.string()?;
                let turn = c.u64()?;
                let end_tick = c.u64()?;
                let plan_end_tick = c.u64()?;
                self.mirror.record_turn(&branch, turn, end_tick, plan_end_tick).unwrap();
            }
        }
        Ok(())
    }

    fn append(&mut self, kind: RecordKind, payload: Vec<u8>) -> Result<(), PileError> {
        let mut record = Vec::with_capacity(9 + payload.len());
        push_u32(&mut record, MAGIC);
        push_u8(&mut record, kind as u8);
        push_u32(&mut record, payload.len() as u32);
        record.extend_from_slice(&payload);
        self.file.write_all(&record)?;
        self.file.flush()?;
        Ok(())
    }
}

impl Gateway for PileGateway {
    type Error = PileError;

    fn global_get(&mut self, key: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.mirror.global_get(key).unwrap())
    }

    fn global_set(&mut self, key: &str, value: String) -> Result<(), Self::Error> {
        let mut payload = Vec::new();
        push_str(&mut payload, key);
        push_str(&mut payload, &value);
        self.append(RecordKind::GlobalSet, payload)?;
        self.mirror.global_set(key, value).unwrap();
        Ok(())
    }

    /// Register (or update) a graph's kind — spec §6 lists `graphs_types()`
    /// as dump-only; the engine calls this when a graph is first created so
    /// the dump has something to yield.
    fn record_graph_kind(&mut self, graph: &str, kind: GraphKind) -> Result<(), Self::Error> {
        let mut payload = Vec::new();
        push_str(&mut payload, graph);
        push_u8(&mut payload, graph_kind_tag(kind));
        self.append(RecordKind::GraphKindRow, payload)?;
        self.mirror.record_graph_kind(graph, kind).unwrap();
        Ok(())
    }

    /// Persist the observed/planned extent of `(branch, turn)` — same
    /// asymmetry as [`MemoryGateway::record_turn`], but durable.
    fn record_turn(&mut self, branch: &str, turn: Turn, end_tick: Tick, plan_end_tick: Tick) -> Result<(), Self::Error> {
        let mut payload = Vec::new();
        push_str(&mut payload, branch);
        push_u64(&mut payload, turn);
        push_u64(&mut payload, end_tick);
        push_u64(&mut payload, plan_end_tick);
        self.append(RecordKind::TurnRecord, payload)?;
        self.mirror.record_turn(branch, turn, end_tick, plan_end_tick).unwrap();
        Ok(())
    }

    fn global_del(&mut self, key: &str) -> Result<(), Self::Error> {
        let mut payload = Vec::new();
        push_str(&mut payload, key);
        self.append(RecordKind::GlobalDel, payload)?;
        self.mirror.global_del(key).unwrap();
        Ok(())
    }

    fn all_branches(&mut self) -> Result<Vec<BranchRow>, Self::Error> {
        Ok(self.mirror.all_branches().unwrap())
    }

    fn turns_dump(&mut self) -> Result<Vec<TurnRow>, Self::Error> {
        Ok(self.mirror.turns_dump().unwrap())
    }

    fn new_branch(&mut self, branch: &str, parent: &str, turn: Turn, tick: Tick) -> Result<(), Self::Error> {
        let mut payload = Vec::new();
        push_str(&mut payload, branch);
        push_str(&mut payload, parent);
        push_u64(&mut payload, turn);
        push_u64(&mut payload, tick);
        self.append(RecordKind::NewBranch, payload)?;
        self.mirror.new_branch(branch, parent, turn, tick).unwrap();
        Ok(())
    }

    fn graphs_types(&mut self) -> Result<Vec<(String, GraphKind)>, Self::Error> {
        Ok(self.mirror.graphs_types().unwrap())
    }

    fn nodes_dump(&mut self) -> Result<Vec<NodeExistRow>, Self::Error> {
        Ok(self.mirror.nodes_dump().unwrap())
    }

    fn edges_dump(&mut self) -> Result<Vec<EdgeExistRow>, Self::Error> {
        Ok(self.mirror.edges_dump().unwrap())
    }

    fn graph_val_dump(&mut self) -> Result<Vec<GraphValRow>, Self::Error> {
        Ok(self.mirror.graph_val_dump().unwrap())
    }

    fn node_val_dump(&mut self) -> Result<Vec<NodeValRow>, Self::Error> {
        Ok(self.mirror.node_val_dump().unwrap())
    }

    fn edge_val_dump(&mut self) -> Result<Vec<EdgeValRow>, Self::Error> {
        Ok(self.mirror.edge_val_dump().unwrap())
    }

    fn exist_node(&mut self, row: NodeExistRow) -> Result<(), Self::Error> {
        let mut payload = Vec::new();
        push_str(&mut payload, &row.branch);
        push_u64(&mut payload, row.turn);
        push_u64(&mut payload, row.tick);
        push_str(&mut payload, &row.graph);
        push_str(&mut payload, &row.node);
        push_u8(&mut payload, row.exists as u8);
        self.append(RecordKind::ExistNode, payload)?;
        self.mirror.exist_node(row).unwrap();
        Ok(())
    }

    fn exist_edge(&mut self, row: EdgeExistRow) -> Result<(), Self::Error> {
        let mut payload = Vec::new();
        push_str(&mut payload, &row.branch);
        push_u64(&mut payload, row.turn);
        push_u64(&mut payload, row.tick);
        push_str(&mut payload, &row.graph);
        push_str(&mut payload, &row.origin);
        push_str(&mut payload, &row.destination);
        push_u32(&mut payload, row.index);
        push_u8(&mut payload, row.exists as u8);
        self.append(RecordKind::ExistEdge, payload)?;
        self.mirror.exist_edge(row).unwrap();
        Ok(())
    }

    fn graph_val_set(&mut self, row: GraphValRow) -> Result<(), Self::Error> {
        let mut payload = Vec::new();
        push_str(&mut payload, &row.branch);
        push_u64(&mut payload, row.turn);
        push_u64(&mut payload, row.tick);
        push_str(&mut payload, &row.graph);
        push_str(&mut payload, &row.key);
        push_value(&mut payload, &row.value);
        self.append(RecordKind::GraphValSet, payload)?;
        self.mirror.graph_val_set(row).unwrap();
        Ok(())
    }

    fn node_val_set(&mut self, row: NodeValRow) -> Result<(), Self::Error> {
        let mut payload = Vec::new();
        push_str(&mut payload, &row.branch);
        push_u64(&mut payload, row.turn);
        push_u64(&mut payload, row.tick);
        push_str(&mut payload, &row.graph);
        push_str(&mut payload, &row.node);
        push_str(&mut payload, &row.key);
        push_value(&mut payload, &row.value);
        self.append(RecordKind::NodeValSet, payload)?;
        self.mirror.node_val_set(row).unwrap();
        Ok(())
    }

    fn edge_val_set(&mut self, row: EdgeValRow) -> Result<(), Self::Error> {
        let mut payload = Vec::new();
        push_str(&mut payload, &row.branch);
        push_u64(&mut payload, row.turn);
        push_u64(&mut payload, row.tick);
        push_str(&mut payload, &row.graph);
        push_str(&mut payload, &row.origin);
        push_str(&mut payload, &row.destination);
        push_u32(&mut payload, row.index);
        push_str(&mut payload, &row.key);
        push_value(&mut payload, &row.value);
        self.append(RecordKind::EdgeValSet, payload)?;
        self.mirror.edge_val_set(row).unwrap();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Value;

    #[test]
    fn persists_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.pile");

        {
            let mut gw = PileGateway::open(&path).unwrap();
            gw.global_set("branch", "trunk".to_string()).unwrap();
            gw.graph_val_set(GraphValRow {
                branch: "trunk".into(),
                turn: 0,
                tick: 0,
                graph: "g".into(),
                key: "color".into(),
                value: Some(Value::Str("red".into())),
            })
            .unwrap();
        }

        let mut gw = PileGateway::open(&path).unwrap();
        assert_eq!(gw.global_get("branch").unwrap(), Some("trunk".to_string()));
        let rows = gw.graph_val_dump().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, Some(Value::Str("red".to_string())));
    }

    #[test]
    fn rejects_corrupt_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.pile");
        std::fs::write(&path, [0u8; 16]).unwrap();
        assert!(PileGateway::open(&path).is_err());
    }
}
