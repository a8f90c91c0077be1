use std::collections::HashMap;
use std::fmt;

use xxhash_rust::xxh3::Xxh3;

use crate::graph::dag::Dag;
use crate::graph::node::{Node, NodeId, NodeOp};
use crate::graph::store::NodeGraph;

const XXH3_SEED: u64 = 0x5d1c_3a77_e0b4_29c3;

/// Identity of the scheduled graph. Equal hashes mean equal topology and parameters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GraphHash(pub u64);

impl fmt::Display for GraphHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

pub(crate) struct StableHasher {
    inner: Xxh3,
}

impl StableHasher {
    pub(crate) fn new() -> Self {
        Self {
            inner: Xxh3::with_seed(XXH3_SEED),
        }
    }

    pub(crate) fn write_bytes(&mut self, b: &[u8]) {
        self.inner.update(b);
    }

    pub(crate) fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    pub(crate) fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub(crate) fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub(crate) fn write_i64(&mut self, v: i64) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub(crate) fn write_f32(&mut self, v: f32) {
        self.write_u32(v.to_bits());
    }

    pub(crate) fn write_str(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.write_bytes(s.as_bytes());
    }

    pub(crate) fn finish(self) -> u64 {
        self.inner.digest()
    }
}

pub(crate) fn node_content_hash(node: &Node) -> u64 {
    let mut h = StableHasher::new();
    h.write_str(node.name());
    h.write_u8(node.produced_channels().bits());
    h.write_u8(node.requested_channels().bits());
    match node.op() {
        NodeOp::Reader(r) => {
            h.write_u8(0);
            h.write_str(r.0.name());
            let range = r.0.frame_range();
            h.write_i64(range.first.0);
            h.write_i64(range.last.0);
        }
        NodeOp::Constant { rgba } => {
            h.write_u8(1);
            rgba.iter().for_each(|v| h.write_f32(*v));
        }
        NodeOp::Gain { rgba } => {
            h.write_u8(2);
            rgba.iter().for_each(|v| h.write_f32(*v));
        }
        NodeOp::Over => h.write_u8(3),
        NodeOp::Viewer => h.write_u8(4),
        NodeOp::Writer(w) => {
            h.write_u8(5);
            h.write_str(w.name());
            if let Some(r) = w.range() {
                h.write_i64(r.first.0);
                h.write_i64(r.last.0);
            }
            let e = w.encoding();
            h.write_f32(e.exposure);
            h.write_u8(e.lut.id());
            h.write_u8(e.byte_mode.id());
            h.write_u8(e.channels.bits());
        }
    }
    h.finish()
}

/// Combine the content hashes of every scheduled node with the hashes of its inputs.
///
/// Any parameter or connection change upstream of the output yields a different value.
pub fn compute_graph_hash(graph: &NodeGraph, dag: &Dag) -> GraphHash {
    let mut combined: HashMap<NodeId, u64> = HashMap::with_capacity(dag.len());
    for id in dag.iter() {
        let Some(node) = graph.node(*id) else {
            continue;
        };
        let mut h = StableHasher::new();
        h.write_u64(node.content_hash());
        for slot in node.inputs() {
            match slot.and_then(|p| combined.get(&p)) {
                Some(parent) => {
                    h.write_u8(1);
                    h.write_u64(*parent);
                }
                None => h.write_u8(0),
            }
        }
        combined.insert(*id, h.finish());
    }

    let mut h = StableHasher::new();
    h.write_u32(dag.len() as u32);
    if let Some(out) = dag.output().and_then(|o| combined.get(&o)) {
        h.write_u64(*out);
    }
    GraphHash(h.finish())
}

#[cfg(test)]
#[path = "../../tests/unit/graph/hash.rs"]
mod tests;
