use std::collections::HashSet;
use std::sync::Arc;

use crate::decode::reader::FrameReader;
use crate::foundation::core::FrameRange;
use crate::graph::node::{NodeId, NodeKind};
use crate::graph::store::NodeGraph;

/// Ordered view of the nodes reachable from one output.
///
/// `sorted()` lists every ancestor of the output exactly once, parents before children, so a
/// forward walk evaluates inputs first and the output last.
#[derive(Clone, Debug, Default)]
pub struct Dag {
    output: Option<NodeId>,
    sorted: Vec<NodeId>,
    inputs: Vec<NodeId>,
}

impl Dag {
    /// Empty schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the previous schedule.
    pub fn reset(&mut self) {
        self.output = None;
        self.sorted.clear();
        self.inputs.clear();
    }

    /// Rebuild the schedule for `output`. An unknown output leaves the schedule empty.
    #[tracing::instrument(level = "debug", skip(self, graph))]
    pub fn reset_and_sort(&mut self, graph: &NodeGraph, output: NodeId) {
        self.reset();
        if graph.node(output).is_none() {
            tracing::debug!("output node missing, schedule left empty");
            return;
        }
        self.output = Some(output);

        let reachable = collect_reachable(graph, output);
        for id in &reachable {
            if graph.node(*id).is_some_and(|n| n.kind() == NodeKind::Input) {
                self.inputs.push(*id);
            }
        }

        let mut marked = HashSet::with_capacity(reachable.len());
        for id in reachable {
            visit_post_order(graph, id, &mut marked, &mut self.sorted);
        }
        tracing::debug!(nodes = self.sorted.len(), inputs = self.inputs.len(), "graph sorted");
    }

    /// Output node of the schedule.
    pub fn output(&self) -> Option<NodeId> {
        self.output
    }

    /// Nodes in evaluation order.
    pub fn sorted(&self) -> &[NodeId] {
        &self.sorted
    }

    /// Forward iteration, inputs first.
    pub fn iter(&self) -> std::slice::Iter<'_, NodeId> {
        self.sorted.iter()
    }

    /// Reverse iteration, output first.
    pub fn iter_rev(&self) -> std::iter::Rev<std::slice::Iter<'_, NodeId>> {
        self.sorted.iter().rev()
    }

    /// Input nodes, each listed once.
    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    /// Number of scheduled nodes.
    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    /// `true` when nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// Reader inputs with their readers.
    pub fn readers<'g>(
        &'g self,
        graph: &'g NodeGraph,
    ) -> impl Iterator<Item = (NodeId, &'g Arc<dyn FrameReader>)> + 'g {
        self.inputs.iter().filter_map(move |id| {
            graph
                .node(*id)
                .and_then(|n| n.op().frame_reader())
                .map(|r| (*id, r))
        })
    }

    /// Union of the readers' frame ranges, `None` without readers.
    pub fn frame_range(&self, graph: &NodeGraph) -> Option<FrameRange> {
        self.readers(graph)
            .map(|(_, r)| r.frame_range())
            .reduce(FrameRange::union)
    }
}

/// Every node reachable upward from `output`, output first, each once.
fn collect_reachable(graph: &NodeGraph, output: NodeId) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut stack = vec![output];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        let Some(node) = graph.node(id) else {
            continue;
        };
        out.push(id);
        // Reverse so slot 0 is explored first.
        for parent in node.inputs().iter().rev().flatten() {
            if !seen.contains(parent) {
                stack.push(*parent);
            }
        }
    }
    out
}

/// Depth-first post-order from `start`, appending unvisited nodes after all their parents.
fn visit_post_order(
    graph: &NodeGraph,
    start: NodeId,
    marked: &mut HashSet<NodeId>,
    out: &mut Vec<NodeId>,
) {
    if !marked.insert(start) {
        return;
    }
    let mut stack: Vec<(NodeId, usize)> = vec![(start, 0)];
    while let Some(&(id, cursor)) = stack.last() {
        let slots = graph.node(id).map(|n| n.inputs()).unwrap_or(&[]);
        if cursor < slots.len() {
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }
            if let Some(parent) = slots[cursor]
                && graph.node(parent).is_some()
                && marked.insert(parent)
            {
                stack.push((parent, 0));
            }
        } else {
            stack.pop();
            out.push(id);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/graph/dag.rs"]
mod tests;
