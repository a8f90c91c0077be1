use crate::foundation::error::{PlayheadError, PlayheadResult};
use crate::graph::node::{Node, NodeId, NodeOp};

/// Arena of nodes and their connections.
///
/// Connections are kept acyclic: [`NodeGraph::connect`] refuses any edge that would close a loop.
#[derive(Clone, Debug, Default)]
pub struct NodeGraph {
    nodes: Vec<Node>,
}

impl NodeGraph {
    /// Empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node built from `name` and `op`.
    pub fn add_node(&mut self, name: impl Into<String>, op: NodeOp) -> NodeId {
        self.add(Node::new(name, op))
    }

    /// Add a prepared node. Any connections it carries are dropped.
    pub fn add(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let node = Node::new(node.name().to_owned(), node.op().clone())
            .with_channels(node.produced_channels(), node.requested_channels());
        self.nodes.push(node);
        id
    }

    /// Look up a node.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Find a node by name.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.name() == name)
            .map(|i| NodeId(i as u32))
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` when the graph holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(|i| NodeId(i as u32))
    }

    /// Replace a node's parameters. The new op must keep the same kind and slot count.
    pub fn set_op(&mut self, id: NodeId, op: NodeOp) -> PlayheadResult<()> {
        let node = self
            .nodes
            .get_mut(id.index())
            .ok_or_else(|| PlayheadError::graph(format!("unknown node {id}")))?;
        if node.op().kind() != op.kind() || node.op().max_inputs() != op.max_inputs() {
            return Err(PlayheadError::graph(format!(
                "node '{}' cannot change op shape",
                node.name()
            )));
        }
        node.set_op(op);
        Ok(())
    }

    /// Plug `parent` into input `slot` of `child`, replacing whatever was there.
    pub fn connect(&mut self, child: NodeId, slot: usize, parent: NodeId) -> PlayheadResult<()> {
        let child_node = self
            .node(child)
            .ok_or_else(|| PlayheadError::graph(format!("unknown node {child}")))?;
        if self.node(parent).is_none() {
            return Err(PlayheadError::graph(format!("unknown node {parent}")));
        }
        if slot >= child_node.inputs().len() {
            return Err(PlayheadError::graph(format!(
                "node '{}' has no input slot {slot}",
                child_node.name()
            )));
        }
        if parent == child || self.is_upstream(child, parent) {
            return Err(PlayheadError::graph(format!(
                "connecting {parent} -> {child} would create a cycle"
            )));
        }

        let previous = self.nodes[child.index()].set_input(slot, Some(parent));
        if let Some(prev) = previous
            && prev != parent
            && !self.nodes[child.index()].parents().any(|p| p == prev)
        {
            self.nodes[prev.index()].remove_child(child);
        }
        self.nodes[parent.index()].add_child(child);
        Ok(())
    }

    /// Empty input `slot` of `child`, returning the previous parent.
    pub fn disconnect(&mut self, child: NodeId, slot: usize) -> Option<NodeId> {
        let node = self.nodes.get_mut(child.index())?;
        if slot >= node.inputs().len() {
            return None;
        }
        let prev = node.set_input(slot, None)?;
        if !self.nodes[child.index()].parents().any(|p| p == prev) {
            self.nodes[prev.index()].remove_child(child);
        }
        Some(prev)
    }

    /// Whether `target` is reachable by walking inputs upward from `from`.
    fn is_upstream(&self, target: NodeId, from: NodeId) -> bool {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            let Some(node) = self.node(id) else {
                continue;
            };
            if std::mem::replace(&mut seen[id.index()], true) {
                continue;
            }
            stack.extend(node.parents());
        }
        false
    }
}

#[cfg(test)]
#[path = "../../tests/unit/graph/store.rs"]
mod tests;
