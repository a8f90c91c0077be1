//! Node graph, its evaluation order, and its identity hash.
//!
//! The graph is an arena of [`node::Node`]s connected through ordered input slots. [`dag::Dag`]
//! derives a parent-before-child order for one output node and [`hash::compute_graph_hash`]
//! condenses the scheduled nodes into a [`hash::GraphHash`] used in every cache key.

pub(crate) mod dag;
pub(crate) mod hash;
pub(crate) mod node;
pub(crate) mod store;
