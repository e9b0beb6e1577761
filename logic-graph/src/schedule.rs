//! Node-level dependency graph and topological scheduler.
//!
//! Vertices are [`NodeId`]s; an edge `A -> B` exists whenever some link connects an
//! output property of `A` to an input property of `B`. The topological order is
//! computed with Kahn's algorithm, breaking ties deterministically by each node's
//! [`OrderKey`] (kind rank, then creation id) so that two runs over the same graph
//! always produce the same order.

use fxhash::FxHashMap;
use logic_core::visitor::{Visit, VisitResult, Visitor};
use std::collections::BTreeSet;

/// Opaque identifier of a node, unique within one engine instance. Kept as a plain
/// `u64` (rather than a pool [`logic_core::Handle`]) because nodes of different kinds
/// live in different pools in `logic-engine`; this id is the one thing they share.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NodeId(pub u64);

impl NodeId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl Visit for NodeId {
    fn visit(&mut self, name: &str, visitor: &mut Visitor) -> VisitResult {
        self.0.visit(name, visitor)
    }
}

/// The deterministic tie-break key for a node: its kind's fixed rank (so e.g. script
/// nodes always sort before binding nodes when neither depends on the other) followed
/// by its creation id (monotonically increasing, so older nodes sort first).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct OrderKey {
    pub kind_rank: u32,
    pub creation_id: u64,
}

/// Returned when a topological order cannot be produced because the graph has a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleDetected;

/// Node-level dependency graph with a lazily (re)computed topological order.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    order_keys: FxHashMap<NodeId, OrderKey>,
    edges: FxHashMap<NodeId, BTreeSet<NodeId>>,
    cached_order: Option<Vec<NodeId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a vertex. Re-adding an existing id just updates its order key.
    pub fn add_node(&mut self, id: NodeId, order_key: OrderKey) {
        self.order_keys.insert(id, order_key);
        self.edges.entry(id).or_default();
        self.invalidate();
    }

    /// Removes a vertex and every edge touching it.
    pub fn remove_node(&mut self, id: NodeId) {
        self.order_keys.remove(&id);
        self.edges.remove(&id);
        for targets in self.edges.values_mut() {
            targets.remove(&id);
        }
        self.invalidate();
    }

    /// Adds the edge `from -> to` (idempotent).
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        self.edges.entry(from).or_default().insert(to);
        self.invalidate();
    }

    /// Removes the edge `from -> to`, if present.
    pub fn remove_edge(&mut self, from: NodeId, to: NodeId) {
        if let Some(set) = self.edges.get_mut(&from) {
            set.remove(&to);
        }
        self.invalidate();
    }

    /// Forces the next call to [`Self::topological_order`] to recompute.
    pub fn invalidate(&mut self) {
        self.cached_order = None;
    }

    /// True if a cached order is currently available without recomputation.
    pub fn has_cached_order(&self) -> bool {
        self.cached_order.is_some()
    }

    /// Returns the cached topological order, recomputing it with Kahn's algorithm if
    /// it was invalidated. The order is deterministic: among vertices with equal
    /// in-degree at any step, the one with the smallest [`OrderKey`] goes first.
    pub fn topological_order(&mut self) -> Result<&[NodeId], CycleDetected> {
        if self.cached_order.is_none() {
            self.cached_order = Some(self.compute_order()?);
        }
        Ok(self.cached_order.as_ref().unwrap())
    }

    fn compute_order(&self) -> Result<Vec<NodeId>, CycleDetected> {
        let mut in_degree: FxHashMap<NodeId, usize> =
            self.order_keys.keys().map(|&id| (id, 0)).collect();
        for targets in self.edges.values() {
            for &target in targets {
                *in_degree.entry(target).or_insert(0) += 1;
            }
        }

        let key_of = |id: &NodeId| self.order_keys[id];

        let mut ready: Vec<NodeId> = in_degree
            .iter()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();
        ready.sort_by_key(|id| key_of(id));

        let mut result = Vec::with_capacity(self.order_keys.len());
        while !ready.is_empty() {
            // Smallest order key is always at the front because we re-sort on insert.
            let id = ready.remove(0);
            result.push(id);
            if let Some(targets) = self.edges.get(&id) {
                let mut newly_ready = Vec::new();
                for &target in targets {
                    let deg = in_degree.get_mut(&target).unwrap();
                    *deg -= 1;
                    if *deg == 0 {
                        newly_ready.push(target);
                    }
                }
                for target in newly_ready {
                    let pos = ready.partition_point(|id| key_of(id) < key_of(&target));
                    ready.insert(pos, target);
                }
            }
        }

        if result.len() != self.order_keys.len() {
            return Err(CycleDetected);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn key(creation_id: u64) -> OrderKey {
        OrderKey {
            kind_rank: 0,
            creation_id,
        }
    }

    #[test]
    fn linear_chain_orders_by_dependency() {
        let mut graph = DependencyGraph::new();
        let (a, b, c) = (NodeId::new(1), NodeId::new(2), NodeId::new(3));
        graph.add_node(a, key(1));
        graph.add_node(b, key(2));
        graph.add_node(c, key(3));
        graph.add_edge(a, b);
        graph.add_edge(b, c);

        let order = graph.topological_order().unwrap();
        assert_eq!(order, &[a, b, c]);
    }

    #[test]
    fn independent_nodes_break_ties_by_order_key() {
        let mut graph = DependencyGraph::new();
        let (a, b) = (NodeId::new(10), NodeId::new(20));
        graph.add_node(b, key(2));
        graph.add_node(a, key(1));

        let order = graph.topological_order().unwrap();
        assert_eq!(order, &[a, b]);
    }

    #[test]
    fn cycle_is_detected() {
        let mut graph = DependencyGraph::new();
        let (a, b, c) = (NodeId::new(1), NodeId::new(2), NodeId::new(3));
        graph.add_node(a, key(1));
        graph.add_node(b, key(2));
        graph.add_node(c, key(3));
        graph.add_edge(a, b);
        graph.add_edge(b, c);
        graph.add_edge(c, a);

        assert_eq!(graph.topological_order(), Err(CycleDetected));
    }

    #[test]
    fn removing_edge_breaks_cycle() {
        let mut graph = DependencyGraph::new();
        let (a, b) = (NodeId::new(1), NodeId::new(2));
        graph.add_node(a, key(1));
        graph.add_node(b, key(2));
        graph.add_edge(a, b);
        graph.add_edge(b, a);
        assert!(graph.topological_order().is_err());

        graph.remove_edge(b, a);
        assert_eq!(graph.topological_order().unwrap(), &[a, b]);
    }

    #[test]
    fn cache_is_reused_until_invalidated() {
        let mut graph = DependencyGraph::new();
        let a = NodeId::new(1);
        graph.add_node(a, key(1));
        graph.topological_order().unwrap();
        assert!(graph.has_cached_order());
        graph.add_node(NodeId::new(2), key(2));
        assert!(!graph.has_cached_order());
    }
}
