//! Keyed dependency graph over petgraph::StableDiGraph
//!
//! An edge `A -> B` means "A depends on B": invalidating B requires
//! considering A. Edge kinds (containment, include, variable usage) are not
//! stored; callers encode kind in the node namespace they use.

use std::collections::{BTreeSet, HashMap};

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::error::{GraphError, Result};
use crate::model::{Node, NodeKey, NodeKind};

pub struct DependencyGraph<T> {
    inner: StableDiGraph<Node<T>, ()>,
    index: HashMap<NodeKey, NodeIndex>,
}

impl<T> std::fmt::Debug for DependencyGraph<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("node_count", &self.inner.node_count())
            .field("edge_count", &self.inner.edge_count())
            .finish()
    }
}

impl<T> DependencyGraph<T> {
    pub fn new() -> Self {
        DependencyGraph {
            inner: StableDiGraph::new(),
            index: HashMap::new(),
        }
    }

    pub fn has_node(&self, key: &NodeKey) -> bool {
        self.index.contains_key(key)
    }

    /// Insert or replace a node. Edges of an existing node are kept.
    pub fn add_node(&mut self, key: NodeKey, kind: NodeKind, data: T) {
        if let Some(&idx) = self.index.get(&key) {
            if let Some(node) = self.inner.node_weight_mut(idx) {
                node.kind = kind;
                node.data = data;
                return;
            }
        }
        let idx = self.inner.add_node(Node {
            key: key.clone(),
            kind,
            data,
        });
        self.index.insert(key, idx);
    }

    pub fn node_data(&self, key: &NodeKey) -> Option<&T> {
        let idx = *self.index.get(key)?;
        self.inner.node_weight(idx).map(|n| &n.data)
    }

    pub fn node_data_mut(&mut self, key: &NodeKey) -> Option<&mut T> {
        let idx = *self.index.get(key)?;
        self.inner.node_weight_mut(idx).map(|n| &mut n.data)
    }

    pub fn node_kind(&self, key: &NodeKey) -> Option<NodeKind> {
        let idx = *self.index.get(key)?;
        self.inner.node_weight(idx).map(|n| n.kind)
    }

    /// Add a dependency edge `from -> to`. Both nodes must exist.
    /// Adding the same edge twice is a no-op.
    pub fn add_dependency(&mut self, from: &NodeKey, to: &NodeKey) -> Result<()> {
        let from_idx = *self
            .index
            .get(from)
            .ok_or_else(|| GraphError::UnknownNode(from.clone()))?;
        let to_idx = *self
            .index
            .get(to)
            .ok_or_else(|| GraphError::UnknownNode(to.clone()))?;
        if !self.inner.contains_edge(from_idx, to_idx) {
            self.inner.add_edge(from_idx, to_idx, ());
        }
        Ok(())
    }

    /// Remove the dependency edge `from -> to` if present.
    pub fn remove_dependency(&mut self, from: &NodeKey, to: &NodeKey) {
        if let (Some(&from_idx), Some(&to_idx)) = (self.index.get(from), self.index.get(to)) {
            if let Some(edge) = self.inner.find_edge(from_idx, to_idx) {
                self.inner.remove_edge(edge);
            }
        }
    }

    /// Direct dependencies (outgoing edges) of a node, sorted.
    pub fn dependencies_of(&self, key: &NodeKey) -> Vec<NodeKey> {
        self.neighbors(key, Direction::Outgoing)
    }

    /// Direct dependants (incoming edges) of a node, sorted.
    pub fn dependants_of(&self, key: &NodeKey) -> Vec<NodeKey> {
        self.neighbors(key, Direction::Incoming)
    }

    fn neighbors(&self, key: &NodeKey, dir: Direction) -> Vec<NodeKey> {
        let Some(&idx) = self.index.get(key) else {
            return Vec::new();
        };
        let mut out: Vec<NodeKey> = self
            .inner
            .edges_directed(idx, dir)
            .filter_map(|edge| {
                let other = match dir {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                self.inner.node_weight(other).map(|n| n.key.clone())
            })
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Transitive dependency closure of a node, excluding the node itself.
    /// Safe on graphs that transiently contain cycles.
    pub fn transitive_dependencies_of(&self, key: &NodeKey) -> BTreeSet<NodeKey> {
        let mut seen = BTreeSet::new();
        let mut stack = self.dependencies_of(key);
        while let Some(dep) = stack.pop() {
            if dep != *key && seen.insert(dep.clone()) {
                stack.extend(self.dependencies_of(&dep));
            }
        }
        seen
    }

    /// Transitive dependant closure of a node, excluding the node itself.
    pub fn transitive_dependants_of(&self, key: &NodeKey) -> BTreeSet<NodeKey> {
        let mut seen = BTreeSet::new();
        let mut stack = self.dependants_of(key);
        while let Some(dep) = stack.pop() {
            if dep != *key && seen.insert(dep.clone()) {
                stack.extend(self.dependants_of(&dep));
            }
        }
        seen
    }

    /// Remove a node and every edge touching it. Idempotent on missing keys.
    pub fn release(&mut self, key: &NodeKey) {
        if let Some(idx) = self.index.remove(key) {
            self.inner.remove_node(idx);
        }
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn keys(&self) -> impl Iterator<Item = &NodeKey> {
        self.index.keys()
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeKey> {
        let mut out: Vec<NodeKey> = self
            .inner
            .node_weights()
            .filter(|n| n.kind == kind)
            .map(|n| n.key.clone())
            .collect();
        out.sort();
        out
    }
}

impl<T> Default for DependencyGraph<T> {
    fn default() -> Self {
        Self::new()
    }
}
