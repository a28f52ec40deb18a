//! Content-level dependencies: a page and the includes it pulls in

use quire_core::{DependencyGraph, NodeKey, NodeKind};

pub struct EntryGraph {
    graph: DependencyGraph<()>,
}

impl EntryGraph {
    pub fn new() -> Self {
        EntryGraph {
            graph: DependencyGraph::new(),
        }
    }

    pub fn is_member(&self, key: &NodeKey) -> bool {
        self.graph.has_node(key)
    }

    /// Replace the include set discovered while rendering an entry. Includes
    /// no longer referenced by any entry are released.
    pub fn set_dependencies(&mut self, entry: &NodeKey, includes: &[NodeKey]) {
        if !self.graph.has_node(entry) {
            self.graph.add_node(entry.clone(), NodeKind::Entry, ());
        }
        let old = self.graph.dependencies_of(entry);
        for stale in &old {
            if !includes.contains(stale) {
                self.graph.remove_dependency(entry, stale);
                self.gc_include(stale);
            }
        }
        for include in includes {
            if !self.graph.has_node(include) {
                self.graph.add_node(include.clone(), NodeKind::Include, ());
            }
            // self-includes would make the entry its own dependant
            if include != entry {
                let _ = self.graph.add_dependency(entry, include);
            }
        }
    }

    /// Entries that pulled in `file` and must re-render when it changes.
    pub fn dependants_of_file(&self, file: &NodeKey) -> Vec<NodeKey> {
        self.graph
            .dependants_of(file)
            .into_iter()
            .filter(|k| self.graph.node_kind(k) == Some(NodeKind::Entry))
            .collect()
    }

    pub fn includes_of(&self, entry: &NodeKey) -> Vec<NodeKey> {
        self.graph.dependencies_of(entry)
    }

    /// Remove an entry and drop its include edges; includes not referenced
    /// by any other entry become collectible.
    pub fn release_entry(&mut self, entry: &NodeKey) {
        let includes = self.graph.dependencies_of(entry);
        self.graph.release(entry);
        for include in &includes {
            self.gc_include(include);
        }
    }

    fn gc_include(&mut self, key: &NodeKey) {
        if self.graph.node_kind(key) == Some(NodeKind::Include)
            && self.graph.dependants_of(key).is_empty()
        {
            self.graph.release(key);
        }
    }
}

impl Default for EntryGraph {
    fn default() -> Self {
        Self::new()
    }
}
