//! Variable provenance graph
//!
//! Each entry depends on exactly one value node per variable it uses: the
//! composite key `<preset-file>#<scope>.<dotted.path>` of the most specific
//! (deepest directory) preset file that defines the variable, mirroring
//! override semantics. Value nodes depend on their preset file. Provenance
//! is tracked at leaf-value granularity so editing an unrelated key in a
//! large presets file rebuilds nothing.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{error, warn};

use quire_core::{DependencyGraph, GraphError, Loader, NodeKey, NodeKind, Result};

use crate::schema::RawPresets;

/// Flattened scope tables of one presets file: scope -> dotted leaf -> value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresetData {
    pub scopes: BTreeMap<String, BTreeMap<String, serde_yaml::Value>>,
}

#[derive(Debug, Clone)]
pub enum VarsNode {
    Preset(PresetData),
    Value(serde_yaml::Value),
    Missed,
    Entry,
}

pub struct VarsGraph {
    graph: DependencyGraph<VarsNode>,
    preset_files: BTreeSet<NodeKey>,
    active_scope: String,
}

impl VarsGraph {
    pub fn new(active_scope: impl Into<String>) -> Self {
        VarsGraph {
            graph: DependencyGraph::new(),
            preset_files: BTreeSet::new(),
            active_scope: active_scope.into(),
        }
    }

    pub fn is_member(&self, key: &NodeKey) -> bool {
        self.graph.has_node(key)
    }

    pub fn node_kind(&self, key: &NodeKey) -> Option<NodeKind> {
        self.graph.node_kind(key)
    }

    pub fn active_scope(&self) -> &str {
        &self.active_scope
    }

    /// The value node an entry currently provenances for `var`, if any.
    pub fn provenance_of(&self, entry: &NodeKey, var: &str) -> Option<NodeKey> {
        self.entry_uses(entry)
            .into_iter()
            .find(|(v, _)| v == var)
            .map(|(_, key)| key)
    }

    fn parse(file: &NodeKey, content: &str) -> Result<PresetData> {
        let raw: RawPresets = serde_yaml::from_str(content).map_err(|e| GraphError::Parse {
            path: file.clone(),
            source: e,
        })?;
        let mut data = PresetData::default();
        for (scope, value) in raw {
            match value {
                serde_yaml::Value::Mapping(_) => {
                    let mut leaves = BTreeMap::new();
                    flatten("", &value, &mut leaves);
                    data.scopes.insert(scope, leaves);
                }
                serde_yaml::Value::Null => {
                    data.scopes.insert(scope, BTreeMap::new());
                }
                _ => warn!("scope {scope} in {file} is not a mapping, ignored"),
            }
        }
        Ok(data)
    }

    /// Effective leaves of one file under the current scope selection:
    /// the active scope overlays `default`.
    fn effective(&self, data: &PresetData) -> BTreeMap<String, (String, serde_yaml::Value)> {
        let mut out = BTreeMap::new();
        if let Some(leaves) = data.scopes.get("default") {
            for (var, value) in leaves {
                out.insert(var.clone(), ("default".to_string(), value.clone()));
            }
        }
        if self.active_scope != "default" {
            if let Some(leaves) = data.scopes.get(&self.active_scope) {
                for (var, value) in leaves {
                    out.insert(var.clone(), (self.active_scope.clone(), value.clone()));
                }
            }
        }
        out
    }

    fn lookup(&self, data: &PresetData, var: &str) -> Option<(String, serde_yaml::Value)> {
        if let Some(value) = data.scopes.get(&self.active_scope).and_then(|s| s.get(var)) {
            return Some((self.active_scope.clone(), value.clone()));
        }
        data.scopes
            .get("default")
            .and_then(|s| s.get(var))
            .map(|value| ("default".to_string(), value.clone()))
    }

    /// Deepest preset file on the entry's ancestor chain defining `var`.
    fn provider_for(
        &self,
        entry: &NodeKey,
        var: &str,
    ) -> Option<(NodeKey, String, serde_yaml::Value)> {
        let mut files: Vec<&NodeKey> = self
            .preset_files
            .iter()
            .filter(|preset| entry.is_under(preset.dir()))
            .collect();
        files.sort_by(|a, b| b.depth().cmp(&a.depth()).then_with(|| b.cmp(a)));
        for file in files {
            if let Some(VarsNode::Preset(data)) = self.graph.node_data(file) {
                if let Some((scope, value)) = self.lookup(data, var) {
                    return Some(((*file).clone(), scope, value));
                }
            }
        }
        None
    }

    /// Point the entry's provenance edge for `var` at its current provider,
    /// moving the edge atomically if the provider changed. Returns the value
    /// node key and whether the provenance or its value changed.
    ///
    /// `stale` holds pre-reinit value-node data; without it the prior value
    /// is read from the graph, which is only correct when no value node has
    /// been rewritten earlier in the same pass.
    fn retarget(
        &mut self,
        entry: &NodeKey,
        var: &str,
        current: Option<&NodeKey>,
        stale: Option<&BTreeMap<NodeKey, serde_yaml::Value>>,
    ) -> (NodeKey, bool) {
        let provider = self.provider_for(entry, var);
        let (desired, fresh) = match provider {
            Some((file, scope, value)) => (NodeKey::value(&file, &scope, var), Some((file, value))),
            None => (NodeKey::missed(var), None),
        };

        let prior = stale
            .and_then(|map| map.get(&desired).cloned())
            .or_else(|| match self.graph.node_data(&desired) {
                Some(VarsNode::Value(v)) => Some(v.clone()),
                _ => None,
            });
        match &fresh {
            Some((file, value)) => {
                self.graph
                    .add_node(desired.clone(), NodeKind::Value, VarsNode::Value(value.clone()));
                let _ = self.graph.add_dependency(&desired, file);
            }
            None => {
                self.graph
                    .add_node(desired.clone(), NodeKind::Missed, VarsNode::Missed);
            }
        }

        let changed = match current {
            Some(cur) if *cur == desired => {
                prior.as_ref() != fresh.as_ref().map(|(_, value)| value)
            }
            Some(cur) => {
                self.graph.remove_dependency(entry, cur);
                self.gc_value(cur);
                let _ = self.graph.add_dependency(entry, &desired);
                true
            }
            None => {
                let _ = self.graph.add_dependency(entry, &desired);
                true
            }
        };
        (desired, changed)
    }

    fn gc_value(&mut self, key: &NodeKey) {
        if matches!(
            self.graph.node_kind(key),
            Some(NodeKind::Value) | Some(NodeKind::Missed)
        ) && self.graph.dependants_of(key).is_empty()
        {
            self.graph.release(key);
        }
    }

    fn entry_uses(&self, entry: &NodeKey) -> Vec<(String, NodeKey)> {
        self.graph
            .dependencies_of(entry)
            .into_iter()
            .filter_map(|dep| {
                let var = dep.scope_and_var()?.1.to_string();
                Some((var, dep))
            })
            .collect()
    }

    /// Record the set of variables an entry uses, keeping exactly one
    /// provenance edge per variable.
    pub fn link_entry(&mut self, entry: &NodeKey, vars: &[String]) {
        if !self.graph.has_node(entry) {
            self.graph.add_node(entry.clone(), NodeKind::Entry, VarsNode::Entry);
        }
        let current: BTreeMap<String, NodeKey> = self.entry_uses(entry).into_iter().collect();
        let wanted: BTreeSet<&String> = vars.iter().collect();
        for var in &wanted {
            let cur = current.get(var.as_str());
            self.retarget(entry, var, cur, None);
        }
        for (var, key) in &current {
            if !wanted.contains(var) {
                self.graph.remove_dependency(entry, key);
                self.gc_value(key);
            }
        }
    }

    /// Re-initialize after a change to a presets file (or its first
    /// appearance). Returns the entries whose effective values moved.
    ///
    /// On removal the preset node is released last, after every dependent
    /// entry has redirected its provenance to the next file in the stack
    /// (or to the `missed#` sentinel).
    pub async fn reinit(&mut self, file: &NodeKey, loader: &dyn Loader) -> Result<BTreeSet<NodeKey>> {
        let old = match self.graph.node_data(file) {
            Some(VarsNode::Preset(data)) => data.clone(),
            _ => PresetData::default(),
        };
        let parsed = match loader.read(file).await {
            Ok(content) => match Self::parse(file, &content) {
                Ok(data) => Some(data),
                Err(e) => {
                    // Broken presets disappear from the graph, not half-insert.
                    error!("failed to parse presets {file}: {e}");
                    None
                }
            },
            Err(GraphError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let exists = parsed.is_some();
        let new = parsed.unwrap_or_default();
        let old_eff = self.effective(&old);
        let new_eff = self.effective(&new);
        let mut touched: BTreeSet<String> = BTreeSet::new();
        for var in old_eff.keys().chain(new_eff.keys()) {
            if old_eff.get(var) != new_eff.get(var) {
                touched.insert(var.clone());
            }
        }

        // Pre-reinit data of this file's value nodes, so change detection
        // is not confused by an earlier entry rewriting the shared node.
        let mut stale_values = BTreeMap::new();
        for value in self.graph.dependants_of(file) {
            if let Some(VarsNode::Value(v)) = self.graph.node_data(&value) {
                stale_values.insert(value, v.clone());
            }
        }

        if exists {
            self.graph
                .add_node(file.clone(), NodeKind::Preset, VarsNode::Preset(new));
            self.preset_files.insert(file.clone());
        } else {
            // Stop offering values, but keep the node so dependants still
            // see previous data while re-linking.
            self.preset_files.remove(file);
        }

        let mut invalidated = BTreeSet::new();
        for entry in self.graph.nodes_of_kind(NodeKind::Entry) {
            for (var, current) in self.entry_uses(&entry) {
                if !touched.contains(&var) {
                    continue;
                }
                let (_, changed) = self.retarget(&entry, &var, Some(&current), Some(&stale_values));
                if changed {
                    invalidated.insert(entry.clone());
                }
            }
        }

        if !exists {
            for value in self.graph.dependants_of(file) {
                self.gc_value(&value);
            }
            self.graph.release(file);
        }
        Ok(invalidated)
    }

    /// Switch the active configuration scope, re-linking provenance edges.
    /// Entries are invalidated even when the literal value is unchanged,
    /// because the scope pointer itself moved.
    pub fn set_active_scope(&mut self, scope: &str) -> BTreeSet<NodeKey> {
        if scope == self.active_scope {
            return BTreeSet::new();
        }
        self.active_scope = scope.to_string();
        let mut invalidated = BTreeSet::new();
        for entry in self.graph.nodes_of_kind(NodeKind::Entry) {
            for (var, current) in self.entry_uses(&entry) {
                let (_, changed) = self.retarget(&entry, &var, Some(&current), None);
                if changed {
                    invalidated.insert(entry.clone());
                }
            }
        }
        invalidated
    }

    pub fn release_entry(&mut self, entry: &NodeKey) {
        for (_, key) in self.entry_uses(entry) {
            self.graph.remove_dependency(entry, &key);
            self.gc_value(&key);
        }
        self.graph.release(entry);
    }
}

fn flatten(prefix: &str, value: &serde_yaml::Value, out: &mut BTreeMap<String, serde_yaml::Value>) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (key, nested) in map {
                let Some(key) = key.as_str() else {
                    warn!("non-string preset key under {prefix:?}, ignored");
                    continue;
                };
                let path = if prefix.is_empty() {
                    key.to_string()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, nested, out);
            }
        }
        leaf => {
            out.insert(prefix.to_string(), leaf.clone());
        }
    }
}
