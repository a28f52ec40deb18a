//! Structural TOC graph: roots, included sources, and leaf entries
//!
//! Containment edges run parent -> child. A root `toc.yaml` is unfolded
//! recursively: static `include.path` directives pull in nested TOC files as
//! `Source` nodes, includer plugins synthesize fragments from external input
//! files, and every resolved `href` becomes an `Entry` node.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::{debug, error};

use quire_core::{
    is_toc_file, DependencyGraph, GraphError, Loader, NodeKey, NodeKind, Result,
};

use crate::includer::IncluderRegistry;
use crate::schema::{IncluderRef, Toc, TocItem};

/// Payload of a TOC-namespace node. Entry and includer-input nodes carry no
/// parsed fragment.
#[derive(Debug, Clone, Default)]
pub struct TocNode {
    pub toc: Option<Toc>,
}

/// Outcome of re-initializing one TOC-graph member.
#[derive(Debug, Default)]
pub struct TocReinit {
    /// Entries whose TOC membership or ownership changed.
    pub invalidated_entries: BTreeSet<NodeKey>,
    /// Nested TOC files that lost their parent link and became roots.
    pub detached: Vec<NodeKey>,
    /// Roots (still present) whose navigation must be re-dumped.
    pub affected_roots: BTreeSet<NodeKey>,
}

pub struct TocGraph {
    graph: DependencyGraph<TocNode>,
    roots: BTreeSet<NodeKey>,
    includers: Arc<IncluderRegistry>,
    /// Missing href -> TOC files that referenced it. An `add` event for a
    /// pending path re-inits the referencing TOCs so the entry appears.
    pending_hrefs: HashMap<NodeKey, BTreeSet<NodeKey>>,
}

impl TocGraph {
    pub fn new(includers: Arc<IncluderRegistry>) -> Self {
        TocGraph {
            graph: DependencyGraph::new(),
            roots: BTreeSet::new(),
            includers,
            pending_hrefs: HashMap::new(),
        }
    }

    pub fn is_member(&self, key: &NodeKey) -> bool {
        self.graph.has_node(key)
    }

    pub fn node_kind(&self, key: &NodeKey) -> Option<NodeKind> {
        self.graph.node_kind(key)
    }

    pub fn toc_data(&self, key: &NodeKey) -> Option<&Toc> {
        self.graph.node_data(key).and_then(|n| n.toc.as_ref())
    }

    pub fn roots(&self) -> &BTreeSet<NodeKey> {
        &self.roots
    }

    /// TOC files that reference `file` through a not-yet-existing href.
    pub fn pending_referrers(&self, file: &NodeKey) -> Vec<NodeKey> {
        self.pending_hrefs
            .get(file)
            .map(|owners| owners.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Initialize the given files as TOC roots. Files already registered in
    /// the graph (e.g. pulled in as sources by a shallower root) are skipped.
    /// Per-file failures are logged and do not abort the batch.
    pub async fn init(&mut self, files: &[NodeKey], loader: &dyn Loader) -> Result<()> {
        for file in files {
            if self.graph.has_node(file) {
                debug!("skipping {file}: already registered");
                continue;
            }
            if let Err(e) = self.init_root(file.clone(), loader).await {
                error!("failed to init toc {file}: {e}");
            }
        }
        Ok(())
    }

    /// Register one file as a root and unfold it. On failure the file is
    /// left absent from the graph.
    pub async fn init_root(&mut self, file: NodeKey, loader: &dyn Loader) -> Result<()> {
        let mut stack = Vec::new();
        self.unfold(file.clone(), None, &mut stack, NodeKind::Toc, loader)
            .await?;
        self.roots.insert(file);
        Ok(())
    }

    fn unfold<'a>(
        &'a mut self,
        file: NodeKey,
        parent: Option<NodeKey>,
        stack: &'a mut Vec<NodeKey>,
        kind: NodeKind,
        loader: &'a dyn Loader,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            if stack.contains(&file) {
                let mut cycle = stack.clone();
                cycle.push(file);
                return Err(GraphError::CircularInclude { stack: cycle });
            }
            let content = loader.read(&file).await?;
            let toc: Toc = serde_yaml::from_str(&content).map_err(|e| GraphError::Parse {
                path: file.clone(),
                source: e,
            })?;

            self.graph
                .add_node(file.clone(), kind, TocNode { toc: Some(toc.clone()) });
            if let Some(parent) = &parent {
                self.graph.add_dependency(parent, &file)?;
            }
            // Attachment, the reverse of detachment: a standalone root that a
            // parent now claims as a source stops being tracked as a root.
            if kind == NodeKind::Source {
                self.roots.remove(&file);
            }

            stack.push(file.clone());
            let walked = self.walk_items(&file, &toc.items, stack, loader).await;
            stack.pop();
            walked
        }
        .boxed()
    }

    fn walk_items<'a>(
        &'a mut self,
        owner: &'a NodeKey,
        items: &'a [TocItem],
        stack: &'a mut Vec<NodeKey>,
        loader: &'a dyn Loader,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            for item in items {
                if let Some(href) = &item.href {
                    self.register_href(owner, href, loader).await?;
                }
                if !item.items.is_empty() {
                    self.walk_items(owner, &item.items, stack, loader).await?;
                }
                if let Some(include) = &item.include {
                    if let Some(path) = &include.path {
                        let child = owner.sibling(path);
                        if let Err(e) = self
                            .unfold(child.clone(), Some(owner.clone()), stack, NodeKind::Source, loader)
                            .await
                        {
                            // Offending branch is skipped; siblings continue.
                            error!("failed to include {child} from {owner}: {e}");
                        }
                    }
                    for inc in &include.includers {
                        if let Err(e) = self.run_includer(owner, inc, stack, loader).await {
                            error!("includer {} failed in {owner}: {e}", inc.name);
                        }
                    }
                }
            }
            Ok(())
        }
        .boxed()
    }

    /// Entry nodes only exist for files present on disk; a dangling href is
    /// recorded so a later `add` can re-trigger resolution.
    async fn register_href(
        &mut self,
        owner: &NodeKey,
        href: &str,
        loader: &dyn Loader,
    ) -> Result<()> {
        let entry = owner.sibling(href);
        if loader.exists(&entry).await {
            if !self.graph.has_node(&entry) {
                self.graph.add_node(entry.clone(), NodeKind::Entry, TocNode::default());
            }
            self.graph.add_dependency(owner, &entry)?;
            if let Some(owners) = self.pending_hrefs.get_mut(&entry) {
                owners.remove(owner);
                if owners.is_empty() {
                    self.pending_hrefs.remove(&entry);
                }
            }
        } else {
            debug!("pending href {entry} referenced by {owner}");
            self.pending_hrefs
                .entry(entry)
                .or_default()
                .insert(owner.clone());
        }
        Ok(())
    }

    fn run_includer<'a>(
        &'a mut self,
        owner: &'a NodeKey,
        inc: &'a IncluderRef,
        stack: &'a mut Vec<NodeKey>,
        loader: &'a dyn Loader,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let includer = self.includers.get(&inc.name)?;
            let input = owner.sibling(&inc.input);
            if !self.graph.has_node(&input) {
                self.graph
                    .add_node(input.clone(), NodeKind::Source, TocNode::default());
            }
            self.graph.add_dependency(owner, &input)?;
            let content = match loader.read(&input).await {
                Ok(content) => Some(content),
                Err(GraphError::NotFound(_)) => None,
                Err(e) => return Err(e),
            };
            let fragment = includer.generate(content.as_deref(), &inc.options)?;
            self.walk_items(owner, &fragment.items, stack, loader).await
        }
        .boxed()
    }

    /// Leaf entries reachable from a root via containment edges.
    pub fn entries_of(&self, root: &NodeKey) -> BTreeSet<NodeKey> {
        self.graph
            .transitive_dependencies_of(root)
            .into_iter()
            .filter(|k| self.graph.node_kind(k) == Some(NodeKind::Entry))
            .collect()
    }

    /// Union of entries over every root.
    pub fn all_entries(&self) -> BTreeSet<NodeKey> {
        let mut out = BTreeSet::new();
        for root in &self.roots {
            out.extend(self.entries_of(root));
        }
        out
    }

    /// Re-initialize after a change to a TOC-graph member.
    ///
    /// Affected roots are re-unfolded from scratch; nested TOC files that
    /// lost their last parent link are detached into standalone roots; the
    /// old-vs-new entry diff across all touched roots is the invalidation
    /// set (an entry that changed which TOC owns it appears in the diff and
    /// re-renders).
    pub async fn reinit(&mut self, file: &NodeKey, loader: &dyn Loader) -> Result<TocReinit> {
        let was_root = self.roots.contains(file);
        let mut affected: BTreeSet<NodeKey> = self
            .graph
            .transitive_dependants_of(file)
            .into_iter()
            .filter(|k| self.roots.contains(k))
            .collect();
        if was_root {
            affected.insert(file.clone());
        }

        let mut old_entries: BTreeMap<NodeKey, BTreeSet<NodeKey>> = affected
            .iter()
            .map(|root| (root.clone(), self.entries_of(root)))
            .collect();

        let old_deps = self.graph.transitive_dependencies_of(file);
        let mut candidates: BTreeSet<NodeKey> =
            old_deps.iter().filter(|k| is_toc_file(k)).cloned().collect();
        candidates.insert(file.clone());

        // Release stale subtrees. Eager GC policy: dependency nodes with no
        // remaining dependants go away right here, except TOC-convention
        // files which are re-registered as standalone roots below.
        if affected.is_empty() {
            self.release_subtree(file);
        } else {
            for root in affected.clone() {
                self.release_subtree(&root);
            }
        }
        let graph = &self.graph;
        self.pending_hrefs.retain(|_, owners| {
            owners.retain(|owner| graph.has_node(owner));
            !owners.is_empty()
        });

        // Re-unfold every affected root that still exists on disk. A parse
        // error leaves the root absent rather than half-inserted.
        let mut attempted = BTreeSet::new();
        for root in &affected {
            self.roots.remove(root);
            attempted.insert(root.clone());
            if loader.exists(root).await {
                if let Err(e) = self.init_root(root.clone(), loader).await {
                    error!("failed to re-init toc {root}: {e}");
                }
            }
        }

        // Detachment: a removed dependency that follows the TOC convention,
        // still exists on disk, and is no longer in the graph keeps being
        // tracked as its own root.
        let mut detached = Vec::new();
        for cand in candidates {
            if attempted.contains(&cand) || self.graph.has_node(&cand) || !is_toc_file(&cand) {
                continue;
            }
            if loader.exists(&cand).await {
                match self.init_root(cand.clone(), loader).await {
                    Ok(()) => detached.push(cand),
                    Err(e) => error!("failed to detach toc {cand}: {e}"),
                }
            }
        }

        let mut outcome = TocReinit::default();
        let mut touched_roots: BTreeSet<NodeKey> = affected;
        touched_roots.extend(detached.iter().cloned());
        for root in &touched_roots {
            let old = old_entries.remove(root).unwrap_or_default();
            let new = self.entries_of(root);
            outcome
                .invalidated_entries
                .extend(old.symmetric_difference(&new).cloned());
            if self.graph.has_node(root) {
                outcome.affected_roots.insert(root.clone());
            }
        }
        outcome.detached = detached;
        Ok(outcome)
    }

    /// Release a node and cascade-release its former dependencies that end
    /// up with zero dependants (roots are never cascaded away).
    fn release_subtree(&mut self, key: &NodeKey) {
        let deps = self.graph.transitive_dependencies_of(key);
        self.graph.release(key);
        self.roots.remove(key);
        let mut progress = true;
        while progress {
            progress = false;
            for dep in &deps {
                if self.graph.has_node(dep)
                    && !self.roots.contains(dep)
                    && self.graph.dependants_of(dep).is_empty()
                {
                    self.graph.release(dep);
                    progress = true;
                }
            }
        }
    }
}
