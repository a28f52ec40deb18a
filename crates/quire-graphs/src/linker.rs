//! Session context and entry refresh
//!
//! One `Session` owns the three graphs for the lifetime of a build/watch
//! run; components receive it by reference, never through globals.
//! Refreshing an entry re-reads its content, scans `{{var}}` references and
//! `{% include [..](path) %}` targets, and re-links both graphs, so the
//! caller can hand the content straight to the renderer.

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use quire_core::{Loader, NodeKey, Result};

use crate::entry::EntryGraph;
use crate::includer::IncluderRegistry;
use crate::toc::TocGraph;
use crate::vars::VarsGraph;

pub struct Session {
    pub toc: TocGraph,
    pub vars: VarsGraph,
    pub entries: EntryGraph,
}

impl Session {
    pub fn new(includers: Arc<IncluderRegistry>, active_scope: &str) -> Self {
        Session {
            toc: TocGraph::new(includers),
            vars: VarsGraph::new(active_scope),
            entries: EntryGraph::new(),
        }
    }
}

fn var_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_][A-Za-z0-9_.-]*)\s*\}\}").unwrap())
}

fn include_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{%\s*include\s+\[[^\]]*\]\(([^)]+)\)\s*%\}").unwrap())
}

/// Dotted variable paths referenced by a piece of content, deduplicated.
pub fn scan_vars(content: &str) -> Vec<String> {
    let set: BTreeSet<String> = var_re()
        .captures_iter(content)
        .map(|cap| cap[1].to_string())
        .collect();
    set.into_iter().collect()
}

/// Include targets referenced by an entry, resolved against its directory.
pub fn scan_includes(entry: &NodeKey, content: &str) -> Vec<NodeKey> {
    let set: BTreeSet<NodeKey> = include_re()
        .captures_iter(content)
        .map(|cap| entry.sibling(cap[1].trim()))
        .collect();
    set.into_iter().collect()
}

/// Re-read an entry and bring its variable provenance and include edges up
/// to date. Returns the content for rendering.
pub async fn refresh_entry(
    session: &mut Session,
    entry: &NodeKey,
    loader: &dyn Loader,
) -> Result<String> {
    let content = loader.read(entry).await?;
    session.vars.link_entry(entry, &scan_vars(&content));
    session
        .entries
        .set_dependencies(entry, &scan_includes(entry, &content));
    Ok(content)
}
