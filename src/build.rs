//! Full project build: discovery, graph init, parallel rendering

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use ignore::WalkBuilder;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use quire_core::{is_presets_file, is_toc_file, Loader, NodeKey, Renderer};
use quire_graphs::{scan_includes, scan_vars, Session};

use crate::pipeline;

#[derive(Debug, Default)]
pub struct BuildReport {
    pub entries: usize,
    pub failed: usize,
    pub tocs: usize,
}

/// Convention files found under the project root, relative to it.
struct Discovered {
    tocs: Vec<NodeKey>,
    presets: Vec<NodeKey>,
}

fn discover(root: &Path) -> anyhow::Result<Discovered> {
    let mut tocs = Vec::new();
    let mut presets = Vec::new();
    for result in WalkBuilder::new(root).hidden(true).build() {
        let dent = match result {
            Ok(dent) => dent,
            Err(e) => {
                debug!("skipping unreadable path: {e}");
                continue;
            }
        };
        if !dent.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let rel = dent
            .path()
            .strip_prefix(root)
            .context("walked file outside project root")?;
        let key = NodeKey::file(rel);
        if is_toc_file(&key) {
            tocs.push(key);
        } else if is_presets_file(&key) {
            presets.push(key);
        }
    }
    // Shallowest first, so parent roots claim their includes before deeper
    // toc files are considered as standalone roots.
    tocs.sort_by_key(|k| (k.depth(), k.as_str().to_string()));
    presets.sort_by_key(|k| (k.depth(), k.as_str().to_string()));
    Ok(Discovered { tocs, presets })
}

/// Build the whole project once. Graph init is single-threaded; reading and
/// rendering entries fans out over a bounded worker pool, then the results
/// are linked back into the graphs by the owner.
pub async fn full_build(
    input: &Path,
    output: &PathBuf,
    session: &mut Session,
    loader: Arc<dyn Loader>,
    renderer: Arc<dyn Renderer>,
) -> anyhow::Result<BuildReport> {
    let discovered = discover(input)?;
    info!(
        "discovered {} toc file(s), {} preset file(s)",
        discovered.tocs.len(),
        discovered.presets.len()
    );

    for preset in &discovered.presets {
        if let Err(e) = session.vars.reinit(preset, loader.as_ref()).await {
            error!("failed to load presets {preset}: {e}");
        }
    }

    for toc in &discovered.tocs {
        if session.toc.is_member(toc) {
            debug!("{toc} already claimed by a parent root");
            continue;
        }
        if let Err(e) = session.toc.init(std::slice::from_ref(toc), loader.as_ref()).await {
            error!("failed to init toc {toc}: {e}");
        }
    }

    let entries: Vec<NodeKey> = session.toc.all_entries().into_iter().collect();

    let parallelism = std::thread::available_parallelism().map_or(4, |n| n.get());
    let permits = Arc::new(Semaphore::new(parallelism * 2));
    let mut workers = JoinSet::new();
    for entry in entries {
        let loader = loader.clone();
        let renderer = renderer.clone();
        let permits = permits.clone();
        workers.spawn(async move {
            let _permit = permits.acquire_owned().await.expect("semaphore closed");
            let content = match loader.read(&entry).await {
                Ok(content) => content,
                Err(e) => return (entry, Err(anyhow::Error::new(e))),
            };
            match renderer.render(&entry, &content).await {
                Ok(()) => (entry, Ok(content)),
                Err(e) => (entry, Err(e)),
            }
        });
    }

    let mut report = BuildReport::default();
    while let Some(joined) = workers.join_next().await {
        let (entry, outcome) = joined.context("render worker panicked")?;
        report.entries += 1;
        match outcome {
            Ok(content) => {
                session.vars.link_entry(&entry, &scan_vars(&content));
                session
                    .entries
                    .set_dependencies(&entry, &scan_includes(&entry, &content));
            }
            Err(e) => {
                report.failed += 1;
                error!("failed to build {entry}: {e}");
            }
        }
    }

    let roots: Vec<NodeKey> = session.toc.roots().iter().cloned().collect();
    for root in roots {
        let Some(data) = session.toc.toc_data(&root).cloned() else {
            continue;
        };
        if let Err(e) = pipeline::dump_toc(output, &root, &data).await {
            error!("failed to dump toc {root}: {e}");
        } else {
            report.tocs += 1;
        }
    }

    info!(
        "build finished: {} entries ({} failed), {} toc root(s)",
        report.entries, report.failed, report.tocs
    );
    Ok(report)
}
