//! Watch orchestrator: classify -> apply -> invalidate -> notify
//!
//! Exclusive owner of the three graphs during a watch session. Events are
//! drained one at a time: graph mutation reads prior dependency sets that a
//! concurrent mutation could invalidate, so the next event is not pulled
//! until the current invalidation set is fully dispatched.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use quire_core::{is_presets_file, is_toc_file, page_path, Loader, NodeKey, NodeKind};
use quire_graphs::{refresh_entry, Session, Toc};

use crate::watcher::{ChangeEvent, ChangeKind, EventStream};

/// Invalidation callback surface of the build pipeline.
#[async_trait]
pub trait Pipeline: Send {
    /// Re-dump one TOC root's navigation.
    async fn process_toc(&mut self, toc: &NodeKey, data: &Toc) -> anyhow::Result<()>;

    /// Re-render one entry. `content` is already refreshed and re-linked.
    async fn process_entry(&mut self, entry: &NodeKey, content: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
struct Invalidation {
    entries: BTreeSet<NodeKey>,
    tocs: BTreeSet<NodeKey>,
}

struct Mirror {
    src: PathBuf,
    dst: PathBuf,
}

pub struct WatchOrchestrator<P> {
    session: Session,
    loader: Arc<dyn Loader>,
    pipeline: P,
    reload_tx: Option<broadcast::Sender<String>>,
    mirror: Option<Mirror>,
}

impl<P: Pipeline> WatchOrchestrator<P> {
    pub fn new(session: Session, loader: Arc<dyn Loader>, pipeline: P) -> Self {
        WatchOrchestrator {
            session,
            loader,
            pipeline,
            reload_tx: None,
            mirror: None,
        }
    }

    /// Broadcast changed page paths to the live-reload server.
    pub fn with_reload(mut self, tx: broadcast::Sender<String>) -> Self {
        self.reload_tx = Some(tx);
        self
    }

    /// Keep a working copy of the input tree up to date, including files no
    /// graph claims.
    pub fn with_mirror(mut self, src: PathBuf, dst: PathBuf) -> Self {
        self.mirror = Some(Mirror { src, dst });
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// Drain the event stream until the source ends. In-flight batches
    /// finish before teardown.
    pub async fn run(mut self, mut events: EventStream) -> anyhow::Result<()> {
        info!("watch loop started");
        while let Some(event) = events.next().await {
            if let Err(e) = self.handle_event(&event).await {
                error!("failed to process event for {}: {e}", event.file);
            }
        }
        events.ack();
        info!("watch loop stopped");
        Ok(())
    }

    /// Process one filesystem event to completion: mirror, graph mutation,
    /// invalidation dispatch, reload notification.
    pub async fn handle_event(&mut self, event: &ChangeEvent) -> anyhow::Result<()> {
        debug!("processing {:?} {}", event.kind, event.file);
        self.mirror_file(event).await;
        let invalidation = self.apply(event).await?;
        let pages = self.dispatch(invalidation).await;
        if let Some(tx) = &self.reload_tx {
            for page in pages {
                let _ = tx.send(page);
            }
        }
        Ok(())
    }

    /// Classify the event against graph membership and apply the matching
    /// re-init protocols. A file may belong to more than one namespace.
    async fn apply(&mut self, event: &ChangeEvent) -> anyhow::Result<Invalidation> {
        let file = &event.file;
        let loader = self.loader.clone();
        let mut inv = Invalidation::default();

        let toc_member = self.session.toc.is_member(file);
        let vars_member = self.session.vars.is_member(file);
        let entry_member = self.session.entries.is_member(file);

        if !toc_member && !vars_member && !entry_member {
            if is_toc_file(file) {
                if event.kind != ChangeKind::Remove {
                    self.session.toc.init(&[file.clone()], loader.as_ref()).await?;
                    inv.entries.extend(self.session.toc.entries_of(file));
                    if self.session.toc.is_member(file) {
                        inv.tocs.insert(file.clone());
                    }
                }
            } else if is_presets_file(file) {
                inv.entries
                    .extend(self.session.vars.reinit(file, loader.as_ref()).await?);
            } else {
                let referrers = self.session.toc.pending_referrers(file);
                if referrers.is_empty() {
                    debug!("no graph claims {file}, ignored");
                }
                for owner in referrers {
                    let outcome = self.session.toc.reinit(&owner, loader.as_ref()).await?;
                    inv.entries.extend(outcome.invalidated_entries);
                    inv.tocs.extend(outcome.affected_roots);
                }
            }
            return Ok(inv);
        }

        if toc_member {
            let structural = is_toc_file(file)
                || self.session.toc.node_kind(file) == Some(NodeKind::Source);
            if structural {
                let outcome = self.session.toc.reinit(file, loader.as_ref()).await?;
                inv.entries.extend(outcome.invalidated_entries);
                inv.tocs.extend(outcome.affected_roots);
            } else if event.kind == ChangeKind::Remove {
                let outcome = self.session.toc.reinit(file, loader.as_ref()).await?;
                inv.entries.extend(outcome.invalidated_entries);
                inv.tocs.extend(outcome.affected_roots);
                self.session.vars.release_entry(file);
                self.session.entries.release_entry(file);
            } else {
                inv.entries.insert(file.clone());
            }
        }

        if vars_member && self.session.vars.node_kind(file) == Some(NodeKind::Preset) {
            inv.entries
                .extend(self.session.vars.reinit(file, loader.as_ref()).await?);
        }

        if entry_member {
            inv.entries
                .extend(self.session.entries.dependants_of_file(file));
        }

        Ok(inv)
    }

    /// Dispatch the invalidation set: refresh + render each known entry,
    /// re-dump each surviving TOC root. Per-item failures are logged and do
    /// not abort the batch.
    async fn dispatch(&mut self, invalidation: Invalidation) -> BTreeSet<String> {
        let mut pages = BTreeSet::new();
        for entry in invalidation.entries {
            if self.session.toc.node_kind(&entry) != Some(NodeKind::Entry) {
                continue;
            }
            let loader = self.loader.clone();
            match refresh_entry(&mut self.session, &entry, loader.as_ref()).await {
                Ok(content) => match self.pipeline.process_entry(&entry, &content).await {
                    Ok(()) => {
                        pages.insert(page_path(&entry));
                    }
                    Err(e) => error!("failed to render {entry}: {e}"),
                },
                Err(e) => error!("failed to refresh {entry}: {e}"),
            }
        }
        for toc in invalidation.tocs {
            let Some(data) = self.session.toc.toc_data(&toc).cloned() else {
                continue;
            };
            if let Err(e) = self.pipeline.process_toc(&toc, &data).await {
                error!("failed to dump toc {toc}: {e}");
            }
        }
        pages
    }

    /// ENOENT while copying is a legitimate remove signal, not a crash.
    async fn mirror_file(&self, event: &ChangeEvent) {
        let Some(mirror) = &self.mirror else {
            return;
        };
        let src = mirror.src.join(event.file.as_str());
        let dst = mirror.dst.join(event.file.as_str());
        match event.kind {
            ChangeKind::Remove => {
                let _ = tokio::fs::remove_file(&dst).await;
            }
            ChangeKind::Add | ChangeKind::Change => {
                if let Some(parent) = dst.parent() {
                    let _ = tokio::fs::create_dir_all(parent).await;
                }
                match tokio::fs::copy(&src, &dst).await {
                    Ok(_) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        let _ = tokio::fs::remove_file(&dst).await;
                    }
                    Err(e) => warn!("failed to mirror {}: {e}", event.file),
                }
            }
        }
    }
}
