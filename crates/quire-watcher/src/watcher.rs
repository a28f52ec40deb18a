//! Filesystem watcher and the one-slot event queue
//!
//! notify events are translated to the `{add|change|remove, file}` contract
//! with project-relative keys, then fed through a bounded channel of
//! capacity 1 with an explicit acknowledge-then-next protocol: the producer
//! does not deliver the next event until the consumer has fully resolved
//! the previous one.

use std::path::{Path, PathBuf};

use anyhow::Result;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use quire_core::NodeKey;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Change,
    Remove,
}

/// One filesystem event, keyed by project-relative path.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub file: NodeKey,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, file: NodeKey) -> Self {
        ChangeEvent { kind, file }
    }
}

type Slot = (ChangeEvent, oneshot::Sender<()>);

/// Producer side of the one-slot queue.
#[derive(Clone)]
pub struct EventQueue {
    tx: mpsc::Sender<Slot>,
}

impl EventQueue {
    /// Deliver one event and wait until the consumer acknowledges it.
    /// Returns false when the consumer is gone.
    pub async fn push(&self, event: ChangeEvent) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send((event, ack_tx)).await.is_err() {
            return false;
        }
        ack_rx.await.is_ok()
    }
}

/// Consumer side of the one-slot queue. `next` acknowledges the previously
/// returned event before pulling a new one, so producers are gated behind
/// full resolution of the prior event.
pub struct EventStream {
    rx: mpsc::Receiver<Slot>,
    pending: Option<oneshot::Sender<()>>,
}

impl EventStream {
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.ack();
        let (event, ack) = self.rx.recv().await?;
        self.pending = Some(ack);
        Some(event)
    }

    /// Acknowledge the in-flight event, releasing the producer.
    pub fn ack(&mut self) {
        if let Some(ack) = self.pending.take() {
            let _ = ack.send(());
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.ack();
    }
}

pub fn event_channel() -> (EventQueue, EventStream) {
    let (tx, rx) = mpsc::channel(1);
    (EventQueue { tx }, EventStream { rx, pending: None })
}

/// Watches a project root and pumps translated events into an `EventQueue`.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FileWatcher {
    pub fn spawn(root: impl AsRef<Path>, queue: EventQueue) -> Result<Self> {
        let root = root.as_ref().canonicalize()?;
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<ChangeEvent>();

        let event_root = root.clone();
        let mut watcher =
            notify::recommended_watcher(move |res: std::result::Result<notify::Event, notify::Error>| {
                match res {
                    Ok(event) => translate(&event_root, event, &raw_tx),
                    Err(e) => error!("filesystem watch error: {e}"),
                }
            })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        tokio::spawn(async move {
            while let Some(event) = raw_rx.recv().await {
                if !queue.push(event).await {
                    break;
                }
            }
            debug!("watcher pump stopped");
        });

        Ok(FileWatcher {
            _watcher: watcher,
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn translate(root: &Path, event: notify::Event, tx: &mpsc::UnboundedSender<ChangeEvent>) {
    let kind = match event.kind {
        notify::EventKind::Create(_) => ChangeKind::Add,
        notify::EventKind::Modify(_) => ChangeKind::Change,
        notify::EventKind::Remove(_) => ChangeKind::Remove,
        _ => return,
    };
    for path in event.paths {
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        if should_ignore(rel) {
            continue;
        }
        let change = ChangeEvent::new(kind, NodeKey::file(rel));
        if let Err(e) = tx.send(change) {
            warn!("failed to forward watch event: {e}");
        }
    }
}

/// Hidden files and editor droppings never reach the graphs.
fn should_ignore(rel: &Path) -> bool {
    rel.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map_or(true, |name| name.starts_with('.') || name.ends_with('~'))
    })
}
