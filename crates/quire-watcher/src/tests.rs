//! Unit tests for the event queue and watch orchestrator

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use quire_core::{FsLoader, Loader, NodeKey};
use quire_graphs::{refresh_entry, IncluderRegistry, Session, Toc};

use crate::orchestrator::{Pipeline, WatchOrchestrator};
use crate::watcher::{event_channel, ChangeEvent, ChangeKind};

fn key(path: &str) -> NodeKey {
    NodeKey::file(path)
}

#[derive(Default)]
struct RecordingPipeline {
    entries: Vec<NodeKey>,
    tocs: Vec<NodeKey>,
}

#[async_trait]
impl Pipeline for RecordingPipeline {
    async fn process_toc(&mut self, toc: &NodeKey, _data: &Toc) -> anyhow::Result<()> {
        self.tocs.push(toc.clone());
        Ok(())
    }

    async fn process_entry(&mut self, entry: &NodeKey, _content: &str) -> anyhow::Result<()> {
        self.entries.push(entry.clone());
        Ok(())
    }
}

fn write(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// Initial-build equivalent: presets, tocs, then entry refresh.
async fn build_session(dir: &Path, presets: &[&str], tocs: &[&str]) -> (Session, Arc<FsLoader>) {
    let loader = Arc::new(FsLoader::new(dir));
    let mut session = Session::new(Arc::new(IncluderRegistry::with_builtins()), "default");
    for preset in presets {
        session.vars.reinit(&key(preset), loader.as_ref()).await.unwrap();
    }
    let toc_keys: Vec<NodeKey> = tocs.iter().map(|t| key(t)).collect();
    session.toc.init(&toc_keys, loader.as_ref()).await.unwrap();
    for entry in session.toc.all_entries() {
        refresh_entry(&mut session, &entry, loader.as_ref()).await.unwrap();
    }
    (session, loader)
}

fn orchestrate(
    session: Session,
    loader: Arc<FsLoader>,
) -> WatchOrchestrator<RecordingPipeline> {
    let loader: Arc<dyn Loader> = loader;
    WatchOrchestrator::new(session, loader, RecordingPipeline::default())
}

#[tokio::test]
async fn test_event_queue_acknowledge_then_next() {
    let (queue, mut stream) = event_channel();

    let producer = tokio::spawn(async move {
        queue
            .push(ChangeEvent::new(ChangeKind::Change, key("index.md")))
            .await
    });

    let event = stream.next().await.unwrap();
    assert_eq!(event.file, key("index.md"));

    // producer stays blocked until the event is acknowledged
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!producer.is_finished());

    stream.ack();
    assert!(tokio::time::timeout(Duration::from_secs(1), producer)
        .await
        .unwrap()
        .unwrap());
}

#[tokio::test]
async fn test_preset_change_rerenders_exactly_one_entry() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "presets.yaml", "default:\n  var: value\n");
    write(dir.path(), "toc.yaml", "items:\n  - href: index.md\n");
    write(dir.path(), "index.md", "Title {{var}}\n");
    write(dir.path(), "other.md", "no vars here\n");

    let (session, loader) = build_session(dir.path(), &["presets.yaml"], &["toc.yaml"]).await;
    let mut orchestrator = orchestrate(session, loader);

    write(dir.path(), "presets.yaml", "default:\n  var: value2\n");
    orchestrator
        .handle_event(&ChangeEvent::new(ChangeKind::Change, key("presets.yaml")))
        .await
        .unwrap();

    assert_eq!(orchestrator.pipeline().entries, vec![key("index.md")]);
}

#[tokio::test]
async fn test_identical_change_is_idempotent() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "presets.yaml", "default:\n  var: value\n");
    write(dir.path(), "toc.yaml", "items:\n  - href: index.md\n");
    write(dir.path(), "index.md", "Title {{var}}\n");

    let (session, loader) = build_session(dir.path(), &["presets.yaml"], &["toc.yaml"]).await;
    let mut orchestrator = orchestrate(session, loader);

    write(dir.path(), "presets.yaml", "default:\n  var: value2\n");
    let event = ChangeEvent::new(ChangeKind::Change, key("presets.yaml"));
    orchestrator.handle_event(&event).await.unwrap();
    assert_eq!(orchestrator.pipeline().entries.len(), 1);

    // same content again: no additional invalidation
    orchestrator.handle_event(&event).await.unwrap();
    assert_eq!(orchestrator.pipeline().entries.len(), 1);
}

#[tokio::test]
async fn test_new_toc_file_is_initialized() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "toc.yaml", "items:\n  - href: index.md\n");
    write(dir.path(), "index.md", "root\n");

    let (session, loader) = build_session(dir.path(), &[], &["toc.yaml"]).await;
    let mut orchestrator = orchestrate(session, loader);

    write(dir.path(), "guide/toc.yaml", "items:\n  - href: intro.md\n");
    write(dir.path(), "guide/intro.md", "intro\n");
    orchestrator
        .handle_event(&ChangeEvent::new(ChangeKind::Add, key("guide/toc.yaml")))
        .await
        .unwrap();

    assert!(orchestrator.session().toc.roots().contains(&key("guide/toc.yaml")));
    assert_eq!(orchestrator.pipeline().entries, vec![key("guide/intro.md")]);
    assert_eq!(orchestrator.pipeline().tocs, vec![key("guide/toc.yaml")]);
}

#[tokio::test]
async fn test_unknown_file_is_ignored_but_mirrored() {
    let dir = TempDir::new().unwrap();
    let mirror = TempDir::new().unwrap();
    write(dir.path(), "toc.yaml", "items: []\n");
    write(dir.path(), "notes.txt", "scratch\n");

    let (session, loader) = build_session(dir.path(), &[], &["toc.yaml"]).await;
    let mut orchestrator = orchestrate(session, loader)
        .with_mirror(dir.path().to_path_buf(), mirror.path().to_path_buf());

    orchestrator
        .handle_event(&ChangeEvent::new(ChangeKind::Add, key("notes.txt")))
        .await
        .unwrap();

    assert!(orchestrator.pipeline().entries.is_empty());
    assert!(mirror.path().join("notes.txt").exists());

    // ENOENT while copying behaves as a remove signal
    std::fs::remove_file(dir.path().join("notes.txt")).unwrap();
    orchestrator
        .handle_event(&ChangeEvent::new(ChangeKind::Change, key("notes.txt")))
        .await
        .unwrap();
    assert!(!mirror.path().join("notes.txt").exists());
}

#[tokio::test]
async fn test_pending_href_resolved_by_add_event() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "toc.yaml", "items:\n  - href: index.md\n");

    let (session, loader) = build_session(dir.path(), &[], &["toc.yaml"]).await;
    assert!(!session.toc.is_member(&key("index.md")));
    let mut orchestrator = orchestrate(session, loader);

    write(dir.path(), "index.md", "# here now\n");
    orchestrator
        .handle_event(&ChangeEvent::new(ChangeKind::Add, key("index.md")))
        .await
        .unwrap();

    assert!(orchestrator.session().toc.is_member(&key("index.md")));
    assert_eq!(orchestrator.pipeline().entries, vec![key("index.md")]);
}

#[tokio::test]
async fn test_include_change_rerenders_dependants() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "toc.yaml", "items:\n  - href: index.md\n");
    write(dir.path(), "index.md", "{% include [note](_note.md) %}\n");
    write(dir.path(), "_note.md", "v1\n");

    let (session, loader) = build_session(dir.path(), &[], &["toc.yaml"]).await;
    let mut orchestrator = orchestrate(session, loader);

    write(dir.path(), "_note.md", "v2\n");
    orchestrator
        .handle_event(&ChangeEvent::new(ChangeKind::Change, key("_note.md")))
        .await
        .unwrap();

    assert_eq!(orchestrator.pipeline().entries, vec![key("index.md")]);
}

#[tokio::test]
async fn test_entry_remove_releases_all_namespaces() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "presets.yaml", "default:\n  var: value\n");
    write(dir.path(), "toc.yaml", "items:\n  - href: index.md\n");
    write(dir.path(), "index.md", "Title {{var}}\n");

    let (session, loader) = build_session(dir.path(), &["presets.yaml"], &["toc.yaml"]).await;
    let mut orchestrator = orchestrate(session, loader);

    std::fs::remove_file(dir.path().join("index.md")).unwrap();
    orchestrator
        .handle_event(&ChangeEvent::new(ChangeKind::Remove, key("index.md")))
        .await
        .unwrap();

    let session = orchestrator.session();
    assert!(!session.toc.is_member(&key("index.md")));
    assert!(!session.vars.is_member(&key("index.md")));
    assert!(!session.entries.is_member(&key("index.md")));
    // nothing renderable was left to process
    assert!(orchestrator.pipeline().entries.is_empty());
}
