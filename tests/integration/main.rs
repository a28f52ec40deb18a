//! End-to-end tests: full builds through the binary and incremental watch
//! scenarios against a real filesystem project.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use quire_core::{FsLoader, NodeKey};
use quire_graphs::{refresh_entry, IncluderRegistry, Session, Toc};
use quire_watcher::{ChangeEvent, ChangeKind, Pipeline, WatchOrchestrator};

fn key(path: &str) -> NodeKey {
    NodeKey::file(path)
}

fn write(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn sample_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "toc.yaml",
        "title: Docs\nitems:\n  - name: Index\n    href: index.md\n  - name: Guide\n    href: guide/setup.md\n",
    );
    write(
        dir.path(),
        "presets.yaml",
        "default:\n  product:\n    name: Quire\ninternal:\n  product:\n    name: Quire (internal)\n",
    );
    write(dir.path(), "index.md", "# {{ product.name }}\n\nWelcome.\n");
    write(
        dir.path(),
        "guide/setup.md",
        "# Setup\n\n{% include [steps](steps.md) %}\n",
    );
    write(dir.path(), "guide/steps.md", "1. Install\n2. Run\n");
    dir
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

async fn build_session(dir: &Path) -> (Session, Arc<FsLoader>) {
    let loader = Arc::new(FsLoader::new(dir));
    let mut session = Session::new(Arc::new(IncluderRegistry::with_builtins()), "default");
    session
        .vars
        .reinit(&key("presets.yaml"), loader.as_ref())
        .await
        .unwrap();
    session
        .toc
        .init(&[key("toc.yaml")], loader.as_ref())
        .await
        .unwrap();
    for entry in session.toc.all_entries() {
        refresh_entry(&mut session, &entry, loader.as_ref())
            .await
            .unwrap();
    }
    (session, loader)
}

#[test]
fn cli_reports_usage() {
    let output = Command::new(env!("CARGO_BIN_EXE_quire"))
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("quire"));
    assert!(stdout.contains("build"));
    assert!(stdout.contains("watch"));
}

#[test]
fn full_build_renders_pages_and_dumps_toc() {
    let dir = sample_project();
    let out = TempDir::new().unwrap();
    let status = Command::new(env!("CARGO_BIN_EXE_quire"))
        .arg("--input")
        .arg(dir.path())
        .arg("--output")
        .arg(out.path())
        .arg("build")
        .status()
        .unwrap();
    assert!(status.success());

    assert!(out.path().join("index.html").exists());
    assert!(out.path().join("guide/setup.html").exists());
    assert!(out.path().join("toc.yaml").exists());
    // Include targets are dependencies, not pages of their own.
    assert!(!out.path().join("guide/steps.html").exists());

    let toc = std::fs::read_to_string(out.path().join("toc.yaml")).unwrap();
    assert!(toc.contains("guide/setup.md"));
}

#[test]
fn build_fails_on_broken_root_toc() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "toc.yaml", "items: [not, a, toc");
    let out = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_quire"))
        .arg("--input")
        .arg(dir.path())
        .arg("--output")
        .arg(out.path())
        .arg("build")
        .output()
        .unwrap();
    // The build survives a broken root: it logs the parse failure and
    // produces whatever the remaining roots yield.
    assert!(output.status.success());
    assert!(!out.path().join("toc.yaml").exists());
}

fn wait_for(path: &Path, attempts: u32) -> bool {
    for _ in 0..attempts {
        if path.exists() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    false
}

#[test]
fn watch_mirrors_unclaimed_files_into_working_input() {
    let dir = sample_project();
    let out = TempDir::new().unwrap();
    let mut child = Command::new(env!("CARGO_BIN_EXE_quire"))
        .arg("--input")
        .arg(dir.path())
        .arg("--output")
        .arg(out.path())
        .arg("watch")
        .arg("--port")
        .arg("0")
        .spawn()
        .unwrap();

    // initial build finishes before the watcher starts
    assert!(wait_for(&out.path().join("index.html"), 100));

    // a file no graph claims still lands in the input mirror
    write(dir.path(), "notes.txt", "scratch\n");
    let mirrored = wait_for(&out.path().join("_input/notes.txt"), 100);

    child.kill().unwrap();
    let _ = child.wait();
    assert!(mirrored);
}

#[tokio::test]
async fn preset_edit_rerenders_only_var_users() {
    let dir = sample_project();
    let (session, loader) = build_session(dir.path()).await;
    let mut orch = WatchOrchestrator::new(session, loader, RecordingPipeline::default());

    write(
        dir.path(),
        "presets.yaml",
        "default:\n  product:\n    name: Quire 2\n",
    );
    orch.handle_event(&ChangeEvent::new(ChangeKind::Change, key("presets.yaml")))
        .await
        .unwrap();

    assert_eq!(orch.pipeline().entries, vec![key("index.md")]);
    assert!(orch.pipeline().tocs.is_empty());
}

#[tokio::test]
async fn include_edit_rerenders_including_entry() {
    let dir = sample_project();
    let (session, loader) = build_session(dir.path()).await;
    let mut orch = WatchOrchestrator::new(session, loader, RecordingPipeline::default());

    write(dir.path(), "guide/steps.md", "1. Install\n2. Configure\n3. Run\n");
    orch.handle_event(&ChangeEvent::new(ChangeKind::Change, key("guide/steps.md")))
        .await
        .unwrap();

    assert_eq!(orch.pipeline().entries, vec![key("guide/setup.md")]);
}

#[tokio::test]
async fn toc_edit_invalidates_added_and_removed_entries() {
    let dir = sample_project();
    write(dir.path(), "about.md", "# About\n");
    let (session, loader) = build_session(dir.path()).await;
    let mut orch = WatchOrchestrator::new(session, loader, RecordingPipeline::default());

    write(
        dir.path(),
        "toc.yaml",
        "title: Docs\nitems:\n  - name: Index\n    href: index.md\n  - name: About\n    href: about.md\n",
    );
    orch.handle_event(&ChangeEvent::new(ChangeKind::Change, key("toc.yaml")))
        .await
        .unwrap();

    // guide/setup.md left the entry set and is not re-rendered; the new
    // about.md entry is.
    assert!(orch.pipeline().entries.contains(&key("about.md")));
    assert!(!orch.pipeline().entries.contains(&key("guide/setup.md")));
    assert!(orch.pipeline().tocs.contains(&key("toc.yaml")));
}

#[tokio::test]
async fn new_toc_file_becomes_a_root() {
    let dir = sample_project();
    let (session, loader) = build_session(dir.path()).await;
    let mut orch = WatchOrchestrator::new(session, loader, RecordingPipeline::default());

    write(
        dir.path(),
        "api/toc.yaml",
        "title: API\nitems:\n  - name: Reference\n    href: reference.md\n",
    );
    write(dir.path(), "api/reference.md", "# Reference\n");
    orch.handle_event(&ChangeEvent::new(ChangeKind::Add, key("api/toc.yaml")))
        .await
        .unwrap();

    assert!(orch.session().toc.roots().contains(&key("api/toc.yaml")));
    assert!(orch.pipeline().entries.contains(&key("api/reference.md")));
    assert!(orch.pipeline().tocs.contains(&key("api/toc.yaml")));
}

#[tokio::test]
async fn pending_href_resolves_when_file_appears() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "toc.yaml",
        "title: Docs\nitems:\n  - name: Soon\n    href: soon.md\n",
    );
    write(dir.path(), "presets.yaml", "default: {}\n");
    let (session, loader) = build_session(dir.path()).await;
    let mut orch = WatchOrchestrator::new(session, loader, RecordingPipeline::default());
    assert!(orch.session().toc.all_entries().is_empty());

    write(dir.path(), "soon.md", "# Soon\n");
    orch.handle_event(&ChangeEvent::new(ChangeKind::Add, key("soon.md")))
        .await
        .unwrap();

    assert!(orch.session().toc.all_entries().contains(&key("soon.md")));
    assert_eq!(orch.pipeline().entries, vec![key("soon.md")]);
}

#[tokio::test]
async fn entry_removal_releases_all_claims() {
    let dir = sample_project();
    let (session, loader) = build_session(dir.path()).await;
    let mut orch = WatchOrchestrator::new(session, loader, RecordingPipeline::default());

    std::fs::remove_file(dir.path().join("index.md")).unwrap();
    orch.handle_event(&ChangeEvent::new(ChangeKind::Remove, key("index.md")))
        .await
        .unwrap();

    assert!(!orch.session().toc.all_entries().contains(&key("index.md")));
    assert!(!orch.session().vars.is_member(&key("index.md")));
    assert!(!orch.pipeline().entries.contains(&key("index.md")));
}
