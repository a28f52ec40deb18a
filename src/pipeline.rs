//! Build pipeline: rendering callbacks shared by full builds and watch runs

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use quire_core::{page_path, NodeKey, Renderer};
use quire_graphs::Toc;
use quire_watcher::Pipeline;

/// Renders one entry into the output tree at its page path.
pub struct FileRenderer {
    out: PathBuf,
}

impl FileRenderer {
    pub fn new(out: PathBuf) -> Self {
        FileRenderer { out }
    }
}

#[async_trait]
impl Renderer for FileRenderer {
    async fn render(&self, entry: &NodeKey, content: &str) -> anyhow::Result<()> {
        let target = self.out.join(page_path(entry));
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, content).await?;
        tracing::debug!("rendered {} -> {}", entry, target.display());
        Ok(())
    }
}

/// Dump a TOC root's resolved navigation next to the rendered pages.
pub async fn dump_toc(out: &PathBuf, toc: &NodeKey, data: &Toc) -> anyhow::Result<()> {
    let target = out.join(toc.file_part());
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let yaml = serde_yaml::to_string(data)?;
    tokio::fs::write(&target, yaml).await?;
    Ok(())
}

/// Orchestrator-facing pipeline wiring invalidations to the renderer.
pub struct RenderPipeline {
    renderer: Arc<dyn Renderer>,
    out: PathBuf,
}

impl RenderPipeline {
    pub fn new(renderer: Arc<dyn Renderer>, out: PathBuf) -> Self {
        RenderPipeline { renderer, out }
    }
}

#[async_trait]
impl Pipeline for RenderPipeline {
    async fn process_toc(&mut self, toc: &NodeKey, data: &Toc) -> anyhow::Result<()> {
        dump_toc(&self.out, toc, data).await
    }

    async fn process_entry(&mut self, entry: &NodeKey, content: &str) -> anyhow::Result<()> {
        self.renderer.render(entry, content).await
    }
}
