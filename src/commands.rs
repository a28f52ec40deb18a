//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info};

use quire_core::FsLoader;
use quire_graphs::{IncluderRegistry, Session};
use quire_server::{LiveReloadServer, ServerConfig};
use quire_watcher::{event_channel, FileWatcher, WatchOrchestrator};

use crate::build::full_build;
use crate::pipeline::{FileRenderer, RenderPipeline};

pub async fn build(input: PathBuf, output: PathBuf, vars_preset: String) -> anyhow::Result<()> {
    let mut session = Session::new(Arc::new(IncluderRegistry::with_builtins()), &vars_preset);
    let loader = Arc::new(FsLoader::new(&input));
    let renderer = Arc::new(FileRenderer::new(output.clone()));

    let report = full_build(&input, &output, &mut session, loader, renderer).await?;
    if report.failed > 0 {
        anyhow::bail!("{} entries failed to build", report.failed);
    }
    Ok(())
}

pub async fn watch(
    input: PathBuf,
    output: PathBuf,
    vars_preset: String,
    host: String,
    port: u16,
) -> anyhow::Result<()> {
    let mut session = Session::new(Arc::new(IncluderRegistry::with_builtins()), &vars_preset);
    let loader = Arc::new(FsLoader::new(&input));
    let renderer = Arc::new(FileRenderer::new(output.clone()));

    full_build(&input, &output, &mut session, loader.clone(), renderer.clone()).await?;

    let (reload_tx, reload_rx) = broadcast::channel(64);
    let server = LiveReloadServer::new(output.clone(), ServerConfig { host, port });
    tokio::spawn(async move {
        if let Err(e) = server.serve(reload_rx).await {
            error!("server exited: {e}");
        }
    });

    let (queue, stream) = event_channel();
    let _watcher = FileWatcher::spawn(&input, queue)?;
    info!("watching {} for changes", input.display());

    let mirror = output.join("_input");
    let pipeline = RenderPipeline::new(renderer, output);
    let orchestrator = WatchOrchestrator::new(session, loader, pipeline)
        .with_reload(reload_tx)
        .with_mirror(input, mirror);
    orchestrator.run(stream).await
}
