//! Quire Server — live-reload push channel and static output serving

pub mod reload;
pub mod router;

use std::path::PathBuf;

use tokio::sync::broadcast;
use tracing::info;

pub use reload::ReloadHandle;
pub use router::create_router;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

pub struct LiveReloadServer {
    handle: ReloadHandle,
    config: ServerConfig,
    output: PathBuf,
}

impl LiveReloadServer {
    pub fn new(output: PathBuf, config: ServerConfig) -> Self {
        LiveReloadServer {
            handle: ReloadHandle::new(),
            config,
            output,
        }
    }

    pub fn handle(&self) -> ReloadHandle {
        self.handle.clone()
    }

    /// Serve until the process shuts down, forwarding page paths received
    /// from the orchestrator's broadcast channel to connected clients.
    pub async fn serve(self, mut reload_rx: broadcast::Receiver<String>) -> anyhow::Result<()> {
        let handle = self.handle.clone();
        tokio::spawn(async move {
            while let Ok(page) = reload_rx.recv().await {
                handle.notify(&page);
            }
        });

        let router = create_router(self.handle, self.output);
        let listener =
            tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        info!("live-reload server listening on {}", listener.local_addr()?);
        axum::serve(listener, router).await?;
        Ok(())
    }
}
