//! Axum router for the live-reload server

use std::collections::HashMap;
use std::convert::Infallible;
use std::path::PathBuf;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::stream::{self, Stream};
use tower_http::{cors::CorsLayer, services::ServeDir};

use crate::reload::ReloadHandle;

/// Routes: the reload event stream, a health probe, and static serving of
/// the build output.
pub fn create_router(handle: ReloadHandle, output: PathBuf) -> Router {
    Router::new()
        .route("/_reload", get(reload_handler))
        .route("/api/health", get(health_check))
        .fallback_service(ServeDir::new(output))
        .layer(CorsLayer::permissive())
        .with_state(handle)
}

/// Deregisters the client when its event stream is dropped.
struct ClientGuard {
    handle: ReloadHandle,
    id: u64,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.handle.deregister(self.id);
    }
}

/// Text event stream: each message body is the page path that changed.
/// `?page=<path>` scopes the channel to one page; without it the client
/// receives every change.
async fn reload_handler(
    State(handle): State<ReloadHandle>,
    Query(params): Query<HashMap<String, String>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let page = params.get("page").cloned();
    let (id, rx) = handle.register(page);
    let guard = ClientGuard {
        handle: handle.clone(),
        id,
    };
    let stream = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let page = rx.recv().await?;
        Some((Ok(Event::default().data(page)), (rx, guard)))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
