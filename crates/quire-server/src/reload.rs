//! Live-reload push channel
//!
//! One channel per connected page client, kept in a keyed table mutated
//! only on connect/disconnect. Notification writes the changed page path to
//! every open channel (broadcast) or only to channels whose filter matches.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

struct Client {
    /// Page path this client is scoped to; `None` receives everything.
    page: Option<String>,
    tx: mpsc::Sender<String>,
}

#[derive(Default)]
struct ReloadState {
    clients: DashMap<u64, Client>,
    next_id: AtomicU64,
}

/// Cloneable handle to the client table.
#[derive(Clone, Default)]
pub struct ReloadHandle {
    state: Arc<ReloadState>,
}

impl ReloadHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tell clients that `page` must reload. Dead channels are dropped.
    pub fn notify(&self, page: &str) {
        let mut dead = Vec::new();
        for client in self.state.clients.iter() {
            let matches = client
                .value()
                .page
                .as_deref()
                .map_or(true, |scoped| scoped == page);
            if matches && client.value().tx.try_send(page.to_string()).is_err() {
                dead.push(*client.key());
            }
        }
        for id in dead {
            self.state.clients.remove(&id);
        }
    }

    pub fn client_count(&self) -> usize {
        self.state.clients.len()
    }

    pub(crate) fn register(&self, page: Option<String>) -> (u64, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(16);
        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
        self.state.clients.insert(id, Client { page, tx });
        debug!("reload client {id} connected");
        (id, rx)
    }

    pub(crate) fn deregister(&self, id: u64) {
        self.state.clients.remove(&id);
        debug!("reload client {id} disconnected");
    }
}
