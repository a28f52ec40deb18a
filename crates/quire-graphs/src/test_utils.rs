//! In-memory loader for graph tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use quire_core::{GraphError, Loader, NodeKey, Result};

#[derive(Default)]
pub struct MemLoader {
    files: Mutex<HashMap<NodeKey, String>>,
}

impl MemLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, content: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(NodeKey::file(path), content.to_string());
    }

    pub fn remove(&self, path: &str) {
        self.files.lock().unwrap().remove(&NodeKey::file(path));
    }
}

#[async_trait]
impl Loader for MemLoader {
    async fn read(&self, path: &NodeKey) -> Result<String> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| GraphError::NotFound(path.clone()))
    }

    async fn exists(&self, path: &NodeKey) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }
}
