//! Includer plugin registry
//!
//! Includers synthesize a TOC fragment from an external source format. They
//! are resolved by name at startup; the TOC graph auto-wires a dependency
//! edge from the owning TOC file to the includer's declared input file.

use std::collections::HashMap;
use std::sync::Arc;

use quire_core::{GraphError, Result};

use crate::schema::{Toc, TocItem};

pub trait Includer: Send + Sync {
    fn name(&self) -> &str;

    /// Synthesize a TOC fragment. `input` is the content of the declared
    /// input file, or `None` when that file does not exist yet.
    fn generate(&self, input: Option<&str>, options: &serde_yaml::Value) -> Result<Toc>;
}

#[derive(Default)]
pub struct IncluderRegistry {
    by_name: HashMap<String, Arc<dyn Includer>>,
}

impl IncluderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in includers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(LinesIncluder));
        registry
    }

    pub fn register(&mut self, includer: Arc<dyn Includer>) {
        self.by_name.insert(includer.name().to_string(), includer);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Includer>> {
        self.by_name
            .get(name)
            .cloned()
            .ok_or_else(|| GraphError::UnknownIncluder(name.to_string()))
    }
}

/// Built-in includer: each non-empty line of the input file is the href of
/// one entry, relative to the owning TOC.
pub struct LinesIncluder;

impl Includer for LinesIncluder {
    fn name(&self) -> &str {
        "lines"
    }

    fn generate(&self, input: Option<&str>, _options: &serde_yaml::Value) -> Result<Toc> {
        let items = input
            .unwrap_or_default()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| TocItem {
                href: Some(line.to_string()),
                ..Default::default()
            })
            .collect();
        Ok(Toc {
            title: None,
            items,
        })
    }
}
