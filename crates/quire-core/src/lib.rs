//! Quire Core — keyed dependency graph, node model, and collaborator seams

pub mod error;
pub mod graph;
pub mod loader;
pub mod model;


pub use error::{GraphError, Result};
pub use graph::DependencyGraph;
pub use loader::{FsLoader, Loader, Renderer};
pub use model::{is_presets_file, is_toc_file, page_path, Node, NodeKey, NodeKind, MISSED};
