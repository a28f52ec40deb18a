//! Error taxonomy for the graph core

use crate::model::NodeKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("unknown node: {0}")]
    UnknownNode(NodeKey),

    #[error("circular include: {}", format_stack(.stack))]
    CircularInclude { stack: Vec<NodeKey> },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: NodeKey,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("file not found: {0}")]
    NotFound(NodeKey),

    #[error("unknown includer: {0}")]
    UnknownIncluder(String),

    #[error("includer {name} failed: {message}")]
    Includer { name: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GraphError>;

fn format_stack(stack: &[NodeKey]) -> String {
    stack
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}
