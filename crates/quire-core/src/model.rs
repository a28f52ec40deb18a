//! Node identity and typing shared by all three dependency graphs

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Sentinel "file" for variables no preset file defines.
pub const MISSED: &str = "missed";

/// Graph node identifier.
///
/// Either a normalized relative file path (`"foo/toc.yaml"`) or a composite
/// provenance key (`"foo/presets.yaml#default.a.b"`) used by the vars graph
/// to pin one resolved variable value to the file and scope that supplied it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey(String);

impl NodeKey {
    /// Build a key from a file path, normalizing separators and `.`/`..`
    /// components. Paths are kept relative to the project root.
    pub fn file(path: impl AsRef<Path>) -> Self {
        NodeKey(normalize(&path.as_ref().to_string_lossy()))
    }

    /// Composite key for a resolved variable value: `<file>#<scope>.<var>`.
    pub fn value(file: &NodeKey, scope: &str, var: &str) -> Self {
        NodeKey(format!("{}#{}.{}", file.0, scope, var))
    }

    /// Sentinel key for a variable that no preset file defines.
    pub fn missed(var: &str) -> Self {
        NodeKey(format!("{}#{}", MISSED, var))
    }

    /// Resolve `href` relative to the directory containing `self`.
    pub fn sibling(&self, href: &str) -> Self {
        let dir = self.dir();
        if dir.is_empty() {
            NodeKey(normalize(href))
        } else {
            NodeKey(normalize(&format!("{}/{}", dir, href)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The file-path half of the key (everything before `#`).
    pub fn file_part(&self) -> &str {
        match self.0.split_once('#') {
            Some((file, _)) => file,
            None => &self.0,
        }
    }

    pub fn is_composite(&self) -> bool {
        self.0.contains('#')
    }

    pub fn is_missed(&self) -> bool {
        self.file_part() == MISSED
    }

    /// For a composite key, the `(scope, var)` pair after `#`. The missed
    /// sentinel carries only a var, reported with an empty scope.
    pub fn scope_and_var(&self) -> Option<(&str, &str)> {
        let (file, rest) = self.0.split_once('#')?;
        if file == MISSED {
            return Some(("", rest));
        }
        rest.split_once('.')
    }

    /// Directory part of the file path (`""` at project root).
    pub fn dir(&self) -> &str {
        match self.file_part().rsplit_once('/') {
            Some((dir, _)) => dir,
            None => "",
        }
    }

    pub fn file_name(&self) -> &str {
        match self.file_part().rsplit_once('/') {
            Some((_, name)) => name,
            None => self.file_part(),
        }
    }

    /// Number of path components in the directory part.
    pub fn depth(&self) -> usize {
        let dir = self.dir();
        if dir.is_empty() {
            0
        } else {
            dir.split('/').count()
        }
    }

    /// True when `dir` is this key's directory or one of its ancestors.
    pub fn is_under(&self, dir: &str) -> bool {
        dir.is_empty() || self.dir() == dir || self.dir().starts_with(&format!("{}/", dir))
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for part in replaced.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// What a graph node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// A root table-of-contents file.
    Toc,
    /// A TOC-like file included into another TOC but not itself a root,
    /// or the declared input of an includer plugin.
    Source,
    /// A renderable content file (page).
    Entry,
    /// A variable presets file.
    Preset,
    /// One resolved variable value (composite key).
    Value,
    /// The "no file defines this variable" sentinel.
    Missed,
    /// An include/fragment file pulled in while rendering an entry.
    Include,
}

/// A node with its typed payload. The graph does not interpret `data`.
#[derive(Debug, Clone)]
pub struct Node<T> {
    pub key: NodeKey,
    pub kind: NodeKind,
    pub data: T,
}

/// Whether a file name follows the TOC convention.
pub fn is_toc_file(key: &NodeKey) -> bool {
    matches!(key.file_name(), "toc.yaml" | "toc.yml")
}

/// Whether a file name follows the presets convention.
pub fn is_presets_file(key: &NodeKey) -> bool {
    matches!(key.file_name(), "presets.yaml" | "presets.yml")
}

/// Output page path for an entry (`.md` → `.html`, others unchanged).
pub fn page_path(entry: &NodeKey) -> String {
    let path = entry.file_part();
    match path.strip_suffix(".md") {
        Some(stem) => format!("{}.html", stem),
        None => path.to_string(),
    }
}
