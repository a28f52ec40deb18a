//! On-disk schema for TOC and preset files

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A parsed table-of-contents file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Toc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<TocItem>,
}

/// One item inside a TOC: a leaf page, a nested group, or an include.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TocItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<TocItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Include>,
}

/// An `include` directive: a static sub-TOC path and/or includer plugins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Include {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includers: Vec<IncluderRef>,
}

/// Reference to a registered includer plugin and its input file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncluderRef {
    pub name: String,
    pub input: String,
    #[serde(default)]
    pub options: serde_yaml::Value,
}

/// A parsed presets file: scope name -> value tree.
pub type RawPresets = BTreeMap<String, serde_yaml::Value>;
