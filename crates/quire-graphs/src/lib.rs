//! Quire Graphs — TOC, variable-provenance, and entry dependency graphs

pub mod entry;
pub mod includer;
pub mod linker;
pub mod schema;
pub mod toc;
pub mod vars;

#[cfg(test)]
pub mod test_utils;


pub use entry::EntryGraph;
pub use includer::{Includer, IncluderRegistry, LinesIncluder};
pub use linker::{refresh_entry, scan_includes, scan_vars, Session};
pub use schema::{Include, IncluderRef, RawPresets, Toc, TocItem};
pub use toc::{TocGraph, TocNode, TocReinit};
pub use vars::{PresetData, VarsGraph, VarsNode};
