//! Quire Watcher — filesystem events and the watch orchestrator

pub mod orchestrator;
pub mod watcher;

#[cfg(test)]
pub mod tests;

pub use orchestrator::{Pipeline, WatchOrchestrator};
pub use watcher::{event_channel, ChangeEvent, ChangeKind, EventQueue, EventStream, FileWatcher};
