//! FileWatcher (C8) and IngestController (C9): polls the storage tree for
//! new raw inspection files and turns them into queued basemap work.

pub mod ingest;
pub mod watcher;

pub use ingest::IngestController;
pub use watcher::{FileWatcher, WatcherEvent};
