//! Async buffered persistence for usage and audit records.
//!
//! Producers enqueue without blocking; a dedicated flusher drains the queue
//! in batches. A full queue rejects new entries (with a warning) rather than
//! ever stalling the request path.

pub mod db;
pub mod entities;
pub mod logger;
pub mod retention;
pub mod sql;
pub mod store;

pub use db::connect;
pub use logger::{BufferedLogger, LogRecord, LoggerConfig};
pub use retention::{DEFAULT_CLEANUP_INTERVAL, spawn_retention};
pub use sql::SqlStore;
pub use store::{LogStore, StoreError};
