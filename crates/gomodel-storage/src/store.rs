use async_trait::async_trait;
use time::OffsetDateTime;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Multi-insert where some rows failed. The logger counts the failures
    /// and moves on; dropped rows are not retried.
    #[error("partial write: {failed} of {total} rows failed")]
    Partial { total: usize, failed: usize },
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    pub fn failed_rows(&self, batch_len: usize) -> usize {
        match self {
            StoreError::Partial { failed, .. } => *failed,
            _ => batch_len,
        }
    }
}

/// Pluggable persistence backend for one record type. The logger treats it
/// as opaque: batches in, flush and close on shutdown, a cutoff delete for
/// retention.
#[async_trait]
pub trait LogStore<T>: Send + Sync + 'static {
    async fn write_batch(&self, batch: Vec<T>) -> Result<(), StoreError>;

    async fn flush(&self) -> Result<(), StoreError>;

    async fn close(&self) -> Result<(), StoreError>;

    /// Deletes rows whose timestamp precedes `cutoff`; returns the count.
    async fn delete_before(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError>;
}
