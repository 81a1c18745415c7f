use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use gomodel_storage::{BufferedLogger, LogStore, LoggerConfig, StoreError, spawn_retention};
use gomodel_usage::UsageEntry;

fn entry(request_id: &str) -> UsageEntry {
    UsageEntry {
        id: Uuid::new_v4(),
        request_id: request_id.to_string(),
        provider_id: String::new(),
        timestamp: OffsetDateTime::now_utc(),
        model: "gpt-4o".to_string(),
        provider: "openai-main".to_string(),
        endpoint: "/v1/chat/completions".to_string(),
        input_tokens: 1,
        output_tokens: 1,
        total_tokens: 2,
        input_cost: None,
        output_cost: None,
        total_cost: None,
        caveat: String::new(),
        raw_data: BTreeMap::new(),
    }
}

#[derive(Default)]
struct MemStore {
    rows: Mutex<Vec<UsageEntry>>,
    flushes: AtomicU64,
    closes: AtomicU64,
    partial_every: Option<usize>,
}

#[async_trait]
impl LogStore<UsageEntry> for MemStore {
    async fn write_batch(&self, batch: Vec<UsageEntry>) -> Result<(), StoreError> {
        let total = batch.len();
        self.rows.lock().unwrap().extend(batch);
        if let Some(every) = self.partial_every
            && total >= every
        {
            return Err(StoreError::Partial { total, failed: 1 });
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_before(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|row| row.timestamp >= cutoff);
        Ok((before - rows.len()) as u64)
    }
}

#[tokio::test]
async fn batches_flush_at_threshold_without_waiting_for_the_timer() {
    let store = Arc::new(MemStore::default());
    let logger = BufferedLogger::spawn(
        "usage",
        store.clone(),
        LoggerConfig {
            buffer_size: 100,
            batch_flush_threshold: 5,
            flush_interval: Duration::from_secs(3600),
        },
    );

    for i in 0..5 {
        logger.write(entry(&format!("req-{i}")));
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.rows.lock().unwrap().len(), 5);
    logger.close().await;
}

#[tokio::test]
async fn timer_flushes_partial_batches() {
    let store = Arc::new(MemStore::default());
    let logger = BufferedLogger::spawn(
        "usage",
        store.clone(),
        LoggerConfig {
            buffer_size: 100,
            batch_flush_threshold: 1000,
            flush_interval: Duration::from_millis(50),
        },
    );

    logger.write(entry("req-1"));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(store.rows.lock().unwrap().len(), 1);
    logger.close().await;
}

#[tokio::test]
async fn full_buffer_rejects_new_entries() {
    let store = Arc::new(MemStore::default());
    let logger = BufferedLogger::spawn(
        "usage",
        store.clone(),
        LoggerConfig {
            buffer_size: 2,
            batch_flush_threshold: 1000,
            flush_interval: Duration::from_secs(3600),
        },
    );

    // The flusher may consume up to one entry into its in-progress batch, so
    // overfill well past capacity.
    for i in 0..10 {
        logger.write(entry(&format!("req-{i}")));
    }
    assert!(logger.dropped() > 0, "overflow must drop new entries");

    logger.close().await;
    // Whatever was accepted is flushed on close; dropped entries are gone.
    let stored = store.rows.lock().unwrap().len();
    assert!(stored < 10);
    assert_eq!(stored as u64 + logger.dropped(), 10);
}

#[tokio::test]
async fn close_is_idempotent_and_flushes_once() {
    let store = Arc::new(MemStore::default());
    let logger = BufferedLogger::spawn(
        "usage",
        store.clone(),
        LoggerConfig {
            buffer_size: 10,
            batch_flush_threshold: 1000,
            flush_interval: Duration::from_secs(3600),
        },
    );

    logger.write(entry("req-1"));
    logger.close().await;
    assert_eq!(store.rows.lock().unwrap().len(), 1);
    assert_eq!(store.flushes.load(Ordering::SeqCst), 1);
    assert_eq!(store.closes.load(Ordering::SeqCst), 1);

    logger.close().await;
    logger.close().await;
    assert_eq!(store.flushes.load(Ordering::SeqCst), 1);
    assert_eq!(store.closes.load(Ordering::SeqCst), 1);

    // Writes after close are silent no-ops.
    logger.write(entry("req-late"));
    assert_eq!(store.rows.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn partial_write_errors_count_failures_and_continue() {
    let store = Arc::new(MemStore {
        partial_every: Some(2),
        ..MemStore::default()
    });
    let logger = BufferedLogger::spawn(
        "usage",
        store.clone(),
        LoggerConfig {
            buffer_size: 100,
            batch_flush_threshold: 2,
            flush_interval: Duration::from_secs(3600),
        },
    );

    logger.write(entry("req-1"));
    logger.write(entry("req-2"));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(logger.write_failures(), 1);

    // The logger keeps accepting work after a partial failure.
    logger.write(entry("req-3"));
    logger.close().await;
    assert!(store.rows.lock().unwrap().len() >= 3);
}

#[tokio::test]
async fn retention_fires_immediately() {
    let store = Arc::new(MemStore::default());
    let mut old = entry("req-old");
    old.timestamp = OffsetDateTime::now_utc() - time::Duration::days(30);
    store.rows.lock().unwrap().push(old);
    store.rows.lock().unwrap().push(entry("req-new"));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = spawn_retention::<UsageEntry>(
        "usage",
        store.clone(),
        7,
        Duration::from_secs(3600),
        shutdown_rx,
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.rows.lock().unwrap().len(), 1);

    let _ = shutdown_tx.send(true);
    let _ = handle.await;
}
