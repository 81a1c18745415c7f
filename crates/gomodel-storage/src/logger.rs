use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self as tokio_time, MissedTickBehavior};
use tracing::warn;

use gomodel_common::AuditEntry;
use gomodel_usage::UsageEntry;

use crate::store::{LogStore, StoreError};

const CLOSE_FLUSH_DEADLINE: Duration = Duration::from_secs(10);

/// Implemented by record types so overflow warnings can name the request.
pub trait LogRecord: Send + 'static {
    fn descriptor(&self) -> String;
}

impl LogRecord for UsageEntry {
    fn descriptor(&self) -> String {
        format!("request_id={} model={}", self.request_id, self.model)
    }
}

impl LogRecord for AuditEntry {
    fn descriptor(&self) -> String {
        format!("request_id={} path={}", self.request_id, self.path)
    }
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub buffer_size: usize,
    pub batch_flush_threshold: usize,
    pub flush_interval: Duration,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            batch_flush_threshold: 100,
            flush_interval: Duration::from_secs(5),
        }
    }
}

/// Bounded, non-blocking logger with a single-consumer batch flusher.
pub struct BufferedLogger<T> {
    tx: mpsc::Sender<T>,
    shutdown: watch::Sender<bool>,
    closed: AtomicBool,
    flusher: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    dropped: Arc<AtomicU64>,
    write_failures: Arc<AtomicU64>,
    label: &'static str,
}

impl<T: LogRecord> BufferedLogger<T> {
    pub fn spawn(label: &'static str, store: Arc<dyn LogStore<T>>, config: LoggerConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.buffer_size.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let write_failures = Arc::new(AtomicU64::new(0));
        let flusher = tokio::spawn(run_flusher(
            label,
            store,
            rx,
            shutdown_rx,
            config.batch_flush_threshold.max(1),
            config.flush_interval,
            write_failures.clone(),
        ));
        Self {
            tx,
            shutdown,
            closed: AtomicBool::new(false),
            flusher: tokio::sync::Mutex::new(Some(flusher)),
            dropped: Arc::new(AtomicU64::new(0)),
            write_failures,
            label,
        }
    }

    /// Enqueues without ever blocking the request path. A full queue rejects
    /// the new entry with a warning; a closed logger no-ops.
    pub fn write(&self, entry: T) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        match self.tx.try_send(entry) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(entry)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    logger = self.label,
                    entry = entry.descriptor(),
                    "logger buffer full; entry dropped"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    /// Idempotent. The first close stops intake, drains the queue, performs
    /// a final flush (10 s store deadline) and closes the store; later calls
    /// return immediately without re-flushing.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown.send(true);
        let handle = self.flusher.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }
}

async fn run_flusher<T: Send + 'static>(
    label: &'static str,
    store: Arc<dyn LogStore<T>>,
    mut rx: mpsc::Receiver<T>,
    mut shutdown: watch::Receiver<bool>,
    threshold: usize,
    interval: Duration,
    write_failures: Arc<AtomicU64>,
) {
    let mut batch: Vec<T> = Vec::with_capacity(threshold);
    let mut ticker = tokio_time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            maybe = rx.recv() => {
                match maybe {
                    Some(entry) => {
                        batch.push(entry);
                        if batch.len() >= threshold {
                            flush(label, &store, &mut batch, &write_failures).await;
                        }
                    }
                    None => break,
                }
            }
            _ = ticker.tick() => {
                if !batch.is_empty() {
                    flush(label, &store, &mut batch, &write_failures).await;
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    // Drain whatever producers managed to enqueue before intake stopped.
    while let Ok(entry) = rx.try_recv() {
        batch.push(entry);
        if batch.len() >= threshold {
            flush(label, &store, &mut batch, &write_failures).await;
        }
    }
    if !batch.is_empty() {
        flush(label, &store, &mut batch, &write_failures).await;
    }
    if tokio_time::timeout(CLOSE_FLUSH_DEADLINE, store.flush())
        .await
        .is_err()
    {
        warn!(logger = label, "store flush timed out during close");
    }
    if let Err(err) = store.close().await {
        warn!(logger = label, error = %err, "store close failed");
    }
}

async fn flush<T: 'static>(
    label: &'static str,
    store: &Arc<dyn LogStore<T>>,
    batch: &mut Vec<T>,
    write_failures: &AtomicU64,
) {
    let entries = std::mem::take(batch);
    let count = entries.len();
    match store.write_batch(entries).await {
        Ok(()) => {}
        Err(err @ StoreError::Partial { .. }) => {
            let failed = err.failed_rows(count);
            write_failures.fetch_add(failed as u64, Ordering::Relaxed);
            warn!(logger = label, error = %err, "partial batch write");
        }
        Err(err) => {
            write_failures.fetch_add(count as u64, Ordering::Relaxed);
            warn!(logger = label, error = %err, "batch write failed");
        }
    }
}
