//! Watchlist alert dispatch.
//!
//! Alerts are handed to a bounded queue drained by a dedicated worker thread.
//! Each delivery runs under its own timeout. The caller never waits on a
//! delivery: a full queue drops the alert, and a failed or slow sink is
//! reported on the broadcast channel and in the counters, never to the
//! identification path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use facewatch_core::Decision;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

const REPORT_CHANNEL_CAPACITY: usize = 64;

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("destination unreachable: {0}")]
    Unreachable(String),
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),
    #[error("alert io: {0}")]
    Io(#[from] std::io::Error),
    #[error("alert encoding: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A watchlist hit, addressed to the configured destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: Uuid,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    pub score: f32,
    /// Watchlist keyword that flagged the identity.
    pub keyword: String,
    pub destination: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Delivery transport for alerts (messaging gateway, outbox, ...).
#[async_trait]
pub trait AlertSink: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn deliver(&self, event: &AlertEvent) -> Result<(), AlertError>;
}

/// Emits alerts through `tracing` only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, event: &AlertEvent) -> Result<(), AlertError> {
        tracing::warn!(
            id = %event.id,
            label = %event.label,
            keyword = %event.keyword,
            score = event.score,
            destination = event.destination.as_deref().unwrap_or("<unset>"),
            "WATCHLIST ALERT"
        );
        Ok(())
    }
}

/// Appends one JSON object per alert to an outbox file.
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AlertSink for JsonLinesSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn deliver(&self, event: &AlertEvent) -> Result<(), AlertError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Immediate result of handing an alert to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertOutcome {
    Queued(Uuid),
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The decision carried no matched identity.
    NotMatched,
    QueueFull,
    /// The worker has shut down.
    Closed,
}

/// Final result of one delivery, published on the report channel.
#[derive(Debug, Clone)]
pub enum DeliveryReport {
    Delivered { id: Uuid, label: String },
    Failed { id: Uuid, label: String, error: String },
}

/// Dispatcher counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlertStats {
    pub queued: u64,
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    queued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub destination: Option<String>,
    pub timeout: Duration,
    pub queue_capacity: usize,
}

/// Handle to the alert worker.
pub struct AlertDispatcher {
    tx: Option<mpsc::Sender<AlertEvent>>,
    reports: broadcast::Sender<DeliveryReport>,
    counters: Arc<Counters>,
    destination: Option<String>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl AlertDispatcher {
    /// Start the worker thread with its own single-threaded runtime.
    pub fn spawn(sink: Arc<dyn AlertSink>, config: DispatcherConfig) -> Result<Self, AlertError> {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        let counters = Arc::new(Counters::default());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let worker = {
            let reports = reports.clone();
            let counters = Arc::clone(&counters);
            let timeout = config.timeout;
            std::thread::Builder::new()
                .name("facewatch-alerts".into())
                .spawn(move || {
                    tracing::debug!(sink = sink.name(), "alert worker started");
                    runtime.block_on(deliver_loop(rx, sink, timeout, reports, counters));
                    tracing::debug!("alert worker exiting");
                })?
        };

        if config.destination.is_none() {
            tracing::warn!("no alert destination configured; alerts will be unaddressed");
        }

        Ok(Self {
            tx: Some(tx),
            reports,
            counters,
            destination: config.destination,
            worker: Some(worker),
        })
    }

    /// Queue an alert for a matched, flagged decision. Never blocks.
    pub fn dispatch(&self, decision: &Decision, keyword: &str) -> AlertOutcome {
        let (true, Some(label)) = (decision.matched, decision.label.as_ref()) else {
            return AlertOutcome::Dropped(DropReason::NotMatched);
        };

        let event = AlertEvent {
            id: Uuid::new_v4(),
            label: label.clone(),
            info: decision.info.clone(),
            score: decision.score,
            keyword: keyword.to_string(),
            destination: self.destination.clone(),
            timestamp: Utc::now(),
        };
        let id = event.id;

        let Some(tx) = &self.tx else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return AlertOutcome::Dropped(DropReason::Closed);
        };
        match tx.try_send(event) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                tracing::info!(%id, label = %label, keyword, "alert queued");
                AlertOutcome::Queued(id)
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(id = %event.id, label = %event.label, "alert queue full; alert dropped");
                AlertOutcome::Dropped(DropReason::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(id = %event.id, label = %event.label, "alert worker gone; alert dropped");
                AlertOutcome::Dropped(DropReason::Closed)
            }
        }
    }

    /// Subscribe to delivery reports issued from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryReport> {
        self.reports.subscribe()
    }

    pub fn stats(&self) -> AlertStats {
        AlertStats {
            queued: self.counters.queued.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting alerts and wait for queued ones to finish. Each pending
    /// delivery is still bounded by the timeout.
    pub fn shutdown(mut self) -> AlertStats {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("alert worker panicked");
            }
        }
        self.stats()
    }
}

impl Drop for AlertDispatcher {
    fn drop(&mut self) {
        // Closing the queue lets the worker drain and exit on its own.
        self.tx.take();
    }
}

async fn deliver_loop(
    mut rx: mpsc::Receiver<AlertEvent>,
    sink: Arc<dyn AlertSink>,
    timeout: Duration,
    reports: broadcast::Sender<DeliveryReport>,
    counters: Arc<Counters>,
) {
    while let Some(event) = rx.recv().await {
        let result = match tokio::time::timeout(timeout, sink.deliver(&event)).await {
            Ok(result) => result,
            Err(_) => Err(AlertError::Timeout(timeout)),
        };

        let report = match result {
            Ok(()) => {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
                tracing::info!(id = %event.id, label = %event.label, sink = sink.name(), "alert delivered");
                DeliveryReport::Delivered {
                    id: event.id,
                    label: event.label,
                }
            }
            Err(err) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    id = %event.id,
                    label = %event.label,
                    sink = sink.name(),
                    error = %err,
                    "alert dispatch failed"
                );
                DeliveryReport::Failed {
                    id: event.id,
                    label: event.label,
                    error: err.to_string(),
                }
            }
        };
        // No subscribers is fine.
        let _ = reports.send(report);
    }
}
