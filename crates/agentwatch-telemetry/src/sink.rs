//! Delivery sinks for flushed batches.

use crate::error::DeliveryError;
use crate::Result;
use agentwatch_core::config::SinkSettings;
use agentwatch_core::paths;
use agentwatch_core::types::HookEvent;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Destination for flushed batches.
///
/// `write` must raise on failure so callers can retry, and an empty batch
/// must not touch the backend.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Sink name for logs.
    fn name(&self) -> &str;

    /// Persist one batch.
    async fn write(&self, batch: &[HookEvent]) -> std::result::Result<(), DeliveryError>;

    /// Release the backend. Later writes fail with [`DeliveryError::Closed`].
    async fn close(&self) -> std::result::Result<(), DeliveryError> {
        Ok(())
    }
}

/// Build the sink named by the telemetry settings.
pub fn sink_from_settings(settings: &SinkSettings) -> Result<Arc<dyn EventSink>> {
    Ok(match settings {
        SinkSettings::None => Arc::new(NullSink),
        SinkSettings::File { path } => {
            let path = match path {
                Some(p) => paths::expand_tilde(&p.to_string_lossy()),
                None => paths::events_file()?,
            };
            Arc::new(FileSink::new(path))
        }
        SinkSettings::Http {
            endpoint,
            timeout_secs,
        } => Arc::new(HttpSink::new(
            endpoint.clone(),
            std::time::Duration::from_secs(*timeout_secs),
        )?),
    })
}

/// Appends newline-delimited JSON records to a file.
pub struct FileSink {
    path: PathBuf,
    closed: AtomicBool,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EventSink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    async fn write(&self, batch: &[HookEvent]) -> std::result::Result<(), DeliveryError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DeliveryError::Closed);
        }
        if batch.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::new();
        for event in batch {
            serde_json::to_writer(&mut buf, event)?;
            buf.push(b'\n');
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&buf).await?;
        file.flush().await?;

        debug!(path = %self.path.display(), count = batch.len(), "Appended batch");
        Ok(())
    }

    async fn close(&self) -> std::result::Result<(), DeliveryError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Posts each batch as a JSON array to an HTTP endpoint.
///
/// Without the `http` feature every non-empty write fails with
/// [`DeliveryError::TransportUnavailable`].
pub struct HttpSink {
    endpoint: String,
    closed: AtomicBool,
    #[cfg(feature = "http")]
    client: reqwest::Client,
}

impl HttpSink {
    pub fn new(endpoint: impl Into<String>, timeout: std::time::Duration) -> Result<Self> {
        let endpoint = endpoint.into();

        #[cfg(feature = "http")]
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Http(e.to_string()))?;

        #[cfg(not(feature = "http"))]
        let _ = timeout;

        Ok(Self {
            endpoint,
            closed: AtomicBool::new(false),
            #[cfg(feature = "http")]
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EventSink for HttpSink {
    fn name(&self) -> &str {
        "http"
    }

    async fn write(&self, batch: &[HookEvent]) -> std::result::Result<(), DeliveryError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DeliveryError::Closed);
        }
        if batch.is_empty() {
            return Ok(());
        }

        #[cfg(feature = "http")]
        {
            let response = self
                .client
                .post(&self.endpoint)
                .json(batch)
                .send()
                .await
                .map_err(|e| DeliveryError::Http(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(DeliveryError::Rejected {
                    status: status.as_u16(),
                });
            }
            debug!(endpoint = %self.endpoint, count = batch.len(), "Posted batch");
            Ok(())
        }

        #[cfg(not(feature = "http"))]
        {
            Err(DeliveryError::TransportUnavailable(
                "built without the `http` feature".to_string(),
            ))
        }
    }

    async fn close(&self) -> std::result::Result<(), DeliveryError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Accepts and discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    fn name(&self) -> &str {
        "none"
    }

    async fn write(&self, _batch: &[HookEvent]) -> std::result::Result<(), DeliveryError> {
        Ok(())
    }
}

/// Keeps delivered batches in memory. Can be told to fail upcoming writes.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<HookEvent>>>,
    fail_next: AtomicUsize,
    attempts: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` non-empty writes fail.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Successfully written batches, in delivery order.
    pub async fn batches(&self) -> Vec<Vec<HookEvent>> {
        self.batches.lock().await.clone()
    }

    /// Every delivered event, flattened.
    pub async fn events(&self) -> Vec<HookEvent> {
        self.batches.lock().await.iter().flatten().cloned().collect()
    }

    pub async fn event_count(&self) -> usize {
        self.batches.lock().await.iter().map(Vec::len).sum()
    }

    /// Non-empty write calls seen, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn write(&self, batch: &[HookEvent]) -> std::result::Result<(), DeliveryError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DeliveryError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "scripted failure",
            )));
        }

        self.batches.lock().await.push(batch.to_vec());
        Ok(())
    }
}
