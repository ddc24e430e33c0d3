//! Batching event buffer with a background flush worker.

use crate::client::RetryPolicy;
use crate::sink::EventSink;
use agentwatch_core::config::TelemetrySettings;
use agentwatch_core::types::HookEvent;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Buffer sizing and timing.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Queue length that triggers an immediate flush.
    pub batch_size: usize,

    /// Minimum time between time-based flushes.
    pub flush_interval: Duration,

    /// Queue capacity before the oldest events are evicted.
    pub max_buffer_size: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self::from(&TelemetrySettings::default())
    }
}

impl From<&TelemetrySettings> for BufferConfig {
    fn from(settings: &TelemetrySettings) -> Self {
        let secs = settings.flush_interval_secs;
        let interval = if secs.is_finite() && secs > 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            Duration::from_secs(5)
        };
        Self {
            batch_size: settings.batch_size.max(1),
            flush_interval: interval,
            max_buffer_size: settings.max_buffer_size.max(1),
        }
    }
}

impl BufferConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_max_buffer_size(mut self, max: usize) -> Self {
        self.max_buffer_size = max.max(1);
        self
    }

    /// Events evicted at once when the queue is full.
    fn eviction_count(&self) -> usize {
        (self.max_buffer_size / 10).max(1)
    }
}

/// Counters describing what happened to every added event.
///
/// Once the buffer is drained, `added == delivered + evicted + discarded`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferStats {
    /// Events accepted by `add`.
    pub added: u64,

    /// Events written to the sink.
    pub delivered: u64,

    /// Events put back at the front after a failed flush.
    pub requeued: u64,

    /// Events dropped by overflow protection.
    pub evicted: u64,

    /// Events dropped after retries ran out.
    pub discarded: u64,

    /// Batches written successfully.
    pub batches: u64,

    /// Flushes that ended without delivery.
    pub failed_batches: u64,

    /// Events currently queued.
    pub pending: u64,
}

#[derive(Default)]
struct Counters {
    added: AtomicU64,
    delivered: AtomicU64,
    requeued: AtomicU64,
    evicted: AtomicU64,
    discarded: AtomicU64,
    batches: AtomicU64,
    failed_batches: AtomicU64,
}

struct Inner {
    config: BufferConfig,
    sink: Arc<dyn EventSink>,
    retry: Option<RetryPolicy>,
    queue: Mutex<VecDeque<HookEvent>>,
    /// Serializes flushes so batches reach the sink in append order.
    flush_lock: Mutex<()>,
    last_flush: Mutex<Instant>,
    counters: Counters,
}

struct Worker {
    shutdown: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Accepts events from many producers and delivers them to a sink in batches.
///
/// Lifecycle is `stopped -> running -> stopped`. While running, a background
/// task flushes whenever the flush interval has elapsed. Producers never wait
/// on the sink except when their own `add` fills a batch.
pub struct EventBuffer {
    inner: Arc<Inner>,
    worker: Mutex<Option<Worker>>,
}

impl EventBuffer {
    /// Create a buffer that re-queues failed batches for the next flush.
    pub fn new(sink: Arc<dyn EventSink>, config: BufferConfig) -> Self {
        Self::build(sink, config, None)
    }

    /// Create a buffer that retries each flush, then discards the batch.
    pub fn with_retry(sink: Arc<dyn EventSink>, config: BufferConfig, retry: RetryPolicy) -> Self {
        Self::build(sink, config, Some(retry))
    }

    fn build(sink: Arc<dyn EventSink>, config: BufferConfig, retry: Option<RetryPolicy>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                sink,
                retry,
                queue: Mutex::new(VecDeque::new()),
                flush_lock: Mutex::new(()),
                last_flush: Mutex::new(Instant::now()),
                counters: Counters::default(),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &BufferConfig {
        &self.inner.config
    }

    /// Queue an event. Flushes immediately once a full batch is waiting.
    pub async fn add(&self, event: HookEvent) {
        let inner = &self.inner;
        let full_batch = {
            let mut queue = inner.queue.lock().await;
            if queue.len() >= inner.config.max_buffer_size {
                let evict = inner.config.eviction_count().min(queue.len());
                queue.drain(..evict);
                inner.counters.evicted.fetch_add(evict as u64, Ordering::Relaxed);
                warn!(evicted = evict, "Event buffer full, dropped oldest events");
            }
            queue.push_back(event);
            inner.counters.added.fetch_add(1, Ordering::Relaxed);
            queue.len() >= inner.config.batch_size
        };

        if full_batch {
            inner.flush().await;
        }
    }

    /// Deliver everything currently queued.
    pub async fn flush(&self) {
        self.inner.flush().await;
    }

    /// Events waiting to be flushed.
    pub async fn len(&self) -> usize {
        self.inner.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn is_running(&self) -> bool {
        self.worker.lock().await.is_some()
    }

    pub async fn stats(&self) -> BufferStats {
        let c = &self.inner.counters;
        BufferStats {
            added: c.added.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            requeued: c.requeued.load(Ordering::Relaxed),
            evicted: c.evicted.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
            batches: c.batches.load(Ordering::Relaxed),
            failed_batches: c.failed_batches.load(Ordering::Relaxed),
            pending: self.len().await as u64,
        }
    }

    /// Start the background flush loop. No-op when already running.
    pub async fn start(&self) {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return;
        }

        let (tx, mut rx) = mpsc::channel::<()>(1);
        let inner = Arc::clone(&self.inner);
        let tick = (inner.config.flush_interval / 2).max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = rx.recv() => {
                        debug!("Event buffer loop stopping");
                        break;
                    }
                    _ = interval.tick() => {
                        if inner.flush_due().await {
                            inner.flush().await;
                        }
                    }
                }
            }
        });

        *worker = Some(Worker {
            shutdown: tx,
            handle,
        });
        info!(
            sink = self.inner.sink.name(),
            batch_size = self.inner.config.batch_size,
            "Event buffer started"
        );
    }

    /// Stop the loop, wait for it, then flush what remains. No-op when stopped.
    pub async fn stop(&self) {
        let Some(worker) = self.worker.lock().await.take() else {
            return;
        };

        let _ = worker.shutdown.send(()).await;
        if let Err(e) = worker.handle.await {
            error!("Event buffer loop failed: {}", e);
        }

        self.inner.flush().await;
        info!(sink = self.inner.sink.name(), "Event buffer stopped");
    }

    /// Close the underlying sink.
    pub async fn close_sink(&self) {
        if let Err(e) = self.inner.sink.close().await {
            warn!(sink = self.inner.sink.name(), "Failed to close sink: {}", e);
        }
    }
}

impl Drop for EventBuffer {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.handle.abort();
        }
    }
}

impl Inner {
    async fn flush_due(&self) -> bool {
        if self.queue.lock().await.is_empty() {
            return false;
        }
        self.last_flush.lock().await.elapsed() >= self.config.flush_interval
    }

    async fn flush(&self) {
        let _serial = self.flush_lock.lock().await;

        let batch: Vec<HookEvent> = {
            let mut queue = self.queue.lock().await;
            queue.drain(..).collect()
        };
        *self.last_flush.lock().await = Instant::now();
        if batch.is_empty() {
            return;
        }

        match self.retry {
            None => self.deliver_once(batch).await,
            Some(policy) => self.deliver_with_retry(batch, policy).await,
        }
    }

    async fn deliver_once(&self, batch: Vec<HookEvent>) {
        match self.sink.write(&batch).await {
            Ok(()) => self.record_delivered(batch.len()),
            Err(e) => {
                warn!(
                    sink = self.sink.name(),
                    count = batch.len(),
                    "Flush failed, re-queueing batch: {}",
                    e
                );
                self.counters.failed_batches.fetch_add(1, Ordering::Relaxed);
                self.requeue(batch).await;
            }
        }
    }

    async fn deliver_with_retry(&self, batch: Vec<HookEvent>, policy: RetryPolicy) {
        let attempts = policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.sink.write(&batch).await {
                Ok(()) => {
                    self.record_delivered(batch.len());
                    return;
                }
                Err(e) => {
                    warn!(
                        sink = self.sink.name(),
                        attempt,
                        max_attempts = attempts,
                        "Delivery attempt failed: {}",
                        e
                    );
                    if attempt < attempts && !policy.delay.is_zero() {
                        tokio::time::sleep(policy.delay).await;
                    }
                }
            }
        }

        self.counters.failed_batches.fetch_add(1, Ordering::Relaxed);
        self.counters
            .discarded
            .fetch_add(batch.len() as u64, Ordering::Relaxed);
        error!(
            sink = self.sink.name(),
            count = batch.len(),
            attempts,
            "Discarding batch after exhausting retries"
        );
    }

    fn record_delivered(&self, count: usize) {
        self.counters.batches.fetch_add(1, Ordering::Relaxed);
        self.counters
            .delivered
            .fetch_add(count as u64, Ordering::Relaxed);
        debug!(sink = self.sink.name(), count, "Flushed batch");
    }

    /// Put a failed batch back at the front, trimming the oldest past capacity.
    async fn requeue(&self, batch: Vec<HookEvent>) {
        let mut queue = self.queue.lock().await;
        self.counters
            .requeued
            .fetch_add(batch.len() as u64, Ordering::Relaxed);
        for event in batch.into_iter().rev() {
            queue.push_front(event);
        }
        let overflow = queue.len().saturating_sub(self.config.max_buffer_size);
        if overflow > 0 {
            queue.drain(..overflow);
            self.counters
                .evicted
                .fetch_add(overflow as u64, Ordering::Relaxed);
            warn!(evicted = overflow, "Re-queued batch overflowed buffer");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use agentwatch_core::types::HookEventType;

    fn event() -> HookEvent {
        HookEvent::new(HookEventType::PreToolUse, "s1")
    }

    fn config(batch_size: usize) -> BufferConfig {
        BufferConfig::default()
            .with_batch_size(batch_size)
            .with_flush_interval(Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_flush_on_batch_size() {
        let sink = Arc::new(MemorySink::new());
        let buffer = EventBuffer::new(sink.clone(), config(3));

        buffer.add(event()).await;
        buffer.add(event()).await;
        assert!(sink.batches().await.is_empty());

        buffer.add(event()).await;
        let batches = sink.batches().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
        assert!(buffer.is_empty().await);
    }

    #[tokio::test]
    async fn test_batch_preserves_append_order() {
        let sink = Arc::new(MemorySink::new());
        let buffer = EventBuffer::new(sink.clone(), config(10));
        let events: Vec<HookEvent> = (0..5).map(|_| event()).collect();
        for e in &events {
            buffer.add(e.clone()).await;
        }
        buffer.flush().await;
        assert_eq!(sink.events().await, events);
    }

    #[tokio::test]
    async fn test_overflow_evicts_oldest_tenth() {
        let sink = Arc::new(MemorySink::new());
        let buffer = EventBuffer::new(
            sink.clone(),
            config(1000).with_max_buffer_size(10),
        );
        let events: Vec<HookEvent> = (0..11).map(|_| event()).collect();
        for e in &events {
            buffer.add(e.clone()).await;
        }

        assert_eq!(buffer.len().await, 10);
        let stats = buffer.stats().await;
        assert_eq!(stats.evicted, 1);

        buffer.flush().await;
        assert_eq!(sink.events().await, events[1..].to_vec());
    }

    #[tokio::test]
    async fn test_failed_flush_requeues_at_front() {
        let sink = Arc::new(MemorySink::new());
        let buffer = EventBuffer::new(sink.clone(), config(100));
        let first = event();
        buffer.add(first.clone()).await;

        sink.fail_next(1);
        buffer.flush().await;
        assert_eq!(buffer.len().await, 1);

        let second = event();
        buffer.add(second.clone()).await;
        buffer.flush().await;

        assert_eq!(sink.events().await, vec![first, second]);
        let stats = buffer.stats().await;
        assert_eq!(stats.requeued, 1);
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.failed_batches, 1);
    }

    #[tokio::test]
    async fn test_retry_then_discard() {
        let sink = Arc::new(MemorySink::new());
        let buffer = EventBuffer::with_retry(
            sink.clone(),
            config(100),
            RetryPolicy::new(3, Duration::ZERO),
        );
        buffer.add(event()).await;
        buffer.add(event()).await;

        sink.fail_next(3);
        buffer.flush().await;

        assert_eq!(sink.attempts(), 3);
        let stats = buffer.stats().await;
        assert_eq!(stats.discarded, 2);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.added, stats.delivered + stats.evicted + stats.discarded);
    }

    #[tokio::test]
    async fn test_retry_succeeds_within_attempts() {
        let sink = Arc::new(MemorySink::new());
        let buffer = EventBuffer::with_retry(
            sink.clone(),
            config(100),
            RetryPolicy::new(3, Duration::ZERO),
        );
        buffer.add(event()).await;
        sink.fail_next(2);
        buffer.flush().await;

        assert_eq!(sink.event_count().await, 1);
        assert_eq!(buffer.stats().await.discarded, 0);
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let sink = Arc::new(MemorySink::new());
        let buffer = EventBuffer::new(sink.clone(), config(100));

        buffer.stop().await;
        assert!(!buffer.is_running().await);

        buffer.start().await;
        buffer.start().await;
        assert!(buffer.is_running().await);

        buffer.add(event()).await;
        buffer.stop().await;
        assert!(!buffer.is_running().await);
        assert_eq!(sink.event_count().await, 1);

        buffer.stop().await;
    }

    #[tokio::test]
    async fn test_background_loop_flushes_on_interval() {
        let sink = Arc::new(MemorySink::new());
        let buffer = EventBuffer::new(
            sink.clone(),
            config(100).with_flush_interval(Duration::from_millis(40)),
        );
        buffer.start().await;
        buffer.add(event()).await;

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(sink.event_count().await, 1);

        buffer.stop().await;
    }

    #[tokio::test]
    async fn test_concurrent_producers() {
        let sink = Arc::new(MemorySink::new());
        let buffer = Arc::new(EventBuffer::new(sink.clone(), config(7)));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let buffer = Arc::clone(&buffer);
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    buffer.add(event()).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        buffer.flush().await;

        assert_eq!(sink.event_count().await, 200);
        let stats = buffer.stats().await;
        assert_eq!(stats.added, 200);
        assert_eq!(stats.delivered, 200);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = TelemetrySettings {
            batch_size: 50,
            flush_interval_secs: 0.5,
            ..Default::default()
        };
        let config = BufferConfig::from(&settings);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.flush_interval, Duration::from_millis(500));
        assert_eq!(config.max_buffer_size, 10_000);
        assert_eq!(config.eviction_count(), 1000);
    }
}
