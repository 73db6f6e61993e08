//! Span processors.
//!
//! Processors receive finished spans from [`Span::end`] and hand them to an
//! exporter, either immediately ([`SimpleSpanProcessor`]) or batched through
//! a bounded queue drained by a background task ([`BatchSpanProcessor`]).
//!
//! [`Span::end`]: crate::span::Span::end

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, Notify};

use crate::export::{ExportError, ExportResult, SpanExporter};
use crate::span::SpanData;

/// Receives finished spans.
///
/// `on_end` is called synchronously from [`Span::end`] and must not block
/// beyond a bounded enqueue step.
///
/// [`Span::end`]: crate::span::Span::end
pub trait SpanProcessor: Send + Sync + fmt::Debug {
    /// Called with the snapshot of an ended span.
    fn on_end(&self, span: SpanData);

    /// Export everything currently buffered.
    fn force_flush(&self) -> BoxFuture<'_, ExportResult>;

    /// Flush and release resources. Safe to call more than once.
    fn shutdown(&self) -> BoxFuture<'_, ExportResult>;
}

/// Exports each span as soon as it ends, without batching.
///
/// Useful for tests and debugging with non-blocking exporters (in-memory,
/// stdout). IO-bound exporters belong behind a [`BatchSpanProcessor`].
#[derive(Debug)]
pub struct SimpleSpanProcessor {
    exporter: Mutex<Box<dyn SpanExporter>>,
}

impl SimpleSpanProcessor {
    /// Create a processor over the given exporter.
    pub fn new(exporter: Box<dyn SpanExporter>) -> Self {
        SimpleSpanProcessor {
            exporter: Mutex::new(exporter),
        }
    }
}

impl SpanProcessor for SimpleSpanProcessor {
    fn on_end(&self, span: SpanData) {
        if !span.flags.is_sampled() {
            return;
        }
        let result = self
            .exporter
            .lock()
            .map_err(|_| ExportError::Failed("exporter lock poisoned".into()))
            .and_then(|mut exporter| futures_executor::block_on(exporter.export(vec![span])));
        if let Err(error) = result {
            tracing::debug!(%error, "span export failed");
        }
    }

    fn force_flush(&self) -> BoxFuture<'_, ExportResult> {
        Box::pin(std::future::ready(Ok(())))
    }

    fn shutdown(&self) -> BoxFuture<'_, ExportResult> {
        let result = self
            .exporter
            .lock()
            .map(|mut exporter| exporter.shutdown())
            .map_err(|_| ExportError::Failed("exporter lock poisoned".into()));
        Box::pin(std::future::ready(result))
    }
}

/// Configuration for [`BatchSpanProcessor`].
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Maximum number of spans buffered before the oldest is evicted.
    pub max_queue_size: usize,
    /// Interval between scheduled exports.
    pub scheduled_delay: Duration,
    /// Maximum number of spans per export call.
    pub max_export_batch_size: usize,
    /// How long `force_flush`/`shutdown` wait for the worker.
    pub wait_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            max_queue_size: 2_048,
            scheduled_delay: Duration::from_secs(5),
            max_export_batch_size: 512,
            wait_timeout: Duration::from_secs(5),
        }
    }
}

struct BatchShared {
    queue: Mutex<VecDeque<SpanData>>,
    dropped: AtomicUsize,
    batch_ready: Notify,
    config: BatchConfig,
}

enum Ctrl {
    Flush(oneshot::Sender<ExportResult>),
    Shutdown(oneshot::Sender<ExportResult>),
}

/// Batches finished spans through a bounded queue and a background tokio
/// task that flushes on a schedule, when a full batch accumulates, or on
/// demand.
///
/// Enqueueing never blocks: when the queue is full the *oldest* unexported
/// span is dropped to make room for the new one. Loss under backpressure is
/// an accepted tradeoff and is never surfaced to the span's owner; the
/// number of dropped spans is available from [`dropped_spans`].
///
/// Must be constructed inside a tokio runtime.
///
/// [`dropped_spans`]: BatchSpanProcessor::dropped_spans
#[derive(Debug)]
pub struct BatchSpanProcessor {
    shared: Arc<BatchShared>,
    ctrl: mpsc::Sender<Ctrl>,
    is_shutdown: AtomicBool,
}

impl fmt::Debug for BatchShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchShared")
            .field("config", &self.config)
            .field("dropped", &self.dropped.load(Ordering::Relaxed))
            .finish()
    }
}

impl BatchSpanProcessor {
    /// Start building a batch processor over the given exporter.
    pub fn builder<E: SpanExporter + 'static>(exporter: E) -> BatchSpanProcessorBuilder {
        BatchSpanProcessorBuilder {
            exporter: Box::new(exporter),
            config: BatchConfig::default(),
        }
    }

    fn new(exporter: Box<dyn SpanExporter>, config: BatchConfig) -> Self {
        let shared = Arc::new(BatchShared {
            queue: Mutex::new(VecDeque::with_capacity(config.max_queue_size)),
            dropped: AtomicUsize::new(0),
            batch_ready: Notify::new(),
            config,
        });
        let (ctrl_tx, ctrl_rx) = mpsc::channel(4);
        tokio::spawn(run_worker(exporter, Arc::clone(&shared), ctrl_rx));
        BatchSpanProcessor {
            shared,
            ctrl: ctrl_tx,
            is_shutdown: AtomicBool::new(false),
        }
    }

    /// Number of spans dropped because the queue was full.
    pub fn dropped_spans(&self) -> usize {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    async fn send_ctrl(
        &self,
        make: impl FnOnce(oneshot::Sender<ExportResult>) -> Ctrl,
    ) -> ExportResult {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.ctrl
            .send(make(ack_tx))
            .await
            .map_err(|_| ExportError::Failed("batch worker is gone".into()))?;
        match tokio::time::timeout(self.shared.config.wait_timeout, ack_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ExportError::Failed("batch worker is gone".into())),
            Err(_) => Err(ExportError::Failed("timed out waiting for flush".into())),
        }
    }
}

impl SpanProcessor for BatchSpanProcessor {
    fn on_end(&self, span: SpanData) {
        if self.is_shutdown.load(Ordering::Relaxed) || !span.flags.is_sampled() {
            return;
        }
        let ready = {
            let Ok(mut queue) = self.shared.queue.lock() else {
                return;
            };
            if queue.len() >= self.shared.config.max_queue_size {
                queue.pop_front();
                // Warn on the first drop only; the total is reported via
                // dropped_spans.
                if self.shared.dropped.fetch_add(1, Ordering::Relaxed) == 0 {
                    tracing::warn!(
                        max_queue_size = self.shared.config.max_queue_size,
                        "span queue full, dropping oldest unexported spans"
                    );
                }
            }
            queue.push_back(span);
            queue.len() >= self.shared.config.max_export_batch_size
        };
        if ready {
            self.shared.batch_ready.notify_one();
        }
    }

    fn force_flush(&self) -> BoxFuture<'_, ExportResult> {
        Box::pin(async move {
            if self.is_shutdown.load(Ordering::Relaxed) {
                return Err(ExportError::Failed("processor already shut down".into()));
            }
            self.send_ctrl(Ctrl::Flush).await
        })
    }

    fn shutdown(&self) -> BoxFuture<'_, ExportResult> {
        Box::pin(async move {
            if self.is_shutdown.swap(true, Ordering::Relaxed) {
                return Ok(());
            }
            self.send_ctrl(Ctrl::Shutdown).await
        })
    }
}

/// Builder for [`BatchSpanProcessor`].
pub struct BatchSpanProcessorBuilder {
    exporter: Box<dyn SpanExporter>,
    config: BatchConfig,
}

impl fmt::Debug for BatchSpanProcessorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchSpanProcessorBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl BatchSpanProcessorBuilder {
    /// Use the given batch configuration.
    pub fn with_batch_config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the processor, spawning its worker on the current runtime.
    pub fn build(self) -> BatchSpanProcessor {
        BatchSpanProcessor::new(self.exporter, self.config)
    }
}

async fn run_worker(
    mut exporter: Box<dyn SpanExporter>,
    shared: Arc<BatchShared>,
    mut ctrl: mpsc::Receiver<Ctrl>,
) {
    let mut ticker = tokio::time::interval(shared.config.scheduled_delay);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick of a tokio interval fires immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let _ = drain(&mut exporter, &shared).await;
            }
            _ = shared.batch_ready.notified() => {
                let _ = drain(&mut exporter, &shared).await;
            }
            msg = ctrl.recv() => match msg {
                Some(Ctrl::Flush(ack)) => {
                    let _ = ack.send(drain(&mut exporter, &shared).await);
                }
                Some(Ctrl::Shutdown(ack)) => {
                    let result = drain(&mut exporter, &shared).await;
                    exporter.shutdown();
                    let _ = ack.send(result);
                    return;
                }
                None => return,
            }
        }
    }
}

async fn drain(exporter: &mut Box<dyn SpanExporter>, shared: &Arc<BatchShared>) -> ExportResult {
    loop {
        let batch: Vec<SpanData> = {
            let Ok(mut queue) = shared.queue.lock() else {
                return Err(ExportError::Failed("span queue lock poisoned".into()));
            };
            let take = queue.len().min(shared.config.max_export_batch_size);
            queue.drain(..take).collect()
        };
        if batch.is_empty() {
            return Ok(());
        }
        match exporter.export(batch).await {
            Ok(()) => {}
            Err(ExportError::RetryLater) => {
                // No retries anywhere in the harness: a deferred batch is lost.
                tracing::warn!("collector busy, dropping deferred batch");
            }
            Err(error) => {
                tracing::warn!(%error, "span batch export failed");
                return Err(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::InMemorySpanExporter;
    use crate::span::SpanKind;
    use crate::tracer::Tracer;

    fn small_config() -> BatchConfig {
        BatchConfig {
            max_queue_size: 4,
            scheduled_delay: Duration::from_secs(60),
            max_export_batch_size: 16,
            wait_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn flush_exports_buffered_spans() {
        let exporter = InMemorySpanExporter::default();
        let processor = Arc::new(
            BatchSpanProcessor::builder(exporter.clone())
                .with_batch_config(small_config())
                .build(),
        );
        let tracer = Tracer::builder("test")
            .with_processor(processor.clone())
            .build();

        for i in 0..3 {
            tracer
                .start_span(format!("span-{i}"), SpanKind::Internal, None)
                .1
                .end();
        }
        assert!(exporter.finished_spans().is_empty());

        processor.force_flush().await.unwrap();
        assert_eq!(exporter.finished_spans().len(), 3);
    }

    #[tokio::test]
    async fn overflow_drops_oldest() {
        let exporter = InMemorySpanExporter::default();
        let processor = Arc::new(
            BatchSpanProcessor::builder(exporter.clone())
                .with_batch_config(small_config())
                .build(),
        );
        let tracer = Tracer::builder("test")
            .with_processor(processor.clone())
            .build();

        for i in 0..6 {
            tracer
                .start_span(format!("span-{i}"), SpanKind::Internal, None)
                .1
                .end();
        }
        assert_eq!(processor.dropped_spans(), 2);

        processor.force_flush().await.unwrap();
        let names: Vec<_> = exporter
            .finished_spans()
            .into_iter()
            .map(|s| s.name)
            .collect();
        // The two oldest spans were evicted to admit the newest.
        assert_eq!(names, vec!["span-2", "span-3", "span-4", "span-5"]);
    }

    #[tokio::test]
    async fn full_batch_triggers_export_without_flush() {
        let exporter = InMemorySpanExporter::default();
        let processor = Arc::new(
            BatchSpanProcessor::builder(exporter.clone())
                .with_batch_config(BatchConfig {
                    max_queue_size: 64,
                    scheduled_delay: Duration::from_secs(60),
                    max_export_batch_size: 8,
                    wait_timeout: Duration::from_secs(5),
                })
                .build(),
        );
        let tracer = Tracer::builder("test")
            .with_processor(processor.clone())
            .build();

        for i in 0..8 {
            tracer
                .start_span(format!("span-{i}"), SpanKind::Internal, None)
                .1
                .end();
        }

        // Give the worker a moment to react to the batch-ready signal.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(exporter.finished_spans().len(), 8);
    }

    #[tokio::test]
    async fn shutdown_flushes_and_is_idempotent() {
        let exporter = InMemorySpanExporter::default();
        let processor = Arc::new(
            BatchSpanProcessor::builder(exporter.clone())
                .with_batch_config(small_config())
                .build(),
        );
        let tracer = Tracer::builder("test")
            .with_processor(processor.clone())
            .build();

        tracer.start_span("last", SpanKind::Internal, None).1.end();
        processor.shutdown().await.unwrap();
        assert_eq!(exporter.finished_spans().len(), 1);

        // Second shutdown is a no-op; spans after shutdown are discarded.
        processor.shutdown().await.unwrap();
        tracer.start_span("late", SpanKind::Internal, None).1.end();
        assert_eq!(exporter.finished_spans().len(), 1);
    }
}
