//! Span export.
//!
//! Exporters ship batches of finished spans to a sink. The sink contract is
//! acknowledge-or-retry-later: a [`ExportError::RetryLater`] signals a busy
//! collector. The harness performs no retries anywhere, so a deferred batch
//! is dropped by the caller with a warning.

use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::span::SpanData;

/// Error returned by an export attempt.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExportError {
    /// The sink is busy and asks the caller to try again later.
    #[error("collector asked to retry later")]
    RetryLater,
    /// The batch could not be exported.
    #[error("export failed: {0}")]
    Failed(String),
}

/// Result of an export attempt.
pub type ExportResult = Result<(), ExportError>;

/// Ships batches of finished spans to an external sink.
pub trait SpanExporter: Send + Sync + fmt::Debug {
    /// Export a batch of spans.
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult>;

    /// Release any resources held by the exporter.
    fn shutdown(&mut self) {}
}

/// Exporter that stores finished spans in memory, for tests and inspection.
///
/// Clones share the same storage, so a single instance can be handed to
/// several tracers and queried afterwards for the combined trace.
#[derive(Clone, Debug, Default)]
pub struct InMemorySpanExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
}

impl InMemorySpanExporter {
    /// All spans exported so far.
    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.spans
            .lock()
            .map(|spans| spans.clone())
            .unwrap_or_default()
    }

    /// Clear the stored spans.
    pub fn reset(&self) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.clear();
        }
    }
}

impl SpanExporter for InMemorySpanExporter {
    fn export(&mut self, mut batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        let result = self
            .spans
            .lock()
            .map(|mut spans| spans.append(&mut batch))
            .map_err(|_| ExportError::Failed("span storage lock poisoned".into()));
        Box::pin(std::future::ready(result))
    }
}

/// Exporter that writes each span as a JSON line to stdout.
#[derive(Clone, Debug, Default)]
pub struct StdoutSpanExporter {
    _private: (),
}

impl StdoutSpanExporter {
    /// Create a new stdout exporter.
    pub fn new() -> Self {
        StdoutSpanExporter::default()
    }
}

impl SpanExporter for StdoutSpanExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        let result = (|| {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for span in &batch {
                serde_json::to_writer(&mut out, span)
                    .map_err(|e| ExportError::Failed(e.to_string()))?;
                writeln!(out).map_err(|e| ExportError::Failed(e.to_string()))?;
            }
            Ok(())
        })();
        Box::pin(std::future::ready(result))
    }
}
