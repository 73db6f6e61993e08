//! Span recording.
//!
//! A [`Span`] is a timed, attributed record of one unit of work. Spans are
//! owned exclusively by the code that started them, end exactly once, and are
//! handed to the configured [`SpanProcessor`]s only after ending. Dropping a
//! live span ends it.
//!
//! [`SpanProcessor`]: crate::processor::SpanProcessor

use std::sync::Arc;
use std::time::SystemTime;

use serde::Serialize;

use crate::context::TraceContext;
use crate::ident::{SpanId, TraceFlags, TraceId};
use crate::processor::SpanProcessor;

/// The role a span plays in a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// Handles an inbound request.
    Server,
    /// Issues an outbound request.
    Client,
    /// Local unit of work.
    Internal,
    /// Publishes to a message channel.
    Producer,
    /// Consumes from a message channel.
    Consumer,
}

/// The outcome recorded on a span.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    /// No outcome recorded.
    #[default]
    Unset,
    /// The operation failed.
    Error {
        /// Short description of the failure.
        description: String,
    },
    /// The operation completed successfully.
    Ok,
}

impl SpanStatus {
    /// Convenience constructor for an error status.
    pub fn error(description: impl Into<String>) -> Self {
        SpanStatus::Error {
            description: description.into(),
        }
    }

    /// Returns `true` for [`SpanStatus::Error`].
    pub fn is_error(&self) -> bool {
        matches!(self, SpanStatus::Error { .. })
    }

    // Status may only be upgraded: Unset < Error < Ok.
    fn rank(&self) -> u8 {
        match self {
            SpanStatus::Unset => 0,
            SpanStatus::Error { .. } => 1,
            SpanStatus::Ok => 2,
        }
    }
}

/// A scalar attribute value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// String value.
    Str(String),
    /// Boolean value.
    Bool(bool),
    /// Signed integer value.
    I64(i64),
    /// Floating point value.
    F64(f64),
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_owned())
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::I64(value)
    }
}

impl From<usize> for AttrValue {
    fn from(value: usize) -> Self {
        AttrValue::I64(value as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::F64(value)
    }
}

/// A named, timestamped annotation on a span.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SpanEvent {
    /// Event name.
    pub name: String,
    /// When the event was recorded.
    pub timestamp: SystemTime,
    /// Event attributes.
    pub attributes: Vec<(String, AttrValue)>,
}

/// Immutable snapshot of an ended span, handed to processors and exporters.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SpanData {
    /// Span name.
    pub name: String,
    /// Span kind.
    pub kind: SpanKind,
    /// Trace this span belongs to.
    pub trace_id: TraceId,
    /// This span's id.
    pub span_id: SpanId,
    /// Parent span id, absent for a root span.
    pub parent_span_id: Option<SpanId>,
    /// Trace flags at recording time.
    pub flags: TraceFlags,
    /// Start timestamp.
    pub start_time: SystemTime,
    /// End timestamp, always `>= start_time`.
    pub end_time: SystemTime,
    /// Attributes in recording order.
    pub attributes: Vec<(String, AttrValue)>,
    /// Events in recording order.
    pub events: Vec<SpanEvent>,
    /// Final status.
    pub status: SpanStatus,
}

impl SpanData {
    /// Look up an attribute by key.
    pub fn attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

struct Recording {
    name: String,
    kind: SpanKind,
    parent_span_id: Option<SpanId>,
    start_time: SystemTime,
    attributes: Vec<(String, AttrValue)>,
    events: Vec<SpanEvent>,
    status: SpanStatus,
}

/// A live span.
///
/// Mutations are accepted until [`Span::end`] is called; afterwards they are
/// silently ignored. `end` is idempotent and also runs on drop.
pub struct Span {
    context: TraceContext,
    recording: Option<Recording>,
    processors: Arc<[Arc<dyn SpanProcessor>]>,
}

impl std::fmt::Debug for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Span")
            .field("context", &self.context)
            .field("recording", &self.recording.is_some())
            .finish()
    }
}

impl Span {
    pub(crate) fn start(
        name: String,
        kind: SpanKind,
        context: TraceContext,
        parent_span_id: Option<SpanId>,
        processors: Arc<[Arc<dyn SpanProcessor>]>,
    ) -> Self {
        Span {
            context,
            recording: Some(Recording {
                name,
                kind,
                parent_span_id,
                start_time: SystemTime::now(),
                attributes: Vec::new(),
                events: Vec::new(),
                status: SpanStatus::Unset,
            }),
            processors,
        }
    }

    /// The context identifying this span.
    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    /// Returns `true` until the span has ended.
    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Record a single attribute.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        if let Some(rec) = self.recording.as_mut() {
            rec.attributes.push((key.into(), value.into()));
        }
    }

    /// Record an event with the given attributes.
    pub fn add_event(
        &mut self,
        name: impl Into<String>,
        attributes: Vec<(String, AttrValue)>,
    ) {
        if let Some(rec) = self.recording.as_mut() {
            rec.events.push(SpanEvent {
                name: name.into(),
                timestamp: SystemTime::now(),
                attributes,
            });
        }
    }

    /// Set the span status. Status only upgrades: an `Error` cannot be reset
    /// to `Unset`, and `Ok` wins over `Error`.
    pub fn set_status(&mut self, status: SpanStatus) {
        if let Some(rec) = self.recording.as_mut() {
            if status.rank() > rec.status.rank() {
                rec.status = status;
            }
        }
    }

    /// Record an error: sets the status to `Error` and attaches the message
    /// as an `exception.message` attribute.
    pub fn record_error(&mut self, err: &dyn std::error::Error) {
        let message = err.to_string();
        self.set_attribute("exception.message", message.clone());
        self.set_status(SpanStatus::error(message));
    }

    /// End the span, snapshotting it and handing it to the processors.
    ///
    /// The first call finalizes the span; further calls are no-ops.
    pub fn end(&mut self) {
        let Some(rec) = self.recording.take() else {
            return;
        };
        // Clamp so the recorded invariant end_time >= start_time holds even
        // if the wall clock stepped backwards.
        let end_time = SystemTime::now().max(rec.start_time);
        let data = SpanData {
            name: rec.name,
            kind: rec.kind,
            trace_id: self.context.trace_id(),
            span_id: self.context.span_id(),
            parent_span_id: rec.parent_span_id,
            flags: self.context.flags(),
            start_time: rec.start_time,
            end_time,
            attributes: rec.attributes,
            events: rec.events,
            status: rec.status,
        };
        for processor in self.processors.iter() {
            processor.on_end(data.clone());
        }
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        self.end();
    }
}
