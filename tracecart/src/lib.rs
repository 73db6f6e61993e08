//! Trace-context propagation, span recording, and metric emission for the
//! tracecart demo harness.
//!
//! The crate covers the pieces a distributed transaction needs to show up as
//! one coherent trace:
//!
//! * [`TraceContext`] — the causal identity (trace id, parent span id,
//!   sampling flag) plus the [`Baggage`] side-channel, carried over plain
//!   HTTP via the [`propagation`] module's `traceparent`/`baggage` headers.
//! * [`Span`] — a timed, attributed record of one unit of work; spans from
//!   one transaction link into a tree via parent span ids.
//! * [`Tracer`] — starts spans and derives child contexts. Tracers are
//!   explicitly constructed; there are no process-global singletons, so
//!   tests build isolated instances.
//! * [`BatchSpanProcessor`] / [`SpanExporter`] — finished spans are batched
//!   through a bounded queue and shipped asynchronously; when the queue is
//!   full the oldest unexported span is dropped.
//! * [`Meter`] — counters and histograms emitting append-only samples.
//!
//! ```
//! use tracecart::{InMemorySpanExporter, SpanKind, Tracer};
//!
//! let exporter = InMemorySpanExporter::default();
//! let tracer = Tracer::builder("demo")
//!     .with_simple_exporter(exporter.clone())
//!     .build();
//!
//! let (cx, mut span) = tracer.start_span("handle_request", SpanKind::Server, None);
//! let (_child_cx, mut child) = tracer.start_span("call_downstream", SpanKind::Client, Some(&cx));
//! child.end();
//! span.end();
//!
//! assert_eq!(exporter.finished_spans().len(), 2);
//! ```

mod baggage;
mod context;
mod export;
mod ident;
mod metrics;
mod processor;
pub mod propagation;
mod span;
mod tracer;

pub use baggage::Baggage;
pub use context::TraceContext;
pub use export::{ExportError, ExportResult, InMemorySpanExporter, SpanExporter, StdoutSpanExporter};
pub use ident::{SpanId, TraceFlags, TraceId};
pub use metrics::{
    Counter, Histogram, InMemoryMetricSink, InstrumentBuilder, InstrumentKind, Meter,
    MetricSample, MetricSink, TracingMetricSink,
};
#[doc(hidden)]
pub use metrics::FromParts;
pub use processor::{
    BatchConfig, BatchSpanProcessor, BatchSpanProcessorBuilder, SimpleSpanProcessor, SpanProcessor,
};
pub use span::{AttrValue, Span, SpanData, SpanEvent, SpanKind, SpanStatus};
pub use tracer::{IdGenerator, IncrementIdGenerator, RandomIdGenerator, Tracer, TracerBuilder};
