//! Span creation and id generation.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::context::TraceContext;
use crate::export::SpanExporter;
use crate::ident::{SpanId, TraceFlags, TraceId};
use crate::processor::{SimpleSpanProcessor, SpanProcessor};
use crate::span::{Span, SpanKind};

/// Source of fresh trace and span ids.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Generate a new trace id.
    fn new_trace_id(&self) -> TraceId;

    /// Generate a new span id.
    fn new_span_id(&self) -> SpanId;
}

impl IdGenerator for Box<dyn IdGenerator> {
    fn new_trace_id(&self) -> TraceId {
        (**self).new_trace_id()
    }

    fn new_span_id(&self) -> SpanId {
        (**self).new_span_id()
    }
}

/// Default [`IdGenerator`] backed by a per-thread RNG.
#[derive(Clone, Debug, Default)]
pub struct RandomIdGenerator {
    _private: (),
}

thread_local! {
    static CURRENT_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_os_rng());
}

impl IdGenerator for RandomIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        CURRENT_RNG.with(|rng| TraceId::from(rng.borrow_mut().random::<u128>()))
    }

    fn new_span_id(&self) -> SpanId {
        CURRENT_RNG.with(|rng| SpanId::from(rng.borrow_mut().random::<u64>()))
    }
}

/// [`IdGenerator`] that hands out sequential ids, for predictable tests.
#[derive(Clone, Debug)]
pub struct IncrementIdGenerator(Arc<AtomicU64>);

impl IncrementIdGenerator {
    /// Create a generator starting at 1.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for IncrementIdGenerator {
    fn default() -> Self {
        Self(Arc::new(AtomicU64::new(1)))
    }
}

impl IdGenerator for IncrementIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        TraceId::from(self.0.fetch_add(1, Ordering::SeqCst) as u128)
    }

    fn new_span_id(&self) -> SpanId {
        SpanId::from(self.0.fetch_add(1, Ordering::SeqCst))
    }
}

struct TracerInner {
    scope: String,
    ids: Box<dyn IdGenerator>,
    processors: Arc<[Arc<dyn SpanProcessor>]>,
}

/// Creates spans and derives child contexts.
///
/// Tracers are explicitly constructed and cheap to clone; there is no global
/// instance, so tests can build isolated tracers over isolated processors.
#[derive(Clone)]
pub struct Tracer {
    inner: Arc<TracerInner>,
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("scope", &self.inner.scope)
            .finish()
    }
}

impl Tracer {
    /// Start building a tracer for the named instrumentation scope.
    pub fn builder(scope: impl Into<String>) -> TracerBuilder {
        TracerBuilder {
            scope: scope.into(),
            ids: None,
            processors: Vec::new(),
        }
    }

    /// The instrumentation scope this tracer was built for.
    pub fn scope(&self) -> &str {
        &self.inner.scope
    }

    /// Start a span, returning the derived child context and the live span.
    ///
    /// With a valid parent the child inherits the parent's trace id, flags,
    /// and baggage. Without one (absent or invalid) a fresh sampled root is
    /// minted; baggage from an invalid parent context is still inherited, so
    /// a request whose `traceparent` was malformed keeps its baggage.
    pub fn start_span(
        &self,
        name: impl Into<String>,
        kind: SpanKind,
        parent: Option<&TraceContext>,
    ) -> (TraceContext, Span) {
        let span_id = self.inner.ids.new_span_id();
        let (context, parent_span_id) = match parent {
            Some(parent) if parent.is_valid() => (parent.child(span_id), Some(parent.span_id())),
            other => {
                let mut root = TraceContext::new(
                    self.inner.ids.new_trace_id(),
                    span_id,
                    TraceFlags::SAMPLED,
                    false,
                );
                if let Some(invalid) = other {
                    root = root.with_baggage(invalid.baggage().clone());
                }
                (root, None)
            }
        };
        let span = Span::start(
            name.into(),
            kind,
            context.clone(),
            parent_span_id,
            Arc::clone(&self.inner.processors),
        );
        (context, span)
    }
}

/// Builder for [`Tracer`].
#[derive(Debug)]
pub struct TracerBuilder {
    scope: String,
    ids: Option<Box<dyn IdGenerator>>,
    processors: Vec<Arc<dyn SpanProcessor>>,
}

impl TracerBuilder {
    /// Use a custom id generator.
    pub fn with_id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Some(Box::new(ids));
        self
    }

    /// Attach a span processor. Processors run in registration order.
    pub fn with_processor(mut self, processor: Arc<dyn SpanProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    /// Attach a [`SimpleSpanProcessor`] over the given exporter.
    pub fn with_simple_exporter(self, exporter: impl SpanExporter + 'static) -> Self {
        self.with_processor(Arc::new(SimpleSpanProcessor::new(Box::new(exporter))))
    }

    /// Build the tracer.
    pub fn build(self) -> Tracer {
        Tracer {
            inner: Arc::new(TracerInner {
                scope: self.scope,
                ids: self.ids.unwrap_or_else(|| Box::new(RandomIdGenerator::default())),
                processors: self.processors.into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baggage::Baggage;
    use crate::export::InMemorySpanExporter;

    fn test_tracer() -> (Tracer, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let tracer = Tracer::builder("test")
            .with_id_generator(IncrementIdGenerator::new())
            .with_simple_exporter(exporter.clone())
            .build();
        (tracer, exporter)
    }

    #[test]
    fn root_span_mints_fresh_identity() {
        let (tracer, exporter) = test_tracer();
        let (cx, mut span) = tracer.start_span("root", SpanKind::Server, None);

        assert!(cx.is_valid());
        assert!(cx.is_sampled());
        span.end();

        let spans = exporter.finished_spans();
        assert_eq!(spans[0].parent_span_id, None);
        assert_eq!(spans[0].trace_id, cx.trace_id());
    }

    #[test]
    fn child_span_inherits_trace() {
        let (tracer, exporter) = test_tracer();
        let (root_cx, mut root) = tracer.start_span("root", SpanKind::Server, None);
        let (child_cx, mut child) = tracer.start_span("child", SpanKind::Client, Some(&root_cx));

        assert_eq!(child_cx.trace_id(), root_cx.trace_id());
        assert_ne!(child_cx.span_id(), root_cx.span_id());

        child.end();
        root.end();

        let spans = exporter.finished_spans();
        let child_data = spans.iter().find(|s| s.name == "child").unwrap();
        assert_eq!(child_data.parent_span_id, Some(root_cx.span_id()));
    }

    #[test]
    fn invalid_parent_mints_root_but_keeps_baggage() {
        let (tracer, _exporter) = test_tracer();
        let baggage: Baggage = [("session.id", "abc")].into_iter().collect();
        let invalid = TraceContext::empty().with_baggage(baggage.clone());

        let (cx, _span) = tracer.start_span("root", SpanKind::Server, Some(&invalid));
        assert!(cx.is_valid());
        assert_eq!(cx.baggage(), &baggage);
    }

    #[test]
    fn increment_ids_are_sequential() {
        let ids = IncrementIdGenerator::new();
        assert_eq!(ids.new_trace_id(), TraceId::from(1u128));
        assert_eq!(ids.new_span_id(), SpanId::from(2u64));
        assert_eq!(ids.new_span_id(), SpanId::from(3u64));
    }
}
