//! Per-service telemetry handle.
//!
//! Each service is handed an explicitly constructed [`Telemetry`] at startup
//! instead of reaching for process-global singletons. Tests build isolated
//! instances over in-memory exporters and inspect exactly the spans their
//! fleet produced.

use std::fmt;
use std::sync::Arc;

use tracecart::propagation::{CompositePropagator, TextMapPropagator};
use tracecart::{
    BatchSpanProcessor, IdGenerator, Meter, MetricSink, SimpleSpanProcessor, SpanExporter,
    SpanProcessor, TraceContext, Tracer, TracingMetricSink,
};
use tracecart_http::{HeaderExtractor, HeaderInjector};

/// The tracer, meter, and propagator of one service.
pub struct Telemetry {
    service: String,
    tracer: Tracer,
    meter: Meter,
    propagator: CompositePropagator,
    processors: Vec<Arc<dyn SpanProcessor>>,
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("service", &self.service)
            .finish()
    }
}

impl Telemetry {
    /// Start building telemetry for the named service.
    pub fn builder(service: impl Into<String>) -> TelemetryBuilder {
        TelemetryBuilder {
            service: service.into(),
            processors: Vec::new(),
            metric_sink: None,
            ids: None,
        }
    }

    /// The service name this telemetry was built for.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The service's tracer.
    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// The service's meter.
    pub fn meter(&self) -> &Meter {
        &self.meter
    }

    /// The configured propagator.
    pub fn propagator(&self) -> &CompositePropagator {
        &self.propagator
    }

    /// Extract the inbound trace context from request headers.
    ///
    /// Malformed headers yield an invalid context; the next `start_span`
    /// then mints a fresh root, so extraction never fails a request.
    pub fn extract_context(&self, headers: &http::HeaderMap) -> TraceContext {
        self.propagator.extract(&HeaderExtractor(headers))
    }

    /// Inject `cx` into outbound request headers.
    pub fn inject_context(&self, cx: &TraceContext, headers: &mut http::HeaderMap) {
        self.propagator.inject(cx, &mut HeaderInjector(headers));
    }

    /// Export everything buffered by this service's processors.
    pub async fn force_flush(&self) {
        for processor in &self.processors {
            if let Err(error) = processor.force_flush().await {
                tracing::warn!(service = %self.service, %error, "telemetry flush failed");
            }
        }
    }

    /// Flush and shut down this service's processors.
    pub async fn shutdown(&self) {
        for processor in &self.processors {
            if let Err(error) = processor.shutdown().await {
                tracing::warn!(service = %self.service, %error, "telemetry shutdown failed");
            }
        }
    }
}

/// Builder for [`Telemetry`].
pub struct TelemetryBuilder {
    service: String,
    processors: Vec<Arc<dyn SpanProcessor>>,
    metric_sink: Option<Arc<dyn MetricSink>>,
    ids: Option<Box<dyn IdGenerator>>,
}

impl fmt::Debug for TelemetryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryBuilder")
            .field("service", &self.service)
            .finish()
    }
}

impl TelemetryBuilder {
    /// Attach a span processor.
    pub fn with_span_processor(mut self, processor: Arc<dyn SpanProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    /// Export every span as it ends, without batching.
    pub fn with_simple_exporter(self, exporter: impl SpanExporter + 'static) -> Self {
        self.with_span_processor(Arc::new(SimpleSpanProcessor::new(Box::new(exporter))))
    }

    /// Batch spans through a bounded queue drained in the background.
    ///
    /// Must be called inside a tokio runtime.
    pub fn with_batch_exporter(self, exporter: impl SpanExporter + 'static) -> Self {
        self.with_span_processor(Arc::new(BatchSpanProcessor::builder(exporter).build()))
    }

    /// Send metric samples to the given sink instead of the logging default.
    pub fn with_metric_sink(mut self, sink: Arc<dyn MetricSink>) -> Self {
        self.metric_sink = Some(sink);
        self
    }

    /// Use a custom id generator.
    pub fn with_id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Some(Box::new(ids));
        self
    }

    /// Build the telemetry handle.
    pub fn build(self) -> Telemetry {
        let mut tracer_builder = Tracer::builder(self.service.clone());
        for processor in &self.processors {
            tracer_builder = tracer_builder.with_processor(Arc::clone(processor));
        }
        if let Some(ids) = self.ids {
            tracer_builder = tracer_builder.with_id_generator(ids);
        }
        let sink = self
            .metric_sink
            .unwrap_or_else(|| Arc::new(TracingMetricSink::default()));

        Telemetry {
            tracer: tracer_builder.build(),
            meter: Meter::new(self.service.clone(), sink),
            propagator: CompositePropagator::standard(),
            processors: self.processors,
            service: self.service,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracecart::{InMemorySpanExporter, SpanKind};

    #[test]
    fn isolated_instances_do_not_share_spans() {
        let exporter_a = InMemorySpanExporter::default();
        let exporter_b = InMemorySpanExporter::default();
        let a = Telemetry::builder("a")
            .with_simple_exporter(exporter_a.clone())
            .build();
        let b = Telemetry::builder("b")
            .with_simple_exporter(exporter_b.clone())
            .build();

        a.tracer().start_span("only-a", SpanKind::Internal, None).1.end();
        b.tracer().start_span("only-b", SpanKind::Internal, None).1.end();

        assert_eq!(exporter_a.finished_spans().len(), 1);
        assert_eq!(exporter_b.finished_spans().len(), 1);
        assert_eq!(exporter_a.finished_spans()[0].name, "only-a");
    }

    #[test]
    fn context_round_trips_through_headers() {
        let telemetry = Telemetry::builder("test")
            .with_simple_exporter(InMemorySpanExporter::default())
            .build();

        let (cx, _span) = telemetry
            .tracer()
            .start_span("root", SpanKind::Server, None);

        let mut headers = http::HeaderMap::new();
        telemetry.inject_context(&cx, &mut headers);
        let extracted = telemetry.extract_context(&headers);

        assert_eq!(extracted.trace_id(), cx.trace_id());
        assert_eq!(extracted.span_id(), cx.span_id());
        assert!(extracted.is_remote());
    }
}
