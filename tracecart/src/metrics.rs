//! Metric instruments.
//!
//! Counters and histograms emit append-only [`MetricSample`]s into a
//! [`MetricSink`]. There is no aggregation pipeline here: the harness only
//! needs outcome-labeled samples that a sink can store or forward. Samples
//! are never mutated after emission and sinks must accept concurrent
//! recording from any number of in-flight transactions.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use serde::Serialize;

/// The instrument kind a sample came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    /// Monotonic counter increment.
    Counter,
    /// Histogram value recording.
    Histogram,
}

/// One counter increment or histogram recording.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricSample {
    /// Instrument name, e.g. `app.checkout.orders_total`.
    pub name: String,
    /// Instrument kind.
    pub kind: InstrumentKind,
    /// Recorded value (counter increments are widened to `f64`).
    pub value: f64,
    /// Outcome labels attached at record time.
    pub labels: Vec<(String, String)>,
    /// When the sample was recorded.
    pub timestamp: SystemTime,
}

impl MetricSample {
    /// Look up a label value by key.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Receives metric samples.
pub trait MetricSink: Send + Sync + fmt::Debug {
    /// Record one sample.
    fn record(&self, sample: MetricSample);
}

/// Sink that stores samples in memory, for tests and inspection.
#[derive(Clone, Debug, Default)]
pub struct InMemoryMetricSink {
    samples: Arc<Mutex<Vec<MetricSample>>>,
}

impl InMemoryMetricSink {
    /// All samples recorded so far.
    pub fn samples(&self) -> Vec<MetricSample> {
        self.samples
            .lock()
            .map(|samples| samples.clone())
            .unwrap_or_default()
    }

    /// Clear the stored samples.
    pub fn reset(&self) {
        if let Ok(mut samples) = self.samples.lock() {
            samples.clear();
        }
    }
}

impl MetricSink for InMemoryMetricSink {
    fn record(&self, sample: MetricSample) {
        if let Ok(mut samples) = self.samples.lock() {
            samples.push(sample);
        }
    }
}

/// Sink that emits each sample as a `tracing` debug event.
#[derive(Clone, Debug, Default)]
pub struct TracingMetricSink {
    _private: (),
}

impl MetricSink for TracingMetricSink {
    fn record(&self, sample: MetricSample) {
        tracing::debug!(
            target: "tracecart::metrics",
            name = %sample.name,
            kind = ?sample.kind,
            value = sample.value,
            labels = ?sample.labels,
            "metric sample"
        );
    }
}

/// Factory for instruments bound to one instrumentation scope and sink.
#[derive(Clone, Debug)]
pub struct Meter {
    scope: String,
    sink: Arc<dyn MetricSink>,
}

impl Meter {
    /// Create a meter for the named scope over the given sink.
    pub fn new(scope: impl Into<String>, sink: Arc<dyn MetricSink>) -> Self {
        Meter {
            scope: scope.into(),
            sink,
        }
    }

    /// The instrumentation scope this meter was built for.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Start building a counter.
    pub fn u64_counter(&self, name: impl Into<String>) -> InstrumentBuilder<Counter> {
        InstrumentBuilder::new(name.into(), Arc::clone(&self.sink))
    }

    /// Start building a histogram.
    pub fn f64_histogram(&self, name: impl Into<String>) -> InstrumentBuilder<Histogram> {
        InstrumentBuilder::new(name.into(), Arc::clone(&self.sink))
    }
}

/// Builder carrying the optional description and unit of an instrument.
#[derive(Debug)]
pub struct InstrumentBuilder<T> {
    name: String,
    description: Option<String>,
    unit: Option<String>,
    sink: Arc<dyn MetricSink>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: FromParts> InstrumentBuilder<T> {
    fn new(name: String, sink: Arc<dyn MetricSink>) -> Self {
        InstrumentBuilder {
            name,
            description: None,
            unit: None,
            sink,
            _marker: std::marker::PhantomData,
        }
    }

    /// Human-readable description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Unit annotation, e.g. `ms` or `{orders}`.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Build the instrument.
    pub fn build(self) -> T {
        T::from_parts(InstrumentInner {
            name: self.name,
            description: self.description,
            unit: self.unit,
            sink: self.sink,
        })
    }
}

#[doc(hidden)]
#[derive(Clone, Debug)]
pub struct InstrumentInner {
    name: String,
    #[allow(dead_code)]
    description: Option<String>,
    #[allow(dead_code)]
    unit: Option<String>,
    sink: Arc<dyn MetricSink>,
}

impl InstrumentInner {
    fn emit(&self, kind: InstrumentKind, value: f64, labels: &[(&str, &str)]) {
        self.sink.record(MetricSample {
            name: self.name.clone(),
            kind,
            value,
            labels: labels
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            timestamp: SystemTime::now(),
        });
    }
}

#[doc(hidden)]
pub trait FromParts {
    #[doc(hidden)]
    fn from_parts(inner: InstrumentInner) -> Self;
}

/// Monotonic counter.
#[derive(Clone, Debug)]
pub struct Counter {
    inner: InstrumentInner,
}

impl FromParts for Counter {
    fn from_parts(inner: InstrumentInner) -> Self {
        Counter { inner }
    }
}

impl Counter {
    /// Add `value` with the given labels.
    pub fn add(&self, value: u64, labels: &[(&str, &str)]) {
        self.inner.emit(InstrumentKind::Counter, value as f64, labels);
    }
}

/// Histogram of observed values.
#[derive(Clone, Debug)]
pub struct Histogram {
    inner: InstrumentInner,
}

impl FromParts for Histogram {
    fn from_parts(inner: InstrumentInner) -> Self {
        Histogram { inner }
    }
}

impl Histogram {
    /// Record one observation with the given labels.
    pub fn record(&self, value: f64, labels: &[(&str, &str)]) {
        self.inner.emit(InstrumentKind::Histogram, value, labels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_and_histogram_emit_labeled_samples() {
        let sink = InMemoryMetricSink::default();
        let meter = Meter::new("checkout", Arc::new(sink.clone()));

        let orders = meter
            .u64_counter("app.checkout.orders_total")
            .with_description("Total number of orders placed")
            .with_unit("{orders}")
            .build();
        let latency = meter
            .f64_histogram("app.checkout.latency")
            .with_unit("ms")
            .build();

        orders.add(1, &[("currency", "USD"), ("status", "success")]);
        latency.record(12.5, &[("currency", "USD")]);

        let samples = sink.samples();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].name, "app.checkout.orders_total");
        assert_eq!(samples[0].kind, InstrumentKind::Counter);
        assert_eq!(samples[0].value, 1.0);
        assert_eq!(samples[0].label("status"), Some("success"));
        assert_eq!(samples[1].kind, InstrumentKind::Histogram);
        assert_eq!(samples[1].value, 12.5);
    }

    #[test]
    fn concurrent_recording_is_safe() {
        let sink = InMemoryMetricSink::default();
        let meter = Meter::new("test", Arc::new(sink.clone()));
        let counter = meter.u64_counter("ops").build();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        counter.add(1, &[]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(sink.samples().len(), 800);
    }
}
