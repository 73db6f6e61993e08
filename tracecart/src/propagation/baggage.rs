//! Baggage propagation.

use crate::baggage::Baggage;
use crate::context::TraceContext;
use crate::propagation::{Extractor, Injector, TextMapPropagator};

/// Header carrying the baggage side-channel.
pub const BAGGAGE_HEADER: &str = "baggage";

const FIELDS: [&str; 1] = [BAGGAGE_HEADER];

/// Propagates baggage entries under the `baggage` header as a
/// comma-separated `key=value` list.
///
/// Extraction is tolerant: malformed entries are skipped, a missing header
/// yields empty baggage, and the operation never fails.
#[derive(Clone, Debug, Default)]
pub struct BaggagePropagator {
    _private: (),
}

impl BaggagePropagator {
    /// Create a new `BaggagePropagator`.
    pub fn new() -> Self {
        BaggagePropagator { _private: () }
    }
}

impl TextMapPropagator for BaggagePropagator {
    fn inject(&self, cx: &TraceContext, injector: &mut dyn Injector) {
        if !cx.baggage().is_empty() {
            injector.set(BAGGAGE_HEADER, cx.baggage().to_header());
        }
    }

    fn extract_with_context(&self, cx: &TraceContext, extractor: &dyn Extractor) -> TraceContext {
        match extractor.get(BAGGAGE_HEADER) {
            Some(header) if !header.is_empty() => {
                cx.clone().with_baggage(Baggage::from_header(header))
            }
            _ => cx.clone(),
        }
    }

    fn fields(&self) -> &[&'static str] {
        &FIELDS
    }
}
