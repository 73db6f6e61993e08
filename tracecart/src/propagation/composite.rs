//! Chaining of multiple propagators over one carrier.

use crate::context::TraceContext;
use crate::propagation::{
    BaggagePropagator, Extractor, Injector, TextMapPropagator, TraceContextPropagator,
};

/// Runs a list of propagators against the same carrier.
///
/// Injection writes each propagator's fields in turn; extraction threads the
/// context through each propagator so the results merge (trace identity from
/// one, baggage from another).
#[derive(Debug)]
pub struct CompositePropagator {
    propagators: Vec<Box<dyn TextMapPropagator>>,
    fields: Vec<&'static str>,
}

impl CompositePropagator {
    /// Build a composite from the given propagators.
    pub fn new(propagators: Vec<Box<dyn TextMapPropagator>>) -> Self {
        let fields = propagators
            .iter()
            .flat_map(|p| p.fields())
            .copied()
            .collect();
        CompositePropagator {
            propagators,
            fields,
        }
    }

    /// The standard pair: trace identity plus baggage.
    pub fn standard() -> Self {
        CompositePropagator::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(BaggagePropagator::new()),
        ])
    }
}

impl Default for CompositePropagator {
    fn default() -> Self {
        CompositePropagator::standard()
    }
}

impl TextMapPropagator for CompositePropagator {
    fn inject(&self, cx: &TraceContext, injector: &mut dyn Injector) {
        for propagator in &self.propagators {
            propagator.inject(cx, injector);
        }
    }

    fn extract_with_context(&self, cx: &TraceContext, extractor: &dyn Extractor) -> TraceContext {
        self.propagators
            .iter()
            .fold(cx.clone(), |cx, propagator| {
                propagator.extract_with_context(&cx, extractor)
            })
    }

    fn fields(&self) -> &[&'static str] {
        &self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baggage::Baggage;
    use crate::ident::{SpanId, TraceFlags, TraceId};
    use crate::propagation::{BAGGAGE_HEADER, TRACEPARENT_HEADER};
    use std::collections::HashMap;

    #[test]
    fn round_trip_preserves_identity_and_baggage() {
        let propagator = CompositePropagator::standard();
        let baggage: Baggage = [("session.id", "abc"), ("synthetic_request", "true")]
            .into_iter()
            .collect();
        let original = TraceContext::new(
            TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736),
            SpanId::from(0x00f0_67aa_0ba9_02b7),
            TraceFlags::SAMPLED,
            false,
        )
        .with_baggage(baggage.clone());

        let mut carrier: HashMap<String, String> = HashMap::new();
        propagator.inject(&original, &mut carrier);

        let extracted = propagator.extract(&carrier);
        assert_eq!(extracted.trace_id(), original.trace_id());
        assert_eq!(extracted.span_id(), original.span_id());
        assert_eq!(extracted.is_sampled(), original.is_sampled());
        assert_eq!(extracted.baggage(), &baggage);
        assert!(extracted.is_remote());
    }

    #[test]
    fn baggage_survives_malformed_traceparent() {
        let propagator = CompositePropagator::standard();
        let mut carrier: HashMap<String, String> = HashMap::new();
        Injector::set(&mut carrier, TRACEPARENT_HEADER, "not-a-context".to_string());
        Injector::set(&mut carrier, BAGGAGE_HEADER, "user_id=7".to_string());

        let extracted = propagator.extract(&carrier);
        assert!(!extracted.is_valid());
        assert_eq!(extracted.baggage().get("user_id"), Some("7"));
    }

    #[test]
    fn fields_cover_both_headers() {
        let propagator = CompositePropagator::standard();
        assert_eq!(propagator.fields(), &[TRACEPARENT_HEADER, BAGGAGE_HEADER]);
    }
}
