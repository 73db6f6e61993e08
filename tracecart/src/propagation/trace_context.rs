//! W3C-style `traceparent` propagation.

use crate::context::TraceContext;
use crate::ident::{SpanId, TraceFlags, TraceId};
use crate::propagation::{Extractor, Injector, TextMapPropagator};

const SUPPORTED_VERSION: u8 = 0;
const MAX_VERSION: u8 = 254;

/// Header carrying the trace identity.
pub const TRACEPARENT_HEADER: &str = "traceparent";

const FIELDS: [&str; 1] = [TRACEPARENT_HEADER];

/// Propagates the trace identity under the `traceparent` header in the
/// hyphen-delimited `version-traceid-spanid-flags` format, e.g.
///
/// `traceparent: 00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01`
///
/// All four fields are lowercase hex. Extraction validates the encoding and
/// treats anything malformed as absent; it never fails.
#[derive(Clone, Debug, Default)]
pub struct TraceContextPropagator {
    _private: (),
}

impl TraceContextPropagator {
    /// Create a new `TraceContextPropagator`.
    pub fn new() -> Self {
        TraceContextPropagator { _private: () }
    }

    fn extract_identity(
        &self,
        extractor: &dyn Extractor,
    ) -> Result<(TraceId, SpanId, TraceFlags), ()> {
        let header_value = extractor.get(TRACEPARENT_HEADER).unwrap_or("").trim();
        let parts = header_value.split_terminator('-').collect::<Vec<&str>>();
        if parts.len() < 4 {
            return Err(());
        }

        // For version 0 there must be exactly 4 parts.
        let version = u8::from_str_radix(parts[0], 16).map_err(|_| ())?;
        if version > MAX_VERSION || version == 0 && parts.len() != 4 {
            return Err(());
        }

        // Ids must be lowercase on the wire.
        if parts[1].chars().any(|c| c.is_ascii_uppercase())
            || parts[2].chars().any(|c| c.is_ascii_uppercase())
        {
            return Err(());
        }
        if parts[1].len() != 32 || parts[2].len() != 16 {
            return Err(());
        }

        let trace_id = TraceId::from_hex(parts[1]).map_err(|_| ())?;
        let span_id = SpanId::from_hex(parts[2]).map_err(|_| ())?;
        if trace_id == TraceId::INVALID || span_id == SpanId::INVALID {
            return Err(());
        }

        let opts = u8::from_str_radix(parts[3], 16).map_err(|_| ())?;
        if version == 0 && opts > 2 {
            return Err(());
        }

        // Clear everything but the sampled bit.
        Ok((trace_id, span_id, TraceFlags::new(opts) & TraceFlags::SAMPLED))
    }
}

impl TextMapPropagator for TraceContextPropagator {
    fn inject(&self, cx: &TraceContext, injector: &mut dyn Injector) {
        if cx.is_valid() {
            let header_value = format!(
                "{:02x}-{:032x}-{:016x}-{:02x}",
                SUPPORTED_VERSION,
                cx.trace_id(),
                cx.span_id(),
                cx.flags() & TraceFlags::SAMPLED,
            );
            injector.set(TRACEPARENT_HEADER, header_value);
        }
    }

    fn extract_with_context(&self, cx: &TraceContext, extractor: &dyn Extractor) -> TraceContext {
        self.extract_identity(extractor)
            .map(|(trace_id, span_id, flags)| {
                TraceContext::new(trace_id, span_id, flags, true)
                    .with_baggage(cx.baggage().clone())
            })
            .unwrap_or_else(|_| cx.clone())
    }

    fn fields(&self) -> &[&'static str] {
        &FIELDS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cx(trace_id: u128, span_id: u64, flags: TraceFlags) -> TraceContext {
        TraceContext::new(TraceId::from(trace_id), SpanId::from(span_id), flags, true)
    }

    #[rustfmt::skip]
    fn extract_data() -> Vec<(&'static str, TraceContext)> {
        vec![
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00", cx(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736, 0x00f0_67aa_0ba9_02b7, TraceFlags::default())),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01", cx(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736, 0x00f0_67aa_0ba9_02b7, TraceFlags::SAMPLED)),
            ("02-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-09", cx(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736, 0x00f0_67aa_0ba9_02b7, TraceFlags::SAMPLED)),
            ("02-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-08", cx(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736, 0x00f0_67aa_0ba9_02b7, TraceFlags::default())),
            ("02-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-09-XYZxsf09", cx(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736, 0x00f0_67aa_0ba9_02b7, TraceFlags::SAMPLED)),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01-", cx(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736, 0x00f0_67aa_0ba9_02b7, TraceFlags::SAMPLED)),
        ]
    }

    #[rustfmt::skip]
    fn extract_data_invalid() -> Vec<(&'static str, &'static str)> {
        vec![
            ("0000-00000000000000000000000000000000-0000000000000000-01", "wrong version length"),
            ("00-ab00000000000000000000000000000000-cd00000000000000-01", "wrong trace id length"),
            ("00-ab000000000000000000000000000000-cd0000000000000000-01", "wrong span id length"),
            ("qw-00000000000000000000000000000000-0000000000000000-01", "bogus version"),
            ("00-qw000000000000000000000000000000-cd00000000000000-01", "bogus trace id"),
            ("00-ab000000000000000000000000000000-qw00000000000000-01", "bogus span id"),
            ("00-ab000000000000000000000000000000-cd00000000000000-qw", "bogus trace flags"),
            ("A0-00000000000000000000000000000000-0000000000000000-01", "uppercase version"),
            ("00-AB000000000000000000000000000000-cd00000000000000-01", "uppercase trace id"),
            ("00-ab000000000000000000000000000000-CD00000000000000-01", "uppercase span id"),
            ("00-00000000000000000000000000000000-0000000000000000-01", "zero trace id and span id"),
            ("00-ab000000000000000000000000000000-cd00000000000000-09", "unused flag bits set"),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7", "missing flags"),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-", "empty flags"),
            ("", "empty header"),
            ("00-", "incomplete"),
            ("00--4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01", "double separator"),
        ]
    }

    #[test]
    fn extract_traceparent() {
        let propagator = TraceContextPropagator::new();
        for (header, expected) in extract_data() {
            let mut carrier = HashMap::new();
            Injector::set(&mut carrier, TRACEPARENT_HEADER, header.to_string());
            assert_eq!(propagator.extract(&carrier), expected, "header: {header}");
        }
    }

    #[test]
    fn extract_rejects_malformed() {
        let propagator = TraceContextPropagator::new();
        for (header, reason) in extract_data_invalid() {
            let mut carrier = HashMap::new();
            Injector::set(&mut carrier, TRACEPARENT_HEADER, header.to_string());
            assert!(!propagator.extract(&carrier).is_valid(), "{reason}");
        }
    }

    #[test]
    fn inject_traceparent() {
        let propagator = TraceContextPropagator::new();
        let cases = vec![
            (
                cx(
                    0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736,
                    0x00f0_67aa_0ba9_02b7,
                    TraceFlags::SAMPLED,
                ),
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            ),
            (
                cx(
                    0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736,
                    0x00f0_67aa_0ba9_02b7,
                    TraceFlags::new(0xff),
                ),
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            ),
        ];

        for (context, expected) in cases {
            let mut carrier: HashMap<String, String> = HashMap::new();
            propagator.inject(&context, &mut carrier);
            assert_eq!(
                Extractor::get(&carrier, TRACEPARENT_HEADER),
                Some(expected)
            );
        }
    }

    #[test]
    fn inject_skips_invalid_context() {
        let propagator = TraceContextPropagator::new();
        let mut carrier: HashMap<String, String> = HashMap::new();
        propagator.inject(&TraceContext::empty(), &mut carrier);
        assert!(carrier.is_empty());
    }

    #[test]
    fn round_trip_preserves_identity() {
        let propagator = TraceContextPropagator::new();
        let original = cx(0x0af7_6519_16cd_43dd_8448_eb21_1c80_319c, 0xb7ad_6b71_6920_3331, TraceFlags::SAMPLED);

        let mut carrier: HashMap<String, String> = HashMap::new();
        propagator.inject(&original, &mut carrier);
        let extracted = propagator.extract(&carrier);

        assert_eq!(extracted.trace_id(), original.trace_id());
        assert_eq!(extracted.span_id(), original.span_id());
        assert_eq!(extracted.is_sampled(), original.is_sampled());
    }
}
