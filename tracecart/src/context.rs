//! The propagated identity of a unit of work.

use crate::baggage::Baggage;
use crate::ident::{SpanId, TraceFlags, TraceId};

/// The causal identity carried across process boundaries: which trace this
/// work belongs to, which span is the current parent, whether the trace is
/// sampled, and the baggage side-channel.
///
/// A `TraceContext` is immutable once created. Entering a child span derives
/// a new context (same trace id, flags, and baggage; fresh span id) rather
/// than mutating the parent's.
#[derive(Clone, Debug, PartialEq)]
pub struct TraceContext {
    trace_id: TraceId,
    span_id: SpanId,
    flags: TraceFlags,
    remote: bool,
    baggage: Baggage,
}

impl TraceContext {
    /// An invalid context with no identity and no baggage.
    ///
    /// Extraction returns this (possibly with baggage attached) when the
    /// inbound headers are absent or malformed; starting a span from it
    /// mints a fresh root.
    pub fn empty() -> Self {
        TraceContext {
            trace_id: TraceId::INVALID,
            span_id: SpanId::INVALID,
            flags: TraceFlags::NOT_SAMPLED,
            remote: false,
            baggage: Baggage::new(),
        }
    }

    /// Construct a context from its identity parts.
    pub fn new(trace_id: TraceId, span_id: SpanId, flags: TraceFlags, remote: bool) -> Self {
        TraceContext {
            trace_id,
            span_id,
            flags,
            remote,
            baggage: Baggage::new(),
        }
    }

    /// Return a copy of this context carrying the given baggage.
    pub fn with_baggage(mut self, baggage: Baggage) -> Self {
        self.baggage = baggage;
        self
    }

    /// The trace id.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The span id of the current span.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// The trace flags.
    pub fn flags(&self) -> TraceFlags {
        self.flags
    }

    /// Returns `true` if the sampled flag is set.
    pub fn is_sampled(&self) -> bool {
        self.flags.is_sampled()
    }

    /// Returns `true` if this context was extracted from a remote carrier.
    pub fn is_remote(&self) -> bool {
        self.remote
    }

    /// The baggage attached to this context.
    pub fn baggage(&self) -> &Baggage {
        &self.baggage
    }

    /// Returns `true` if both trace id and span id are non-zero.
    pub fn is_valid(&self) -> bool {
        self.trace_id != TraceId::INVALID && self.span_id != SpanId::INVALID
    }

    /// Derive the context of a child span: same trace id, flags, and
    /// baggage; the given span id; local rather than remote.
    pub(crate) fn child(&self, span_id: SpanId) -> TraceContext {
        TraceContext {
            trace_id: self.trace_id,
            span_id,
            flags: self.flags,
            remote: false,
            baggage: self.baggage.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity() {
        assert!(!TraceContext::empty().is_valid());
        assert!(!TraceContext::new(
            TraceId::from(1),
            SpanId::INVALID,
            TraceFlags::SAMPLED,
            false
        )
        .is_valid());
        assert!(
            TraceContext::new(TraceId::from(1), SpanId::from(2), TraceFlags::SAMPLED, true)
                .is_valid()
        );
    }

    #[test]
    fn child_keeps_identity_and_baggage() {
        let baggage: Baggage = [("session.id", "abc")].into_iter().collect();
        let parent = TraceContext::new(
            TraceId::from(7),
            SpanId::from(1),
            TraceFlags::SAMPLED,
            true,
        )
        .with_baggage(baggage.clone());

        let child = parent.child(SpanId::from(2));
        assert_eq!(child.trace_id(), parent.trace_id());
        assert_eq!(child.span_id(), SpanId::from(2));
        assert_eq!(child.flags(), parent.flags());
        assert!(!child.is_remote());
        assert_eq!(child.baggage(), &baggage);
    }
}
