//! Context propagation over text carriers.
//!
//! Propagators read and write a [`TraceContext`] to string key/value
//! carriers such as HTTP header maps. The carrier is abstracted behind the
//! [`Injector`] and [`Extractor`] traits so transports only need to adapt
//! their header type once.

use std::collections::HashMap;
use std::fmt;

use crate::context::TraceContext;

mod baggage;
mod composite;
mod trace_context;

pub use baggage::{BaggagePropagator, BAGGAGE_HEADER};
pub use composite::CompositePropagator;
pub use trace_context::{TraceContextPropagator, TRACEPARENT_HEADER};

/// Write access to a text carrier.
pub trait Injector {
    /// Add a key and value to the carrier.
    fn set(&mut self, key: &str, value: String);
}

/// Read access to a text carrier.
pub trait Extractor {
    /// Get the value for a key, if present.
    fn get(&self, key: &str) -> Option<&str>;

    /// All keys present in the carrier.
    fn keys(&self) -> Vec<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(|v| v.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        self.keys().map(|k| k.as_str()).collect()
    }
}

/// Encodes a [`TraceContext`] into a carrier and decodes it back.
///
/// Extraction never fails: a missing or malformed carrier yields a context
/// that is simply not valid (or not carrying the concern in question), and
/// the caller mints a fresh root when starting the next span.
pub trait TextMapPropagator: fmt::Debug + Send + Sync {
    /// Write the parts of `cx` this propagator owns into the carrier.
    fn inject(&self, cx: &TraceContext, injector: &mut dyn Injector);

    /// Read this propagator's parts from the carrier, merging them into `cx`.
    fn extract_with_context(
        &self,
        cx: &TraceContext,
        extractor: &dyn Extractor,
    ) -> TraceContext;

    /// Read from the carrier starting from an empty context.
    fn extract(&self, extractor: &dyn Extractor) -> TraceContext {
        self.extract_with_context(&TraceContext::empty(), extractor)
    }

    /// The carrier keys this propagator reads and writes.
    fn fields(&self) -> &[&'static str];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_map_carrier_is_case_insensitive() {
        let mut carrier = HashMap::new();
        Injector::set(&mut carrier, "HeaderName", "value".to_string());

        assert_eq!(Extractor::get(&carrier, "HEADERNAME"), Some("value"));
        assert_eq!(Extractor::get(&carrier, "headername"), Some("value"));
        assert_eq!(Extractor::get(&carrier, "missing"), None);
        assert_eq!(Extractor::keys(&carrier), vec!["headername"]);
    }
}
