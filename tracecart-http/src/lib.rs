//! HTTP carriers and transport for tracecart.
//!
//! [`HeaderInjector`] and [`HeaderExtractor`] adapt `http::HeaderMap` to the
//! propagation carrier traits so trace context travels on plain HTTP
//! requests. [`HttpCollectorExporter`] ships finished span batches to an
//! external collector endpoint as JSON over HTTP.

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http_body_util::Full;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tracecart::propagation::{Extractor, Injector};
use tracecart::{ExportError, ExportResult, SpanData, SpanExporter};

/// Injects propagation fields into an `http::HeaderMap`.
///
/// Keys or values that are not valid HTTP header material are silently
/// skipped.
#[derive(Debug)]
pub struct HeaderInjector<'a>(pub &'a mut http::HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let Ok(name) = http::header::HeaderName::from_bytes(key.as_bytes()) {
            if let Ok(val) = http::header::HeaderValue::from_str(&value) {
                self.0.insert(name, val);
            }
        }
    }
}

/// Extracts propagation fields from an `http::HeaderMap`.
///
/// Values that are not valid ASCII read as absent.
#[derive(Debug)]
pub struct HeaderExtractor<'a>(pub &'a http::HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|name| name.as_str()).collect()
    }
}

/// Ships span batches to a collector endpoint as a JSON array over HTTP.
///
/// The collector contract is acknowledge-or-retry-later: a 2xx response
/// acknowledges the batch, `429`/`503` map to [`ExportError::RetryLater`],
/// and anything else fails the batch.
#[derive(Clone, Debug)]
pub struct HttpCollectorExporter {
    endpoint: http::Uri,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpCollectorExporter {
    /// Create an exporter posting to the given collector URI.
    pub fn new(endpoint: http::Uri) -> Self {
        HttpCollectorExporter {
            endpoint,
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    /// The collector endpoint this exporter posts to.
    pub fn endpoint(&self) -> &http::Uri {
        &self.endpoint
    }
}

impl SpanExporter for HttpCollectorExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        Box::pin(async move {
            let body = serde_json::to_vec(&batch)
                .map_err(|e| ExportError::Failed(format!("encoding span batch: {e}")))?;
            let request = http::Request::builder()
                .method(http::Method::POST)
                .uri(endpoint)
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(Full::new(Bytes::from(body)))
                .map_err(|e| ExportError::Failed(format!("building export request: {e}")))?;

            let response = client
                .request(request)
                .await
                .map_err(|e| ExportError::Failed(format!("collector unreachable: {e}")))?;

            match response.status() {
                status if status.is_success() => Ok(()),
                http::StatusCode::TOO_MANY_REQUESTS | http::StatusCode::SERVICE_UNAVAILABLE => {
                    Err(ExportError::RetryLater)
                }
                status => Err(ExportError::Failed(format!("collector returned {status}"))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracecart::propagation::{
        CompositePropagator, TextMapPropagator, BAGGAGE_HEADER, TRACEPARENT_HEADER,
    };
    use tracecart::{Baggage, SpanId, TraceContext, TraceFlags, TraceId};

    fn sample_context() -> TraceContext {
        TraceContext::new(
            TraceId::from(0x0af7_6519_16cd_43dd_8448_eb21_1c80_319c),
            SpanId::from(0xb7ad_6b71_6920_3331),
            TraceFlags::SAMPLED,
            false,
        )
        .with_baggage([("synthetic_request", "true")].into_iter().collect::<Baggage>())
    }

    #[test]
    fn header_map_round_trip() {
        let propagator = CompositePropagator::standard();
        let original = sample_context();

        let mut headers = http::HeaderMap::new();
        propagator.inject(&original, &mut HeaderInjector(&mut headers));

        assert_eq!(
            headers.get(TRACEPARENT_HEADER).unwrap(),
            "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01"
        );
        assert_eq!(headers.get(BAGGAGE_HEADER).unwrap(), "synthetic_request=true");

        let extracted = propagator.extract(&HeaderExtractor(&headers));
        assert_eq!(extracted.trace_id(), original.trace_id());
        assert_eq!(extracted.span_id(), original.span_id());
        assert_eq!(extracted.is_sampled(), original.is_sampled());
        assert_eq!(extracted.baggage(), original.baggage());
    }

    #[test]
    fn invalid_header_material_is_skipped() {
        let mut headers = http::HeaderMap::new();
        let mut injector = HeaderInjector(&mut headers);
        injector.set("bad header name", "value".to_string());
        injector.set("ok-name", "bad\nvalue".to_string());
        assert!(headers.is_empty());
    }

    #[test]
    fn non_ascii_value_reads_as_absent() {
        let mut headers = http::HeaderMap::new();
        headers.insert(
            TRACEPARENT_HEADER,
            http::HeaderValue::from_bytes(&[0xff, 0xfe]).unwrap(),
        );
        assert_eq!(HeaderExtractor(&headers).get(TRACEPARENT_HEADER), None);
    }
}
