//! HTTP plumbing shared by every service.
//!
//! Servers are plain hyper connections dispatching into an [`HttpHandler`];
//! outbound calls go through [`CallClient`], which wraps each call in a
//! child span, injects the trace headers, and enforces a bounded timeout.
//! A timed-out or failed call is terminal; nothing here retries.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracecart::{AttrValue, SpanKind, SpanStatus, TraceContext};

use crate::error::CallError;
use crate::telemetry::Telemetry;

/// Response body type used by every handler.
pub type Body = BoxBody<Bytes, hyper::Error>;

/// Default bound on one outbound downstream call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a full response body.
pub fn full(bytes: impl Into<Bytes>) -> Body {
    Full::new(bytes.into()).map_err(|err| match err {}).boxed()
}

/// A JSON response with the given status.
pub fn json_response(status: StatusCode, value: &impl Serialize) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = Response::new(full(body));
            *response.status_mut() = status;
            response.headers_mut().insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("application/json"),
            );
            response
        }
        Err(error) => {
            tracing::error!(%error, "failed to encode response body");
            let mut response = Response::new(full(Bytes::new()));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

/// A JSON error body `{"error": message}` with the given status.
pub fn error_response(status: StatusCode, message: &str) -> Response<Body> {
    json_response(status, &serde_json::json!({ "error": message }))
}

/// The fixed `/health` payload.
pub fn health_response() -> Response<Body> {
    json_response(StatusCode::OK, &serde_json::json!({ "status": "ok" }))
}

/// An empty 404 response.
pub fn not_found() -> Response<Body> {
    let mut response = Response::new(full(Bytes::new()));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

/// Read a query parameter from a request URI.
pub fn query_param(uri: &http::Uri, key: &str) -> Option<String> {
    uri.query().and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    })
}

/// Collect the request body; an unreadable body reads as empty.
pub async fn read_body(req: Request<Incoming>) -> Bytes {
    req.into_body()
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_default()
}

/// One service's request dispatcher.
#[async_trait]
pub trait HttpHandler: Send + Sync + 'static {
    /// Handle one request.
    async fn handle(&self, req: Request<Incoming>) -> Response<Body>;
}

/// Serve connections from `listener` into `handler` until the task is
/// aborted.
pub async fn serve(listener: TcpListener, handler: Arc<dyn HttpHandler>) {
    loop {
        let (stream, _peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(error) => {
                tracing::warn!(%error, "accept failed");
                continue;
            }
        };
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let handler = Arc::clone(&handler);
                async move { Ok::<_, Infallible>(handler.handle(req).await) }
            });
            if let Err(error) = ConnBuilder::new(TokioExecutor::new())
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                tracing::debug!(%error, "connection error");
            }
        });
    }
}

/// Bind `addr` and serve `handler` on a background task.
///
/// Returns the bound address (useful with port 0) and the server task.
pub async fn spawn_server(
    addr: SocketAddr,
    handler: Arc<dyn HttpHandler>,
) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    let task = tokio::spawn(serve(listener, handler));
    Ok((local_addr, task))
}

/// One traced outbound call.
#[derive(Debug)]
pub struct OutboundCall<'a> {
    /// Span name for the call.
    pub name: &'static str,
    /// Span kind; client for HTTP steps, internal for store sub-steps.
    pub kind: SpanKind,
    /// HTTP method.
    pub method: Method,
    /// Full request URL.
    pub url: String,
    /// Context the call span is parented under.
    pub parent: &'a TraceContext,
    /// Extra attributes set on the call span.
    pub attributes: Vec<(&'static str, AttrValue)>,
}

impl<'a> OutboundCall<'a> {
    /// A call with no extra attributes.
    pub fn new(
        name: &'static str,
        kind: SpanKind,
        method: Method,
        url: String,
        parent: &'a TraceContext,
    ) -> Self {
        OutboundCall {
            name,
            kind,
            method,
            url,
            parent,
            attributes: Vec::new(),
        }
    }
}

/// Traced HTTP client for downstream calls.
///
/// Every call gets its own span (child of the supplied parent context), the
/// `traceparent`/`baggage` headers, and a bounded timeout. Timeouts and
/// transport errors surface as [`CallError`] after being recorded on the
/// call span.
#[derive(Clone, Debug)]
pub struct CallClient {
    telemetry: Arc<Telemetry>,
    client: Client<HttpConnector, Full<Bytes>>,
    timeout: Duration,
}

impl CallClient {
    /// Create a client reporting through the given telemetry.
    pub fn new(telemetry: Arc<Telemetry>) -> Self {
        CallClient {
            telemetry,
            client: Client::builder(TokioExecutor::new()).build_http(),
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Override the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Issue the call, returning the response body on 2xx.
    pub async fn call(&self, call: OutboundCall<'_>) -> Result<Bytes, CallError> {
        let (cx, mut span) =
            self.telemetry
                .tracer()
                .start_span(call.name, call.kind, Some(call.parent));
        span.set_attribute("http.request.method", call.method.as_str());
        span.set_attribute("url.full", call.url.clone());
        for (key, value) in call.attributes {
            span.set_attribute(key, value);
        }

        let mut request = match Request::builder()
            .method(call.method)
            .uri(&call.url)
            .body(Full::new(Bytes::new()))
        {
            Ok(request) => request,
            Err(error) => {
                let err = CallError::Transport(error.to_string());
                span.record_error(&err);
                return Err(err);
            }
        };
        self.telemetry.inject_context(&cx, request.headers_mut());

        let response = match tokio::time::timeout(self.timeout, self.client.request(request)).await
        {
            Err(_elapsed) => {
                let err = CallError::Timeout(self.timeout);
                span.record_error(&err);
                return Err(err);
            }
            Ok(Err(error)) => {
                let err = CallError::Transport(error.to_string());
                span.record_error(&err);
                return Err(err);
            }
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        span.set_attribute("http.response.status_code", i64::from(status.as_u16()));
        if !status.is_success() {
            let err = CallError::Status(status.as_u16());
            span.record_error(&err);
            return Err(err);
        }

        match response.into_body().collect().await {
            Ok(collected) => {
                span.set_status(SpanStatus::Ok);
                span.end();
                Ok(collected.to_bytes())
            }
            Err(error) => {
                let err = CallError::Body(error.to_string());
                span.record_error(&err);
                Err(err)
            }
        }
    }

    /// Issue the call and decode the JSON response body.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        call: OutboundCall<'_>,
    ) -> Result<T, CallError> {
        let bytes = self.call(call).await?;
        serde_json::from_slice(&bytes).map_err(|e| CallError::Body(e.to_string()))
    }
}
