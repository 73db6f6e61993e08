//! Email service: order confirmations with a small simulated send failure.

use std::sync::Arc;

use async_trait::async_trait;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use tracecart::{Counter, SpanKind, SpanStatus};

use crate::http::{
    error_response, health_response, json_response, not_found, query_param, Body, HttpHandler,
};
use crate::outcome::OutcomeSampler;
use crate::telemetry::Telemetry;

/// Per-request probability of a simulated send failure.
pub const SEND_FAILURE_PROBABILITY: f64 = 0.01;

#[derive(Debug)]
pub struct EmailService {
    telemetry: Arc<Telemetry>,
    sampler: Arc<dyn OutcomeSampler>,
    sent: Counter,
}

impl EmailService {
    pub fn new(telemetry: Arc<Telemetry>, sampler: Arc<dyn OutcomeSampler>) -> Self {
        let sent = telemetry
            .meter()
            .u64_counter("app.email.confirmations")
            .with_description("Confirmation sends by outcome")
            .with_unit("{emails}")
            .build();
        EmailService {
            telemetry,
            sampler,
            sent,
        }
    }

    fn send_confirmation(&self, req: &Request<Incoming>) -> Response<Body> {
        let parent = self.telemetry.extract_context(req.headers());
        let (_cx, mut span) =
            self.telemetry
                .tracer()
                .start_span("SendConfirmation", SpanKind::Server, Some(&parent));

        if let Some(order_id) = query_param(req.uri(), "order_id") {
            span.set_attribute("app.order.id", order_id);
        }
        if let Some(user_id) = query_param(req.uri(), "user_id") {
            span.set_attribute("app.user.id", user_id);
        }

        if self.sampler.happens(SEND_FAILURE_PROBABILITY) {
            span.set_status(SpanStatus::error("smtp relay rejected message"));
            self.sent.add(1, &[("status", "failed")]);
            tracing::warn!("confirmation send failed");
            span.end();
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "send failed");
        }

        self.sent.add(1, &[("status", "sent")]);
        tracing::info!("confirmation sent");

        span.set_status(SpanStatus::Ok);
        span.end();
        json_response(StatusCode::OK, &serde_json::json!({ "status": "sent" }))
    }
}

#[async_trait]
impl HttpHandler for EmailService {
    async fn handle(&self, req: Request<Incoming>) -> Response<Body> {
        match (req.method(), req.uri().path()) {
            (&Method::POST, "/send") => self.send_confirmation(&req),
            (&Method::GET, "/health") => health_response(),
            _ => not_found(),
        }
    }
}
