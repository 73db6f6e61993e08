//! Fraud detection service: consumes published order events and flags a
//! fixed-probability fraction as fraudulent.

use std::sync::Arc;

use async_trait::async_trait;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use tracecart::{AttrValue, Counter, SpanKind, SpanStatus, TraceContext};

use crate::http::{health_response, json_response, not_found, Body, HttpHandler};
use crate::outcome::{random_token, OutcomeSampler};
use crate::telemetry::Telemetry;

/// Per-order probability of a simulated fraud flag.
pub const FRAUD_PROBABILITY: f64 = 0.02;

#[derive(Debug)]
pub struct FraudDetectionService {
    telemetry: Arc<Telemetry>,
    sampler: Arc<dyn OutcomeSampler>,
    orders_scanned: Counter,
    frauds_detected: Counter,
}

impl FraudDetectionService {
    pub fn new(telemetry: Arc<Telemetry>, sampler: Arc<dyn OutcomeSampler>) -> Self {
        let meter = telemetry.meter();
        let orders_scanned = meter
            .u64_counter("app.fraud.orders_scanned")
            .with_description("Total orders scanned for fraud")
            .with_unit("{orders}")
            .build();
        let frauds_detected = meter
            .u64_counter("app.fraud.detected")
            .with_description("Total fraudulent orders detected")
            .with_unit("{orders}")
            .build();
        FraudDetectionService {
            telemetry,
            sampler,
            orders_scanned,
            frauds_detected,
        }
    }

    fn detect_fraud(&self, parent: &TraceContext) -> bool {
        let (_cx, mut span) =
            self.telemetry
                .tracer()
                .start_span("DetectFraud", SpanKind::Internal, Some(parent));

        let order_id = format!("order-{}", &random_token()[..8]);
        let user_id = format!("user-{}", &random_token()[..6]);
        let amount = self.sampler.amount(10.0, 510.0);

        span.set_attribute("app.order.id", order_id.clone());
        span.set_attribute("app.order.amount", amount);
        span.set_attribute("app.user.id", user_id.clone());

        let is_fraud = self.sampler.happens(FRAUD_PROBABILITY);
        span.set_attribute("app.fraud.detected", is_fraud);
        self.orders_scanned.add(1, &[]);

        if is_fraud {
            self.frauds_detected.add(1, &[]);
            span.add_event(
                "fraud_detected",
                vec![
                    ("app.order.id".to_owned(), AttrValue::from(order_id.clone())),
                    (
                        "app.fraud.reason".to_owned(),
                        AttrValue::from("suspicious_pattern"),
                    ),
                ],
            );
            tracing::warn!(%order_id, %user_id, amount, "fraud detected");
        } else {
            span.add_event("order_cleared", Vec::new());
            tracing::info!(%order_id, "order cleared");
        }
        span.set_status(SpanStatus::Ok);
        is_fraud
    }

    fn consume(&self, req: &Request<Incoming>) -> Response<Body> {
        let parent = self.telemetry.extract_context(req.headers());
        let (cx, mut span) =
            self.telemetry
                .tracer()
                .start_span("orders receive", SpanKind::Consumer, Some(&parent));
        span.set_attribute("messaging.system", "inprocess");
        span.set_attribute("messaging.destination.name", "orders");
        span.set_attribute("messaging.operation.type", "receive");
        span.set_attribute("messaging.consumer.group.name", "frauddetectionservice");

        tracing::info!(topic = "orders", "received order event");
        let is_fraud = self.detect_fraud(&cx);

        span.set_status(SpanStatus::Ok);
        span.end();
        json_response(
            StatusCode::OK,
            &serde_json::json!({ "status": "scanned", "is_fraud": is_fraud }),
        )
    }
}

#[async_trait]
impl HttpHandler for FraudDetectionService {
    async fn handle(&self, req: Request<Incoming>) -> Response<Body> {
        match (req.method(), req.uri().path()) {
            (&Method::POST, "/consume") => self.consume(&req),
            (&Method::GET, "/health") => health_response(),
            _ => not_found(),
        }
    }
}
