//! Payment service: charges succeed except for a fixed-probability
//! simulated decline.

use std::sync::Arc;

use async_trait::async_trait;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracecart::{AttrValue, Counter, SpanKind, SpanStatus};

use crate::http::{
    error_response, health_response, json_response, not_found, query_param, Body, HttpHandler,
};
use crate::outcome::{random_token, OutcomeSampler};
use crate::telemetry::Telemetry;

/// Per-request probability of a simulated decline.
pub const DECLINE_PROBABILITY: f64 = 0.05;

#[derive(Serialize, Deserialize)]
pub struct ChargeResponse {
    pub transaction_id: String,
}

#[derive(Debug)]
pub struct PaymentService {
    telemetry: Arc<Telemetry>,
    sampler: Arc<dyn OutcomeSampler>,
    transactions: Counter,
}

impl PaymentService {
    pub fn new(telemetry: Arc<Telemetry>, sampler: Arc<dyn OutcomeSampler>) -> Self {
        let transactions = telemetry
            .meter()
            .u64_counter("app.payment.transactions")
            .with_description("Charge attempts by outcome")
            .with_unit("{transactions}")
            .build();
        PaymentService {
            telemetry,
            sampler,
            transactions,
        }
    }

    fn charge(&self, req: &Request<Incoming>) -> Response<Body> {
        let parent = self.telemetry.extract_context(req.headers());
        let (_cx, mut span) =
            self.telemetry
                .tracer()
                .start_span("Charge", SpanKind::Server, Some(&parent));

        let amount = query_param(req.uri(), "amount")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or_else(|| self.sampler.amount(10.0, 510.0));
        let currency = query_param(req.uri(), "currency").unwrap_or_else(|| "USD".to_owned());

        span.set_attribute("app.payment.amount", amount);
        span.set_attribute("app.payment.currency", currency.clone());

        if self.sampler.happens(DECLINE_PROBABILITY) {
            span.add_event("charge_declined", Vec::new());
            span.set_status(SpanStatus::error("charge declined"));
            self.transactions
                .add(1, &[("status", "declined"), ("currency", currency.as_str())]);
            tracing::warn!(amount, %currency, "charge declined");
            span.end();
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "charge declined");
        }

        let transaction_id = random_token();
        span.add_event(
            "charged",
            vec![(
                "app.payment.transaction.id".to_owned(),
                AttrValue::from(transaction_id.clone()),
            )],
        );
        self.transactions
            .add(1, &[("status", "approved"), ("currency", currency.as_str())]);
        tracing::info!(amount, %currency, %transaction_id, "charge approved");

        span.set_status(SpanStatus::Ok);
        span.end();
        json_response(StatusCode::OK, &ChargeResponse { transaction_id })
    }
}

#[async_trait]
impl HttpHandler for PaymentService {
    async fn handle(&self, req: Request<Incoming>) -> Response<Body> {
        match (req.method(), req.uri().path()) {
            (&Method::POST, "/charge") => self.charge(&req),
            (&Method::GET, "/health") => health_response(),
            _ => not_found(),
        }
    }
}
