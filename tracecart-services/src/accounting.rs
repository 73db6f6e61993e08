//! Accounting service: consumes published order events and records revenue.

use std::sync::Arc;

use async_trait::async_trait;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use tracecart::{AttrValue, Counter, SpanKind, SpanStatus, TraceContext};

use crate::http::{health_response, json_response, not_found, Body, HttpHandler};
use crate::outcome::{pick, random_token, OutcomeSampler};
use crate::telemetry::Telemetry;

const CURRENCIES: [&str; 4] = ["USD", "EUR", "GBP", "JPY"];

#[derive(Debug)]
pub struct AccountingService {
    telemetry: Arc<Telemetry>,
    sampler: Arc<dyn OutcomeSampler>,
    orders_processed: Counter,
    revenue_total: Counter,
}

impl AccountingService {
    pub fn new(telemetry: Arc<Telemetry>, sampler: Arc<dyn OutcomeSampler>) -> Self {
        let meter = telemetry.meter();
        let orders_processed = meter
            .u64_counter("app.accounting.orders_processed")
            .with_description("Total orders processed by accounting")
            .with_unit("{orders}")
            .build();
        let revenue_total = meter
            .u64_counter("app.accounting.revenue_total")
            .with_description("Total revenue processed, in cents")
            .with_unit("USD")
            .build();
        AccountingService {
            telemetry,
            sampler,
            orders_processed,
            revenue_total,
        }
    }

    fn process_order(&self, parent: &TraceContext) {
        let (_cx, mut span) =
            self.telemetry
                .tracer()
                .start_span("ProcessOrder", SpanKind::Internal, Some(parent));

        let order_id = format!("order-{}", &random_token()[..8]);
        let amount = self.sampler.amount(10.0, 510.0);
        let currency = *pick(self.sampler.as_ref(), &CURRENCIES);

        span.set_attribute("app.order.id", order_id.clone());
        span.set_attribute("app.order.amount", amount);
        span.set_attribute("app.order.currency", currency);

        self.orders_processed.add(1, &[("currency", currency)]);
        self.revenue_total
            .add((amount * 100.0) as u64, &[("currency", currency)]);

        span.add_event(
            "order_recorded",
            vec![("app.order.id".to_owned(), AttrValue::from(order_id.clone()))],
        );
        tracing::info!(%order_id, amount, %currency, "order processed for accounting");
        span.set_status(SpanStatus::Ok);
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
        span.set_attribute("messaging.consumer.group.name", "accountingservice");

        tracing::info!(topic = "orders", "received order event");
        self.process_order(&cx);

        span.set_status(SpanStatus::Ok);
        span.end();
        json_response(StatusCode::OK, &serde_json::json!({ "status": "processed" }))
    }
}

#[async_trait]
impl HttpHandler for AccountingService {
    async fn handle(&self, req: Request<Incoming>) -> Response<Body> {
        match (req.method(), req.uri().path()) {
            (&Method::POST, "/consume") => self.consume(&req),
            (&Method::GET, "/health") => health_response(),
            _ => not_found(),
        }
    }
}
