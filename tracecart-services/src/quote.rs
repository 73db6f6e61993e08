//! Quote service: shipping cost calculation with a random handling fee.

use std::sync::Arc;

use async_trait::async_trait;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracecart::{AttrValue, Counter, Histogram, SpanKind, SpanStatus};

use crate::http::{health_response, json_response, not_found, read_body, Body, HttpHandler};
use crate::outcome::OutcomeSampler;
use crate::telemetry::Telemetry;

const HANDLING_FEE_PROBABILITY: f64 = 0.2;

#[derive(Deserialize)]
struct QuoteRequest {
    #[serde(rename = "numberOfItems")]
    number_of_items: Option<u32>,
}

#[derive(Serialize, Deserialize)]
pub struct QuoteResponse {
    pub cost_usd: f64,
    pub items: u32,
    pub currency: String,
}

#[derive(Debug)]
pub struct QuoteService {
    telemetry: Arc<Telemetry>,
    sampler: Arc<dyn OutcomeSampler>,
    quotes: Counter,
    quote_amount: Histogram,
}

impl QuoteService {
    pub fn new(telemetry: Arc<Telemetry>, sampler: Arc<dyn OutcomeSampler>) -> Self {
        let meter = telemetry.meter();
        let quotes = meter
            .u64_counter("quotes")
            .with_description("Quotes calculated")
            .with_unit("{quotes}")
            .build();
        let quote_amount = meter
            .f64_histogram("quote.amount")
            .with_description("Quoted shipping cost")
            .with_unit("USD")
            .build();
        QuoteService {
            telemetry,
            sampler,
            quotes,
            quote_amount,
        }
    }

    async fn calculate_quote(&self, req: Request<Incoming>) -> Response<Body> {
        let parent = self.telemetry.extract_context(req.headers());
        let (cx, mut span) =
            self.telemetry
                .tracer()
                .start_span("CalculateQuote", SpanKind::Server, Some(&parent));

        let body = read_body(req).await;
        let items = serde_json::from_slice::<QuoteRequest>(&body)
            .ok()
            .and_then(|r| r.number_of_items)
            .unwrap_or(1);

        let cost_usd = {
            let (_inner_cx, mut inner) = self.telemetry.tracer().start_span(
                "calculate-quote",
                SpanKind::Internal,
                Some(&cx),
            );
            inner.set_attribute("app.quote.items.count", i64::from(items));

            let base_cost = 5.99;
            let per_item_cost = 1.50 + self.sampler.amount(-0.25, 0.25);
            let mut total = base_cost + f64::from(items) * per_item_cost;
            if self.sampler.happens(HANDLING_FEE_PROBABILITY) {
                let fee = self.sampler.amount(1.0, 3.0);
                total += fee;
                inner.add_event("handling_fee_applied", vec![("fee".to_owned(), AttrValue::from(fee))]);
                tracing::info!(fee, "applied handling fee");
            }
            let total = (total * 100.0).round() / 100.0;
            inner.set_attribute("app.quote.cost.total", total);
            inner.set_status(SpanStatus::Ok);
            total
        };

        span.set_attribute("app.quote.cost.total", cost_usd);
        self.quotes.add(1, &[]);
        self.quote_amount.record(cost_usd, &[]);
        tracing::info!(items, cost_usd, "CalculateQuote");

        span.set_status(SpanStatus::Ok);
        span.end();
        json_response(
            StatusCode::OK,
            &QuoteResponse {
                cost_usd,
                items,
                currency: "USD".to_owned(),
            },
        )
    }
}

#[async_trait]
impl HttpHandler for QuoteService {
    async fn handle(&self, req: Request<Incoming>) -> Response<Body> {
        match (req.method(), req.uri().path()) {
            (&Method::POST, "/quote") => self.calculate_quote(req).await,
            (&Method::GET, "/health") => health_response(),
            _ => not_found(),
        }
    }
}
