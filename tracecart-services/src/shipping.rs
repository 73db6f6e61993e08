//! Shipping service: quotes via the external quote service with a local
//! fallback, then "ships" with a generated tracking id.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracecart::{AttrValue, Counter, Histogram, SpanKind, SpanStatus, TraceContext};

use crate::http::{
    health_response, json_response, not_found, CallClient, HttpHandler, OutboundCall,
};
use crate::http::Body;
use crate::outcome::{random_token, OutcomeSampler};
use crate::quote::QuoteResponse;
use crate::telemetry::Telemetry;

#[derive(Serialize, Deserialize)]
pub struct ShipResponse {
    pub tracking_id: String,
    pub cost: f64,
}

#[derive(Debug)]
pub struct ShippingService {
    telemetry: Arc<Telemetry>,
    sampler: Arc<dyn OutcomeSampler>,
    client: CallClient,
    quote_url: String,
    items_shipped: Counter,
    quote_duration: Histogram,
}

impl ShippingService {
    pub fn new(
        telemetry: Arc<Telemetry>,
        sampler: Arc<dyn OutcomeSampler>,
        quote_url: String,
    ) -> Self {
        let meter = telemetry.meter();
        let items_shipped = meter
            .u64_counter("app.shipping.items_count")
            .with_description("Total number of items processed for shipping")
            .with_unit("{items}")
            .build();
        let quote_duration = meter
            .f64_histogram("app.shipping.quote.duration")
            .with_description("Quote calculation duration")
            .with_unit("ms")
            .build();
        ShippingService {
            client: CallClient::new(Arc::clone(&telemetry)),
            telemetry,
            sampler,
            quote_url,
            items_shipped,
            quote_duration,
        }
    }

    /// Quote `count` items: ask the quote service, fall back to the local
    /// formula when it is unreachable.
    async fn quote_from_count(&self, parent: &TraceContext, count: u32) -> f64 {
        let started = Instant::now();
        let (cx, mut span) = self.telemetry.tracer().start_span(
            "CreateQuoteFromCount",
            SpanKind::Internal,
            Some(parent),
        );
        span.set_attribute("app.quote.items.count", i64::from(count));
        self.items_shipped.add(u64::from(count), &[]);

        let quote = match self
            .client
            .call_json::<QuoteResponse>(OutboundCall::new(
                "CalculateQuote",
                SpanKind::Client,
                Method::POST,
                format!("{}/quote", self.quote_url),
                &cx,
            ))
            .await
        {
            Ok(response) => {
                span.set_attribute("quote.external_service", true);
                span.add_event(
                    "Received Quote",
                    vec![(
                        "app.shipping.cost.total".to_owned(),
                        AttrValue::from(response.cost_usd),
                    )],
                );
                response.cost_usd
            }
            Err(error) => {
                tracing::warn!(%error, "quote service unavailable, using fallback");
                let local =
                    5.99 + f64::from(count) * 1.50 + self.sampler.amount(0.0, 3.0);
                span.set_attribute("quote.external_service", false);
                span.add_event(
                    "Quote calculated locally",
                    vec![(
                        "app.shipping.cost.total".to_owned(),
                        AttrValue::from(local),
                    )],
                );
                local
            }
        };

        span.set_attribute("quote.total", quote);
        span.set_status(SpanStatus::Ok);
        self.quote_duration
            .record(started.elapsed().as_secs_f64() * 1e3, &[]);
        quote
    }

    async fn ship(&self, req: &Request<Incoming>) -> Response<Body> {
        let parent = self.telemetry.extract_context(req.headers());
        let (cx, mut span) =
            self.telemetry
                .tracer()
                .start_span("Ship", SpanKind::Server, Some(&parent));

        let item_count = self.sampler.index(5) as u32 + 1;
        let quote = self.quote_from_count(&cx, item_count).await;
        let tracking_id = random_token();

        span.set_attribute("shipping.tracking.id", tracking_id.clone());
        span.set_attribute("shipping.items.count", i64::from(item_count));
        span.set_attribute("app.shipping.cost.total", quote);

        tracing::info!(%tracking_id, items = item_count, quote, "shipping successful");

        span.set_status(SpanStatus::Ok);
        span.end();
        json_response(
            StatusCode::OK,
            &ShipResponse {
                tracking_id,
                cost: quote,
            },
        )
    }

    async fn get_quote(&self, req: &Request<Incoming>) -> Response<Body> {
        let parent = self.telemetry.extract_context(req.headers());
        let (cx, mut span) =
            self.telemetry
                .tracer()
                .start_span("GetQuote", SpanKind::Server, Some(&parent));

        let item_count = self.sampler.index(10) as u32 + 1;
        let quote = self.quote_from_count(&cx, item_count).await;

        span.set_attribute("app.quote.items.count", i64::from(item_count));
        span.set_attribute("app.quote.cost.total", quote);
        tracing::info!(items = item_count, quote, "GetQuote");

        span.set_status(SpanStatus::Ok);
        span.end();
        json_response(
            StatusCode::OK,
            &serde_json::json!({ "quote": quote, "items": item_count }),
        )
    }
}

#[async_trait]
impl HttpHandler for ShippingService {
    async fn handle(&self, req: Request<Incoming>) -> Response<Body> {
        match (req.method(), req.uri().path()) {
            (&Method::POST, "/ship") => self.ship(&req).await,
            (&Method::GET, "/get-quote") => self.get_quote(&req).await,
            (&Method::GET, "/health") => health_response(),
            _ => not_found(),
        }
    }
}
