//! Ad service: serves a random ad for a category.

use std::sync::Arc;

use async_trait::async_trait;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use tracecart::{Counter, SpanKind, SpanStatus};

use crate::http::{health_response, json_response, not_found, query_param, Body, HttpHandler};
use crate::outcome::{pick, OutcomeSampler};
use crate::telemetry::Telemetry;

const CATEGORIES: [&str; 4] = ["clothing", "electronics", "home", "outdoor"];

const ADS: [(&str, &str); 4] = [
    ("clothing", "Tank tops: two for one, this week only"),
    ("electronics", "Hairdryers with free next-day delivery"),
    ("home", "Candle holders to warm up any room"),
    ("outdoor", "Sunglasses for every summit"),
];

#[derive(Debug)]
pub struct AdService {
    telemetry: Arc<Telemetry>,
    sampler: Arc<dyn OutcomeSampler>,
    served: Counter,
}

impl AdService {
    pub fn new(telemetry: Arc<Telemetry>, sampler: Arc<dyn OutcomeSampler>) -> Self {
        let served = telemetry
            .meter()
            .u64_counter("app.ads.served")
            .with_description("Ads served by category")
            .with_unit("{ads}")
            .build();
        AdService {
            telemetry,
            sampler,
            served,
        }
    }

    fn get_ads(&self, req: &Request<Incoming>) -> Response<Body> {
        let parent = self.telemetry.extract_context(req.headers());
        let (_cx, mut span) =
            self.telemetry
                .tracer()
                .start_span("GetAds", SpanKind::Server, Some(&parent));

        let category = query_param(req.uri(), "category")
            .unwrap_or_else(|| (*pick(self.sampler.as_ref(), &CATEGORIES)).to_owned());
        let text = ADS
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, text)| *text)
            .unwrap_or("Everything ships free above $50");

        span.set_attribute("app.ads.category", category.clone());
        self.served.add(1, &[("category", category.as_str())]);
        tracing::info!(%category, "GetAds");

        span.set_status(SpanStatus::Ok);
        span.end();
        json_response(
            StatusCode::OK,
            &serde_json::json!({ "category": category, "text": text }),
        )
    }
}

#[async_trait]
impl HttpHandler for AdService {
    async fn handle(&self, req: Request<Incoming>) -> Response<Body> {
        match (req.method(), req.uri().path()) {
            (&Method::GET, "/ads") => self.get_ads(&req),
            (&Method::GET, "/health") => health_response(),
            _ => not_found(),
        }
    }
}
