//! Recommendation service: samples catalog products not already in the
//! order.

use std::sync::Arc;

use async_trait::async_trait;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use tracecart::{AttrValue, Counter, SpanKind, SpanStatus, TraceContext};

use crate::catalog::PRODUCTS;
use crate::http::{health_response, json_response, not_found, query_param, Body, HttpHandler};
use crate::outcome::OutcomeSampler;
use crate::telemetry::Telemetry;

const MAX_RECOMMENDATIONS: usize = 5;

#[derive(Debug)]
pub struct RecommendationService {
    telemetry: Arc<Telemetry>,
    sampler: Arc<dyn OutcomeSampler>,
    recommendations: Counter,
}

impl RecommendationService {
    pub fn new(telemetry: Arc<Telemetry>, sampler: Arc<dyn OutcomeSampler>) -> Self {
        let recommendations = telemetry
            .meter()
            .u64_counter("app.recommendations.count")
            .with_description("Recommendation batches produced")
            .with_unit("{recommendations}")
            .build();
        RecommendationService {
            telemetry,
            sampler,
            recommendations,
        }
    }

    /// Sample up to five products, excluding the given ids.
    fn product_list(&self, parent: &TraceContext, exclude: &[String]) -> Vec<&'static str> {
        let (_cx, mut span) = self.telemetry.tracer().start_span(
            "get_product_list",
            SpanKind::Internal,
            Some(parent),
        );
        span.set_attribute("exclude.count", exclude.len());

        let mut available: Vec<&'static str> = PRODUCTS
            .iter()
            .map(|p| p.id)
            .filter(|id| !exclude.iter().any(|e| e == id))
            .collect();
        let sample_size = MAX_RECOMMENDATIONS.min(available.len());
        let mut picked = Vec::with_capacity(sample_size);
        for _ in 0..sample_size {
            let index = self.sampler.index(available.len());
            picked.push(available.swap_remove(index));
        }

        span.set_attribute("app.products.count", picked.len());
        span.add_event(
            "recommendations_generated",
            vec![("count".to_owned(), AttrValue::from(picked.len()))],
        );
        span.set_status(SpanStatus::Ok);
        picked
    }

    fn list_recommendations(&self, req: &Request<Incoming>) -> Response<Body> {
        let parent = self.telemetry.extract_context(req.headers());
        let (cx, mut span) = self.telemetry.tracer().start_span(
            "ListRecommendations",
            SpanKind::Server,
            Some(&parent),
        );

        let exclude: Vec<String> = query_param(req.uri(), "productIds")
            .map(|ids| {
                ids.split(',')
                    .map(|id| id.trim().to_owned())
                    .filter(|id| !id.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        if let Some(user_id) = query_param(req.uri(), "user_id") {
            span.set_attribute("app.user.id", user_id);
        }

        let picked = self.product_list(&cx, &exclude);
        span.set_attribute("app.recommendations.count", picked.len());

        let excluded = exclude.len().to_string();
        self.recommendations
            .add(1, &[("products_excluded", excluded.as_str())]);
        tracing::info!(count = picked.len(), "ListRecommendations");

        span.set_status(SpanStatus::Ok);
        span.end();
        json_response(
            StatusCode::OK,
            &serde_json::json!({ "recommendations": picked, "count": picked.len() }),
        )
    }
}

#[async_trait]
impl HttpHandler for RecommendationService {
    async fn handle(&self, req: Request<Incoming>) -> Response<Body> {
        match (req.method(), req.uri().path()) {
            (&Method::GET, "/recommendations") => self.list_recommendations(&req),
            (&Method::GET, "/health") => health_response(),
            _ => not_found(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::SeededSampler;
    use tracecart::InMemorySpanExporter;

    #[test]
    fn excluded_products_are_never_recommended() {
        let telemetry = Arc::new(
            Telemetry::builder("recommendation")
                .with_simple_exporter(InMemorySpanExporter::default())
                .build(),
        );
        let service = RecommendationService::new(telemetry.clone(), Arc::new(SeededSampler::new(3)));
        let (cx, _span) = telemetry
            .tracer()
            .start_span("root", SpanKind::Server, None);

        let exclude = vec!["OLJCESPC7Z".to_owned(), "6E92ZMYYFZ".to_owned()];
        let picked = service.product_list(&cx, &exclude);

        assert_eq!(picked.len(), MAX_RECOMMENDATIONS);
        assert!(picked.iter().all(|id| !exclude.iter().any(|e| e == id)));
        // No duplicates.
        let mut unique = picked.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), picked.len());
    }
}
