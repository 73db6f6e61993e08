//! Product catalog service over the static demo catalog.

use std::sync::Arc;

use async_trait::async_trait;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use tracecart::{Counter, SpanKind, SpanStatus};

use crate::catalog::{self, PRODUCTS};
use crate::http::{
    error_response, health_response, json_response, not_found, query_param, Body, HttpHandler,
};
use crate::telemetry::Telemetry;

#[derive(Debug)]
pub struct ProductCatalogService {
    telemetry: Arc<Telemetry>,
    requests: Counter,
}

impl ProductCatalogService {
    pub fn new(telemetry: Arc<Telemetry>) -> Self {
        let requests = telemetry
            .meter()
            .u64_counter("app.products.requests")
            .with_description("Number of product catalog requests")
            .with_unit("{requests}")
            .build();
        ProductCatalogService {
            telemetry,
            requests,
        }
    }

    fn list_products(&self, req: &Request<Incoming>) -> Response<Body> {
        let parent = self.telemetry.extract_context(req.headers());
        let (_cx, mut span) =
            self.telemetry
                .tracer()
                .start_span("ListProducts", SpanKind::Server, Some(&parent));
        span.set_attribute("app.products.count", PRODUCTS.len());

        self.requests.add(1, &[("method", "ListProducts")]);
        tracing::info!(count = PRODUCTS.len(), "ListProducts");

        span.set_status(SpanStatus::Ok);
        span.end();
        json_response(StatusCode::OK, &PRODUCTS)
    }

    fn get_product(&self, req: &Request<Incoming>, id: &str) -> Response<Body> {
        let parent = self.telemetry.extract_context(req.headers());
        let (_cx, mut span) =
            self.telemetry
                .tracer()
                .start_span("GetProduct", SpanKind::Server, Some(&parent));
        span.set_attribute("app.product.id", id);

        match catalog::find(id) {
            Some(product) => {
                span.set_attribute("app.product.name", product.name);
                span.set_attribute("product.found", true);
                self.requests
                    .add(1, &[("method", "GetProduct"), ("status", "found")]);
                tracing::info!(product_id = id, product_name = product.name, "GetProduct");
                span.set_status(SpanStatus::Ok);
                span.end();
                json_response(StatusCode::OK, product)
            }
            None => {
                span.set_attribute("product.found", false);
                self.requests
                    .add(1, &[("method", "GetProduct"), ("status", "not_found")]);
                tracing::warn!(product_id = id, "GetProduct: unknown product");
                span.set_status(SpanStatus::error("product not found"));
                span.end();
                error_response(StatusCode::NOT_FOUND, "product not found")
            }
        }
    }

    fn search_products(&self, req: &Request<Incoming>) -> Response<Body> {
        let parent = self.telemetry.extract_context(req.headers());
        let (_cx, mut span) =
            self.telemetry
                .tracer()
                .start_span("SearchProducts", SpanKind::Server, Some(&parent));

        let query = query_param(req.uri(), "q").unwrap_or_else(|| "sunglasses".to_owned());
        let needle = query.to_lowercase();
        let results: Vec<_> = PRODUCTS
            .iter()
            .filter(|p| {
                p.name.to_lowercase().contains(&needle)
                    || p.description.to_lowercase().contains(&needle)
            })
            .collect();

        span.set_attribute("search.query", query.clone());
        span.set_attribute("app.products_search.count", results.len());

        self.requests.add(1, &[("method", "SearchProducts")]);
        tracing::info!(%query, results = results.len(), "SearchProducts");

        span.set_status(SpanStatus::Ok);
        span.end();
        json_response(
            StatusCode::OK,
            &serde_json::json!({ "query": query, "results": results }),
        )
    }
}

#[async_trait]
impl HttpHandler for ProductCatalogService {
    async fn handle(&self, req: Request<Incoming>) -> Response<Body> {
        match (req.method(), req.uri().path()) {
            (&Method::GET, "/products") => self.list_products(&req),
            (&Method::GET, "/products/search") => self.search_products(&req),
            (&Method::GET, path) if path.starts_with("/products/") => {
                let id = path.trim_start_matches("/products/").to_owned();
                self.get_product(&req, &id)
            }
            (&Method::GET, "/health") => health_response(),
            _ => not_found(),
        }
    }
}
