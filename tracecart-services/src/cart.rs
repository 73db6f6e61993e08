//! Cart service: the only stateful service in the fleet.
//!
//! Carts live in an in-memory keyed store; operations are atomic per user
//! and need no coordination across users. Each store operation is wrapped in
//! its own internal span under the request's server span.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracecart::{Counter, Histogram, Span, SpanKind, SpanStatus};

use crate::catalog;
use crate::http::{
    health_response, json_response, not_found, query_param, Body, HttpHandler,
};
use crate::outcome::OutcomeSampler;
use crate::telemetry::Telemetry;

/// One cart line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: String,
    pub quantity: u32,
}

/// In-memory keyed cart storage: user id to product id to line.
#[derive(Clone, Debug, Default)]
pub struct CartStore {
    carts: Arc<Mutex<HashMap<String, HashMap<String, CartItem>>>>,
}

impl CartStore {
    /// Create an empty store.
    pub fn new() -> Self {
        CartStore::default()
    }

    /// Put a line into a user's cart, replacing any line for the same
    /// product.
    pub fn put(&self, user_id: &str, item: CartItem) {
        if let Ok(mut carts) = self.carts.lock() {
            carts
                .entry(user_id.to_owned())
                .or_default()
                .insert(item.product_id.clone(), item);
        }
    }

    /// Total quantity across a user's cart.
    pub fn item_count(&self, user_id: &str) -> u32 {
        self.carts
            .lock()
            .ok()
            .and_then(|carts| {
                carts
                    .get(user_id)
                    .map(|cart| cart.values().map(|item| item.quantity).sum())
            })
            .unwrap_or(0)
    }

    /// Drop a user's cart entirely.
    pub fn delete(&self, user_id: &str) {
        if let Ok(mut carts) = self.carts.lock() {
            carts.remove(user_id);
        }
    }
}

#[derive(Serialize)]
struct AddItemResponse<'a> {
    status: &'static str,
    user_id: &'a str,
    product_id: &'a str,
}

#[derive(Serialize, Deserialize)]
pub struct CartContents {
    pub user_id: String,
    pub items_count: u32,
}

/// HTTP front of the cart store.
#[derive(Debug)]
pub struct CartService {
    telemetry: Arc<Telemetry>,
    sampler: Arc<dyn OutcomeSampler>,
    store: CartStore,
    operations: Counter,
    add_item_latency: Histogram,
    get_cart_latency: Histogram,
}

impl CartService {
    pub fn new(
        telemetry: Arc<Telemetry>,
        sampler: Arc<dyn OutcomeSampler>,
        store: CartStore,
    ) -> Self {
        let meter = telemetry.meter();
        let operations = meter
            .u64_counter("app.cart.operations")
            .with_description("Number of cart operations")
            .with_unit("{operations}")
            .build();
        let add_item_latency = meter
            .f64_histogram("app.cart.add_item.latency")
            .with_description("AddItem operation latency")
            .with_unit("ms")
            .build();
        let get_cart_latency = meter
            .f64_histogram("app.cart.get_cart.latency")
            .with_description("GetCart operation latency")
            .with_unit("ms")
            .build();
        CartService {
            telemetry,
            sampler,
            store,
            operations,
            add_item_latency,
            get_cart_latency,
        }
    }

    /// The underlying store, shared with whatever else needs it.
    pub fn store(&self) -> &CartStore {
        &self.store
    }

    fn user_id_from(&self, req: &Request<Incoming>) -> String {
        query_param(req.uri(), "user_id")
            .unwrap_or_else(|| format!("user-{}", self.sampler.index(1000)))
    }

    // Store access mirrors an instrumented key-value client: one internal
    // span per operation.
    fn store_span(&self, op: &'static str, parent: &tracecart::TraceContext) -> Span {
        let (_cx, mut span) =
            self.telemetry
                .tracer()
                .start_span(format!("cart.{op}"), SpanKind::Internal, Some(parent));
        span.set_attribute("db.system", "inmemory");
        span.set_attribute("db.name", "cart");
        span
    }

    fn add_item(&self, req: &Request<Incoming>) -> Response<Body> {
        let started = Instant::now();
        let parent = self.telemetry.extract_context(req.headers());
        let (cx, mut span) =
            self.telemetry
                .tracer()
                .start_span("AddItem", SpanKind::Server, Some(&parent));

        let user_id = self.user_id_from(req);
        let product_id = query_param(req.uri(), "product_id")
            .unwrap_or_else(|| catalog::random_product(self.sampler.as_ref()).id.to_owned());
        let quantity = self.sampler.index(3) as u32 + 1;

        span.set_attribute("app.user.id", user_id.clone());
        span.set_attribute("app.product.id", product_id.clone());
        span.set_attribute("app.product.quantity", i64::from(quantity));

        {
            let mut store_span = self.store_span("put", &cx);
            self.store.put(
                &user_id,
                CartItem {
                    product_id: product_id.clone(),
                    quantity,
                },
            );
            store_span.set_status(SpanStatus::Ok);
        }

        self.add_item_latency
            .record(started.elapsed().as_secs_f64() * 1e3, &[]);
        self.operations.add(1, &[("operation", "add_item")]);
        tracing::info!(%user_id, %product_id, quantity, "AddItem");

        span.set_status(SpanStatus::Ok);
        span.end();
        json_response(
            StatusCode::OK,
            &AddItemResponse {
                status: "added",
                user_id: &user_id,
                product_id: &product_id,
            },
        )
    }

    fn get_cart(&self, req: &Request<Incoming>) -> Response<Body> {
        let started = Instant::now();
        let parent = self.telemetry.extract_context(req.headers());
        let (cx, mut span) =
            self.telemetry
                .tracer()
                .start_span("GetCart", SpanKind::Server, Some(&parent));

        let user_id = self.user_id_from(req);
        span.set_attribute("app.user.id", user_id.clone());
        span.add_event("Fetch cart", Vec::new());

        let items_count = {
            let mut store_span = self.store_span("get", &cx);
            let count = self.store.item_count(&user_id);
            store_span.set_status(SpanStatus::Ok);
            count
        };
        span.set_attribute("app.cart.items.count", i64::from(items_count));

        self.get_cart_latency
            .record(started.elapsed().as_secs_f64() * 1e3, &[]);
        self.operations.add(1, &[("operation", "get_cart")]);
        tracing::info!(%user_id, items_count, "GetCart");

        span.set_status(SpanStatus::Ok);
        span.end();
        json_response(
            StatusCode::OK,
            &CartContents {
                user_id,
                items_count,
            },
        )
    }

    fn empty_cart(&self, req: &Request<Incoming>) -> Response<Body> {
        let parent = self.telemetry.extract_context(req.headers());
        let (cx, mut span) =
            self.telemetry
                .tracer()
                .start_span("EmptyCart", SpanKind::Server, Some(&parent));

        let user_id = self.user_id_from(req);
        span.set_attribute("app.user.id", user_id.clone());
        span.add_event("Empty cart", Vec::new());

        {
            let mut store_span = self.store_span("delete", &cx);
            self.store.delete(&user_id);
            store_span.set_status(SpanStatus::Ok);
        }

        self.operations.add(1, &[("operation", "empty_cart")]);
        tracing::info!(%user_id, "EmptyCart");

        span.set_status(SpanStatus::Ok);
        span.end();
        json_response(
            StatusCode::OK,
            &serde_json::json!({ "status": "emptied", "user_id": user_id }),
        )
    }
}

#[async_trait]
impl HttpHandler for CartService {
    async fn handle(&self, req: Request<Incoming>) -> Response<Body> {
        match (req.method(), req.uri().path()) {
            (&Method::POST, "/cart/add") => self.add_item(&req),
            (&Method::GET, "/cart") => self.get_cart(&req),
            (&Method::POST, "/cart/empty") => self.empty_cart(&req),
            (&Method::GET, "/health") => health_response(),
            _ => not_found(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::FixedSampler;

    #[test]
    fn add_get_empty_round_trip() {
        let store = CartStore::new();
        store.put(
            "u1",
            CartItem {
                product_id: "OLJCESPC7Z".into(),
                quantity: 2,
            },
        );
        store.put(
            "u1",
            CartItem {
                product_id: "6E92ZMYYFZ".into(),
                quantity: 1,
            },
        );
        assert_eq!(store.item_count("u1"), 3);
        assert_eq!(store.item_count("u2"), 0);

        store.delete("u1");
        assert_eq!(store.item_count("u1"), 0);
    }

    #[test]
    fn put_replaces_per_product() {
        let store = CartStore::new();
        store.put(
            "u1",
            CartItem {
                product_id: "p".into(),
                quantity: 1,
            },
        );
        store.put(
            "u1",
            CartItem {
                product_id: "p".into(),
                quantity: 5,
            },
        );
        assert_eq!(store.item_count("u1"), 5);
    }

    #[test]
    fn carts_are_isolated_per_user() {
        let store = CartStore::new();
        store.put(
            "a",
            CartItem {
                product_id: "p".into(),
                quantity: 1,
            },
        );
        store.put(
            "b",
            CartItem {
                product_id: "p".into(),
                quantity: 4,
            },
        );
        store.delete("a");
        assert_eq!(store.item_count("a"), 0);
        assert_eq!(store.item_count("b"), 4);
    }

    #[test]
    fn service_shares_the_store_it_was_given() {
        let telemetry = Arc::new(
            Telemetry::builder("cart")
                .with_simple_exporter(tracecart::InMemorySpanExporter::default())
                .build(),
        );
        let store = CartStore::new();
        let service = CartService::new(telemetry, Arc::new(FixedSampler::never()), store.clone());
        store.put(
            "u",
            CartItem {
                product_id: "p".into(),
                quantity: 2,
            },
        );
        assert_eq!(service.store().item_count("u"), 2);
    }
}
