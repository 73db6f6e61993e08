//! Checkout orchestrator.
//!
//! One inbound request becomes a fixed sequence of downstream calls, each in
//! its own child span under the `PlaceOrder` server span:
//!
//! PrepareCart (AddItem x3, GetCart, EmptyCart) -> GetProductDetails ->
//! ConvertCurrency -> GetRecommendations -> GetAds -> ChargeCard ->
//! ShipOrder -> SendEmail -> orders publish.
//!
//! Failure policy is deliberately asymmetric and must stay that way:
//! ChargeCard and ShipOrder abort the transaction and mark the root span as
//! an error; the auxiliary fetches and the confirmation email are recorded
//! on their own spans and swallowed, so the transaction can still succeed
//! with partial-failure traces. The order publish is fire-and-forget. No
//! step is ever retried.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use tracecart::{AttrValue, Counter, Histogram, SpanKind, SpanStatus, TraceContext};

use crate::cart::CartContents;
use crate::catalog;
use crate::config::ServiceUrls;
use crate::error::{CallError, OrderError};
use crate::http::{
    error_response, health_response, json_response, not_found, Body, CallClient, HttpHandler,
    OutboundCall,
};
use crate::outcome::{pick, random_token, OutcomeSampler};
use crate::payment::ChargeResponse;
use crate::shipping::ShipResponse;
use crate::telemetry::Telemetry;

const CURRENCIES: [&str; 5] = ["USD", "EUR", "GBP", "JPY", "CAD"];
const ITEMS_PER_ORDER: usize = 3;

/// The result of a completed order.
#[derive(Clone, Debug, Serialize)]
pub struct OrderSummary {
    pub order_id: String,
    pub transaction_id: String,
    pub tracking_id: String,
    pub amount: f64,
    pub currency: String,
    pub items: u32,
}

struct OrderPrep {
    item_count: u32,
    product_ids: Vec<String>,
    total: f64,
    shipping_cost: f64,
}

/// The checkout orchestrator.
#[derive(Debug)]
pub struct CheckoutService {
    telemetry: Arc<Telemetry>,
    sampler: Arc<dyn OutcomeSampler>,
    client: CallClient,
    urls: ServiceUrls,
    concurrent_aux: bool,
    orders: Counter,
    latency: Histogram,
}

impl CheckoutService {
    pub fn new(
        telemetry: Arc<Telemetry>,
        sampler: Arc<dyn OutcomeSampler>,
        urls: ServiceUrls,
        concurrent_aux: bool,
    ) -> Self {
        let meter = telemetry.meter();
        let orders = meter
            .u64_counter("app.checkout.orders_total")
            .with_description("Total number of orders placed")
            .with_unit("{orders}")
            .build();
        let latency = meter
            .f64_histogram("app.checkout.latency")
            .with_description("Checkout operation latency")
            .with_unit("ms")
            .build();
        CheckoutService {
            client: CallClient::new(Arc::clone(&telemetry)),
            telemetry,
            sampler,
            urls,
            concurrent_aux,
            orders,
            latency,
        }
    }

    /// Place one order, continuing an inbound trace when one is supplied or
    /// minting a fresh root otherwise (batch mode).
    pub async fn place_order(
        &self,
        inbound: Option<&TraceContext>,
    ) -> Result<OrderSummary, OrderError> {
        let started = Instant::now();
        let (cx, mut span) =
            self.telemetry
                .tracer()
                .start_span("PlaceOrder", SpanKind::Server, inbound);

        let user_id = format!("user-{}", self.sampler.index(10_000));
        let currency = (*pick(self.sampler.as_ref(), &CURRENCIES)).to_owned();
        let order_id = random_token();

        span.set_attribute("app.user.id", user_id.clone());
        span.set_attribute("app.user.currency", currency.clone());
        if cx.baggage().get("synthetic_request") == Some("true") {
            span.set_attribute("app.synthetic", true);
        }
        if let Some(session_id) = cx.baggage().get("session.id") {
            span.set_attribute("session.id", session_id);
        }

        tracing::info!(%user_id, %currency, "PlaceOrder started");

        let prep = self.prepare_cart(&cx, &user_id).await;
        span.add_event(
            "prepared",
            vec![(
                "app.order.items.count".to_owned(),
                AttrValue::from(i64::from(prep.item_count)),
            )],
        );

        // The four auxiliary fetches are soft-fail and, in the one
        // documented exception to the sequential rule, may run concurrently
        // as independent branches. Ordering among them is not guaranteed.
        if self.concurrent_aux {
            tokio::join!(
                self.fetch_product_details(&cx, &prep.product_ids),
                self.convert_currency(&cx, &currency, prep.total),
                self.fetch_recommendations(&cx, &user_id, &prep.product_ids),
                self.fetch_ads(&cx),
            );
        } else {
            self.fetch_product_details(&cx, &prep.product_ids).await;
            self.convert_currency(&cx, &currency, prep.total).await;
            self.fetch_recommendations(&cx, &user_id, &prep.product_ids)
                .await;
            self.fetch_ads(&cx).await;
        }
        span.add_event("product_details_fetched", Vec::new());
        span.add_event("currency_converted", Vec::new());
        span.add_event("recommendations_fetched", Vec::new());
        span.add_event("ads_fetched", Vec::new());

        let transaction_id = match self.charge_card(&cx, prep.total, &currency).await {
            Ok(transaction_id) => transaction_id,
            Err(error) => {
                span.record_error(&error);
                self.orders
                    .add(1, &[("currency", currency.as_str()), ("status", "failed")]);
                tracing::error!(%error, "payment failed");
                span.end();
                return Err(OrderError::Payment(error));
            }
        };
        span.add_event(
            "charged",
            vec![(
                "app.payment.transaction.id".to_owned(),
                AttrValue::from(transaction_id.clone()),
            )],
        );

        let tracking_id = match self.ship_order(&cx, prep.item_count).await {
            Ok(tracking_id) => tracking_id,
            Err(error) => {
                span.record_error(&error);
                self.orders
                    .add(1, &[("currency", currency.as_str()), ("status", "failed")]);
                tracing::error!(%error, "shipping failed");
                span.end();
                return Err(OrderError::Shipping(error));
            }
        };
        span.add_event(
            "shipped",
            vec![(
                "app.shipping.tracking.id".to_owned(),
                AttrValue::from(tracking_id.clone()),
            )],
        );

        self.send_confirmation(&cx, &order_id, &user_id).await;
        span.add_event("email_sent", Vec::new());

        self.publish_order(&cx, &order_id).await;
        span.add_event(
            "order_published",
            vec![(
                "messaging.destination.name".to_owned(),
                AttrValue::from("orders"),
            )],
        );

        span.set_attribute("app.order.id", order_id.clone());
        span.set_attribute("app.order.amount", prep.total);
        span.set_attribute("app.shipping.amount", prep.shipping_cost);
        span.set_attribute("app.order.items.count", i64::from(prep.item_count));
        span.set_attribute("app.shipping.tracking.id", tracking_id.clone());

        let elapsed_ms = started.elapsed().as_secs_f64() * 1e3;
        self.orders
            .add(1, &[("currency", currency.as_str()), ("status", "success")]);
        self.latency.record(elapsed_ms, &[("currency", currency.as_str())]);

        tracing::info!(
            %order_id,
            %transaction_id,
            %tracking_id,
            duration_ms = elapsed_ms,
            "order placed successfully"
        );

        span.set_status(SpanStatus::Ok);
        span.end();
        Ok(OrderSummary {
            order_id,
            transaction_id,
            tracking_id,
            amount: prep.total,
            currency,
            items: prep.item_count,
        })
    }

    /// Place `count` orders back to back, minting a fresh root per order.
    pub async fn run_batch(&self, count: usize) {
        tracing::info!(count, "batch checkout starting");
        for _ in 0..count {
            if let Err(error) = self.place_order(None).await {
                tracing::warn!(%error, "batch order failed");
            }
            let pause = self.sampler.amount(100.0, 400.0);
            tokio::time::sleep(std::time::Duration::from_millis(pause as u64)).await;
        }
        tracing::info!(count, "batch checkout completed");
    }

    /// Fill, read, and clear the user's cart. The sub-step order (add all
    /// items, then read, then clear) defines the span tree shape trace
    /// consumers expect, so it must not change.
    async fn prepare_cart(&self, parent: &TraceContext, user_id: &str) -> OrderPrep {
        let (cx, mut span) =
            self.telemetry
                .tracer()
                .start_span("PrepareCart", SpanKind::Internal, Some(parent));
        span.set_attribute("app.user.id", user_id);

        let mut product_ids = Vec::with_capacity(ITEMS_PER_ORDER);
        for _ in 0..ITEMS_PER_ORDER {
            let product_id = catalog::random_product(self.sampler.as_ref()).id;
            product_ids.push(product_id.to_owned());
            let result = self
                .client
                .call(OutboundCall::new(
                    "AddItem",
                    SpanKind::Internal,
                    Method::POST,
                    format!(
                        "{}/cart/add?user_id={user_id}&product_id={product_id}",
                        self.urls.cart
                    ),
                    &cx,
                ))
                .await;
            if let Err(error) = result {
                tracing::warn!(%error, product_id, "failed to add item to cart");
            }
        }
        span.add_event(
            "items_added_to_cart",
            vec![(
                "app.cart.items.count".to_owned(),
                AttrValue::from(ITEMS_PER_ORDER),
            )],
        );

        let item_count = match self
            .client
            .call_json::<CartContents>(OutboundCall::new(
                "GetCart",
                SpanKind::Internal,
                Method::GET,
                format!("{}/cart?user_id={user_id}", self.urls.cart),
                &cx,
            ))
            .await
        {
            Ok(contents) => contents.items_count,
            Err(error) => {
                tracing::warn!(%error, "failed to read cart");
                0
            }
        };
        span.add_event(
            "cart_retrieved",
            vec![(
                "app.cart.items.count".to_owned(),
                AttrValue::from(i64::from(item_count)),
            )],
        );

        let total = self.sampler.amount(10.0, 510.0);
        let shipping_cost = self.sampler.amount(1.0, 11.0);

        if let Err(error) = self
            .client
            .call(OutboundCall::new(
                "EmptyCart",
                SpanKind::Internal,
                Method::POST,
                format!("{}/cart/empty?user_id={user_id}", self.urls.cart),
                &cx,
            ))
            .await
        {
            tracing::warn!(%error, "failed to empty cart");
        }
        span.add_event("cart_emptied", Vec::new());

        span.set_status(SpanStatus::Ok);
        span.end();
        OrderPrep {
            item_count: ITEMS_PER_ORDER as u32,
            product_ids,
            total,
            shipping_cost,
        }
    }

    async fn fetch_product_details(&self, parent: &TraceContext, product_ids: &[String]) {
        let (cx, mut span) = self.telemetry.tracer().start_span(
            "GetProductDetails",
            SpanKind::Client,
            Some(parent),
        );
        span.set_attribute("app.products.count", product_ids.len());

        for product_id in product_ids {
            let result = self
                .client
                .call(OutboundCall::new(
                    "GetProduct",
                    SpanKind::Client,
                    Method::GET,
                    format!("{}/products/{product_id}", self.urls.product_catalog),
                    &cx,
                ))
                .await;
            if let Err(error) = result {
                tracing::warn!(%error, %product_id, "product fetch failed");
            }
        }
        span.set_status(SpanStatus::Ok);
        span.end();
    }

    async fn convert_currency(&self, parent: &TraceContext, currency: &str, amount: f64) {
        let result = self
            .client
            .call(OutboundCall {
                name: "ConvertCurrency",
                kind: SpanKind::Client,
                method: Method::GET,
                url: format!(
                    "{}/convert?from=USD&to={currency}&amount={amount:.2}",
                    self.urls.currency
                ),
                parent,
                attributes: vec![
                    ("app.currency.from", AttrValue::from("USD")),
                    ("app.currency.to", AttrValue::from(currency)),
                    ("app.currency.amount", AttrValue::from(amount)),
                ],
            })
            .await;
        if let Err(error) = result {
            tracing::warn!(%error, currency, "currency conversion failed");
        }
    }

    async fn fetch_recommendations(
        &self,
        parent: &TraceContext,
        user_id: &str,
        product_ids: &[String],
    ) {
        let result = self
            .client
            .call(OutboundCall {
                name: "GetRecommendations",
                kind: SpanKind::Client,
                method: Method::GET,
                url: format!(
                    "{}/recommendations?user_id={user_id}&productIds={}",
                    self.urls.recommendation,
                    product_ids.join(",")
                ),
                parent,
                attributes: vec![("app.user.id", AttrValue::from(user_id))],
            })
            .await;
        if let Err(error) = result {
            tracing::warn!(%error, "recommendation fetch failed");
        }
    }

    async fn fetch_ads(&self, parent: &TraceContext) {
        let category = *pick(self.sampler.as_ref(), &["clothing", "electronics", "home", "outdoor"]);
        let result = self
            .client
            .call(OutboundCall {
                name: "GetAds",
                kind: SpanKind::Client,
                method: Method::GET,
                url: format!("{}/ads?category={category}", self.urls.ad),
                parent,
                attributes: vec![("app.ads.category", AttrValue::from(category))],
            })
            .await;
        if let Err(error) = result {
            tracing::warn!(%error, category, "ads fetch failed");
        }
    }

    async fn charge_card(
        &self,
        parent: &TraceContext,
        amount: f64,
        currency: &str,
    ) -> Result<String, CallError> {
        let response = self
            .client
            .call_json::<ChargeResponse>(OutboundCall {
                name: "ChargeCard",
                kind: SpanKind::Client,
                method: Method::POST,
                url: format!(
                    "{}/charge?amount={amount:.2}&currency={currency}",
                    self.urls.payment
                ),
                parent,
                attributes: vec![
                    ("saga.step", AttrValue::from("payment")),
                    ("payment.amount", AttrValue::from(amount)),
                    ("payment.currency", AttrValue::from(currency)),
                ],
            })
            .await?;
        tracing::info!(transaction_id = %response.transaction_id, "charge succeeded");
        Ok(response.transaction_id)
    }

    async fn ship_order(&self, parent: &TraceContext, item_count: u32) -> Result<String, CallError> {
        let response = self
            .client
            .call_json::<ShipResponse>(OutboundCall {
                name: "ShipOrder",
                kind: SpanKind::Client,
                method: Method::POST,
                url: format!("{}/ship", self.urls.shipping),
                parent,
                attributes: vec![
                    ("saga.step", AttrValue::from("shipping")),
                    ("shipping.items.count", AttrValue::from(i64::from(item_count))),
                ],
            })
            .await?;
        tracing::info!(tracking_id = %response.tracking_id, "shipping succeeded");
        Ok(response.tracking_id)
    }

    async fn send_confirmation(&self, parent: &TraceContext, order_id: &str, user_id: &str) {
        let result = self
            .client
            .call(OutboundCall {
                name: "SendEmail",
                kind: SpanKind::Client,
                method: Method::POST,
                url: format!(
                    "{}/send?order_id={order_id}&user_id={user_id}",
                    self.urls.email
                ),
                parent,
                attributes: vec![
                    ("saga.step", AttrValue::from("email")),
                    ("app.order.id", AttrValue::from(order_id)),
                ],
            })
            .await;
        if let Err(error) = result {
            tracing::warn!(%error, "confirmation email failed");
        }
    }

    /// Publish the order event to both consumers, fire-and-forget.
    async fn publish_order(&self, parent: &TraceContext, order_id: &str) {
        let (cx, mut span) =
            self.telemetry
                .tracer()
                .start_span("orders publish", SpanKind::Producer, Some(parent));
        span.set_attribute("messaging.system", "inprocess");
        span.set_attribute("messaging.destination.name", "orders");
        span.set_attribute("messaging.operation.type", "publish");
        span.set_attribute("app.order.id", order_id);

        for (name, url) in [
            ("orders send accounting", &self.urls.accounting),
            ("orders send fraud-detection", &self.urls.fraud_detection),
        ] {
            let _ = self
                .client
                .call(OutboundCall::new(
                    name,
                    SpanKind::Client,
                    Method::POST,
                    format!("{url}/consume"),
                    &cx,
                ))
                .await;
        }
        span.set_status(SpanStatus::Ok);
        span.end();
    }
}

#[derive(Serialize)]
struct CheckoutResponse<'a> {
    status: &'static str,
    order_id: &'a str,
}

#[async_trait]
impl HttpHandler for CheckoutService {
    async fn handle(&self, req: Request<Incoming>) -> Response<Body> {
        match (req.method(), req.uri().path()) {
            (&Method::POST, "/checkout") => {
                let parent = self.telemetry.extract_context(req.headers());
                match self.place_order(Some(&parent)).await {
                    Ok(summary) => json_response(
                        StatusCode::OK,
                        &CheckoutResponse {
                            status: "order_placed",
                            order_id: &summary.order_id,
                        },
                    ),
                    Err(error) => {
                        error_response(StatusCode::BAD_GATEWAY, &error.to_string())
                    }
                }
            }
            (&Method::GET, "/health") => health_response(),
            _ => not_found(),
        }
    }
}
