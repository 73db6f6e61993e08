//! Boots the whole service fleet on one runtime.
//!
//! Spans go to the collector named by `COLLECTOR_URL`, or to stdout as JSON
//! lines when unset. `ORDER_COUNT` orders are placed in batch mode after
//! startup; with `ORDER_COUNT=0` the fleet just serves until killed.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use tracecart::StdoutSpanExporter;
use tracecart_http::HttpCollectorExporter;
use tracecart_services::accounting::AccountingService;
use tracecart_services::ads::AdService;
use tracecart_services::cart::{CartService, CartStore};
use tracecart_services::checkout::CheckoutService;
use tracecart_services::config::{ports, DemoConfig};
use tracecart_services::currency::CurrencyService;
use tracecart_services::email::EmailService;
use tracecart_services::fraud::FraudDetectionService;
use tracecart_services::http::{spawn_server, HttpHandler};
use tracecart_services::outcome::{OutcomeSampler, RandomSampler};
use tracecart_services::payment::PaymentService;
use tracecart_services::product_catalog::ProductCatalogService;
use tracecart_services::quote::QuoteService;
use tracecart_services::recommendation::RecommendationService;
use tracecart_services::shipping::ShippingService;
use tracecart_services::telemetry::Telemetry;

fn build_telemetry(service: &str, config: &DemoConfig) -> Arc<Telemetry> {
    let builder = Telemetry::builder(service);
    let builder = match &config.collector_url {
        Some(url) => match url.parse::<http::Uri>() {
            Ok(uri) => builder.with_batch_exporter(HttpCollectorExporter::new(uri)),
            Err(error) => {
                tracing::warn!(%error, %url, "invalid COLLECTOR_URL, spans go to stdout");
                builder.with_batch_exporter(StdoutSpanExporter::new())
            }
        },
        None => builder.with_batch_exporter(StdoutSpanExporter::new()),
    };
    Arc::new(builder.build())
}

async fn start(
    name: &str,
    port: u16,
    handler: Arc<dyn HttpHandler>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let (bound, _task) = spawn_server(addr, handler).await?;
    tracing::info!(service = name, %bound, "service started");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = DemoConfig::from_env();
    let sampler: Arc<dyn OutcomeSampler> = Arc::new(RandomSampler::new());

    let mut fleet: Vec<Arc<Telemetry>> = Vec::new();
    let mut new_telemetry = |service: &str| {
        let t = build_telemetry(service, &config);
        fleet.push(Arc::clone(&t));
        t
    };

    start(
        "payment",
        ports::PAYMENT,
        Arc::new(PaymentService::new(new_telemetry("payment"), sampler.clone())),
    )
    .await?;
    start(
        "quote",
        ports::QUOTE,
        Arc::new(QuoteService::new(new_telemetry("quote"), sampler.clone())),
    )
    .await?;
    start(
        "shipping",
        ports::SHIPPING,
        Arc::new(ShippingService::new(
            new_telemetry("shipping"),
            sampler.clone(),
            config.urls.quote.clone(),
        )),
    )
    .await?;
    start(
        "cart",
        ports::CART,
        Arc::new(CartService::new(
            new_telemetry("cart"),
            sampler.clone(),
            CartStore::new(),
        )),
    )
    .await?;
    start(
        "product-catalog",
        ports::PRODUCT_CATALOG,
        Arc::new(ProductCatalogService::new(new_telemetry("product-catalog"))),
    )
    .await?;
    start(
        "recommendation",
        ports::RECOMMENDATION,
        Arc::new(RecommendationService::new(
            new_telemetry("recommendation"),
            sampler.clone(),
        )),
    )
    .await?;
    start(
        "ad",
        ports::AD,
        Arc::new(AdService::new(new_telemetry("ad"), sampler.clone())),
    )
    .await?;
    start(
        "email",
        ports::EMAIL,
        Arc::new(EmailService::new(new_telemetry("email"), sampler.clone())),
    )
    .await?;
    start(
        "currency",
        ports::CURRENCY,
        Arc::new(CurrencyService::new(new_telemetry("currency"))),
    )
    .await?;
    start(
        "accounting",
        ports::ACCOUNTING,
        Arc::new(AccountingService::new(
            new_telemetry("accounting"),
            sampler.clone(),
        )),
    )
    .await?;
    start(
        "fraud-detection",
        ports::FRAUD_DETECTION,
        Arc::new(FraudDetectionService::new(
            new_telemetry("fraud-detection"),
            sampler.clone(),
        )),
    )
    .await?;

    let checkout = Arc::new(CheckoutService::new(
        new_telemetry("checkout"),
        sampler.clone(),
        config.urls.clone(),
        config.concurrent_aux,
    ));
    start("checkout", ports::CHECKOUT, checkout.clone()).await?;

    if config.order_count > 0 {
        // Give every listener a moment before driving traffic through them.
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        checkout.run_batch(config.order_count).await;
        for telemetry in &fleet {
            telemetry.shutdown().await;
        }
        return Ok(());
    }

    tracing::info!("running as servers only, ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    for telemetry in &fleet {
        telemetry.shutdown().await;
    }
    Ok(())
}
