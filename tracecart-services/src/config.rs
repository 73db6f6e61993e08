//! Endpoint configuration.
//!
//! Service URLs come from environment variables with localhost defaults so
//! the whole fleet runs on one machine out of the box. This is thin glue;
//! anything beyond URL wiring belongs to whatever starts the processes.

use std::env;

/// Default ports, one per service.
pub mod ports {
    pub const PAYMENT: u16 = 8081;
    pub const SHIPPING: u16 = 8082;
    pub const CHECKOUT: u16 = 8083;
    pub const CART: u16 = 8084;
    pub const PRODUCT_CATALOG: u16 = 8085;
    pub const RECOMMENDATION: u16 = 8086;
    pub const AD: u16 = 8087;
    pub const EMAIL: u16 = 8088;
    pub const CURRENCY: u16 = 8089;
    pub const ACCOUNTING: u16 = 8091;
    pub const FRAUD_DETECTION: u16 = 8092;
    pub const QUOTE: u16 = 8094;
}

fn env_or(key: &str, fallback: String) -> String {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => fallback,
    }
}

fn localhost(port: u16) -> String {
    format!("http://localhost:{port}")
}

/// Base URLs of every service, as seen by their callers.
#[derive(Clone, Debug)]
pub struct ServiceUrls {
    pub payment: String,
    pub shipping: String,
    pub checkout: String,
    pub cart: String,
    pub product_catalog: String,
    pub recommendation: String,
    pub ad: String,
    pub email: String,
    pub currency: String,
    pub accounting: String,
    pub fraud_detection: String,
    pub quote: String,
}

impl ServiceUrls {
    /// URLs from `*_URL` environment variables, defaulting to localhost.
    pub fn from_env() -> Self {
        ServiceUrls {
            payment: env_or("PAYMENT_URL", localhost(ports::PAYMENT)),
            shipping: env_or("SHIPPING_URL", localhost(ports::SHIPPING)),
            checkout: env_or("CHECKOUT_URL", localhost(ports::CHECKOUT)),
            cart: env_or("CART_URL", localhost(ports::CART)),
            product_catalog: env_or("PRODUCT_CATALOG_URL", localhost(ports::PRODUCT_CATALOG)),
            recommendation: env_or("RECOMMENDATION_URL", localhost(ports::RECOMMENDATION)),
            ad: env_or("AD_URL", localhost(ports::AD)),
            email: env_or("EMAIL_URL", localhost(ports::EMAIL)),
            currency: env_or("CURRENCY_URL", localhost(ports::CURRENCY)),
            accounting: env_or("ACCOUNTING_URL", localhost(ports::ACCOUNTING)),
            fraud_detection: env_or("FRAUD_DETECTION_URL", localhost(ports::FRAUD_DETECTION)),
            quote: env_or("QUOTE_URL", localhost(ports::QUOTE)),
        }
    }

    /// Localhost defaults without consulting the environment.
    pub fn localhost_defaults() -> Self {
        ServiceUrls {
            payment: localhost(ports::PAYMENT),
            shipping: localhost(ports::SHIPPING),
            checkout: localhost(ports::CHECKOUT),
            cart: localhost(ports::CART),
            product_catalog: localhost(ports::PRODUCT_CATALOG),
            recommendation: localhost(ports::RECOMMENDATION),
            ad: localhost(ports::AD),
            email: localhost(ports::EMAIL),
            currency: localhost(ports::CURRENCY),
            accounting: localhost(ports::ACCOUNTING),
            fraud_detection: localhost(ports::FRAUD_DETECTION),
            quote: localhost(ports::QUOTE),
        }
    }
}

/// Top-level demo configuration.
#[derive(Clone, Debug)]
pub struct DemoConfig {
    /// Where downstream services live.
    pub urls: ServiceUrls,
    /// Span collector endpoint; spans go to stdout when unset.
    pub collector_url: Option<String>,
    /// Orders to place in batch mode; `0` runs as servers only.
    pub order_count: usize,
    /// Issue the four auxiliary checkout fetches concurrently.
    pub concurrent_aux: bool,
}

impl DemoConfig {
    /// Configuration from the environment.
    pub fn from_env() -> Self {
        DemoConfig {
            urls: ServiceUrls::from_env(),
            collector_url: env::var("COLLECTOR_URL").ok().filter(|v| !v.is_empty()),
            order_count: env::var("ORDER_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
            concurrent_aux: env::var("CONCURRENT_AUX")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}
