//! Currency conversion service over a static rate table.

use std::sync::Arc;

use async_trait::async_trait;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use tracecart::{Counter, SpanKind, SpanStatus};

use crate::http::{health_response, json_response, not_found, query_param, Body, HttpHandler};
use crate::telemetry::Telemetry;

/// Exchange rates from USD.
const EXCHANGE_RATES: [(&str, f64); 8] = [
    ("USD", 1.0),
    ("EUR", 0.85),
    ("GBP", 0.73),
    ("JPY", 110.0),
    ("CAD", 1.25),
    ("CHF", 0.92),
    ("AUD", 1.35),
    ("INR", 83.0),
];

fn rate_of(code: &str) -> f64 {
    EXCHANGE_RATES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, r)| *r)
        .unwrap_or(1.0)
}

#[derive(Debug)]
pub struct CurrencyService {
    telemetry: Arc<Telemetry>,
    conversions: Counter,
}

impl CurrencyService {
    pub fn new(telemetry: Arc<Telemetry>) -> Self {
        let conversions = telemetry
            .meter()
            .u64_counter("app.currency_counter")
            .with_description("Currency conversion operations")
            .with_unit("{conversions}")
            .build();
        CurrencyService {
            telemetry,
            conversions,
        }
    }

    fn convert(&self, req: &Request<Incoming>) -> Response<Body> {
        let parent = self.telemetry.extract_context(req.headers());
        let (_cx, mut span) =
            self.telemetry
                .tracer()
                .start_span("Convert", SpanKind::Server, Some(&parent));

        let from = query_param(req.uri(), "from").unwrap_or_else(|| "USD".to_owned());
        let to = query_param(req.uri(), "to").unwrap_or_else(|| "EUR".to_owned());
        let rate = rate_of(&to) / rate_of(&from);

        span.set_attribute("app.currency.conversion.from", from.clone());
        span.set_attribute("app.currency.conversion.to", to.clone());

        self.conversions
            .add(1, &[("currency_code", to.as_str()), ("from_currency", from.as_str())]);
        tracing::info!(%from, %to, rate, "Convert");

        span.set_status(SpanStatus::Ok);
        span.end();
        json_response(
            StatusCode::OK,
            &serde_json::json!({ "from": from, "to": to, "rate": rate }),
        )
    }

    fn supported_currencies(&self, req: &Request<Incoming>) -> Response<Body> {
        let parent = self.telemetry.extract_context(req.headers());
        let (_cx, mut span) = self.telemetry.tracer().start_span(
            "GetSupportedCurrencies",
            SpanKind::Server,
            Some(&parent),
        );

        let currencies: Vec<&str> = EXCHANGE_RATES.iter().map(|(code, _)| *code).collect();
        span.set_attribute("app.currencies.count", currencies.len());
        tracing::info!(count = currencies.len(), "GetSupportedCurrencies");

        span.set_status(SpanStatus::Ok);
        span.end();
        json_response(StatusCode::OK, &serde_json::json!({ "currencies": currencies }))
    }
}

#[async_trait]
impl HttpHandler for CurrencyService {
    async fn handle(&self, req: Request<Incoming>) -> Response<Body> {
        match (req.method(), req.uri().path()) {
            (&Method::GET, "/convert") => self.convert(&req),
            (&Method::GET, "/currencies") => self.supported_currencies(&req),
            (&Method::GET, "/health") => health_response(),
            _ => not_found(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_rates() {
        assert_eq!(rate_of("USD"), 1.0);
        assert_eq!(rate_of("EUR"), 0.85);
        // Unknown currencies fall back to parity.
        assert_eq!(rate_of("XXX"), 1.0);
        let usd_to_jpy = rate_of("JPY") / rate_of("USD");
        assert!((usd_to_jpy - 110.0).abs() < f64::EPSILON);
    }
}
