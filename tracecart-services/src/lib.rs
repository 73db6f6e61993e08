//! Simulated e-commerce services exercising the tracecart pipeline.
//!
//! Every service here is a thin HTTP handler around randomly generated
//! data; the point is the telemetry they emit, not the business results.
//! Each endpoint extracts the inbound trace context, opens a server span,
//! runs a sampled outcome, records a metric, answers JSON, and ends the
//! span. The [`checkout::CheckoutService`] orchestrator sequences the whole
//! transaction and owns the hard-fail/soft-fail policy.

pub mod accounting;
pub mod ads;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod currency;
pub mod email;
pub mod error;
pub mod fraud;
pub mod http;
pub mod outcome;
pub mod payment;
pub mod product_catalog;
pub mod quote;
pub mod recommendation;
pub mod shipping;
pub mod telemetry;
