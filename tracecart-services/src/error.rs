//! Failure taxonomy for downstream calls and checkout transactions.
//!
//! Two failure families reach a caller: transport problems (unreachable or
//! timed-out downstream) and simulated business rejections surfaced as
//! non-2xx statuses. Malformed trace headers are not part of this taxonomy;
//! extraction recovers silently by minting a fresh root context. No call is
//! ever retried.

use std::time::Duration;

use thiserror::Error;

/// Why one downstream call failed.
#[derive(Debug, Error)]
pub enum CallError {
    /// The downstream endpoint could not be reached.
    #[error("downstream unreachable: {0}")]
    Transport(String),

    /// The call exceeded its bounded timeout.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The downstream answered with a non-2xx status.
    #[error("downstream returned status {0}")]
    Status(u16),

    /// The response body could not be decoded.
    #[error("invalid response body: {0}")]
    Body(String),
}

/// Why a checkout transaction was aborted.
///
/// Only the hard-fail steps appear here; failures in auxiliary steps are
/// recorded on their spans and swallowed.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The payment charge failed.
    #[error("payment failed: {0}")]
    Payment(#[source] CallError),

    /// Shipping the order failed.
    #[error("shipping failed: {0}")]
    Shipping(#[source] CallError),
}
