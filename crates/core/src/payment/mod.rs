//! Payment provider boundary.
//!
//! The core calls out with an amount and an opaque reference and receives a
//! success/failure confirmation; the gateway's own protocol is not modelled
//! here. Raw payment details never enter raffle records.

mod http;
mod types;

pub use http::HttpPaymentProvider;
pub use types::{ChargeRequest, PaymentConfirmation, RefundInstruction};

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur talking to the payment gateway.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Gateway rejected the request or returned an error status.
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    /// Gateway response could not be understood.
    #[error("Invalid gateway response: {0}")]
    InvalidResponse(String),

    /// Transport failure (connection, timeout).
    #[error("Payment request failed: {0}")]
    Transport(String),
}

/// Trait for payment provider backends.
///
/// A declined charge is NOT an error: it comes back as a confirmation with
/// `approved = false`. Errors mean the gateway could not be asked at all.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Charge the given amount against the given reference.
    async fn charge(&self, request: &ChargeRequest) -> Result<PaymentConfirmation, PaymentError>;

    /// Instruct the gateway to refund a settled entry.
    async fn refund(&self, instruction: &RefundInstruction) -> Result<(), PaymentError>;

    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;
}
