//! Mock payment provider for testing.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::payment::{
    ChargeRequest, PaymentConfirmation, PaymentError, PaymentProvider, RefundInstruction,
};

/// Mock implementation of the PaymentProvider trait.
///
/// Provides controllable behavior for testing:
/// - Approves every charge by default
/// - Can be switched to decline or fail at the transport level
/// - Records every charge and refund for assertions
pub struct MockPaymentProvider {
    charges: Mutex<Vec<ChargeRequest>>,
    refunds: Mutex<Vec<RefundInstruction>>,
    decline_reason: Mutex<Option<String>>,
    fail_transport: Mutex<bool>,
}

impl Default for MockPaymentProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPaymentProvider {
    /// Create a new mock that approves every charge.
    pub fn new() -> Self {
        Self {
            charges: Mutex::new(Vec::new()),
            refunds: Mutex::new(Vec::new()),
            decline_reason: Mutex::new(None),
            fail_transport: Mutex::new(false),
        }
    }

    /// Decline all subsequent charges with the given reason.
    pub fn decline_with(&self, reason: impl Into<String>) {
        *self.decline_reason.lock().unwrap() = Some(reason.into());
    }

    /// Approve subsequent charges again.
    pub fn approve(&self) {
        *self.decline_reason.lock().unwrap() = None;
    }

    /// Fail all subsequent requests at the transport level.
    pub fn fail_transport(&self) {
        *self.fail_transport.lock().unwrap() = true;
    }

    /// Charges recorded so far.
    pub fn charges(&self) -> Vec<ChargeRequest> {
        self.charges.lock().unwrap().clone()
    }

    /// Refund instructions recorded so far.
    pub fn refunds(&self) -> Vec<RefundInstruction> {
        self.refunds.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn charge(&self, request: &ChargeRequest) -> Result<PaymentConfirmation, PaymentError> {
        if *self.fail_transport.lock().unwrap() {
            return Err(PaymentError::Transport("mock transport failure".to_string()));
        }

        self.charges.lock().unwrap().push(request.clone());

        let reference = format!("mock-{}", request.reference);
        match self.decline_reason.lock().unwrap().clone() {
            Some(reason) => Ok(PaymentConfirmation::declined(reference, reason)),
            None => Ok(PaymentConfirmation::approved(reference)),
        }
    }

    async fn refund(&self, instruction: &RefundInstruction) -> Result<(), PaymentError> {
        if *self.fail_transport.lock().unwrap() {
            return Err(PaymentError::Transport("mock transport failure".to_string()));
        }
        self.refunds.lock().unwrap().push(instruction.clone());
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}
