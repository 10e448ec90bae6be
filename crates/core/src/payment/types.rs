use serde::{Deserialize, Serialize};

/// A charge request sent to the payment gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChargeRequest {
    /// Opaque reference tying the charge to a checkout (never card data).
    pub reference: String,
    /// Amount in minor currency units.
    pub amount_cents: u64,
}

/// Result of a charge attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentConfirmation {
    /// Gateway reference for the charge, stored on the entry.
    pub reference: String,
    /// Whether the charge succeeded.
    pub approved: bool,
    /// Decline reason, when not approved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declined_reason: Option<String>,
}

impl PaymentConfirmation {
    pub fn approved(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            approved: true,
            declined_reason: None,
        }
    }

    pub fn declined(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            approved: false,
            declined_reason: Some(reason.into()),
        }
    }
}

/// Instruction to refund one settled entry.
///
/// Exactly one instruction is emitted per entry when a competition closes
/// below its threshold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefundInstruction {
    pub entry_id: String,
    pub competition_id: String,
    /// The gateway reference the original charge settled under.
    pub payment_ref: String,
    pub amount_cents: u64,
}
