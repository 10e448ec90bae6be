use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit event types.
///
/// The trail doubles as the third-party audit surface for draws and
/// refunds: `WinnersDrawn` carries the seed and algorithm tag, and exactly
/// one `RefundIssued` is recorded per refunded entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Competition lifecycle
    CompetitionCreated {
        competition_id: String,
        name: String,
        total_tickets: u32,
        min_tickets: Option<u32>,
        closes_at: DateTime<Utc>,
    },
    CompetitionSettled {
        competition_id: String,
        sold: u32,
    },
    CompetitionRefunded {
        competition_id: String,
        sold: u32,
        min_tickets: u32,
        refund_count: usize,
    },

    // Hold lifecycle
    HoldCreated {
        hold_id: String,
        competition_id: String,
        session_id: String,
        quantity: u32,
        expires_at: DateTime<Utc>,
    },
    HoldRenewed {
        hold_id: String,
        competition_id: String,
        expires_at: DateTime<Utc>,
    },
    HoldReleased {
        hold_id: String,
        competition_id: String,
        quantity: u32,
    },
    HoldExpired {
        hold_id: String,
        competition_id: String,
        quantity: u32,
    },

    // Purchases
    EntryRecorded {
        entry_id: String,
        competition_id: String,
        user_id: String,
        first_ticket: u32,
        quantity: u32,
        payment_ref: String,
    },
    PaymentDeclined {
        hold_id: String,
        competition_id: String,
        reason: Option<String>,
    },
    RefundIssued {
        entry_id: String,
        competition_id: String,
        payment_ref: String,
        amount_cents: u64,
    },

    // Draw
    WinnersDrawn {
        competition_id: String,
        seed: String,
        algorithm: String,
        winning_tickets: Vec<u32>,
    },
}

impl AuditEvent {
    /// Event type as a string (for storage and filtering).
    pub fn event_type(&self) -> &'static str {
        match self {
            AuditEvent::ServiceStarted { .. } => "service_started",
            AuditEvent::ServiceStopped { .. } => "service_stopped",
            AuditEvent::CompetitionCreated { .. } => "competition_created",
            AuditEvent::CompetitionSettled { .. } => "competition_settled",
            AuditEvent::CompetitionRefunded { .. } => "competition_refunded",
            AuditEvent::HoldCreated { .. } => "hold_created",
            AuditEvent::HoldRenewed { .. } => "hold_renewed",
            AuditEvent::HoldReleased { .. } => "hold_released",
            AuditEvent::HoldExpired { .. } => "hold_expired",
            AuditEvent::EntryRecorded { .. } => "entry_recorded",
            AuditEvent::PaymentDeclined { .. } => "payment_declined",
            AuditEvent::RefundIssued { .. } => "refund_issued",
            AuditEvent::WinnersDrawn { .. } => "winners_drawn",
        }
    }

    /// Competition this event belongs to, if any (for the index column).
    pub fn competition_id(&self) -> Option<&str> {
        match self {
            AuditEvent::ServiceStarted { .. } | AuditEvent::ServiceStopped { .. } => None,
            AuditEvent::CompetitionCreated { competition_id, .. }
            | AuditEvent::CompetitionSettled { competition_id, .. }
            | AuditEvent::CompetitionRefunded { competition_id, .. }
            | AuditEvent::HoldCreated { competition_id, .. }
            | AuditEvent::HoldRenewed { competition_id, .. }
            | AuditEvent::HoldReleased { competition_id, .. }
            | AuditEvent::HoldExpired { competition_id, .. }
            | AuditEvent::EntryRecorded { competition_id, .. }
            | AuditEvent::PaymentDeclined { competition_id, .. }
            | AuditEvent::RefundIssued { competition_id, .. }
            | AuditEvent::WinnersDrawn { competition_id, .. } => Some(competition_id),
        }
    }

    /// The hold or entry the event concerns, if any (for the index column).
    pub fn subject_id(&self) -> Option<&str> {
        match self {
            AuditEvent::HoldCreated { hold_id, .. }
            | AuditEvent::HoldRenewed { hold_id, .. }
            | AuditEvent::HoldReleased { hold_id, .. }
            | AuditEvent::HoldExpired { hold_id, .. }
            | AuditEvent::PaymentDeclined { hold_id, .. } => Some(hold_id),
            AuditEvent::EntryRecorded { entry_id, .. }
            | AuditEvent::RefundIssued { entry_id, .. } => Some(entry_id),
            _ => None,
        }
    }
}

/// A stored audit event with its envelope metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub competition_id: Option<String>,
    pub subject_id: Option<String>,
    pub data: AuditEvent,
}
