//! Core domain data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Competition
// ============================================================================

/// Lifecycle status of a competition.
///
/// ```text
/// Open -> ClosedSettled   (close time reached, threshold met or absent)
/// Open -> ClosedRefunded  (close time reached, threshold missed)
/// ```
///
/// Both closed states are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompetitionStatus {
    /// Selling tickets; holds and purchases are accepted.
    Open,
    /// Closed with the minimum threshold met (or no threshold); eligible for a draw.
    ClosedSettled,
    /// Closed below the minimum threshold; every entry is flagged for refund.
    ClosedRefunded,
}

impl CompetitionStatus {
    /// Returns the status as a string (for storage and filtering).
    pub fn as_str(&self) -> &'static str {
        match self {
            CompetitionStatus::Open => "open",
            CompetitionStatus::ClosedSettled => "closed_settled",
            CompetitionStatus::ClosedRefunded => "closed_refunded",
        }
    }

    /// Parse a status from its storage string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(CompetitionStatus::Open),
            "closed_settled" => Some(CompetitionStatus::ClosedSettled),
            "closed_refunded" => Some(CompetitionStatus::ClosedRefunded),
            _ => None,
        }
    }

    /// Returns true if no further sales are possible.
    pub fn is_closed(&self) -> bool {
        !matches!(self, CompetitionStatus::Open)
    }
}

/// A pay-to-enter prize competition with a fixed number of tickets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Competition {
    /// Unique identifier (UUID).
    pub id: String,

    /// Display name.
    pub name: String,

    /// Total tickets available. Fixed at creation, immutable.
    pub total_tickets: u32,

    /// Minimum tickets that must sell for the competition to proceed.
    /// None means the competition always proceeds to a draw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_tickets: Option<u32>,

    /// Price per ticket in minor currency units.
    pub ticket_price_cents: u64,

    /// Number of winning tickets drawn (N >= 1).
    pub prize_count: u32,

    /// When the competition stops selling and is evaluated.
    pub closes_at: DateTime<Utc>,

    /// Current lifecycle status.
    pub status: CompetitionStatus,

    /// Winning ticket numbers, set only after a successful draw.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub winning_tickets: Vec<u32>,

    pub created_at: DateTime<Utc>,
}

impl Competition {
    /// Returns true if the given sold count satisfies the threshold.
    pub fn threshold_met(&self, sold: u32) -> bool {
        match self.min_tickets {
            Some(min) => sold >= min,
            None => true,
        }
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Point-in-time view of a competition's inventory counters.
///
/// The invariant `held + sold <= total` holds at every observable instant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub total: u32,
    pub held: u32,
    pub sold: u32,
}

impl LedgerSnapshot {
    /// Tickets neither held nor sold.
    pub fn available(&self) -> u32 {
        self.total - self.held - self.sold
    }
}

// ============================================================================
// Hold
// ============================================================================

/// State of a checkout hold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HoldState {
    /// Counted in the ledger's `held`; may be renewed, released, or settled.
    Active,
    /// Released by the session, a superseding hold, or competition close.
    Released,
    /// Released because its TTL lapsed.
    Expired,
    /// Settled into an entry by a completed purchase.
    Consumed,
}

impl HoldState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HoldState::Active => "active",
            HoldState::Released => "released",
            HoldState::Expired => "expired",
            HoldState::Consumed => "consumed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(HoldState::Active),
            "released" => Some(HoldState::Released),
            "expired" => Some(HoldState::Expired),
            "consumed" => Some(HoldState::Consumed),
            _ => None,
        }
    }
}

/// A temporary, expiring reservation of tickets against a competition's
/// capacity. Not yet a sale: its quantity is counted in `held`, never `sold`.
///
/// At most one Active hold exists per (competition, session); creating a new
/// one supersedes the previous one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hold {
    /// Unique identifier (UUID).
    pub id: String,

    pub competition_id: String,

    /// Cart/session identifier supplied by the caller.
    pub session_id: String,

    /// Number of tickets reserved.
    pub quantity: u32,

    pub state: HoldState,

    pub created_at: DateTime<Utc>,

    /// TTL deadline. Renewal extends this from "now", not from creation.
    pub expires_at: DateTime<Utc>,
}

impl Hold {
    /// Returns true if the hold is Active and its TTL has not lapsed at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.state == HoldState::Active && self.expires_at > now
    }

    /// Returns true if the hold is Active but overdue for expiry at `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.state == HoldState::Active && self.expires_at <= now
    }
}

// ============================================================================
// Entry
// ============================================================================

/// A finalized, paid ticket purchase.
///
/// Ticket numbers are assigned as a contiguous range at settlement and are
/// unique within the competition. Immutable once created, except for the
/// `refunded` flag set by the closeout coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entry {
    /// Unique identifier (UUID).
    pub id: String,

    pub competition_id: String,

    /// Purchaser identity supplied by the caller. The core does not manage
    /// login identity.
    pub user_id: String,

    /// First ticket number of the contiguous range.
    pub first_ticket: u32,

    /// Number of tickets in the range.
    pub quantity: u32,

    /// Opaque payment gateway reference. Never raw payment details.
    pub payment_ref: String,

    /// Set when the competition closes below its threshold.
    pub refunded: bool,

    pub created_at: DateTime<Utc>,
}

impl Entry {
    /// All ticket numbers covered by this entry, ascending.
    pub fn ticket_numbers(&self) -> Vec<u32> {
        (self.first_ticket..self.first_ticket + self.quantity).collect()
    }

    /// Returns true if `ticket` falls within this entry's range.
    pub fn contains_ticket(&self, ticket: u32) -> bool {
        ticket >= self.first_ticket && ticket < self.first_ticket + self.quantity
    }
}

// ============================================================================
// Draw record
// ============================================================================

/// Proof material for a completed draw.
///
/// `seed` and `algorithm` are sufficient for any third party to recompute
/// `winning_tickets` from the competition's sold ticket numbers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrawRecord {
    pub competition_id: String,

    /// Disclosed seed material (externally supplied or locally generated).
    pub seed: String,

    /// Versioned selection algorithm tag, e.g. `sha256-mod-v1`.
    pub algorithm: String,

    /// Winning ticket numbers, in the order drawn.
    pub winning_tickets: Vec<u32>,

    pub drawn_at: DateTime<Utc>,
}
