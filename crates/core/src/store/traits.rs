//! Raffle storage trait and request types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{Competition, DrawRecord, Entry, Hold, LedgerSnapshot};

/// Error type for store operations.
///
/// The first group is expected and user-facing; the second group indicates a
/// programming or scheduling mistake; `ContractViolation` and `Database` are
/// operator-facing.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Fewer tickets remain than were requested. Retryable with a smaller
    /// quantity, or after holds expire.
    #[error("insufficient capacity: requested {requested}, available {available}")]
    InsufficientCapacity { requested: u32, available: u32 },

    /// The competition is past close; no further holds or sales.
    #[error("competition {0} is closed")]
    CompetitionClosed(String),

    /// Hold does not exist.
    #[error("hold not found: {0}")]
    HoldNotFound(String),

    /// Hold TTL lapsed (or it was released) before the operation.
    #[error("hold expired: {0}")]
    HoldExpired(String),

    /// Hold was already settled into an entry. Holds are single-use.
    #[error("hold already consumed: {0}")]
    AlreadyConsumed(String),

    /// Draw requested on a competition that is not settled.
    #[error("competition {id} is not settled (status: {status})")]
    NotSettled { id: String, status: String },

    /// A draw record already exists for this competition.
    #[error("competition {0} has already been drawn")]
    AlreadyDrawn(String),

    /// Competition does not exist.
    #[error("competition not found: {0}")]
    NotFound(String),

    /// Malformed request (zero quantity, zero tickets, ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A caller released or promoted capacity it never reserved. Fatal in
    /// development builds; logged and rejected in production.
    #[error("ledger contract violation: {0}")]
    ContractViolation(String),

    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(String),
}

/// Request to create a new competition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCompetition {
    pub name: String,
    /// Total tickets available; immutable after creation.
    pub total_tickets: u32,
    /// Minimum tickets that must sell, or None for no threshold.
    #[serde(default)]
    pub min_tickets: Option<u32>,
    /// Price per ticket in minor currency units.
    pub ticket_price_cents: u64,
    /// Number of winners drawn (defaults to 1).
    #[serde(default = "default_prize_count")]
    pub prize_count: u32,
    pub closes_at: DateTime<Utc>,
}

fn default_prize_count() -> u32 {
    1
}

/// Filter for listing competitions.
#[derive(Debug, Clone, Default)]
pub struct CompetitionFilter {
    /// Filter by status string (see [`CompetitionStatus::as_str`]).
    ///
    /// [`CompetitionStatus::as_str`]: crate::store::CompetitionStatus::as_str
    pub status: Option<String>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl CompetitionFilter {
    pub fn new() -> Self {
        Self {
            status: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Outcome of close-time evaluation.
#[derive(Debug, Clone)]
pub enum Closeout {
    /// Threshold met (or absent): the competition settled and is eligible
    /// for a draw.
    Settled { sold: u32 },
    /// Threshold missed: the competition was refunded. Carries every entry
    /// that was flagged, so the caller can emit one refund instruction each.
    Refunded { entries: Vec<Entry> },
    /// The competition was already closed; nothing changed.
    AlreadyClosed { status: crate::store::CompetitionStatus },
}

/// Trait for raffle storage backends.
///
/// Every method is an atomic unit: it either fully applies or leaves the
/// store untouched. Operations on the same competition are serialized
/// relative to each other, so the invariant `held + sold <= total` holds at
/// every observable instant, under any interleaving.
pub trait RaffleStore: Send + Sync {
    // ------------------------------------------------------------------
    // Competitions
    // ------------------------------------------------------------------

    /// Create a new competition in the Open state.
    fn create_competition(&self, request: NewCompetition) -> Result<Competition, StoreError>;

    /// Get a competition by ID.
    fn get_competition(&self, id: &str) -> Result<Option<Competition>, StoreError>;

    /// List competitions matching the filter, newest first.
    fn list_competitions(&self, filter: &CompetitionFilter) -> Result<Vec<Competition>, StoreError>;

    // ------------------------------------------------------------------
    // Inventory ledger
    // ------------------------------------------------------------------

    /// Atomically reserve `qty` tickets. Fails fast with
    /// [`StoreError::InsufficientCapacity`] if fewer remain; never blocks or
    /// queues.
    fn reserve(&self, competition_id: &str, qty: u32) -> Result<(), StoreError>;

    /// Return `qty` previously reserved tickets to the pool. Releasing more
    /// than is held is a contract violation.
    fn release(&self, competition_id: &str, qty: u32) -> Result<(), StoreError>;

    /// Move `qty` tickets from held to sold. Promoting more than is held is
    /// a contract violation.
    fn promote(&self, competition_id: &str, qty: u32) -> Result<(), StoreError>;

    /// Current `{total, held, sold}` counters. Overdue holds are expired
    /// before the counters are read.
    fn snapshot(&self, competition_id: &str) -> Result<LedgerSnapshot, StoreError>;

    // ------------------------------------------------------------------
    // Holds
    // ------------------------------------------------------------------

    /// Create a hold for `qty` tickets, expiring after `ttl`.
    ///
    /// If the session already has an active hold on the competition, it is
    /// released first, then the new quantity is reserved, as a single
    /// atomic unit. If the new reservation fails the old hold is NOT
    /// resurrected; its release stands.
    fn create_hold(
        &self,
        competition_id: &str,
        session_id: &str,
        qty: u32,
        ttl: Duration,
    ) -> Result<Hold, StoreError>;

    /// Get a hold by ID.
    fn get_hold(&self, id: &str) -> Result<Option<Hold>, StoreError>;

    /// Extend a live hold's deadline to now + `ttl`. Fails with
    /// [`StoreError::HoldExpired`] if the TTL already lapsed.
    fn renew_hold(&self, id: &str, ttl: Duration) -> Result<Hold, StoreError>;

    /// Release a hold, returning its quantity to the pool. Releasing an
    /// already released/expired hold is a no-op; the quantity is returned
    /// exactly once no matter how releases and the sweep interleave.
    fn release_hold(&self, id: &str) -> Result<(), StoreError>;

    /// Expire every active hold whose deadline has passed, returning the
    /// holds that were expired. Called by the periodic sweeper; every read
    /// path also expires lazily, so correctness never depends on sweep
    /// timing.
    fn expire_due_holds(&self, now: DateTime<Utc>) -> Result<Vec<Hold>, StoreError>;

    // ------------------------------------------------------------------
    // Purchases / entries
    // ------------------------------------------------------------------

    /// Promote a live hold into an immutable entry: assigns the next
    /// contiguous ticket numbers, moves the quantity from held to sold,
    /// records the entry, and consumes the hold in one atomic unit, so a
    /// concurrent expiry sweep can never race a committing purchase.
    fn settle_purchase(
        &self,
        hold_id: &str,
        user_id: &str,
        payment_ref: &str,
    ) -> Result<Entry, StoreError>;

    /// Get an entry by ID.
    fn get_entry(&self, id: &str) -> Result<Option<Entry>, StoreError>;

    /// All entries for a competition, in settlement order.
    fn entries_for_competition(&self, competition_id: &str) -> Result<Vec<Entry>, StoreError>;

    /// Every sold ticket number for a competition, ascending.
    fn sold_ticket_numbers(&self, competition_id: &str) -> Result<Vec<u32>, StoreError>;

    // ------------------------------------------------------------------
    // Closeout and draw
    // ------------------------------------------------------------------

    /// Evaluate the competition at close: force-release any remaining active
    /// holds, then settle or refund based on the threshold. Idempotent:
    /// closing an already-closed competition returns
    /// [`Closeout::AlreadyClosed`] without mutation.
    fn close_competition(&self, id: &str, now: DateTime<Utc>) -> Result<Closeout, StoreError>;

    /// Record the draw for a settled competition. Single-shot: a second call
    /// fails with [`StoreError::AlreadyDrawn`] and does not mutate state.
    fn record_draw(
        &self,
        competition_id: &str,
        seed: &str,
        algorithm: &str,
        winning_tickets: &[u32],
        drawn_at: DateTime<Utc>,
    ) -> Result<DrawRecord, StoreError>;

    /// Get the draw record for a competition, if one exists.
    fn get_draw(&self, competition_id: &str) -> Result<Option<DrawRecord>, StoreError>;
}
