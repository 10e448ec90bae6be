//! Persistent raffle state: competitions, inventory counters, holds,
//! entries, and draw records.
//!
//! The store is the single source of truth. Every component mutates state
//! through its atomic operations; none keeps counters of its own.

mod sqlite;
mod traits;
mod types;

pub use sqlite::SqliteRaffleStore;
pub use traits::{Closeout, CompetitionFilter, NewCompetition, RaffleStore, StoreError};
pub use types::{
    Competition, CompetitionStatus, DrawRecord, Entry, Hold, HoldState, LedgerSnapshot,
};
