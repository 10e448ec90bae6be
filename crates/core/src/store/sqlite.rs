//! SQLite-backed raffle store implementation.
//!
//! The connection (behind a mutex) is the serialization point required by
//! the inventory contract: every mutation is a single conditional statement
//! or an explicit transaction, so counters can never be observed or
//! persisted in a state violating `held + sold <= total`. No operation
//! performs network I/O while the connection is held.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use super::{
    Closeout, Competition, CompetitionFilter, CompetitionStatus, DrawRecord, Entry, Hold,
    HoldState, LedgerSnapshot, NewCompetition, RaffleStore, StoreError,
};

const COMPETITION_COLUMNS: &str = "id, name, total_tickets, min_tickets, ticket_price_cents, \
     prize_count, closes_at, status, winning_tickets, created_at";

const HOLD_COLUMNS: &str = "id, competition_id, session_id, quantity, state, created_at, expires_at";

const ENTRY_COLUMNS: &str =
    "id, competition_id, user_id, first_ticket, quantity, payment_ref, refunded, created_at";

/// SQLite-backed raffle store.
pub struct SqliteRaffleStore {
    conn: Mutex<Connection>,
}

impl SqliteRaffleStore {
    /// Create a new store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        // Other connections (e.g. the audit writer) share the file.
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS competitions (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                total_tickets INTEGER NOT NULL,
                min_tickets INTEGER,
                ticket_price_cents INTEGER NOT NULL,
                prize_count INTEGER NOT NULL DEFAULT 1,
                closes_at TEXT NOT NULL,
                status TEXT NOT NULL,
                winning_tickets TEXT,
                held INTEGER NOT NULL DEFAULT 0,
                sold INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS holds (
                id TEXT PRIMARY KEY,
                competition_id TEXT NOT NULL REFERENCES competitions(id),
                session_id TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS entries (
                id TEXT PRIMARY KEY,
                competition_id TEXT NOT NULL REFERENCES competitions(id),
                user_id TEXT NOT NULL,
                first_ticket INTEGER NOT NULL,
                quantity INTEGER NOT NULL,
                payment_ref TEXT NOT NULL,
                refunded INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS draws (
                competition_id TEXT PRIMARY KEY REFERENCES competitions(id),
                seed TEXT NOT NULL,
                algorithm TEXT NOT NULL,
                winning_tickets TEXT NOT NULL,
                drawn_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_competitions_status ON competitions(status);
            CREATE INDEX IF NOT EXISTS idx_holds_session ON holds(competition_id, session_id, state);
            CREATE INDEX IF NOT EXISTS idx_holds_expiry ON holds(state, expires_at);
            CREATE INDEX IF NOT EXISTS idx_entries_competition ON entries(competition_id, first_ticket);
            "#,
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn row_to_competition(row: &rusqlite::Row) -> rusqlite::Result<Competition> {
        let winning_tickets_json: Option<String> = row.get(8)?;
        let winning_tickets = winning_tickets_json
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default();

        Ok(Competition {
            id: row.get(0)?,
            name: row.get(1)?,
            total_tickets: row.get(2)?,
            min_tickets: row.get(3)?,
            ticket_price_cents: row.get(4)?,
            prize_count: row.get(5)?,
            closes_at: parse_timestamp(&row.get::<_, String>(6)?),
            status: CompetitionStatus::parse(&row.get::<_, String>(7)?)
                .unwrap_or(CompetitionStatus::Open),
            winning_tickets,
            created_at: parse_timestamp(&row.get::<_, String>(9)?),
        })
    }

    fn row_to_hold(row: &rusqlite::Row) -> rusqlite::Result<Hold> {
        Ok(Hold {
            id: row.get(0)?,
            competition_id: row.get(1)?,
            session_id: row.get(2)?,
            quantity: row.get(3)?,
            state: HoldState::parse(&row.get::<_, String>(4)?).unwrap_or(HoldState::Released),
            created_at: parse_timestamp(&row.get::<_, String>(5)?),
            expires_at: parse_timestamp(&row.get::<_, String>(6)?),
        })
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<Entry> {
        Ok(Entry {
            id: row.get(0)?,
            competition_id: row.get(1)?,
            user_id: row.get(2)?,
            first_ticket: row.get(3)?,
            quantity: row.get(4)?,
            payment_ref: row.get(5)?,
            refunded: row.get::<_, i64>(6)? != 0,
            created_at: parse_timestamp(&row.get::<_, String>(7)?),
        })
    }

    fn row_to_draw(row: &rusqlite::Row) -> rusqlite::Result<DrawRecord> {
        let winning_tickets_json: String = row.get(3)?;
        Ok(DrawRecord {
            competition_id: row.get(0)?,
            seed: row.get(1)?,
            algorithm: row.get(2)?,
            winning_tickets: serde_json::from_str(&winning_tickets_json).unwrap_or_default(),
            drawn_at: parse_timestamp(&row.get::<_, String>(4)?),
        })
    }

    /// Fetch a competition's counter row inside a transaction.
    fn counters(
        tx: &Transaction,
        competition_id: &str,
    ) -> Result<Option<(CompetitionStatus, u32, u32, u32)>, StoreError> {
        tx.query_row(
            "SELECT status, total_tickets, held, sold FROM competitions WHERE id = ?",
            params![competition_id],
            |row| {
                Ok((
                    CompetitionStatus::parse(&row.get::<_, String>(0)?)
                        .unwrap_or(CompetitionStatus::Open),
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                ))
            },
        )
        .optional()
        .map_err(db_err)
    }

    /// Lazily expire overdue holds for one competition, inside a transaction.
    ///
    /// Every read/mutate path runs this first, so an overdue hold is never
    /// observable as reserved capacity regardless of sweep timing.
    fn expire_due_for(
        tx: &Transaction,
        competition_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let overdue: u32 = tx
            .query_row(
                "SELECT COALESCE(SUM(quantity), 0) FROM holds \
                 WHERE competition_id = ? AND state = 'active' AND expires_at <= ?",
                params![competition_id, now.to_rfc3339()],
                |row| row.get(0),
            )
            .map_err(db_err)?;

        if overdue == 0 {
            return Ok(());
        }

        tx.execute(
            "UPDATE holds SET state = 'expired' \
             WHERE competition_id = ? AND state = 'active' AND expires_at <= ?",
            params![competition_id, now.to_rfc3339()],
        )
        .map_err(db_err)?;

        decrement_held(tx, competition_id, overdue)
    }

    /// Release one active hold's capacity inside a transaction, marking it
    /// with `end_state`. The quantity is returned to the pool exactly once.
    fn retire_hold(
        tx: &Transaction,
        hold: &Hold,
        end_state: HoldState,
    ) -> Result<(), StoreError> {
        tx.execute(
            "UPDATE holds SET state = ? WHERE id = ? AND state = 'active'",
            params![end_state.as_str(), hold.id],
        )
        .map_err(db_err)?;
        decrement_held(tx, &hold.competition_id, hold.quantity)
    }

    fn get_hold_tx(tx: &Transaction, id: &str) -> Result<Option<Hold>, StoreError> {
        tx.query_row(
            &format!("SELECT {} FROM holds WHERE id = ?", HOLD_COLUMNS),
            params![id],
            Self::row_to_hold,
        )
        .optional()
        .map_err(db_err)
    }
}

fn db_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Database(e.to_string())
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Decrement a competition's `held` counter, guarding against underflow.
///
/// Underflow means a caller released capacity it never reserved: fatal in
/// development builds, an error-logged rejection in production.
fn decrement_held(tx: &Transaction, competition_id: &str, qty: u32) -> Result<(), StoreError> {
    let updated = tx
        .execute(
            "UPDATE competitions SET held = held - ? WHERE id = ? AND held >= ?",
            params![qty, competition_id, qty],
        )
        .map_err(db_err)?;

    if updated == 0 {
        return Err(contract_violation(format!(
            "release of {} tickets exceeds held count for competition {}",
            qty, competition_id
        )));
    }
    Ok(())
}

fn contract_violation(message: String) -> StoreError {
    tracing::error!("ledger contract violation: {}", message);
    debug_assert!(false, "ledger contract violation: {}", message);
    StoreError::ContractViolation(message)
}

impl RaffleStore for SqliteRaffleStore {
    fn create_competition(&self, request: NewCompetition) -> Result<Competition, StoreError> {
        if request.total_tickets == 0 {
            return Err(StoreError::InvalidRequest(
                "total_tickets must be at least 1".to_string(),
            ));
        }
        if request.prize_count == 0 {
            return Err(StoreError::InvalidRequest(
                "prize_count must be at least 1".to_string(),
            ));
        }
        if let Some(min) = request.min_tickets {
            if min > request.total_tickets {
                return Err(StoreError::InvalidRequest(format!(
                    "min_tickets {} exceeds total_tickets {}",
                    min, request.total_tickets
                )));
            }
        }

        let conn = self.conn.lock().unwrap();
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO competitions \
             (id, name, total_tickets, min_tickets, ticket_price_cents, prize_count, \
              closes_at, status, held, sold, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?)",
            params![
                id,
                request.name,
                request.total_tickets,
                request.min_tickets,
                request.ticket_price_cents,
                request.prize_count,
                request.closes_at.to_rfc3339(),
                CompetitionStatus::Open.as_str(),
                now.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;

        Ok(Competition {
            id,
            name: request.name,
            total_tickets: request.total_tickets,
            min_tickets: request.min_tickets,
            ticket_price_cents: request.ticket_price_cents,
            prize_count: request.prize_count,
            closes_at: request.closes_at,
            status: CompetitionStatus::Open,
            winning_tickets: vec![],
            created_at: now,
        })
    }

    fn get_competition(&self, id: &str) -> Result<Option<Competition>, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM competitions WHERE id = ?", COMPETITION_COLUMNS),
            params![id],
            Self::row_to_competition,
        )
        .optional()
        .map_err(db_err)
    }

    fn list_competitions(&self, filter: &CompetitionFilter) -> Result<Vec<Competition>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, status_param) = match &filter.status {
            Some(status) => ("WHERE status = ?".to_string(), Some(status.clone())),
            None => (String::new(), None),
        };

        let sql = format!(
            "SELECT {} FROM competitions {} ORDER BY created_at DESC LIMIT ? OFFSET ?",
            COMPETITION_COLUMNS, where_clause
        );

        let mut stmt = conn.prepare(&sql).map_err(db_err)?;

        let rows = match status_param {
            Some(status) => stmt
                .query_map(
                    params![status, filter.limit, filter.offset],
                    Self::row_to_competition,
                )
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>(),
            None => stmt
                .query_map(params![filter.limit, filter.offset], Self::row_to_competition)
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>(),
        };

        rows.map_err(db_err)
    }

    fn reserve(&self, competition_id: &str, qty: u32) -> Result<(), StoreError> {
        if qty == 0 {
            return Err(StoreError::InvalidRequest(
                "quantity must be at least 1".to_string(),
            ));
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;
        let now = Utc::now();

        Self::expire_due_for(&tx, competition_id, now)?;

        let (status, total, held, sold) = Self::counters(&tx, competition_id)?
            .ok_or_else(|| StoreError::NotFound(competition_id.to_string()))?;

        if status.is_closed() {
            return Err(StoreError::CompetitionClosed(competition_id.to_string()));
        }

        let available = total - held - sold;
        if qty > available {
            return Err(StoreError::InsufficientCapacity {
                requested: qty,
                available,
            });
        }

        tx.execute(
            "UPDATE competitions SET held = held + ? WHERE id = ?",
            params![qty, competition_id],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)
    }

    fn release(&self, competition_id: &str, qty: u32) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;

        if Self::counters(&tx, competition_id)?.is_none() {
            return Err(StoreError::NotFound(competition_id.to_string()));
        }

        decrement_held(&tx, competition_id, qty)?;
        tx.commit().map_err(db_err)
    }

    fn promote(&self, competition_id: &str, qty: u32) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;

        let (status, _, held, _) = Self::counters(&tx, competition_id)?
            .ok_or_else(|| StoreError::NotFound(competition_id.to_string()))?;

        if status.is_closed() {
            return Err(StoreError::CompetitionClosed(competition_id.to_string()));
        }
        if held < qty {
            return Err(contract_violation(format!(
                "promotion of {} tickets exceeds held count {} for competition {}",
                qty, held, competition_id
            )));
        }

        tx.execute(
            "UPDATE competitions SET held = held - ?, sold = sold + ? WHERE id = ?",
            params![qty, qty, competition_id],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)
    }

    fn snapshot(&self, competition_id: &str) -> Result<LedgerSnapshot, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;
        let now = Utc::now();

        Self::expire_due_for(&tx, competition_id, now)?;

        let (_, total, held, sold) = Self::counters(&tx, competition_id)?
            .ok_or_else(|| StoreError::NotFound(competition_id.to_string()))?;

        tx.commit().map_err(db_err)?;

        Ok(LedgerSnapshot { total, held, sold })
    }

    fn create_hold(
        &self,
        competition_id: &str,
        session_id: &str,
        qty: u32,
        ttl: Duration,
    ) -> Result<Hold, StoreError> {
        if qty == 0 {
            return Err(StoreError::InvalidRequest(
                "quantity must be at least 1".to_string(),
            ));
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;
        let now = Utc::now();

        Self::expire_due_for(&tx, competition_id, now)?;

        let (status, total, mut held, sold) = Self::counters(&tx, competition_id)?
            .ok_or_else(|| StoreError::NotFound(competition_id.to_string()))?;

        if status.is_closed() {
            return Err(StoreError::CompetitionClosed(competition_id.to_string()));
        }

        // Supersede any live hold this session already has on the
        // competition. The release stands even if the new reservation
        // fails below.
        let prior: Option<Hold> = tx
            .query_row(
                &format!(
                    "SELECT {} FROM holds \
                     WHERE competition_id = ? AND session_id = ? AND state = 'active'",
                    HOLD_COLUMNS
                ),
                params![competition_id, session_id],
                Self::row_to_hold,
            )
            .optional()
            .map_err(db_err)?;

        if let Some(ref old) = prior {
            Self::retire_hold(&tx, old, HoldState::Released)?;
            held -= old.quantity.min(held);
        }

        let available = total - held - sold;
        if qty > available {
            // Commit so the superseded hold stays released; the session
            // must retry with a quantity that fits.
            tx.commit().map_err(db_err)?;
            return Err(StoreError::InsufficientCapacity {
                requested: qty,
                available,
            });
        }

        tx.execute(
            "UPDATE competitions SET held = held + ? WHERE id = ?",
            params![qty, competition_id],
        )
        .map_err(db_err)?;

        let hold = Hold {
            id: uuid::Uuid::new_v4().to_string(),
            competition_id: competition_id.to_string(),
            session_id: session_id.to_string(),
            quantity: qty,
            state: HoldState::Active,
            created_at: now,
            expires_at: now + ttl,
        };

        tx.execute(
            "INSERT INTO holds (id, competition_id, session_id, quantity, state, created_at, expires_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                hold.id,
                hold.competition_id,
                hold.session_id,
                hold.quantity,
                hold.state.as_str(),
                hold.created_at.to_rfc3339(),
                hold.expires_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;
        Ok(hold)
    }

    fn get_hold(&self, id: &str) -> Result<Option<Hold>, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM holds WHERE id = ?", HOLD_COLUMNS),
            params![id],
            Self::row_to_hold,
        )
        .optional()
        .map_err(db_err)
    }

    fn renew_hold(&self, id: &str, ttl: Duration) -> Result<Hold, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;
        let now = Utc::now();

        let hold =
            Self::get_hold_tx(&tx, id)?.ok_or_else(|| StoreError::HoldNotFound(id.to_string()))?;

        match hold.state {
            HoldState::Consumed => return Err(StoreError::AlreadyConsumed(id.to_string())),
            HoldState::Released | HoldState::Expired => {
                return Err(StoreError::HoldExpired(id.to_string()))
            }
            HoldState::Active => {}
        }

        if hold.is_overdue(now) {
            // The sweep may not have caught it yet; expire it now.
            Self::retire_hold(&tx, &hold, HoldState::Expired)?;
            tx.commit().map_err(db_err)?;
            return Err(StoreError::HoldExpired(id.to_string()));
        }

        // Extend from "now", not from the original creation time.
        let expires_at = now + ttl;
        tx.execute(
            "UPDATE holds SET expires_at = ? WHERE id = ?",
            params![expires_at.to_rfc3339(), id],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;
        Ok(Hold { expires_at, ..hold })
    }

    fn release_hold(&self, id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;
        let now = Utc::now();

        let hold =
            Self::get_hold_tx(&tx, id)?.ok_or_else(|| StoreError::HoldNotFound(id.to_string()))?;

        match hold.state {
            HoldState::Consumed => return Err(StoreError::AlreadyConsumed(id.to_string())),
            // Already released or expired: the quantity went back exactly
            // once. A racing release and sweep must not double-release.
            HoldState::Released | HoldState::Expired => return Ok(()),
            HoldState::Active => {}
        }

        let end_state = if hold.is_overdue(now) {
            HoldState::Expired
        } else {
            HoldState::Released
        };
        Self::retire_hold(&tx, &hold, end_state)?;

        tx.commit().map_err(db_err)
    }

    fn expire_due_holds(&self, now: DateTime<Utc>) -> Result<Vec<Hold>, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;

        let overdue: Vec<Hold> = {
            let mut stmt = tx
                .prepare(&format!(
                    "SELECT {} FROM holds WHERE state = 'active' AND expires_at <= ?",
                    HOLD_COLUMNS
                ))
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![now.to_rfc3339()], Self::row_to_hold)
                .map_err(db_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(db_err)?
        };

        for hold in &overdue {
            Self::retire_hold(&tx, hold, HoldState::Expired)?;
        }

        tx.commit().map_err(db_err)?;

        Ok(overdue
            .into_iter()
            .map(|h| Hold {
                state: HoldState::Expired,
                ..h
            })
            .collect())
    }

    fn settle_purchase(
        &self,
        hold_id: &str,
        user_id: &str,
        payment_ref: &str,
    ) -> Result<Entry, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;
        let now = Utc::now();

        let hold = Self::get_hold_tx(&tx, hold_id)?
            .ok_or_else(|| StoreError::HoldNotFound(hold_id.to_string()))?;

        match hold.state {
            HoldState::Consumed => return Err(StoreError::AlreadyConsumed(hold_id.to_string())),
            HoldState::Released | HoldState::Expired => {
                return Err(StoreError::HoldExpired(hold_id.to_string()))
            }
            HoldState::Active => {}
        }

        if hold.is_overdue(now) {
            Self::retire_hold(&tx, &hold, HoldState::Expired)?;
            tx.commit().map_err(db_err)?;
            return Err(StoreError::HoldExpired(hold_id.to_string()));
        }

        let (status, _, held, sold) = Self::counters(&tx, &hold.competition_id)?
            .ok_or_else(|| StoreError::NotFound(hold.competition_id.clone()))?;

        // A refunded competition can never gain entries.
        if status.is_closed() {
            return Err(StoreError::CompetitionClosed(hold.competition_id.clone()));
        }

        if held < hold.quantity {
            return Err(contract_violation(format!(
                "settling hold {} for {} tickets exceeds held count {}",
                hold_id, hold.quantity, held
            )));
        }

        // Ticket numbers are the next contiguous range after the current
        // sold count; uniqueness follows from `sold` being monotonic inside
        // this transaction.
        let first_ticket = sold + 1;

        tx.execute(
            "UPDATE competitions SET held = held - ?, sold = sold + ? WHERE id = ?",
            params![hold.quantity, hold.quantity, hold.competition_id],
        )
        .map_err(db_err)?;

        let entry = Entry {
            id: uuid::Uuid::new_v4().to_string(),
            competition_id: hold.competition_id.clone(),
            user_id: user_id.to_string(),
            first_ticket,
            quantity: hold.quantity,
            payment_ref: payment_ref.to_string(),
            refunded: false,
            created_at: now,
        };

        tx.execute(
            "INSERT INTO entries \
             (id, competition_id, user_id, first_ticket, quantity, payment_ref, refunded, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
            params![
                entry.id,
                entry.competition_id,
                entry.user_id,
                entry.first_ticket,
                entry.quantity,
                entry.payment_ref,
                entry.created_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;

        tx.execute(
            "UPDATE holds SET state = 'consumed' WHERE id = ?",
            params![hold_id],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;
        Ok(entry)
    }

    fn get_entry(&self, id: &str) -> Result<Option<Entry>, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM entries WHERE id = ?", ENTRY_COLUMNS),
            params![id],
            Self::row_to_entry,
        )
        .optional()
        .map_err(db_err)
    }

    fn entries_for_competition(&self, competition_id: &str) -> Result<Vec<Entry>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM entries WHERE competition_id = ? ORDER BY first_ticket ASC",
                ENTRY_COLUMNS
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![competition_id], Self::row_to_entry)
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    fn sold_ticket_numbers(&self, competition_id: &str) -> Result<Vec<u32>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT first_ticket, quantity FROM entries \
                 WHERE competition_id = ? ORDER BY first_ticket ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![competition_id], |row| {
                Ok((row.get::<_, u32>(0)?, row.get::<_, u32>(1)?))
            })
            .map_err(db_err)?;

        let mut tickets = Vec::new();
        for row in rows {
            let (first, quantity) = row.map_err(db_err)?;
            tickets.extend(first..first + quantity);
        }
        Ok(tickets)
    }

    fn close_competition(&self, id: &str, now: DateTime<Utc>) -> Result<Closeout, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;

        let competition = tx
            .query_row(
                &format!("SELECT {} FROM competitions WHERE id = ?", COMPETITION_COLUMNS),
                params![id],
                Self::row_to_competition,
            )
            .optional()
            .map_err(db_err)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        // Idempotent: re-invocation on a closed competition is a no-op.
        if competition.status.is_closed() {
            return Ok(Closeout::AlreadyClosed {
                status: competition.status,
            });
        }

        // Overdue holds expire as usual; whatever is still live is then
        // forcibly released, so in-flight unpurchased holds never affect
        // the threshold comparison.
        Self::expire_due_for(&tx, id, now)?;

        let outstanding: u32 = tx
            .query_row(
                "SELECT COALESCE(SUM(quantity), 0) FROM holds \
                 WHERE competition_id = ? AND state = 'active'",
                params![id],
                |row| row.get(0),
            )
            .map_err(db_err)?;

        if outstanding > 0 {
            tx.execute(
                "UPDATE holds SET state = 'released' \
                 WHERE competition_id = ? AND state = 'active'",
                params![id],
            )
            .map_err(db_err)?;
            decrement_held(&tx, id, outstanding)?;
        }

        let sold: u32 = tx
            .query_row(
                "SELECT sold FROM competitions WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .map_err(db_err)?;

        if competition.threshold_met(sold) {
            tx.execute(
                "UPDATE competitions SET status = ? WHERE id = ?",
                params![CompetitionStatus::ClosedSettled.as_str(), id],
            )
            .map_err(db_err)?;
            tx.commit().map_err(db_err)?;
            return Ok(Closeout::Settled { sold });
        }

        tx.execute(
            "UPDATE competitions SET status = ? WHERE id = ?",
            params![CompetitionStatus::ClosedRefunded.as_str(), id],
        )
        .map_err(db_err)?;
        tx.execute(
            "UPDATE entries SET refunded = 1 WHERE competition_id = ?",
            params![id],
        )
        .map_err(db_err)?;

        let entries: Vec<Entry> = {
            let mut stmt = tx
                .prepare(&format!(
                    "SELECT {} FROM entries WHERE competition_id = ? ORDER BY first_ticket ASC",
                    ENTRY_COLUMNS
                ))
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![id], Self::row_to_entry)
                .map_err(db_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(db_err)?
        };

        tx.commit().map_err(db_err)?;
        Ok(Closeout::Refunded { entries })
    }

    fn record_draw(
        &self,
        competition_id: &str,
        seed: &str,
        algorithm: &str,
        winning_tickets: &[u32],
        drawn_at: DateTime<Utc>,
    ) -> Result<DrawRecord, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;

        let (status, _, _, _) = Self::counters(&tx, competition_id)?
            .ok_or_else(|| StoreError::NotFound(competition_id.to_string()))?;

        if status != CompetitionStatus::ClosedSettled {
            return Err(StoreError::NotSettled {
                id: competition_id.to_string(),
                status: status.as_str().to_string(),
            });
        }

        let existing: Option<String> = tx
            .query_row(
                "SELECT competition_id FROM draws WHERE competition_id = ?",
                params![competition_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        if existing.is_some() {
            return Err(StoreError::AlreadyDrawn(competition_id.to_string()));
        }

        let winners_json = serde_json::to_string(winning_tickets).map_err(db_err)?;

        tx.execute(
            "INSERT INTO draws (competition_id, seed, algorithm, winning_tickets, drawn_at) \
             VALUES (?, ?, ?, ?, ?)",
            params![
                competition_id,
                seed,
                algorithm,
                winners_json,
                drawn_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;

        tx.execute(
            "UPDATE competitions SET winning_tickets = ? WHERE id = ?",
            params![winners_json, competition_id],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;

        Ok(DrawRecord {
            competition_id: competition_id.to_string(),
            seed: seed.to_string(),
            algorithm: algorithm.to_string(),
            winning_tickets: winning_tickets.to_vec(),
            drawn_at,
        })
    }

    fn get_draw(&self, competition_id: &str) -> Result<Option<DrawRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT competition_id, seed, algorithm, winning_tickets, drawn_at \
             FROM draws WHERE competition_id = ?",
            params![competition_id],
            Self::row_to_draw,
        )
        .optional()
        .map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> SqliteRaffleStore {
        SqliteRaffleStore::in_memory().unwrap()
    }

    fn open_competition(store: &SqliteRaffleStore, total: u32, min: Option<u32>) -> Competition {
        store
            .create_competition(NewCompetition {
                name: "test raffle".to_string(),
                total_tickets: total,
                min_tickets: min,
                ticket_price_cents: 500,
                prize_count: 1,
                closes_at: Utc::now() + Duration::hours(1),
            })
            .unwrap()
    }

    fn ttl() -> Duration {
        Duration::minutes(10)
    }

    #[test]
    fn test_create_competition() {
        let store = create_test_store();
        let comp = open_competition(&store, 100, Some(50));

        assert!(!comp.id.is_empty());
        assert_eq!(comp.total_tickets, 100);
        assert_eq!(comp.min_tickets, Some(50));
        assert_eq!(comp.status, CompetitionStatus::Open);

        let fetched = store.get_competition(&comp.id).unwrap().unwrap();
        assert_eq!(fetched, comp);
    }

    #[test]
    fn test_create_competition_rejects_zero_tickets() {
        let store = create_test_store();
        let result = store.create_competition(NewCompetition {
            name: "empty".to_string(),
            total_tickets: 0,
            min_tickets: None,
            ticket_price_cents: 100,
            prize_count: 1,
            closes_at: Utc::now(),
        });
        assert!(matches!(result, Err(StoreError::InvalidRequest(_))));
    }

    #[test]
    fn test_create_competition_rejects_threshold_above_total() {
        let store = create_test_store();
        let result = store.create_competition(NewCompetition {
            name: "impossible".to_string(),
            total_tickets: 10,
            min_tickets: Some(11),
            ticket_price_cents: 100,
            prize_count: 1,
            closes_at: Utc::now(),
        });
        assert!(matches!(result, Err(StoreError::InvalidRequest(_))));
    }

    #[test]
    fn test_list_competitions_with_status_filter() {
        let store = create_test_store();
        let open = open_competition(&store, 10, None);
        let closed = open_competition(&store, 10, None);
        store.close_competition(&closed.id, Utc::now()).unwrap();

        let filter = CompetitionFilter::new().with_status("open");
        let listed = store.list_competitions(&filter).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, open.id);

        let filter = CompetitionFilter::new().with_status("closed_settled");
        assert_eq!(store.list_competitions(&filter).unwrap().len(), 1);
    }

    #[test]
    fn test_reserve_and_snapshot() {
        let store = create_test_store();
        let comp = open_competition(&store, 10, None);

        store.reserve(&comp.id, 4).unwrap();
        let snap = store.snapshot(&comp.id).unwrap();
        assert_eq!(snap.held, 4);
        assert_eq!(snap.sold, 0);
        assert_eq!(snap.available(), 6);
    }

    #[test]
    fn test_reserve_fails_fast_when_over_capacity() {
        let store = create_test_store();
        let comp = open_competition(&store, 10, None);

        store.reserve(&comp.id, 8).unwrap();
        let result = store.reserve(&comp.id, 3);
        assert!(matches!(
            result,
            Err(StoreError::InsufficientCapacity {
                requested: 3,
                available: 2
            })
        ));

        // The failed reserve changed nothing.
        let snap = store.snapshot(&comp.id).unwrap();
        assert_eq!(snap.held, 8);
    }

    #[test]
    fn test_reserve_unknown_competition() {
        let store = create_test_store();
        assert!(matches!(
            store.reserve("nope", 1),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_release_and_promote() {
        let store = create_test_store();
        let comp = open_competition(&store, 10, None);

        store.reserve(&comp.id, 5).unwrap();
        store.release(&comp.id, 2).unwrap();
        store.promote(&comp.id, 3).unwrap();

        let snap = store.snapshot(&comp.id).unwrap();
        assert_eq!(snap.held, 0);
        assert_eq!(snap.sold, 3);
    }

    #[test]
    #[should_panic(expected = "ledger contract violation")]
    fn test_release_more_than_held_is_fatal_in_dev() {
        let store = create_test_store();
        let comp = open_competition(&store, 10, None);
        store.reserve(&comp.id, 2).unwrap();
        let _ = store.release(&comp.id, 3);
    }

    #[test]
    fn test_create_hold_reserves_capacity() {
        let store = create_test_store();
        let comp = open_competition(&store, 10, None);

        let hold = store.create_hold(&comp.id, "session-1", 4, ttl()).unwrap();
        assert_eq!(hold.quantity, 4);
        assert_eq!(hold.state, HoldState::Active);
        assert!(hold.expires_at > hold.created_at);

        assert_eq!(store.snapshot(&comp.id).unwrap().held, 4);
    }

    #[test]
    fn test_create_hold_supersedes_previous() {
        let store = create_test_store();
        let comp = open_competition(&store, 10, None);

        let first = store.create_hold(&comp.id, "session-1", 4, ttl()).unwrap();
        let second = store.create_hold(&comp.id, "session-1", 6, ttl()).unwrap();

        // Only the new hold's quantity is reserved.
        assert_eq!(store.snapshot(&comp.id).unwrap().held, 6);
        assert_ne!(first.id, second.id);

        let old = store.get_hold(&first.id).unwrap().unwrap();
        assert_eq!(old.state, HoldState::Released);
    }

    #[test]
    fn test_supersede_releases_even_when_new_reservation_fails() {
        let store = create_test_store();
        let comp = open_competition(&store, 10, None);

        // Another session occupies most of the pool.
        store.create_hold(&comp.id, "other", 7, ttl()).unwrap();
        let old = store.create_hold(&comp.id, "session-1", 3, ttl()).unwrap();

        // Asking for more than fits: the old hold is gone anyway.
        let result = store.create_hold(&comp.id, "session-1", 5, ttl());
        assert!(matches!(
            result,
            Err(StoreError::InsufficientCapacity { .. })
        ));

        let released = store.get_hold(&old.id).unwrap().unwrap();
        assert_eq!(released.state, HoldState::Released);
        assert_eq!(store.snapshot(&comp.id).unwrap().held, 7);
    }

    #[test]
    fn test_holds_on_different_sessions_coexist() {
        let store = create_test_store();
        let comp = open_competition(&store, 10, None);

        store.create_hold(&comp.id, "session-1", 3, ttl()).unwrap();
        store.create_hold(&comp.id, "session-2", 3, ttl()).unwrap();
        assert_eq!(store.snapshot(&comp.id).unwrap().held, 6);
    }

    #[test]
    fn test_create_hold_on_closed_competition() {
        let store = create_test_store();
        let comp = open_competition(&store, 10, None);
        store.close_competition(&comp.id, Utc::now()).unwrap();

        let result = store.create_hold(&comp.id, "session-1", 1, ttl());
        assert!(matches!(result, Err(StoreError::CompetitionClosed(_))));
    }

    #[test]
    fn test_renew_hold_extends_from_now() {
        let store = create_test_store();
        let comp = open_competition(&store, 10, None);

        let hold = store
            .create_hold(&comp.id, "session-1", 2, Duration::seconds(30))
            .unwrap();
        let renewed = store.renew_hold(&hold.id, Duration::minutes(10)).unwrap();
        assert!(renewed.expires_at > hold.expires_at);
    }

    #[test]
    fn test_renew_expired_hold_fails_and_releases() {
        let store = create_test_store();
        let comp = open_competition(&store, 10, None);

        let hold = store
            .create_hold(&comp.id, "session-1", 2, Duration::seconds(-1))
            .unwrap();

        let result = store.renew_hold(&hold.id, ttl());
        assert!(matches!(result, Err(StoreError::HoldExpired(_))));

        // The lazy expiry released the capacity.
        assert_eq!(store.snapshot(&comp.id).unwrap().held, 0);
        let expired = store.get_hold(&hold.id).unwrap().unwrap();
        assert_eq!(expired.state, HoldState::Expired);
    }

    #[test]
    fn test_renew_missing_hold() {
        let store = create_test_store();
        assert!(matches!(
            store.renew_hold("nope", ttl()),
            Err(StoreError::HoldNotFound(_))
        ));
    }

    #[test]
    fn test_release_hold_returns_capacity_exactly_once() {
        let store = create_test_store();
        let comp = open_competition(&store, 5, None);

        let hold = store.create_hold(&comp.id, "session-1", 5, ttl()).unwrap();
        store.release_hold(&hold.id).unwrap();
        // Second release is a no-op, not a double decrement.
        store.release_hold(&hold.id).unwrap();

        let snap = store.snapshot(&comp.id).unwrap();
        assert_eq!(snap.held, 0);
    }

    #[test]
    fn test_release_races_sweep_exactly_once() {
        let store = create_test_store();
        let comp = open_competition(&store, 5, None);

        let hold = store
            .create_hold(&comp.id, "session-1", 5, Duration::seconds(-1))
            .unwrap();

        // Sweep first, then an explicit release of the same hold.
        let expired = store.expire_due_holds(Utc::now()).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, hold.id);

        store.release_hold(&hold.id).unwrap();
        assert_eq!(store.snapshot(&comp.id).unwrap().held, 0);
    }

    #[test]
    fn test_expire_due_holds_leaves_live_holds() {
        let store = create_test_store();
        let comp = open_competition(&store, 10, None);

        store
            .create_hold(&comp.id, "doomed", 3, Duration::seconds(-1))
            .unwrap();
        let live = store.create_hold(&comp.id, "alive", 2, ttl()).unwrap();

        let expired = store.expire_due_holds(Utc::now()).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].session_id, "doomed");

        assert_eq!(store.snapshot(&comp.id).unwrap().held, 2);
        let still_live = store.get_hold(&live.id).unwrap().unwrap();
        assert_eq!(still_live.state, HoldState::Active);
    }

    #[test]
    fn test_settle_purchase_assigns_contiguous_tickets() {
        let store = create_test_store();
        let comp = open_competition(&store, 10, None);

        let h1 = store.create_hold(&comp.id, "s1", 3, ttl()).unwrap();
        let e1 = store.settle_purchase(&h1.id, "alice", "pay-1").unwrap();
        assert_eq!(e1.ticket_numbers(), vec![1, 2, 3]);

        let h2 = store.create_hold(&comp.id, "s2", 2, ttl()).unwrap();
        let e2 = store.settle_purchase(&h2.id, "bob", "pay-2").unwrap();
        assert_eq!(e2.ticket_numbers(), vec![4, 5]);

        let snap = store.snapshot(&comp.id).unwrap();
        assert_eq!(snap.sold, 5);
        assert_eq!(snap.held, 0);
        assert_eq!(store.sold_ticket_numbers(&comp.id).unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_settle_consumes_hold() {
        let store = create_test_store();
        let comp = open_competition(&store, 10, None);

        let hold = store.create_hold(&comp.id, "s1", 2, ttl()).unwrap();
        store.settle_purchase(&hold.id, "alice", "pay-1").unwrap();

        let consumed = store.get_hold(&hold.id).unwrap().unwrap();
        assert_eq!(consumed.state, HoldState::Consumed);

        // Single-use: a second settle fails without touching the ledger.
        let result = store.settle_purchase(&hold.id, "alice", "pay-1b");
        assert!(matches!(result, Err(StoreError::AlreadyConsumed(_))));
        assert_eq!(store.snapshot(&comp.id).unwrap().sold, 2);
    }

    #[test]
    fn test_settle_expired_hold_fails() {
        let store = create_test_store();
        let comp = open_competition(&store, 10, None);

        let hold = store
            .create_hold(&comp.id, "s1", 2, Duration::seconds(-1))
            .unwrap();
        let result = store.settle_purchase(&hold.id, "alice", "pay-1");
        assert!(matches!(result, Err(StoreError::HoldExpired(_))));
        assert_eq!(store.snapshot(&comp.id).unwrap().sold, 0);
    }

    #[test]
    fn test_close_below_threshold_refunds_entries() {
        let store = create_test_store();
        let comp = open_competition(&store, 100, Some(50));

        let hold = store.create_hold(&comp.id, "s1", 40, ttl()).unwrap();
        store.settle_purchase(&hold.id, "alice", "pay-1").unwrap();

        let outcome = store.close_competition(&comp.id, Utc::now()).unwrap();
        let entries = match outcome {
            Closeout::Refunded { entries } => entries,
            other => panic!("expected Refunded, got {:?}", other),
        };
        assert_eq!(entries.len(), 1);
        assert!(entries[0].refunded);

        let closed = store.get_competition(&comp.id).unwrap().unwrap();
        assert_eq!(closed.status, CompetitionStatus::ClosedRefunded);
    }

    #[test]
    fn test_close_at_threshold_settles() {
        let store = create_test_store();
        let comp = open_competition(&store, 100, Some(50));

        let hold = store.create_hold(&comp.id, "s1", 60, ttl()).unwrap();
        store.settle_purchase(&hold.id, "alice", "pay-1").unwrap();

        let outcome = store.close_competition(&comp.id, Utc::now()).unwrap();
        assert!(matches!(outcome, Closeout::Settled { sold: 60 }));

        let closed = store.get_competition(&comp.id).unwrap().unwrap();
        assert_eq!(closed.status, CompetitionStatus::ClosedSettled);
    }

    #[test]
    fn test_close_force_releases_live_holds() {
        let store = create_test_store();
        let comp = open_competition(&store, 100, Some(50));

        let settled = store.create_hold(&comp.id, "s1", 60, ttl()).unwrap();
        store.settle_purchase(&settled.id, "alice", "pay-1").unwrap();

        // An unpurchased hold is still live at close time.
        let dangling = store.create_hold(&comp.id, "s2", 10, ttl()).unwrap();

        let outcome = store.close_competition(&comp.id, Utc::now()).unwrap();
        assert!(matches!(outcome, Closeout::Settled { sold: 60 }));

        let released = store.get_hold(&dangling.id).unwrap().unwrap();
        assert_eq!(released.state, HoldState::Released);
        assert_eq!(store.snapshot(&comp.id).unwrap().held, 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let store = create_test_store();
        let comp = open_competition(&store, 10, None);

        let first = store.close_competition(&comp.id, Utc::now()).unwrap();
        assert!(matches!(first, Closeout::Settled { .. }));

        let second = store.close_competition(&comp.id, Utc::now()).unwrap();
        assert!(matches!(
            second,
            Closeout::AlreadyClosed {
                status: CompetitionStatus::ClosedSettled
            }
        ));
    }

    #[test]
    fn test_no_sales_after_refund() {
        let store = create_test_store();
        let comp = open_competition(&store, 100, Some(50));
        store.close_competition(&comp.id, Utc::now()).unwrap();

        assert!(matches!(
            store.create_hold(&comp.id, "late", 1, ttl()),
            Err(StoreError::CompetitionClosed(_))
        ));
    }

    #[test]
    fn test_record_draw_requires_settled() {
        let store = create_test_store();
        let comp = open_competition(&store, 10, None);

        let result = store.record_draw(&comp.id, "seed", "sha256-mod-v1", &[1], Utc::now());
        assert!(matches!(result, Err(StoreError::NotSettled { .. })));
    }

    #[test]
    fn test_record_draw_single_shot() {
        let store = create_test_store();
        let comp = open_competition(&store, 10, None);

        let hold = store.create_hold(&comp.id, "s1", 3, ttl()).unwrap();
        store.settle_purchase(&hold.id, "alice", "pay-1").unwrap();
        store.close_competition(&comp.id, Utc::now()).unwrap();

        let record = store
            .record_draw(&comp.id, "seed", "sha256-mod-v1", &[2], Utc::now())
            .unwrap();
        assert_eq!(record.winning_tickets, vec![2]);

        let second = store.record_draw(&comp.id, "seed2", "sha256-mod-v1", &[3], Utc::now());
        assert!(matches!(second, Err(StoreError::AlreadyDrawn(_))));

        // The first draw stands.
        let stored = store.get_draw(&comp.id).unwrap().unwrap();
        assert_eq!(stored.seed, "seed");
        let comp = store.get_competition(&comp.id).unwrap().unwrap();
        assert_eq!(comp.winning_tickets, vec![2]);
    }

    #[test]
    fn test_state_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("tombola.db");

        let comp_id = {
            let store = SqliteRaffleStore::new(&db_path).unwrap();
            let comp = store
                .create_competition(NewCompetition {
                    name: "durable".to_string(),
                    total_tickets: 10,
                    min_tickets: None,
                    ticket_price_cents: 100,
                    prize_count: 1,
                    closes_at: Utc::now() + Duration::hours(1),
                })
                .unwrap();
            let hold = store.create_hold(&comp.id, "s1", 3, ttl()).unwrap();
            store.settle_purchase(&hold.id, "alice", "pay-1").unwrap();
            comp.id
        };

        // A fresh store over the same file sees identical state.
        let reopened = SqliteRaffleStore::new(&db_path).unwrap();
        let snap = reopened.snapshot(&comp_id).unwrap();
        assert_eq!(snap.sold, 3);
        assert_eq!(snap.held, 0);
        assert_eq!(reopened.sold_ticket_numbers(&comp_id).unwrap(), vec![1, 2, 3]);
    }
}
