//! Verifiable random draw.

mod select;

pub use select::{select_winners, DRAW_ALGORITHM};

use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::audit::{AuditEvent, AuditHandle};
use crate::metrics;
use crate::store::{CompetitionStatus, DrawRecord, RaffleStore, StoreError};

/// Selects winning tickets for settled competitions and records the proof
/// material.
pub struct DrawEngine {
    store: Arc<dyn RaffleStore>,
    audit: Option<AuditHandle>,
}

impl DrawEngine {
    pub fn new(store: Arc<dyn RaffleStore>) -> Self {
        Self { store, audit: None }
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Draw the winners for a settled competition.
    ///
    /// `seed` is verifiable external material (e.g. a published block hash)
    /// when supplied; otherwise a seed is generated locally. Either way it
    /// is recorded and disclosed in the draw record, together with the
    /// algorithm tag, so the result can be recomputed by anyone.
    ///
    /// Single-shot per competition: a second call fails with
    /// [`StoreError::AlreadyDrawn`] and does not mutate state.
    pub async fn draw(
        &self,
        competition_id: &str,
        seed: Option<String>,
    ) -> Result<DrawRecord, StoreError> {
        let competition = self
            .store
            .get_competition(competition_id)?
            .ok_or_else(|| StoreError::NotFound(competition_id.to_string()))?;

        if competition.status != CompetitionStatus::ClosedSettled {
            return Err(StoreError::NotSettled {
                id: competition_id.to_string(),
                status: competition.status.as_str().to_string(),
            });
        }
        if self.store.get_draw(competition_id)?.is_some() {
            return Err(StoreError::AlreadyDrawn(competition_id.to_string()));
        }

        let tickets = self.store.sold_ticket_numbers(competition_id)?;
        let seed = seed.unwrap_or_else(generate_seed);
        let winners = select_winners(&seed, &tickets, competition.prize_count);

        // record_draw re-checks settled/undrawn inside its transaction, so
        // two concurrent draw triggers cannot both commit.
        let record = self.store.record_draw(
            competition_id,
            &seed,
            DRAW_ALGORITHM,
            &winners,
            Utc::now(),
        )?;

        metrics::DRAWS_COMPLETED.inc();
        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::WinnersDrawn {
                    competition_id: record.competition_id.clone(),
                    seed: record.seed.clone(),
                    algorithm: record.algorithm.clone(),
                    winning_tickets: record.winning_tickets.clone(),
                })
                .await;
        }

        tracing::info!(
            "Drew winners {:?} for competition {} (seed disclosed in draw record)",
            record.winning_tickets,
            competition_id
        );
        Ok(record)
    }
}

/// Generate seed material locally when none was supplied externally.
///
/// The value itself carries no secret: its only job is to be fixed and
/// disclosed before winners are derived from it.
fn generate_seed() -> String {
    let mut hasher = Sha256::new();
    hasher.update(uuid::Uuid::new_v4().as_bytes());
    hasher.update(uuid::Uuid::new_v4().as_bytes());
    format!("{:x}", hasher.finalize())
}
