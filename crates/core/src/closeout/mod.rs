//! Close-time threshold evaluation and refunds.
//!
//! Invoked by the external scheduler at or after a competition's close
//! time. Idempotent: duplicate triggers (a scheduler firing twice, or a
//! concurrent close and draw) are safe.

use std::sync::Arc;

use chrono::Utc;

use crate::audit::{AuditEvent, AuditHandle};
use crate::metrics;
use crate::payment::{PaymentProvider, RefundInstruction};
use crate::store::{Closeout, CompetitionStatus, RaffleStore, StoreError};

/// Result of a close-time evaluation, for reporting to the caller.
#[derive(Debug, Clone)]
pub struct CloseReport {
    pub competition_id: String,
    pub status: CompetitionStatus,
    pub sold: u32,
    /// Refund instructions emitted by this invocation (0 on re-invocation).
    pub refund_instructions: usize,
    /// True if the competition was already closed and nothing changed.
    pub already_closed: bool,
}

/// Evaluates the minimum-sold threshold at close and emits refund
/// instructions when it was missed.
pub struct CloseoutCoordinator {
    store: Arc<dyn RaffleStore>,
    payment: Option<Arc<dyn PaymentProvider>>,
    audit: Option<AuditHandle>,
}

impl CloseoutCoordinator {
    pub fn new(store: Arc<dyn RaffleStore>) -> Self {
        Self {
            store,
            payment: None,
            audit: None,
        }
    }

    pub fn with_payment_provider(mut self, payment: Arc<dyn PaymentProvider>) -> Self {
        self.payment = Some(payment);
        self
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Close a competition: force-release live holds, then settle or refund
    /// based on the final sold count.
    ///
    /// When the threshold was missed, exactly one refund instruction is
    /// emitted per entry. A gateway failure on one instruction is logged
    /// and does not stop the rest; the audit trail records what was issued.
    pub async fn close(&self, competition_id: &str) -> Result<CloseReport, StoreError> {
        let outcome = self.store.close_competition(competition_id, Utc::now())?;

        match outcome {
            Closeout::AlreadyClosed { status } => {
                tracing::info!(
                    "Close re-invoked on competition {} (already {})",
                    competition_id,
                    status.as_str()
                );
                let snapshot = self.store.snapshot(competition_id)?;
                Ok(CloseReport {
                    competition_id: competition_id.to_string(),
                    status,
                    sold: snapshot.sold,
                    refund_instructions: 0,
                    already_closed: true,
                })
            }

            Closeout::Settled { sold } => {
                metrics::CLOSEOUTS.with_label_values(&["settled"]).inc();
                if let Some(ref audit) = self.audit {
                    audit
                        .emit(AuditEvent::CompetitionSettled {
                            competition_id: competition_id.to_string(),
                            sold,
                        })
                        .await;
                }
                tracing::info!(
                    "Competition {} settled with {} tickets sold",
                    competition_id,
                    sold
                );
                Ok(CloseReport {
                    competition_id: competition_id.to_string(),
                    status: CompetitionStatus::ClosedSettled,
                    sold,
                    refund_instructions: 0,
                    already_closed: false,
                })
            }

            Closeout::Refunded { entries } => {
                let competition = self
                    .store
                    .get_competition(competition_id)?
                    .ok_or_else(|| StoreError::NotFound(competition_id.to_string()))?;

                let sold: u32 = entries.iter().map(|e| e.quantity).sum();
                let mut issued = 0;

                for entry in &entries {
                    let instruction = RefundInstruction {
                        entry_id: entry.id.clone(),
                        competition_id: entry.competition_id.clone(),
                        payment_ref: entry.payment_ref.clone(),
                        amount_cents: competition.ticket_price_cents * entry.quantity as u64,
                    };

                    if let Some(ref payment) = self.payment {
                        if let Err(e) = payment.refund(&instruction).await {
                            tracing::warn!(
                                "Refund instruction for entry {} failed at gateway: {}",
                                entry.id,
                                e
                            );
                        }
                    }

                    metrics::REFUNDS_ISSUED.inc();
                    issued += 1;

                    if let Some(ref audit) = self.audit {
                        audit
                            .emit(AuditEvent::RefundIssued {
                                entry_id: instruction.entry_id.clone(),
                                competition_id: instruction.competition_id.clone(),
                                payment_ref: instruction.payment_ref.clone(),
                                amount_cents: instruction.amount_cents,
                            })
                            .await;
                    }
                }

                metrics::CLOSEOUTS.with_label_values(&["refunded"]).inc();
                if let Some(ref audit) = self.audit {
                    audit
                        .emit(AuditEvent::CompetitionRefunded {
                            competition_id: competition_id.to_string(),
                            sold,
                            min_tickets: competition.min_tickets.unwrap_or(0),
                            refund_count: issued,
                        })
                        .await;
                }

                tracing::info!(
                    "Competition {} refunded: {} sold below threshold {:?}, {} refund instructions",
                    competition_id,
                    sold,
                    competition.min_tickets,
                    issued
                );
                Ok(CloseReport {
                    competition_id: competition_id.to_string(),
                    status: CompetitionStatus::ClosedRefunded,
                    sold,
                    refund_instructions: issued,
                    already_closed: false,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewCompetition, SqliteRaffleStore};
    use crate::testing::MockPaymentProvider;
    use chrono::Duration;

    struct Setup {
        coordinator: CloseoutCoordinator,
        store: Arc<SqliteRaffleStore>,
        payment: Arc<MockPaymentProvider>,
    }

    fn setup() -> Setup {
        let store = Arc::new(SqliteRaffleStore::in_memory().unwrap());
        let payment = Arc::new(MockPaymentProvider::new());
        let coordinator = CloseoutCoordinator::new(Arc::clone(&store) as Arc<dyn RaffleStore>)
            .with_payment_provider(Arc::clone(&payment) as Arc<dyn PaymentProvider>);
        Setup {
            coordinator,
            store,
            payment,
        }
    }

    fn competition(store: &SqliteRaffleStore, total: u32, min: Option<u32>) -> String {
        store
            .create_competition(NewCompetition {
                name: "test".to_string(),
                total_tickets: total,
                min_tickets: min,
                ticket_price_cents: 100,
                prize_count: 1,
                closes_at: Utc::now() + Duration::hours(1),
            })
            .unwrap()
            .id
    }

    fn sell(store: &SqliteRaffleStore, comp_id: &str, session: &str, qty: u32) {
        let hold = store
            .create_hold(comp_id, session, qty, Duration::minutes(10))
            .unwrap();
        store
            .settle_purchase(&hold.id, session, &format!("pay-{}", session))
            .unwrap();
    }

    #[tokio::test]
    async fn test_threshold_missed_issues_one_refund_per_entry() {
        let s = setup();
        let comp_id = competition(&s.store, 100, Some(50));
        sell(&s.store, &comp_id, "alice", 25);
        sell(&s.store, &comp_id, "bob", 15);

        let report = s.coordinator.close(&comp_id).await.unwrap();
        assert_eq!(report.status, CompetitionStatus::ClosedRefunded);
        assert_eq!(report.sold, 40);
        assert_eq!(report.refund_instructions, 2);

        let refunds = s.payment.refunds();
        assert_eq!(refunds.len(), 2);
        assert_eq!(refunds[0].amount_cents, 2500);
        assert_eq!(refunds[1].amount_cents, 1500);
    }

    #[tokio::test]
    async fn test_threshold_met_settles() {
        let s = setup();
        let comp_id = competition(&s.store, 100, Some(50));
        sell(&s.store, &comp_id, "alice", 60);

        let report = s.coordinator.close(&comp_id).await.unwrap();
        assert_eq!(report.status, CompetitionStatus::ClosedSettled);
        assert_eq!(report.sold, 60);
        assert_eq!(report.refund_instructions, 0);
        assert!(s.payment.refunds().is_empty());
    }

    #[tokio::test]
    async fn test_reclose_is_noop() {
        let s = setup();
        let comp_id = competition(&s.store, 100, Some(50));
        sell(&s.store, &comp_id, "alice", 40);

        let first = s.coordinator.close(&comp_id).await.unwrap();
        assert_eq!(first.refund_instructions, 1);

        // A duplicate scheduler trigger must not refund twice.
        let second = s.coordinator.close(&comp_id).await.unwrap();
        assert!(second.already_closed);
        assert_eq!(second.refund_instructions, 0);
        assert_eq!(s.payment.refunds().len(), 1);
    }

    #[tokio::test]
    async fn test_close_unknown_competition() {
        let s = setup();
        let result = s.coordinator.close("missing").await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }
}
