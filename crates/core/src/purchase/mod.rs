//! Purchase coordination.
//!
//! The checkout flow is an explicit two-phase protocol: a Hold (phase 1,
//! reversible) becomes an Entry (phase 2, irreversible) only here. Payment
//! confirmation happens strictly BEFORE the atomic settle, never while the
//! store's serialization point is held.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditHandle};
use crate::metrics;
use crate::payment::{ChargeRequest, PaymentConfirmation, PaymentError, PaymentProvider};
use crate::store::{Entry, HoldState, RaffleStore, StoreError};

/// Errors that can occur completing a purchase.
#[derive(Debug, Error)]
pub enum PurchaseError {
    /// The gateway declined the charge. The hold was released so the
    /// session can retry.
    #[error("payment declined: {}", reason.as_deref().unwrap_or("no reason given"))]
    PaymentDeclined { reason: Option<String> },

    /// No payment provider is configured, so charges cannot be initiated.
    /// Gateway-callback settlement still works.
    #[error("no payment provider configured")]
    NoProvider,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Payment(#[from] PaymentError),
}

/// Converts holds plus payment confirmations into permanent entries.
/// The only writer of final sales.
pub struct PurchaseCoordinator {
    store: Arc<dyn RaffleStore>,
    payment: Option<Arc<dyn PaymentProvider>>,
    audit: Option<AuditHandle>,
}

impl PurchaseCoordinator {
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

    /// Drive the full purchase flow for a hold: charge the session's payment
    /// through the configured provider, then settle on success or release
    /// the hold on decline.
    ///
    /// A transport failure (gateway unreachable) leaves the hold live so the
    /// session can retry before the TTL lapses.
    pub async fn purchase(&self, hold_id: &str, user_id: &str) -> Result<Entry, PurchaseError> {
        let payment = self.payment.as_ref().ok_or(PurchaseError::NoProvider)?;

        let hold = self
            .store
            .get_hold(hold_id)?
            .ok_or_else(|| StoreError::HoldNotFound(hold_id.to_string()))?;

        match hold.state {
            HoldState::Active => {}
            HoldState::Consumed => {
                return Err(StoreError::AlreadyConsumed(hold_id.to_string()).into())
            }
            HoldState::Released | HoldState::Expired => {
                return Err(StoreError::HoldExpired(hold_id.to_string()).into())
            }
        }

        // Never charge against a lapsed hold the sweep has not caught yet;
        // the settle would refuse it after the money moved.
        if hold.is_overdue(Utc::now()) {
            self.store.release_hold(&hold.id)?;
            return Err(StoreError::HoldExpired(hold_id.to_string()).into());
        }

        let competition = self
            .store
            .get_competition(&hold.competition_id)?
            .ok_or_else(|| StoreError::NotFound(hold.competition_id.clone()))?;

        let request = ChargeRequest {
            reference: Uuid::new_v4().to_string(),
            amount_cents: competition.ticket_price_cents * hold.quantity as u64,
        };

        // No store lock is held across this await.
        let confirmation = payment.charge(&request).await?;

        self.complete_purchase(hold_id, user_id, confirmation).await
    }

    /// Settle a hold given a payment confirmation (gateway callback style).
    ///
    /// On a failed confirmation the hold is released (not consumed), so
    /// its capacity returns to the pool and the session may retry. On
    /// success the settle is one atomic unit: ticket assignment, ledger
    /// promotion, entry insert, and hold consumption commit together.
    pub async fn complete_purchase(
        &self,
        hold_id: &str,
        user_id: &str,
        confirmation: PaymentConfirmation,
    ) -> Result<Entry, PurchaseError> {
        if !confirmation.approved {
            let hold = self.store.get_hold(hold_id)?;
            self.store.release_hold(hold_id)?;

            metrics::PURCHASES.with_label_values(&["declined"]).inc();
            if let (Some(audit), Some(hold)) = (&self.audit, hold) {
                audit
                    .emit(AuditEvent::PaymentDeclined {
                        hold_id: hold.id,
                        competition_id: hold.competition_id,
                        reason: confirmation.declined_reason.clone(),
                    })
                    .await;
            }

            return Err(PurchaseError::PaymentDeclined {
                reason: confirmation.declined_reason,
            });
        }

        let entry = match self
            .store
            .settle_purchase(hold_id, user_id, &confirmation.reference)
        {
            Ok(entry) => entry,
            Err(e @ StoreError::HoldExpired(_)) => {
                metrics::PURCHASES.with_label_values(&["expired"]).inc();
                return Err(e.into());
            }
            Err(e) => {
                metrics::PURCHASES.with_label_values(&["failed"]).inc();
                return Err(e.into());
            }
        };

        metrics::PURCHASES.with_label_values(&["settled"]).inc();
        metrics::TICKETS_SOLD.inc_by(entry.quantity as u64);
        metrics::HOLDS_ENDED.with_label_values(&["consumed"]).inc();

        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::EntryRecorded {
                    entry_id: entry.id.clone(),
                    competition_id: entry.competition_id.clone(),
                    user_id: entry.user_id.clone(),
                    first_ticket: entry.first_ticket,
                    quantity: entry.quantity,
                    payment_ref: entry.payment_ref.clone(),
                })
                .await;
        }

        tracing::info!(
            "Settled entry {} (tickets {}-{}) on competition {}",
            entry.id,
            entry.first_ticket,
            entry.first_ticket + entry.quantity - 1,
            entry.competition_id
        );
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewCompetition, SqliteRaffleStore};
    use crate::testing::MockPaymentProvider;
    use chrono::{Duration, Utc};

    struct Setup {
        coordinator: PurchaseCoordinator,
        store: Arc<SqliteRaffleStore>,
        payment: Arc<MockPaymentProvider>,
        competition_id: String,
    }

    fn setup() -> Setup {
        let store = Arc::new(SqliteRaffleStore::in_memory().unwrap());
        let payment = Arc::new(MockPaymentProvider::new());
        let comp = store
            .create_competition(NewCompetition {
                name: "test".to_string(),
                total_tickets: 10,
                min_tickets: None,
                ticket_price_cents: 250,
                prize_count: 1,
                closes_at: Utc::now() + Duration::hours(1),
            })
            .unwrap();

        let coordinator = PurchaseCoordinator::new(Arc::clone(&store) as Arc<dyn RaffleStore>)
            .with_payment_provider(Arc::clone(&payment) as Arc<dyn PaymentProvider>);

        Setup {
            coordinator,
            store,
            payment,
            competition_id: comp.id,
        }
    }

    #[tokio::test]
    async fn test_purchase_settles_hold() {
        let s = setup();
        let hold = s
            .store
            .create_hold(&s.competition_id, "s-1", 3, Duration::minutes(10))
            .unwrap();

        let entry = s.coordinator.purchase(&hold.id, "alice").await.unwrap();
        assert_eq!(entry.ticket_numbers(), vec![1, 2, 3]);

        // Charged price * quantity.
        let charges = s.payment.charges();
        assert_eq!(charges.len(), 1);
        assert_eq!(charges[0].amount_cents, 750);

        let snap = s.store.snapshot(&s.competition_id).unwrap();
        assert_eq!(snap.sold, 3);
        assert_eq!(snap.held, 0);
    }

    #[tokio::test]
    async fn test_declined_payment_releases_hold() {
        let s = setup();
        s.payment.decline_with("card declined");

        let hold = s
            .store
            .create_hold(&s.competition_id, "s-1", 3, Duration::minutes(10))
            .unwrap();

        let result = s.coordinator.purchase(&hold.id, "alice").await;
        assert!(matches!(
            result,
            Err(PurchaseError::PaymentDeclined { .. })
        ));

        // Capacity returned to the pool; the session may retry.
        let snap = s.store.snapshot(&s.competition_id).unwrap();
        assert_eq!(snap.held, 0);
        assert_eq!(snap.sold, 0);
    }

    #[tokio::test]
    async fn test_purchase_expired_hold_fails() {
        let s = setup();
        let hold = s
            .store
            .create_hold(&s.competition_id, "s-1", 2, Duration::seconds(-1))
            .unwrap();

        let result = s.coordinator.purchase(&hold.id, "alice").await;
        assert!(matches!(
            result,
            Err(PurchaseError::Store(StoreError::HoldExpired(_)))
        ));
        // No charge was attempted for a dead hold.
        assert!(s.payment.charges().is_empty());
    }

    #[tokio::test]
    async fn test_complete_purchase_without_provider() {
        let s = setup();
        let coordinator = PurchaseCoordinator::new(Arc::clone(&s.store) as Arc<dyn RaffleStore>);

        let hold = s
            .store
            .create_hold(&s.competition_id, "s-1", 1, Duration::minutes(10))
            .unwrap();

        // Callback-style settlement needs no provider.
        let entry = coordinator
            .complete_purchase(&hold.id, "alice", PaymentConfirmation::approved("pay-1"))
            .await
            .unwrap();
        assert_eq!(entry.payment_ref, "pay-1");

        // But initiating a charge does.
        let hold2 = s
            .store
            .create_hold(&s.competition_id, "s-2", 1, Duration::minutes(10))
            .unwrap();
        let result = coordinator.purchase(&hold2.id, "bob").await;
        assert!(matches!(result, Err(PurchaseError::NoProvider)));
    }

    #[tokio::test]
    async fn test_hold_is_single_use() {
        let s = setup();
        let hold = s
            .store
            .create_hold(&s.competition_id, "s-1", 1, Duration::minutes(10))
            .unwrap();

        s.coordinator.purchase(&hold.id, "alice").await.unwrap();
        let again = s.coordinator.purchase(&hold.id, "alice").await;
        assert!(matches!(
            again,
            Err(PurchaseError::Store(StoreError::AlreadyConsumed(_)))
        ));
    }
}
