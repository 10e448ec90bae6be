//! Checkout hold management.
//!
//! A hold reserves capacity from the ledger for a bounded time while a
//! session checks out. Expiry is enforced lazily on every store read and by
//! [`HoldSweeper`] in the background, so a hold can never stay counted in
//! `held` indefinitely.

mod sweeper;

pub use sweeper::HoldSweeper;

use std::sync::Arc;

use chrono::Duration;

use crate::audit::{AuditEvent, AuditHandle};
use crate::config::HoldConfig;
use crate::metrics;
use crate::store::{Hold, RaffleStore, StoreError};

/// Creates, renews, and releases checkout holds.
pub struct HoldManager {
    store: Arc<dyn RaffleStore>,
    config: HoldConfig,
    audit: Option<AuditHandle>,
}

impl HoldManager {
    pub fn new(store: Arc<dyn RaffleStore>, config: HoldConfig) -> Self {
        Self {
            store,
            config,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    fn ttl(&self) -> Duration {
        Duration::seconds(self.config.ttl_secs as i64)
    }

    /// Create a hold for `quantity` tickets on a competition.
    ///
    /// Supersedes any live hold the session already has on the same
    /// competition; see [`RaffleStore::create_hold`] for the atomicity
    /// contract.
    pub async fn create_hold(
        &self,
        competition_id: &str,
        session_id: &str,
        quantity: u32,
    ) -> Result<Hold, StoreError> {
        let hold = self
            .store
            .create_hold(competition_id, session_id, quantity, self.ttl())?;

        metrics::HOLDS_CREATED.inc();
        metrics::HOLD_QUANTITY
            .with_label_values(&[])
            .observe(quantity as f64);

        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::HoldCreated {
                    hold_id: hold.id.clone(),
                    competition_id: hold.competition_id.clone(),
                    session_id: hold.session_id.clone(),
                    quantity: hold.quantity,
                    expires_at: hold.expires_at,
                })
                .await;
        }

        tracing::debug!(
            "Created hold {} ({} tickets) on competition {}",
            hold.id,
            hold.quantity,
            hold.competition_id
        );
        Ok(hold)
    }

    /// Extend a hold's deadline to now + TTL.
    pub async fn renew_hold(&self, hold_id: &str) -> Result<Hold, StoreError> {
        let hold = self.store.renew_hold(hold_id, self.ttl())?;

        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::HoldRenewed {
                    hold_id: hold.id.clone(),
                    competition_id: hold.competition_id.clone(),
                    expires_at: hold.expires_at,
                })
                .await;
        }

        Ok(hold)
    }

    /// Release a hold, returning its capacity to the pool.
    pub async fn release_hold(&self, hold_id: &str) -> Result<(), StoreError> {
        let hold = self
            .store
            .get_hold(hold_id)?
            .ok_or_else(|| StoreError::HoldNotFound(hold_id.to_string()))?;

        self.store.release_hold(hold_id)?;

        metrics::HOLDS_ENDED.with_label_values(&["released"]).inc();

        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::HoldReleased {
                    hold_id: hold.id.clone(),
                    competition_id: hold.competition_id.clone(),
                    quantity: hold.quantity,
                })
                .await;
        }

        Ok(())
    }

    /// Get a hold by ID.
    pub fn get_hold(&self, hold_id: &str) -> Result<Option<Hold>, StoreError> {
        self.store.get_hold(hold_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{HoldState, NewCompetition, SqliteRaffleStore};
    use chrono::Utc;

    fn manager() -> (HoldManager, Arc<SqliteRaffleStore>, String) {
        let store = Arc::new(SqliteRaffleStore::in_memory().unwrap());
        let comp = store
            .create_competition(NewCompetition {
                name: "test".to_string(),
                total_tickets: 10,
                min_tickets: None,
                ticket_price_cents: 100,
                prize_count: 1,
                closes_at: Utc::now() + Duration::hours(1),
            })
            .unwrap();
        let manager = HoldManager::new(
            Arc::clone(&store) as Arc<dyn RaffleStore>,
            HoldConfig::default(),
        );
        (manager, store, comp.id)
    }

    #[tokio::test]
    async fn test_create_and_release() {
        let (manager, store, comp_id) = manager();

        let hold = manager.create_hold(&comp_id, "s-1", 4).await.unwrap();
        assert_eq!(store.snapshot(&comp_id).unwrap().held, 4);

        manager.release_hold(&hold.id).await.unwrap();
        assert_eq!(store.snapshot(&comp_id).unwrap().held, 0);
    }

    #[tokio::test]
    async fn test_hold_uses_configured_ttl() {
        let store = Arc::new(SqliteRaffleStore::in_memory().unwrap());
        let comp = store
            .create_competition(NewCompetition {
                name: "test".to_string(),
                total_tickets: 10,
                min_tickets: None,
                ticket_price_cents: 100,
                prize_count: 1,
                closes_at: Utc::now() + Duration::hours(1),
            })
            .unwrap();
        let manager = HoldManager::new(
            Arc::clone(&store) as Arc<dyn RaffleStore>,
            HoldConfig {
                ttl_secs: 120,
                sweep_interval_secs: 30,
            },
        );

        let hold = manager.create_hold(&comp.id, "s-1", 1).await.unwrap();
        let lifetime = hold.expires_at - hold.created_at;
        assert_eq!(lifetime.num_seconds(), 120);
    }

    #[tokio::test]
    async fn test_renew_extends_deadline() {
        let (manager, _store, comp_id) = manager();

        let hold = manager.create_hold(&comp_id, "s-1", 1).await.unwrap();
        let renewed = manager.renew_hold(&hold.id).await.unwrap();
        assert!(renewed.expires_at >= hold.expires_at);
        assert_eq!(renewed.state, HoldState::Active);
    }

    #[tokio::test]
    async fn test_release_unknown_hold() {
        let (manager, _store, _comp_id) = manager();
        let result = manager.release_hold("missing").await;
        assert!(matches!(result, Err(StoreError::HoldNotFound(_))));
    }
}
