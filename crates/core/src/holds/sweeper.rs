//! Background hold expiry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditHandle};
use crate::metrics;
use crate::store::RaffleStore;

/// Periodically expires holds whose deadline has passed.
///
/// The sweep is best-effort and low priority: every store read path also
/// expires lazily, so correctness never depends on the sweep's timing. It
/// exists to guarantee eventual release of capacity no one is reading.
pub struct HoldSweeper {
    store: Arc<dyn RaffleStore>,
    interval: Duration,
    audit: Option<AuditHandle>,

    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl HoldSweeper {
    pub fn new(store: Arc<dyn RaffleStore>, sweep_interval_secs: u64) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            store,
            interval: Duration::from_secs(sweep_interval_secs),
            audit: None,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Start the sweeper (spawns the background task).
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Hold sweeper already running");
            return;
        }

        info!("Starting hold sweeper (interval: {:?})", self.interval);

        let store = Arc::clone(&self.store);
        let running = Arc::clone(&self.running);
        let audit = self.audit.clone();
        let interval = self.interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Hold sweeper started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Hold sweeper received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        Self::sweep_once(&store, &audit).await;
                    }
                }
            }
            info!("Hold sweeper stopped");
        });
    }

    /// Stop the sweeper.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(());
    }

    /// One sweep pass: expire every overdue hold.
    async fn sweep_once(store: &Arc<dyn RaffleStore>, audit: &Option<AuditHandle>) {
        match store.expire_due_holds(Utc::now()) {
            Ok(expired) => {
                if expired.is_empty() {
                    return;
                }
                debug!("Sweep expired {} holds", expired.len());
                metrics::HOLDS_ENDED
                    .with_label_values(&["expired"])
                    .inc_by(expired.len() as u64);

                if let Some(audit) = audit {
                    for hold in expired {
                        audit
                            .emit(AuditEvent::HoldExpired {
                                hold_id: hold.id,
                                competition_id: hold.competition_id,
                                quantity: hold.quantity,
                            })
                            .await;
                    }
                }
            }
            Err(e) => {
                warn!("Hold sweep failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{HoldState, NewCompetition, SqliteRaffleStore};
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn test_sweep_expires_overdue_holds() {
        let store = Arc::new(SqliteRaffleStore::in_memory().unwrap());
        let comp = store
            .create_competition(NewCompetition {
                name: "test".to_string(),
                total_tickets: 10,
                min_tickets: None,
                ticket_price_cents: 100,
                prize_count: 1,
                closes_at: Utc::now() + ChronoDuration::hours(1),
            })
            .unwrap();

        let hold = store
            .create_hold(&comp.id, "s-1", 5, ChronoDuration::seconds(-1))
            .unwrap();

        let store_dyn: Arc<dyn RaffleStore> = Arc::clone(&store) as Arc<dyn RaffleStore>;
        HoldSweeper::sweep_once(&store_dyn, &None).await;

        let swept = store.get_hold(&hold.id).unwrap().unwrap();
        assert_eq!(swept.state, HoldState::Expired);
        assert_eq!(store.snapshot(&comp.id).unwrap().held, 0);
    }

    #[tokio::test]
    async fn test_start_stop() {
        let store = Arc::new(SqliteRaffleStore::in_memory().unwrap());
        let sweeper = HoldSweeper::new(Arc::clone(&store) as Arc<dyn RaffleStore>, 1);

        sweeper.start();
        // Double start is a no-op.
        sweeper.start();
        sweeper.stop();
        // Double stop is a no-op.
        sweeper.stop();
    }
}
