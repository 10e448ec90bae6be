use std::sync::Arc;

use prometheus::Registry;
use tombola_core::{
    AuditHandle, AuditStore, CloseoutCoordinator, Config, DrawEngine, HoldManager,
    PurchaseCoordinator, RaffleStore, SanitizedConfig,
};

/// Shared application state
pub struct AppState {
    config: Config,
    store: Arc<dyn RaffleStore>,
    audit: AuditHandle,
    audit_store: Arc<dyn AuditStore>,
    holds: HoldManager,
    purchases: PurchaseCoordinator,
    closeout: CloseoutCoordinator,
    draw: DrawEngine,
    metrics_registry: Registry,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        store: Arc<dyn RaffleStore>,
        audit: AuditHandle,
        audit_store: Arc<dyn AuditStore>,
        holds: HoldManager,
        purchases: PurchaseCoordinator,
        closeout: CloseoutCoordinator,
        draw: DrawEngine,
        metrics_registry: Registry,
    ) -> Self {
        Self {
            config,
            store,
            audit,
            audit_store,
            holds,
            purchases,
            closeout,
            draw,
            metrics_registry,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn store(&self) -> &dyn RaffleStore {
        self.store.as_ref()
    }

    pub fn audit(&self) -> &AuditHandle {
        &self.audit
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }

    pub fn holds(&self) -> &HoldManager {
        &self.holds
    }

    pub fn purchases(&self) -> &PurchaseCoordinator {
        &self.purchases
    }

    pub fn closeout(&self) -> &CloseoutCoordinator {
        &self.closeout
    }

    pub fn draw_engine(&self) -> &DrawEngine {
        &self.draw
    }

    pub fn metrics_registry(&self) -> &Registry {
        &self.metrics_registry
    }
}
