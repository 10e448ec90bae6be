pub mod audit;
pub mod closeout;
pub mod config;
pub mod draw;
pub mod holds;
pub mod metrics;
pub mod payment;
pub mod purchase;
pub mod store;
pub mod testing;

pub use audit::{
    create_audit_system, AuditError, AuditEvent, AuditFilter, AuditHandle, AuditRecord,
    AuditStore, AuditWriter, SqliteAuditStore,
};
pub use closeout::{CloseReport, CloseoutCoordinator};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, HoldConfig,
    PaymentBackend, SanitizedConfig,
};
pub use draw::{select_winners, DrawEngine, DRAW_ALGORITHM};
pub use holds::{HoldManager, HoldSweeper};
pub use payment::{
    ChargeRequest, HttpPaymentProvider, PaymentConfirmation, PaymentError, PaymentProvider,
    RefundInstruction,
};
pub use purchase::{PurchaseCoordinator, PurchaseError};
pub use store::{
    Closeout, Competition, CompetitionFilter, CompetitionStatus, DrawRecord, Entry, Hold,
    HoldState, LedgerSnapshot, NewCompetition, RaffleStore, SqliteRaffleStore, StoreError,
};
