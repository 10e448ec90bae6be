//! Common test utilities for E2E testing with mocks.
//!
//! Provides a test fixture that creates an in-process server with a mock
//! payment provider injected, enabling end-to-end testing without external
//! infrastructure.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use tombola_core::{
    create_audit_system, testing::MockPaymentProvider, AuditStore, CloseoutCoordinator, Config,
    DrawEngine, HoldManager, PaymentProvider, PurchaseCoordinator, RaffleStore, SqliteAuditStore,
    SqliteRaffleStore,
};

/// Test fixture for E2E testing with a mock payment provider.
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock payment provider - flip approvals, inspect charges/refunds
    pub payment: Arc<MockPaymentProvider>,
    /// Temporary directory for the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with default configuration.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let mut config: Config =
            tombola_core::load_config_from_str("").expect("Failed to build default config");
        config.database.path = db_path.clone();

        // Create stores
        let store: Arc<dyn RaffleStore> = Arc::new(
            SqliteRaffleStore::new(&db_path).expect("Failed to create raffle store"),
        );
        let audit_store: Arc<dyn AuditStore> = Arc::new(
            SqliteAuditStore::new(&db_path).expect("Failed to create audit store"),
        );

        // Create audit system
        let (audit_handle, audit_writer) = create_audit_system(Arc::clone(&audit_store), 100);
        tokio::spawn(audit_writer.run());

        // Create mock payment provider
        let payment = Arc::new(MockPaymentProvider::new());

        // Create components
        let holds = HoldManager::new(Arc::clone(&store), config.holds.clone())
            .with_audit(audit_handle.clone());
        let purchases = PurchaseCoordinator::new(Arc::clone(&store))
            .with_payment_provider(Arc::clone(&payment) as Arc<dyn PaymentProvider>)
            .with_audit(audit_handle.clone());
        let closeout = CloseoutCoordinator::new(Arc::clone(&store))
            .with_payment_provider(Arc::clone(&payment) as Arc<dyn PaymentProvider>)
            .with_audit(audit_handle.clone());
        let draw = DrawEngine::new(Arc::clone(&store)).with_audit(audit_handle.clone());

        let metrics_registry = prometheus::Registry::new();
        tombola_core::metrics::register_metrics(&metrics_registry);

        // Create app state
        let state = Arc::new(tombola_server::state::AppState::new(
            config,
            store,
            audit_handle,
            audit_store,
            holds,
            purchases,
            closeout,
            draw,
            metrics_registry,
        ));

        // Create router
        let router = tombola_server::api::create_router(state);

        Self {
            router,
            payment,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
