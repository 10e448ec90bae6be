mod audit;
mod competitions;
mod handlers;
mod holds;
mod routes;

pub use routes::create_router;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tombola_core::{PurchaseError, StoreError};

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Map a store error to the HTTP status it should surface as.
///
/// Expected, user-facing errors become 4xx; contract violations and
/// database failures are operator problems and become 500.
pub(crate) fn store_error_status(error: &StoreError) -> StatusCode {
    match error {
        StoreError::NotFound(_) | StoreError::HoldNotFound(_) => StatusCode::NOT_FOUND,
        StoreError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        StoreError::HoldExpired(_) => StatusCode::GONE,
        StoreError::InsufficientCapacity { .. }
        | StoreError::CompetitionClosed(_)
        | StoreError::AlreadyConsumed(_)
        | StoreError::NotSettled { .. }
        | StoreError::AlreadyDrawn(_) => StatusCode::CONFLICT,
        StoreError::ContractViolation(_) | StoreError::Database(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub(crate) fn store_error_response(error: StoreError) -> (StatusCode, Json<ErrorBody>) {
    let status = store_error_status(&error);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("Store error: {}", error);
    }
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
        }),
    )
}

pub(crate) fn purchase_error_response(error: PurchaseError) -> (StatusCode, Json<ErrorBody>) {
    let status = match &error {
        PurchaseError::PaymentDeclined { .. } => StatusCode::PAYMENT_REQUIRED,
        PurchaseError::NoProvider => StatusCode::SERVICE_UNAVAILABLE,
        PurchaseError::Payment(_) => StatusCode::BAD_GATEWAY,
        PurchaseError::Store(store_error) => store_error_status(store_error),
    };
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
        }),
    )
}
