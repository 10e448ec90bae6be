//! Hold and purchase API handlers (the cart-facing surface).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use tombola_core::{Hold, HoldState, PaymentConfirmation};

use super::{purchase_error_response, store_error_response, ErrorBody};
use crate::api::competitions::EntryResponse;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for creating a hold
#[derive(Debug, Deserialize)]
pub struct CreateHoldBody {
    pub competition_id: String,
    /// Stable identifier from the session/cart layer.
    pub session_id: String,
    pub quantity: u32,
}

/// Request body for completing a purchase through the configured provider
#[derive(Debug, Deserialize)]
pub struct PurchaseBody {
    /// Purchaser identity from the caller; the core does not manage login.
    pub user_id: String,
}

/// Request body for settling with an out-of-band payment confirmation
/// (gateway callback style)
#[derive(Debug, Deserialize)]
pub struct CompletePurchaseBody {
    pub user_id: String,
    pub confirmation: ConfirmationBody,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmationBody {
    pub reference: String,
    pub approved: bool,
    #[serde(default)]
    pub declined_reason: Option<String>,
}

/// Response for hold operations
#[derive(Debug, Serialize)]
pub struct HoldResponse {
    pub id: String,
    pub competition_id: String,
    pub session_id: String,
    pub quantity: u32,
    pub state: HoldState,
    pub created_at: String,
    pub expires_at: String,
}

impl From<Hold> for HoldResponse {
    fn from(hold: Hold) -> Self {
        Self {
            id: hold.id,
            competition_id: hold.competition_id,
            session_id: hold.session_id,
            quantity: hold.quantity,
            state: hold.state,
            created_at: hold.created_at.to_rfc3339(),
            expires_at: hold.expires_at.to_rfc3339(),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a hold (supersedes the session's previous hold on the competition)
pub async fn create_hold(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateHoldBody>,
) -> Result<(StatusCode, Json<HoldResponse>), (StatusCode, Json<ErrorBody>)> {
    let hold = state
        .holds()
        .create_hold(&body.competition_id, &body.session_id, body.quantity)
        .await
        .map_err(store_error_response)?;

    Ok((StatusCode::CREATED, Json(HoldResponse::from(hold))))
}

/// Get a hold by ID
pub async fn get_hold(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<HoldResponse>, (StatusCode, Json<ErrorBody>)> {
    match state.holds().get_hold(&id) {
        Ok(Some(hold)) => Ok(Json(HoldResponse::from(hold))),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: format!("Hold not found: {}", id),
            }),
        )),
        Err(e) => Err(store_error_response(e)),
    }
}

/// Extend a hold's deadline to now + TTL
pub async fn renew_hold(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<HoldResponse>, (StatusCode, Json<ErrorBody>)> {
    let hold = state
        .holds()
        .renew_hold(&id)
        .await
        .map_err(store_error_response)?;
    Ok(Json(HoldResponse::from(hold)))
}

/// Release a hold, returning its capacity to the pool
pub async fn release_hold(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ErrorBody>)> {
    state
        .holds()
        .release_hold(&id)
        .await
        .map_err(store_error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Purchase the held tickets through the configured payment provider
pub async fn purchase(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<PurchaseBody>,
) -> Result<(StatusCode, Json<EntryResponse>), (StatusCode, Json<ErrorBody>)> {
    let entry = state
        .purchases()
        .purchase(&id, &body.user_id)
        .await
        .map_err(purchase_error_response)?;

    Ok((StatusCode::CREATED, Json(EntryResponse::from(entry))))
}

/// Settle a hold with a payment confirmation delivered out of band
pub async fn complete_purchase(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<CompletePurchaseBody>,
) -> Result<(StatusCode, Json<EntryResponse>), (StatusCode, Json<ErrorBody>)> {
    let confirmation = PaymentConfirmation {
        reference: body.confirmation.reference,
        approved: body.confirmation.approved,
        declined_reason: body.confirmation.declined_reason,
    };

    let entry = state
        .purchases()
        .complete_purchase(&id, &body.user_id, confirmation)
        .await
        .map_err(purchase_error_response)?;

    Ok((StatusCode::CREATED, Json(EntryResponse::from(entry))))
}
