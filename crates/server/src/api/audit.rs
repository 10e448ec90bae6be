//! Audit trail query handler.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use tombola_core::{AuditFilter, AuditRecord};

use super::ErrorBody;
use crate::state::AppState;

/// Maximum allowed limit for audit queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for audit queries
const DEFAULT_LIMIT: i64 = 100;

/// Query parameters for the audit trail
#[derive(Debug, Deserialize)]
pub struct AuditQueryParams {
    pub competition_id: Option<String>,
    pub event_type: Option<String>,
    pub subject_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Response for audit queries
#[derive(Debug, Serialize)]
pub struct AuditQueryResponse {
    pub records: Vec<AuditRecord>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Query the audit trail
pub async fn query_audit(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<AuditQueryResponse>, (StatusCode, Json<ErrorBody>)> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = AuditFilter::new().with_limit(limit).with_offset(offset);
    if let Some(ref competition_id) = params.competition_id {
        filter = filter.with_competition_id(competition_id);
    }
    if let Some(ref event_type) = params.event_type {
        filter = filter.with_event_type(event_type);
    }
    if let Some(ref subject_id) = params.subject_id {
        filter = filter.with_subject_id(subject_id);
    }

    let error_response = |e: tombola_core::AuditError| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: e.to_string(),
            }),
        )
    };

    let records = state.audit_store().query(&filter).map_err(error_response)?;
    let total = state.audit_store().count(&filter).map_err(error_response)?;

    Ok(Json(AuditQueryResponse {
        records,
        total,
        limit,
        offset,
    }))
}
