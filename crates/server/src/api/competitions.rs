//! Competition API handlers: admin creation, the read-only reporting
//! surface, and the scheduler-facing close/draw triggers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use tombola_core::{
    AuditEvent, Competition, CompetitionFilter, CompetitionStatus, DrawRecord, Entry,
    NewCompetition,
};

use super::{store_error_response, ErrorBody};
use crate::state::AppState;

/// Maximum allowed limit for list queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for list queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for creating a competition
#[derive(Debug, Deserialize)]
pub struct CreateCompetitionBody {
    pub name: String,
    pub total_tickets: u32,
    #[serde(default)]
    pub min_tickets: Option<u32>,
    pub ticket_price_cents: u64,
    #[serde(default)]
    pub prize_count: Option<u32>,
    pub closes_at: DateTime<Utc>,
}

/// Query parameters for listing competitions
#[derive(Debug, Deserialize)]
pub struct ListCompetitionsParams {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Request body for triggering a draw
#[derive(Debug, Default, Deserialize)]
pub struct DrawBody {
    /// Externally verifiable seed material (e.g. a published block hash).
    /// A locally generated seed is recorded when absent.
    #[serde(default)]
    pub seed: Option<String>,
}

/// Response for competition operations
#[derive(Debug, Serialize)]
pub struct CompetitionResponse {
    pub id: String,
    pub name: String,
    pub total_tickets: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_tickets: Option<u32>,
    pub ticket_price_cents: u64,
    pub prize_count: u32,
    pub closes_at: String,
    pub status: CompetitionStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub winning_tickets: Vec<u32>,
    pub created_at: String,
}

impl From<Competition> for CompetitionResponse {
    fn from(competition: Competition) -> Self {
        Self {
            id: competition.id,
            name: competition.name,
            total_tickets: competition.total_tickets,
            min_tickets: competition.min_tickets,
            ticket_price_cents: competition.ticket_price_cents,
            prize_count: competition.prize_count,
            closes_at: competition.closes_at.to_rfc3339(),
            status: competition.status,
            winning_tickets: competition.winning_tickets,
            created_at: competition.created_at.to_rfc3339(),
        }
    }
}

/// Response for listing competitions
#[derive(Debug, Serialize)]
pub struct ListCompetitionsResponse {
    pub competitions: Vec<CompetitionResponse>,
    pub limit: i64,
    pub offset: i64,
}

/// Ledger counters for one competition
#[derive(Debug, Serialize)]
pub struct SnapshotResponse {
    pub competition_id: String,
    pub total: u32,
    pub held: u32,
    pub sold: u32,
    pub available: u32,
}

/// An entry in the reporting surface
#[derive(Debug, Serialize)]
pub struct EntryResponse {
    pub id: String,
    pub competition_id: String,
    pub user_id: String,
    pub ticket_numbers: Vec<u32>,
    pub payment_ref: String,
    pub refunded: bool,
    pub created_at: String,
}

impl From<Entry> for EntryResponse {
    fn from(entry: Entry) -> Self {
        Self {
            ticket_numbers: entry.ticket_numbers(),
            id: entry.id,
            competition_id: entry.competition_id,
            user_id: entry.user_id,
            payment_ref: entry.payment_ref,
            refunded: entry.refunded,
            created_at: entry.created_at.to_rfc3339(),
        }
    }
}

/// Outcome of a close trigger
#[derive(Debug, Serialize)]
pub struct CloseResponse {
    pub competition_id: String,
    pub status: CompetitionStatus,
    pub sold: u32,
    pub refund_instructions: usize,
    pub already_closed: bool,
}

/// Proof material for a completed draw
#[derive(Debug, Serialize)]
pub struct DrawResponse {
    pub competition_id: String,
    pub seed: String,
    pub algorithm: String,
    pub winning_tickets: Vec<u32>,
    pub drawn_at: String,
}

impl From<DrawRecord> for DrawResponse {
    fn from(record: DrawRecord) -> Self {
        Self {
            competition_id: record.competition_id,
            seed: record.seed,
            algorithm: record.algorithm,
            winning_tickets: record.winning_tickets,
            drawn_at: record.drawn_at.to_rfc3339(),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a new competition (admin)
pub async fn create_competition(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateCompetitionBody>,
) -> Result<(StatusCode, Json<CompetitionResponse>), (StatusCode, Json<ErrorBody>)> {
    let request = NewCompetition {
        name: body.name,
        total_tickets: body.total_tickets,
        min_tickets: body.min_tickets,
        ticket_price_cents: body.ticket_price_cents,
        prize_count: body.prize_count.unwrap_or(1),
        closes_at: body.closes_at,
    };

    let competition = state
        .store()
        .create_competition(request)
        .map_err(store_error_response)?;

    state.audit().try_emit(AuditEvent::CompetitionCreated {
        competition_id: competition.id.clone(),
        name: competition.name.clone(),
        total_tickets: competition.total_tickets,
        min_tickets: competition.min_tickets,
        closes_at: competition.closes_at,
    });

    Ok((
        StatusCode::CREATED,
        Json(CompetitionResponse::from(competition)),
    ))
}

/// List competitions with optional filters
pub async fn list_competitions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListCompetitionsParams>,
) -> Result<Json<ListCompetitionsResponse>, (StatusCode, Json<ErrorBody>)> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = CompetitionFilter::new().with_limit(limit).with_offset(offset);
    if let Some(ref status) = params.status {
        filter = filter.with_status(status);
    }

    let competitions = state
        .store()
        .list_competitions(&filter)
        .map_err(store_error_response)?;

    Ok(Json(ListCompetitionsResponse {
        competitions: competitions
            .into_iter()
            .map(CompetitionResponse::from)
            .collect(),
        limit,
        offset,
    }))
}

/// Get a competition by ID
pub async fn get_competition(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CompetitionResponse>, (StatusCode, Json<ErrorBody>)> {
    match state.store().get_competition(&id) {
        Ok(Some(competition)) => Ok(Json(CompetitionResponse::from(competition))),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: format!("Competition not found: {}", id),
            }),
        )),
        Err(e) => Err(store_error_response(e)),
    }
}

/// Get the ledger counters for a competition (read-only reporting surface)
pub async fn get_snapshot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SnapshotResponse>, (StatusCode, Json<ErrorBody>)> {
    let snapshot = state.store().snapshot(&id).map_err(store_error_response)?;
    Ok(Json(SnapshotResponse {
        competition_id: id,
        total: snapshot.total,
        held: snapshot.held,
        sold: snapshot.sold,
        available: snapshot.available(),
    }))
}

/// List a competition's entries (read-only reporting surface)
pub async fn list_entries(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<EntryResponse>>, (StatusCode, Json<ErrorBody>)> {
    // 404 for an unknown competition rather than an empty list.
    if state
        .store()
        .get_competition(&id)
        .map_err(store_error_response)?
        .is_none()
    {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: format!("Competition not found: {}", id),
            }),
        ));
    }

    let entries = state
        .store()
        .entries_for_competition(&id)
        .map_err(store_error_response)?;
    Ok(Json(entries.into_iter().map(EntryResponse::from).collect()))
}

/// Close-time evaluation trigger (external scheduler)
pub async fn close_competition(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CloseResponse>, (StatusCode, Json<ErrorBody>)> {
    let report = state
        .closeout()
        .close(&id)
        .await
        .map_err(store_error_response)?;

    Ok(Json(CloseResponse {
        competition_id: report.competition_id,
        status: report.status,
        sold: report.sold,
        refund_instructions: report.refund_instructions,
        already_closed: report.already_closed,
    }))
}

/// Draw trigger (external scheduler)
pub async fn draw_competition(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<DrawBody>>,
) -> Result<Json<DrawResponse>, (StatusCode, Json<ErrorBody>)> {
    let seed = body.and_then(|b| b.0.seed);
    let record = state
        .draw_engine()
        .draw(&id, seed)
        .await
        .map_err(store_error_response)?;
    Ok(Json(DrawResponse::from(record)))
}

/// Get the draw record for a competition
pub async fn get_draw(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DrawResponse>, (StatusCode, Json<ErrorBody>)> {
    match state.store().get_draw(&id) {
        Ok(Some(record)) => Ok(Json(DrawResponse::from(record))),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: format!("No draw record for competition: {}", id),
            }),
        )),
        Err(e) => Err(store_error_response(e)),
    }
}
