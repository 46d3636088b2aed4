use crate::core::export::{self, ExportFormat};
use crate::core::formatted;
use crate::core::review::{Edit, ReviewSession, ReviewState, SplitOutcome};
use crate::domain::model::{Bill, Money, ParticipantShare};
use crate::domain::ports::ParseRequest;
use crate::server::error::ApiResult;
use crate::server::AppState;
use crate::utils::error::SplitError;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
}

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// What the reviewer sees: the bill, its text rendering and the latest split.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub state: ReviewState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub bill: Bill,
    pub formatted_output: String,
    pub outcome: SplitOutcome,
}

impl From<&ReviewSession> for SessionView {
    fn from(session: &ReviewSession) -> Self {
        Self {
            session_id: session.id(),
            state: session.state(),
            created_at: session.created_at(),
            updated_at: session.updated_at(),
            bill: session.bill().clone(),
            formatted_output: formatted::render(session.bill()),
            outcome: session.outcome().clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FormattedRequest {
    pub formatted_output: String,
}

#[derive(Debug, Serialize)]
pub struct CalculateResponse {
    pub success: bool,
    pub splits: Vec<ParticipantShare>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bill: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RegenerateRequest {
    pub feedback: String,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: Option<String>,
}

fn parse_id(id: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| SplitError::SessionNotFound { id: id.to_string() })
}

/// POST /api/v1/bills/process
pub async fn process_bill(
    State(state): State<AppState>,
    Json(request): Json<ParseRequest>,
) -> ApiResult<(StatusCode, Json<SessionView>)> {
    let session = state.engine.process(request).await?;
    let view = SessionView::from(&session);

    let mut sessions = state.sessions.lock().await;
    state.evict_expired(&mut sessions);
    sessions.insert(session.id(), session);
    tracing::info!(session = %view.session_id, "Review session created");
    Ok((StatusCode::CREATED, Json(view)))
}

/// POST /api/v1/bills/calculate-split
///
/// Stateless: parses the text rendering and splits it without creating a session.
pub async fn calculate_split(
    State(state): State<AppState>,
    Json(request): Json<FormattedRequest>,
) -> (StatusCode, Json<CalculateResponse>) {
    let result = formatted::parse(&request.formatted_output)
        .and_then(|bill| state.engine.calculator().calculate(&bill));

    match result {
        Ok(split) => (
            StatusCode::OK,
            Json(CalculateResponse {
                success: true,
                total_bill: Some(split.total),
                splits: split.shares,
                error: None,
                item: None,
            }),
        ),
        Err(err) => {
            tracing::debug!("Split calculation failed: {}", err);
            (
                err.status_code(),
                Json(CalculateResponse {
                    success: false,
                    splits: Vec::new(),
                    total_bill: None,
                    error: Some(err.user_friendly_message()),
                    item: err.item_index(),
                }),
            )
        }
    }
}

/// GET /api/v1/sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionView>> {
    let id = parse_id(&id)?;
    let sessions = state.sessions.lock().await;
    let session = sessions
        .get(&id)
        .ok_or_else(|| SplitError::SessionNotFound { id: id.to_string() })?;
    Ok(Json(SessionView::from(session)))
}

/// DELETE /api/v1/sessions/:id
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    state
        .sessions
        .lock()
        .await
        .remove(&id)
        .ok_or_else(|| SplitError::SessionNotFound { id: id.to_string() })?;
    tracing::info!(session = %id, "Review session deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Runs `f` against the session while holding the session map lock.
async fn with_session<T>(
    state: &AppState,
    id: &str,
    f: impl FnOnce(&mut ReviewSession) -> Result<T, SplitError>,
) -> ApiResult<T> {
    let id = parse_id(id)?;
    let mut sessions = state.sessions.lock().await;
    let session = sessions
        .get_mut(&id)
        .ok_or_else(|| SplitError::SessionNotFound { id: id.to_string() })?;
    f(session)
}

/// POST /api/v1/sessions/:id/edits
pub async fn apply_edit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(edit): Json<Edit>,
) -> ApiResult<Json<SessionView>> {
    with_session(&state, &id, |session| {
        session.apply(edit)?;
        Ok(Json(SessionView::from(&*session)))
    })
    .await
}

/// PUT /api/v1/sessions/:id/formatted
///
/// Replaces the bill with a corrected text rendering.
pub async fn replace_formatted(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<FormattedRequest>,
) -> ApiResult<Json<SessionView>> {
    let bill = formatted::parse(&request.formatted_output)?;
    with_session(&state, &id, |session| {
        session.replace_bill(bill)?;
        Ok(Json(SessionView::from(&*session)))
    })
    .await
}

/// POST /api/v1/sessions/:id/regenerate
///
/// Parses the images again with feedback. The parser call runs on a copy of
/// the session so other sessions stay responsive meanwhile.
pub async fn regenerate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RegenerateRequest>,
) -> ApiResult<Json<SessionView>> {
    let mut working = with_session(&state, &id, |session| {
        if session.state() == ReviewState::Confirmed {
            return Err(SplitError::SessionConfirmed);
        }
        Ok(session.clone())
    })
    .await?;

    state.engine.regenerate(&mut working, &request.feedback).await?;

    with_session(&state, &id, |session| {
        if session.state() == ReviewState::Confirmed {
            return Err(SplitError::SessionConfirmed);
        }
        session.replace_bill(working.bill().clone())?;
        Ok(Json(SessionView::from(&*session)))
    })
    .await
}

/// POST /api/v1/sessions/:id/confirm
pub async fn confirm(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionView>> {
    with_session(&state, &id, |session| {
        session.confirm()?;
        Ok(Json(SessionView::from(&*session)))
    })
    .await
}

/// POST /api/v1/sessions/:id/reopen
pub async fn reopen(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionView>> {
    with_session(&state, &id, |session| {
        session.reopen();
        Ok(Json(SessionView::from(&*session)))
    })
    .await
}

/// GET /api/v1/sessions/:id/export?format=csv
pub async fn export(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    let format = match query.format.as_deref() {
        Some(format) => format
            .parse::<ExportFormat>()
            .map_err(|e| SplitError::FormatError {
                message: e.to_string(),
            })?,
        None => ExportFormat::Json,
    };
    let split = with_session(&state, &id, |session| {
        session
            .confirmed_split()
            .cloned()
            .ok_or(SplitError::SessionNotConfirmed)
    })
    .await?;

    let (content_type, body) = match format {
        ExportFormat::Json => ("application/json", export::to_json(&split)?),
        ExportFormat::Csv => ("text/csv", export::to_csv(&split)?),
    };
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}
