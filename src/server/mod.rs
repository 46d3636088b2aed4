//! Local HTTP API for uploading bills and reviewing their split.

pub mod error;
pub mod handlers;

use crate::core::engine::SplitEngine;
use crate::core::intake::ImageIntake;
use crate::core::review::ReviewSession;
use crate::domain::ports::BillParser;
use crate::utils::error::{Result, SplitError};
use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub type DynEngine = SplitEngine<Box<dyn BillParser>>;

const DEFAULT_SESSION_TTL_MINUTES: i64 = 240;
/// Room for the JSON envelope and description around the encoded images.
const BODY_HEADROOM: usize = 1024 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DynEngine>,
    /// Review sessions by id, kept in memory until deleted or idle past `session_ttl`.
    pub sessions: Arc<Mutex<HashMap<Uuid, ReviewSession>>>,
    pub session_ttl: Duration,
}

impl AppState {
    pub fn new(engine: DynEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            session_ttl: Duration::minutes(DEFAULT_SESSION_TTL_MINUTES),
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Drops sessions idle for at least `session_ttl`.
    pub fn evict_expired(&self, sessions: &mut HashMap<Uuid, ReviewSession>) {
        let cutoff = Utc::now() - self.session_ttl;
        let before = sessions.len();
        sessions.retain(|_, session| session.updated_at() > cutoff);
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = sessions.len(), "Evicted idle review sessions");
        }
    }
}

/// Largest request body the upload route must accept: every image at the size
/// limit, base64 encoded.
pub fn body_limit(intake: &ImageIntake) -> usize {
    intake
        .max_file_size
        .saturating_mul(intake.max_files)
        .saturating_mul(4)
        / 3
        + BODY_HEADROOM
}

pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post, put};

    let limit = body_limit(state.engine.intake());

    let api = Router::new()
        .route("/bills/process", post(handlers::process_bill))
        .route("/bills/calculate-split", post(handlers::calculate_split))
        .route(
            "/sessions/:id",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/sessions/:id/edits", post(handlers::apply_edit))
        .route("/sessions/:id/formatted", put(handlers::replace_formatted))
        .route("/sessions/:id/regenerate", post(handlers::regenerate))
        .route("/sessions/:id/confirm", post(handlers::confirm))
        .route("/sessions/:id/reopen", post(handlers::reopen))
        .route("/sessions/:id/export", get(handlers::export))
        .layer(DefaultBodyLimit::max(limit));

    Router::new()
        .nest("/api/v1", api)
        .merge(handlers::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds `address` and serves until the process is stopped.
pub async fn serve(state: AppState, address: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    tracing::info!("Review server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, build_router(state))
        .await
        .map_err(SplitError::IoError)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_limit_fits_every_image_at_the_size_limit() {
        let intake = ImageIntake::default();
        let encoded = intake.max_file_size * intake.max_files * 4 / 3;
        assert!(body_limit(&intake) > encoded);

        let unbounded = ImageIntake {
            max_file_size: usize::MAX,
            max_files: 2,
            ..ImageIntake::default()
        };
        assert!(body_limit(&unbounded) >= usize::MAX / 3);
    }
}
