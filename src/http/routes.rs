//! HTTP route definitions

use axum::{
    extract::{Extension, State},
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::app::AppState;
use crate::http::middleware::{require_admin, require_auth, AuthenticatedPlayer};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/rounds/recent", get(recent_rounds_handler));

    // Player routes (Supabase token required)
    let player_routes = Router::new()
        .route("/stats/me", get(my_stats_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // Admin routes (shared key required)
    let admin_routes = Router::new()
        .route("/admin/pause", post(pause_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .merge(public_routes)
        .merge(player_routes)
        .merge(admin_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    map: String,
    connected_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        map: state.config.map_name.clone(),
        connected_players: state.game.player_count(),
    })
}

// ============================================================================
// Round history
// ============================================================================

#[derive(Serialize)]
struct RecentRoundsResponse {
    rounds: Vec<RoundSummary>,
}

#[derive(Serialize)]
struct RoundSummary {
    round_number: i64,
    map_name: String,
    red_score: i32,
    blue_score: i32,
    winner: Option<String>,
    player_count: i32,
    finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

async fn recent_rounds_handler(
    State(state): State<AppState>,
) -> Result<Json<RecentRoundsResponse>, AppError> {
    let rounds = state
        .round_store
        .recent_rounds(20)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(RecentRoundsResponse {
        rounds: rounds
            .into_iter()
            .map(|r| RoundSummary {
                round_number: r.round_number,
                map_name: r.map_name,
                red_score: r.red_score,
                blue_score: r.blue_score,
                winner: r.winner,
                player_count: r.player_count,
                finished_at: r.finished_at,
            })
            .collect(),
    }))
}

// ============================================================================
// Player stats
// ============================================================================

#[derive(Serialize)]
struct MyStatsResponse {
    games_played: i64,
    games_won: i64,
    tokens_won: i64,
    wallet_linked: bool,
}

async fn my_stats_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedPlayer>,
) -> Result<Json<MyStatsResponse>, AppError> {
    let stats = state
        .player_store
        .ensure_stats(auth.player_id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(MyStatsResponse {
        games_played: stats.games_played,
        games_won: stats.games_won,
        tokens_won: stats.tokens_won,
        wallet_linked: stats.wallet_address.is_some(),
    }))
}

// ============================================================================
// Admin endpoints
// ============================================================================

#[derive(Deserialize)]
struct PauseRequest {
    paused: bool,
}

#[derive(Serialize)]
struct PauseResponse {
    paused: bool,
}

async fn pause_handler(
    State(state): State<AppState>,
    Json(req): Json<PauseRequest>,
) -> Json<PauseResponse> {
    state.game.set_paused(req.paused).await;
    Json(PauseResponse { paused: req.paused })
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
