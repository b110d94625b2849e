//! Scoreboard HTTP Endpoint
//!
//! Read-only JSON view of the scoreboard:
//!
//! - `GET /` and `GET /v1/rps/scores`: scores per opponent, sorted by identity
//! - `GET /healthz`: liveness
//! - anything else: 404 with a JSON error body

use std::net::SocketAddr;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::game::scoreboard::{PeerScore, SharedScoreBoard};

/// Default bind address.
pub const DEFAULT_BIND: &str = "127.0.0.1:8443";

/// Scoreboard server configuration.
#[derive(Debug, Clone)]
pub struct ScoreboardConfig {
    /// Listen address.
    pub bind: SocketAddr,
    /// Identity of this server, echoed in responses.
    pub server_spiffe_id: String,
    /// Transport label echoed in responses.
    pub transport: String,
}

impl Default for ScoreboardConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8443)),
            server_spiffe_id: "spiffe://rps.local/server".to_string(),
            transport: "HTTP".to_string(),
        }
    }
}

impl ScoreboardConfig {
    /// Defaults overridden by `RPS_SCOREBOARD_BIND` and `RPS_SERVER_SPIFFE_ID`.
    pub fn from_env() -> Result<Self, ScoreboardServerError> {
        let mut config = Self::default();
        if let Ok(bind) = std::env::var("RPS_SCOREBOARD_BIND") {
            config.bind = parse_bind(&bind)?;
        }
        if let Ok(id) = std::env::var("RPS_SERVER_SPIFFE_ID") {
            config.server_spiffe_id = id;
        }
        Ok(config)
    }
}

/// Parse a listen address.
pub fn parse_bind(value: &str) -> Result<SocketAddr, ScoreboardServerError> {
    value
        .parse()
        .map_err(|_| ScoreboardServerError::InvalidBind(value.to_string()))
}

/// Scoreboard server errors.
#[derive(Debug, Error)]
pub enum ScoreboardServerError {
    /// Bind address did not parse.
    #[error("invalid bind address: {0}")]
    InvalidBind(String),
    /// Listener or serve failure.
    #[error("scoreboard server i/o: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// RESPONSE BODIES
// =============================================================================

/// One opponent in the scores response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpponentScore {
    /// Opponent identity.
    pub spiffe_id: String,
    /// Rounds won against them.
    pub wins: u32,
    /// Rounds lost against them.
    pub losses: u32,
}

/// Body of `GET /v1/rps/scores`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoresResponse {
    /// This server's identity.
    pub server_spiffe_id: String,
    /// Transport label.
    pub transport: String,
    /// Opponents sorted by identity.
    pub opponents: Vec<OpponentScore>,
}

/// Build the scores body from a snapshot.
pub fn render_scores(config: &ScoreboardConfig, snapshot: Vec<(String, PeerScore)>) -> ScoresResponse {
    let mut opponents: Vec<OpponentScore> = snapshot
        .into_iter()
        .map(|(spiffe_id, score)| OpponentScore {
            spiffe_id,
            wins: score.wins,
            losses: score.losses,
        })
        .collect();
    opponents.sort_by(|a, b| a.spiffe_id.cmp(&b.spiffe_id));
    ScoresResponse {
        server_spiffe_id: config.server_spiffe_id.clone(),
        transport: config.transport.clone(),
        opponents,
    }
}

// =============================================================================
// ROUTER
// =============================================================================

#[derive(Clone)]
struct AppState {
    config: ScoreboardConfig,
    board: SharedScoreBoard,
}

/// Router serving `board`.
pub fn router(config: ScoreboardConfig, board: SharedScoreBoard) -> Router {
    Router::new()
        .route("/", get(handle_scores))
        .route("/v1/rps/scores", get(handle_scores))
        .route("/healthz", get(handle_health))
        .fallback(handle_not_found)
        .with_state(AppState { config, board })
}

/// Bind and serve until the listener fails.
#[instrument(skip_all, fields(bind = %config.bind))]
pub async fn serve(config: ScoreboardConfig, board: SharedScoreBoard) -> Result<(), ScoreboardServerError> {
    let listener = TcpListener::bind(config.bind).await?;
    info!("Scoreboard listening on http://{}/v1/rps/scores", listener.local_addr()?);
    serve_on(listener, config, board).await
}

/// Serve on an already bound listener.
pub async fn serve_on(
    listener: TcpListener,
    config: ScoreboardConfig,
    board: SharedScoreBoard,
) -> Result<(), ScoreboardServerError> {
    axum::serve(listener, router(config, board)).await?;
    Ok(())
}

async fn handle_scores(State(state): State<AppState>) -> Response {
    let body = render_scores(&state.config, state.board.snapshot().await);
    json_response(StatusCode::OK, &body, true)
}

async fn handle_health() -> Response {
    json_response(StatusCode::OK, &serde_json::json!({ "status": "ok" }), true)
}

async fn handle_not_found() -> Response {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({ "error": "not_found", "message": "unknown path" }),
        false,
    )
}

fn json_response<T: Serialize>(status: StatusCode, body: &T, pretty: bool) -> Response {
    let encoded = if pretty {
        serde_json::to_string_pretty(body)
    } else {
        serde_json::to_string(body)
    };
    let Ok(text) = encoded else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    if status.is_success() {
        (
            status,
            [
                (header::CONTENT_TYPE, "application/json"),
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            ],
            text,
        )
            .into_response()
    } else {
        (status, [(header::CONTENT_TYPE, "application/json")], text).into_response()
    }
}
