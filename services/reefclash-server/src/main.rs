//! Reefclash Server - arena coordination over HTTP
//!
//! Thin, stateless request handlers over the arena coordinator. All
//! semantics live in `reefclash-arena`; handlers only parse input, call
//! the coordinator, and map errors to status codes.
//!
//! # Quick Start
//!
//! ```bash
//! # Start the arena server (expects DATABASE_URL and REDIS_URL)
//! cargo run -p reefclash-server
//!
//! # Run migrations first on a fresh database
//! cargo run -p reefclash-server -- --migrate
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use reefclash_arena::{
    AdmissionController, AdmissionSettings, ArenaCoordinator, ArenaError, CacheTtls,
    TracingNotifier, DEFAULT_LEVEL_WINDOW,
};
use reefclash_store::{Store, StoreConfig};
use reefclash_types::{BattleConfig, FighterId, FighterSnapshot, UserId};

// ============================================================================
// CLI
// ============================================================================

#[derive(Parser)]
#[command(name = "reefclash")]
#[command(about = "Reefclash arena server")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Run database migrations before serving
    #[arg(long)]
    migrate: bool,
}

// ============================================================================
// Application State
// ============================================================================

struct AppState {
    coordinator: ArenaCoordinator,
    store: Store,
}

// ============================================================================
// Request / Response Bodies
// ============================================================================

#[derive(Deserialize)]
struct JoinRequest {
    user_id: UserId,
    fighter_id: FighterId,
}

#[derive(Deserialize)]
struct LeaveRequest {
    user_id: UserId,
}

#[derive(Serialize)]
struct LeaveResponse {
    active_count: u64,
}

#[derive(Deserialize)]
struct HeartbeatRequest {
    user_id: UserId,
    fighter_id: FighterId,
}

#[derive(Serialize)]
struct HeartbeatResponse {
    refreshed: bool,
}

#[derive(Deserialize)]
struct BattleRequest {
    attacker_id: FighterId,
    defender_id: FighterId,
}

#[derive(Deserialize)]
struct OpponentsQuery {
    window: Option<u32>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

// ============================================================================
// Error Mapping
// ============================================================================

struct ApiError(ArenaError);

impl From<ArenaError> for ApiError {
    fn from(e: ArenaError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ArenaError::Validation(_) => StatusCode::BAD_REQUEST,
            ArenaError::NotFound(_) => StatusCode::NOT_FOUND,
            ArenaError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ArenaError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

fn bad_id(what: &str) -> ApiError {
    ApiError(ArenaError::Validation(format!("invalid {} id", what)))
}

// ============================================================================
// Handlers
// ============================================================================

async fn join(
    State(state): State<Arc<AppState>>,
    Json(req): Json<JoinRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.coordinator.join(req.user_id, req.fighter_id).await?;
    Ok(Json(outcome))
}

async fn leave(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LeaveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let active_count = state.coordinator.leave(req.user_id).await?;
    Ok(Json(LeaveResponse { active_count }))
}

async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let refreshed = state
        .coordinator
        .heartbeat(req.user_id, req.fighter_id)
        .await?;
    Ok(Json(HeartbeatResponse { refreshed }))
}

async fn status(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = UserId::parse(&user_id).map_err(|_| bad_id("user"))?;
    let status = state.coordinator.status(user_id).await?;
    Ok(Json(status))
}

async fn resolve_battle(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BattleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .coordinator
        .resolve(req.attacker_id, req.defender_id)
        .await?;
    Ok(Json(outcome))
}

async fn opponents(
    State(state): State<Arc<AppState>>,
    Path(fighter_id): Path<String>,
    Query(query): Query<OpponentsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let fighter_id = FighterId::parse(&fighter_id).map_err(|_| bad_id("fighter"))?;
    let window = query.window.unwrap_or(DEFAULT_LEVEL_WINDOW);
    let ranked = state.coordinator.match_opponent(fighter_id, window).await?;
    Ok(Json(ranked))
}

async fn get_fighter(
    State(state): State<Arc<AppState>>,
    Path(fighter_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let fighter_id = FighterId::parse(&fighter_id).map_err(|_| bad_id("fighter"))?;
    let fighter = state.coordinator.fighter(&fighter_id).await?;
    Ok(Json(fighter))
}

async fn register_fighter(
    State(state): State<Arc<AppState>>,
    Json(fighter): Json<FighterSnapshot>,
) -> Result<impl IntoResponse, ApiError> {
    state.coordinator.register_fighter(fighter).await?;
    Ok(StatusCode::CREATED)
}

async fn get_config(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let config = state.coordinator.config().await?;
    Ok(Json(config))
}

async fn put_config(
    State(state): State<Arc<AppState>>,
    Json(config): Json<BattleConfig>,
) -> Result<impl IntoResponse, ApiError> {
    state.coordinator.update_config(config).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.store.health_check().await;
    let status = if health.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let store = Store::connect(StoreConfig::from_env()).await?;
    if cli.migrate {
        store.migrate().await?;
    }

    let coordinator = ArenaCoordinator::new(
        Arc::new(store.fighters()),
        Arc::new(store.snapshot_cache()),
        AdmissionController::new(Arc::new(store.arena_state()), AdmissionSettings::from_env()),
        Arc::new(TracingNotifier),
        CacheTtls::from_store_config(store.config()),
    );

    let state = Arc::new(AppState { coordinator, store });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/arena/join", post(join))
        .route("/arena/leave", post(leave))
        .route("/arena/heartbeat", post(heartbeat))
        .route("/arena/status/:user_id", get(status))
        .route("/battles", post(resolve_battle))
        .route("/fighters", post(register_fighter))
        .route("/fighters/:fighter_id", get(get_fighter))
        .route("/fighters/:fighter_id/opponents", get(opponents))
        .route("/config", get(get_config).put(put_config))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    info!("Reefclash server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.store.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
