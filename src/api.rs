//! Read-only HTTP query surface for Timechain
//!
//! Exposes the head, blocks by hash or sequence, peers and node health.
//! No route mutates chain state.

use axum::{
    extract::{Query, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::blockchain::{Block, ChainState};
use crate::error::ChainError;
use crate::metrics::{MetricsSnapshot, NodeMetrics};
use crate::network::{NetworkNode, PeerInfo};
use crate::node::NodeState;
use crate::persistence::{HeadPointer, Persistence};

/// Shared handles the query routes read from.
#[derive(Clone)]
pub struct ApiState {
    pub chain: Arc<ChainState>,
    pub network: Arc<NetworkNode>,
    pub metrics: Arc<NodeMetrics>,
    /// Orchestrator state for health checks, when running inside a node.
    pub state: Option<Arc<RwLock<NodeState>>>,
    started: Instant,
}

impl ApiState {
    pub fn new(
        network: Arc<NetworkNode>,
        metrics: Arc<NodeMetrics>,
        state: Option<Arc<RwLock<NodeState>>>,
    ) -> Self {
        Self {
            chain: network.chain().clone(),
            network,
            metrics,
            state,
            started: Instant::now(),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Chain(ChainError),
    InvalidInput(String),
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Chain(e) if e.is_not_found() => (StatusCode::NOT_FOUND, e.to_string()),
            ApiError::Chain(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        ApiError::Chain(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub head: HeadPointer,
    pub genesis_time: i64,
    pub peers: usize,
    pub uptime_seconds: u64,
    pub metrics: MetricsSnapshot,
}

#[derive(Serialize)]
pub struct PeersResponse {
    pub count: usize,
    pub peers: Vec<PeerInfo>,
}

#[derive(Deserialize)]
struct BlockQuery {
    hash: Option<String>,
}

// `u` stays a string so a bad value is our 400, not the extractor's.
#[derive(Deserialize)]
struct SequenceQuery {
    u: Option<String>,
}

/// Request logging middleware.
async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    tracing::debug!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "api.request"
    );
    response
}

// ============================================================================
// API Server
// ============================================================================

pub fn build_api_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![http::Method::GET, http::Method::OPTIONS])
        .allow_headers(vec![http::header::CONTENT_TYPE]);

    Router::new()
        .route("/status", get(get_status))
        .route("/head", get(get_head))
        .route("/block", get(get_block_by_hash))
        .route("/block_unix", get(get_block_by_sequence))
        .route("/peers", get(get_peers))
        .route("/health", get(health_check))
        .layer(middleware::from_fn(logging_middleware))
        .with_state(state)
        .layer(cors)
}

/// Serve the query surface on `listener` until `shutdown` is cancelled.
pub async fn run_api_server(
    state: ApiState,
    listener: tokio::net::TcpListener,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr: SocketAddr = listener.local_addr()?;
    info!("RPC listening on http://{}", addr);

    axum::serve(listener, build_api_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn get_status(State(api): State<ApiState>) -> impl IntoResponse {
    Json(StatusResponse {
        head: api.chain.head_pointer().await,
        genesis_time: api.chain.genesis_time(),
        peers: api.network.peers().len().await,
        uptime_seconds: api.started.elapsed().as_secs(),
        metrics: api.metrics.snapshot(),
    })
}

async fn get_head(State(api): State<ApiState>) -> Json<Block> {
    Json(api.chain.current_head().await)
}

async fn get_block_by_hash(
    State(api): State<ApiState>,
    Query(query): Query<BlockQuery>,
) -> Result<Json<Block>, ApiError> {
    let hash = query
        .hash
        .filter(|h| !h.trim().is_empty())
        .ok_or_else(|| ApiError::InvalidInput("missing hash".to_string()))?;
    Ok(Json(api.chain.store().load_block_by_hash(hash.trim())?))
}

async fn get_block_by_sequence(
    State(api): State<ApiState>,
    Query(query): Query<SequenceQuery>,
) -> Result<Json<Block>, ApiError> {
    let raw = query.u.ok_or_else(|| ApiError::InvalidInput("missing u".to_string()))?;
    let sequence: u64 = raw
        .trim()
        .parse()
        .map_err(|_| ApiError::InvalidInput(format!("invalid sequence {:?}", raw)))?;
    match api.chain.store().load_block_by_sequence(sequence) {
        Ok(block) => Ok(Json(block)),
        Err(e) if e.is_not_found() => {
            Err(ApiError::NotFound(format!("no block at sequence {}", sequence)))
        }
        Err(e) => Err(e.into()),
    }
}

async fn get_peers(State(api): State<ApiState>) -> Json<PeersResponse> {
    let peers = api.network.list_peers().await;
    Json(PeersResponse { count: peers.len(), peers })
}

async fn health_check(State(api): State<ApiState>) -> impl IntoResponse {
    let node_state = match &api.state {
        Some(s) => s.read().await.clone(),
        None => NodeState::Ready,
    };
    let (status, label) = if node_state == NodeState::Ready {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };
    (
        status,
        Json(serde_json::json!({
            "status": label,
            "node_state": format!("{:?}", node_state),
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}
