//! Axum router for the gossip endpoints.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Json, State};
use axum::routing::{get, post};
use keel_store::{Store, StoreError};
use tracing::warn;

use crate::wire::{
    HealthResponse, MissingRequest, MissingResponse, PushOpsRequest, PushOpsResponse,
    SummaryResponse,
};

/// Shared state for the gossip handlers.
#[derive(Clone)]
struct AppState {
    store: Arc<Store>,
}

/// Build the gossip [`Router`] over a store.
///
/// Handlers are stateless beyond the op log and safe to call concurrently;
/// malformed JSON bodies are rejected with 400 by the `Json` extractor.
pub fn router(store: Arc<Store>) -> Router {
    Router::new()
        .route("/gossip/summary", get(get_summary))
        .route("/gossip/missing", post(post_missing))
        .route("/gossip/ops", post(post_ops))
        .route("/health", get(get_health))
        .with_state(AppState { store })
}

async fn get_summary(State(state): State<AppState>) -> Json<SummaryResponse> {
    Json(SummaryResponse {
        summary: state.store.oplog().summary(),
    })
}

async fn post_missing(
    State(state): State<AppState>,
    Json(req): Json<MissingRequest>,
) -> Json<MissingResponse> {
    Json(MissingResponse {
        ops: state.store.oplog().missing_for(&req.summary, req.limit),
    })
}

async fn post_ops(
    State(state): State<AppState>,
    Json(req): Json<PushOpsRequest>,
) -> Json<PushOpsResponse> {
    let mut tally = PushOpsResponse::default();
    for op in req.ops {
        let op_id = op.id;
        match state.store.oplog().add_remote(op) {
            Ok(true) => tally.accepted += 1,
            Ok(false) => tally.dropped += 1,
            Err(StoreError::SeqConflict { author, seq }) => {
                tally.rejected += 1;
                warn!(%author, seq, "conflicting operation pushed by peer");
            }
            Err(e) => {
                tally.rejected += 1;
                warn!(op_id = %op_id, %e, "rejected pushed operation");
            }
        }
    }
    Json(tally)
}

async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        node_id: state.store.node_id(),
    })
}
