use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{
        ChangesResponse, PutDocumentRequest, PutDocumentResponse, ReplicateResponse,
        StoredDocument,
    },
};
use storage::{DocumentStore, LocalStores, Storage, StoreError};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

pub mod config;

#[derive(Clone)]
pub struct AppState {
    pub stores: LocalStores,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[derive(Debug, Deserialize)]
struct ChangesQuery {
    #[serde(default)]
    since: i64,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/db/:db/docs/:id",
            get(get_document).put(put_document),
        )
        .route("/db/:db/replicate", post(replicate_document))
        .route("/db/:db/changes", get(list_changes))
        .route("/db/:db/ws", get(ws_handler))
        .with_state(state)
}

/// Serves the replication endpoint on an already bound listener.
pub async fn serve(listener: tokio::net::TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    axum::serve(listener, build_router(state)).await
}

async fn healthz() -> &'static str {
    "ok"
}

fn api_error(err: StoreError) -> (StatusCode, Json<ApiError>) {
    let (status, code) = match &err {
        StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, ErrorCode::NotFound),
        StoreError::Conflict { .. } => (StatusCode::CONFLICT, ErrorCode::Conflict),
        StoreError::InvalidDatabaseName(_)
        | StoreError::MalformedRevision(_)
        | StoreError::GenerationOverflow(_) => {
            (StatusCode::BAD_REQUEST, ErrorCode::Validation)
        }
        StoreError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, ErrorCode::Unavailable),
        _ => {
            error!(%err, "store request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Internal)
        }
    };
    (status, Json(ApiError::new(code, err.to_string())))
}

async fn open_database(state: &AppState, db: &str) -> ApiResult<Storage> {
    state.stores.open(db).await.map_err(api_error)
}

/// Read-only routes never create a database.
async fn existing_database(state: &AppState, db: &str) -> ApiResult<Option<Storage>> {
    state.stores.open_existing(db).await.map_err(api_error)
}

fn database_not_found(db: &str) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError::new(
            ErrorCode::NotFound,
            format!("database '{db}' not found"),
        )),
    )
}

async fn get_document(
    State(state): State<Arc<AppState>>,
    Path((db, id)): Path<(String, String)>,
) -> ApiResult<Json<StoredDocument>> {
    let Some(store) = existing_database(&state, &db).await? else {
        return Err(api_error(StoreError::NotFound { id }));
    };
    let document = store.get(&id).await.map_err(api_error)?;
    Ok(Json(document))
}

async fn put_document(
    State(state): State<Arc<AppState>>,
    Path((db, id)): Path<(String, String)>,
    Json(req): Json<PutDocumentRequest>,
) -> ApiResult<Json<PutDocumentResponse>> {
    let store = open_database(&state, &db).await?;
    let rev = store
        .put(&id, &req.payload, req.rev.as_ref())
        .await
        .map_err(|err| {
            if err.is_conflict() {
                warn!(%db, doc_id = %id, supplied = ?req.rev, "rejected stale write");
            }
            api_error(err)
        })?;
    info!(%db, doc_id = %id, %rev, "document written");
    Ok(Json(PutDocumentResponse { id, rev }))
}

async fn replicate_document(
    State(state): State<Arc<AppState>>,
    Path(db): Path<String>,
    Json(document): Json<StoredDocument>,
) -> ApiResult<Json<ReplicateResponse>> {
    let store = open_database(&state, &db).await?;
    let applied = store.apply_replicated(&document).await.map_err(api_error)?;
    debug!(%db, doc_id = %document.id, rev = %document.rev, applied, "replicated document");
    Ok(Json(ReplicateResponse { applied }))
}

async fn list_changes(
    State(state): State<Arc<AppState>>,
    Path(db): Path<String>,
    Query(q): Query<ChangesQuery>,
) -> ApiResult<Json<ChangesResponse>> {
    // A database nobody has written to yet has no changes.
    let Some(store) = existing_database(&state, &db).await? else {
        return Ok(Json(ChangesResponse {
            last_seq: q.since,
            results: Vec::new(),
        }));
    };
    let changes = store.changes_since(q.since).await.map_err(api_error)?;
    Ok(Json(changes))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(db): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let store = existing_database(&state, &db)
        .await?
        .ok_or_else(|| database_not_found(&db))?;
    Ok(ws.on_upgrade(move |socket| ws_connection(store, socket)))
}

async fn ws_connection(store: Storage, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let mut notices = match store.watch().await {
        Ok(notices) => notices,
        Err(err) => {
            warn!(db = store.name(), %err, "cannot watch database");
            return;
        }
    };
    let db = store.name().to_string();
    debug!(%db, "change feed subscriber connected");

    let send_task = tokio::spawn(async move {
        loop {
            let notice = match notices.recv().await {
                Ok(notice) => notice,
                Err(RecvError::Lagged(skipped)) => {
                    // The client polls the change log, so dropped notices only delay it.
                    warn!(skipped, "change feed subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&notice) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
    debug!(%db, "change feed subscriber disconnected");
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
