use axum::Router;
use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::core::error::{Error, ErrorKind, Result};
use crate::retrieval::cache::QueryCache;
use crate::retrieval::pipeline::{RankedDoc, Retriever};
use crate::retrieval::wordlist::word_list;
use crate::storage::store::Store;

/// Shared handler state: the immutable snapshot plus the query machinery.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub retriever: Arc<Retriever>,
    pub cache: Arc<QueryCache>,
}

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
}

/// Failures cross the HTTP boundary as a 500 with a JSON error envelope.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "request failed");
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

pub fn router(state: AppState, ui_dir: PathBuf) -> Router {
    Router::new()
        .route("/query", post(post_query))
        .route("/query/{terms}", get(get_query))
        .route("/wordlist/{pre}", get(get_wordlist))
        .nest_service("/static", ServeDir::new(ui_dir.join("static")))
        .fallback_service(ServeDir::new(ui_dir))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the lifecycle handle fires.
pub async fn serve(
    state: AppState,
    ui_dir: PathBuf,
    port: u16,
    token: CancellationToken,
) -> Result<()> {
    let app = router(state, ui_dir);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "server is running");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;
    Ok(())
}

async fn post_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> std::result::Result<Json<Vec<RankedDoc>>, ApiError> {
    run_query(state, request.query).await
}

async fn get_query(
    State(state): State<AppState>,
    Path(terms): Path<String>,
) -> std::result::Result<Json<Vec<RankedDoc>>, ApiError> {
    run_query(state, normalize_terms(&terms)).await
}

async fn get_wordlist(
    State(state): State<AppState>,
    Path(prefix): Path<String>,
) -> std::result::Result<Json<Vec<String>>, ApiError> {
    let words = word_list(&state.store, &prefix)?;
    Ok(Json(words))
}

/// Hyphens in the path form of a query are spaces.
fn normalize_terms(terms: &str) -> String {
    terms.replace('-', " ")
}

/// Cache-checked retrieval; the pipeline blocks, so it runs off the executor.
async fn run_query(
    state: AppState,
    query: String,
) -> std::result::Result<Json<Vec<RankedDoc>>, ApiError> {
    tracing::info!(query = %query, "querying terms");
    let timer = Instant::now();

    if let Some(hit) = state.cache.get(&query) {
        return Ok(Json((*hit).clone()));
    }

    let retriever = Arc::clone(&state.retriever);
    let owned_query = query.clone();
    let results = tokio::task::spawn_blocking(move || retriever.retrieve(&owned_query))
        .await
        .map_err(|err| Error::new(ErrorKind::Internal, format!("retrieval task: {}", err)))??;

    let shared = state.cache.put(query, results);
    tracing::info!(elapsed_ms = timer.elapsed().as_millis() as u64, "query processed");
    Ok(Json((*shared).clone()))
}
