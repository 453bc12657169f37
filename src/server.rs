// http server mode - run the guard as an api

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::core::{
    Datastore, ReservedWordsInfo, SyntaxHelp, ValidationResult, normalize_name,
    reserved_words_info, validate_sql_comprehensive,
};
use crate::Error;

struct AppState {
    datastore: Datastore,
}

fn yes() -> bool {
    true
}

#[derive(Deserialize)]
struct ValidateRequest {
    sql: String,
    #[serde(default = "yes")]
    require_time_filter: bool,
    #[serde(default = "yes")]
    read_only: bool,
    #[serde(default)]
    database_name: Option<String>,
}

#[derive(Deserialize)]
struct NormalizeRequest {
    name: String,
}

#[derive(Serialize)]
struct NormalizeResponse {
    name: String,
    normalized: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    datastore: Datastore,
}

pub struct Server;

impl Server {
    pub fn router(datastore: Datastore) -> Router {
        let state = Arc::new(AppState { datastore });

        Router::new()
            .route("/health", get(health))
            .route("/validate", post(validate))
            .route("/normalize", post(normalize))
            .route("/reserved-words", get(reserved_words))
            .route("/syntax-help", get(syntax_help))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    pub async fn run(datastore: Datastore, host: &str, port: u16) -> Result<(), Error> {
        let app = Self::router(datastore);

        let addr = format!("{host}:{port}");
        info!(%addr, %datastore, "server running");

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Server(e.to_string()))?;

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Server(e.to_string()))?;

        Ok(())
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        datastore: state.datastore,
    })
}

async fn validate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ValidateRequest>,
) -> (StatusCode, Json<ValidationResult>) {
    let result = validate_sql_comprehensive(
        &req.sql,
        req.require_time_filter,
        req.read_only,
        req.database_name.as_deref(),
        state.datastore,
    );

    let status = if result.valid {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(result))
}

async fn normalize(Json(req): Json<NormalizeRequest>) -> Json<NormalizeResponse> {
    let normalized = normalize_name(&req.name);
    Json(NormalizeResponse {
        name: req.name,
        normalized,
    })
}

async fn reserved_words(State(state): State<Arc<AppState>>) -> Json<ReservedWordsInfo> {
    Json(reserved_words_info(state.datastore))
}

async fn syntax_help(State(state): State<Arc<AppState>>) -> Json<SyntaxHelp> {
    Json(state.datastore.syntax_help())
}
