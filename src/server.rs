// HTTP service
//
// Routes:
//   GET  /                     greeting
//   GET  /health               liveness, model state, cache reachability
//   GET  /models               registry listing
//   GET  /info                 translator description
//   POST /translate/:direction {text, model?} -> {original, translated, translate_time, cached}
//
// Requests share one translator behind a RwLock. Translation takes a read
// lock; switching the model takes the write lock, so a reload never
// interleaves with in-flight translations.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::{ParrotError, Result, TranslationErrorCode};
use crate::language::Direction;
use crate::registry::ModelDescriptor;
use crate::translator::{TranslationOutcome, Translator, TranslatorInfo};

pub struct AppState {
    translator: RwLock<Translator>,
}

impl AppState {
    pub fn new(translator: Translator) -> Arc<Self> {
        Arc::new(Self {
            translator: RwLock::new(translator),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    pub text: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: Option<String>,
    pub model_loaded: bool,
    /// connected, unreachable or disabled
    pub cache: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub active: Option<String>,
    pub models: Vec<ModelDescriptor>,
}

/// JSON error body: `{"error": {"code": .., "message": ..}}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: u16,
    pub message: String,
}

impl From<ParrotError> for ApiError {
    fn from(err: ParrotError) -> Self {
        let code = err.code();
        let (status, message) = match &err {
            ParrotError::Language(_) | ParrotError::InvalidRequest(_) | ParrotError::Config(_) => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            ParrotError::Translation {
                code: TranslationErrorCode::ModelNotLoaded,
                message,
            } => (StatusCode::SERVICE_UNAVAILABLE, message.clone()),
            ParrotError::Translation { message, .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, message.clone())
            }
            ParrotError::Load { model, message } => {
                warn!("Model load failed for {}: {}", model, message);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    format!("Failed to load model '{}'", model),
                )
            }
            other => {
                warn!("Unhandled error: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    TranslationErrorCode::TranslationFailed.public_message().to_string(),
                )
            }
        };

        Self {
            status,
            code,
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        });
        (self.status, Json(body)).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/models", get(models))
        .route("/info", get(describe))
        .route("/translate/:direction", post(translate))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn serve(translator: Translator, config: &ServerConfig) -> Result<()> {
    let app = router(AppState::new(translator));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Parrot server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Parrot translation service",
        "directions": Direction::all().iter().map(Direction::tag).collect::<Vec<_>>(),
    }))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let translator = state.translator.read().await;

    let cache = match translator.cache() {
        None => "disabled",
        Some(cache) => {
            if cache.is_reachable().await {
                "connected"
            } else {
                "unreachable"
            }
        }
    };

    Json(HealthResponse {
        status: "healthy",
        model: translator.active_model().map(str::to_string),
        model_loaded: translator.is_loaded(),
        cache,
    })
}

async fn models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    let translator = state.translator.read().await;
    Json(ModelsResponse {
        active: translator.active_model().map(str::to_string),
        models: translator.list_models().to_vec(),
    })
}

async fn describe(State(state): State<Arc<AppState>>) -> Json<TranslatorInfo> {
    Json(state.translator.read().await.describe())
}

async fn translate(
    State(state): State<Arc<AppState>>,
    Path(direction): Path<String>,
    Json(request): Json<TranslateRequest>,
) -> std::result::Result<Json<TranslationOutcome>, ApiError> {
    let request_id = Uuid::new_v4();
    let direction: Direction = direction.parse().map_err(|e: ParrotError| ApiError {
        status: StatusCode::NOT_FOUND,
        code: e.code(),
        message: e.to_string(),
    })?;

    info!(%request_id, "Translate request {}", direction.tag());

    if let Some(model) = request.model.as_deref() {
        switch_model(&state, model).await?;
    }

    let translator = state.translator.read().await;
    let outcome = translator
        .get_or_translate(&request.text, direction, &Default::default())
        .await
        .map_err(|e| {
            warn!(%request_id, "Translation failed: {}", e);
            ApiError::from(e)
        })?;

    info!(
        %request_id,
        "Translated {} chars in {} (cached: {})",
        outcome.original.chars().count(),
        outcome.translate_time,
        outcome.cached
    );
    Ok(Json(outcome))
}

/// Make `model` the active, loaded model. Backing identifiers resolve to
/// their registry key first. The check repeats under the write lock so
/// concurrent requests for the same model load it once.
async fn switch_model(state: &AppState, model: &str) -> std::result::Result<(), ApiError> {
    let key = {
        let translator = state.translator.read().await;
        let key = translator.registry().resolve(model)?.key;
        if translator.active_model() == Some(key.as_str()) && translator.is_loaded() {
            return Ok(());
        }
        key
    };

    let mut translator = state.translator.write().await;
    if translator.active_model() == Some(key.as_str()) {
        translator.ensure_loaded().await?;
    } else {
        info!("Switching model to {}", key);
        translator.load_model(Some(&key), true).await?;
    }
    Ok(())
}
