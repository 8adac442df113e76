use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use connect4::{
    Algorithm, GameError, GameSnapshot, MoveOutcome, Participant, Player, Score,
    SearchOutcome, UndoOutcome, WireGrid,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::registry::{GameOptions, Registry, ServiceError};

pub fn app_router(registry: Arc<Registry>) -> Router {
    let api = Router::new()
        .route("/games", post(create_game))
        .route("/games/:id", get(get_game))
        .route("/games/:id/moves", post(submit_move))
        .route("/games/:id/undo", post(undo_move))
        .route("/games/:id/ai-move", get(ai_move))
        .route("/analyze", post(analyze))
        .with_state(registry);
    Router::new()
        .nest("/api", api)
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST])
                .allow_origin(HeaderValue::from_static("*"))
                .allow_headers([header::CONTENT_TYPE]),
        )
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Deserialize)]
struct CreateGameBody {
    players: [Participant; 2],
    #[serde(flatten)]
    options: GameOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GameView {
    id: Uuid,
    #[serde(flatten)]
    snapshot: GameSnapshot,
}

#[derive(Debug, Deserialize)]
struct MoveBody {
    player: String,
    column: usize,
    row: usize,
}

#[derive(Debug, Deserialize)]
struct UndoBody {
    player: String,
}

#[derive(Debug, Serialize)]
struct AiMoveView {
    column: usize,
    row: usize,
    score: Score,
}

impl From<SearchOutcome> for AiMoveView {
    fn from(outcome: SearchOutcome) -> Self {
        Self {
            column: outcome.column,
            row: outcome.row,
            score: outcome.score,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzeBody {
    board: WireGrid,
    player: Player,
    #[serde(default = "default_algorithm")]
    algorithm: Algorithm,
    #[serde(default)]
    depth: Option<u8>,
}

fn default_algorithm() -> Algorithm {
    Algorithm::AlphaBeta
}

async fn create_game(
    State(registry): State<Arc<Registry>>,
    Json(body): Json<CreateGameBody>,
) -> Result<impl IntoResponse, ApiError> {
    let (id, snapshot) = registry.create_game(body.players, body.options)?;
    Ok((StatusCode::CREATED, Json(GameView { id, snapshot })))
}

async fn get_game(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
) -> Result<Json<GameView>, ApiError> {
    let snapshot = registry.snapshot(id).await?;
    Ok(Json(GameView { id, snapshot }))
}

async fn submit_move(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
    Json(body): Json<MoveBody>,
) -> Result<Json<MoveOutcome>, ApiError> {
    let outcome = registry
        .submit_move(id, &body.player, body.column, body.row)
        .await?;
    Ok(Json(outcome))
}

async fn undo_move(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
    Json(body): Json<UndoBody>,
) -> Result<Json<UndoOutcome>, ApiError> {
    Ok(Json(registry.undo_move(id, &body.player).await?))
}

async fn ai_move(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = registry.request_ai_move(id).await?;
    let headers = [(header::CACHE_CONTROL, "no-store")];
    Ok((headers, Json(AiMoveView::from(outcome))))
}

async fn analyze(
    State(registry): State<Arc<Registry>>,
    Json(body): Json<AnalyzeBody>,
) -> Result<Json<SearchOutcome>, ApiError> {
    let outcome = registry
        .analyze(body.board, body.player, body.algorithm, body.depth)
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

#[derive(Debug)]
pub struct ApiError(ServiceError);

impl<E: Into<ServiceError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            ServiceError::GameNotFound(_) => (StatusCode::NOT_FOUND, "GameNotFound"),
            ServiceError::Game(err) => {
                let status = match err {
                    GameError::NotYourTurn { .. }
                    | GameError::GameNotInProgress { .. }
                    | GameError::NoMovesToUndo
                    | GameError::CannotUndoMove { .. } => StatusCode::CONFLICT,
                    _ => StatusCode::BAD_REQUEST,
                };
                (status, err.kind())
            }
            ServiceError::Config(_) => (StatusCode::BAD_REQUEST, "InvalidConfig"),
            ServiceError::Worker(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        let body = ErrorBody {
            kind,
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
