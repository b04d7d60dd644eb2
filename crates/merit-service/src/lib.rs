#![deny(unsafe_code)]

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use merit_adapters::{
    starter_skill_tree, starter_store_items, FixtureClassRoster, FixtureLessonCatalog,
};
use merit_core::{
    ArtifactKind, MeritEngine, MeritEngineConfig, MeritError, ProgressionPolicy, ReviewDecision,
    StoreConfig, Submission, SystemClock,
};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub storage: StoreConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            storage: StoreConfig::Memory,
        }
    }
}

#[derive(Clone)]
pub struct ServiceState {
    pub engine: Arc<MeritEngine>,
}

impl ServiceState {
    pub async fn bootstrap(config: ServiceConfig) -> Result<Self, ServiceError> {
        let engine_config = MeritEngineConfig {
            storage: config.storage,
            policy: ProgressionPolicy::default(),
        };
        let engine = MeritEngine::bootstrap(
            engine_config,
            starter_skill_tree(),
            starter_store_items(),
            Arc::new(FixtureLessonCatalog::seeded()),
            Arc::new(FixtureClassRoster::seeded()),
            Arc::new(SystemClock),
        )
        .await?;

        Ok(Self {
            engine: Arc::new(engine),
        })
    }
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/students/:student_id/register", post(register_student))
        .route("/v1/students/:student_id/snapshot", get(get_snapshot))
        .route("/v1/students/:student_id/reset", post(reset_student))
        .route("/v1/students/:student_id/xp", post(grant_xp))
        .route("/v1/students/:student_id/reconcile", post(reconcile_rewards))
        .route("/v1/students/:student_id/login", post(record_login))
        .route("/v1/students/:student_id/streak/repair", post(repair_streak))
        .route(
            "/v1/students/:student_id/streak/accept-break",
            post(accept_streak_break),
        )
        .route(
            "/v1/students/:student_id/skills/:skill_id/unlock",
            post(unlock_skill),
        )
        .route(
            "/v1/students/:student_id/skills/:skill_id/activate",
            post(activate_skill),
        )
        .route("/v1/students/:student_id/catalog", get(class_catalog))
        .route("/v1/students/:student_id/purchase", post(purchase))
        .route("/v1/students/:student_id/use", post(use_item))
        .route(
            "/v1/students/:student_id/quiz/:lesson_id/session",
            get(quiz_session),
        )
        .route(
            "/v1/students/:student_id/quiz/:lesson_id/complete",
            post(complete_quiz),
        )
        .route(
            "/v1/students/:student_id/quiz/:lesson_id/correction",
            post(submit_correction),
        )
        .route("/v1/artifacts/submit", post(submit_artifact))
        .route("/v1/artifacts/:student_id/:artifact_id", get(get_artifact))
        .route(
            "/v1/artifacts/:student_id/:artifact_id/review",
            post(review_artifact),
        )
        .route(
            "/v1/artifacts/:student_id/:artifact_id/vote",
            post(vote_artifact),
        )
        .route(
            "/v1/artifacts/:student_id/:artifact_id/like",
            post(like_artifact),
        )
        .route("/v1/reviews/pending", get(pending_reviews))
        .route("/v1/redemptions/pending", get(pending_redemptions))
        .route(
            "/v1/redemptions/:redemption_id/review",
            post(review_redemption),
        )
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("core engine error: {0}")]
    Core(#[from] MeritError),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error(transparent)]
    Core(#[from] MeritError),
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Http { status, message } => {
                (status, Json(serde_json::json!({ "error": message }))).into_response()
            }
            // A missing progression record means the identity was never
            // bootstrapped here; everything else is an internal fault.
            ApiError::Core(err @ MeritError::UnknownStudent(_)) => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": err.to_string() })),
            )
                .into_response(),
            ApiError::Core(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": err.to_string() })),
            )
                .into_response(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    storage_backend: String,
}

async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "merit-service",
        storage_backend: state.engine.storage_backend().await,
    })
}

async fn register_student(
    Path(student_id): Path<String>,
    State(state): State<ServiceState>,
) -> Result<Response, ApiError> {
    Ok(Json(state.engine.register_student(&student_id).await?).into_response())
}

async fn get_snapshot(
    Path(student_id): Path<String>,
    State(state): State<ServiceState>,
) -> Result<Response, ApiError> {
    Ok(Json(state.engine.snapshot(&student_id).await?).into_response())
}

async fn reset_student(
    Path(student_id): Path<String>,
    State(state): State<ServiceState>,
) -> Result<Response, ApiError> {
    Ok(Json(state.engine.reset_student(&student_id).await?).into_response())
}

#[derive(Debug, Deserialize)]
struct GrantXpRequest {
    amount: u64,
}

async fn grant_xp(
    Path(student_id): Path<String>,
    State(state): State<ServiceState>,
    Json(request): Json<GrantXpRequest>,
) -> Result<Response, ApiError> {
    Ok(Json(state.engine.grant_xp(&student_id, request.amount).await?).into_response())
}

async fn reconcile_rewards(
    Path(student_id): Path<String>,
    State(state): State<ServiceState>,
) -> Result<Response, ApiError> {
    Ok(Json(state.engine.reconcile_rewards(&student_id).await?).into_response())
}

async fn record_login(
    Path(student_id): Path<String>,
    State(state): State<ServiceState>,
) -> Result<Response, ApiError> {
    Ok(Json(state.engine.record_login(&student_id).await?).into_response())
}

async fn repair_streak(
    Path(student_id): Path<String>,
    State(state): State<ServiceState>,
) -> Result<Response, ApiError> {
    Ok(Json(state.engine.repair_streak(&student_id).await?).into_response())
}

async fn accept_streak_break(
    Path(student_id): Path<String>,
    State(state): State<ServiceState>,
) -> Result<Response, ApiError> {
    Ok(Json(state.engine.accept_streak_break(&student_id).await?).into_response())
}

async fn unlock_skill(
    Path((student_id, skill_id)): Path<(String, String)>,
    State(state): State<ServiceState>,
) -> Result<Response, ApiError> {
    Ok(Json(state.engine.unlock_skill(&student_id, &skill_id).await?).into_response())
}

async fn activate_skill(
    Path((student_id, skill_id)): Path<(String, String)>,
    State(state): State<ServiceState>,
) -> Result<Response, ApiError> {
    Ok(Json(state.engine.activate_skill(&student_id, &skill_id).await?).into_response())
}

#[derive(Debug, Deserialize)]
struct ClassQuery {
    class_id: String,
}

async fn class_catalog(
    Path(student_id): Path<String>,
    State(state): State<ServiceState>,
    Query(query): Query<ClassQuery>,
) -> Result<Response, ApiError> {
    Ok(Json(
        state
            .engine
            .catalog_for_class(&query.class_id, &student_id)
            .await?,
    )
    .into_response())
}

#[derive(Debug, Deserialize)]
struct PurchaseRequest {
    class_id: String,
    item_id: String,
}

async fn purchase(
    Path(student_id): Path<String>,
    State(state): State<ServiceState>,
    Json(request): Json<PurchaseRequest>,
) -> Result<Response, ApiError> {
    Ok(Json(
        state
            .engine
            .purchase(&student_id, &request.class_id, &request.item_id)
            .await?,
    )
    .into_response())
}

#[derive(Debug, Deserialize)]
struct UseItemRequest {
    item_id: String,
}

async fn use_item(
    Path(student_id): Path<String>,
    State(state): State<ServiceState>,
    Json(request): Json<UseItemRequest>,
) -> Result<Response, ApiError> {
    Ok(Json(state.engine.use_item(&student_id, &request.item_id).await?).into_response())
}

async fn quiz_session(
    Path((student_id, lesson_id)): Path<(String, String)>,
    State(state): State<ServiceState>,
) -> Result<Response, ApiError> {
    let plan = state
        .engine
        .quiz_session(&student_id, &lesson_id)
        .await?
        .ok_or_else(|| ApiError::Http {
            status: StatusCode::NOT_FOUND,
            message: format!("unknown lesson '{lesson_id}'"),
        })?;
    Ok(Json(plan).into_response())
}

#[derive(Debug, Deserialize)]
struct CompleteQuizRequest {
    score: u32,
    #[serde(default)]
    wrong_question_ids: BTreeSet<String>,
}

async fn complete_quiz(
    Path((student_id, lesson_id)): Path<(String, String)>,
    State(state): State<ServiceState>,
    Json(request): Json<CompleteQuizRequest>,
) -> Result<Response, ApiError> {
    let record = state
        .engine
        .complete_quiz(
            &student_id,
            &lesson_id,
            request.score,
            request.wrong_question_ids,
        )
        .await?
        .ok_or_else(|| ApiError::Http {
            status: StatusCode::NOT_FOUND,
            message: format!("unknown lesson '{lesson_id}'"),
        })?;
    Ok(Json(record).into_response())
}

#[derive(Debug, Deserialize)]
struct CorrectionRequest {
    question_id: String,
    correct: bool,
}

async fn submit_correction(
    Path((student_id, lesson_id)): Path<(String, String)>,
    State(state): State<ServiceState>,
    Json(request): Json<CorrectionRequest>,
) -> Result<Response, ApiError> {
    Ok(Json(
        state
            .engine
            .submit_correction(
                &student_id,
                &lesson_id,
                &request.question_id,
                request.correct,
            )
            .await?,
    )
    .into_response())
}

#[derive(Debug, Deserialize)]
struct SubmitArtifactRequest {
    kind: ArtifactKind,
    author_id: String,
    lesson_id: String,
    content: String,
    #[serde(default)]
    draft: bool,
}

async fn submit_artifact(
    State(state): State<ServiceState>,
    Json(request): Json<SubmitArtifactRequest>,
) -> Result<Response, ApiError> {
    let submission = Submission {
        kind: request.kind,
        author_id: request.author_id,
        lesson_id: request.lesson_id,
        content: request.content,
    };
    let receipt = if request.draft {
        state.engine.save_draft(submission).await?
    } else {
        state.engine.submit_artifact(submission).await?
    };
    Ok(Json(receipt).into_response())
}

async fn get_artifact(
    Path((student_id, artifact_id)): Path<(String, String)>,
    State(state): State<ServiceState>,
) -> Result<Response, ApiError> {
    let artifact = state
        .engine
        .artifact(&student_id, &artifact_id)
        .await?
        .ok_or_else(|| ApiError::Http {
            status: StatusCode::NOT_FOUND,
            message: format!("unknown artifact '{artifact_id}'"),
        })?;
    Ok(Json(artifact).into_response())
}

#[derive(Debug, Deserialize)]
struct ReviewRequest {
    revision: u64,
    decision: ReviewDecision,
    feedback: Option<String>,
}

async fn review_artifact(
    Path((student_id, artifact_id)): Path<(String, String)>,
    State(state): State<ServiceState>,
    Json(request): Json<ReviewRequest>,
) -> Result<Response, ApiError> {
    Ok(Json(
        state
            .engine
            .review_artifact(
                &student_id,
                &artifact_id,
                request.revision,
                request.decision,
                request.feedback,
            )
            .await?,
    )
    .into_response())
}

#[derive(Debug, Deserialize)]
struct SocialRequest {
    user_id: String,
}

async fn vote_artifact(
    Path((student_id, artifact_id)): Path<(String, String)>,
    State(state): State<ServiceState>,
    Json(request): Json<SocialRequest>,
) -> Result<Response, ApiError> {
    Ok(Json(
        state
            .engine
            .vote_artifact(&student_id, &artifact_id, &request.user_id)
            .await?,
    )
    .into_response())
}

async fn like_artifact(
    Path((student_id, artifact_id)): Path<(String, String)>,
    State(state): State<ServiceState>,
    Json(request): Json<SocialRequest>,
) -> Result<Response, ApiError> {
    Ok(Json(
        state
            .engine
            .like_artifact(&student_id, &artifact_id, &request.user_id)
            .await?,
    )
    .into_response())
}

async fn pending_reviews(
    State(state): State<ServiceState>,
    Query(query): Query<ClassQuery>,
) -> Result<Response, ApiError> {
    if query.class_id.trim().is_empty() {
        return Err(ApiError::bad_request("class_id is required"));
    }
    Ok(Json(state.engine.pending_reviews(&query.class_id).await?).into_response())
}

#[derive(Debug, Deserialize)]
struct TeacherQuery {
    teacher_id: String,
}

async fn pending_redemptions(
    State(state): State<ServiceState>,
    Query(query): Query<TeacherQuery>,
) -> Result<Response, ApiError> {
    if query.teacher_id.trim().is_empty() {
        return Err(ApiError::bad_request("teacher_id is required"));
    }
    Ok(Json(
        state
            .engine
            .pending_redemptions(&query.teacher_id)
            .await?,
    )
    .into_response())
}

#[derive(Debug, Deserialize)]
struct RedemptionReviewRequest {
    approve: bool,
}

async fn review_redemption(
    Path(redemption_id): Path<String>,
    State(state): State<ServiceState>,
    Json(request): Json<RedemptionReviewRequest>,
) -> Result<Response, ApiError> {
    Ok(Json(
        state
            .engine
            .review_redemption(&redemption_id, request.approve)
            .await?,
    )
    .into_response())
}
