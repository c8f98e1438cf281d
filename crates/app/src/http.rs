use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use notes_qa_core::{
    Answer, AnswerModel, AnswerService, AskError, CredentialMap, IngestError, KnowledgeStore,
    StudioTask, SubjectKey,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub type NotesService = AnswerService<Box<dyn KnowledgeStore>, Box<dyn AnswerModel>>;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<NotesService>,
    pub credentials: Arc<CredentialMap>,
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/login", post(login))
        .route("/upload", post(upload))
        .route("/ask", post(ask))
        .route("/generate-studio", post(generate_studio))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    UnsupportedMediaType(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("Invalid credentials")]
    Unauthorized,

    #[error("{0}")]
    Multipart(#[from] MultipartError),

    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Multipart(error) => error.status(),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match self {
            Self::Internal(details) => {
                error!(%details, "request failed");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            status: "error",
            message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(error: IngestError) -> Self {
        match error {
            IngestError::MissingField(_)
            | IngestError::MissingFileName(_)
            | IngestError::InvalidArgument(_) => Self::BadRequest(error.to_string()),
            IngestError::UnsupportedFileType(_) => Self::UnsupportedMediaType(error.to_string()),
            error if error.is_extraction_failure() => Self::Unprocessable(error.to_string()),
            error => Self::Internal(error.to_string()),
        }
    }
}

impl From<AskError> for ApiError {
    fn from(error: AskError) -> Self {
        match error {
            AskError::MissingField(_) | AskError::InvalidArgument(_) => {
                Self::BadRequest(error.to_string())
            }
            AskError::Store(_) => Self::Internal(error.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    status: &'static str,
    user: String,
}

async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(request) = payload?;
    let user = state
        .credentials
        .verify(&request.username, &request.password)
        .ok_or(ApiError::Unauthorized)?;

    info!(%user, "login");
    Ok(Json(LoginResponse {
        status: "success",
        user,
    }))
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    status: &'static str,
    message: String,
    file_name: String,
    segments: usize,
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut user = None;
    let mut subject = None;
    let mut file = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "user" => user = Some(field.text().await?),
            "subject" => subject = Some(field.text().await?),
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                file = Some((file_name, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let key = SubjectKey::new(user.as_deref(), subject.as_deref().unwrap_or_default());
    if key.subject.is_empty() {
        return Err(IngestError::MissingField("subject").into());
    }
    let (file_name, bytes) = file.ok_or(IngestError::MissingField("file"))?;

    let report = state.service.ingest(&key, &file_name, bytes).await?;

    Ok(Json(UploadResponse {
        status: "success",
        message: format!("Added {} to {}", report.file_name, key.subject),
        file_name: report.file_name,
        segments: report.segments,
    }))
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    user: Option<String>,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    question: String,
}

async fn ask(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<Answer>, ApiError> {
    let Json(request) = payload?;
    let key = SubjectKey::new(request.user.as_deref(), &request.subject);
    let answer = state.service.ask(&key, &request.question).await?;
    Ok(Json(answer))
}

#[derive(Debug, Deserialize)]
struct StudioRequest {
    user: Option<String>,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    task: String,
}

async fn generate_studio(
    State(state): State<AppState>,
    payload: Result<Json<StudioRequest>, JsonRejection>,
) -> Result<Json<Answer>, ApiError> {
    let Json(request) = payload?;
    if request.task.trim().is_empty() {
        return Err(AskError::MissingField("task").into());
    }
    let task = request.task.parse::<StudioTask>()?;
    let key = SubjectKey::new(request.user.as_deref(), &request.subject);
    let answer = state.service.generate_studio(&key, task).await?;
    Ok(Json(answer))
}
