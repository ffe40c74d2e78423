use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::json;

use crate::{
    batch_service::BatchService,
    errors::{ApiError, ErrorContext},
    models::{AcceptedResponse, BatchResult, Question},
};

// Import logging macros
use crate::{log_api_error, log_api_start, log_api_success, log_api_warn, log_service_error};

/// Settings the gateway needs at request time, threaded in explicitly
/// instead of read from ambient globals.
#[derive(Debug, Clone, Serialize)]
pub struct GatewaySettings {
    pub callback_url: String,
    pub max_parallel_tasks: usize,
    pub max_retries: u32,
}

#[derive(Clone)]
pub struct AppState {
    pub batch_service: BatchService,
    pub settings: GatewaySettings,
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    #[allow(dead_code)]
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

fn reject_empty_batch(
    operation: &str,
    questions: &[Question],
) -> Result<(), (StatusCode, Json<ApiResponse<()>>)> {
    if questions.is_empty() {
        log_api_warn!(operation, "empty question list rejected");
        let error = ApiError::BadRequest("No questions provided".to_string());
        return Err(error.to_response_with_context(ErrorContext::new(operation, "questions")));
    }
    Ok(())
}

/// Accept a batch for background grading and acknowledge immediately.
pub async fn grade_questions(
    State(state): State<AppState>,
    Json(questions): Json<Vec<Question>>,
) -> Result<(StatusCode, Json<AcceptedResponse>), (StatusCode, Json<ApiResponse<()>>)> {
    log_api_start!("grade_batch", question_count = questions.len());
    reject_empty_batch("grade_batch", &questions)?;

    let question_count = questions.len();
    let batch_service = state.batch_service.clone();
    let callback_url = state.settings.callback_url.clone();

    // The response has already been decided; failures past this point can
    // only be logged.
    tokio::spawn(async move {
        if let Err(e) = batch_service
            .process_and_deliver(&questions, &callback_url)
            .await
        {
            log_service_error!("batch_service", "process_and_deliver", error = e);
        }
    });

    log_api_success!(
        "grade_batch",
        question_count = question_count,
        "batch accepted for background grading"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse::new(question_count)),
    ))
}

/// Grade a batch inline and return the full result, including the
/// delivery flag.
pub async fn grade_questions_sync(
    State(state): State<AppState>,
    Json(questions): Json<Vec<Question>>,
) -> Result<Json<BatchResult>, (StatusCode, Json<ApiResponse<()>>)> {
    log_api_start!("grade_batch_sync", question_count = questions.len());
    reject_empty_batch("grade_batch_sync", &questions)?;

    match state
        .batch_service
        .process_and_deliver(&questions, &state.settings.callback_url)
        .await
    {
        Ok(result) => {
            log_api_success!(
                "grade_batch_sync",
                question_count = result.metadata.total_questions,
                "batch graded synchronously"
            );
            Ok(Json(result))
        }
        Err(e) => {
            log_api_error!("grade_batch_sync", error = e, "batch grading failed");
            let error = ApiError::InternalError(e.to_string());
            Err(error.to_response_with_context(ErrorContext::new("grade_batch_sync", "questions")))
        }
    }
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "grading-webhook"
    }))
}

pub async fn service_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "service": "Grading Webhook Server",
        "endpoints": {
            "POST /grade": "Submit questions for async grading (returns immediately)",
            "POST /grade/sync": "Submit questions for sync grading (waits for results)",
            "GET /health": "Health check"
        },
        "config": {
            "max_parallel_tasks": state.settings.max_parallel_tasks,
            "max_retries": state.settings.max_retries,
            "webhook_url": state.settings.callback_url
        }
    }))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
        .route("/grade", post(grade_questions))
        .route("/grade/sync", post(grade_questions_sync))
        .with_state(state)
}
