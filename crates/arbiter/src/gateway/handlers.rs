//! HTTP route handlers

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use tracing::error;

use crate::config::ConfigError;
use crate::gateway::wire::{
    ExecutePayload, ExecuteResponse, HealthResponse, JudgePayload, JudgeResponse,
    LanguageResponse,
};
use crate::gateway::{ApiError, AppState};
use crate::judge::{JudgeError, JudgeRequest};
use crate::runner::ExecuteError;
use crate::types::{ExecutionRequest, TestCase};

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        supported_languages: state
            .runner
            .config()
            .language_ids()
            .into_iter()
            .map(str::to_owned)
            .collect(),
        uptime: state.started.elapsed().as_secs(),
    })
}

/// GET /languages
pub async fn languages(State(state): State<Arc<AppState>>) -> Json<Vec<LanguageResponse>> {
    let languages = state
        .runner
        .config()
        .sorted_languages()
        .into_iter()
        .map(|(id, lang)| LanguageResponse {
            id: id.to_owned(),
            display_name: lang.name.clone(),
            extension: lang.extension.to_string(),
            default_timeout_ms: lang.default_run_timeout_ms,
        })
        .collect();
    Json(languages)
}

/// POST /execute
pub async fn execute(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ExecutePayload>, JsonRejection>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let Json(payload) = payload.map_err(ApiError::from_rejection)?;
    let submission = validate_submission(&state, payload.language, payload.code, payload.time_limit_ms)?;

    let mut request = ExecutionRequest::new(submission.language, submission.code)
        .with_stdin(payload.input.unwrap_or_default());
    request.timeout_ms = submission.time_limit_ms;

    match state.runner.execute(&request).await {
        Ok(outcome) => Ok(Json(outcome.into())),
        Err(ExecuteError::Config(e)) => Err(config_error(e)),
        Err(e) => {
            error!(error = %e, "execution failed");
            Err(ApiError::internal())
        }
    }
}

/// POST /judge
pub async fn judge(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<JudgePayload>, JsonRejection>,
) -> Result<Json<JudgeResponse>, ApiError> {
    let Json(payload) = payload.map_err(ApiError::from_rejection)?;
    let test_cases: Vec<TestCase> = match payload.test_cases {
        Some(cases) if !cases.is_empty() => cases.into_iter().map(Into::into).collect(),
        _ => return Err(ApiError::bad_request("testCases must be a non-empty array")),
    };
    let submission = validate_submission(&state, payload.language, payload.code, payload.time_limit_ms)?;

    let mut request = JudgeRequest::new(submission.language, submission.code, test_cases);
    request.timeout_ms = submission.time_limit_ms;

    match state.runner.judge(&request).await {
        Ok(verdict) => Ok(Json(verdict.into())),
        Err(JudgeError::Config(e)) => Err(config_error(e)),
        Err(JudgeError::NoTestCases) => {
            Err(ApiError::bad_request("testCases must be a non-empty array"))
        }
        Err(e) => {
            error!(error = %e, "judging failed");
            Err(ApiError::internal())
        }
    }
}

struct Submission {
    language: String,
    code: String,
    time_limit_ms: Option<u64>,
}

/// Check the fields shared by both submission endpoints
fn validate_submission(
    state: &AppState,
    language: Option<String>,
    code: Option<String>,
    time_limit_ms: Option<u64>,
) -> Result<Submission, ApiError> {
    let config = state.runner.config();

    let language = language
        .filter(|l| !l.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("language is required"))?;
    let code = code
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("code is required"))?;

    if code.len() > config.server.max_source_bytes {
        return Err(ApiError::bad_request(format!(
            "code exceeds the maximum of {} bytes",
            config.server.max_source_bytes
        )));
    }

    if let Some(ms) = time_limit_ms
        && !(1..=config.limits.max_run_timeout_ms).contains(&ms)
    {
        return Err(ApiError::bad_request(format!(
            "timeLimitMs must be between 1 and {}",
            config.limits.max_run_timeout_ms
        )));
    }

    config.resolve(&language).map_err(config_error)?;

    Ok(Submission {
        language,
        code,
        time_limit_ms,
    })
}

fn config_error(e: ConfigError) -> ApiError {
    match e {
        ConfigError::UnsupportedLanguage(ref id) => ApiError::new(
            StatusCode::BAD_REQUEST,
            "UNSUPPORTED_LANGUAGE",
            format!("Unsupported language: {id}"),
        ),
        other => {
            error!(error = %other, "configuration error while handling request");
            ApiError::internal()
        }
    }
}
