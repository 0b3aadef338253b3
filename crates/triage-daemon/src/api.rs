use crate::config::DaemonConfig;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use ulid::Ulid;

use triage_core::FinalTask;
use triage_extract::HttpExtractor;
use triage_pipeline::{CancellationToken, PipelineError, PipelineRunner, RunOutcome};
use triage_storage::{StoreStats, TaskStore};
use triage_storage_sqlite::SqliteStore;

pub type Runner = PipelineRunner<HttpExtractor, Arc<SqliteStore>>;

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<Runner>,
    pub store: Arc<SqliteStore>,
    pub config: DaemonConfig,
}

impl AppState {
    pub fn new(runner: Arc<Runner>, store: Arc<SqliteStore>, config: DaemonConfig) -> Self {
        Self {
            runner,
            store,
            config,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub transcript: String,
    #[serde(default)]
    pub transcript_id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessResponse {
    Completed { task_id: i64, task: FinalTask },
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct RejectionBody {
    status: &'static str,
    rejection_reason: String,
    rejection_category: &'static str,
}

pub enum ApiError {
    /// Request refused before the pipeline ran.
    BadRequest(String),
    /// Controlled QA rejection, surfaced with its reason and category.
    Rejected {
        reason: String,
        category: &'static str,
    },
    /// Pipeline failure. Details are logged, never returned to the caller.
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(reason) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    status: "bad_request",
                    reason: Some(reason),
                }),
            )
                .into_response(),
            ApiError::Rejected { reason, category } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(RejectionBody {
                    status: "rejected",
                    rejection_reason: reason,
                    rejection_category: category,
                }),
            )
                .into_response(),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    status: "error",
                    reason: None,
                }),
            )
                .into_response(),
        }
    }
}

pub async fn process_transcript(
    State(state): State<AppState>,
    Json(req): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>, ApiError> {
    validate_transcript(&req.transcript, state.config.min_transcript_len)?;

    let run_id = Ulid::new();
    info!(%run_id, transcript_len = req.transcript.len(), "processing transcript");

    let outcome = state
        .runner
        .run(&req.transcript, req.transcript_id, &CancellationToken::new())
        .await
        .map_err(|e| match e {
            PipelineError::Cancelled => {
                info!(%run_id, "run cancelled");
                ApiError::Internal
            }
            other => {
                error!(%run_id, error = %other, "pipeline run failed");
                ApiError::Internal
            }
        })?;

    match outcome {
        RunOutcome::Completed { task_id, task } => {
            info!(%run_id, task_id, "transcript processed");
            Ok(Json(ProcessResponse::Completed { task_id, task }))
        }
        RunOutcome::Rejected { reason, category } => {
            info!(%run_id, category = category.as_str(), "transcript rejected");
            Err(ApiError::Rejected {
                reason,
                category: category.as_str(),
            })
        }
    }
}

/// Liveness including the database: a failing stats query means the store
/// is not usable and the service should report unhealthy.
pub async fn healthz(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    state.store.stats().map_err(|e| {
        error!(error = %e, "health check failed");
        ApiError::Internal
    })?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<StoreStats>, ApiError> {
    state.store.stats().map(Json).map_err(|e| {
        error!(error = %e, "stats query failed");
        ApiError::Internal
    })
}

fn validate_transcript(transcript: &str, min_len: usize) -> Result<(), ApiError> {
    if transcript.trim().len() < min_len {
        return Err(ApiError::BadRequest(format!(
            "transcript must be at least {min_len} characters"
        )));
    }
    Ok(())
}
