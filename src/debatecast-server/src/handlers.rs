use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use debatecast_core::{PipelineError, audio_content_type, list_audio_files};
use serde::Deserialize;
use serde_json::json;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TopicRequest {
    #[serde(default)]
    pub topic: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "success": false, "error": message.into() })),
    )
        .into_response()
}

fn analyze_error(error: PipelineError) -> Response {
    match error {
        PipelineError::Validation(message) => error_response(StatusCode::BAD_REQUEST, message),
        e @ (PipelineError::MissingConfig(_)
        | PipelineError::OpenAIError(_)
        | PipelineError::Http(_)
        | PipelineError::Upstream { .. }) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("API request failed: {}", e),
        ),
        e => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error analyzing topic: {}", e),
        ),
    }
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn trending_topics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.pipeline.trending_topics().await)
}

pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TopicRequest>,
) -> Response {
    match state.pipeline.analyze(&request.topic).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "analyze request failed");
            analyze_error(e)
        }
    }
}

pub async fn audio_files(State(state): State<Arc<AppState>>) -> Response {
    match list_audio_files(&state.audio_dir) {
        Ok(files) => Json(json!({ "audio_files": files })).into_response(),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error listing audio files: {}", e),
        ),
    }
}

pub async fn audio_file(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Response {
    if filename.is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains("..")
    {
        return error_response(StatusCode::BAD_REQUEST, "Invalid filename");
    }
    let Some(content_type) = audio_content_type(&filename) else {
        return error_response(StatusCode::NOT_FOUND, "Audio file not found");
    };

    match tokio::fs::read(state.audio_dir.join(&filename)).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type)], bytes).into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            error_response(StatusCode::NOT_FOUND, "Audio file not found")
        }
        Err(e) => {
            tracing::error!(%filename, error = %e, "failed to read audio file");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error reading audio file: {}", e),
            )
        }
    }
}
