//! NodeODM task endpoints.

use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tracing::info;

use crate::state::AppState;
use scaleodm_models::{
    ScaleOdmError, SuccessResponse, TaskInfo, TaskListItem, TaskNewRequest, TaskNewResponse,
    TaskRef, TaskRestartRequest,
};

/// Bodies larger than this are rejected; task submissions are small.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Create the router for the NodeODM task endpoints.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/task/new", post(create_task))
        .route("/task/list", get(list_tasks))
        .route("/task/{uuid}/info", get(task_info))
        .route("/task/{uuid}/output", get(task_output))
        .route("/task/{uuid}/download/{asset}", get(download_asset))
        .route("/task/cancel", post(cancel_task))
        .route("/task/remove", post(remove_task))
        .route("/task/restart", post(restart_task))
}

#[derive(Debug, Default, Deserialize)]
pub struct InfoParams {
    #[serde(default)]
    pub with_output: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OutputParams {
    #[serde(default)]
    pub line: Option<usize>,
}

/// `POST /task/new`: accepts JSON or multipart form submissions.
pub async fn create_task(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<TaskNewResponse>, ScaleOdmError> {
    let body = parse_task_new(request).await?;
    info!(
        name = body.name.as_deref().unwrap_or(""),
        read_s3_path = body.read_s3_path.as_deref().unwrap_or(""),
        write_s3_path = body.write_s3_path.as_deref().unwrap_or(""),
        zipurl = body.zipurl.as_deref().unwrap_or(""),
        credentials_provided = body.s3_access_key_id.is_some(),
        "POST /task/new"
    );
    let response = state.orchestrator.submit(body).await?;
    Ok(Json(response))
}

pub async fn list_tasks(
    State(state): State<AppState>,
) -> Result<Json<Vec<TaskListItem>>, ScaleOdmError> {
    let tasks = state.orchestrator.list(None).await?;
    Ok(Json(tasks))
}

pub async fn task_info(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Query(params): Query<InfoParams>,
) -> Result<Json<TaskInfo>, ScaleOdmError> {
    let info = state
        .orchestrator
        .info(&uuid, params.with_output.unwrap_or(0))
        .await?;
    Ok(Json(info))
}

/// `GET /task/{uuid}/output`: plain-text console output, optionally starting
/// from line `line`.
pub async fn task_output(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Query(params): Query<OutputParams>,
) -> Result<String, ScaleOdmError> {
    state
        .orchestrator
        .output(&uuid, params.line.unwrap_or(0))
        .await
}

/// Direct asset download is not implemented; the error names the S3 object
/// clients should fetch instead.
pub async fn download_asset(
    State(state): State<AppState>,
    Path((uuid, asset)): Path<(String, String)>,
) -> Result<(), ScaleOdmError> {
    let location = state.orchestrator.download_location(&uuid, &asset).await?;
    Err(ScaleOdmError::Unsupported {
        operation: format!("direct download not implemented; file available at {location}"),
    })
}

pub async fn cancel_task(
    State(state): State<AppState>,
    Json(body): Json<TaskRef>,
) -> Result<Json<SuccessResponse>, ScaleOdmError> {
    let response = state.orchestrator.cancel(&body.uuid).await?;
    Ok(Json(response))
}

pub async fn remove_task(
    State(state): State<AppState>,
    Json(body): Json<TaskRef>,
) -> Result<Json<SuccessResponse>, ScaleOdmError> {
    let response = state.orchestrator.remove(&body.uuid).await?;
    Ok(Json(response))
}

pub async fn restart_task(
    State(state): State<AppState>,
    Json(body): Json<TaskRestartRequest>,
) -> Result<Json<SuccessResponse>, ScaleOdmError> {
    let response = state
        .orchestrator
        .restart(&body.uuid, body.options.as_deref())
        .await?;
    Ok(Json(response))
}

/// Decode a `POST /task/new` body from either JSON or multipart form data.
async fn parse_task_new(request: Request) -> Result<TaskNewRequest, ScaleOdmError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();

    if content_type.starts_with("multipart/form-data") {
        let mut multipart =
            Multipart::from_request(request, &()).await.map_err(|e| {
                ScaleOdmError::Validation {
                    reason: format!("invalid multipart body: {e}"),
                }
            })?;
        return parse_multipart(&mut multipart).await;
    }

    let bytes = axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|e| ScaleOdmError::Validation {
            reason: format!("failed to read request body: {e}"),
        })?;
    if bytes.is_empty() {
        return Ok(TaskNewRequest::default());
    }
    serde_json::from_slice(&bytes).map_err(|e| ScaleOdmError::Validation {
        reason: format!("invalid request body: {e}"),
    })
}

async fn parse_multipart(multipart: &mut Multipart) -> Result<TaskNewRequest, ScaleOdmError> {
    let mut body = TaskNewRequest::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ScaleOdmError::Validation {
            reason: format!("invalid multipart field: {e}"),
        }
    })? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let value = field.text().await.map_err(|e| ScaleOdmError::Validation {
            reason: format!("unreadable multipart field {name}: {e}"),
        })?;

        match name.as_str() {
            "name" => body.name = Some(value),
            "options" => body.options = Some(value),
            "webhook" => body.webhook = Some(value),
            "skipPostProcessing" => body.skip_post_processing = value.parse().ok(),
            "outputs" => body.outputs = Some(value),
            "zipurl" => body.zipurl = Some(value),
            "readS3Path" => body.read_s3_path = Some(value),
            "writeS3Path" => body.write_s3_path = Some(value),
            "s3AccessKeyID" => body.s3_access_key_id = Some(value),
            "s3SecretAccessKey" => body.s3_secret_access_key = Some(value),
            "s3SessionToken" => body.s3_session_token = Some(value),
            "s3Region" => body.s3_region = Some(value),
            "dateCreated" => body.date_created = value.parse().ok(),
            _ => {}
        }
    }

    Ok(body)
}
