use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Control-plane errors.
///
/// Failures from the workflow engine, the metadata store, and the credential
/// broker are translated into these variants at each component boundary, so
/// callers match on variants instead of sniffing error strings.
#[derive(Error, Debug)]
pub enum ScaleOdmError {
    #[error("Task not found: {uuid}")]
    TaskNotFound { uuid: String },

    #[error("Workflow not found: {name}")]
    WorkflowNotFound { name: String },

    #[error("Validation error: {reason}")]
    Validation { reason: String },

    #[error("S3 credentials are required: {reason}")]
    CredentialMissing { reason: String },

    #[error("Workflow engine error: {reason}")]
    Engine { reason: String },

    #[error("Workflow engine unavailable: {reason}")]
    EngineUnavailable { reason: String },

    #[error("Metadata store error: {reason}")]
    Store { reason: String },

    #[error("Log retrieval failed: {reason}")]
    LogRetrieval { reason: String },

    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    #[error("Service unavailable: {service}")]
    ServiceUnavailable { service: String },

    #[error("Internal error: {reason}")]
    Internal { reason: String },
}

impl ScaleOdmError {
    /// HTTP status code for the error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ScaleOdmError::TaskNotFound { .. } => StatusCode::NOT_FOUND,
            ScaleOdmError::WorkflowNotFound { .. } => StatusCode::NOT_FOUND,
            ScaleOdmError::Validation { .. } => StatusCode::BAD_REQUEST,
            ScaleOdmError::CredentialMissing { .. } => StatusCode::BAD_REQUEST,
            ScaleOdmError::Unsupported { .. } => StatusCode::BAD_REQUEST,
            ScaleOdmError::Engine { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ScaleOdmError::EngineUnavailable { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ScaleOdmError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ScaleOdmError::LogRetrieval { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ScaleOdmError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ScaleOdmError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Short category label used in structured logs.
    pub fn category(&self) -> &'static str {
        match self {
            ScaleOdmError::TaskNotFound { .. } => "task",
            ScaleOdmError::WorkflowNotFound { .. } => "workflow",
            ScaleOdmError::Validation { .. } => "validation",
            ScaleOdmError::CredentialMissing { .. } => "credentials",
            ScaleOdmError::Engine { .. } => "engine",
            ScaleOdmError::EngineUnavailable { .. } => "engine",
            ScaleOdmError::Store { .. } => "store",
            ScaleOdmError::LogRetrieval { .. } => "logs",
            ScaleOdmError::Unsupported { .. } => "request",
            ScaleOdmError::ServiceUnavailable { .. } => "service",
            ScaleOdmError::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for control-plane operations.
pub type ScaleOdmResult<T> = Result<T, ScaleOdmError>;

/// Error body returned to NodeODM clients.
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ScaleOdmError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kinds() {
        let not_found = ScaleOdmError::TaskNotFound {
            uuid: "odm-pipeline-abc".into(),
        };
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let validation = ScaleOdmError::Validation {
            reason: "readS3Path must be an s3:// path".into(),
        };
        assert_eq!(validation.status_code(), StatusCode::BAD_REQUEST);

        let creds = ScaleOdmError::CredentialMissing {
            reason: "no static credentials".into(),
        };
        assert_eq!(creds.status_code(), StatusCode::BAD_REQUEST);

        let engine = ScaleOdmError::Engine {
            reason: "submit failed".into(),
        };
        assert_eq!(engine.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
