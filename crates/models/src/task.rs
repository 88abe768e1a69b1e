//! Task domain types and the NodeODM wire protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// NodeODM status codes.
pub const STATUS_CODE_QUEUED: i32 = 10;
pub const STATUS_CODE_RUNNING: i32 = 20;
pub const STATUS_CODE_FAILED: i32 = 30;
pub const STATUS_CODE_COMPLETED: i32 = 40;
pub const STATUS_CODE_CANCELED: i32 = 50;

/// Internal job status stored in the metadata table.
///
/// `Claimed` is retained for compatibility with the v1 queue schema but is
/// never written by the orchestrator; it counts as queued everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Claimed,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Claimed => "claimed",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Parse the stored text form. Unknown values read as queued so a row
    /// written by a newer schema never breaks the read path.
    pub fn parse(value: &str) -> JobStatus {
        match value {
            "claimed" => JobStatus::Claimed,
            "running" => JobStatus::Running,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Queued,
        }
    }

    /// NodeODM status code for this status.
    pub fn status_code(&self) -> i32 {
        match self {
            JobStatus::Queued | JobStatus::Claimed => STATUS_CODE_QUEUED,
            JobStatus::Running => STATUS_CODE_RUNNING,
            JobStatus::Completed => STATUS_CODE_COMPLETED,
            JobStatus::Failed => STATUS_CODE_FAILED,
        }
    }

    /// Coarse progress estimate derived from the status alone.
    pub fn progress(&self) -> i32 {
        match self {
            JobStatus::Queued | JobStatus::Claimed => 0,
            JobStatus::Running => 50,
            JobStatus::Completed => 100,
            JobStatus::Failed => 0,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline variant for a task. Only `Standard` has a workflow template;
/// `SplitMerge` is reserved so adding it stays additive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Standard,
    #[serde(rename = "splitmerge")]
    SplitMerge,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Standard => "standard",
            JobType::SplitMerge => "splitmerge",
        }
    }

    pub fn parse(value: &str) -> JobType {
        match value {
            "splitmerge" => JobType::SplitMerge,
            _ => JobType::Standard,
        }
    }
}

/// Workflow engine phases, as reported by Argo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Error,
    Unknown,
}

impl WorkflowPhase {
    pub fn parse(value: &str) -> WorkflowPhase {
        match value {
            "Pending" => WorkflowPhase::Pending,
            "Running" => WorkflowPhase::Running,
            "Succeeded" => WorkflowPhase::Succeeded,
            "Failed" => WorkflowPhase::Failed,
            "Error" => WorkflowPhase::Error,
            _ => WorkflowPhase::Unknown,
        }
    }

    /// Map the engine phase onto the stored job status. An unknown or empty
    /// phase reads as queued, matching a freshly submitted workflow.
    pub fn job_status(&self) -> JobStatus {
        match self {
            WorkflowPhase::Pending | WorkflowPhase::Unknown => JobStatus::Queued,
            WorkflowPhase::Running => JobStatus::Running,
            WorkflowPhase::Succeeded => JobStatus::Completed,
            WorkflowPhase::Failed | WorkflowPhase::Error => JobStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowPhase::Succeeded | WorkflowPhase::Failed | WorkflowPhase::Error
        )
    }
}

/// One row of the task metadata table, the durable record of a task.
#[derive(Debug, Clone, Serialize)]
pub struct JobMetadata {
    pub id: i64,
    pub cluster_url: String,
    pub workflow_name: String,
    pub odm_project_id: String,
    pub job_type: JobType,
    pub job_status: JobStatus,
    pub read_s3_path: String,
    pub write_s3_path: String,
    pub odm_flags: Vec<String>,
    pub s3_region: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// One row of the cluster table.
#[derive(Debug, Clone, Serialize)]
pub struct Cluster {
    pub cluster_url: String,
    pub max_concurrent_jobs: i32,
    pub priority_weighting: i32,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// A processing option as submitted by NodeODM clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOption {
    pub name: String,
    pub value: serde_json::Value,
}

/// Request body for `POST /task/new`. Accepted as JSON or multipart form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskNewRequest {
    pub name: Option<String>,
    /// JSON array of processing options, passed as a string per NodeODM.
    pub options: Option<String>,
    pub webhook: Option<String>,
    pub skip_post_processing: Option<bool>,
    pub outputs: Option<String>,
    /// Legacy image source. Must be an `s3://` prefix; HTTP zips are rejected.
    pub zipurl: Option<String>,
    #[serde(rename = "readS3Path")]
    pub read_s3_path: Option<String>,
    #[serde(rename = "writeS3Path")]
    pub write_s3_path: Option<String>,
    #[serde(rename = "s3AccessKeyID")]
    pub s3_access_key_id: Option<String>,
    #[serde(rename = "s3SecretAccessKey")]
    pub s3_secret_access_key: Option<String>,
    #[serde(rename = "s3SessionToken")]
    pub s3_session_token: Option<String>,
    #[serde(rename = "s3Region")]
    pub s3_region: Option<String>,
    pub date_created: Option<i64>,
}

/// Response body for `POST /task/new`.
#[derive(Debug, Serialize)]
pub struct TaskNewResponse {
    pub uuid: String,
}

/// Entry in the `GET /task/list` response.
#[derive(Debug, Serialize)]
pub struct TaskListItem {
    pub uuid: String,
}

/// Nested status object in `TaskInfo`.
#[derive(Debug, Serialize)]
pub struct TaskStatus {
    pub code: i32,
}

/// Response body for `GET /task/{uuid}/info`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub uuid: String,
    pub name: String,
    /// Seconds since epoch.
    pub date_created: i64,
    /// Milliseconds elapsed since the task started processing.
    pub processing_time: i64,
    pub status: TaskStatus,
    pub options: Vec<TaskOption>,
    pub images_count: i32,
    pub progress: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Vec<String>>,
}

/// Response body for `GET /info`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub version: String,
    pub task_queue_count: usize,
    pub max_images: Option<i32>,
    pub engine: String,
    pub engine_version: String,
}

/// Response body for cancel/remove/restart.
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Request body for `POST /task/cancel` and `POST /task/remove`.
#[derive(Debug, Deserialize)]
pub struct TaskRef {
    pub uuid: String,
}

/// Request body for `POST /task/restart`.
#[derive(Debug, Deserialize)]
pub struct TaskRestartRequest {
    pub uuid: String,
    pub options: Option<String>,
}

/// Response body for `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_is_total_over_job_status() {
        assert_eq!(JobStatus::Queued.status_code(), STATUS_CODE_QUEUED);
        assert_eq!(JobStatus::Claimed.status_code(), STATUS_CODE_QUEUED);
        assert_eq!(JobStatus::Running.status_code(), STATUS_CODE_RUNNING);
        assert_eq!(JobStatus::Completed.status_code(), STATUS_CODE_COMPLETED);
        assert_eq!(JobStatus::Failed.status_code(), STATUS_CODE_FAILED);
    }

    #[test]
    fn phase_maps_to_job_status() {
        assert_eq!(WorkflowPhase::parse("Pending").job_status(), JobStatus::Queued);
        assert_eq!(WorkflowPhase::parse("Running").job_status(), JobStatus::Running);
        assert_eq!(
            WorkflowPhase::parse("Succeeded").job_status(),
            JobStatus::Completed
        );
        assert_eq!(WorkflowPhase::parse("Failed").job_status(), JobStatus::Failed);
        assert_eq!(WorkflowPhase::parse("Error").job_status(), JobStatus::Failed);
        assert_eq!(WorkflowPhase::parse("").job_status(), JobStatus::Queued);
    }

    #[test]
    fn terminal_phases() {
        assert!(WorkflowPhase::Succeeded.is_terminal());
        assert!(WorkflowPhase::Failed.is_terminal());
        assert!(WorkflowPhase::Error.is_terminal());
        assert!(!WorkflowPhase::Pending.is_terminal());
        assert!(!WorkflowPhase::Running.is_terminal());
    }

    #[test]
    fn progress_tracks_status() {
        assert_eq!(JobStatus::Queued.progress(), 0);
        assert_eq!(JobStatus::Running.progress(), 50);
        assert_eq!(JobStatus::Completed.progress(), 100);
        assert_eq!(JobStatus::Failed.progress(), 0);
    }

    #[test]
    fn task_new_request_accepts_nodeodm_field_names() {
        let body = serde_json::json!({
            "name": "survey",
            "readS3Path": "s3://bucket/in",
            "s3AccessKeyID": "key",
            "s3SecretAccessKey": "secret",
            "options": "[{\"name\":\"dsm\",\"value\":true}]"
        });
        let req: TaskNewRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.name.as_deref(), Some("survey"));
        assert_eq!(req.read_s3_path.as_deref(), Some("s3://bucket/in"));
        assert_eq!(req.s3_access_key_id.as_deref(), Some("key"));
        assert!(req.zipurl.is_none());
    }

    #[test]
    fn task_info_serializes_nested_status() {
        let info = TaskInfo {
            uuid: "odm-pipeline-x".into(),
            name: "odm-project".into(),
            date_created: 1_700_000_000,
            processing_time: 0,
            status: TaskStatus {
                code: STATUS_CODE_QUEUED,
            },
            options: vec![],
            images_count: 0,
            progress: 0,
            output: None,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["status"]["code"], 10);
        assert_eq!(json["imagesCount"], 0);
        assert!(json.get("output").is_none());
    }
}
