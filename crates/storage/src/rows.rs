//! Database row structures for the metadata tables.

use chrono::{DateTime, Utc};
use scaleodm_models::{Cluster, JobMetadata, JobStatus, JobType};
use sqlx::FromRow;
use std::collections::BTreeMap;

/// Row of `scaleodm_job_metadata`.
#[derive(Debug, FromRow)]
pub struct JobRow {
    pub id: i64,
    pub cluster_url: String,
    pub workflow_name: String,
    pub odm_project_id: String,
    pub job_type: String,
    pub job_status: String,
    pub read_s3_path: String,
    pub write_s3_path: String,
    pub odm_flags: serde_json::Value,
    pub s3_region: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl From<JobRow> for JobMetadata {
    fn from(row: JobRow) -> Self {
        let odm_flags = row
            .odm_flags
            .as_array()
            .map(|flags| {
                flags
                    .iter()
                    .filter_map(|f| f.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let metadata: BTreeMap<String, serde_json::Value> = row
            .metadata
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        JobMetadata {
            id: row.id,
            cluster_url: row.cluster_url,
            workflow_name: row.workflow_name,
            odm_project_id: row.odm_project_id,
            job_type: JobType::parse(&row.job_type),
            job_status: JobStatus::parse(&row.job_status),
            read_s3_path: row.read_s3_path,
            write_s3_path: row.write_s3_path,
            odm_flags,
            s3_region: row.s3_region,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error_message: row.error_message,
            metadata,
        }
    }
}

/// Row of `scaleodm_clusters`.
#[derive(Debug, FromRow)]
pub struct ClusterRow {
    pub cluster_url: String,
    pub max_concurrent_jobs: i32,
    pub priority_weighting: i32,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl From<ClusterRow> for Cluster {
    fn from(row: ClusterRow) -> Self {
        Cluster {
            cluster_url: row.cluster_url,
            max_concurrent_jobs: row.max_concurrent_jobs,
            priority_weighting: row.priority_weighting,
            last_heartbeat: row.last_heartbeat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_row(flags: serde_json::Value, metadata: Option<serde_json::Value>) -> JobRow {
        JobRow {
            id: 1,
            cluster_url: "http://localhost:31100".into(),
            workflow_name: "odm-pipeline-abc12".into(),
            odm_project_id: "odm-project".into(),
            job_type: "standard".into(),
            job_status: "queued".into(),
            read_s3_path: "s3://bucket/in/".into(),
            write_s3_path: "s3://bucket/in/output/".into(),
            odm_flags: flags,
            s3_region: "us-east-1".into(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            metadata,
        }
    }

    #[test]
    fn flags_decode_from_jsonb_array() {
        let row = job_row(serde_json::json!(["--fast-orthophoto", "--dsm"]), None);
        let job: JobMetadata = row.into();
        assert_eq!(job.odm_flags, vec!["--fast-orthophoto", "--dsm"]);
        assert_eq!(job.job_status, JobStatus::Queued);
        assert_eq!(job.job_type, JobType::Standard);
    }

    #[test]
    fn malformed_flags_decode_as_empty() {
        let row = job_row(serde_json::json!({"not": "an array"}), None);
        let job: JobMetadata = row.into();
        assert!(job.odm_flags.is_empty());
    }

    #[test]
    fn metadata_map_round_trips() {
        let row = job_row(
            serde_json::json!([]),
            Some(serde_json::json!({"argo_namespace": "argo", "progress": "4/4"})),
        );
        let job: JobMetadata = row.into();
        assert_eq!(
            job.metadata.get("argo_namespace"),
            Some(&serde_json::json!("argo"))
        );
    }
}
