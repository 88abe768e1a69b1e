//! Task metadata operations.

use crate::rows::JobRow;
use crate::{is_deadlock, store_error, MetadataStore};
use scaleodm_models::{JobMetadata, JobStatus, ScaleOdmError};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

const DEADLOCK_RETRIES: u32 = 3;

const JOB_COLUMNS: &str = "id, cluster_url, workflow_name, odm_project_id, job_type, job_status, \
     read_s3_path, write_s3_path, odm_flags, s3_region, created_at, started_at, \
     completed_at, error_message, metadata";

impl MetadataStore {
    /// Record a new task. Fails when the cluster row is missing (foreign key)
    /// or the workflow name is already taken. Retries transparently on
    /// deadlock with a short linear backoff.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_job(
        &self,
        cluster_url: &str,
        workflow_name: &str,
        project_id: &str,
        read_path: &str,
        write_path: &str,
        odm_flags: &[String],
        s3_region: &str,
    ) -> Result<JobMetadata, ScaleOdmError> {
        let flags_json = serde_json::to_value(odm_flags).map_err(|e| ScaleOdmError::Store {
            reason: format!("failed to encode odm_flags: {e}"),
        })?;

        let query = format!(
            "INSERT INTO scaleodm_job_metadata \
             (cluster_url, workflow_name, odm_project_id, read_s3_path, write_s3_path, odm_flags, s3_region) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {JOB_COLUMNS}"
        );

        let mut attempt = 0;
        loop {
            let result = sqlx::query_as::<_, JobRow>(&query)
                .bind(cluster_url)
                .bind(workflow_name)
                .bind(project_id)
                .bind(read_path)
                .bind(write_path)
                .bind(&flags_json)
                .bind(s3_region)
                .fetch_one(&self.pool)
                .await;

            match result {
                Ok(row) => return Ok(row.into()),
                Err(e) if is_deadlock(&e) && attempt < DEADLOCK_RETRIES => {
                    attempt += 1;
                    debug!(workflow = workflow_name, attempt, "deadlock creating job, retrying");
                    tokio::time::sleep(Duration::from_millis(10 * u64::from(attempt))).await;
                }
                Err(e) => {
                    return Err(ScaleOdmError::Store {
                        reason: format!("failed to create job metadata: {e}"),
                    })
                }
            }
        }
    }

    /// Fetch a task by workflow name. `None` is a normal result.
    pub async fn get_job(&self, workflow_name: &str) -> Result<Option<JobMetadata>, ScaleOdmError> {
        let query =
            format!("SELECT {JOB_COLUMNS} FROM scaleodm_job_metadata WHERE workflow_name = $1");

        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(workflow_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(row.map(Into::into))
    }

    /// Transition a task's status.
    ///
    /// `started_at` is set only on the first transition into running and
    /// `completed_at` only on the first transition into completed/failed, so
    /// repeated calls with the same status are observably idempotent for the
    /// timestamp fields. `error_message` is overwritten verbatim.
    pub async fn update_job_status(
        &self,
        workflow_name: &str,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<(), ScaleOdmError> {
        sqlx::query(
            "UPDATE scaleodm_job_metadata \
             SET job_status = $2, \
                 started_at = CASE \
                     WHEN $2 = 'running' AND started_at IS NULL THEN NOW() \
                     ELSE started_at \
                 END, \
                 completed_at = CASE \
                     WHEN $2 IN ('completed', 'failed') AND completed_at IS NULL THEN NOW() \
                     ELSE completed_at \
                 END, \
                 error_message = $3 \
             WHERE workflow_name = $1",
        )
        .bind(workflow_name)
        .bind(status.as_str())
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| ScaleOdmError::Store {
            reason: format!("failed to update job status: {e}"),
        })?;

        Ok(())
    }

    /// Merge engine-derived annotations into the task's metadata document.
    pub async fn update_job_metadata(
        &self,
        workflow_name: &str,
        metadata: &BTreeMap<String, serde_json::Value>,
    ) -> Result<(), ScaleOdmError> {
        let patch = serde_json::to_value(metadata).map_err(|e| ScaleOdmError::Store {
            reason: format!("failed to encode metadata: {e}"),
        })?;

        sqlx::query(
            "UPDATE scaleodm_job_metadata \
             SET metadata = COALESCE(metadata, '{}'::jsonb) || $2 \
             WHERE workflow_name = $1",
        )
        .bind(workflow_name)
        .bind(&patch)
        .execute(&self.pool)
        .await
        .map_err(|e| ScaleOdmError::Store {
            reason: format!("failed to update job metadata: {e}"),
        })?;

        Ok(())
    }

    /// List tasks, newest first, with optional status/project filters.
    pub async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        project_id: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<JobMetadata>, ScaleOdmError> {
        let mut query = format!("SELECT {JOB_COLUMNS} FROM scaleodm_job_metadata WHERE 1=1");
        let mut arg_count = 0;

        if status.is_some() {
            arg_count += 1;
            query.push_str(&format!(" AND job_status = ${arg_count}"));
        }
        if project_id.is_some() {
            arg_count += 1;
            query.push_str(&format!(" AND odm_project_id = ${arg_count}"));
        }
        query.push_str(" ORDER BY created_at DESC");
        if limit.is_some() {
            arg_count += 1;
            query.push_str(&format!(" LIMIT ${arg_count}"));
        }

        let mut q = sqlx::query_as::<_, JobRow>(&query);
        if let Some(status) = status {
            q = q.bind(status.as_str());
        }
        if let Some(project_id) = project_id {
            q = q.bind(project_id.to_string());
        }
        if let Some(limit) = limit {
            q = q.bind(limit);
        }

        let rows = q.fetch_all(&self.pool).await.map_err(store_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Delete a task's metadata row. Errors when the row does not exist.
    pub async fn delete_job(&self, workflow_name: &str) -> Result<(), ScaleOdmError> {
        let result = sqlx::query("DELETE FROM scaleodm_job_metadata WHERE workflow_name = $1")
            .bind(workflow_name)
            .execute(&self.pool)
            .await
            .map_err(|e| ScaleOdmError::Store {
                reason: format!("failed to delete job: {e}"),
            })?;

        if result.rows_affected() == 0 {
            return Err(ScaleOdmError::TaskNotFound {
                uuid: workflow_name.to_string(),
            });
        }

        Ok(())
    }
}
