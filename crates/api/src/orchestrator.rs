//! The task orchestrator: maps NodeODM task operations onto workflow engine
//! operations and the metadata store.

use crate::config::AppConfig;
use crate::reconcile::reconcile_workflow;
use crate::validate;
use chrono::Utc;
use scaleodm_models::{
    JobMetadata, JobStatus, JobType, NodeInfo, S3Credentials, ScaleOdmError, SuccessResponse,
    TaskInfo, TaskListItem, TaskNewRequest, TaskNewResponse, TaskOption, TaskStatus,
    WorkflowPhase, STATUS_CODE_CANCELED,
};
use scaleodm_s3::{CredentialBroker, ObjectStorage};
use scaleodm_storage::MetadataStore;
use scaleodm_workflows::{
    template_for, workflow_name, workflow_phase, PipelineConfig, WorkflowEngine,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub struct TaskOrchestrator {
    store: MetadataStore,
    engine: Arc<dyn WorkflowEngine>,
    broker: CredentialBroker,
    storage: ObjectStorage,
    config: Arc<AppConfig>,
    /// Tasks canceled through this process, reported as CANCELED (50) on
    /// reads. The store keeps `failed`; the distinction does not survive a
    /// restart.
    canceled: RwLock<HashSet<String>>,
}

impl TaskOrchestrator {
    pub fn new(
        store: MetadataStore,
        engine: Arc<dyn WorkflowEngine>,
        broker: CredentialBroker,
        storage: ObjectStorage,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            store,
            engine,
            broker,
            storage,
            config,
            canceled: RwLock::new(HashSet::new()),
        }
    }

    /// Submit a new task: validate, resolve credentials, build and submit the
    /// workflow, then record the metadata row. The engine-assigned workflow
    /// name is the NodeODM UUID.
    pub async fn submit(&self, request: TaskNewRequest) -> Result<TaskNewResponse, ScaleOdmError> {
        let (read_path, write_path) = validate::resolve_paths(&request)?;

        let odm_flags = self.parse_flags(request.options.as_deref())?;

        let project_id = match request.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => "odm-project".to_string(),
        };
        let s3_region = match request.s3_region.as_deref().map(str::trim) {
            Some(region) if !region.is_empty() => region.to_string(),
            _ => "us-east-1".to_string(),
        };

        let provided = match (&request.s3_access_key_id, &request.s3_secret_access_key) {
            (Some(access_key), Some(secret_key))
                if !access_key.is_empty() && !secret_key.is_empty() =>
            {
                let mut creds = S3Credentials::new(access_key, secret_key);
                if let Some(token) = &request.s3_session_token {
                    creds = creds.with_session_token(token.clone());
                }
                Some(creds)
            }
            _ => None,
        };
        let credentials = self.broker.resolve(provided, &s3_region).await?;

        let uuid = self
            .launch_workflow(&project_id, &read_path, &write_path, &odm_flags, &s3_region, credentials)
            .await?;

        info!(
            workflow = %uuid,
            project = %project_id,
            read_path = %read_path,
            write_path = %write_path,
            "task submitted"
        );

        Ok(TaskNewResponse { uuid })
    }

    /// Build and submit a workflow, then record its metadata row. A metadata
    /// insert failure is logged but does not fail the submission: the
    /// workflow is already running.
    async fn launch_workflow(
        &self,
        project_id: &str,
        read_path: &str,
        write_path: &str,
        odm_flags: &[String],
        s3_region: &str,
        credentials: S3Credentials,
    ) -> Result<String, ScaleOdmError> {
        let mut pipeline = PipelineConfig::new(
            project_id,
            read_path,
            write_path,
            odm_flags.to_vec(),
            credentials,
            &self.config.odm_image,
        );
        pipeline.s3_region = s3_region.to_string();
        pipeline.s3_endpoint = self.config.s3_endpoint.clone();

        let template = template_for(JobType::Standard)?;
        let workflow = template.build(&pipeline);
        let created = self.engine.submit(workflow).await?;
        let uuid = workflow_name(&created).to_string();

        if let Err(e) = self
            .store
            .create_job(
                &self.config.cluster_url,
                &uuid,
                project_id,
                read_path,
                write_path,
                odm_flags,
                s3_region,
            )
            .await
        {
            warn!(workflow = %uuid, error = %e, "failed to record job metadata");
        }

        Ok(uuid)
    }

    /// Task info built from the metadata row, reconciled against the engine
    /// when it still knows the workflow. The engine being unreachable never
    /// fails this read.
    pub async fn info(
        &self,
        uuid: &str,
        with_output: usize,
    ) -> Result<TaskInfo, ScaleOdmError> {
        let mut job = self
            .store
            .get_job(uuid)
            .await?
            .ok_or_else(|| ScaleOdmError::TaskNotFound {
                uuid: uuid.to_string(),
            })?;

        match self.engine.get(uuid).await {
            Ok(workflow) => {
                reconcile_workflow(&self.store, &workflow).await;
                // Re-read so the response reflects the reconciled row; keep
                // the stale copy if the re-read fails.
                match self.store.get_job(uuid).await {
                    Ok(Some(fresh)) => job = fresh,
                    Ok(None) => {}
                    Err(e) => warn!(workflow = uuid, error = %e, "failed to re-read job after reconcile"),
                }
            }
            Err(ScaleOdmError::WorkflowNotFound { .. }) => {}
            Err(e) => warn!(workflow = uuid, error = %e, "engine unreachable during info read"),
        }

        let mut task_info = self.to_task_info(&job).await;

        if with_output > 0 {
            match self.assemble_output(&job).await {
                Ok(output) => {
                    let lines: Vec<&str> = output.split('\n').collect();
                    // A cursor at or past the end leaves the field unset.
                    if with_output < lines.len() {
                        task_info.output =
                            Some(lines[with_output..].iter().map(|s| s.to_string()).collect());
                    }
                }
                Err(e) => warn!(workflow = uuid, error = %e, "failed to fetch console output"),
            }
        }

        Ok(task_info)
    }

    /// Every workflow the engine currently knows. Workflows the engine has
    /// reaped disappear from this list but stay readable via `info`.
    pub async fn list(
        &self,
        phase: Option<WorkflowPhase>,
    ) -> Result<Vec<TaskListItem>, ScaleOdmError> {
        let workflows = self.engine.list().await?;
        Ok(workflows
            .iter()
            .filter(|wf| phase.map_or(true, |p| workflow_phase(wf) == p))
            .map(|wf| TaskListItem {
                uuid: workflow_name(wf).to_string(),
            })
            .collect())
    }

    /// Console output from live pods, or from the S3 archive once the engine
    /// has garbage-collected the workflow. `line` skips that many leading
    /// lines.
    pub async fn output(&self, uuid: &str, line: usize) -> Result<String, ScaleOdmError> {
        let job = self
            .store
            .get_job(uuid)
            .await?
            .ok_or_else(|| ScaleOdmError::TaskNotFound {
                uuid: uuid.to_string(),
            })?;

        let output = self.assemble_output(&job).await?;
        if line == 0 {
            return Ok(output);
        }
        // split keeps a trailing empty segment, so line cursors index the
        // output exactly as NodeODM clients expect.
        let lines: Vec<&str> = output.split('\n').collect();
        if line < lines.len() {
            return Ok(lines[line..].join("\n"));
        }
        Ok(output)
    }

    async fn assemble_output(&self, job: &JobMetadata) -> Result<String, ScaleOdmError> {
        let engine_error = match self.engine.get(&job.workflow_name).await {
            Ok(workflow) => return self.engine.pod_logs(&workflow).await,
            Err(e) => e,
        };

        self.storage
            .fetch_workflow_logs(&job.write_s3_path)
            .await
            .map_err(|s3_error| ScaleOdmError::LogRetrieval {
                reason: format!(
                    "workflow logs unavailable from engine ({engine_error}) and S3 ({s3_error})"
                ),
            })
    }

    /// Cancel a task: delete the engine object, then record the failure in
    /// metadata. A missing engine object is a 404, also on repeat calls.
    pub async fn cancel(&self, uuid: &str) -> Result<SuccessResponse, ScaleOdmError> {
        self.engine.delete(uuid).await?;

        if let Err(e) = self
            .store
            .update_job_status(uuid, JobStatus::Failed, None)
            .await
        {
            warn!(workflow = uuid, error = %e, "failed to update job status after cancel");
        }

        self.canceled.write().await.insert(uuid.to_string());
        info!(workflow = uuid, "task canceled");
        Ok(SuccessResponse { success: true })
    }

    /// Remove a task: delete the engine object (ignoring "not found") and
    /// drop the metadata row.
    pub async fn remove(&self, uuid: &str) -> Result<SuccessResponse, ScaleOdmError> {
        self.store
            .get_job(uuid)
            .await?
            .ok_or_else(|| ScaleOdmError::TaskNotFound {
                uuid: uuid.to_string(),
            })?;

        match self.engine.delete(uuid).await {
            Ok(()) | Err(ScaleOdmError::WorkflowNotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        if let Err(e) = self.store.delete_job(uuid).await {
            warn!(workflow = uuid, error = %e, "failed to delete job metadata");
        }

        self.canceled.write().await.remove(uuid);
        info!(workflow = uuid, "task removed");
        Ok(SuccessResponse { success: true })
    }

    /// Restart a task as a fresh workflow, reusing the stored flags unless
    /// new options are supplied. The new engine-assigned name replaces the
    /// old UUID.
    pub async fn restart(
        &self,
        uuid: &str,
        options: Option<&str>,
    ) -> Result<SuccessResponse, ScaleOdmError> {
        let job = self
            .store
            .get_job(uuid)
            .await?
            .ok_or_else(|| ScaleOdmError::TaskNotFound {
                uuid: uuid.to_string(),
            })?;

        let odm_flags = match options {
            Some(raw) if !raw.trim().is_empty() => self.parse_flags(Some(raw))?,
            _ => {
                if job.odm_flags.is_empty() {
                    validate::default_flags()
                } else {
                    job.odm_flags.clone()
                }
            }
        };

        match self.engine.delete(uuid).await {
            Ok(()) | Err(ScaleOdmError::WorkflowNotFound { .. }) => {}
            Err(e) => warn!(workflow = uuid, error = %e, "failed to delete old workflow"),
        }
        if let Err(e) = self.store.delete_job(uuid).await {
            warn!(workflow = uuid, error = %e, "failed to delete old job metadata");
        }

        // Request credentials are gone; resolve fresh ones from the
        // environment for the replacement workflow.
        let credentials = self.broker.resolve(None, &job.s3_region).await?;
        let new_uuid = self
            .launch_workflow(
                &job.odm_project_id,
                &job.read_s3_path,
                &job.write_s3_path,
                &odm_flags,
                &job.s3_region,
                credentials,
            )
            .await?;

        self.canceled.write().await.remove(uuid);
        info!(workflow = uuid, replacement = %new_uuid, "task restarted");
        Ok(SuccessResponse { success: true })
    }

    /// Where a task's asset lives in S3; direct download is not implemented.
    pub async fn download_location(
        &self,
        uuid: &str,
        asset: &str,
    ) -> Result<String, ScaleOdmError> {
        let job = self
            .store
            .get_job(uuid)
            .await?
            .ok_or_else(|| ScaleOdmError::TaskNotFound {
                uuid: uuid.to_string(),
            })?;
        Ok(format!("{}{}", job.write_s3_path, asset))
    }

    /// Node info for `GET /info`. The queue count is best-effort: the number
    /// of engine workflows still pending or running, 0 when the engine is
    /// unreachable.
    pub async fn node_info(&self) -> NodeInfo {
        let task_queue_count = match self.engine.list().await {
            Ok(workflows) => workflows
                .iter()
                .filter(|wf| {
                    matches!(
                        workflow_phase(wf),
                        WorkflowPhase::Pending | WorkflowPhase::Running
                    )
                })
                .count(),
            Err(e) => {
                warn!(error = %e, "failed to list workflows for node info");
                0
            }
        };

        NodeInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            task_queue_count,
            max_images: None,
            engine: "odm".to_string(),
            engine_version: self.config.odm_image.clone(),
        }
    }

    fn parse_flags(&self, options: Option<&str>) -> Result<Vec<String>, ScaleOdmError> {
        let flags = match options {
            Some(raw) if !raw.trim().is_empty() => {
                let options = validate::parse_options(raw)?;
                validate::options_to_flags(&options)
            }
            _ => Vec::new(),
        };
        if flags.is_empty() {
            return Ok(validate::default_flags());
        }
        Ok(flags)
    }

    async fn to_task_info(&self, job: &JobMetadata) -> TaskInfo {
        let processing_time = job
            .started_at
            .map(|started| {
                let end = job.completed_at.unwrap_or_else(Utc::now);
                (end - started).num_milliseconds()
            })
            .unwrap_or(0);

        let canceled_here =
            job.job_status == JobStatus::Failed && self.canceled.read().await.contains(&job.workflow_name);
        let code = if canceled_here {
            STATUS_CODE_CANCELED
        } else {
            job.job_status.status_code()
        };

        let options: Vec<TaskOption> = validate::flags_to_options(&job.odm_flags);

        TaskInfo {
            uuid: job.workflow_name.clone(),
            name: job.odm_project_id.clone(),
            date_created: job.created_at.timestamp(),
            processing_time,
            status: TaskStatus { code },
            options,
            // Image counts are not tracked; NodeODM clients tolerate 0.
            images_count: 0,
            progress: job.job_status.progress(),
            output: None,
        }
    }
}
