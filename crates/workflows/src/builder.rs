//! Construction of the ODM pipeline workflow.
//!
//! One template, one shared scratch volume, four containers in a dependency
//! chain: download → process → upload → cleanup. The engine generates the
//! workflow name; that name is the task UUID clients see.

use crate::resource::{ContainerNode, ContainerSetTemplate, Template, Workflow, WorkflowSpec};
use crate::scripts;
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, Volume, VolumeMount,
};
use scaleodm_models::{JobType, S3Credentials, ScaleOdmError};

pub const WORKFLOW_NAME_PREFIX: &str = "odm-pipeline-";
pub const DEFAULT_RCLONE_IMAGE: &str = "docker.io/rclone/rclone:1";
pub const DEFAULT_SERVICE_ACCOUNT: &str = "argo-odm";

/// Everything needed to materialize one task as a workflow.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub odm_project_id: String,
    pub read_s3_path: String,
    pub write_s3_path: String,
    pub odm_flags: Vec<String>,
    pub s3_region: String,
    /// Custom S3 endpoint for non-AWS providers; omitted from the pod
    /// environment when empty.
    pub s3_endpoint: String,
    pub credentials: S3Credentials,
    pub service_account: String,
    pub rclone_image: String,
    pub odm_image: String,
}

impl PipelineConfig {
    pub fn new(
        odm_project_id: impl Into<String>,
        read_s3_path: impl Into<String>,
        write_s3_path: impl Into<String>,
        odm_flags: Vec<String>,
        credentials: S3Credentials,
        odm_image: impl Into<String>,
    ) -> Self {
        Self {
            odm_project_id: odm_project_id.into(),
            read_s3_path: read_s3_path.into(),
            write_s3_path: write_s3_path.into(),
            odm_flags,
            s3_region: "us-east-1".to_string(),
            s3_endpoint: String::new(),
            credentials,
            service_account: DEFAULT_SERVICE_ACCOUNT.to_string(),
            rclone_image: DEFAULT_RCLONE_IMAGE.to_string(),
            odm_image: odm_image.into(),
        }
    }
}

/// A workflow shape keyed by job type. Only the standard pipeline exists
/// today; split-merge slots in here when it lands.
pub trait PipelineTemplate: Send + Sync {
    fn build(&self, config: &PipelineConfig) -> Workflow;
}

/// Select the template for a job type.
pub fn template_for(job_type: JobType) -> Result<Box<dyn PipelineTemplate>, ScaleOdmError> {
    match job_type {
        JobType::Standard => Ok(Box::new(StandardPipeline)),
        JobType::SplitMerge => Err(ScaleOdmError::Unsupported {
            operation: "splitmerge pipelines are not implemented".to_string(),
        }),
    }
}

/// The single-node ODM pipeline.
pub struct StandardPipeline;

impl PipelineTemplate for StandardPipeline {
    fn build(&self, config: &PipelineConfig) -> Workflow {
        let aws_env = aws_environment(config);

        let download = ContainerNode {
            container: Container {
                name: "download".to_string(),
                image: Some(config.rclone_image.clone()),
                command: Some(shell_command("/bin/sh")),
                args: Some(vec![teed(
                    &scripts::download_script(&config.read_s3_path),
                    ".download.log",
                )]),
                env: Some(aws_env.clone()),
                ..Default::default()
            },
            dependencies: vec![],
        };

        let process = ContainerNode {
            container: Container {
                name: "process".to_string(),
                image: Some(config.odm_image.clone()),
                command: Some(shell_command("/bin/bash")),
                args: Some(vec![scripts::process_script(
                    &config.odm_project_id,
                    &config.odm_flags,
                )]),
                ..Default::default()
            },
            dependencies: vec!["download".to_string()],
        };

        let upload = ContainerNode {
            container: Container {
                name: "upload".to_string(),
                image: Some(config.rclone_image.clone()),
                command: Some(shell_command("/bin/sh")),
                args: Some(vec![teed(
                    &scripts::upload_script(&config.write_s3_path),
                    ".upload.log",
                )]),
                env: Some(aws_env.clone()),
                ..Default::default()
            },
            dependencies: vec!["process".to_string()],
        };

        let cleanup = ContainerNode {
            container: Container {
                name: "cleanup".to_string(),
                image: Some(config.rclone_image.clone()),
                command: Some(shell_command("/bin/sh")),
                args: Some(vec![scripts::log_upload_script(&config.write_s3_path)]),
                env: Some(aws_env),
                ..Default::default()
            },
            dependencies: vec!["upload".to_string()],
        };

        let spec = WorkflowSpec {
            entrypoint: Some("main".to_string()),
            service_account_name: Some(config.service_account.clone()),
            templates: vec![Template {
                name: "main".to_string(),
                volumes: vec![Volume {
                    name: "workspace".to_string(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                }],
                container_set: Some(ContainerSetTemplate {
                    volume_mounts: vec![VolumeMount {
                        name: "workspace".to_string(),
                        mount_path: "/workspace".to_string(),
                        ..Default::default()
                    }],
                    containers: vec![download, process, upload, cleanup],
                }),
            }],
        };

        let mut workflow = Workflow::new("", spec);
        workflow.metadata.name = None;
        workflow.metadata.generate_name = Some(WORKFLOW_NAME_PREFIX.to_string());
        workflow
    }
}

/// AWS environment injected into every container. `RCLONE_CONFIG_*` variables
/// are filtered out of container sets, so the scripts derive their rclone
/// config from these instead.
fn aws_environment(config: &PipelineConfig) -> Vec<EnvVar> {
    let mut env = vec![
        env_var("AWS_ACCESS_KEY_ID", &config.credentials.access_key_id),
        env_var("AWS_SECRET_ACCESS_KEY", &config.credentials.secret_access_key),
        env_var("AWS_DEFAULT_REGION", &config.s3_region),
    ];
    if let Some(token) = &config.credentials.session_token {
        env.push(env_var("AWS_SESSION_TOKEN", token));
    }
    if !config.s3_endpoint.is_empty() {
        env.push(env_var("AWS_S3_ENDPOINT", &config.s3_endpoint));
    }
    env
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        value_from: None,
    }
}

fn shell_command(shell: &str) -> Vec<String> {
    vec![shell.to_string(), "-c".to_string()]
}

/// Pipe a script's combined output into a stage log in the shared workspace
/// so the cleanup container can archive it later.
fn teed(script: &str, log_name: &str) -> String {
    format!(
        "mkdir -p /workspace/{{{{workflow.name}}}}\n{script} 2>&1 | tee /workspace/{{{{workflow.name}}}}/{log_name}"
    )
}
