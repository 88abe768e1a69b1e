//! Environment-driven configuration.
//!
//! All knobs come from `SCALEODM_*` variables plus the Kubernetes pair
//! (`K8S_NAMESPACE`, `KUBECONFIG_PATH`), resolved once at startup and passed
//! down as an explicit collaborator.

use anyhow::bail;
use std::env;

pub const DEFAULT_ODM_IMAGE: &str = "docker.io/opendronemap/odm:3.5.6";
pub const DEFAULT_CLUSTER_URL: &str = "http://localhost:31100";
pub const DEFAULT_NAMESPACE: &str = "argo";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub s3_endpoint: String,
    pub s3_access_key: String,
    pub s3_secret_key: String,
    pub s3_sts_endpoint: String,
    pub s3_sts_role_arn: String,
    pub odm_image: String,
    pub cluster_url: String,
    /// Namespace the workflow engine runs in.
    pub namespace: String,
    /// Path to a kubeconfig file; empty means in-cluster configuration.
    pub kubeconfig_path: String,
}

impl AppConfig {
    /// Read configuration from the process environment, failing fast when a
    /// required variable is missing.
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            database_url: env_or_default("SCALEODM_DATABASE_URL", ""),
            s3_endpoint: env_or_default("SCALEODM_S3_ENDPOINT", ""),
            s3_access_key: env_or_default("SCALEODM_S3_ACCESS_KEY", ""),
            s3_secret_key: env_or_default("SCALEODM_S3_SECRET_KEY", ""),
            s3_sts_endpoint: env_or_default("SCALEODM_S3_STS_ENDPOINT", ""),
            s3_sts_role_arn: env_or_default("SCALEODM_S3_STS_ROLE_ARN", ""),
            odm_image: env_or_default("SCALEODM_ODM_IMAGE", DEFAULT_ODM_IMAGE),
            cluster_url: env_or_default("SCALEODM_CLUSTER_URL", DEFAULT_CLUSTER_URL),
            namespace: env_or_default("K8S_NAMESPACE", DEFAULT_NAMESPACE),
            kubeconfig_path: env_or_default("KUBECONFIG_PATH", ""),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.is_empty() {
            bail!("SCALEODM_DATABASE_URL is required");
        }
        if self.s3_endpoint.is_empty() {
            bail!("SCALEODM_S3_ENDPOINT is required");
        }
        if self.s3_access_key.is_empty() || self.s3_secret_key.is_empty() {
            tracing::warn!(
                "SCALEODM_S3_ACCESS_KEY / SCALEODM_S3_SECRET_KEY not set; \
                 tasks must supply credentials in the request"
            );
        }
        Ok(())
    }
}

fn env_or_default(name: &str, default: &str) -> String {
    match env::var(name) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}
