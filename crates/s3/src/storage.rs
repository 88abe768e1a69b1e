//! Object client used by the control plane itself.
//!
//! Workflow containers talk to S3 through rclone; this client only serves
//! the control plane's own reads, chiefly the archived log fallback after
//! the engine has garbage-collected a workflow.

use crate::{parse_s3_url, WORKFLOW_LOGS_FILENAME};
use anyhow::Context;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use tracing::debug;

#[derive(Clone)]
pub struct ObjectStorage {
    client: aws_sdk_s3::Client,
}

impl ObjectStorage {
    /// Build a client for the configured endpoint. Path-style addressing is
    /// forced so MinIO and other S3-compatible stores work unchanged.
    pub fn new(endpoint: &str, access_key: &str, secret_key: &str, region: &str) -> Self {
        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .force_path_style(true);

        if !access_key.is_empty() && !secret_key.is_empty() {
            builder = builder.credentials_provider(Credentials::new(
                access_key.to_string(),
                secret_key.to_string(),
                None,
                None,
                "scaleodm",
            ));
        }
        if !endpoint.is_empty() {
            builder = builder.endpoint_url(normalize_endpoint(endpoint));
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
        }
    }

    /// Fetch the archived `.workflow-logs.txt` under a task's write prefix.
    pub async fn fetch_workflow_logs(&self, write_s3_path: &str) -> anyhow::Result<String> {
        let (bucket, prefix) = parse_s3_url(write_s3_path)?;
        let key = format!("{prefix}{WORKFLOW_LOGS_FILENAME}");
        debug!(bucket = %bucket, key = %key, "fetching archived workflow logs");

        let object = self
            .client
            .get_object()
            .bucket(&bucket)
            .key(&key)
            .send()
            .await
            .with_context(|| format!("failed to fetch s3://{bucket}/{key}"))?;

        let bytes = object
            .body
            .collect()
            .await
            .context("failed to read archived log body")?
            .into_bytes();

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// The endpoint env var may carry a bare host; rclone accepts that but the
/// SDK needs a full URL.
fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("https://{endpoint}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_hosts_get_a_scheme() {
        assert_eq!(
            normalize_endpoint("minio.example.com:9000"),
            "https://minio.example.com:9000"
        );
        assert_eq!(
            normalize_endpoint("http://localhost:9000"),
            "http://localhost:9000"
        );
    }
}
