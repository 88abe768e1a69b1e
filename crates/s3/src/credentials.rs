//! Per-task S3 credential resolution.
//!
//! Credentials come from the request when the client supplied a pair, from
//! the process environment otherwise. When an STS role is configured, the
//! static pair is exchanged for short-lived credentials under a session name
//! unique to the task, so concurrent submissions never collide.

use aws_credential_types::Credentials;
use aws_sdk_sts::config::{BehaviorVersion, Region};
use scaleodm_models::{S3Credentials, ScaleOdmError};
use tracing::{debug, info};
use uuid::Uuid;

/// STS sessions last 24 hours, enough for the longest ODM runs.
const STS_SESSION_DURATION_SECS: i32 = 86_400;

/// Static configuration for the broker, read from the environment at start.
#[derive(Debug, Clone, Default)]
pub struct BrokerConfig {
    pub access_key: String,
    pub secret_key: String,
    pub sts_endpoint: String,
    pub sts_role_arn: String,
}

/// Resolves S3 credentials for one task submission.
#[derive(Clone)]
pub struct CredentialBroker {
    config: BrokerConfig,
}

impl CredentialBroker {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }

    /// Resolve credentials in order: request-supplied pair, then environment
    /// pair, then (either way) STS role assumption when configured. Fails
    /// when no static pair can be found.
    pub async fn resolve(
        &self,
        provided: Option<S3Credentials>,
        region: &str,
    ) -> Result<S3Credentials, ScaleOdmError> {
        let (static_creds, source) = match provided {
            Some(creds) => (creds, "request"),
            None => {
                if self.config.access_key.is_empty() || self.config.secret_key.is_empty() {
                    return Err(ScaleOdmError::CredentialMissing {
                        reason: "provide s3AccessKeyID and s3SecretAccessKey, or configure \
                                 SCALEODM_S3_ACCESS_KEY and SCALEODM_S3_SECRET_KEY"
                            .to_string(),
                    });
                }
                (
                    S3Credentials::new(&self.config.access_key, &self.config.secret_key),
                    "environment",
                )
            }
        };

        if self.config.sts_role_arn.is_empty() {
            info!(source, sts = false, "resolved S3 credentials for task");
            return Ok(static_creds);
        }

        let creds = self.assume_role(&static_creds, region).await?;
        info!(source, sts = true, "resolved S3 credentials for task");
        Ok(creds)
    }

    /// Exchange a static pair for temporary credentials via `AssumeRole`.
    async fn assume_role(
        &self,
        static_creds: &S3Credentials,
        region: &str,
    ) -> Result<S3Credentials, ScaleOdmError> {
        let provider = Credentials::new(
            static_creds.access_key_id.clone(),
            static_creds.secret_access_key.clone(),
            static_creds.session_token.clone(),
            None,
            "scaleodm-static",
        );

        let mut builder = aws_sdk_sts::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(provider);
        // Empty endpoint means the provider default (sts.amazonaws.com).
        if !self.config.sts_endpoint.is_empty() {
            builder = builder.endpoint_url(&self.config.sts_endpoint);
        }
        let client = aws_sdk_sts::Client::from_conf(builder.build());

        let session_name = format!("odm-job-{}", Uuid::new_v4());
        let response = client
            .assume_role()
            .role_arn(&self.config.sts_role_arn)
            .role_session_name(&session_name)
            .duration_seconds(STS_SESSION_DURATION_SECS)
            .send()
            .await
            .map_err(|e| ScaleOdmError::CredentialMissing {
                reason: format!("STS AssumeRole failed: {e}"),
            })?;

        let creds = response
            .credentials()
            .ok_or_else(|| ScaleOdmError::CredentialMissing {
                reason: "STS AssumeRole returned no credentials".to_string(),
            })?;

        debug!(expiry = ?creds.expiration(), "temporary S3 credentials generated");

        Ok(
            S3Credentials::new(creds.access_key_id(), creds.secret_access_key())
                .with_session_token(creds.session_token()),
        )
    }
}
