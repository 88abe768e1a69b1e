//! S3 access for the control plane: the per-task credential broker and the
//! object client used to fetch archived workflow logs.

mod credentials;
mod storage;

pub use credentials::{BrokerConfig, CredentialBroker};
pub use storage::ObjectStorage;

/// Object key suffix under a task's write prefix holding the archived logs.
pub const WORKFLOW_LOGS_FILENAME: &str = ".workflow-logs.txt";

/// Split an `s3://bucket/prefix` URL into bucket and key prefix. The prefix
/// keeps no leading slash and, when non-empty, exactly one trailing slash.
pub fn parse_s3_url(url: &str) -> anyhow::Result<(String, String)> {
    let rest = url
        .strip_prefix("s3://")
        .ok_or_else(|| anyhow::anyhow!("not an s3:// URL: {url}"))?;

    let (bucket, prefix) = match rest.split_once('/') {
        Some((bucket, prefix)) => (bucket, prefix.trim_matches('/')),
        None => (rest, ""),
    };
    if bucket.is_empty() {
        anyhow::bail!("missing bucket in S3 URL: {url}");
    }

    let prefix = if prefix.is_empty() {
        String::new()
    } else {
        format!("{prefix}/")
    };
    Ok((bucket.to_string(), prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bucket_and_prefix() {
        let (bucket, prefix) = parse_s3_url("s3://imagery/surveys/site-a/").unwrap();
        assert_eq!(bucket, "imagery");
        assert_eq!(prefix, "surveys/site-a/");
    }

    #[test]
    fn parse_bucket_only() {
        let (bucket, prefix) = parse_s3_url("s3://imagery").unwrap();
        assert_eq!(bucket, "imagery");
        assert_eq!(prefix, "");
    }

    #[test]
    fn parse_rejects_other_schemes() {
        assert!(parse_s3_url("https://example.com/x.zip").is_err());
        assert!(parse_s3_url("s3://").is_err());
    }
}
