//! S3 credential material passed between the broker and the workflow builder.

use std::fmt;

/// A resolved set of S3 credentials for one task.
#[derive(Clone, PartialEq, Eq)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl S3Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.session_token = (!token.is_empty()).then_some(token);
        self
    }
}

// Manual Debug so secret material never reaches a log line.
impl fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &"<redacted>")
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_material() {
        let creds = S3Credentials::new("AKIA123", "topsecret").with_session_token("tok");
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("AKIA123"));
        assert!(!rendered.contains("topsecret"));
        assert!(!rendered.contains("tok"));
    }

    #[test]
    fn empty_session_token_reads_as_none() {
        let creds = S3Credentials::new("k", "s").with_session_token("");
        assert!(creds.session_token.is_none());
    }
}
