use aws_sdk_s3::config::retry::RetryConfig;
use serde::Serialize;
use std::fmt;
use url::Url;

/// What a test needs to talk to the provisioned object storage: an access key pair and the name of
/// the bucket it may use.
///
/// Immutable once provisioned.
#[derive(Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionInformation {
    access_key_id: String,
    secret_access_key: String,
    bucket: String,
}

impl ConnectionInformation {
    pub(crate) fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            bucket: bucket.into(),
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Get a [`aws_sdk_s3::Client`] that authenticates with these keys against `endpoint`.
    ///
    /// Unlike the client used while provisioning, this one keeps the SDK's standard retry policy,
    /// which suits tests doing real work against the bucket.
    pub async fn aws_client(&self, endpoint: &Url, region: &str) -> aws_sdk_s3::Client {
        crate::s3::make_s3_client(
            endpoint,
            region,
            &self.access_key_id,
            &self.secret_access_key,
            RetryConfig::standard(),
        )
        .await
    }

    /// Render as shell `export` statements, suitable for `eval` in a CI step
    pub fn to_env_exports(&self) -> String {
        format!(
            "export AWS_ACCESS_KEY_ID={}\nexport AWS_SECRET_ACCESS_KEY={}\nexport MICROCEPH_BUCKET={}\n",
            self.access_key_id, self.secret_access_key, self.bucket
        )
    }
}

impl fmt::Debug for ConnectionInformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Test logs end up in CI output, keep the secret out of them
        f.debug_struct("ConnectionInformation")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .finish()
    }
}
