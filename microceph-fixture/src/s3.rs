//! The one S3 operation the fixture performs: creating the test bucket on a freshly installed
//! RADOS gateway.
use crate::{Config, ConnectionInformation, Result};
use aws_credential_types::Credentials;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::Region;
use snafu::prelude::*;
use std::fmt::Debug;
use tracing::debug;
use url::Url;

/// Creates buckets on S3-compatible object storage
#[async_trait::async_trait]
pub trait BucketClient: Debug + Send + Sync {
    /// Create `bucket` using the access key in `credentials`.
    ///
    /// `credentials.bucket()` is ignored; `bucket` is what gets created.
    async fn create_bucket(&self, credentials: &ConnectionInformation, bucket: &str) -> Result<()>;
}

/// [`BucketClient`] that talks to a real S3 endpoint using the AWS SDK
#[derive(Clone, Debug)]
pub struct S3BucketClient {
    endpoint: Url,
    region: String,
}

impl S3BucketClient {
    pub fn new(config: &Config) -> Self {
        Self {
            endpoint: config.s3_endpoint.clone(),
            region: config.s3_region.clone(),
        }
    }
}

#[async_trait::async_trait]
impl BucketClient for S3BucketClient {
    async fn create_bucket(&self, credentials: &ConnectionInformation, bucket: &str) -> Result<()> {
        debug!(endpoint = %self.endpoint, bucket, "Creating bucket");

        let client = make_s3_client(
            &self.endpoint,
            &self.region,
            credentials.access_key_id(),
            credentials.secret_access_key(),
            RetryConfig::disabled(),
        )
        .await;

        client
            .create_bucket()
            .bucket(bucket)
            .send()
            .await
            .with_context(|_| crate::error::CreateBucketSnafu {
                bucket: bucket.to_string(),
                endpoint: self.endpoint.clone(),
            })?;

        debug!(endpoint = %self.endpoint, bucket, "Bucket created");

        Ok(())
    }
}

/// Make an S3 client that uses static keys against a custom endpoint.
///
/// Ceph's gateway doesn't do virtual-hosted buckets on `localhost`, so path-style addressing is
/// forced.  Provisioning passes [`RetryConfig::disabled`] so each request is sent exactly once.
pub(crate) async fn make_s3_client(
    endpoint: &Url,
    region: &str,
    access_key_id: &str,
    secret_access_key: &str,
    retry_config: RetryConfig,
) -> aws_sdk_s3::Client {
    let credentials = Credentials::from_keys(access_key_id, secret_access_key, None);

    let aws_config = aws_config::from_env()
        .region(Region::new(region.to_string()))
        .credentials_provider(credentials)
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .endpoint_url(endpoint.as_str())
        .force_path_style(true)
        .retry_config(retry_config)
        .build();

    aws_sdk_s3::Client::from_conf(s3_config)
}
