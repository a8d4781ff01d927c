use url::Url;

/// The settings that control how the provisioner talks to the machine it's running on and to the
/// RADOS gateway once it's up.
///
/// Everything that identifies the test user, the disk and the bucket is fixed; see [`crate::BUCKET`]
/// and the other constants next to it.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::Parser))]
pub struct Config {
    /// The S3 endpoint where the microceph RADOS gateway listens once `rgw` is enabled.
    #[cfg_attr(
        feature = "clap",
        clap(long, default_value = "http://localhost/", global = true, value_name = "URL")
    )]
    pub s3_endpoint: Url,

    /// The region to sign S3 requests for.
    ///
    /// Ceph doesn't care, but the AWS SDK refuses to sign anything without one.
    #[cfg_attr(feature = "clap", clap(long, default_value = "us-east-1", global = true))]
    pub s3_region: String,

    /// Command prepended to every invocation that needs root.
    ///
    /// Set to an empty string if the fixture already runs as root.
    #[cfg_attr(feature = "clap", clap(long, default_value = "sudo", global = true))]
    pub elevate_with: String,
}

impl Default for Config {
    fn default() -> Self {
        // XXX: Duplicated here and in the `clap` attributes, same as in every other config struct
        // that optionally derives `Parser`
        Self {
            s3_endpoint: Url::parse("http://localhost/").expect("BUG: hard-coded URL is valid"),
            s3_region: "us-east-1".to_string(),
            elevate_with: "sudo".to_string(),
        }
    }
}
