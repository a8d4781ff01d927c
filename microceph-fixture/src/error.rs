use snafu::prelude::*;
use url::Url;

pub type Result<T, E = MicrocephError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum MicrocephError {
    #[snafu(display(
        "Not running on CI (CI={value:?}).  Refusing to install and administer microceph on what might be a developer workstation"
    ))]
    NotRunningOnCi { value: Option<String> },

    #[snafu(display("Failed to launch command `{command}`"))]
    SpawnCommand {
        command: String,
        source: std::io::Error,
    },

    #[snafu(display(
        "Command `{command}` failed with exit code {}\nstdout:\n{stdout}\nstderr:\n{stderr}",
        exit_code.map(|code| code.to_string()).unwrap_or_else(|| "<killed by signal>".to_string())
    ))]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[snafu(display("The output of `radosgw-admin user create` is not valid user info JSON"))]
    ParseUserInfo { source: serde_json::Error },

    #[snafu(display("radosgw-admin reported no S3 keys for user '{uid}'"))]
    MissingUserKey { uid: String },

    #[snafu(display("Error creating bucket '{bucket}' on the S3 endpoint {endpoint}"))]
    CreateBucket {
        bucket: String,
        endpoint: Url,
        source: aws_sdk_s3::error::SdkError<
            aws_sdk_s3::operation::create_bucket::CreateBucketError,
        >,
    },

    #[snafu(display("Error building a tokio runtime to provision microceph on"))]
    BuildRuntime { source: std::io::Error },
}
