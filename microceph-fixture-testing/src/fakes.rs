//! Stand-ins for the commands and the S3 endpoint, so provisioning can be exercised on any
//! machine without `sudo`, snaps or a Ceph cluster.
use aws_sdk_s3::error::SdkError;
use microceph_fixture::{
    BucketClient, CommandOutput, CommandRunner, ConnectionInformation, Invocation, MicrocephError,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use url::Url;

/// What a scripted command does when run
#[derive(Clone, Debug)]
enum Response {
    Output(CommandOutput),
    SpawnError(std::io::ErrorKind),
}

/// A [`CommandRunner`] that records every invocation and answers with canned output.
///
/// Commands are matched on their full, unredacted command line with arguments joined by single
/// spaces (so including any `sudo` and any secret keys).  Unscripted commands succeed with no
/// output.
///
/// Clones share the same script and the same record of invocations, so keep a clone around to
/// inspect after handing one to the provisioner.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    inner: Arc<Mutex<ScriptedRunnerInner>>,
}

#[derive(Debug, Default)]
struct ScriptedRunnerInner {
    responses: HashMap<String, Response>,
    invocations: Vec<Invocation>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `command` exit 0 after printing `stdout`
    pub fn stdout(self, command: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.respond(
            command,
            CommandOutput {
                exit_code: Some(0),
                stdout: stdout.into(),
                stderr: String::new(),
            },
        )
    }

    /// Make `command` exit with `exit_code` after printing `stderr`
    pub fn fail(self, command: impl Into<String>, exit_code: i32, stderr: impl Into<String>) -> Self {
        self.respond(
            command,
            CommandOutput {
                exit_code: Some(exit_code),
                stdout: String::new(),
                stderr: stderr.into(),
            },
        )
    }

    /// Make `command` impossible to launch, as if the program didn't exist
    pub fn not_found(self, command: impl Into<String>) -> Self {
        self.inner
            .lock()
            .unwrap()
            .responses
            .insert(command.into(), Response::SpawnError(std::io::ErrorKind::NotFound));
        self
    }

    pub fn respond(self, command: impl Into<String>, output: CommandOutput) -> Self {
        self.inner
            .lock()
            .unwrap()
            .responses
            .insert(command.into(), Response::Output(output));
        self
    }

    /// Every invocation run so far, in order
    pub fn invocations(&self) -> Vec<Invocation> {
        self.inner.lock().unwrap().invocations.clone()
    }

    /// Every command line run so far, in order, unredacted
    pub fn commands(&self) -> Vec<String> {
        self.invocations().iter().map(command_line).collect()
    }
}

fn command_line(invocation: &Invocation) -> String {
    invocation.argv().join(" ")
}

#[async_trait::async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<CommandOutput> {
        let mut inner = self.inner.lock().unwrap();

        inner.invocations.push(invocation.clone());

        match inner.responses.get(&command_line(invocation)) {
            Some(Response::Output(output)) => Ok(output.clone()),
            Some(Response::SpawnError(kind)) => Err(std::io::Error::new(
                *kind,
                format!("scripted: {} not found", invocation.program()),
            )),
            None => Ok(CommandOutput {
                exit_code: Some(0),
                ..Default::default()
            }),
        }
    }
}

/// A bucket that [`RecordingBucketClient`] was asked to create
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedBucket {
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// A [`BucketClient`] that remembers what it was asked to create.
///
/// Succeeds unless made with [`RecordingBucketClient::failing`].  Clones share the same record.
#[derive(Clone, Debug, Default)]
pub struct RecordingBucketClient {
    created: Arc<Mutex<Vec<CreatedBucket>>>,
    attempts: Arc<Mutex<Vec<CreatedBucket>>>,
    failing: bool,
}

impl RecordingBucketClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client whose every `create_bucket` call fails with a timeout, as if the gateway never
    /// answered
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Buckets that were actually created
    pub fn created(&self) -> Vec<CreatedBucket> {
        self.created.lock().unwrap().clone()
    }

    /// Every `create_bucket` call, whether it succeeded or not
    pub fn attempts(&self) -> Vec<CreatedBucket> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl BucketClient for RecordingBucketClient {
    async fn create_bucket(
        &self,
        credentials: &ConnectionInformation,
        bucket: &str,
    ) -> microceph_fixture::Result<()> {
        let request = CreatedBucket {
            bucket: bucket.to_string(),
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
        };

        self.attempts.lock().unwrap().push(request.clone());

        if self.failing {
            return Err(MicrocephError::CreateBucket {
                bucket: bucket.to_string(),
                endpoint: Url::parse("http://localhost/").unwrap(),
                source: SdkError::timeout_error("scripted: gateway did not answer"),
            });
        }

        self.created.lock().unwrap().push(request);

        Ok(())
    }
}
