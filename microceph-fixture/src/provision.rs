//! Provisioning of microceph on a CI runner.
//!
//! On a runner that already has the `microceph` snap (because an earlier job on the same runner
//! set it up) this just mints a new access key for the test user.  Otherwise it installs and
//! bootstraps a single-node cluster, enables the RADOS gateway, creates the test user and the
//! test bucket.
//!
//! Every step is an external command.  Nothing is retried; the first failure aborts provisioning.
use crate::command::{CommandOutput, CommandRunner, DuctRunner, Invocation};
use crate::s3::{BucketClient, S3BucketClient};
use crate::{Config, ConnectionInformation, Result};
use rand::distributions::Alphanumeric;
use rand::prelude::*;
use serde::Deserialize;
use snafu::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument, Span};

/// Name of the snap, and the substring looked for in `snap list` output
pub const PACKAGE: &str = "microceph";

/// The bucket every test shares.  Always this name, in both the fresh-install and the
/// already-installed cases.
pub const BUCKET: &str = "testbucket";

/// uid (and display name) of the radosgw user the keys belong to
pub const USER_ID: &str = "test";

/// Key type passed to `radosgw-admin key create`
pub const KEY_TYPE: &str = "s3";

/// One loop-backed 4GB disk, three of them, in the form `microceph disk add` wants
pub const DISK_SPEC: &str = "loop,4G,3";

/// Environment variable which must be exactly `true` before anything is installed
pub const CI_ENV_VAR: &str = "CI";

const RADOSGW_ADMIN: &str = "microceph.radosgw-admin";

/// Number of characters [`gen_random_string`] produces, no matter what was asked for
const RANDOM_STRING_LEN: usize = 10;

/// Generate a random string of ASCII letters and digits.
///
/// The result is always 10 characters long.  `_requested_length` is accepted but has no effect;
/// existing users of the keys rely on that, so both the access key (requested at 10) and the
/// secret key (requested at 24) come out at 10 characters.
pub fn gen_random_string<R: Rng + ?Sized>(rng: &mut R, _requested_length: usize) -> String {
    (0..RANDOM_STRING_LEN)
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect()
}

/// Fail unless the CI flag is exactly `true`
pub(crate) fn check_ci_guard(value: Option<&str>) -> Result<()> {
    ensure!(
        value == Some("true"),
        crate::error::NotRunningOnCiSnafu {
            value: value.map(str::to_string)
        }
    );

    Ok(())
}

/// The part of `radosgw-admin user create` output we care about
#[derive(Debug, Deserialize)]
struct UserInfo {
    keys: Vec<UserKey>,
}

#[derive(Debug, Deserialize)]
struct UserKey {
    access_key: String,
    secret_key: String,
}

/// Pull the first S3 key pair out of the JSON that `radosgw-admin user create` prints
fn parse_user_keys(output: &str) -> Result<(String, String)> {
    let user_info: UserInfo =
        serde_json::from_str(output).context(crate::error::ParseUserInfoSnafu)?;

    let key = user_info
        .keys
        .into_iter()
        .next()
        .context(crate::error::MissingUserKeySnafu { uid: USER_ID })?;

    Ok((key.access_key, key.secret_key))
}

/// Sets up microceph and produces the [`ConnectionInformation`] tests use to reach it.
///
/// Construct with [`Provisioner::new`] for the real thing.  The `with_*` methods replace the
/// collaborators (commands, S3 client, randomness, environment, log span), mostly for tests.
pub struct Provisioner<R = StdRng> {
    config: Config,
    runner: Arc<dyn CommandRunner>,
    bucket_client: Arc<dyn BucketClient>,
    rng: R,
    ci_flag: Option<String>,
    span: Span,
}

impl Provisioner<StdRng> {
    /// A provisioner that runs real commands on this machine and talks to the real gateway.
    ///
    /// The CI flag is read from the environment here, not when provisioning.
    pub fn new(config: Config) -> Self {
        Self {
            runner: Arc::new(DuctRunner),
            bucket_client: Arc::new(S3BucketClient::new(&config)),
            rng: StdRng::from_entropy(),
            ci_flag: std::env::var(CI_ENV_VAR).ok(),
            span: info_span!("microceph"),
            config,
        }
    }
}

impl<R: Rng + Send + Sync> Provisioner<R> {
    pub fn with_runner(mut self, runner: impl CommandRunner + 'static) -> Self {
        self.runner = Arc::new(runner);
        self
    }

    pub fn with_bucket_client(mut self, bucket_client: impl BucketClient + 'static) -> Self {
        self.bucket_client = Arc::new(bucket_client);
        self
    }

    /// Use a different source of randomness for generated keys; seed it to get repeatable keys
    pub fn with_rng<R2: Rng + Send + Sync>(self, rng: R2) -> Provisioner<R2> {
        Provisioner {
            config: self.config,
            runner: self.runner,
            bucket_client: self.bucket_client,
            rng,
            ci_flag: self.ci_flag,
            span: self.span,
        }
    }

    /// Override the value of the CI flag read from the environment.  `None` means unset.
    pub fn with_ci_flag(mut self, ci_flag: Option<impl Into<String>>) -> Self {
        self.ci_flag = ci_flag.map(Into::into);
        self
    }

    /// Log everything provisioning does inside this span instead of the default `microceph` one
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Make sure microceph is up and return credentials plus the bucket to use.
    ///
    /// Fails immediately, before running anything, unless `CI=true`.
    pub async fn provision(&mut self) -> Result<ConnectionInformation> {
        let span = self.span.clone();

        self.guarded_provision().instrument(span).await
    }

    /// Same as [`Self::provision`] but blocks the calling thread until done.
    ///
    /// Runs on its own single-threaded tokio runtime, so this must not be called from within an
    /// async context.
    pub fn provision_blocking(&mut self) -> Result<ConnectionInformation> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context(crate::error::BuildRuntimeSnafu)?;

        runtime.block_on(self.provision())
    }

    /// Check whether the microceph snap is installed
    pub async fn is_installed(&self) -> Result<bool> {
        let output = self.run_checked(Invocation::new("snap", ["list"])).await?;

        Ok(output.stdout.contains(PACKAGE))
    }

    /// Add a new S3 key with explicit id and secret to the test user.
    ///
    /// Only reached through [`Self::provision`], after the CI check.
    async fn create_new_keys(&self, access_key: &str, secret_key: &str) -> Result<()> {
        info!("Creating keys");

        let uid = format!("--uid={USER_ID}");
        let key_type = format!("--key-type={KEY_TYPE}");

        self.run_elevated(
            RADOSGW_ADMIN,
            [
                "key",
                "create",
                uid.as_str(),
                key_type.as_str(),
                "--access-key",
                access_key,
                "--secret-key",
                secret_key,
            ],
        )
        .await?;

        Ok(())
    }

    async fn guarded_provision(&mut self) -> Result<ConnectionInformation> {
        check_ci_guard(self.ci_flag.as_deref())?;

        if self.is_installed().await? {
            info!("Microceph already installed, keeping it");
            self.provision_existing().await
        } else {
            info!("Setting up microceph");
            self.provision_fresh().await
        }
    }

    /// The cluster, user and bucket are left over from a previous run; just make new keys
    async fn provision_existing(&mut self) -> Result<ConnectionInformation> {
        let access_key = gen_random_string(&mut self.rng, 10);
        let secret_key = gen_random_string(&mut self.rng, 24);

        self.create_new_keys(&access_key, &secret_key).await?;

        Ok(ConnectionInformation::new(access_key, secret_key, BUCKET))
    }

    async fn provision_fresh(&mut self) -> Result<ConnectionInformation> {
        self.run_elevated("snap", ["install", PACKAGE]).await?;
        self.run_elevated("microceph", ["cluster", "bootstrap"]).await?;
        self.run_elevated("microceph", ["disk", "add", DISK_SPEC]).await?;
        self.run_elevated("microceph", ["enable", "rgw"]).await?;

        let output = self
            .run_elevated(
                RADOSGW_ADMIN,
                [
                    "user",
                    "create",
                    "--uid",
                    USER_ID,
                    "--display-name",
                    USER_ID,
                ],
            )
            .await?;

        let (key_id, secret_key) = parse_user_keys(&output.stdout)?;
        let info = ConnectionInformation::new(key_id, secret_key, BUCKET);

        info!("Creating microceph bucket");
        self.bucket_client.create_bucket(&info, BUCKET).await?;

        info!("Set up microceph");

        Ok(info)
    }

    async fn run_elevated<'a>(
        &self,
        program: &str,
        args: impl IntoIterator<Item = &'a str>,
    ) -> Result<CommandOutput> {
        self.run_checked(Invocation::new(program, args).elevated(&self.config.elevate_with))
            .await
    }

    /// Run a command, turning both a failure to start it and a non-zero exit into errors
    async fn run_checked(&self, invocation: Invocation) -> Result<CommandOutput> {
        let command = invocation.to_string();

        let output = self
            .runner
            .run(&invocation)
            .await
            .with_context(|_| crate::error::SpawnCommandSnafu {
                command: command.clone(),
            })?;

        debug!(%command, exit_code = ?output.exit_code, "Command finished");

        if !output.success() {
            return crate::error::CommandFailedSnafu {
                command,
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            }
            .fail();
        }

        Ok(output)
    }
}

impl<R> std::fmt::Debug for Provisioner<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("config", &self.config)
            .field("runner", &self.runner)
            .field("bucket_client", &self.bucket_client)
            .field("ci_flag", &self.ci_flag)
            .finish()
    }
}
