//! Running the external commands (`snap`, `microceph`, `radosgw-admin`) that do the actual work of
//! provisioning.
//!
//! The provisioner only ever talks to the outside world through [`CommandRunner`], so tests can
//! swap in a scripted fake and check exactly which commands would have been run.
use std::fmt;
use tracing::debug;

/// Arguments whose value is a credential and must not end up in logs or error messages
const SECRET_FLAGS: &[&str] = &["--secret-key", "--secret"];

const REDACTED: &str = "<redacted>";

/// A single external command, with any privilege elevation already applied.
///
/// The `Display` and `Debug` impls hide the value that follows a secret flag such as
/// `--secret-key`.  Use [`Invocation::argv`] for the real command line.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Invocation {
    argv: Vec<String>,
}

impl Invocation {
    /// Build an invocation that runs with the privileges of the current process
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = vec![program.into()];
        argv.extend(args.into_iter().map(Into::into));

        Self { argv }
    }

    /// Prefix the command with `elevate_with` (usually `sudo`).
    ///
    /// An empty `elevate_with` leaves the command as-is.
    pub fn elevated(self, elevate_with: &str) -> Self {
        if elevate_with.is_empty() {
            return self;
        }

        let mut argv = Vec::with_capacity(self.argv.len() + 1);
        argv.push(elevate_with.to_string());
        argv.extend(self.argv);

        Self { argv }
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    /// The full command line, program first
    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut redact_next = false;

        for (index, arg) in self.argv.iter().enumerate() {
            if index > 0 {
                f.write_str(" ")?;
            }

            if redact_next {
                f.write_str(REDACTED)?;
            } else if let Some(flag) = inline_secret_flag(arg) {
                write!(f, "{flag}={REDACTED}")?;
            } else {
                f.write_str(arg)?;
            }

            redact_next = SECRET_FLAGS.contains(&arg.as_str());
        }

        Ok(())
    }
}

/// The flag part of a `--secret-key=value` style argument
fn inline_secret_flag(arg: &str) -> Option<&'static str> {
    let (flag, _) = arg.split_once('=')?;

    SECRET_FLAGS.iter().copied().find(|secret| *secret == flag)
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Invocation")
            .field(&self.to_string())
            .finish()
    }
}

/// What a command left behind when it exited
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` if the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs an [`Invocation`] to completion and captures its output.
///
/// Implementations report only failures to run the command at all as errors.  A command that ran
/// and exited non-zero is still an `Ok` result; deciding whether that's fatal is up to the caller.
#[async_trait::async_trait]
pub trait CommandRunner: fmt::Debug + Send + Sync {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<CommandOutput>;
}

/// [`CommandRunner`] that really runs the commands on this machine, using `duct`.
///
/// `duct` is blocking, so each command runs on tokio's blocking thread pool.
#[derive(Clone, Debug, Default)]
pub struct DuctRunner;

#[async_trait::async_trait]
impl CommandRunner for DuctRunner {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<CommandOutput> {
        let expression = duct::cmd(invocation.program(), invocation.args())
            .stdout_capture()
            .stderr_capture()
            .unchecked();

        debug!(command = %invocation, "Running command");

        let output = tokio::task::spawn_blocking(move || expression.run())
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;

        let output = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        debug!(command = %invocation, exit_code = ?output.exit_code, "Command exited");

        Ok(output)
    }
}
