//! Tests of the provisioning sequence, run against scripted commands and a recording S3 client so
//! they work anywhere.
use crate::Result;
use assert_matches::assert_matches;
use microceph_fixture::{Config, MicrocephError, Provisioner, BUCKET};
use microceph_fixture_testing::fakes::{CreatedBucket, RecordingBucketClient, ScriptedRunner};
use microceph_fixture_testing::logging::{capture_logs, test_with_logging};
use once_cell::sync::Lazy;
use rand::prelude::*;
use regex::Regex;

/// What `snap list` prints on a runner where an earlier job already installed microceph
pub(crate) const SNAP_LIST_INSTALLED: &str = "\
Name       Version                 Rev    Tracking       Publisher   Notes
core22     20240111                1122   latest/stable  canonical✓  base
lxd        5.0.3-80aeff7           27428  5.0/stable/…   canonical✓  -
microceph  18.2.0+snap450240f5dd   793    reef/stable    canonical✓  held
snapd      2.61.2                  21184  latest/stable  canonical✓  snapd
";

/// What `snap list` prints on a fresh runner
pub(crate) const SNAP_LIST_FRESH: &str = "\
Name    Version        Rev    Tracking       Publisher   Notes
core22  20240111       1122   latest/stable  canonical✓  base
lxd     5.0.3-80aeff7  27428  5.0/stable/…   canonical✓  -
snapd   2.61.2         21184  latest/stable  canonical✓  snapd
";

pub(crate) const USER_CREATE: &str =
    "sudo microceph.radosgw-admin user create --uid test --display-name test";

pub(crate) const USER_CREATE_OUTPUT: &str = r#"{
    "user_id": "test",
    "display_name": "test",
    "email": "",
    "suspended": 0,
    "max_buckets": 1000,
    "subusers": [],
    "keys": [
        {
            "user": "test",
            "access_key": "RS2QQ7CJ0XH2IXKEHUF4",
            "secret_key": "Ql3yTSdBx8mVw0cq2yI6nx7DUjQYtT5P8I7FcT4H"
        }
    ],
    "swift_keys": [],
    "caps": [],
    "op_mask": "read, write, delete",
    "default_placement": "",
    "placement_tags": [],
    "bucket_quota": {
        "enabled": false,
        "max_size": -1,
        "max_objects": -1
    },
    "type": "rgw"
}
"#;

const INSTALL_SEQUENCE: [&str; 4] = [
    "sudo snap install microceph",
    "sudo microceph cluster bootstrap",
    "sudo microceph disk add loop,4G,3",
    "sudo microceph enable rgw",
];

static RANDOM_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]{10}$").unwrap());

pub(crate) fn provisioner(
    runner: &ScriptedRunner,
    buckets: &RecordingBucketClient,
) -> Provisioner<StdRng> {
    Provisioner::new(Config::default())
        .with_runner(runner.clone())
        .with_bucket_client(buckets.clone())
        .with_rng(StdRng::seed_from_u64(1234))
        .with_ci_flag(Some("true"))
}

fn key_create_command(access_key: &str, secret_key: &str) -> String {
    format!(
        "sudo microceph.radosgw-admin key create --uid=test --key-type=s3 --access-key {access_key} --secret-key {secret_key}"
    )
}

/// Anything but exactly `CI=true` is refused before a single command runs
#[test]
fn refuses_to_run_off_ci() -> Result<()> {
    test_with_logging(async move {
        for ci_flag in [None, Some(""), Some("false"), Some("TRUE"), Some("1"), Some("yes")] {
            let runner = ScriptedRunner::new().stdout("snap list", SNAP_LIST_INSTALLED);
            let buckets = RecordingBucketClient::new();

            let result = provisioner(&runner, &buckets)
                .with_ci_flag(ci_flag)
                .provision()
                .await;

            assert_matches!(
                result,
                Err(MicrocephError::NotRunningOnCi { value }) if value.as_deref() == ci_flag
            );
            assert_eq!(runner.commands(), Vec::<String>::new(), "CI={ci_flag:?}");
            assert!(buckets.created().is_empty());
        }

        Ok(())
    })
}

/// When microceph is already on the runner, only a new key is made, and the bucket is assumed to
/// still be there
#[test]
fn already_installed_mints_new_keys() -> Result<()> {
    test_with_logging(async move {
        let runner = ScriptedRunner::new().stdout("snap list", SNAP_LIST_INSTALLED);
        let buckets = RecordingBucketClient::new();

        let info = provisioner(&runner, &buckets).provision().await?;

        assert_eq!(info.bucket(), BUCKET);
        assert_eq!(info.bucket(), "testbucket");
        assert!(RANDOM_KEY.is_match(info.access_key_id()), "{info:?}");
        assert!(RANDOM_KEY.is_match(info.secret_access_key()));
        assert_ne!(info.access_key_id(), info.secret_access_key());

        assert_eq!(
            runner.commands(),
            vec![
                "snap list".to_string(),
                key_create_command(info.access_key_id(), info.secret_access_key()),
            ]
        );
        assert!(buckets.created().is_empty());

        Ok(())
    })
}

/// Keys come from the injected RNG, so the same seed gives the same keys
#[test]
fn generated_keys_follow_rng_seed() -> Result<()> {
    test_with_logging(async move {
        let mut keys = Vec::new();

        for seed in [1, 1, 2] {
            let runner = ScriptedRunner::new().stdout("snap list", SNAP_LIST_INSTALLED);
            let buckets = RecordingBucketClient::new();

            let info = provisioner(&runner, &buckets)
                .with_rng(StdRng::seed_from_u64(seed))
                .provision()
                .await?;

            keys.push((
                info.access_key_id().to_string(),
                info.secret_access_key().to_string(),
            ));
        }

        assert_eq!(keys[0], keys[1]);
        assert_ne!(keys[0], keys[2]);

        Ok(())
    })
}

/// The `snap list` match is a case-sensitive substring match
#[test]
fn package_match_is_case_sensitive() -> Result<()> {
    test_with_logging(async move {
        let runner = ScriptedRunner::new()
            .stdout("snap list", "Name  Version\nMicroCeph  18.2.0\n")
            .stdout(USER_CREATE, USER_CREATE_OUTPUT);
        let buckets = RecordingBucketClient::new();

        provisioner(&runner, &buckets).provision().await?;

        assert!(runner.commands().contains(&INSTALL_SEQUENCE[0].to_string()));

        Ok(())
    })
}

/// On a fresh runner the whole install sequence runs once, in order, then the user and bucket
/// are created with the keys radosgw-admin reported
#[test]
fn fresh_runner_installs_and_creates_bucket() -> Result<()> {
    test_with_logging(async move {
        let runner = ScriptedRunner::new()
            .stdout("snap list", SNAP_LIST_FRESH)
            .stdout(USER_CREATE, USER_CREATE_OUTPUT);
        let buckets = RecordingBucketClient::new();

        let info = provisioner(&runner, &buckets).provision().await?;

        assert_eq!(info.access_key_id(), "RS2QQ7CJ0XH2IXKEHUF4");
        assert_eq!(
            info.secret_access_key(),
            "Ql3yTSdBx8mVw0cq2yI6nx7DUjQYtT5P8I7FcT4H"
        );
        assert_eq!(info.bucket(), "testbucket");

        let mut expected = vec!["snap list".to_string()];
        expected.extend(INSTALL_SEQUENCE.iter().map(ToString::to_string));
        expected.push(USER_CREATE.to_string());
        assert_eq!(runner.commands(), expected);

        assert_eq!(
            buckets.created(),
            vec![CreatedBucket {
                bucket: "testbucket".to_string(),
                access_key_id: "RS2QQ7CJ0XH2IXKEHUF4".to_string(),
                secret_access_key: "Ql3yTSdBx8mVw0cq2yI6nx7DUjQYtT5P8I7FcT4H".to_string(),
            }]
        );

        Ok(())
    })
}

/// A failure at any point of the install sequence stops it right there, and the error carries
/// what the command printed
#[test]
fn install_step_failure_stops_sequence() -> Result<()> {
    test_with_logging(async move {
        for (failing_index, failing_command) in INSTALL_SEQUENCE.iter().enumerate() {
            let runner = ScriptedRunner::new()
                .stdout("snap list", SNAP_LIST_FRESH)
                .stdout(USER_CREATE, USER_CREATE_OUTPUT)
                .fail(*failing_command, 1, "error: something broke");
            let buckets = RecordingBucketClient::new();

            let result = provisioner(&runner, &buckets).provision().await;

            assert_matches!(
                result,
                Err(MicrocephError::CommandFailed { command, exit_code: Some(1), stderr, .. })
                    if command == *failing_command && stderr == "error: something broke"
            );

            let mut expected = vec!["snap list".to_string()];
            expected.extend(
                INSTALL_SEQUENCE[..=failing_index]
                    .iter()
                    .map(ToString::to_string),
            );
            assert_eq!(runner.commands(), expected);
            assert!(buckets.created().is_empty());
        }

        Ok(())
    })
}

#[test]
fn user_create_failure_is_fatal() -> Result<()> {
    test_with_logging(async move {
        let runner = ScriptedRunner::new()
            .stdout("snap list", SNAP_LIST_FRESH)
            .fail(
                USER_CREATE,
                17,
                "could not create user: unable to create user, user: test exists",
            );
        let buckets = RecordingBucketClient::new();

        let result = provisioner(&runner, &buckets).provision().await;

        assert_matches!(
            result,
            Err(MicrocephError::CommandFailed { exit_code: Some(17), .. })
        );
        assert!(buckets.created().is_empty());

        Ok(())
    })
}

#[test]
fn unparseable_user_info_is_fatal() -> Result<()> {
    test_with_logging(async move {
        let runner = ScriptedRunner::new()
            .stdout("snap list", SNAP_LIST_FRESH)
            .stdout(USER_CREATE, "");
        let buckets = RecordingBucketClient::new();

        let result = provisioner(&runner, &buckets).provision().await;

        assert_matches!(result, Err(MicrocephError::ParseUserInfo { .. }));
        assert!(buckets.created().is_empty());

        let runner = ScriptedRunner::new()
            .stdout("snap list", SNAP_LIST_FRESH)
            .stdout(USER_CREATE, r#"{"user_id": "test", "keys": []}"#);

        let result = provisioner(&runner, &buckets).provision().await;

        assert_matches!(result, Err(MicrocephError::MissingUserKey { .. }));
        assert!(buckets.created().is_empty());

        Ok(())
    })
}

#[test]
fn key_create_failure_is_fatal() -> Result<()> {
    test_with_logging(async move {
        // Script the failure by hand since the generated keys are part of the command line
        let mut rng = StdRng::seed_from_u64(1234);
        let access_key = microceph_fixture::gen_random_string(&mut rng, 10);
        let secret_key = microceph_fixture::gen_random_string(&mut rng, 24);

        let runner = ScriptedRunner::new()
            .stdout("snap list", SNAP_LIST_INSTALLED)
            .fail(
                key_create_command(&access_key, &secret_key),
                2,
                "could not find user",
            );
        let buckets = RecordingBucketClient::new();

        let result = provisioner(&runner, &buckets).provision().await;

        assert_matches!(
            result,
            Err(MicrocephError::CommandFailed { ref command, exit_code: Some(2), .. })
                if command.ends_with(&format!("--access-key {access_key} --secret-key <redacted>"))
        );

        // Neither the error message nor the log may carry the secret; it would end up in CI output
        let message = result.unwrap_err().to_string();
        assert!(!message.contains(&secret_key), "{message}");

        Ok(())
    })
}

/// The secret key passed to `radosgw-admin` on the command line never shows up in the log
#[test]
fn secret_key_is_not_logged() -> Result<()> {
    let runner = ScriptedRunner::new().stdout("snap list", SNAP_LIST_INSTALLED);
    let buckets = RecordingBucketClient::new();

    let (info, logs) = capture_logs(async move {
        Ok(provisioner(&runner, &buckets).provision().await?)
    })?;

    println!("{logs}");

    assert!(logs.contains("--secret-key <redacted>"), "{logs}");
    assert!(!logs.contains(info.secret_access_key()));

    Ok(())
}

/// A bucket that can't be created is fatal, after the whole install sequence has run once and
/// with exactly one attempt at creating it
#[test]
fn fresh_runner_bucket_failure_is_fatal() -> Result<()> {
    test_with_logging(async move {
        let runner = ScriptedRunner::new()
            .stdout("snap list", SNAP_LIST_FRESH)
            .stdout(USER_CREATE, USER_CREATE_OUTPUT);
        let buckets = RecordingBucketClient::failing();

        let result = provisioner(&runner, &buckets).provision().await;

        assert_matches!(
            result,
            Err(MicrocephError::CreateBucket { bucket, .. }) if bucket == "testbucket"
        );

        let mut expected = vec!["snap list".to_string()];
        expected.extend(INSTALL_SEQUENCE.iter().map(ToString::to_string));
        expected.push(USER_CREATE.to_string());
        assert_eq!(runner.commands(), expected);

        assert_eq!(buckets.attempts().len(), 1);
        assert_eq!(buckets.attempts()[0].bucket, "testbucket");
        assert!(buckets.created().is_empty());

        Ok(())
    })
}

/// Not being able to even ask snap what's installed is as fatal as anything else
#[test]
fn snap_list_failures_are_fatal() -> Result<()> {
    test_with_logging(async move {
        let runner = ScriptedRunner::new().fail(
            "snap list",
            1,
            "error: cannot communicate with server",
        );
        let buckets = RecordingBucketClient::new();

        let result = provisioner(&runner, &buckets).provision().await;
        assert_matches!(
            result,
            Err(MicrocephError::CommandFailed { command, .. }) if command == "snap list"
        );
        assert_eq!(runner.commands(), vec!["snap list".to_string()]);

        let runner = ScriptedRunner::new().not_found("snap list");

        let result = provisioner(&runner, &buckets).provision().await;
        assert_matches!(
            result,
            Err(MicrocephError::SpawnCommand { command, .. }) if command == "snap list"
        );
        assert_eq!(runner.commands(), vec!["snap list".to_string()]);

        Ok(())
    })
}

/// With elevation turned off, the same commands run without `sudo`
#[test]
fn elevation_can_be_disabled() -> Result<()> {
    test_with_logging(async move {
        let runner = ScriptedRunner::new()
            .stdout("snap list", SNAP_LIST_FRESH)
            .stdout(
                "microceph.radosgw-admin user create --uid test --display-name test",
                USER_CREATE_OUTPUT,
            );
        let buckets = RecordingBucketClient::new();

        let config = Config {
            elevate_with: String::new(),
            ..Config::default()
        };

        Provisioner::new(config)
            .with_runner(runner.clone())
            .with_bucket_client(buckets.clone())
            .with_ci_flag(Some("true"))
            .provision()
            .await?;

        let commands = runner.commands();
        assert_eq!(commands[1], "snap install microceph");
        assert!(commands.iter().all(|command| !command.starts_with("sudo")));
        assert_eq!(buckets.created().len(), 1);

        Ok(())
    })
}

/// Provisioning logs into whatever span the caller supplies
#[test]
fn logs_into_injected_span() -> Result<()> {
    let runner = ScriptedRunner::new().stdout("snap list", SNAP_LIST_INSTALLED);
    let buckets = RecordingBucketClient::new();

    let (_info, logs) = capture_logs(async move {
        let span = tracing::info_span!("ci_session", suite = "integration");

        Ok(provisioner(&runner, &buckets)
            .with_span(span)
            .provision()
            .await?)
    })?;

    println!("{logs}");

    let installed_line = logs
        .lines()
        .find(|line| line.contains("Microceph already installed, keeping it"))
        .expect("missing 'already installed' event");
    assert!(installed_line.contains("ci_session"), "{installed_line}");

    let keys_line = logs
        .lines()
        .find(|line| line.contains("Creating keys"))
        .expect("missing 'Creating keys' event");
    assert!(keys_line.contains("ci_session"), "{keys_line}");

    Ok(())
}

/// The blocking wrapper brings its own runtime, for callers that aren't async
#[test]
fn provision_blocking_outside_runtime() -> Result<()> {
    let runner = ScriptedRunner::new().stdout("snap list", SNAP_LIST_INSTALLED);
    let buckets = RecordingBucketClient::new();

    let info = provisioner(&runner, &buckets).provision_blocking()?;

    assert_eq!(info.bucket(), "testbucket");
    assert_eq!(runner.commands().len(), 2);

    Ok(())
}
