//! Provision a single-node [MicroCeph](https://canonical-microceph.readthedocs-hosted.com/)
//! object store on a CI runner and get S3 credentials and a bucket for integration tests.
//!
//! Most test code wants [`fixture::connection_information`].  Use [`Provisioner`] directly for
//! anything more specific, such as a non-default [`Config`] or a custom log span.
mod command;
mod config;
mod connection;
mod error;
pub mod fixture;
mod provision;
mod s3;

pub use command::{CommandOutput, CommandRunner, DuctRunner, Invocation};
pub use config::Config;
pub use connection::ConnectionInformation;
pub use error::{MicrocephError, Result};
pub use provision::{
    gen_random_string, Provisioner, BUCKET, CI_ENV_VAR, DISK_SPEC, KEY_TYPE, PACKAGE, USER_ID,
};
pub use s3::{BucketClient, S3BucketClient};
