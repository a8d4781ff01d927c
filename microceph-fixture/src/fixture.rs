//! Session-scoped access to provisioned microceph.
//!
//! Provisioning installs snaps and bootstraps a cluster, which is far too slow to do once per
//! test.  Everything in one test process shares a single [`ConnectionInformation`] instead.
use crate::{Config, ConnectionInformation, Provisioner, Result};
use once_cell::sync::Lazy;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::debug;

/// Holds the result of the first successful provisioning and hands out copies of it
#[derive(Debug, Default)]
pub struct SessionFixture {
    // tokio Mutex because the lock is held across the whole of provisioning, which awaits
    cached: Mutex<Option<ConnectionInformation>>,
}

impl SessionFixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the already-provisioned connection information, or provision now using the
    /// provisioner `make_provisioner` returns.
    ///
    /// Concurrent callers wait for the first one to finish.  A failure isn't remembered, so the
    /// next call will try again.
    pub async fn get_or_provision<R, F>(&self, make_provisioner: F) -> Result<ConnectionInformation>
    where
        R: Rng + Send + Sync,
        F: FnOnce() -> Provisioner<R>,
    {
        let mut cached = self.cached.lock().await;

        if let Some(info) = cached.as_ref() {
            debug!(access_key_id = info.access_key_id(), "Re-using provisioned microceph");
            return Ok(info.clone());
        }

        let info = make_provisioner().provision().await?;
        *cached = Some(info.clone());

        Ok(info)
    }
}

/// Get connection information for microceph on this CI runner, provisioning it the first time
/// this is called in the process.
///
/// Uses the default [`Config`].  Fails unless `CI=true`.
pub async fn connection_information() -> Result<ConnectionInformation> {
    static SESSION: Lazy<SessionFixture> = Lazy::new(SessionFixture::new);

    SESSION
        .get_or_provision(|| Provisioner::new(Config::default()))
        .await
}
