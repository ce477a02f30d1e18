//! Uplink credential management
//!
//! Exactly one uplink network is remembered at a time. The credential store is
//! replaced wholesale on every apply and reloaded through the OS driver.

use crate::{config::UplinkConfig, services::probe::NetworkProbe, wifi_driver::WifiDriver};
use anyhow::{Context, Result};
use log::{debug, info};
use std::{
    fmt::Write as _,
    io::Write as _,
    path::Path,
    sync::Arc,
    time::Duration,
};
use tempfile::NamedTempFile;
use tokio::time::{Instant, sleep};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to write uplink configuration: {0:#}")]
    WriteError(anyhow::Error),
    #[error("failed to reload uplink configuration: {0:#}")]
    ReloadError(anyhow::Error),
    #[error("failed to associate with {ssid:?} within {}s", .grace_period.as_secs())]
    ConfigFailed { ssid: String, grace_period: Duration },
}

pub struct UplinkConfigurator<D> {
    driver: Arc<D>,
    probe: NetworkProbe<D>,
    config: UplinkConfig,
}

impl<D: WifiDriver> UplinkConfigurator<D> {
    pub fn new(driver: Arc<D>, config: UplinkConfig) -> Self {
        Self {
            probe: NetworkProbe::new(driver.clone()),
            driver,
            config,
        }
    }

    /// Replace the uplink configuration and wait for association
    ///
    /// Succeeds only once the probe reports association with `ssid` within the
    /// grace period. Nothing is retried or rolled back on failure.
    pub async fn apply(&self, ssid: &str, password: &str) -> Result<(), ConfigError> {
        info!("apply uplink configuration for {ssid:?}");

        let contents = render_supplicant_conf(&self.config, ssid, password);
        write_atomically(&self.config.supplicant_conf, &contents)
            .map_err(ConfigError::WriteError)?;

        self.driver
            .reconfigure()
            .await
            .map_err(ConfigError::ReloadError)?;

        self.await_association(ssid).await
    }

    async fn await_association(&self, ssid: &str) -> Result<(), ConfigError> {
        let grace_period = self.config.grace_period;
        let deadline = Instant::now() + grace_period;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(self.config.check_interval.min(remaining)).await;

            let status = self.probe.read().await;
            if status.ssid.as_deref() == Some(ssid) {
                info!("associated with {ssid:?}");
                return Ok(());
            }

            debug!("not yet associated with {ssid:?}: {status:?}");

            if Instant::now() >= deadline {
                return Err(ConfigError::ConfigFailed {
                    ssid: ssid.to_string(),
                    grace_period,
                });
            }
        }
    }
}

/// Render a single-network wpa_supplicant configuration
///
/// The SSID is hex encoded so arbitrary bytes survive. A password of 64 hex
/// digits is a raw PSK, anything else a passphrase.
pub fn render_supplicant_conf(config: &UplinkConfig, ssid: &str, password: &str) -> String {
    let ssid_hex = ssid.bytes().fold(String::new(), |mut hex, b| {
        let _ = write!(hex, "{b:02x}");
        hex
    });

    let psk = if is_raw_psk(password) {
        password.to_ascii_lowercase()
    } else {
        format!("\"{password}\"")
    };

    format!(
        "country={}\nctrl_interface={}\nupdate_config=1\n\nnetwork={{\n    ssid={ssid_hex}\n    psk={psk}\n}}\n",
        config.country, config.ctrl_interface
    )
}

pub fn is_raw_psk(password: &str) -> bool {
    password.len() == 64 && password.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Write `contents` next to `path` and rename it into place
fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    let dir = path
        .parent()
        .context(format!("failed to get parent directory of {path:?}"))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .context(format!("failed to create temporary file in {dir:?}"))?;

    tmp.write_all(contents.as_bytes())
        .context("failed to write temporary file")?;
    tmp.as_file()
        .sync_all()
        .context("failed to sync temporary file")?;

    tmp.persist(path)
        .map_err(|e| e.error)
        .context(format!("failed to replace {path:?}"))?;

    Ok(())
}
