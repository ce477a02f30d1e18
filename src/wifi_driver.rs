#![cfg_attr(feature = "mock", allow(dead_code, unused_imports))]

use anyhow::{Context, Result, ensure};
use log::{debug, info};
#[cfg(feature = "mock")]
use mockall::automock;
use serde::Serialize;
use std::process::Output;
use tokio::process::Command;
use trait_variant::make;

/// Uplink association as reported by the OS
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UplinkStatus {
    pub ssid: Option<String>,
}

impl UplinkStatus {
    pub fn connected(ssid: impl Into<String>) -> Self {
        Self {
            ssid: Some(ssid.into()),
        }
    }

    pub fn disconnected() -> Self {
        Self { ssid: None }
    }

    pub fn is_connected(&self) -> bool {
        self.ssid.is_some()
    }
}

/// Opaque OS-level Wi-Fi radio control
#[make(Send)]
#[cfg_attr(feature = "mock", automock)]
pub trait WifiDriver {
    async fn uplink_status(&self) -> Result<UplinkStatus>;
    async fn reconfigure(&self) -> Result<()>;
    async fn start_service(&self, unit: &str) -> Result<()>;
    async fn stop_service(&self, unit: &str) -> Result<()>;
}

/// Driver backed by wireless-tools, wpa_cli and systemd
#[derive(Clone, Debug)]
pub struct SystemWifiDriver {
    interface: String,
}

impl SystemWifiDriver {
    const IWGETID: &str = "iwgetid";
    const WPA_CLI: &str = "wpa_cli";
    const SYSTEMCTL: &str = "systemctl";

    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
        }
    }

    async fn run(program: &str, args: &[&str]) -> Result<Output> {
        debug!("exec {program} {}", args.join(" "));

        Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .context(format!("failed to spawn {program}"))
    }

    async fn systemctl(action: &str, unit: &str) -> Result<()> {
        let output = Self::run(Self::SYSTEMCTL, &[action, unit]).await?;

        ensure!(
            output.status.success(),
            "systemctl {action} {unit} failed with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );

        Ok(())
    }
}

impl WifiDriver for SystemWifiDriver {
    async fn uplink_status(&self) -> Result<UplinkStatus> {
        let output = Self::run(Self::IWGETID, &[&self.interface, "-r"]).await?;

        // iwgetid exits non-zero when the interface is not associated
        if !output.status.success() {
            return Ok(UplinkStatus::disconnected());
        }

        Ok(parse_iwgetid(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn reconfigure(&self) -> Result<()> {
        info!("reconfigure {}", self.interface);

        let output = Self::run(Self::WPA_CLI, &["-i", &self.interface, "reconfigure"]).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        ensure!(
            output.status.success() && stdout.trim() != "FAIL",
            "wpa_cli reconfigure failed with {}: {}",
            output.status,
            stdout.trim()
        );

        Ok(())
    }

    async fn start_service(&self, unit: &str) -> Result<()> {
        Self::systemctl("start", unit).await
    }

    async fn stop_service(&self, unit: &str) -> Result<()> {
        Self::systemctl("stop", unit).await
    }
}

fn parse_iwgetid(stdout: &str) -> UplinkStatus {
    match stdout.trim() {
        "" => UplinkStatus::disconnected(),
        ssid => UplinkStatus::connected(ssid),
    }
}
