//! Radio configuration and connectivity state behind a single lock
//!
//! Everything that starts or stops the access point or changes the
//! connectivity state goes through [`Radio`] while holding the
//! [`SharedRadio`] lock, so the monitor and provisioning never interleave
//! radio commands.

use crate::{
    services::{access_point::AccessPointController, state::ConnectivityState},
    wifi_driver::WifiDriver,
};
use anyhow::{Context, Result};
use log::{error, info};
use std::sync::Arc;
use tokio::sync::Mutex;

pub type SharedRadio<D> = Arc<Mutex<Radio<D>>>;

pub struct Radio<D> {
    state: ConnectivityState,
    access_point: AccessPointController<D>,
}

impl<D: WifiDriver> Radio<D> {
    pub fn new(access_point: AccessPointController<D>) -> Self {
        Self {
            state: ConnectivityState::default(),
            access_point,
        }
    }

    pub fn shared(self) -> SharedRadio<D> {
        Arc::new(Mutex::new(self))
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    pub fn access_point_active(&self) -> bool {
        self.access_point.is_active()
    }

    /// Stop the access point and mark the uplink as the active mode
    ///
    /// Keeps the current state if the access point cannot be stopped, so the
    /// uplink and the access point are never both active and the next poll
    /// tries again.
    pub async fn go_online(&mut self) -> Result<()> {
        self.access_point
            .stop()
            .await
            .context("failed to stop access point")?;
        self.transition(ConnectivityState::Online);
        Ok(())
    }

    /// Fall back to the provisioning hotspot
    ///
    /// Stays `Offline` if the access point cannot be started so the next poll
    /// tries again.
    pub async fn go_hotspot(&mut self) {
        self.transition(ConnectivityState::Offline);

        match self.access_point.start().await {
            Ok(()) => self.transition(ConnectivityState::HotspotActive),
            Err(e) => error!("failed to start access point: {e:#}"),
        }
    }

    /// Restart the access point without changing state
    pub async fn reassert_hotspot(&mut self) {
        if let Err(e) = self.access_point.reassert().await {
            error!("failed to reassert access point: {e:#}");
        }
    }

    /// Hand the radio to a provisioning attempt, returning the state to
    /// restore if the attempt fails
    pub fn begin_provisioning(&mut self) -> ConnectivityState {
        let previous = self.state;
        self.transition(ConnectivityState::Connecting);
        previous
    }

    /// Give the radio back after a failed provisioning attempt
    pub fn abort_provisioning(&mut self, previous: ConnectivityState) {
        if self.state == ConnectivityState::Connecting {
            self.transition(previous);
        }
    }

    fn transition(&mut self, next: ConnectivityState) {
        if self.state != next {
            info!("connectivity state: {} -> {next}", self.state);
            self.state = next;
        }
    }
}
