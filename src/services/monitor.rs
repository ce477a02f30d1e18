//! Background connectivity poller
//!
//! Each cycle observes the uplink, decides with [`decide`] and acts on the
//! radio. Indicator and registry pushes happen after the radio lock is
//! released and never block the next cycle.

use crate::{
    config::MonitorConfig,
    registry_client::{DeviceStatus, RegistryUpdate},
    services::{
        indicator::{self, Indicator, Signal},
        probe::NetworkProbe,
        radio::SharedRadio,
        registry::RegistrySync,
        state::{ConnectivityState, Decision, decide},
    },
    wifi_driver::WifiDriver,
};
use log::{debug, error, info};
use std::sync::Arc;
use tokio::time::{MissedTickBehavior, interval};

pub struct ConnectivityMonitor<D> {
    radio: SharedRadio<D>,
    probe: NetworkProbe<D>,
    indicator: Arc<dyn Indicator>,
    registry: RegistrySync,
    config: MonitorConfig,
}

impl<D: WifiDriver> ConnectivityMonitor<D> {
    pub fn new(
        radio: SharedRadio<D>,
        probe: NetworkProbe<D>,
        indicator: Arc<dyn Indicator>,
        registry: RegistrySync,
        config: MonitorConfig,
    ) -> Self {
        Self {
            radio,
            probe,
            indicator,
            registry,
            config,
        }
    }

    /// Run one observe/decide/act cycle and return the resulting state
    pub async fn poll_once(&self) -> ConnectivityState {
        let (decision, state) = {
            let mut radio = self.radio.lock().await;

            // probe under the lock so a concurrent provisioning result cannot
            // be overwritten by a stale observation
            let status = self.probe.read().await;
            let decision = decide(radio.state(), status.is_connected());
            debug!("poll: {} / {status:?} -> {decision:?}", radio.state());

            match decision {
                Decision::GoOnline => {
                    if let Err(e) = radio.go_online().await {
                        error!("uplink connected but {e:#}, retrying next poll");
                        return radio.state();
                    }
                }
                Decision::GoHotspot => radio.go_hotspot().await,
                Decision::Reassert => radio.reassert_hotspot().await,
                Decision::Stay | Decision::Suppressed => {}
            }

            (decision, radio.state())
        };

        match decision {
            Decision::GoOnline => {
                info!("uplink connected");
                indicator::set_or_log(self.indicator.as_ref(), Signal::Uplink, true);
                self.registry
                    .push(RegistryUpdate::status(DeviceStatus::Online));
            }
            Decision::GoHotspot => {
                info!("uplink unavailable, provisioning hotspot requested");
                indicator::set_or_log(self.indicator.as_ref(), Signal::Uplink, false);
                self.registry
                    .push(RegistryUpdate::status(DeviceStatus::Offline));
            }
            Decision::Stay => self
                .registry
                .push(RegistryUpdate::status(DeviceStatus::Online)),
            Decision::Reassert => self
                .registry
                .push(RegistryUpdate::status(DeviceStatus::Offline)),
            Decision::Suppressed => debug!("provisioning in progress, poll actions suppressed"),
        }

        state
    }

    /// Poll forever at the configured interval, starting immediately
    pub async fn run(self) {
        info!(
            "connectivity monitor started, polling every {}s",
            self.config.poll_interval.as_secs()
        );

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.poll_once().await;
        }
    }
}
