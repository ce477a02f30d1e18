#![allow(dead_code)]

use anyhow::{Result, bail};
use connectivity_manager::{
    config::{MonitorConfig, UplinkConfig},
    registry_client::{RegistryClient, RegistryUpdate},
    services::{
        access_point::AccessPointController,
        indicator::{Indicator, Signal},
        monitor::ConnectivityMonitor,
        probe::NetworkProbe,
        provisioning::ProvisioningService,
        radio::{Radio, SharedRadio},
        registry::{RegistrySync, RetryPolicy},
        uplink::UplinkConfigurator,
    },
    wifi_driver::{UplinkStatus, WifiDriver},
};
use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex},
    time::Duration,
};
use tempfile::TempDir;
use tokio::time::{Instant, sleep};

pub const DEVICE_ID: &str = "6cce8e7f6f7f13f3d12e01b48cda71b6";
pub const AP_SERVICES: [&str; 2] = ["hostapd", "dnsmasq"];

/// Simulated radio: tracks which access point services run and which network
/// the uplink is associated with
#[derive(Default)]
pub struct SimulatedDriver {
    running: Mutex<BTreeSet<String>>,
    uplink: Mutex<UplinkStatus>,
    associate_on_reconfigure: Mutex<Option<String>>,
    os_calls: Mutex<usize>,
    reconfigures: Mutex<usize>,
    fail_status: Mutex<bool>,
    fail_stop: Mutex<bool>,
}

impl SimulatedDriver {
    pub fn access_point_running(&self) -> bool {
        let running = self.running.lock().unwrap();
        AP_SERVICES.iter().all(|unit| running.contains(*unit))
    }

    pub fn kill_access_point(&self) {
        self.running.lock().unwrap().clear();
    }

    pub fn set_uplink(&self, status: UplinkStatus) {
        *self.uplink.lock().unwrap() = status;
    }

    pub fn uplink_connected(&self) -> bool {
        self.uplink.lock().unwrap().is_connected()
    }

    /// Associate with `ssid` as soon as the configuration is reloaded
    pub fn associate_on_reconfigure(&self, ssid: Option<&str>) {
        *self.associate_on_reconfigure.lock().unwrap() = ssid.map(String::from);
    }

    /// Number of mutating OS calls (reconfigure, start, stop)
    pub fn os_calls(&self) -> usize {
        *self.os_calls.lock().unwrap()
    }

    pub fn reconfigures(&self) -> usize {
        *self.reconfigures.lock().unwrap()
    }

    /// Make uplink status queries fail
    pub fn fail_status(&self, fail: bool) {
        *self.fail_status.lock().unwrap() = fail;
    }

    /// Make stopping services fail, leaving them running
    pub fn fail_stop(&self, fail: bool) {
        *self.fail_stop.lock().unwrap() = fail;
    }

    fn count(&self) {
        *self.os_calls.lock().unwrap() += 1;
    }
}

impl WifiDriver for SimulatedDriver {
    async fn uplink_status(&self) -> Result<UplinkStatus> {
        if *self.fail_status.lock().unwrap() {
            bail!("iwgetid failed");
        }
        Ok(self.uplink.lock().unwrap().clone())
    }

    async fn reconfigure(&self) -> Result<()> {
        self.count();
        *self.reconfigures.lock().unwrap() += 1;

        let target = self.associate_on_reconfigure.lock().unwrap().clone();
        *self.uplink.lock().unwrap() = match target {
            Some(ssid) => UplinkStatus::connected(ssid),
            None => UplinkStatus::disconnected(),
        };
        Ok(())
    }

    async fn start_service(&self, unit: &str) -> Result<()> {
        self.count();
        self.running.lock().unwrap().insert(unit.to_string());
        Ok(())
    }

    async fn stop_service(&self, unit: &str) -> Result<()> {
        self.count();
        if *self.fail_stop.lock().unwrap() {
            bail!("systemctl stop {unit} failed");
        }
        self.running.lock().unwrap().remove(unit);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct FakeRegistry {
    writes: Arc<Mutex<Vec<(String, RegistryUpdate)>>>,
    unavailable: Arc<Mutex<bool>>,
}

impl FakeRegistry {
    pub fn writes(&self) -> Vec<RegistryUpdate> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .map(|(_, update)| update.clone())
            .collect()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    /// Wait until at least `count` writes arrived
    pub async fn wait_for_writes(&self, count: usize) -> Vec<RegistryUpdate> {
        let deadline = Instant::now() + Duration::from_secs(2);

        loop {
            let writes = self.writes();
            if writes.len() >= count || Instant::now() >= deadline {
                return writes;
            }
            sleep(Duration::from_millis(5)).await;
        }
    }

    /// Give the worker a moment, then return whatever was written
    pub async fn settled_writes(&self) -> Vec<RegistryUpdate> {
        sleep(Duration::from_millis(50)).await;
        self.writes()
    }
}

impl RegistryClient for FakeRegistry {
    async fn merge(&self, device_id: &str, update: &RegistryUpdate) -> Result<()> {
        if *self.unavailable.lock().unwrap() {
            bail!("registry unavailable");
        }
        self.writes
            .lock()
            .unwrap()
            .push((device_id.to_string(), update.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeIndicator {
    alive: Mutex<Option<bool>>,
    uplink: Mutex<Option<bool>>,
}

impl FakeIndicator {
    pub fn uplink(&self) -> Option<bool> {
        *self.uplink.lock().unwrap()
    }
}

impl Indicator for FakeIndicator {
    fn set(&self, signal: Signal, on: bool) -> Result<()> {
        match signal {
            Signal::Alive => *self.alive.lock().unwrap() = Some(on),
            Signal::Uplink => *self.uplink.lock().unwrap() = Some(on),
        }
        Ok(())
    }
}

/// A fully wired device with simulated collaborators
pub struct Device {
    pub driver: Arc<SimulatedDriver>,
    pub registry: FakeRegistry,
    pub indicator: Arc<FakeIndicator>,
    pub radio: SharedRadio<SimulatedDriver>,
    pub monitor: ConnectivityMonitor<SimulatedDriver>,
    pub provisioning: ProvisioningService<SimulatedDriver>,
    _dir: TempDir,
}

impl Device {
    pub fn new() -> Self {
        Self::with_grace_period(Duration::from_millis(200))
    }

    pub fn with_grace_period(grace_period: Duration) -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let driver = Arc::new(SimulatedDriver::default());
        let registry = FakeRegistry::default();
        let indicator = Arc::new(FakeIndicator::default());

        let (sync, _worker) = RegistrySync::spawn(
            registry.clone(),
            DEVICE_ID.to_string(),
            RetryPolicy {
                attempts: 1,
                backoff: Duration::from_millis(1),
            },
        );

        let radio = Radio::new(AccessPointController::new(
            driver.clone(),
            AP_SERVICES.iter().map(|s| s.to_string()).collect(),
        ))
        .shared();

        let monitor = ConnectivityMonitor::new(
            radio.clone(),
            NetworkProbe::new(driver.clone()),
            indicator.clone(),
            sync.clone(),
            MonitorConfig {
                poll_interval: Duration::from_millis(20),
            },
        );

        let uplink = UplinkConfigurator::new(
            driver.clone(),
            UplinkConfig {
                interface: "wlan0".to_string(),
                supplicant_conf: dir.path().join("wpa_supplicant.conf"),
                country: "US".to_string(),
                ctrl_interface: "DIR=/var/run/wpa_supplicant GROUP=netdev".to_string(),
                grace_period,
                check_interval: Duration::from_millis(10),
            },
        );

        let provisioning =
            ProvisioningService::new(DEVICE_ID, radio.clone(), uplink, indicator.clone(), sync);

        Self {
            driver,
            registry,
            indicator,
            radio,
            monitor,
            provisioning,
            _dir: dir,
        }
    }

    pub fn supplicant_conf(&self) -> std::path::PathBuf {
        self._dir.path().join("wpa_supplicant.conf")
    }

    /// Uplink-active and access-point-active never hold together
    pub async fn assert_exclusive(&self) {
        let radio = self.radio.lock().await;
        assert!(
            !(radio.state().is_online() && radio.access_point_active()),
            "online with access point requested"
        );
        assert!(
            !(radio.state().is_online() && self.driver.access_point_running()),
            "online with access point running"
        );
    }
}
