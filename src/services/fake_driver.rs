use crate::wifi_driver::{UplinkStatus, WifiDriver};
use anyhow::{Result, bail};
use std::sync::Mutex;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OsCall {
    Status,
    Reconfigure,
    Start(String),
    Stop(String),
}

/// Recording driver for unit tests
#[derive(Default)]
pub struct FakeDriver {
    calls: Mutex<Vec<OsCall>>,
    status: Mutex<UplinkStatus>,
    fail_services: Mutex<bool>,
    fail_reconfigure: Mutex<bool>,
    fail_status: Mutex<bool>,
}

impl FakeDriver {
    pub fn calls(&self) -> Vec<OsCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn set_status(&self, status: UplinkStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn fail_service_calls(&self, fail: bool) {
        *self.fail_services.lock().unwrap() = fail;
    }

    pub fn fail_reconfigure(&self, fail: bool) {
        *self.fail_reconfigure.lock().unwrap() = fail;
    }

    pub fn fail_status(&self, fail: bool) {
        *self.fail_status.lock().unwrap() = fail;
    }

    fn record(&self, call: OsCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl WifiDriver for FakeDriver {
    async fn uplink_status(&self) -> Result<UplinkStatus> {
        self.record(OsCall::Status);
        if *self.fail_status.lock().unwrap() {
            bail!("iwgetid failed");
        }
        Ok(self.status.lock().unwrap().clone())
    }

    async fn reconfigure(&self) -> Result<()> {
        self.record(OsCall::Reconfigure);
        if *self.fail_reconfigure.lock().unwrap() {
            bail!("wpa_cli reconfigure failed");
        }
        Ok(())
    }

    async fn start_service(&self, unit: &str) -> Result<()> {
        self.record(OsCall::Start(unit.to_string()));
        if *self.fail_services.lock().unwrap() {
            bail!("systemctl start {unit} failed");
        }
        Ok(())
    }

    async fn stop_service(&self, unit: &str) -> Result<()> {
        self.record(OsCall::Stop(unit.to_string()));
        if *self.fail_services.lock().unwrap() {
            bail!("systemctl stop {unit} failed");
        }
        Ok(())
    }
}
