use crate::wifi_driver::{UplinkStatus, WifiDriver};
use log::warn;
use std::sync::Arc;

/// Reads the current uplink association
///
/// Driver failures are reported as "not connected" so that the device errs
/// towards keeping the provisioning access point available.
pub struct NetworkProbe<D> {
    driver: Arc<D>,
}

impl<D> Clone for NetworkProbe<D> {
    fn clone(&self) -> Self {
        Self {
            driver: self.driver.clone(),
        }
    }
}

impl<D: WifiDriver> NetworkProbe<D> {
    pub fn new(driver: Arc<D>) -> Self {
        Self { driver }
    }

    pub async fn read(&self) -> UplinkStatus {
        match self.driver.uplink_status().await {
            Ok(status) => status,
            Err(e) => {
                warn!("uplink probe failed, assuming disconnected: {e:#}");
                UplinkStatus::disconnected()
            }
        }
    }
}
