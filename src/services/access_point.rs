//! Fallback access point control
//!
//! The access point is a set of OS services (radio plus address assignment)
//! started and stopped together.

use crate::wifi_driver::WifiDriver;
use anyhow::{Result, anyhow};
use log::{debug, error, info};
use std::sync::Arc;

pub struct AccessPointController<D> {
    driver: Arc<D>,
    services: Vec<String>,
    // None until the first start or stop, so the first call always reaches the OS
    requested_running: Option<bool>,
}

impl<D: WifiDriver> AccessPointController<D> {
    pub fn new(driver: Arc<D>, services: Vec<String>) -> Self {
        Self {
            driver,
            services,
            requested_running: None,
        }
    }

    /// Whether the access point was last requested to run successfully
    pub fn is_active(&self) -> bool {
        self.requested_running == Some(true)
    }

    /// Start the access point unless it is already known to be running
    pub async fn start(&mut self) -> Result<()> {
        if self.requested_running == Some(true) {
            debug!("access point already started");
            return Ok(());
        }

        self.start_services().await
    }

    /// Stop the access point unless it is already known to be stopped
    pub async fn stop(&mut self) -> Result<()> {
        if self.requested_running == Some(false) {
            debug!("access point already stopped");
            return Ok(());
        }

        info!("stopping access point");

        let mut failed = Vec::new();
        for unit in &self.services {
            if let Err(e) = self.driver.stop_service(unit).await {
                error!("failed to stop {unit}: {e:#}");
                failed.push(unit.as_str());
            }
        }

        if !failed.is_empty() {
            return Err(anyhow!("failed to stop {}", failed.join(", ")));
        }

        self.requested_running = Some(false);
        Ok(())
    }

    /// Issue the start calls regardless of the recorded flag
    ///
    /// Used to recover an access point that died behind our back.
    pub async fn reassert(&mut self) -> Result<()> {
        self.start_services().await
    }

    async fn start_services(&mut self) -> Result<()> {
        info!("starting access point");

        let mut failed = Vec::new();
        for unit in &self.services {
            if let Err(e) = self.driver.start_service(unit).await {
                error!("failed to start {unit}: {e:#}");
                failed.push(unit.as_str());
            }
        }

        if !failed.is_empty() {
            self.requested_running = None;
            return Err(anyhow!("failed to start {}", failed.join(", ")));
        }

        self.requested_running = Some(true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fake_driver::{FakeDriver, OsCall};

    fn controller(driver: &Arc<FakeDriver>) -> AccessPointController<FakeDriver> {
        AccessPointController::new(
            driver.clone(),
            vec!["hostapd".to_string(), "dnsmasq".to_string()],
        )
    }

    #[tokio::test]
    async fn start_twice_issues_os_calls_once() {
        let driver = Arc::new(FakeDriver::default());
        let mut ap = controller(&driver);

        ap.start().await.expect("should start");
        ap.start().await.expect("should start again");

        assert!(ap.is_active());
        assert_eq!(
            driver.calls(),
            vec![
                OsCall::Start("hostapd".into()),
                OsCall::Start("dnsmasq".into())
            ]
        );
    }

    #[tokio::test]
    async fn stop_twice_issues_os_calls_once() {
        let driver = Arc::new(FakeDriver::default());
        let mut ap = controller(&driver);

        ap.stop().await.expect("should stop");
        ap.stop().await.expect("should stop again");

        assert!(!ap.is_active());
        assert_eq!(
            driver.calls(),
            vec![
                OsCall::Stop("hostapd".into()),
                OsCall::Stop("dnsmasq".into())
            ]
        );
    }

    #[tokio::test]
    async fn reassert_always_reaches_the_os() {
        let driver = Arc::new(FakeDriver::default());
        let mut ap = controller(&driver);

        ap.start().await.expect("should start");
        driver.clear_calls();
        ap.reassert().await.expect("should reassert");

        assert_eq!(driver.calls().len(), 2);
        assert!(ap.is_active());
    }

    #[tokio::test]
    async fn failed_start_is_retried_by_next_start() {
        let driver = Arc::new(FakeDriver::default());
        let mut ap = controller(&driver);

        driver.fail_service_calls(true);
        assert!(ap.start().await.is_err());
        assert!(!ap.is_active());

        driver.fail_service_calls(false);
        driver.clear_calls();
        ap.start().await.expect("should start");

        assert!(ap.is_active());
        assert_eq!(driver.calls().len(), 2);
    }

    #[tokio::test]
    async fn failed_stop_keeps_access_point_marked_active() {
        let driver = Arc::new(FakeDriver::default());
        let mut ap = controller(&driver);
        ap.start().await.expect("should start");

        driver.fail_service_calls(true);
        assert!(ap.stop().await.is_err());
        assert!(ap.is_active());
    }
}
