//! Provisioning of new uplink credentials
//!
//! Requests are validated and authorized before anything touches the radio.
//! Attempts run one at a time on their own task, so a client that hangs up
//! cannot cancel an attempt halfway through reconfiguration.

use crate::{
    registry_client::{DeviceStatus, RegistryUpdate},
    services::{
        indicator::{self, Indicator, Signal},
        radio::SharedRadio,
        registry::RegistrySync,
        state::ConnectivityState,
        uplink::{ConfigError, UplinkConfigurator, is_raw_psk},
    },
    wifi_driver::WifiDriver,
};
use log::{error, info, warn};
use serde::Deserialize;
use serde_valid::Validate;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Body of a provisioning call as sent by the companion app
///
/// Every field is optional here so that absent and empty fields are reported
/// the same way.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionPayload {
    pub ssid: Option<String>,
    pub password: Option<String>,
    pub uid: Option<String>,
    pub device_id: Option<String>,
}

#[derive(Clone, Debug, Validate)]
pub struct ProvisionRequest {
    #[validate(custom = ssid_fits)]
    pub ssid: String,
    #[validate(custom = passphrase_or_psk)]
    pub password: String,
    pub requester_id: String,
    pub target_device_id: String,
}

impl TryFrom<ProvisionPayload> for ProvisionRequest {
    type Error = ProvisionError;

    fn try_from(payload: ProvisionPayload) -> Result<Self, Self::Error> {
        fn required(field: Option<String>) -> Result<String, ProvisionError> {
            field
                .filter(|value| !value.is_empty())
                .ok_or(ProvisionError::MissingFields)
        }

        Ok(Self {
            ssid: required(payload.ssid)?,
            password: required(payload.password)?,
            requester_id: required(payload.uid)?,
            target_device_id: required(payload.device_id)?,
        })
    }
}

impl ProvisionRequest {
    /// Check that the credentials can be expressed in the uplink configuration
    fn check_credentials(&self) -> Result<(), ProvisionError> {
        self.validate()
            .map_err(|e| ProvisionError::InvalidFields(e.to_string()))
    }
}

/// SSIDs are at most 32 bytes, not characters
fn ssid_fits(ssid: &str) -> Result<(), serde_valid::validation::Error> {
    if (1..=32).contains(&ssid.len()) {
        Ok(())
    } else {
        Err(serde_valid::validation::Error::Custom(
            "ssid must be 1 to 32 bytes".to_string(),
        ))
    }
}

/// A WPA passphrase is 8 to 63 printable ASCII characters; 64 hex digits are a
/// raw PSK
fn passphrase_or_psk(password: &str) -> Result<(), serde_valid::validation::Error> {
    let passphrase = (8..=63).contains(&password.len())
        && password.bytes().all(|b| (0x20..0x7f).contains(&b));

    if passphrase || is_raw_psk(password) {
        Ok(())
    } else {
        Err(serde_valid::validation::Error::Custom(
            "password must be 8 to 63 printable ASCII characters or 64 hex digits".to_string(),
        ))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Missing fields")]
    MissingFields,
    #[error("Invalid fields: {0}")]
    InvalidFields(String),
    #[error("Device ID mismatch")]
    DeviceMismatch,
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("{0:#}")]
    AccessPointStop(anyhow::Error),
    #[error("provisioning attempt aborted: {0}")]
    Internal(String),
}

pub struct ProvisioningService<D> {
    device_id: Arc<str>,
    radio: SharedRadio<D>,
    uplink: Arc<UplinkConfigurator<D>>,
    indicator: Arc<dyn Indicator>,
    registry: RegistrySync,
    gate: Arc<Mutex<()>>,
}

impl<D> Clone for ProvisioningService<D> {
    fn clone(&self) -> Self {
        Self {
            device_id: self.device_id.clone(),
            radio: self.radio.clone(),
            uplink: self.uplink.clone(),
            indicator: self.indicator.clone(),
            registry: self.registry.clone(),
            gate: self.gate.clone(),
        }
    }
}

impl<D> ProvisioningService<D>
where
    D: WifiDriver + Send + Sync + 'static,
{
    pub fn new(
        device_id: impl Into<Arc<str>>,
        radio: SharedRadio<D>,
        uplink: UplinkConfigurator<D>,
        indicator: Arc<dyn Indicator>,
        registry: RegistrySync,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            radio,
            uplink: Arc::new(uplink),
            indicator,
            registry,
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Validate, authorize and run a provisioning request
    pub async fn provision(&self, payload: ProvisionPayload) -> Result<(), ProvisionError> {
        let request = ProvisionRequest::try_from(payload)?;

        if request.target_device_id != *self.device_id {
            warn!(
                "provisioning rejected: request for device {:?}",
                request.target_device_id
            );
            return Err(ProvisionError::DeviceMismatch);
        }

        request.check_credentials()?;

        let service = self.clone();
        match tokio::spawn(async move { service.run_attempt(request).await }).await {
            Ok(result) => result,
            Err(e) => {
                error!("provisioning task failed: {e}");
                // the attempt died without restoring state; Offline lets the
                // next poll pick the right mode again
                self.radio
                    .lock()
                    .await
                    .abort_provisioning(ConnectivityState::Offline);
                Err(ProvisionError::Internal(e.to_string()))
            }
        }
    }

    async fn run_attempt(&self, request: ProvisionRequest) -> Result<(), ProvisionError> {
        let _gate = self.gate.lock().await;

        info!(
            "provisioning {:?} requested by {:?}",
            request.ssid, request.requester_id
        );

        let previous = self.radio.lock().await.begin_provisioning();

        if let Err(e) = self
            .uplink
            .apply(&request.ssid, &request.password)
            .await
        {
            error!("provisioning failed: {e:#}");
            self.radio.lock().await.abort_provisioning(previous);
            return Err(e.into());
        }

        {
            let mut radio = self.radio.lock().await;
            if let Err(e) = radio.go_online().await {
                error!("provisioning failed: {e:#}");
                radio.abort_provisioning(previous);
                return Err(ProvisionError::AccessPointStop(e));
            }
        }

        indicator::set_or_log(self.indicator.as_ref(), Signal::Uplink, true);
        self.registry.push(RegistryUpdate::assigned(
            request.requester_id,
            DeviceStatus::Online,
        ));

        info!("provisioning succeeded");
        Ok(())
    }
}
