use crate::{
    services::{
        provisioning::{ProvisionError, ProvisionPayload, ProvisioningService},
        radio::SharedRadio,
        state::ConnectivityState,
        uplink::ConfigError,
    },
    wifi_driver::WifiDriver,
};
use actix_web::{
    HttpResponse, Responder, ResponseError, error::InternalError, http::StatusCode, web,
};
use log::debug;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ProvisionResponse {
    pub status: &'static str,
    pub message: String,
}

impl ProvisionResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            message: message.into(),
        }
    }
}

impl From<&ProvisionError> for ProvisionResponse {
    fn from(e: &ProvisionError) -> Self {
        let (status, message) = match e {
            ProvisionError::MissingFields
            | ProvisionError::InvalidFields(_)
            | ProvisionError::DeviceMismatch => ("error", e.to_string()),
            ProvisionError::Configuration(ConfigError::ConfigFailed { .. }) => {
                ("fail", "Wi-Fi connection failed".to_string())
            }
            ProvisionError::Configuration(e) => ("fail", format!("Failed to configure WiFi: {e}")),
            ProvisionError::AccessPointStop(_) | ProvisionError::Internal(_) => {
                ("fail", format!("Failed to configure WiFi: {e}"))
            }
        };

        Self { status, message }
    }
}

impl ResponseError for ProvisionError {
    fn status_code(&self) -> StatusCode {
        match self {
            ProvisionError::MissingFields | ProvisionError::InvalidFields(_) => {
                StatusCode::BAD_REQUEST
            }
            ProvisionError::DeviceMismatch => StatusCode::FORBIDDEN,
            ProvisionError::Configuration(_)
            | ProvisionError::AccessPointStop(_)
            | ProvisionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ProvisionResponse::from(self))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthcheckInfo {
    pub device_id: String,
    pub state: ConnectivityState,
    pub access_point_active: bool,
}

pub struct Api<D> {
    pub provisioning: ProvisioningService<D>,
    pub radio: SharedRadio<D>,
}

impl<D> Clone for Api<D> {
    fn clone(&self) -> Self {
        Self {
            provisioning: self.provisioning.clone(),
            radio: self.radio.clone(),
        }
    }
}

impl<D> Api<D>
where
    D: WifiDriver + Send + Sync + 'static,
{
    pub fn new(provisioning: ProvisioningService<D>, radio: SharedRadio<D>) -> Self {
        Api {
            provisioning,
            radio,
        }
    }

    /// Register all routes; expects `web::Data<Api<D>>` in the app data
    pub fn configure(cfg: &mut web::ServiceConfig) {
        cfg.app_data(json_config())
            .route("/provision", web::post().to(Self::provision))
            .route("/healthcheck", web::get().to(Self::healthcheck))
            .route("/version", web::get().to(Self::version));
    }

    pub async fn provision(
        body: web::Json<ProvisionPayload>,
        api: web::Data<Self>,
    ) -> Result<HttpResponse, ProvisionError> {
        debug!("provision() called");

        api.provisioning.provision(body.into_inner()).await?;

        Ok(HttpResponse::Ok().json(ProvisionResponse::success(
            "Wi-Fi connected and device registered",
        )))
    }

    pub async fn healthcheck(api: web::Data<Self>) -> impl Responder {
        debug!("healthcheck() called");

        let radio = api.radio.lock().await;

        HttpResponse::Ok().json(HealthcheckInfo {
            device_id: api.provisioning.device_id().to_string(),
            state: radio.state(),
            access_point_active: radio.access_point_active(),
        })
    }

    pub async fn version() -> impl Responder {
        HttpResponse::Ok().body(env!("CARGO_PKG_VERSION"))
    }
}

/// Reject unparsable provisioning bodies the same way as incomplete ones
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        debug!("invalid provisioning body: {err}");
        InternalError::from_response(err, ProvisionError::MissingFields.error_response()).into()
    })
}
