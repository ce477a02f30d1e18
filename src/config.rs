use anyhow::{Context, Result};
use std::{env, path::PathBuf, str::FromStr, sync::OnceLock, time::Duration};

/// Application configuration loaded and validated at startup
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Identity assigned to the device at manufacture
    pub device_id: String,

    /// Provisioning endpoint configuration
    pub server: ServerConfig,

    /// Uplink interface and credential store configuration
    pub uplink: UplinkConfig,

    /// Fallback access point configuration
    pub access_point: AccessPointConfig,

    /// Background poller configuration
    pub monitor: MonitorConfig,

    /// Remote device registry configuration
    pub registry: RegistryConfig,

    /// Indicator light configuration
    pub indicator: IndicatorConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct UplinkConfig {
    pub interface: String,
    pub supplicant_conf: PathBuf,
    pub country: String,
    pub ctrl_interface: String,
    pub grace_period: Duration,
    pub check_interval: Duration,
}

#[derive(Clone, Debug)]
pub struct AccessPointConfig {
    pub services: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
}

#[derive(Clone, Debug)]
pub struct RegistryConfig {
    pub credentials_path: Option<PathBuf>,
    pub collection: String,
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
}

#[derive(Clone, Debug, Default)]
pub struct IndicatorConfig {
    pub alive_gpio: Option<u32>,
    pub uplink_gpio: Option<u32>,
}

impl AppConfig {
    /// Get or load the application configuration
    ///
    /// Returns a reference to the cached configuration. On first call, it loads
    /// and validates all configuration from environment variables.
    ///
    /// # Panics
    /// Panics if configuration loading fails. The application cannot function
    /// without a valid configuration.
    pub fn get() -> &'static Self {
        static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();
        APP_CONFIG.get_or_init(|| {
            Self::load_internal().expect("failed to load application configuration")
        })
    }

    fn load_internal() -> Result<Self> {
        let device_id = Self::device_id()?;
        anyhow::ensure!(!device_id.is_empty(), "failed to load DEVICE_ID: empty");

        Ok(Self {
            device_id,
            server: ServerConfig::load()?,
            uplink: UplinkConfig::load()?,
            access_point: AccessPointConfig::load(),
            monitor: MonitorConfig::load()?,
            registry: RegistryConfig::load()?,
            indicator: IndicatorConfig::load()?,
        })
    }

    #[cfg(not(any(test, feature = "mock")))]
    fn device_id() -> Result<String> {
        env::var("DEVICE_ID").context("failed to get DEVICE_ID")
    }

    #[cfg(any(test, feature = "mock"))]
    fn device_id() -> Result<String> {
        Ok(env::var("DEVICE_ID").unwrap_or_else(|_| "test-device".to_string()))
    }
}

impl ServerConfig {
    fn load() -> Result<Self> {
        let bind_address = env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_var("PROVISION_PORT", 5000)?;

        Ok(Self { bind_address, port })
    }
}

impl UplinkConfig {
    fn load() -> Result<Self> {
        let interface = env::var("WIFI_INTERFACE").unwrap_or_else(|_| "wlan0".to_string());
        let supplicant_conf = env::var("WPA_SUPPLICANT_CONF")
            .unwrap_or_else(|_| "/etc/wpa_supplicant/wpa_supplicant.conf".to_string())
            .into();
        let country = env::var("WIFI_COUNTRY").unwrap_or_else(|_| "US".to_string());
        let ctrl_interface = env::var("WPA_CTRL_INTERFACE")
            .unwrap_or_else(|_| "DIR=/var/run/wpa_supplicant GROUP=netdev".to_string());
        let grace_period = Duration::from_secs(parse_var("GRACE_PERIOD_SECS", 10)?);
        let check_interval = nonzero(
            "ASSOCIATION_CHECK_MS",
            Duration::from_millis(parse_var("ASSOCIATION_CHECK_MS", 1000)?),
        )?;

        Ok(Self {
            interface,
            supplicant_conf,
            country,
            ctrl_interface,
            grace_period,
            check_interval,
        })
    }
}

impl AccessPointConfig {
    fn load() -> Self {
        let services = env::var("AP_SERVICES")
            .unwrap_or_else(|_| "hostapd,dnsmasq".to_string())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        Self { services }
    }
}

impl MonitorConfig {
    fn load() -> Result<Self> {
        let poll_interval = nonzero(
            "POLL_INTERVAL_SECS",
            Duration::from_secs(parse_var("POLL_INTERVAL_SECS", 30)?),
        )?;

        Ok(Self { poll_interval })
    }
}

impl RegistryConfig {
    fn load() -> Result<Self> {
        let credentials_path = env::var("REGISTRY_CREDENTIALS").ok().map(PathBuf::from);
        let collection = env::var("REGISTRY_COLLECTION").unwrap_or_else(|_| "devices".to_string());
        let retry_attempts = parse_var("REGISTRY_RETRY_ATTEMPTS", 3)?;
        let retry_backoff = Duration::from_millis(parse_var("REGISTRY_RETRY_BACKOFF_MS", 1000)?);

        Ok(Self {
            credentials_path,
            collection,
            retry_attempts,
            retry_backoff,
        })
    }
}

impl IndicatorConfig {
    fn load() -> Result<Self> {
        Ok(Self {
            alive_gpio: parse_optional_var("INDICATOR_ALIVE_GPIO")?,
            uplink_gpio: parse_optional_var("INDICATOR_UPLINK_GPIO")?,
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .context(format!("failed to parse {name}: invalid format")),
        Err(_) => Ok(default),
    }
}

fn parse_optional_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(name)
        .ok()
        .map(|value| {
            value
                .parse::<T>()
                .context(format!("failed to parse {name}: invalid format"))
        })
        .transpose()
}

fn nonzero(name: &str, interval: Duration) -> Result<Duration> {
    anyhow::ensure!(
        !interval.is_zero(),
        "failed to load {name}: must be greater than zero"
    );
    Ok(interval)
}
