//! Indicator light outputs.
//!
//! Two independent boolean signals: "process alive" is set once at startup and
//! never cleared, "uplink connected" mirrors whether the device is online.
//! Writes are best effort and never fail the caller.

use crate::config::IndicatorConfig;
use anyhow::{Context, Result};
use log::{debug, error};
use std::{fs, path::PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    Alive,
    Uplink,
}

impl Signal {
    fn label(self) -> &'static str {
        match self {
            Signal::Alive => "alive",
            Signal::Uplink => "uplink",
        }
    }
}

/// Two-valued output sink
pub trait Indicator: Send + Sync {
    fn set(&self, signal: Signal, on: bool) -> Result<()>;
}

/// Set an indicator signal, logging errors instead of propagating them.
pub fn set_or_log(indicator: &dyn Indicator, signal: Signal, on: bool) {
    if let Err(e) = indicator.set(signal, on) {
        error!("failed to set {} indicator: {e:#}", signal.label());
    }
}

/// Indicator driven through the sysfs GPIO interface
///
/// Pins without a configured GPIO number are logged only.
#[derive(Clone, Debug, Default)]
pub struct GpioIndicator {
    alive: Option<PathBuf>,
    uplink: Option<PathBuf>,
}

impl GpioIndicator {
    pub fn new(config: &IndicatorConfig) -> Self {
        Self {
            alive: config.alive_gpio.map(Self::value_path),
            uplink: config.uplink_gpio.map(Self::value_path),
        }
    }

    fn value_path(gpio: u32) -> PathBuf {
        PathBuf::from(format!("/sys/class/gpio/gpio{gpio}/value"))
    }

    fn path(&self, signal: Signal) -> Option<&PathBuf> {
        match signal {
            Signal::Alive => self.alive.as_ref(),
            Signal::Uplink => self.uplink.as_ref(),
        }
    }
}

impl Indicator for GpioIndicator {
    fn set(&self, signal: Signal, on: bool) -> Result<()> {
        let Some(path) = self.path(signal) else {
            debug!("{} indicator: {}", signal.label(), if on { "on" } else { "off" });
            return Ok(());
        };

        fs::write(path, if on { "1" } else { "0" })
            .context(format!("failed to write gpio value: {path:?}"))
    }
}
