//! Connectivity state machine
//!
//! Pure transition logic shared by the monitor and the provisioning flow.
//! No I/O happens here.

use serde::Serialize;

/// Canonical connectivity state of the device
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectivityState {
    #[default]
    Offline,
    HotspotActive,
    Connecting,
    Online,
}

impl ConnectivityState {
    pub fn is_online(self) -> bool {
        self == ConnectivityState::Online
    }
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityState::Offline => write!(f, "offline"),
            ConnectivityState::HotspotActive => write!(f, "hotspot active"),
            ConnectivityState::Connecting => write!(f, "connecting"),
            ConnectivityState::Online => write!(f, "online"),
        }
    }
}

/// What a poll cycle should do given the current state and observation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Uplink is associated but the state does not reflect it yet
    GoOnline,
    /// No uplink and no access point: fall back to the hotspot
    GoHotspot,
    /// Hotspot already active: make sure the access point is still running
    Reassert,
    /// Online and still associated
    Stay,
    /// A provisioning attempt owns the radio
    Suppressed,
}

impl Decision {
    /// State after the decision has been acted upon successfully
    pub fn next_state(self, current: ConnectivityState) -> ConnectivityState {
        match self {
            Decision::GoOnline => ConnectivityState::Online,
            Decision::GoHotspot => ConnectivityState::HotspotActive,
            Decision::Reassert | Decision::Stay | Decision::Suppressed => current,
        }
    }
}

pub fn decide(state: ConnectivityState, connected: bool) -> Decision {
    use ConnectivityState::*;

    match (state, connected) {
        (Connecting, _) => Decision::Suppressed,
        (Online, true) => Decision::Stay,
        (Offline | HotspotActive, true) => Decision::GoOnline,
        (HotspotActive, false) => Decision::Reassert,
        (Offline | Online, false) => Decision::GoHotspot,
    }
}
