//! Overlay policy for the controller.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Upper bound on the delay between shutting down for recovery and
/// bringing the modes back.
pub const MAX_RECOVERY_DELAY: Duration = Duration::from_millis(4000);

/// Device policy flags. Loaded once; the controller never mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Allow a second station for local-only (peer to peer) connections.
    pub multi_sta_local_only: bool,
    /// Allow a second station for make-before-break network switching.
    pub multi_sta_make_before_break: bool,
    /// Allow a long-lived second station for restricted networks.
    pub multi_sta_restricted: bool,
    /// Allow a long-lived second station for multi-internet.
    pub multi_sta_multi_internet: bool,
    /// Scan for hidden networks while only a scan-only client exists.
    pub scan_hidden_networks_in_scan_only_mode: bool,
    /// Turn Wi-Fi off while in an emergency call or callback mode.
    pub disable_wifi_in_emergency: bool,
    /// Honour emergency call state changes (not only callback mode).
    pub track_emergency_call_state: bool,
    /// Delay before restarting modes after a recovery shutdown. Clamped to
    /// [`MAX_RECOVERY_DELAY`].
    pub recovery_delay_ms: u64,
    /// Let root requestors bypass the car-mode local-only restriction.
    pub allow_root_local_only: bool,
    pub connected_mac_randomization: bool,
    pub ap_mac_randomization: bool,
    pub bridged_ap: bool,
    pub sta_bridged_ap: bool,
    pub wep_supported: bool,
    pub wpa_personal_deprecated: bool,
    pub d2d_when_infra_sta_disabled: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            multi_sta_local_only: false,
            multi_sta_make_before_break: false,
            multi_sta_restricted: false,
            multi_sta_multi_internet: false,
            scan_hidden_networks_in_scan_only_mode: false,
            disable_wifi_in_emergency: false,
            track_emergency_call_state: false,
            recovery_delay_ms: 2000,
            allow_root_local_only: true,
            connected_mac_randomization: true,
            ap_mac_randomization: true,
            bridged_ap: false,
            sta_bridged_ap: false,
            wep_supported: true,
            wpa_personal_deprecated: false,
            d2d_when_infra_sta_disabled: false,
        }
    }
}

impl ControllerConfig {
    /// Parse an overlay from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        if config.recovery_delay_ms > MAX_RECOVERY_DELAY.as_millis() as u64 {
            tracing::warn!(
                requested_ms = config.recovery_delay_ms,
                max_ms = MAX_RECOVERY_DELAY.as_millis() as u64,
                "recovery delay above cap, clamping"
            );
        }
        Ok(config)
    }

    pub fn recovery_delay(&self) -> Duration {
        Duration::from_millis(self.recovery_delay_ms).min(MAX_RECOVERY_DELAY)
    }

    /// Enable every multi-STA use case.
    pub fn with_all_multi_sta(mut self) -> Self {
        self.multi_sta_local_only = true;
        self.multi_sta_make_before_break = true;
        self.multi_sta_restricted = true;
        self.multi_sta_multi_internet = true;
        self
    }
}
