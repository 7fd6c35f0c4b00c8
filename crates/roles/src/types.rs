//! Value types shared between the controller, its collaborators and
//! observers.

use serde::{Deserialize, Serialize};

use crate::role::SoftApMode;

/// Bitmask of supported Wi-Fi features.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSet(pub u64);

impl FeatureSet {
    pub const EMPTY: FeatureSet = FeatureSet(0);
    pub const INFRA: FeatureSet = FeatureSet(1 << 0);
    pub const INFRA_5G: FeatureSet = FeatureSet(1 << 1);
    pub const PASSPOINT: FeatureSet = FeatureSet(1 << 2);
    pub const P2P: FeatureSet = FeatureSet(1 << 3);
    pub const MOBILE_HOTSPOT: FeatureSet = FeatureSet(1 << 4);
    pub const SCANNER: FeatureSet = FeatureSet(1 << 5);
    pub const AWARE: FeatureSet = FeatureSet(1 << 6);
    pub const D2D_RTT: FeatureSet = FeatureSet(1 << 7);
    pub const D2AP_RTT: FeatureSet = FeatureSet(1 << 8);
    pub const TDLS: FeatureSet = FeatureSet(1 << 12);
    pub const AP_STA: FeatureSet = FeatureSet(1 << 15);
    pub const CONNECTED_RAND_MAC: FeatureSet = FeatureSet(1 << 28);
    pub const AP_RAND_MAC: FeatureSet = FeatureSet(1 << 29);
    pub const WPA3_SAE: FeatureSet = FeatureSet(1 << 30);
    pub const OWE: FeatureSet = FeatureSet(1 << 31);
    pub const BRIDGED_AP: FeatureSet = FeatureSet(1 << 41);
    pub const STA_BRIDGED_AP: FeatureSet = FeatureSet(1 << 42);
    pub const ADDITIONAL_STA_LOCAL_ONLY: FeatureSet = FeatureSet(1 << 43);
    pub const ADDITIONAL_STA_MBB: FeatureSet = FeatureSet(1 << 44);
    pub const ADDITIONAL_STA_RESTRICTED: FeatureSet = FeatureSet(1 << 45);
    pub const DPP_ENROLLEE_RESPONDER: FeatureSet = FeatureSet(1 << 46);
    pub const ADDITIONAL_STA_MULTI_INTERNET: FeatureSet = FeatureSet(1 << 47);
    pub const WEP: FeatureSet = FeatureSet(1 << 55);
    pub const WPA_PERSONAL: FeatureSet = FeatureSet(1 << 56);
    pub const D2D_WHEN_INFRA_STA_DISABLED: FeatureSet = FeatureSet(1 << 59);

    pub fn contains(&self, other: FeatureSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: FeatureSet) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: FeatureSet) {
        self.0 &= !other.0;
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for FeatureSet {
    type Output = FeatureSet;

    fn bitor(self, rhs: FeatureSet) -> FeatureSet {
        FeatureSet(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for FeatureSet {
    fn bitor_assign(&mut self, rhs: FeatureSet) {
        self.0 |= rhs.0;
    }
}

impl std::fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// STA band bitmask values.
pub mod band {
    pub const BAND_24_GHZ: u32 = 1 << 0;
    pub const BAND_5_GHZ: u32 = 1 << 1;
    pub const BAND_6_GHZ: u32 = 1 << 2;
    pub const BAND_60_GHZ: u32 = 1 << 3;
    /// Bands assumed when neither the driver nor the cache know better.
    pub const DEFAULT: u32 = BAND_24_GHZ | BAND_5_GHZ;
}

/// Lifecycle state of the primary station as published to API callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WifiState {
    Disabling,
    #[default]
    Disabled,
    Enabling,
    Enabled,
    Unknown,
}

impl WifiState {
    pub fn label(&self) -> &'static str {
        match self {
            WifiState::Disabling => "disabling",
            WifiState::Disabled => "disabled",
            WifiState::Enabling => "enabling",
            WifiState::Enabled => "enabled",
            WifiState::Unknown => "unknown",
        }
    }

    /// Compact encoding for storage in an atomic.
    pub fn to_raw(self) -> u8 {
        match self {
            WifiState::Disabling => 0,
            WifiState::Disabled => 1,
            WifiState::Enabling => 2,
            WifiState::Enabled => 3,
            WifiState::Unknown => 4,
        }
    }

    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => WifiState::Disabling,
            1 => WifiState::Disabled,
            2 => WifiState::Enabling,
            3 => WifiState::Enabled,
            _ => WifiState::Unknown,
        }
    }
}

impl std::fmt::Display for WifiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A network a client is connecting or connected to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkTarget {
    pub ssid: String,
    #[serde(default)]
    pub bssid: Option<String>,
}

impl LinkTarget {
    pub fn new(ssid: impl Into<String>, bssid: Option<&str>) -> Self {
        Self {
            ssid: ssid.into(),
            bssid: bssid.map(str::to_string),
        }
    }
}

/// Handle to the network the primary client currently provides.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Network {
    pub net_id: i32,
}

/// Connection details of the primary client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    #[serde(default)]
    pub ssid: Option<String>,
    #[serde(default)]
    pub bssid: Option<String>,
    #[serde(default)]
    pub frequency_mhz: Option<u32>,
    #[serde(default)]
    pub rssi: Option<i32>,
}

/// Soft-AP radio configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftApConfiguration {
    #[serde(default)]
    pub ssid: Option<String>,
    #[serde(default)]
    pub bands: u32,
    #[serde(default)]
    pub hidden: bool,
}

/// What the soft-AP hardware can currently do.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftApCapability {
    pub max_clients: u32,
    #[serde(default)]
    pub features: u64,
}

/// Everything needed to start a soft-AP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftApModeConfig {
    pub mode: SoftApMode,
    #[serde(default)]
    pub configuration: Option<SoftApConfiguration>,
    #[serde(default)]
    pub capability: SoftApCapability,
}

impl SoftApModeConfig {
    pub fn new(mode: SoftApMode) -> Self {
        Self {
            mode,
            configuration: None,
            capability: SoftApCapability::default(),
        }
    }

    pub fn with_configuration(mut self, configuration: SoftApConfiguration) -> Self {
        self.configuration = Some(configuration);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_set_ops() {
        let mut set = FeatureSet::INFRA | FeatureSet::AP_STA;
        assert!(set.contains(FeatureSet::AP_STA));
        assert!(!set.contains(FeatureSet::ADDITIONAL_STA_MBB));
        set.insert(FeatureSet::ADDITIONAL_STA_MBB);
        set.remove(FeatureSet::INFRA);
        assert!(!set.contains(FeatureSet::INFRA));
        assert!(set.contains(FeatureSet::AP_STA | FeatureSet::ADDITIONAL_STA_MBB));
    }

    #[test]
    fn test_wifi_state_raw_encoding() {
        for state in [
            WifiState::Disabling,
            WifiState::Disabled,
            WifiState::Enabling,
            WifiState::Enabled,
            WifiState::Unknown,
        ] {
            assert_eq!(WifiState::from_raw(state.to_raw()), state);
        }
        assert_eq!(WifiState::from_raw(200), WifiState::Unknown);
    }

    #[test]
    fn test_soft_ap_config_deserialize_minimal() {
        let json = r#"{"mode": "tethered"}"#;
        let config: SoftApModeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.mode, SoftApMode::Tethered);
        assert!(config.configuration.is_none());
        assert_eq!(config.capability.max_clients, 0);
    }
}
