//! Supported feature set published in the read snapshot.

use modewarden_roles::FeatureSet;

use crate::config::ControllerConfig;
use crate::deps::CapabilityOracle;

/// Driver features for `iface` plus the concurrency and policy bits the
/// controller itself is responsible for.
pub fn compute_feature_set(
    oracle: &dyn CapabilityOracle,
    config: &ControllerConfig,
    iface: Option<&str>,
) -> FeatureSet {
    let mut features = oracle.supported_features(iface);

    if oracle.is_sta_ap_concurrency_supported() {
        features |= FeatureSet::AP_STA;
    }

    if oracle.is_sta_sta_concurrency_supported() {
        let additional = [
            (config.multi_sta_local_only, FeatureSet::ADDITIONAL_STA_LOCAL_ONLY),
            (config.multi_sta_make_before_break, FeatureSet::ADDITIONAL_STA_MBB),
            (config.multi_sta_restricted, FeatureSet::ADDITIONAL_STA_RESTRICTED),
            (config.multi_sta_multi_internet, FeatureSet::ADDITIONAL_STA_MULTI_INTERNET),
        ];
        for (enabled, feature) in additional {
            if enabled {
                features |= feature;
            }
        }
    }

    let policy = [
        (config.connected_mac_randomization, FeatureSet::CONNECTED_RAND_MAC),
        (config.ap_mac_randomization, FeatureSet::AP_RAND_MAC),
        (config.bridged_ap, FeatureSet::BRIDGED_AP),
        (config.sta_bridged_ap, FeatureSet::STA_BRIDGED_AP),
        (config.wep_supported, FeatureSet::WEP),
        (!config.wpa_personal_deprecated, FeatureSet::WPA_PERSONAL),
        (config.d2d_when_infra_sta_disabled, FeatureSet::D2D_WHEN_INFRA_STA_DISABLED),
    ];
    for (enabled, feature) in policy {
        if enabled {
            features |= feature;
        }
    }

    features
}
