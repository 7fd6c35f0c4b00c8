//! Collaborator traits and the dependency bundle handed to the controller.
//!
//! Everything the controller consults or drives outside its own state goes
//! through one of these traits, so the scheduling logic stays testable
//! without a radio.

use std::sync::Arc;

use modewarden_roles::{
    FeatureSet, MultiStaUseCase, Requestor, SoftApModeConfig, WorkSource,
};

use crate::manager::ModeManagerFactory;
use crate::message::RecoveryReason;

/// Interface counts the hardware can run at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyLimits {
    pub max_sta: usize,
    pub max_ap: usize,
    /// A station and an access point can coexist.
    pub sta_ap: bool,
}

impl Default for ConcurrencyLimits {
    fn default() -> Self {
        Self {
            max_sta: 1,
            max_ap: 1,
            sta_ap: false,
        }
    }
}

/// Answers questions about what the chip can do right now.
pub trait CapabilityOracle: Send + Sync {
    /// Whether a station interface can be created for `requestor` without
    /// tearing down an interface of higher priority.
    fn can_create_sta(&self, requestor: &WorkSource) -> bool;

    /// Same as [`can_create_sta`](Self::can_create_sta) for access points.
    fn can_create_ap(&self, requestor: &WorkSource) -> bool;

    fn concurrency(&self) -> ConcurrencyLimits;

    fn is_sta_sta_concurrency_supported(&self) -> bool {
        self.concurrency().max_sta >= 2
    }

    fn is_sta_ap_concurrency_supported(&self) -> bool {
        self.concurrency().sta_ap
    }

    /// Driver feature bits, for `iface` when known.
    fn supported_features(&self, iface: Option<&str>) -> FeatureSet;

    /// STA band mask reported by the driver for `iface`; 0 when unknown.
    fn supported_bands_for_sta(&self, iface: &str) -> u32;

    fn set_multi_sta_use_case(&self, _use_case: MultiStaUseCase) {}

    fn set_multi_sta_primary_connection(&self, _iface: &str) {}
}

/// Persisted user and device settings.
pub trait SettingsStore: Send + Sync {
    fn is_wifi_toggle_enabled(&self) -> bool;
    fn is_airplane_mode_on(&self) -> bool;
    fn is_satellite_mode_on(&self) -> bool;
    fn is_scan_always_available(&self) -> bool;
    fn is_location_enabled(&self) -> bool;
    /// The user asked for Wi-Fi to stay on when airplane mode turns on.
    fn should_remain_enabled_in_airplane(&self) -> bool;
    /// Cached STA band mask from an earlier boot; 0 when never stored.
    fn sta_bands(&self) -> u32;
    fn set_sta_bands(&self, bands: u32);
}

/// Permission and app metadata lookups.
pub trait PermissionChecker: Send + Sync {
    /// Holder of the car-mode prioritized capability.
    fn has_car_mode_priority(&self, uid: u32) -> bool;
    fn is_system(&self, requestor: &Requestor) -> bool;
    /// App targets an SDK older than concurrency-aware APIs.
    fn is_legacy(&self, requestor: &Requestor) -> bool;
}

/// Device provisioning (DPP) session state.
pub trait DppSessionMonitor: Send + Sync {
    fn is_session_in_progress(&self) -> bool;
}

/// Receives the scan enablement directive.
pub trait ScanControl: Send + Sync {
    fn set_scanning_enabled(&self, enabled: bool, hidden_networks: bool);
}

/// Battery and usage accounting.
pub trait BatteryStats: Send + Sync {
    fn report_wifi_on(&self);
    fn report_wifi_off(&self);
    fn report_scan_mode_active(&self);
}

/// Diagnostic capture.
pub trait Diagnostics: Send + Sync {
    fn take_bug_report(&self, title: &str, description: &str);
}

/// Connectivity state to clear when stations go away.
pub trait ConnectivityReset: Send + Sync {
    fn reset_on_wifi_disable(&self);
}

/// Recovery throttling lives outside the controller; this is its view.
pub trait RecoveryTracker: Send + Sync {
    /// Ask for a recovery. The tracker decides whether and when to call
    /// back into the controller's `recovery_restart_wifi`.
    fn trigger(&self, reason: RecoveryReason);

    /// All managers are down.
    fn on_wifi_stopped(&self) {}

    fn on_recovery_completed(&self) {}

    fn is_recovery_in_progress(&self) -> bool {
        false
    }
}

/// Told when a soft-AP start is refused before a manager exists.
pub trait SoftApStateListener: Send + Sync {
    fn on_start_refused(&self, config: &SoftApModeConfig);
}

/// No-op implementation of every optional collaborator.
pub struct NullHooks;

impl PermissionChecker for NullHooks {
    fn has_car_mode_priority(&self, _uid: u32) -> bool {
        false
    }

    fn is_system(&self, _requestor: &Requestor) -> bool {
        false
    }

    fn is_legacy(&self, _requestor: &Requestor) -> bool {
        false
    }
}

impl DppSessionMonitor for NullHooks {
    fn is_session_in_progress(&self) -> bool {
        false
    }
}

impl ScanControl for NullHooks {
    fn set_scanning_enabled(&self, _enabled: bool, _hidden_networks: bool) {}
}

impl BatteryStats for NullHooks {
    fn report_wifi_on(&self) {}
    fn report_wifi_off(&self) {}
    fn report_scan_mode_active(&self) {}
}

impl Diagnostics for NullHooks {
    fn take_bug_report(&self, _title: &str, _description: &str) {}
}

impl ConnectivityReset for NullHooks {
    fn reset_on_wifi_disable(&self) {}
}

impl RecoveryTracker for NullHooks {
    fn trigger(&self, _reason: RecoveryReason) {}
}

impl SoftApStateListener for NullHooks {
    fn on_start_refused(&self, _config: &SoftApModeConfig) {}
}

/// Constructed collaborators passed into the controller.
#[derive(Clone)]
pub struct Dependencies {
    pub factory: Arc<dyn ModeManagerFactory>,
    pub oracle: Arc<dyn CapabilityOracle>,
    pub settings: Arc<dyn SettingsStore>,
    pub permissions: Arc<dyn PermissionChecker>,
    pub dpp: Arc<dyn DppSessionMonitor>,
    pub scan: Arc<dyn ScanControl>,
    pub battery: Arc<dyn BatteryStats>,
    pub diagnostics: Arc<dyn Diagnostics>,
    pub connectivity: Arc<dyn ConnectivityReset>,
    pub recovery: Arc<dyn RecoveryTracker>,
    pub soft_ap_state: Arc<dyn SoftApStateListener>,
}

impl Dependencies {
    /// Required collaborators; every optional one starts as [`NullHooks`].
    pub fn new(
        factory: Arc<dyn ModeManagerFactory>,
        oracle: Arc<dyn CapabilityOracle>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        let null = Arc::new(NullHooks);
        Self {
            factory,
            oracle,
            settings,
            permissions: null.clone(),
            dpp: null.clone(),
            scan: null.clone(),
            battery: null.clone(),
            diagnostics: null.clone(),
            connectivity: null.clone(),
            recovery: null.clone(),
            soft_ap_state: null,
        }
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionChecker>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_dpp(mut self, dpp: Arc<dyn DppSessionMonitor>) -> Self {
        self.dpp = dpp;
        self
    }

    pub fn with_scan(mut self, scan: Arc<dyn ScanControl>) -> Self {
        self.scan = scan;
        self
    }

    pub fn with_battery(mut self, battery: Arc<dyn BatteryStats>) -> Self {
        self.battery = battery;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_connectivity(mut self, connectivity: Arc<dyn ConnectivityReset>) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn with_recovery(mut self, recovery: Arc<dyn RecoveryTracker>) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_soft_ap_state(mut self, listener: Arc<dyn SoftApStateListener>) -> Self {
        self.soft_ap_state = listener;
        self
    }
}
