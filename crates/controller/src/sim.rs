//! In-memory driver for tests and demos.
//!
//! [`SimDriver`] bundles a manager factory, a capability oracle, a settings
//! store and recording hooks. Managers report their lifecycle through the
//! sink the controller handed them, so the controller sees the same event
//! ordering it would see from real interfaces.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use modewarden_roles::{
    band, ConnectionInfo, FeatureSet, LinkTarget, ManagerId, MultiStaUseCase, Network, Requestor,
    Role, SoftApCapability, SoftApConfiguration, SoftApModeConfig, WorkSource,
};

use crate::deps::{
    BatteryStats, CapabilityOracle, ConcurrencyLimits, ConnectivityReset, Dependencies,
    Diagnostics, DppSessionMonitor, PermissionChecker, RecoveryTracker, ScanControl,
    SettingsStore, SoftApStateListener,
};
use crate::manager::{
    ClientModeManager, ManagerEvent, ManagerEventSink, ModeManagerFactory, SoftApManager,
};
use crate::message::RecoveryReason;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ===========================================================================
// Managers
// ===========================================================================

#[derive(Debug, Default)]
struct ClientState {
    role: Option<Role>,
    link: Option<LinkTarget>,
    affiliated: Vec<String>,
    network: Option<Network>,
    stopped: bool,
}

struct SimClient {
    sink: ManagerEventSink,
    iface: String,
    state: Arc<Mutex<ClientState>>,
    factory: Arc<FactoryState>,
}

impl ClientModeManager for SimClient {
    fn set_role(&mut self, role: Role, _requestor: &WorkSource) {
        self.factory
            .record(format!("set_role {} {}", self.sink.id(), role));
        lock(&self.state).role = Some(role);
        if self.factory.auto_complete.load(Ordering::SeqCst) {
            self.sink.report(ManagerEvent::RoleChanged);
        }
    }

    fn stop(&mut self) {
        self.factory.record(format!("stop {}", self.sink.id()));
        lock(&self.state).stopped = true;
        if self.factory.auto_complete.load(Ordering::SeqCst) {
            self.sink.report(ManagerEvent::Stopped);
        }
    }

    fn interface_name(&self) -> Option<String> {
        Some(self.iface.clone())
    }

    fn connected(&self) -> Option<LinkTarget> {
        lock(&self.state).link.clone()
    }

    fn is_affiliated_link(&self, bssid: &str) -> bool {
        lock(&self.state).affiliated.iter().any(|b| b == bssid)
    }

    fn current_network(&self) -> Option<Network> {
        lock(&self.state).network.clone()
    }

    fn connection_info(&self) -> ConnectionInfo {
        let state = lock(&self.state);
        match &state.link {
            Some(link) => ConnectionInfo {
                ssid: Some(link.ssid.clone()),
                bssid: link.bssid.clone(),
                ..ConnectionInfo::default()
            },
            None => ConnectionInfo::default(),
        }
    }
}

struct SimSoftAp {
    sink: ManagerEventSink,
    iface: String,
    factory: Arc<FactoryState>,
}

impl SoftApManager for SimSoftAp {
    fn stop(&mut self) {
        self.factory.record(format!("stop {}", self.sink.id()));
        if self.factory.auto_complete.load(Ordering::SeqCst) {
            self.sink.report(ManagerEvent::Stopped);
        }
    }

    fn interface_name(&self) -> Option<String> {
        Some(self.iface.clone())
    }

    fn update_capability(&mut self, capability: &SoftApCapability) {
        self.factory.record(format!(
            "update_capability {} max_clients={}",
            self.sink.id(),
            capability.max_clients
        ));
    }

    fn update_configuration(&mut self, configuration: &SoftApConfiguration) {
        self.factory.record(format!(
            "update_configuration {} ssid={}",
            self.sink.id(),
            configuration.ssid.as_deref().unwrap_or("-")
        ));
    }
}

// ===========================================================================
// Factory
// ===========================================================================

#[derive(Default)]
struct FactoryState {
    /// Report completion of start, role switch and stop right away.
    auto_complete: AtomicBool,
    fail_client_starts: AtomicUsize,
    fail_soft_ap_starts: AtomicUsize,
    next_iface: AtomicUsize,
    clients: Mutex<HashMap<ManagerId, Arc<Mutex<ClientState>>>>,
    sinks: Mutex<HashMap<ManagerId, ManagerEventSink>>,
    calls: Mutex<Vec<String>>,
}

impl FactoryState {
    fn record(&self, call: String) {
        tracing::trace!(call = %call, "sim");
        lock(&self.calls).push(call);
    }

    /// Report the outcome of a start, honoring queued failures.
    fn report_start(&self, sink: &ManagerEventSink, failures: &AtomicUsize) {
        if !self.auto_complete.load(Ordering::SeqCst) {
            return;
        }
        let fail = failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        sink.report(if fail {
            ManagerEvent::StartFailure
        } else {
            ManagerEvent::Started
        });
    }
}

/// Creates simulated managers and lets tests steer them.
pub struct SimFactory {
    state: Arc<FactoryState>,
}

impl Default for SimFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SimFactory {
    pub fn new() -> Self {
        let state = FactoryState::default();
        state.auto_complete.store(true, Ordering::SeqCst);
        Self {
            state: Arc::new(state),
        }
    }

    /// When off, managers stay silent until driven with [`report`](Self::report).
    pub fn set_auto_complete(&self, enabled: bool) {
        self.state.auto_complete.store(enabled, Ordering::SeqCst);
    }

    /// Make the next `count` client starts fail.
    pub fn fail_next_client_starts(&self, count: usize) {
        self.state.fail_client_starts.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` soft-AP starts fail.
    pub fn fail_next_soft_ap_starts(&self, count: usize) {
        self.state.fail_soft_ap_starts.store(count, Ordering::SeqCst);
    }

    /// Send `event` on behalf of manager `id`. Returns false for unknown ids.
    pub fn report(&self, id: ManagerId, event: ManagerEvent) -> bool {
        let sink = lock(&self.state.sinks).get(&id).cloned();
        match sink {
            Some(sink) => {
                sink.report(event);
                true
            }
            None => false,
        }
    }

    /// Associate client `id` with `link`, optionally with affiliated BSSIDs.
    pub fn set_link(&self, id: ManagerId, link: Option<LinkTarget>, affiliated: &[&str]) {
        if let Some(client) = lock(&self.state.clients).get(&id) {
            let mut client = lock(client);
            client.link = link;
            client.affiliated = affiliated.iter().map(|b| b.to_string()).collect();
        }
    }

    pub fn set_network(&self, id: ManagerId, network: Option<Network>) {
        if let Some(client) = lock(&self.state.clients).get(&id) {
            lock(client).network = network;
        }
    }

    /// Role the simulated interface was last told to take.
    pub fn client_role(&self, id: ManagerId) -> Option<Role> {
        lock(&self.state.clients)
            .get(&id)
            .and_then(|c| lock(c).role)
    }

    pub fn is_stopped(&self, id: ManagerId) -> bool {
        lock(&self.state.clients)
            .get(&id)
            .is_some_and(|c| lock(c).stopped)
    }

    /// Calls made by the controller, oldest first.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state.calls).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.state.calls).clear();
    }

    fn next_iface(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.state.next_iface.fetch_add(1, Ordering::SeqCst))
    }
}

impl ModeManagerFactory for SimFactory {
    fn create_client(
        &self,
        role: Role,
        _requestor: &WorkSource,
        sink: ManagerEventSink,
    ) -> Box<dyn ClientModeManager> {
        let id = sink.id();
        self.state.record(format!("create_client {id} {role}"));
        let client = Arc::new(Mutex::new(ClientState {
            role: Some(role),
            ..ClientState::default()
        }));
        lock(&self.state.clients).insert(id, Arc::clone(&client));
        lock(&self.state.sinks).insert(id, sink.clone());
        self.state
            .report_start(&sink, &self.state.fail_client_starts);
        Box::new(SimClient {
            sink,
            iface: self.next_iface("wlan"),
            state: client,
            factory: Arc::clone(&self.state),
        })
    }

    fn create_soft_ap(
        &self,
        config: &SoftApModeConfig,
        _requestor: &WorkSource,
        sink: ManagerEventSink,
    ) -> Box<dyn SoftApManager> {
        let id = sink.id();
        self.state
            .record(format!("create_soft_ap {id} {}", config.mode));
        lock(&self.state.sinks).insert(id, sink.clone());
        self.state
            .report_start(&sink, &self.state.fail_soft_ap_starts);
        Box::new(SimSoftAp {
            sink,
            iface: self.next_iface("ap"),
            factory: Arc::clone(&self.state),
        })
    }
}

// ===========================================================================
// Oracle
// ===========================================================================

/// Chip capabilities with adjustable answers.
pub struct SimOracle {
    limits: Mutex<ConcurrencyLimits>,
    allow_sta: AtomicBool,
    allow_ap: AtomicBool,
    features: Mutex<FeatureSet>,
    bands: AtomicU32,
    use_cases: Mutex<Vec<MultiStaUseCase>>,
    primary_iface: Mutex<Option<String>>,
}

impl Default for SimOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl SimOracle {
    pub fn new() -> Self {
        Self {
            limits: Mutex::new(ConcurrencyLimits::default()),
            allow_sta: AtomicBool::new(true),
            allow_ap: AtomicBool::new(true),
            features: Mutex::new(FeatureSet::INFRA | FeatureSet::SCANNER),
            bands: AtomicU32::new(band::DEFAULT),
            use_cases: Mutex::new(Vec::new()),
            primary_iface: Mutex::new(None),
        }
    }

    /// A chip with two station interfaces and STA+AP.
    pub fn dual_sta() -> Self {
        let oracle = Self::new();
        oracle.set_limits(ConcurrencyLimits {
            max_sta: 2,
            max_ap: 1,
            sta_ap: true,
        });
        oracle
    }

    pub fn set_limits(&self, limits: ConcurrencyLimits) {
        *lock(&self.limits) = limits;
    }

    pub fn set_can_create_sta(&self, allowed: bool) {
        self.allow_sta.store(allowed, Ordering::SeqCst);
    }

    pub fn set_can_create_ap(&self, allowed: bool) {
        self.allow_ap.store(allowed, Ordering::SeqCst);
    }

    pub fn set_features(&self, features: FeatureSet) {
        *lock(&self.features) = features;
    }

    /// Bands the driver reports; 0 means unknown.
    pub fn set_bands(&self, bands: u32) {
        self.bands.store(bands, Ordering::SeqCst);
    }

    pub fn last_use_case(&self) -> Option<MultiStaUseCase> {
        lock(&self.use_cases).last().copied()
    }

    pub fn primary_iface(&self) -> Option<String> {
        lock(&self.primary_iface).clone()
    }
}

impl CapabilityOracle for SimOracle {
    fn can_create_sta(&self, _requestor: &WorkSource) -> bool {
        self.allow_sta.load(Ordering::SeqCst)
    }

    fn can_create_ap(&self, _requestor: &WorkSource) -> bool {
        self.allow_ap.load(Ordering::SeqCst)
    }

    fn concurrency(&self) -> ConcurrencyLimits {
        *lock(&self.limits)
    }

    fn supported_features(&self, _iface: Option<&str>) -> FeatureSet {
        *lock(&self.features)
    }

    fn supported_bands_for_sta(&self, _iface: &str) -> u32 {
        self.bands.load(Ordering::SeqCst)
    }

    fn set_multi_sta_use_case(&self, use_case: MultiStaUseCase) {
        lock(&self.use_cases).push(use_case);
    }

    fn set_multi_sta_primary_connection(&self, iface: &str) {
        *lock(&self.primary_iface) = Some(iface.to_string());
    }
}

// ===========================================================================
// Settings
// ===========================================================================

/// Persisted toggles, all off by default.
#[derive(Default)]
pub struct SimSettings {
    pub wifi_enabled: AtomicBool,
    pub airplane_mode: AtomicBool,
    pub satellite_mode: AtomicBool,
    pub scan_always: AtomicBool,
    pub location: AtomicBool,
    pub remain_enabled_in_airplane: AtomicBool,
    pub sta_bands: AtomicU32,
}

impl SimSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_wifi_enabled(&self, on: bool) {
        self.wifi_enabled.store(on, Ordering::SeqCst);
    }

    pub fn set_airplane_mode(&self, on: bool) {
        self.airplane_mode.store(on, Ordering::SeqCst);
    }

    pub fn set_satellite_mode(&self, on: bool) {
        self.satellite_mode.store(on, Ordering::SeqCst);
    }

    /// Scan-always together with location, i.e. scan-only eligible.
    pub fn set_scan_only_available(&self, on: bool) {
        self.scan_always.store(on, Ordering::SeqCst);
        self.location.store(on, Ordering::SeqCst);
    }
}

impl SettingsStore for SimSettings {
    fn is_wifi_toggle_enabled(&self) -> bool {
        self.wifi_enabled.load(Ordering::SeqCst)
    }

    fn is_airplane_mode_on(&self) -> bool {
        self.airplane_mode.load(Ordering::SeqCst)
    }

    fn is_satellite_mode_on(&self) -> bool {
        self.satellite_mode.load(Ordering::SeqCst)
    }

    fn is_scan_always_available(&self) -> bool {
        self.scan_always.load(Ordering::SeqCst)
    }

    fn is_location_enabled(&self) -> bool {
        self.location.load(Ordering::SeqCst)
    }

    fn should_remain_enabled_in_airplane(&self) -> bool {
        self.remain_enabled_in_airplane.load(Ordering::SeqCst)
    }

    fn sta_bands(&self) -> u32 {
        self.sta_bands.load(Ordering::SeqCst)
    }

    fn set_sta_bands(&self, bands: u32) {
        self.sta_bands.store(bands, Ordering::SeqCst);
    }
}

// ===========================================================================
// Hooks
// ===========================================================================

/// Everything else the controller talks to, recording what it was told.
#[derive(Default)]
pub struct SimHooks {
    car_mode_uids: Mutex<HashSet<u32>>,
    system_uids: Mutex<HashSet<u32>>,
    legacy_uids: Mutex<HashSet<u32>>,
    dpp_in_progress: AtomicBool,
    recovery_in_progress: AtomicBool,
    scan_modes: Mutex<Vec<(bool, bool)>>,
    wifi_on: AtomicUsize,
    wifi_off: AtomicUsize,
    scan_mode_active: AtomicUsize,
    bug_reports: Mutex<Vec<(String, String)>>,
    connectivity_resets: AtomicUsize,
    recovery_triggers: Mutex<Vec<RecoveryReason>>,
    wifi_stopped: AtomicUsize,
    recoveries_completed: AtomicUsize,
    refused_soft_aps: Mutex<Vec<SoftApModeConfig>>,
}

impl SimHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant_car_mode_priority(&self, uid: u32) {
        lock(&self.car_mode_uids).insert(uid);
    }

    pub fn mark_system(&self, uid: u32) {
        lock(&self.system_uids).insert(uid);
    }

    pub fn mark_legacy(&self, uid: u32) {
        lock(&self.legacy_uids).insert(uid);
    }

    pub fn set_dpp_in_progress(&self, on: bool) {
        self.dpp_in_progress.store(on, Ordering::SeqCst);
    }

    pub fn set_recovery_in_progress(&self, on: bool) {
        self.recovery_in_progress.store(on, Ordering::SeqCst);
    }

    /// `(enabled, hidden_networks)` directives, oldest first.
    pub fn scan_modes(&self) -> Vec<(bool, bool)> {
        lock(&self.scan_modes).clone()
    }

    pub fn last_scan_mode(&self) -> Option<(bool, bool)> {
        lock(&self.scan_modes).last().copied()
    }

    pub fn wifi_on_reports(&self) -> usize {
        self.wifi_on.load(Ordering::SeqCst)
    }

    pub fn wifi_off_reports(&self) -> usize {
        self.wifi_off.load(Ordering::SeqCst)
    }

    pub fn scan_mode_active_reports(&self) -> usize {
        self.scan_mode_active.load(Ordering::SeqCst)
    }

    /// `(title, description)` of every bug report taken.
    pub fn bug_reports(&self) -> Vec<(String, String)> {
        lock(&self.bug_reports).clone()
    }

    pub fn connectivity_resets(&self) -> usize {
        self.connectivity_resets.load(Ordering::SeqCst)
    }

    pub fn recovery_triggers(&self) -> Vec<RecoveryReason> {
        lock(&self.recovery_triggers).clone()
    }

    pub fn wifi_stopped_reports(&self) -> usize {
        self.wifi_stopped.load(Ordering::SeqCst)
    }

    pub fn recoveries_completed(&self) -> usize {
        self.recoveries_completed.load(Ordering::SeqCst)
    }

    pub fn refused_soft_aps(&self) -> Vec<SoftApModeConfig> {
        lock(&self.refused_soft_aps).clone()
    }
}

impl PermissionChecker for SimHooks {
    fn has_car_mode_priority(&self, uid: u32) -> bool {
        lock(&self.car_mode_uids).contains(&uid)
    }

    fn is_system(&self, requestor: &Requestor) -> bool {
        lock(&self.system_uids).contains(&requestor.uid)
    }

    fn is_legacy(&self, requestor: &Requestor) -> bool {
        lock(&self.legacy_uids).contains(&requestor.uid)
    }
}

impl DppSessionMonitor for SimHooks {
    fn is_session_in_progress(&self) -> bool {
        self.dpp_in_progress.load(Ordering::SeqCst)
    }
}

impl ScanControl for SimHooks {
    fn set_scanning_enabled(&self, enabled: bool, hidden_networks: bool) {
        lock(&self.scan_modes).push((enabled, hidden_networks));
    }
}

impl BatteryStats for SimHooks {
    fn report_wifi_on(&self) {
        self.wifi_on.fetch_add(1, Ordering::SeqCst);
    }

    fn report_wifi_off(&self) {
        self.wifi_off.fetch_add(1, Ordering::SeqCst);
    }

    fn report_scan_mode_active(&self) {
        self.scan_mode_active.fetch_add(1, Ordering::SeqCst);
    }
}

impl Diagnostics for SimHooks {
    fn take_bug_report(&self, title: &str, description: &str) {
        lock(&self.bug_reports).push((title.to_string(), description.to_string()));
    }
}

impl ConnectivityReset for SimHooks {
    fn reset_on_wifi_disable(&self) {
        self.connectivity_resets.fetch_add(1, Ordering::SeqCst);
    }
}

impl RecoveryTracker for SimHooks {
    fn trigger(&self, reason: RecoveryReason) {
        lock(&self.recovery_triggers).push(reason);
    }

    fn on_wifi_stopped(&self) {
        self.wifi_stopped.fetch_add(1, Ordering::SeqCst);
    }

    fn on_recovery_completed(&self) {
        self.recoveries_completed.fetch_add(1, Ordering::SeqCst);
    }

    fn is_recovery_in_progress(&self) -> bool {
        self.recovery_in_progress.load(Ordering::SeqCst)
    }
}

impl SoftApStateListener for SimHooks {
    fn on_start_refused(&self, config: &SoftApModeConfig) {
        lock(&self.refused_soft_aps).push(config.clone());
    }
}

// ===========================================================================
// Driver
// ===========================================================================

/// The full set of simulated collaborators.
#[derive(Clone)]
pub struct SimDriver {
    pub factory: Arc<SimFactory>,
    pub oracle: Arc<SimOracle>,
    pub settings: Arc<SimSettings>,
    pub hooks: Arc<SimHooks>,
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDriver {
    pub fn new() -> Self {
        Self::with_oracle(SimOracle::new())
    }

    pub fn with_oracle(oracle: SimOracle) -> Self {
        Self {
            factory: Arc::new(SimFactory::new()),
            oracle: Arc::new(oracle),
            settings: Arc::new(SimSettings::new()),
            hooks: Arc::new(SimHooks::new()),
        }
    }

    /// Controller dependencies backed by this driver.
    pub fn dependencies(&self) -> Dependencies {
        let hooks = &self.hooks;
        Dependencies::new(
            self.factory.clone(),
            self.oracle.clone(),
            self.settings.clone(),
        )
        .with_permissions(hooks.clone())
        .with_dpp(hooks.clone())
        .with_scan(hooks.clone())
        .with_battery(hooks.clone())
        .with_diagnostics(hooks.clone())
        .with_connectivity(hooks.clone())
        .with_recovery(hooks.clone())
        .with_soft_ap_state(hooks.clone())
    }
}
