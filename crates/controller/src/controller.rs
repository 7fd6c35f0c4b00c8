//! Public handle of the mode controller.
//!
//! [`ModeController`] is cheap to call from any thread. Inputs are turned
//! into [`Message`]s and posted to the controller's [`SerialRunner`];
//! queries that need controller state go through the runner's bounded
//! blocking bridge, while snapshot getters read [`ServiceSnapshot`] directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use modewarden_events::{
    EventBusRef, Fanout, ModeChangeObserver, ObserverId, PrimaryChangedObserver, RestartObserver,
    ServiceSnapshot,
};
use modewarden_roles::{
    ConnectionInfo, FeatureSet, ManagerId, ManagerInfo, ManagerKind, Network, Role, SecondaryRole,
    SoftApCapability, SoftApConfiguration, SoftApMode, SoftApModeConfig, WifiState, WorkSource,
};
use modewarden_runner::{RunnerConfig, SerialRunner};
use tokio::sync::oneshot;

use crate::config::ControllerConfig;
use crate::deps::{Dependencies, RecoveryTracker};
use crate::error::Result;
use crate::graveyard::GraveyardEntry;
use crate::machine::{ControllerState, Core, Effect};
use crate::manager::{EventDelivery, ManagerEvent};
use crate::message::{Message, RecoveryReason, SoftApCommand};
use crate::policy::RoleRequest;

struct Shared {
    core: Mutex<Core>,
    fanout: Fanout,
    snapshot: Arc<ServiceSnapshot>,
    runner: SerialRunner,
    recovery: Arc<dyn RecoveryTracker>,
    track_emergency_call_state: bool,
    shutting_down: AtomicBool,
}

impl Shared {
    fn core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(|poisoned| {
            tracing::error!("controller state lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Run `f` against the core, then apply what it produced with the lock
    /// released.
    fn with_core<T>(self: &Arc<Self>, f: impl FnOnce(&mut Core) -> T) -> T {
        let (value, effects) = {
            let mut core = self.core();
            let value = f(&mut core);
            (value, core.take_effects())
        };
        self.apply(effects);
        value
    }

    fn apply(self: &Arc<Self>, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Notify(event) => self.fanout.dispatch(&event),
                Effect::Answer(listener, info) => listener(info),
                Effect::Post(msg) => self.post(msg),
                Effect::PostDelayed(msg, delay) => self.post_delayed(msg, delay),
            }
        }
    }

    fn post(self: &Arc<Self>, msg: Message) {
        let label = msg.label();
        let weak = Arc::downgrade(self);
        if !self.runner.post(move || handle(&weak, msg)) {
            tracing::warn!(message = label, "runner shut down, message dropped");
        }
    }

    fn post_delayed(self: &Arc<Self>, msg: Message, delay: Duration) {
        let label = msg.label();
        let weak = Arc::downgrade(self);
        if self
            .runner
            .post_delayed(move || handle(&weak, msg), delay)
            .is_none()
        {
            tracing::warn!(message = label, "runner shut down, delayed message dropped");
        }
    }

    fn post_job(self: &Arc<Self>, task: &'static str, f: impl FnOnce(&mut Core) + Send + 'static) {
        let weak = Arc::downgrade(self);
        let posted = self.runner.post(move || {
            if let Some(shared) = weak.upgrade() {
                shared.with_core(f);
            }
        });
        if !posted {
            tracing::warn!(task, "runner shut down, job dropped");
        }
    }

    /// Blocking read of controller state, `default` on timeout.
    fn query<T: Send + 'static>(
        self: &Arc<Self>,
        task: &str,
        f: impl FnOnce(&Core) -> T + Send + 'static,
        default: T,
    ) -> T {
        let shared = Arc::clone(self);
        self.runner.call(
            task,
            move || {
                let core = shared.core();
                f(&core)
            },
            default,
        )
    }
}

fn handle(weak: &Weak<Shared>, msg: Message) {
    if let Some(shared) = weak.upgrade() {
        shared.with_core(|core| core.handle(msg));
    }
}

/// Controller of the device's Wi-Fi interfaces.
///
/// The controller owns its runner; dropping it shuts the runner down.
pub struct ModeController {
    shared: Arc<Shared>,
}

impl ModeController {
    /// Build a controller on `runner`. Call [`start`](Self::start) once the
    /// collaborators are ready.
    pub fn new(deps: Dependencies, config: ControllerConfig, runner: SerialRunner) -> Self {
        Self::build(deps, config, runner, Fanout::new())
    }

    /// Like [`new`](Self::new), mirroring every event onto `bus`.
    pub fn with_bus(
        deps: Dependencies,
        config: ControllerConfig,
        runner: SerialRunner,
        bus: EventBusRef,
    ) -> Self {
        Self::build(deps, config, runner, Fanout::with_bus(bus))
    }

    /// Build a controller on its own runner thread.
    pub fn spawn(deps: Dependencies, config: ControllerConfig) -> Result<Self> {
        let runner = SerialRunner::spawn(RunnerConfig::named("modewarden"))?;
        Ok(Self::new(deps, config, runner))
    }

    fn build(
        deps: Dependencies,
        config: ControllerConfig,
        runner: SerialRunner,
        fanout: Fanout,
    ) -> Self {
        let snapshot = Arc::new(ServiceSnapshot::new());
        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let weak = weak.clone();
            let delivery: EventDelivery = Arc::new(move |id: ManagerId, event: ManagerEvent| {
                match weak.upgrade() {
                    Some(shared) => shared.post(Message::Lifecycle(id, event)),
                    None => tracing::debug!(id = %id, event = %event, "controller gone"),
                }
            });
            Shared {
                recovery: Arc::clone(&deps.recovery),
                track_emergency_call_state: config.track_emergency_call_state,
                core: Mutex::new(Core::new(deps, config, Arc::clone(&snapshot), delivery)),
                fanout,
                snapshot,
                runner,
                shutting_down: AtomicBool::new(false),
            }
        });
        Self { shared }
    }

    pub fn runner(&self) -> &SerialRunner {
        &self.shared.runner
    }

    /// Bring the controller up from persisted settings.
    pub fn start(&self) {
        self.shared.post_job("start", Core::start);
    }

    /// Stop accepting work. Managers are left as they are.
    pub fn shutdown(&self) {
        self.notify_shutting_down();
        self.shared.runner.shutdown();
    }

    // --- inputs ---

    pub fn wifi_toggled(&self, requestor: WorkSource) {
        self.shared.post(Message::WifiToggled(requestor));
    }

    pub fn airplane_mode_toggled(&self) {
        self.shared.post(Message::AirplaneToggled);
    }

    pub fn satellite_mode_changed(&self) {
        self.shared.post(Message::SatelliteModeChanged);
    }

    pub fn scan_always_mode_changed(&self, requestor: WorkSource) {
        self.shared.post(Message::ScanAlwaysModeChanged(requestor));
    }

    /// Location affects scan-only eligibility just like scan-always.
    pub fn location_mode_changed(&self) {
        self.shared
            .post(Message::ScanAlwaysModeChanged(WorkSource::settings()));
    }

    pub fn emergency_callback_mode_changed(&self, on: bool) {
        self.shared.post(Message::EmergencyCallbackModeChanged(on));
    }

    /// Ignored unless emergency call tracking is configured.
    pub fn emergency_call_state_changed(&self, in_call: bool) {
        if !self.shared.track_emergency_call_state {
            tracing::debug!(in_call, "emergency call tracking disabled, ignoring");
            return;
        }
        self.shared.post(Message::EmergencyCallStateChanged(in_call));
    }

    pub fn set_emergency_scan_in_progress(&self, in_progress: bool, requestor: WorkSource) {
        self.shared.post(Message::EmergencyScanStateChanged {
            in_progress,
            requestor,
        });
    }

    // --- soft AP ---

    pub fn start_soft_ap(&self, config: SoftApModeConfig, requestor: WorkSource) {
        self.shared
            .post(Message::SetSoftAp(SoftApCommand::Start { config, requestor }));
    }

    /// Stop soft-APs in `mode`, or all of them.
    pub fn stop_soft_ap(&self, mode: Option<SoftApMode>) {
        self.shared
            .post(Message::SetSoftAp(SoftApCommand::Stop { mode }));
    }

    pub fn update_soft_ap_capability(&self, capability: SoftApCapability, mode: SoftApMode) {
        self.shared
            .post(Message::UpdateApCapability { capability, mode });
    }

    pub fn update_soft_ap_configuration(&self, configuration: SoftApConfiguration) {
        self.shared.post(Message::UpdateApConfig(configuration));
    }

    // --- additional clients ---

    /// Ask for an additional client. `listener` is called exactly once on
    /// the runner with the granted manager, or `None`.
    pub fn request_client_mode_manager(
        &self,
        request: RoleRequest,
        listener: impl FnOnce(Option<ManagerInfo>) + Send + 'static,
    ) {
        self.shared.post(Message::RequestAdditional {
            request,
            listener: Box::new(listener),
        });
    }

    pub fn request_local_only_client_mode_manager(
        &self,
        requestor: WorkSource,
        ssid: &str,
        bssid: Option<&str>,
        approved: bool,
        prefer_secondary: bool,
        listener: impl FnOnce(Option<ManagerInfo>) + Send + 'static,
    ) {
        let request = RoleRequest::new(SecondaryRole::LocalOnly, requestor)
            .with_target(ssid, bssid)
            .approved(approved)
            .prefer_secondary(prefer_secondary);
        self.request_client_mode_manager(request, listener);
    }

    pub fn request_secondary_long_lived_client_mode_manager(
        &self,
        requestor: WorkSource,
        ssid: &str,
        bssid: Option<&str>,
        listener: impl FnOnce(Option<ManagerInfo>) + Send + 'static,
    ) {
        let request = RoleRequest::new(SecondaryRole::SecondaryLongLived, requestor)
            .with_target(ssid, bssid);
        self.request_client_mode_manager(request, listener);
    }

    pub fn request_secondary_transient_client_mode_manager(
        &self,
        requestor: WorkSource,
        ssid: &str,
        bssid: Option<&str>,
        listener: impl FnOnce(Option<ManagerInfo>) + Send + 'static,
    ) {
        let request = RoleRequest::new(SecondaryRole::SecondaryTransient, requestor)
            .with_target(ssid, bssid);
        self.request_client_mode_manager(request, listener);
    }

    /// Async form of [`request_client_mode_manager`](Self::request_client_mode_manager).
    pub async fn request_client_mode_manager_async(
        &self,
        request: RoleRequest,
    ) -> Option<ManagerInfo> {
        let (tx, rx) = oneshot::channel();
        self.request_client_mode_manager(request, move |info| {
            let _ = tx.send(info);
        });
        rx.await.ok().flatten()
    }

    /// Stop an additional client. Primary and scan-only clients are refused.
    pub fn remove_client_mode_manager(&self, manager: &ManagerInfo) {
        self.shared.post(Message::RemoveAdditional(manager.id));
    }

    pub fn stop_all_client_mode_managers_in_role(&self, role: Role) {
        if !role.is_client() {
            tracing::warn!(role = %role, "not a client role, ignoring");
            return;
        }
        self.shared
            .post_job("stop_all_in_role", move |core| core.stop_clients_in_role(role));
    }

    pub fn set_allow_root_to_get_local_only_cmm(&self, allow: bool) {
        self.shared
            .post_job("allow_root_local_only", move |core| {
                core.set_allow_root_local_only(allow)
            });
    }

    pub fn update_client_scan_mode_after_country_code_update(&self, country_code: Option<String>) {
        self.shared.post_job("country_code", move |core| {
            core.update_scan_mode_for_country_code(country_code)
        });
    }

    // --- recovery ---

    pub fn recovery_restart_wifi(&self, reason: RecoveryReason, bug_report: bool) {
        self.shared.post(Message::RecoveryRestart {
            reason: reason.to_string(),
            bug_report,
        });
    }

    pub fn recovery_disable_wifi(&self) {
        self.shared.post(Message::RecoveryDisable);
    }

    /// Native daemon status. A daemon that is not ready triggers recovery
    /// unless the controller is shutting down.
    pub fn on_native_status_changed(&self, ready: bool) {
        if ready {
            return;
        }
        if self.is_shutting_down() {
            tracing::info!("native daemon not ready during shutdown, ignoring");
            return;
        }
        tracing::error!("native daemon not ready, triggering recovery");
        self.shared.recovery.trigger(RecoveryReason::NativeFailure);
    }

    pub fn notify_shutting_down(&self) {
        self.shared.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutting_down.load(Ordering::SeqCst)
    }

    // --- observers ---

    pub fn register_mode_change_observer(
        &self,
        observer: Arc<dyn ModeChangeObserver>,
    ) -> ObserverId {
        self.shared.fanout.mode_change.register(observer)
    }

    pub fn unregister_mode_change_observer(&self, id: ObserverId) -> bool {
        self.shared.fanout.mode_change.unregister(id)
    }

    /// Register `observer` and, if a primary exists, tell it about that
    /// primary on the runner.
    pub fn register_primary_changed_observer(
        &self,
        observer: Arc<dyn PrimaryChangedObserver>,
    ) -> ObserverId {
        let id = self.shared.fanout.primary_changed.register(observer);
        let weak = Arc::downgrade(&self.shared);
        self.shared.runner.post(move || {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let primary = shared.core().client_in_role(Role::ClientPrimary);
            if let (Some(primary), Some(observer)) =
                (primary, shared.fanout.primary_changed.get(id))
            {
                observer.on_primary_changed(None, Some(&primary));
            }
        });
        id
    }

    pub fn unregister_primary_changed_observer(&self, id: ObserverId) -> bool {
        self.shared.fanout.primary_changed.unregister(id)
    }

    pub fn register_restart_observer(&self, observer: Arc<dyn RestartObserver>) -> ObserverId {
        self.shared.fanout.restart.register(observer)
    }

    pub fn unregister_restart_observer(&self, id: ObserverId) -> bool {
        self.shared.fanout.restart.unregister(id)
    }

    // --- blocking queries ---

    pub fn client_mode_managers(&self) -> Vec<ManagerInfo> {
        self.shared
            .query("client_mode_managers", Core::client_infos, Vec::new())
    }

    pub fn soft_ap_managers(&self) -> Vec<ManagerInfo> {
        self.shared
            .query("soft_ap_managers", Core::soft_ap_infos, Vec::new())
    }

    pub fn client_mode_manager_in_role(&self, role: Role) -> Option<ManagerInfo> {
        self.shared
            .query("client_in_role", move |core| core.client_in_role(role), None)
    }

    pub fn client_mode_managers_in_roles(&self, roles: &[Role]) -> Vec<ManagerInfo> {
        let roles = roles.to_vec();
        self.shared.query(
            "clients_in_roles",
            move |core| {
                core.client_infos()
                    .into_iter()
                    .filter(|info| info.role.is_some_and(|r| roles.contains(&r)))
                    .collect()
            },
            Vec::new(),
        )
    }

    pub fn primary_client_mode_manager(&self) -> Option<ManagerInfo> {
        self.client_mode_manager_in_role(Role::ClientPrimary)
    }

    pub fn scan_only_client_mode_manager(&self) -> Option<ManagerInfo> {
        self.client_mode_manager_in_role(Role::ClientScanOnly)
    }

    pub fn has_primary_client_mode_manager(&self) -> bool {
        self.primary_client_mode_manager().is_some()
    }

    /// Clients that may carry internet traffic.
    pub fn internet_connectivity_client_mode_managers(&self) -> Vec<ManagerInfo> {
        self.shared.query(
            "internet_connectivity_clients",
            Core::internet_connectivity_clients,
            Vec::new(),
        )
    }

    pub fn tethered_soft_ap_manager(&self) -> Option<ManagerInfo> {
        self.shared.query(
            "tethered_soft_ap",
            |core| core.soft_ap_in_role(Role::SoftApTethered),
            None,
        )
    }

    pub fn local_only_soft_ap_manager(&self) -> Option<ManagerInfo> {
        self.shared.query(
            "local_only_soft_ap",
            |core| core.soft_ap_in_role(Role::SoftApLocalOnly),
            None,
        )
    }

    pub fn current_state(&self) -> Option<ControllerState> {
        self.shared
            .query("current_state", |core| Some(core.state()), None)
    }

    pub fn is_in_emergency_mode(&self) -> bool {
        self.shared
            .query("is_in_emergency_mode", Core::is_in_emergency_mode, false)
    }

    pub fn graveyard(&self, kind: ManagerKind) -> Vec<GraveyardEntry> {
        self.shared
            .query("graveyard", move |core| core.graveyard(kind), Vec::new())
    }

    pub fn dump(&self) -> String {
        self.shared.query("dump", Core::dump, String::new())
    }

    // --- capability checks ---

    pub fn can_request_more_client_mode_managers_in_role(
        &self,
        requestor: &WorkSource,
        role: SecondaryRole,
        approved: bool,
    ) -> bool {
        let requestor = requestor.clone();
        self.shared.query(
            "can_request_more_clients",
            move |core| {
                core.policy()
                    .can_request_more_client_managers_in_role(&requestor, role, approved)
            },
            false,
        )
    }

    pub fn can_request_more_soft_ap_managers(&self, requestor: &WorkSource) -> bool {
        let requestor = requestor.clone();
        self.shared.query(
            "can_request_more_soft_aps",
            move |core| core.policy().can_request_more_soft_ap_managers(&requestor),
            false,
        )
    }

    pub fn is_sta_sta_concurrency_supported_for_local_only(&self) -> bool {
        self.sta_sta_supported_for(SecondaryRole::LocalOnly)
    }

    pub fn is_sta_sta_concurrency_supported_for_mbb(&self) -> bool {
        self.sta_sta_supported_for(SecondaryRole::SecondaryTransient)
    }

    pub fn is_sta_sta_concurrency_supported_for_restricted(&self) -> bool {
        self.shared.query(
            "sta_sta_restricted",
            |core| core.policy().is_sta_sta_supported_for_restricted(),
            false,
        )
    }

    pub fn is_sta_sta_concurrency_supported_for_multi_internet(&self) -> bool {
        self.shared.query(
            "sta_sta_multi_internet",
            |core| core.policy().is_sta_sta_supported_for_multi_internet(),
            false,
        )
    }

    fn sta_sta_supported_for(&self, role: SecondaryRole) -> bool {
        self.shared.query(
            "sta_sta_supported",
            move |core| core.policy().is_sta_sta_supported_for(role),
            false,
        )
    }

    // --- snapshot ---

    pub fn snapshot(&self) -> &Arc<ServiceSnapshot> {
        &self.shared.snapshot
    }

    pub fn current_network(&self) -> Option<Network> {
        self.shared.snapshot.current_network()
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        self.shared.snapshot.connection_info()
    }

    pub fn supported_feature_set(&self) -> FeatureSet {
        self.shared.snapshot.feature_set()
    }

    pub fn is_band_supported_for_sta(&self, band: u32) -> bool {
        self.shared.snapshot.is_band_supported_for_sta(band)
    }

    pub fn wifi_state(&self) -> WifiState {
        self.shared.snapshot.wifi_state()
    }

    /// Requestors of live local-only and long-lived secondary clients.
    pub fn secondary_request_worksources(&self) -> Vec<WorkSource> {
        self.shared.snapshot.request_worksources()
    }
}

impl Drop for ModeController {
    fn drop(&mut self) {
        self.shared.runner.shutdown();
    }
}

impl std::fmt::Debug for ModeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModeController")
            .field("runner", &self.shared.runner)
            .field("wifi_state", &self.wifi_state())
            .finish()
    }
}
