//! The controller state machine.
//!
//! [`Core`] is only ever touched from jobs on the controller's runner. It
//! never calls observers, listeners or the runner directly; everything with
//! an outside effect is queued as an [`Effect`] and applied by the handle
//! once the core lock is released.
//!
//! ```text
//!   message ──► emergency inputs ──► emergency filter ──► Disabled | Enabled
//!                                                              │ not handled
//!                                                              ▼
//!                                                           Default
//! ```

mod actions;
mod lifecycle;
mod states;

use std::collections::VecDeque;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use modewarden_events::{ModeEvent, ServiceSnapshot};
use modewarden_roles::{ManagerInfo, ManagerKind, Role, WifiState, WorkSource};
use serde::Serialize;

use crate::config::ControllerConfig;
use crate::deps::Dependencies;
use crate::graveyard::{Graveyard, GraveyardEntry};
use crate::manager::{EventDelivery, RoleRequestListener};
use crate::message::Message;
use crate::policy::AdmissionPolicy;
use crate::registry::Registry;
use crate::ring::Ring;

/// Messages kept for [`Core::dump`].
pub const MESSAGE_LOG_DEPTH: usize = 100;

/// Top-level controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    /// No mode manager exists.
    Disabled,
    /// At least one mode manager exists.
    Enabled,
}

impl ControllerState {
    pub fn label(&self) -> &'static str {
        match self {
            ControllerState::Disabled => "disabled",
            ControllerState::Enabled => "enabled",
        }
    }
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Outside work produced while processing, applied in order.
pub(crate) enum Effect {
    Notify(ModeEvent),
    Answer(RoleRequestListener, Option<ManagerInfo>),
    Post(Message),
    PostDelayed(Message, Duration),
}

/// Result of a per-state handler.
pub(crate) enum Flow {
    Handled,
    NotHandled(Message),
}

struct LogEntry {
    at: DateTime<Utc>,
    state: ControllerState,
    message: String,
}

pub(crate) struct Core {
    deps: Dependencies,
    config: ControllerConfig,
    snapshot: Arc<ServiceSnapshot>,
    delivery: EventDelivery,
    started: bool,
    state: ControllerState,
    transitioned: bool,
    registry: Registry,
    graveyard: Graveyard,
    deferred: VecDeque<Message>,
    effects: Vec<Effect>,
    last_primary_requestor: WorkSource,
    last_scan_only_requestor: WorkSource,
    /// Manager last announced as primary to observers.
    last_primary: Option<ManagerInfo>,
    emergency_callback_mode: bool,
    emergency_call: bool,
    emergency_scan_in_progress: bool,
    recovering: bool,
    allow_root_local_only: bool,
    multiple_primary_bug_report_taken: bool,
    country_code: Option<String>,
    log: Ring<LogEntry, MESSAGE_LOG_DEPTH>,
}

impl Core {
    pub fn new(
        deps: Dependencies,
        config: ControllerConfig,
        snapshot: Arc<ServiceSnapshot>,
        delivery: EventDelivery,
    ) -> Self {
        let allow_root_local_only = config.allow_root_local_only;
        Self {
            deps,
            config,
            snapshot,
            delivery,
            started: false,
            state: ControllerState::Disabled,
            transitioned: false,
            registry: Registry::new(),
            graveyard: Graveyard::new(),
            deferred: VecDeque::new(),
            effects: Vec::new(),
            last_primary_requestor: WorkSource::settings(),
            last_scan_only_requestor: WorkSource::internal(),
            last_primary: None,
            emergency_callback_mode: false,
            emergency_call: false,
            emergency_scan_in_progress: false,
            recovering: false,
            allow_root_local_only,
            multiple_primary_bug_report_taken: false,
            country_code: None,
            log: Ring::new(),
        }
    }

    /// Initial state from persisted settings. Only the first call has any
    /// effect.
    pub fn start(&mut self) {
        if self.started {
            tracing::warn!("controller already started");
            return;
        }
        self.started = true;
        self.last_primary_requestor = WorkSource::settings();
        self.last_scan_only_requestor = WorkSource::internal();
        self.update_feature_set(None);

        if self.should_enable_sta() && self.start_primary_or_scan_only(WorkSource::settings()) {
            self.state = ControllerState::Enabled;
        } else {
            self.state = ControllerState::Disabled;
        }
        tracing::info!(state = %self.state, "controller started");
    }

    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Process `msg` and anything it releases from the deferred queue.
    pub fn handle(&mut self, msg: Message) {
        if !self.started {
            tracing::warn!(message = msg.label(), "controller not started, dropping message");
            if let Message::RequestAdditional { listener, .. } = msg {
                self.answer(listener, None);
            }
            return;
        }

        let mut queue = VecDeque::from([msg]);
        while let Some(msg) = queue.pop_front() {
            self.record(&msg);
            if let Message::Lifecycle(id, event) = msg {
                self.on_lifecycle(id, event);
                continue;
            }

            self.transitioned = false;
            self.process(msg);
            if self.transitioned {
                while let Some(deferred) = self.deferred.pop_back() {
                    queue.push_front(deferred);
                }
            }
        }
    }

    fn record(&mut self, msg: &Message) {
        self.log.push(LogEntry {
            at: Utc::now(),
            state: self.state,
            message: format!("{msg:?}"),
        });
    }

    // --- effects ---

    fn notify(&mut self, event: ModeEvent) {
        self.effects.push(Effect::Notify(event));
    }

    fn answer(&mut self, listener: RoleRequestListener, info: Option<ManagerInfo>) {
        self.effects.push(Effect::Answer(listener, info));
    }

    fn post(&mut self, msg: Message) {
        self.effects.push(Effect::Post(msg));
    }

    fn post_delayed(&mut self, msg: Message, delay: Duration) {
        self.effects.push(Effect::PostDelayed(msg, delay));
    }

    fn defer(&mut self, msg: Message) {
        tracing::info!(message = msg.label(), state = %self.state, "deferring message");
        self.deferred.push_back(msg);
    }

    fn transition_to(&mut self, next: ControllerState) {
        if self.state == next {
            return;
        }
        if self.state == ControllerState::Enabled && !self.registry.is_empty() {
            tracing::error!(
                managers = self.registry.len(),
                "exiting enabled state with active mode managers"
            );
        }
        tracing::info!(from = %self.state, to = %next, "state transition");
        self.state = next;
        self.transitioned = true;
        match next {
            ControllerState::Enabled if self.registry.is_empty() => {
                tracing::error!("entered enabled state without active mode managers");
            }
            ControllerState::Disabled if !self.registry.is_empty() => {
                tracing::error!(
                    managers = self.registry.len(),
                    "entered disabled state with active mode managers"
                );
            }
            _ => {}
        }
    }

    /// Enter `Enabled` if something was started.
    fn enter_enabled_if_active(&mut self) {
        if self.registry.is_empty() {
            tracing::warn!("nothing started, staying in {}", self.state);
        } else {
            self.transition_to(ControllerState::Enabled);
        }
    }

    // --- predicates ---

    fn scan_only_eligible(&self) -> bool {
        let settings = &self.deps.settings;
        (settings.is_location_enabled() && settings.is_scan_always_available())
            || self.emergency_scan_in_progress
    }

    pub fn should_enable_sta(&self) -> bool {
        let settings = &self.deps.settings;
        (settings.is_wifi_toggle_enabled() || self.scan_only_eligible())
            && !settings.is_satellite_mode_on()
    }

    /// Role the primary-or-scan-only manager should hold for the current
    /// toggles.
    fn role_for_toggles(&self) -> Option<Role> {
        if self.deps.settings.is_wifi_toggle_enabled() {
            Some(Role::ClientPrimary)
        } else if self.scan_only_eligible() {
            Some(Role::ClientScanOnly)
        } else {
            None
        }
    }

    pub fn is_in_emergency_mode(&self) -> bool {
        self.emergency_call || self.emergency_callback_mode
    }

    fn emergency_requires_wifi_off(&self) -> bool {
        self.is_in_emergency_mode() && self.config.disable_wifi_in_emergency
    }

    fn is_recovery_in_progress(&self) -> bool {
        self.recovering || self.deps.recovery.is_recovery_in_progress()
    }

    fn wifi_state(&self) -> WifiState {
        self.snapshot.wifi_state()
    }

    fn set_wifi_state(&mut self, state: WifiState) {
        let previous = self.snapshot.set_wifi_state(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "wifi state");
        }
    }

    pub(crate) fn policy(&self) -> AdmissionPolicy<'_> {
        AdmissionPolicy {
            oracle: self.deps.oracle.as_ref(),
            permissions: self.deps.permissions.as_ref(),
            dpp: self.deps.dpp.as_ref(),
            config: &self.config,
            allow_root_local_only: self.allow_root_local_only,
        }
    }

    pub fn set_allow_root_local_only(&mut self, allow: bool) {
        self.allow_root_local_only = allow;
    }

    // --- queries ---

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn client_infos(&self) -> Vec<ManagerInfo> {
        self.registry.client_infos()
    }

    pub fn soft_ap_infos(&self) -> Vec<ManagerInfo> {
        self.registry.soft_ap_infos()
    }

    pub fn client_in_role(&self, role: Role) -> Option<ManagerInfo> {
        self.registry.client_in_role(role).map(|c| c.info())
    }

    pub fn soft_ap_in_role(&self, role: Role) -> Option<ManagerInfo> {
        self.registry
            .soft_aps()
            .find(|a| a.role() == role && !a.stopping)
            .map(|a| a.info())
    }

    pub fn internet_connectivity_clients(&self) -> Vec<ManagerInfo> {
        self.registry
            .clients()
            .filter(|c| c.active_role().is_some_and(|r| r.is_internet_connectivity()))
            .map(|c| c.info())
            .collect()
    }

    pub fn graveyard(&self, kind: ManagerKind) -> Vec<GraveyardEntry> {
        self.graveyard.entries(kind)
    }

    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "state: {}", self.state);
        let _ = writeln!(out, "wifi state: {}", self.wifi_state());
        let _ = writeln!(
            out,
            "emergency: call={} callback_mode={} scan={}",
            self.emergency_call, self.emergency_callback_mode, self.emergency_scan_in_progress
        );
        let _ = writeln!(out, "recovering: {}", self.recovering);
        let _ = writeln!(out, "feature set: {}", self.snapshot.feature_set());
        let _ = writeln!(out, "sta bands: {:#x}", self.snapshot.sta_bands());
        let _ = writeln!(out, "last primary requestor: {}", self.last_primary_requestor);
        let _ = writeln!(out, "last scan-only requestor: {}", self.last_scan_only_requestor);
        if let Some(cc) = &self.country_code {
            let _ = writeln!(out, "country code: {cc}");
        }
        let _ = writeln!(out, "deferred: {}", self.deferred.len());
        let _ = writeln!(out, "managers ({}):", self.registry.len());
        for info in self.soft_ap_infos().iter().chain(self.client_infos().iter()) {
            let _ = writeln!(out, "  {info}");
        }
        self.graveyard.dump(&mut out);
        let _ = writeln!(out, "recent messages ({}):", self.log.len());
        for entry in self.log.iter() {
            let _ = writeln!(
                out,
                "  {} [{}] {}",
                entry.at.format("%m-%d %H:%M:%S%.3f"),
                entry.state,
                entry.message
            );
        }
        out
    }
}
