//! Per-state message handlers.

use modewarden_events::ModeEvent;
use modewarden_roles::{ManagerId, ManagerInfo, Role, SoftApMode, WifiState, WorkSource};

use super::{ControllerState, Core, Flow};
use crate::message::{Message, RecoverySnapshot, SoftApCommand};
use crate::policy::{Admission, RoleRequest};
use crate::manager::RoleRequestListener;

impl Core {
    pub(super) fn process(&mut self, msg: Message) {
        let msg = match msg {
            Message::EmergencyCallbackModeChanged(_) | Message::EmergencyCallStateChanged(_) => {
                self.handle_emergency_mode_change(msg);
                return;
            }
            Message::EmergencyScanStateChanged {
                in_progress,
                requestor,
            } => {
                self.handle_emergency_scan_change(in_progress, requestor);
                return;
            }
            other => other,
        };

        if self.is_in_emergency_mode() {
            self.process_in_emergency_mode(msg);
            return;
        }

        let flow = match self.state {
            ControllerState::Disabled => self.process_disabled(msg),
            ControllerState::Enabled => self.process_enabled(msg),
        };
        if let Flow::NotHandled(msg) = flow {
            self.process_default(msg);
        }
    }

    // --- emergency ---

    fn handle_emergency_mode_change(&mut self, msg: Message) {
        let was_in_emergency = self.is_in_emergency_mode();
        match msg {
            Message::EmergencyCallbackModeChanged(on) => self.emergency_callback_mode = on,
            Message::EmergencyCallStateChanged(on) => self.emergency_call = on,
            _ => return,
        }
        let in_emergency = self.is_in_emergency_mode();
        if !was_in_emergency && in_emergency {
            self.enter_emergency_mode();
        } else if was_in_emergency && !in_emergency {
            tracing::info!("exiting emergency mode");
            self.post(Message::WifiToggled(WorkSource::settings()));
        }
    }

    fn enter_emergency_mode(&mut self) {
        tracing::info!(
            disable_wifi = self.config.disable_wifi_in_emergency,
            scan_in_progress = self.emergency_scan_in_progress,
            "entering emergency mode"
        );
        self.stop_soft_aps(None);
        if !self.config.disable_wifi_in_emergency {
            return;
        }
        if self.emergency_scan_in_progress {
            self.switch_all_primary_to_scan_only(WorkSource::settings());
        } else {
            self.shutdown();
        }
    }

    fn handle_emergency_scan_change(&mut self, in_progress: bool, requestor: WorkSource) {
        tracing::info!(in_progress, "emergency scan state changed");
        self.emergency_scan_in_progress = in_progress;
        if self.emergency_requires_wifi_off() {
            match self.state {
                ControllerState::Disabled if in_progress => {
                    self.start_scan_only(requestor);
                    self.enter_enabled_if_active();
                }
                ControllerState::Enabled if !in_progress => self.stop_all_clients(),
                _ => {}
            }
            return;
        }
        match self.state {
            ControllerState::Disabled => self.toggle_in_disabled(requestor),
            ControllerState::Enabled => self.toggle_in_enabled(requestor),
        }
    }

    fn process_in_emergency_mode(&mut self, msg: Message) {
        match msg {
            msg if msg.is_stop_or_failure() => {
                tracing::info!(message = msg.label(), "processing in emergency mode");
                if self.registry.is_empty() {
                    self.transition_to(ControllerState::Disabled);
                }
            }
            Message::SetSoftAp(SoftApCommand::Start { config, .. }) => {
                tracing::info!(mode = %config.mode, "soft AP cannot start in emergency mode");
                self.deps.soft_ap_state.on_start_refused(&config);
            }
            Message::RequestAdditional { request, listener } => {
                tracing::info!(role = %request.role, "role request refused in emergency mode");
                self.answer(listener, None);
            }
            other => {
                tracing::info!(message = other.label(), "dropping message in emergency mode");
            }
        }
    }

    // --- default ---

    fn process_default(&mut self, msg: Message) {
        match msg {
            Message::WifiToggled(_)
            | Message::ScanAlwaysModeChanged(_)
            | Message::StaStopped
            | Message::StaStartFailure
            | Message::ApStopped
            | Message::ApStartFailure
            | Message::RecoveryRestart { .. }
            | Message::RecoveryRestartContinue(_)
            | Message::DeferredRecoveryRestart(_)
            | Message::RemoveAdditional(_)
            | Message::SetSoftAp(SoftApCommand::Stop { .. }) => {}
            Message::RequestAdditional { listener, .. } => self.answer(listener, None),
            Message::RecoveryDisable => {
                tracing::info!("recovery throttled, disabling wifi");
                self.shutdown();
            }
            Message::AirplaneToggled => {
                if self.deps.settings.is_satellite_mode_on() {
                    tracing::info!("satellite mode on, ignoring airplane toggle");
                    return;
                }
                self.check_airplane_mode();
            }
            Message::UpdateApCapability { capability, mode } => {
                self.update_soft_ap_capability(&capability, mode);
            }
            Message::UpdateApConfig(configuration) => {
                self.update_soft_ap_configuration(&configuration);
            }
            Message::SatelliteModeChanged => {
                if self.deps.settings.is_satellite_mode_on() {
                    tracing::info!("satellite mode on, disabling wifi");
                    self.shutdown();
                } else {
                    tracing::info!("satellite mode off, checking airplane mode");
                    self.check_airplane_mode();
                }
            }
            other => {
                tracing::warn!(message = other.label(), state = %self.state, "unhandled message");
            }
        }
    }

    fn check_airplane_mode(&mut self) {
        let settings = &self.deps.settings;
        if settings.is_airplane_mode_on() {
            if !settings.should_remain_enabled_in_airplane() {
                tracing::info!("airplane mode on, disabling wifi");
                self.shutdown();
            }
        } else if self.should_enable_sta() {
            tracing::info!("airplane mode off, enabling wifi");
            self.start_primary_or_scan_only(WorkSource::settings());
            self.enter_enabled_if_active();
        }
    }

    // --- toggles ---

    fn toggle_in_disabled(&mut self, requestor: WorkSource) {
        if self.should_enable_sta() {
            self.start_primary_or_scan_only(requestor);
            self.enter_enabled_if_active();
        }
    }

    fn toggle_in_enabled(&mut self, requestor: WorkSource) {
        if !self.should_enable_sta() {
            self.stop_all_clients();
            self.deps.connectivity.reset_on_wifi_disable();
            return;
        }
        if self.registry.has_primary_or_scan_only() {
            if !self.deps.settings.is_wifi_toggle_enabled() {
                self.stop_secondary_clients();
                self.deps.connectivity.reset_on_wifi_disable();
            }
            self.switch_all_primary_or_scan_only();
        } else {
            self.start_primary_or_scan_only(requestor);
        }
    }

    // --- disabled ---

    fn process_disabled(&mut self, msg: Message) -> Flow {
        match msg {
            Message::WifiToggled(ws) | Message::ScanAlwaysModeChanged(ws) => {
                self.toggle_in_disabled(ws);
            }
            Message::SetSoftAp(SoftApCommand::Start { config, requestor }) => {
                self.start_soft_ap(config, requestor);
                self.enter_enabled_if_active();
            }
            Message::SetSoftAp(SoftApCommand::Stop { .. }) => {}
            Message::RecoveryRestart { .. } => {
                tracing::info!("recovery triggered while disabled");
                let delay = self.config.recovery_delay();
                self.post_delayed(Message::RecoveryRestartContinue(Vec::new()), delay);
            }
            Message::DeferredRecoveryRestart(snapshots) => {
                let delay = self.config.recovery_delay();
                self.post_delayed(Message::RecoveryRestartContinue(snapshots), delay);
            }
            Message::RecoveryRestartContinue(snapshots) => {
                self.recovering = false;
                if snapshots.is_empty() {
                    if self.should_enable_sta() {
                        self.start_primary_or_scan_only(WorkSource::settings());
                        self.enter_enabled_if_active();
                    }
                    return Flow::Handled;
                }
                tracing::info!(managers = snapshots.len(), "recovery restarting modes");
                for snapshot in snapshots {
                    match snapshot {
                        RecoverySnapshot::Client { requestor, .. } => {
                            self.start_primary_or_scan_only(requestor);
                        }
                        RecoverySnapshot::SoftAp { config, requestor } => {
                            self.start_soft_ap(config, requestor);
                        }
                    }
                }
                self.enter_enabled_if_active();
                self.notify(ModeEvent::SubsystemRestarted);
                self.deps.recovery.on_recovery_completed();
            }
            other => return Flow::NotHandled(other),
        }
        Flow::Handled
    }

    // --- enabled ---

    fn process_enabled(&mut self, msg: Message) -> Flow {
        match msg {
            Message::WifiToggled(ws) | Message::ScanAlwaysModeChanged(ws) => {
                self.toggle_in_enabled(ws);
            }
            Message::RequestAdditional { request, listener } => {
                self.handle_role_request(request, listener);
            }
            Message::RemoveAdditional(id) => self.stop_additional(id),
            Message::SetSoftAp(SoftApCommand::Start { config, requestor }) => {
                self.start_soft_ap(config, requestor);
            }
            Message::SetSoftAp(SoftApCommand::Stop { mode }) => self.stop_soft_aps(mode),
            Message::AirplaneToggled => {
                if self.deps.settings.is_airplane_mode_on() {
                    return Flow::NotHandled(Message::AirplaneToggled);
                }
                if self.wifi_state() == WifiState::Disabling {
                    self.defer(Message::AirplaneToggled);
                } else if !self.registry.has_primary_or_scan_only() {
                    return Flow::NotHandled(Message::AirplaneToggled);
                }
            }
            Message::SatelliteModeChanged => {
                if self.deps.settings.is_satellite_mode_on() {
                    tracing::info!("satellite mode on, disabling wifi");
                    self.shutdown();
                } else if !self.registry.has_primary_or_scan_only() {
                    return Flow::NotHandled(Message::SatelliteModeChanged);
                }
            }
            Message::ApStopped | Message::ApStartFailure => {
                if !self.registry.is_empty() {
                    tracing::debug!("soft AP gone, staying enabled");
                    return Flow::Handled;
                }
                if matches!(msg, Message::ApStopped) {
                    self.deps.recovery.on_wifi_stopped();
                    if self.is_recovery_in_progress() {
                        self.transition_to(ControllerState::Disabled);
                        return Flow::Handled;
                    }
                }
                if self.should_enable_sta() {
                    tracing::info!("soft AP gone, starting client mode");
                    self.start_primary_or_scan_only(WorkSource::settings());
                }
                if self.registry.is_empty() {
                    self.transition_to(ControllerState::Disabled);
                }
            }
            Message::StaStopped | Message::StaStartFailure => {
                if self.registry.is_empty() {
                    self.deps.recovery.on_wifi_stopped();
                    tracing::info!("client mode gone, disabling");
                    self.transition_to(ControllerState::Disabled);
                    return Flow::Handled;
                }
                self.replay_deferred_airplane_off();
            }
            Message::DeferredRecoveryRestart(_) => self.defer(msg),
            Message::RecoveryRestart { reason, bug_report } => {
                self.recovery_restart(reason, bug_report);
            }
            Message::RecoveryRestartContinue(_) => {
                self.recovering = false;
                if self.should_enable_sta() && !self.registry.has_primary_or_scan_only() {
                    self.start_primary_or_scan_only(WorkSource::settings());
                }
                self.notify(ModeEvent::SubsystemRestarted);
                self.deps.recovery.on_recovery_completed();
            }
            other => return Flow::NotHandled(other),
        }
        Flow::Handled
    }

    /// A deferred airplane-off never replays while enabled; act on it once
    /// no primary-or-scan-only client is left.
    fn replay_deferred_airplane_off(&mut self) {
        let pending = self
            .deferred
            .iter()
            .any(|m| matches!(m, Message::AirplaneToggled));
        if !pending || self.registry.has_primary_or_scan_only() {
            return;
        }
        self.deferred
            .retain(|m| !matches!(m, Message::AirplaneToggled));
        if self.deps.settings.is_airplane_mode_on() {
            return;
        }
        tracing::info!("airplane mode off after client stopped, re-evaluating");
        if self.should_enable_sta() {
            self.start_primary_or_scan_only(WorkSource::settings());
        }
    }

    fn recovery_restart(&mut self, reason: String, bug_report: bool) {
        let title = if reason.is_empty() {
            "Wi-Fi BugReport".to_string()
        } else {
            format!("Wi-Fi BugReport: {reason}")
        };
        tracing::warn!(reason = %reason, bug_report, "recovery triggered, disabling wifi");
        if bug_report {
            self.deps.diagnostics.take_bug_report(&title, &reason);
        }

        let mut snapshots: Vec<RecoverySnapshot> = self
            .registry
            .clients()
            .filter_map(|c| match c.active_role() {
                Some(role @ (Role::ClientPrimary | Role::ClientScanOnly)) => {
                    Some(RecoverySnapshot::Client {
                        role,
                        requestor: c.requestor.clone(),
                    })
                }
                _ => None,
            })
            .collect();
        snapshots.extend(
            self.registry
                .soft_aps()
                .filter(|a| a.config.mode == SoftApMode::Tethered && !a.stopping)
                .map(|a| RecoverySnapshot::SoftAp {
                    config: a.config.clone(),
                    requestor: a.requestor.clone(),
                }),
        );

        self.recovering = true;
        self.defer(Message::DeferredRecoveryRestart(snapshots));
        self.notify(ModeEvent::SubsystemRestarting);
        self.shutdown();
    }

    // --- role requests ---

    fn handle_role_request(&mut self, request: RoleRequest, listener: RoleRequestListener) {
        let admission = self
            .policy()
            .decide(&self.registry, self.wifi_state(), &request);
        tracing::debug!(
            role = %request.role,
            requestor = %request.requestor,
            decision = admission.label(),
            "role request"
        );
        match admission {
            Admission::Reject => self.answer(listener, None),
            Admission::AnswerExisting(id) => self.answer_existing(id, request, listener),
            Admission::Create { requestor } => {
                self.start_additional(request.role, requestor, listener);
            }
            Admission::SwitchRole { id, requestor } => {
                self.switch_role_for_additional(id, request.role, requestor, listener);
            }
            Admission::FallbackToPrimary => {
                let primary = self.registry.primary().map(|c| c.info());
                self.answer(listener, primary);
            }
        }
    }

    /// Answer with `id`, or join its pending listeners if it is still on
    /// its way into the requested role.
    fn answer_existing(
        &mut self,
        id: ManagerId,
        request: RoleRequest,
        listener: RoleRequestListener,
    ) {
        let role = request.role.role();
        let Some(entry) = self.registry.client_mut(id) else {
            self.answer(listener, None);
            return;
        };
        match entry.pending.as_mut() {
            Some(pending) if pending.role == role => {
                tracing::debug!(id = %id, role = %role, "request joins pending start");
                pending.listeners.push(listener);
            }
            _ => {
                let info: ManagerInfo = entry.info();
                self.answer(listener, Some(info));
            }
        }
    }
}
