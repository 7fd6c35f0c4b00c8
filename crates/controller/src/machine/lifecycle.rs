//! Reactions to manager lifecycle reports.

use modewarden_events::ModeEvent;
use modewarden_roles::{
    ConnectionInfo, ManagerId, ManagerInfo, MultiStaUseCase, Role, SecondaryRole, WifiState,
};

use super::Core;
use crate::features::compute_feature_set;
use crate::graveyard::StopReason;
use crate::manager::ManagerEvent;
use crate::message::Message;

impl Core {
    pub(super) fn on_lifecycle(&mut self, id: ManagerId, event: ManagerEvent) {
        tracing::debug!(id = %id, event = %event, "manager lifecycle");
        if self.registry.client(id).is_some() {
            match event {
                ManagerEvent::Started | ManagerEvent::RoleChanged => self.client_reached_role(id),
                ManagerEvent::Stopped => self.client_removed(id, StopReason::Stopped),
                ManagerEvent::StartFailure => self.client_removed(id, StopReason::StartFailure),
            }
            return;
        }
        if self.registry.soft_aps().any(|a| a.id == id) {
            match event {
                ManagerEvent::Started => self.soft_ap_started(id),
                ManagerEvent::Stopped => self.soft_ap_removed(id, StopReason::Stopped),
                ManagerEvent::StartFailure => self.soft_ap_removed(id, StopReason::StartFailure),
                ManagerEvent::RoleChanged => {
                    tracing::warn!(id = %id, "role change reported by soft AP, ignoring");
                }
            }
            return;
        }
        tracing::error!(id = %id, event = %event, "lifecycle event for unknown manager");
    }

    fn client_reached_role(&mut self, id: ManagerId) {
        let Some(entry) = self.registry.client_mut(id) else {
            return;
        };
        if entry.stopping {
            tracing::debug!(id = %id, "client reached a role while stopping, ignoring");
            return;
        }
        let Some(pending) = entry.pending.take() else {
            tracing::warn!(id = %id, "client reported a role it was not asked for");
            return;
        };
        let first_start = entry.role.is_none();
        if !first_start {
            entry.previous_role = entry.role;
        }
        entry.role = Some(pending.role);
        entry.requestor = pending.requestor;
        let info = entry.info();
        tracing::info!(id = %id, role = %pending.role, "client mode manager in role");

        self.update_scan_mode();
        if first_start {
            self.report_battery_on();
        }
        self.report_scan_mode_if_active();
        self.configure_multi_sta();

        for listener in pending.listeners {
            self.answer(listener, Some(info.clone()));
        }
        if first_start {
            self.notify(ModeEvent::Added {
                manager: info.clone(),
            });
        } else {
            self.notify(ModeEvent::RoleChanged {
                manager: info.clone(),
            });
        }
        self.update_primary(&info);
    }

    /// Primary bookkeeping after `info` reached a new role.
    fn update_primary(&mut self, info: &ManagerInfo) {
        let is_primary = info.role == Some(Role::ClientPrimary);
        let was_primary = self.last_primary.as_ref().is_some_and(|p| p.id == info.id);

        if was_primary && !is_primary {
            self.last_primary = None;
            self.notify(ModeEvent::PrimaryChanged {
                previous: Some(info.clone()),
                next: None,
            });
            self.snapshot.set_current_network(None);
            self.snapshot.set_connection_info(ConnectionInfo::default());
            self.update_feature_set(None);
            self.set_wifi_state(WifiState::Disabled);
            return;
        }
        if is_primary && !was_primary {
            let previous = self.last_primary.replace(info.clone());
            self.notify(ModeEvent::PrimaryChanged {
                previous,
                next: Some(info.clone()),
            });
            if let Some(entry) = self.registry.client(info.id) {
                self.snapshot
                    .set_current_network(entry.manager.current_network());
                self.snapshot.set_connection_info(entry.manager.connection_info());
            }
        }
        if is_primary {
            let iface = info.interface_name.as_deref();
            self.update_feature_set(iface);
            if let Some(iface) = iface {
                self.update_bands(iface);
            }
            self.set_wifi_state(WifiState::Enabled);
        }
    }

    /// `previous` stopped serving as primary without a successor.
    pub(super) fn primary_lost(&mut self, previous: ManagerInfo) {
        self.last_primary = None;
        self.notify(ModeEvent::PrimaryChanged {
            previous: Some(previous),
            next: None,
        });
        self.snapshot.set_current_network(None);
        self.snapshot.set_connection_info(ConnectionInfo::default());
        self.update_feature_set(None);
        self.restore_cached_bands();
    }

    fn client_removed(&mut self, id: ManagerId, reason: StopReason) {
        let Some(entry) = self.registry.remove_client(id) else {
            return;
        };
        let mut info = entry.info();
        info.previous_role = entry.role.or(entry.previous_role);
        info.role = None;
        info.target_role = None;
        tracing::info!(
            id = %id,
            reason = reason.label(),
            role = ?info.previous_role,
            "client mode manager removed"
        );

        if tracks_requestor(entry.role) {
            self.snapshot.remove_request_worksource(&entry.requestor);
        }
        if let Some(pending) = entry.pending.as_ref() {
            if tracks_requestor(Some(pending.role)) {
                self.snapshot.remove_request_worksource(&pending.requestor);
            }
        }
        self.graveyard.inter(info.clone(), reason);
        self.update_scan_mode();
        if entry.role.is_some() {
            self.report_battery_off();
        }
        self.report_scan_mode_if_active();

        if self.last_primary.as_ref().is_some_and(|p| p.id == id) {
            self.primary_lost(info.clone());
        }
        let held_primary = entry.role == Some(Role::ClientPrimary)
            || entry.pending.as_ref().map(|p| p.role) == Some(Role::ClientPrimary);
        let primary_remains = self.registry.clients().any(|c| {
            c.active_role() == Some(Role::ClientPrimary)
                || c.target_role() == Some(Role::ClientPrimary)
        });
        if held_primary && !primary_remains {
            self.set_wifi_state(WifiState::Disabled);
        }

        if let Some(pending) = entry.pending {
            for listener in pending.listeners {
                self.answer(listener, None);
            }
        }
        // Observers only hear about managers they were told were added.
        if entry.role.is_some() {
            self.notify(ModeEvent::Removed { manager: info });
        }
        self.post(match reason {
            StopReason::Stopped => Message::StaStopped,
            StopReason::StartFailure => Message::StaStartFailure,
        });
    }

    fn soft_ap_started(&mut self, id: ManagerId) {
        let Some(entry) = self.registry.soft_ap_mut(id) else {
            return;
        };
        entry.started = true;
        let info = entry.info();
        tracing::info!(id = %id, mode = %entry.config.mode, "soft AP started");
        self.report_battery_on();
        self.notify(ModeEvent::Added { manager: info });
    }

    fn soft_ap_removed(&mut self, id: ManagerId, reason: StopReason) {
        let Some(entry) = self.registry.remove_soft_ap(id) else {
            return;
        };
        let mut info = entry.info();
        info.previous_role = Some(entry.role());
        info.role = None;
        info.target_role = None;
        tracing::info!(id = %id, reason = reason.label(), "soft AP removed");

        self.graveyard.inter(info.clone(), reason);
        if entry.started {
            self.report_battery_off();
            self.notify(ModeEvent::Removed { manager: info });
        }
        self.post(match reason {
            StopReason::Stopped => Message::ApStopped,
            StopReason::StartFailure => Message::ApStartFailure,
        });
    }

    // --- derived outputs ---

    /// Scanning follows the presence of any client; hidden networks need a
    /// connectivity client unless configured otherwise.
    pub(super) fn update_scan_mode(&mut self) {
        let enabled = self.registry.has_clients();
        let hidden = if self.config.scan_hidden_networks_in_scan_only_mode {
            enabled
        } else {
            self.registry
                .clients()
                .any(|c| c.active_role().is_some_and(|r| r.is_connectivity()))
        };
        self.deps.scan.set_scanning_enabled(enabled, hidden);
    }

    /// Every resolved code re-sends the scan directive; `None` is ignored.
    pub(crate) fn update_scan_mode_for_country_code(&mut self, country_code: Option<String>) {
        let Some(country_code) = country_code else {
            return;
        };
        tracing::info!(country_code = %country_code, "country code resolved");
        self.country_code = Some(country_code);
        self.update_scan_mode();
    }

    /// Called once a manager has started; wifi is on from the first one.
    fn report_battery_on(&mut self) {
        if self.registry.started_len() == 1 {
            self.deps.battery.report_wifi_on();
        }
    }

    /// Called after a started manager left the registry.
    fn report_battery_off(&mut self) {
        if self.registry.started_len() == 0 {
            self.deps.battery.report_wifi_off();
        }
    }

    fn report_scan_mode_if_active(&mut self) {
        if self.registry.all_clients_scan_only() {
            self.deps.battery.report_scan_mode_active();
        }
    }

    fn configure_multi_sta(&mut self) {
        let oracle = &self.deps.oracle;
        if !oracle.is_sta_sta_concurrency_supported() {
            return;
        }
        let long_lived = self.registry.clients().any(|c| {
            matches!(
                c.active_role(),
                Some(Role::ClientLocalOnly | Role::ClientSecondaryLongLived)
            )
        });
        oracle.set_multi_sta_use_case(if long_lived {
            MultiStaUseCase::NonTransientUnbiased
        } else {
            MultiStaUseCase::TransientPreferPrimary
        });
        if let Some(iface) = self
            .registry
            .primary()
            .and_then(|p| p.manager.interface_name())
        {
            oracle.set_multi_sta_primary_connection(&iface);
        }
    }

    pub(super) fn update_feature_set(&mut self, iface: Option<&str>) {
        let features = compute_feature_set(self.deps.oracle.as_ref(), &self.config, iface);
        self.snapshot.set_feature_set(features);
    }

    fn update_bands(&mut self, iface: &str) {
        let reported = self.deps.oracle.supported_bands_for_sta(iface);
        let bands = if reported != 0 {
            if reported != self.deps.settings.sta_bands() {
                self.deps.settings.set_sta_bands(reported);
            }
            reported
        } else {
            self.deps.settings.sta_bands()
        };
        if bands != 0 && bands != self.snapshot.sta_bands() {
            tracing::debug!(bands, "sta bands updated");
            self.snapshot.set_sta_bands(bands);
        }
    }

    fn restore_cached_bands(&mut self) {
        let cached = self.deps.settings.sta_bands();
        if cached != 0 {
            self.snapshot.set_sta_bands(cached);
        }
    }
}

fn tracks_requestor(role: Option<Role>) -> bool {
    role.and_then(|r| SecondaryRole::try_from(r).ok())
        .is_some_and(|r| r.tracks_requestor())
}
