//! Starting, stopping and switching mode managers.

use modewarden_roles::{
    ManagerId, Role, SecondaryRole, SoftApCapability, SoftApConfiguration, SoftApMode,
    SoftApModeConfig, WifiState, WorkSource,
};

use super::Core;
use crate::manager::{ManagerEventSink, RoleRequestListener};
use crate::registry::{ClientEntry, PendingRole, SoftApEntry};

const DUPLICATE_PRIMARY_BUG_TITLE: &str = "Wi-Fi ActiveModeWarden bugreport";

impl Core {
    fn sink(&self, id: ManagerId) -> ManagerEventSink {
        ManagerEventSink::new(id, self.delivery.clone())
    }

    fn take_bug_report_once(&mut self, description: &str) {
        if self.multiple_primary_bug_report_taken {
            return;
        }
        self.multiple_primary_bug_report_taken = true;
        self.deps
            .diagnostics
            .take_bug_report(DUPLICATE_PRIMARY_BUG_TITLE, description);
    }

    fn start_client(&mut self, pending: PendingRole) -> ManagerId {
        let id = self.registry.allocate_id();
        tracing::info!(
            id = %id,
            role = %pending.role,
            requestor = %pending.requestor,
            "starting client mode manager"
        );
        let manager = self
            .deps
            .factory
            .create_client(pending.role, &pending.requestor, self.sink(id));
        self.registry
            .insert_client(ClientEntry::new(id, manager, pending));
        id
    }

    /// Start a client in the role implied by the current toggles.
    pub(super) fn start_primary_or_scan_only(&mut self, requestor: WorkSource) -> bool {
        match self.role_for_toggles() {
            Some(Role::ClientPrimary) => self.start_primary(requestor),
            Some(Role::ClientScanOnly) => self.start_scan_only(requestor),
            _ => {
                tracing::error!("no primary or scan-only role for the current toggles");
                false
            }
        }
    }

    pub(super) fn start_primary(&mut self, requestor: WorkSource) -> bool {
        if self.registry.has_primary_or_scan_only() {
            tracing::error!("primary or scan-only client already exists, not starting primary");
            self.take_bug_report_once(
                "Trying to start primary mode manager when one already exists.",
            );
            return false;
        }
        self.last_primary_requestor = requestor.clone();
        self.set_wifi_state(WifiState::Enabling);
        self.start_client(PendingRole::new(Role::ClientPrimary, requestor));
        true
    }

    pub(super) fn start_scan_only(&mut self, requestor: WorkSource) -> bool {
        if self.registry.has_primary_or_scan_only() {
            tracing::error!("primary or scan-only client already exists, not starting scan-only");
            self.take_bug_report_once(
                "Trying to start scan-only mode manager when one already exists.",
            );
            return false;
        }
        self.last_scan_only_requestor = requestor.clone();
        self.start_client(PendingRole::new(Role::ClientScanOnly, requestor));
        true
    }

    pub(super) fn start_additional(
        &mut self,
        role: SecondaryRole,
        requestor: WorkSource,
        listener: RoleRequestListener,
    ) {
        if role.tracks_requestor() {
            self.snapshot.add_request_worksource(&requestor);
        }
        self.start_client(PendingRole::new(role.role(), requestor).with_listener(Some(listener)));
    }

    /// Move `id` into `role`. Listeners of a superseded switch are answered
    /// with `None`.
    fn set_client_role(
        &mut self,
        id: ManagerId,
        role: Role,
        requestor: WorkSource,
        listener: Option<RoleRequestListener>,
    ) {
        let Some(entry) = self.registry.client_mut(id) else {
            tracing::error!(id = %id, "role switch for unknown client");
            if let Some(listener) = listener {
                self.answer(listener, None);
            }
            return;
        };
        let current = entry.role;
        let superseded = entry
            .pending
            .replace(PendingRole::new(role, requestor.clone()).with_listener(listener))
            .map(|p| p.listeners)
            .unwrap_or_default();
        entry.manager.set_role(role, &requestor);
        tracing::info!(id = %id, from = ?current, to = %role, "switching client role");

        for listener in superseded {
            self.answer(listener, None);
        }
        match (current, role) {
            (Some(Role::ClientPrimary), to) if to != Role::ClientPrimary => {
                self.set_wifi_state(WifiState::Disabling);
            }
            (from, Role::ClientPrimary) if from != Some(Role::ClientPrimary) => {
                self.set_wifi_state(WifiState::Enabling);
            }
            _ => {}
        }
    }

    pub(super) fn switch_role_for_additional(
        &mut self,
        id: ManagerId,
        role: SecondaryRole,
        requestor: WorkSource,
        listener: RoleRequestListener,
    ) {
        if let Some(entry) = self.registry.client(id) {
            let tracked = entry
                .active_role()
                .and_then(|r| SecondaryRole::try_from(r).ok())
                .is_some_and(|r| r.tracks_requestor());
            if tracked {
                let previous = entry.requestor.clone();
                self.snapshot.remove_request_worksource(&previous);
            }
        }
        if role.tracks_requestor() {
            self.snapshot.add_request_worksource(&requestor);
        }
        self.set_client_role(id, role.role(), requestor, Some(listener));
    }

    /// Re-derive the role of every primary-or-scan-only client from the
    /// toggles; clients with no valid role are stopped.
    pub(super) fn switch_all_primary_or_scan_only(&mut self) {
        let targets: Vec<(ManagerId, Option<Role>)> = self
            .registry
            .clients()
            .filter(|c| c.is_primary_or_scan_only())
            .map(|c| (c.id, c.target_role().or(c.active_role())))
            .collect();
        let wanted = self.role_for_toggles();
        for (id, current) in targets {
            match wanted {
                None => self.stop_client(id),
                Some(role) if current == Some(role) => {}
                Some(role) => {
                    let requestor = if role == Role::ClientPrimary {
                        self.last_primary_requestor.clone()
                    } else {
                        self.last_scan_only_requestor.clone()
                    };
                    self.set_client_role(id, role, requestor, None);
                }
            }
        }
    }

    pub(super) fn switch_all_primary_to_scan_only(&mut self, requestor: WorkSource) {
        for id in self.registry.clients_in_role(Role::ClientPrimary) {
            self.set_client_role(id, Role::ClientScanOnly, requestor.clone(), None);
        }
    }

    fn stop_client(&mut self, id: ManagerId) {
        let Some(entry) = self.registry.client_mut(id) else {
            return;
        };
        if entry.stopping {
            return;
        }
        let was_primary = entry.active_role() == Some(Role::ClientPrimary)
            || entry.target_role() == Some(Role::ClientPrimary);
        entry.stopping = true;
        entry.manager.stop();
        tracing::info!(id = %id, role = ?entry.role, "stopping client mode manager");
        if was_primary {
            self.set_wifi_state(WifiState::Disabling);
        }
        // A stopping manager no longer carries the default route.
        if self.last_primary.as_ref().is_some_and(|p| p.id == id) {
            if let Some(previous) = self.last_primary.take() {
                self.primary_lost(previous);
            }
        }
    }

    pub(crate) fn stop_clients_in_role(&mut self, role: Role) {
        for id in self.registry.clients_in_role(role) {
            self.stop_client(id);
        }
    }

    /// Stop every non-primary connectivity client.
    pub(super) fn stop_secondary_clients(&mut self) {
        self.stop_clients_in_role(Role::ClientLocalOnly);
        self.stop_clients_in_role(Role::ClientSecondaryTransient);
        self.stop_clients_in_role(Role::ClientSecondaryLongLived);
    }

    pub(super) fn stop_additional(&mut self, id: ManagerId) {
        let Some(entry) = self.registry.client(id) else {
            tracing::warn!(id = %id, "remove request for unknown client");
            return;
        };
        if entry.is_primary_or_scan_only() {
            tracing::warn!(id = %id, "refusing to remove primary or scan-only client");
            return;
        }
        self.stop_client(id);
    }

    /// Stop all clients, primary last.
    pub(super) fn stop_all_clients(&mut self) {
        let primaries = self.registry.clients_in_role(Role::ClientPrimary);
        if primaries.len() > 1 {
            tracing::error!(count = primaries.len(), "more than one primary client");
            self.take_bug_report_once("Multiple primary client mode managers found.");
        }
        let others: Vec<ManagerId> = self
            .registry
            .clients()
            .filter(|c| !primaries.contains(&c.id))
            .map(|c| c.id)
            .collect();
        for id in others.into_iter().chain(primaries) {
            self.stop_client(id);
        }
    }

    pub(super) fn start_soft_ap(&mut self, config: SoftApModeConfig, requestor: WorkSource) {
        if self.registry.soft_ap_in_mode(config.mode).is_some() {
            tracing::warn!(mode = %config.mode, "soft AP already active in this mode");
            self.deps.soft_ap_state.on_start_refused(&config);
            return;
        }
        if !self.policy().can_request_more_soft_ap_managers(&requestor) {
            tracing::warn!(mode = %config.mode, requestor = %requestor, "cannot create soft AP");
            self.deps.soft_ap_state.on_start_refused(&config);
            return;
        }
        let id = self.registry.allocate_id();
        tracing::info!(id = %id, mode = %config.mode, requestor = %requestor, "starting soft AP");
        let manager = self
            .deps
            .factory
            .create_soft_ap(&config, &requestor, self.sink(id));
        self.registry.insert_soft_ap(SoftApEntry {
            id,
            manager,
            config,
            requestor,
            started: false,
            stopping: false,
        });
    }

    /// Stop soft-APs in `mode`, or all of them.
    pub(super) fn stop_soft_aps(&mut self, mode: Option<SoftApMode>) {
        for entry in self.registry.soft_aps_mut() {
            if entry.stopping || mode.is_some_and(|m| m != entry.config.mode) {
                continue;
            }
            tracing::info!(id = %entry.id, mode = %entry.config.mode, "stopping soft AP");
            entry.stopping = true;
            entry.manager.stop();
        }
    }

    pub(super) fn update_soft_ap_capability(&mut self, capability: &SoftApCapability, mode: SoftApMode) {
        for entry in self.registry.soft_aps_mut() {
            if entry.config.mode == mode {
                entry.config.capability = capability.clone();
                entry.manager.update_capability(capability);
            }
        }
    }

    pub(super) fn update_soft_ap_configuration(&mut self, configuration: &SoftApConfiguration) {
        for entry in self.registry.soft_aps_mut() {
            entry.config.configuration = Some(configuration.clone());
            entry.manager.update_configuration(configuration);
        }
    }

    /// Stop everything: soft-APs first, then clients with the primary last.
    pub(super) fn shutdown(&mut self) {
        tracing::info!(managers = self.registry.len(), "shutting down all mode managers");
        self.stop_soft_aps(None);
        self.stop_all_clients();
    }
}
