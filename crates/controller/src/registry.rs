//! Live mode managers, indexed by role.
//!
//! Entries exist from the moment a manager is created until it reports
//! stopped or start-failure, so the registry is non-empty for as long as
//! any interface might still be up. A manager that has been asked to stop
//! keeps its entry but no longer answers role queries.

use modewarden_roles::{
    ManagerId, ManagerInfo, ManagerKind, Role, SoftApMode, SoftApModeConfig, WorkSource,
};

use crate::manager::{ClientModeManager, RoleRequestListener, SoftApManager};

/// A role a client is being started or switched into.
pub(crate) struct PendingRole {
    pub role: Role,
    pub requestor: WorkSource,
    /// Answered once the role is reached, or with `None` if the manager
    /// goes away first.
    pub listeners: Vec<RoleRequestListener>,
}

impl PendingRole {
    pub fn new(role: Role, requestor: WorkSource) -> Self {
        Self {
            role,
            requestor,
            listeners: Vec::new(),
        }
    }

    pub fn with_listener(mut self, listener: Option<RoleRequestListener>) -> Self {
        self.listeners.extend(listener);
        self
    }
}

pub(crate) struct ClientEntry {
    pub id: ManagerId,
    pub manager: Box<dyn ClientModeManager>,
    /// Role currently held; `None` until started.
    pub role: Option<Role>,
    pub pending: Option<PendingRole>,
    pub previous_role: Option<Role>,
    pub requestor: WorkSource,
    pub stopping: bool,
}

impl ClientEntry {
    pub fn new(id: ManagerId, manager: Box<dyn ClientModeManager>, pending: PendingRole) -> Self {
        Self {
            id,
            manager,
            role: None,
            requestor: pending.requestor.clone(),
            pending: Some(pending),
            previous_role: None,
            stopping: false,
        }
    }

    /// Role held now, ignoring managers that are on their way out.
    pub fn active_role(&self) -> Option<Role> {
        if self.stopping {
            None
        } else {
            self.role
        }
    }

    pub fn target_role(&self) -> Option<Role> {
        if self.stopping {
            None
        } else {
            self.pending.as_ref().map(|p| p.role)
        }
    }

    /// Held or pending role is primary or scan-only.
    pub fn is_primary_or_scan_only(&self) -> bool {
        self.active_role()
            .into_iter()
            .chain(self.target_role())
            .any(|r| r.is_primary_or_scan_only())
    }

    pub fn info(&self) -> ManagerInfo {
        ManagerInfo {
            id: self.id,
            kind: ManagerKind::Client,
            role: self.active_role(),
            target_role: self.target_role(),
            previous_role: self.previous_role,
            requestor: self.requestor.clone(),
            interface_name: self.manager.interface_name(),
            link: self.manager.connecting().or_else(|| self.manager.connected()),
            soft_ap: None,
        }
    }

    /// Whether this client is associating or associated with `(ssid, bssid)`,
    /// either directly or through an affiliated link.
    fn is_linked_to(&self, ssid: &str, bssid: &str) -> bool {
        let Some(link) = self.manager.connecting().or_else(|| self.manager.connected()) else {
            return false;
        };
        if link.ssid != ssid {
            return false;
        }
        link.bssid.as_deref() == Some(bssid) || self.manager.is_affiliated_link(bssid)
    }
}

pub(crate) struct SoftApEntry {
    pub id: ManagerId,
    pub manager: Box<dyn SoftApManager>,
    pub config: SoftApModeConfig,
    pub requestor: WorkSource,
    pub started: bool,
    pub stopping: bool,
}

impl SoftApEntry {
    pub fn role(&self) -> Role {
        self.config.mode.role()
    }

    pub fn info(&self) -> ManagerInfo {
        ManagerInfo {
            id: self.id,
            kind: ManagerKind::SoftAp,
            role: self.started.then(|| self.role()),
            target_role: (!self.started && !self.stopping).then(|| self.role()),
            previous_role: None,
            requestor: self.requestor.clone(),
            interface_name: self.manager.interface_name(),
            link: None,
            soft_ap: Some(self.config.clone()),
        }
    }
}

#[derive(Default)]
pub(crate) struct Registry {
    clients: Vec<ClientEntry>,
    soft_aps: Vec<SoftApEntry>,
    next_id: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_id(&mut self) -> ManagerId {
        self.next_id += 1;
        ManagerId(self.next_id)
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty() && self.soft_aps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clients.len() + self.soft_aps.len()
    }

    /// Managers that reported started and have not yet reported stopped.
    pub fn started_len(&self) -> usize {
        self.clients.iter().filter(|c| c.role.is_some()).count()
            + self.soft_aps.iter().filter(|a| a.started).count()
    }

    pub fn has_clients(&self) -> bool {
        !self.clients.is_empty()
    }

    pub fn insert_client(&mut self, entry: ClientEntry) {
        self.clients.push(entry);
    }

    pub fn insert_soft_ap(&mut self, entry: SoftApEntry) {
        self.soft_aps.push(entry);
    }

    pub fn client(&self, id: ManagerId) -> Option<&ClientEntry> {
        self.clients.iter().find(|c| c.id == id)
    }

    pub fn client_mut(&mut self, id: ManagerId) -> Option<&mut ClientEntry> {
        self.clients.iter_mut().find(|c| c.id == id)
    }

    pub fn soft_ap_mut(&mut self, id: ManagerId) -> Option<&mut SoftApEntry> {
        self.soft_aps.iter_mut().find(|a| a.id == id)
    }

    pub fn remove_client(&mut self, id: ManagerId) -> Option<ClientEntry> {
        let pos = self.clients.iter().position(|c| c.id == id)?;
        Some(self.clients.remove(pos))
    }

    pub fn remove_soft_ap(&mut self, id: ManagerId) -> Option<SoftApEntry> {
        let pos = self.soft_aps.iter().position(|a| a.id == id)?;
        Some(self.soft_aps.remove(pos))
    }

    pub fn clients(&self) -> impl Iterator<Item = &ClientEntry> {
        self.clients.iter()
    }

    pub fn soft_aps(&self) -> impl Iterator<Item = &SoftApEntry> {
        self.soft_aps.iter()
    }

    pub fn soft_aps_mut(&mut self) -> impl Iterator<Item = &mut SoftApEntry> {
        self.soft_aps.iter_mut()
    }

    /// First client currently holding `role`.
    pub fn client_in_role(&self, role: Role) -> Option<&ClientEntry> {
        self.clients.iter().find(|c| c.active_role() == Some(role))
    }

    /// Client holding `role`, or else one being started or switched into it.
    pub fn client_holding_or_entering(&self, role: Role) -> Option<&ClientEntry> {
        self.client_in_role(role)
            .or_else(|| self.clients.iter().find(|c| c.target_role() == Some(role)))
    }

    pub fn clients_in_role(&self, role: Role) -> Vec<ManagerId> {
        self.clients
            .iter()
            .filter(|c| c.active_role() == Some(role))
            .map(|c| c.id)
            .collect()
    }

    pub fn primary(&self) -> Option<&ClientEntry> {
        self.client_in_role(Role::ClientPrimary)
    }

    pub fn has_primary_or_scan_only(&self) -> bool {
        self.clients.iter().any(ClientEntry::is_primary_or_scan_only)
    }

    /// Client associating or associated with the same network. A missing
    /// BSSID never matches.
    pub fn find_linked_to(&self, ssid: &str, bssid: Option<&str>) -> Option<&ClientEntry> {
        let bssid = bssid?;
        self.clients
            .iter()
            .filter(|c| !c.stopping)
            .find(|c| c.is_linked_to(ssid, bssid))
    }

    /// Non-empty and every live client is scan-only.
    pub fn all_clients_scan_only(&self) -> bool {
        let mut roles = self.clients.iter().filter_map(ClientEntry::active_role).peekable();
        roles.peek().is_some() && roles.all(|r| r == Role::ClientScanOnly)
    }

    pub fn soft_ap_in_mode(&self, mode: SoftApMode) -> Option<&SoftApEntry> {
        self.soft_aps
            .iter()
            .find(|a| a.config.mode == mode && !a.stopping)
    }

    pub fn client_infos(&self) -> Vec<ManagerInfo> {
        self.clients.iter().map(ClientEntry::info).collect()
    }

    pub fn soft_ap_infos(&self) -> Vec<ManagerInfo> {
        self.soft_aps.iter().map(SoftApEntry::info).collect()
    }
}
