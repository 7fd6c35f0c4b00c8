//! Identity and observable attributes of a mode manager.

use serde::{Deserialize, Serialize};

use crate::role::Role;
use crate::types::{LinkTarget, SoftApModeConfig};
use crate::worksource::WorkSource;

/// Stable identifier assigned to a mode manager when it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManagerId(pub u64);

impl std::fmt::Display for ManagerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mm-{}", self.0)
    }
}

/// Capability class of a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerKind {
    Client,
    SoftAp,
}

impl ManagerKind {
    pub fn label(&self) -> &'static str {
        match self {
            ManagerKind::Client => "client",
            ManagerKind::SoftAp => "soft_ap",
        }
    }
}

impl std::fmt::Display for ManagerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Immutable copy of a manager's observable state.
///
/// Handed to observers, role-request listeners and the graveyard. Holding
/// one never keeps the underlying interface alive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerInfo {
    pub id: ManagerId,
    pub kind: ManagerKind,
    /// Role currently held; `None` until the manager reports started and
    /// after it stops.
    pub role: Option<Role>,
    /// Role being switched into, if a start or switch is pending.
    #[serde(default)]
    pub target_role: Option<Role>,
    #[serde(default)]
    pub previous_role: Option<Role>,
    pub requestor: WorkSource,
    #[serde(default)]
    pub interface_name: Option<String>,
    /// Connecting-or-connected network (client only).
    #[serde(default)]
    pub link: Option<LinkTarget>,
    /// Soft-AP configuration (AP only).
    #[serde(default)]
    pub soft_ap: Option<SoftApModeConfig>,
}

impl ManagerInfo {
    /// The role held, or the role being entered when not yet started.
    pub fn effective_role(&self) -> Option<Role> {
        self.role.or(self.target_role)
    }
}

impl std::fmt::Display for ManagerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}", self.id, self.kind)?;
        if let Some(role) = self.role {
            write!(f, " role={}", role)?;
        }
        if let Some(target) = self.target_role {
            write!(f, " target={}", target)?;
        }
        if let Some(previous) = self.previous_role {
            write!(f, " previous={}", previous)?;
        }
        if let Some(iface) = &self.interface_name {
            write!(f, " iface={}", iface)?;
        }
        write!(f, " requestor={}]", self.requestor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_role_prefers_current() {
        let mut info = ManagerInfo {
            id: ManagerId(7),
            kind: ManagerKind::Client,
            role: None,
            target_role: Some(Role::ClientPrimary),
            previous_role: None,
            requestor: WorkSource::settings(),
            interface_name: Some("wlan0".into()),
            link: None,
            soft_ap: None,
        };
        assert_eq!(info.effective_role(), Some(Role::ClientPrimary));

        info.role = Some(Role::ClientScanOnly);
        assert_eq!(info.effective_role(), Some(Role::ClientScanOnly));
        assert!(info.to_string().starts_with("mm-7[client role=ClientScanOnly"));
    }
}
