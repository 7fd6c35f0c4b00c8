//! Role definitions and classification.
//!
//! Pure domain logic - no I/O, no scheduling.

use serde::{Deserialize, Serialize};

/// The role a mode manager plays on a radio interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The client that carries the device's default route.
    ClientPrimary,
    /// A client allowed to scan but never associate.
    ClientScanOnly,
    /// A client for peer-to-peer style local-only connectivity.
    ClientLocalOnly,
    /// A long-lived additional client (restricted or multi-internet).
    ClientSecondaryLongLived,
    /// A short-lived additional client used for make-before-break.
    ClientSecondaryTransient,
    /// Soft-AP serving tethering.
    SoftApTethered,
    /// Soft-AP serving a local-only hotspot.
    SoftApLocalOnly,
}

impl Role {
    /// Every role, in declaration order.
    pub const ALL: [Role; 7] = [
        Role::ClientPrimary,
        Role::ClientScanOnly,
        Role::ClientLocalOnly,
        Role::ClientSecondaryLongLived,
        Role::ClientSecondaryTransient,
        Role::SoftApTethered,
        Role::SoftApLocalOnly,
    ];

    /// Whether this is a station (client) role.
    pub fn is_client(&self) -> bool {
        !self.is_soft_ap()
    }

    /// Whether this is an access point role.
    pub fn is_soft_ap(&self) -> bool {
        matches!(self, Role::SoftApTethered | Role::SoftApLocalOnly)
    }

    /// Client roles that may associate with a network.
    pub fn is_connectivity(&self) -> bool {
        self.is_client() && *self != Role::ClientScanOnly
    }

    /// Client roles that may provide internet connectivity.
    pub fn is_internet_connectivity(&self) -> bool {
        matches!(
            self,
            Role::ClientPrimary | Role::ClientSecondaryLongLived | Role::ClientSecondaryTransient
        )
    }

    /// Primary or scan-only: the roles of which at most one may exist.
    pub fn is_primary_or_scan_only(&self) -> bool {
        matches!(self, Role::ClientPrimary | Role::ClientScanOnly)
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Role::ClientPrimary => "ClientPrimary",
            Role::ClientScanOnly => "ClientScanOnly",
            Role::ClientLocalOnly => "ClientLocalOnly",
            Role::ClientSecondaryLongLived => "ClientSecondaryLongLived",
            Role::ClientSecondaryTransient => "ClientSecondaryTransient",
            Role::SoftApTethered => "SoftApTethered",
            Role::SoftApLocalOnly => "SoftApLocalOnly",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// The subset of client roles that callers may request in addition to the
/// primary manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondaryRole {
    LocalOnly,
    SecondaryLongLived,
    SecondaryTransient,
}

impl SecondaryRole {
    /// The full role this request maps to.
    pub fn role(&self) -> Role {
        match self {
            SecondaryRole::LocalOnly => Role::ClientLocalOnly,
            SecondaryRole::SecondaryLongLived => Role::ClientSecondaryLongLived,
            SecondaryRole::SecondaryTransient => Role::ClientSecondaryTransient,
        }
    }

    /// Whether callers of this role are tracked in the secondary
    /// request work-source set.
    pub fn tracks_requestor(&self) -> bool {
        matches!(
            self,
            SecondaryRole::LocalOnly | SecondaryRole::SecondaryLongLived
        )
    }
}

impl TryFrom<Role> for SecondaryRole {
    type Error = Role;

    fn try_from(role: Role) -> Result<Self, Self::Error> {
        match role {
            Role::ClientLocalOnly => Ok(SecondaryRole::LocalOnly),
            Role::ClientSecondaryLongLived => Ok(SecondaryRole::SecondaryLongLived),
            Role::ClientSecondaryTransient => Ok(SecondaryRole::SecondaryTransient),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for SecondaryRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.role().label())
    }
}

/// IP mode of a soft-AP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftApMode {
    Tethered,
    LocalOnly,
}

impl SoftApMode {
    /// The role a soft-AP in this mode holds.
    pub fn role(&self) -> Role {
        match self {
            SoftApMode::Tethered => Role::SoftApTethered,
            SoftApMode::LocalOnly => Role::SoftApLocalOnly,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SoftApMode::Tethered => "tethered",
            SoftApMode::LocalOnly => "local_only",
        }
    }
}

impl std::fmt::Display for SoftApMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Hardware use-case hint for multi-STA operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiStaUseCase {
    /// Secondary is short-lived; prefer the primary for traffic.
    TransientPreferPrimary,
    /// Secondary is long-lived and independent of the primary.
    NonTransientUnbiased,
}
