//! Admission policy for additional client roles.
//!
//! Decides, from registry state, chip capability and device policy, whether
//! a request for a local-only, long-lived or transient secondary station is
//! satisfied by an existing manager, a new one, an in-place role switch, or
//! the primary.

use modewarden_roles::{ManagerId, Role, SecondaryRole, WifiState, WorkSource, ROOT_UID, SYSTEM_UID};

use crate::config::ControllerConfig;
use crate::deps::{CapabilityOracle, DppSessionMonitor, PermissionChecker};
use crate::registry::Registry;

/// A request for an additional client role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRequest {
    pub role: SecondaryRole,
    pub requestor: WorkSource,
    pub ssid: Option<String>,
    pub bssid: Option<String>,
    /// The user explicitly approved the connection.
    pub user_approved: bool,
    /// Caller would rather get a secondary than share the primary.
    pub prefer_secondary: bool,
}

impl RoleRequest {
    pub fn new(role: SecondaryRole, requestor: WorkSource) -> Self {
        Self {
            role,
            requestor,
            ssid: None,
            bssid: None,
            user_approved: false,
            prefer_secondary: false,
        }
    }

    pub fn with_target(mut self, ssid: impl Into<String>, bssid: Option<&str>) -> Self {
        self.ssid = Some(ssid.into());
        self.bssid = bssid.map(str::to_string);
        self
    }

    pub fn approved(mut self, approved: bool) -> Self {
        self.user_approved = approved;
        self
    }

    pub fn prefer_secondary(mut self, prefer: bool) -> Self {
        self.prefer_secondary = prefer;
        self
    }
}

/// Outcome of evaluating a [`RoleRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Reject,
    AnswerExisting(ManagerId),
    /// Create a new manager attributed to `requestor`.
    Create { requestor: WorkSource },
    /// Switch an existing manager in place to the requested role.
    SwitchRole { id: ManagerId, requestor: WorkSource },
    FallbackToPrimary,
}

impl Admission {
    pub fn label(&self) -> &'static str {
        match self {
            Admission::Reject => "reject",
            Admission::AnswerExisting(_) => "answer_existing",
            Admission::Create { .. } => "create",
            Admission::SwitchRole { .. } => "switch_role",
            Admission::FallbackToPrimary => "fallback_to_primary",
        }
    }
}

/// Borrowed view of everything admission depends on besides the registry.
pub(crate) struct AdmissionPolicy<'a> {
    pub oracle: &'a dyn CapabilityOracle,
    pub permissions: &'a dyn PermissionChecker,
    pub dpp: &'a dyn DppSessionMonitor,
    pub config: &'a ControllerConfig,
    pub allow_root_local_only: bool,
}

impl AdmissionPolicy<'_> {
    pub fn is_sta_sta_supported_for(&self, role: SecondaryRole) -> bool {
        if !self.oracle.is_sta_sta_concurrency_supported() {
            return false;
        }
        match role {
            SecondaryRole::LocalOnly => self.config.multi_sta_local_only,
            SecondaryRole::SecondaryTransient => self.config.multi_sta_make_before_break,
            SecondaryRole::SecondaryLongLived => {
                self.config.multi_sta_restricted || self.config.multi_sta_multi_internet
            }
        }
    }

    pub fn is_sta_sta_supported_for_restricted(&self) -> bool {
        self.oracle.is_sta_sta_concurrency_supported() && self.config.multi_sta_restricted
    }

    pub fn is_sta_sta_supported_for_multi_internet(&self) -> bool {
        self.oracle.is_sta_sta_concurrency_supported() && self.config.multi_sta_multi_internet
    }

    fn effective_requestor(requestor: &WorkSource, approved: bool) -> WorkSource {
        if approved {
            requestor.with(&WorkSource::settings())
        } else {
            requestor.clone()
        }
    }

    fn is_legacy_requestor(&self, requestor: &WorkSource) -> bool {
        requestor
            .first()
            .is_some_and(|r| self.permissions.is_legacy(r))
    }

    /// Whether a new manager in `role` could be created for `requestor`
    /// without destroying a higher-priority interface.
    pub fn can_request_more_client_managers_in_role(
        &self,
        requestor: &WorkSource,
        role: SecondaryRole,
        approved: bool,
    ) -> bool {
        let ws = Self::effective_requestor(requestor, approved);
        if !self.oracle.can_create_sta(&ws) {
            return false;
        }
        match role {
            SecondaryRole::LocalOnly => {
                if !self.is_sta_sta_supported_for(role) {
                    return false;
                }
                let system = requestor
                    .first()
                    .is_some_and(|r| self.permissions.is_system(r));
                system || !self.is_legacy_requestor(requestor)
            }
            SecondaryRole::SecondaryTransient | SecondaryRole::SecondaryLongLived => {
                self.is_sta_sta_supported_for(role)
            }
        }
    }

    pub fn can_request_more_soft_ap_managers(&self, requestor: &WorkSource) -> bool {
        self.oracle.can_create_ap(requestor)
    }

    fn has_car_mode_priority(&self, requestor: &WorkSource) -> bool {
        requestor
            .uids()
            .filter(|&uid| !(uid == ROOT_UID && self.allow_root_local_only))
            .any(|uid| uid != SYSTEM_UID && self.permissions.has_car_mode_priority(uid))
    }

    /// Evaluate `request`. First matching rule wins.
    pub fn decide(
        &self,
        registry: &Registry,
        wifi_state: WifiState,
        request: &RoleRequest,
    ) -> Admission {
        if matches!(wifi_state, WifiState::Disabling | WifiState::Disabled) {
            return Admission::Reject;
        }

        let role = request.role;
        if role == SecondaryRole::LocalOnly
            && !request.prefer_secondary
            && self.has_car_mode_priority(&request.requestor)
        {
            return Admission::FallbackToPrimary;
        }

        if role == SecondaryRole::SecondaryTransient && self.dpp.is_session_in_progress() {
            return Admission::FallbackToPrimary;
        }

        if let Some(ssid) = request.ssid.as_deref() {
            if let Some(linked) = registry.find_linked_to(ssid, request.bssid.as_deref()) {
                let held = linked.active_role();
                if held == Some(Role::ClientPrimary) || held == Some(role.role()) {
                    return Admission::AnswerExisting(linked.id);
                }
                if self.can_request_more_client_managers_in_role(
                    &request.requestor,
                    role,
                    request.user_approved,
                ) {
                    return Admission::SwitchRole {
                        id: linked.id,
                        requestor: request.requestor.clone(),
                    };
                }
                return Admission::Reject;
            }
        }

        if let Some(existing) = registry.client_holding_or_entering(role.role()) {
            return Admission::AnswerExisting(existing.id);
        }

        if self.can_request_more_client_managers_in_role(
            &request.requestor,
            role,
            request.user_approved,
        ) {
            return Admission::Create {
                requestor: Self::effective_requestor(&request.requestor, request.user_approved),
            };
        }

        if role == SecondaryRole::LocalOnly
            && self.is_sta_sta_supported_for(role)
            && !self.is_legacy_requestor(&request.requestor)
        {
            // Modern apps asking for local-only never share the primary.
            return Admission::Reject;
        }

        Admission::FallbackToPrimary
    }
}
