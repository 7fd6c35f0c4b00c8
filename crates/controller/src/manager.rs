//! Mode manager actuators and their lifecycle reporting.
//!
//! A manager owns one radio interface. The controller drives it
//! imperatively (`set_role`, `stop`) and learns about progress only through
//! the [`ManagerEventSink`] it handed over at creation; every reported event
//! is queued onto the controller's runner.

use std::sync::Arc;

use modewarden_roles::{
    ConnectionInfo, LinkTarget, ManagerId, ManagerInfo, Network, Role, SoftApCapability,
    SoftApConfiguration, SoftApModeConfig, WorkSource,
};

/// Lifecycle events a manager reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerEvent {
    /// The interface is up in its target role.
    Started,
    /// An in-place role switch completed.
    RoleChanged,
    /// The interface is down after a requested stop.
    Stopped,
    /// The interface could not be brought up.
    StartFailure,
}

impl ManagerEvent {
    pub fn label(&self) -> &'static str {
        match self {
            ManagerEvent::Started => "started",
            ManagerEvent::RoleChanged => "role_changed",
            ManagerEvent::Stopped => "stopped",
            ManagerEvent::StartFailure => "start_failure",
        }
    }
}

impl std::fmt::Display for ManagerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Callback that routes a manager's events back to the controller.
pub type EventDelivery = Arc<dyn Fn(ManagerId, ManagerEvent) + Send + Sync>;

/// Channel back to the controller, bound to one manager id.
#[derive(Clone)]
pub struct ManagerEventSink {
    id: ManagerId,
    deliver: EventDelivery,
}

impl ManagerEventSink {
    pub fn new(id: ManagerId, deliver: EventDelivery) -> Self {
        Self { id, deliver }
    }

    /// A sink that discards everything.
    pub fn detached(id: ManagerId) -> Self {
        Self::new(id, Arc::new(|_, _| {}))
    }

    pub fn id(&self) -> ManagerId {
        self.id
    }

    pub fn report(&self, event: ManagerEvent) {
        (self.deliver)(self.id, event);
    }
}

impl std::fmt::Debug for ManagerEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerEventSink").field("id", &self.id).finish()
    }
}

/// One-shot answer to a role request. `None` means rejected.
pub type RoleRequestListener = Box<dyn FnOnce(Option<ManagerInfo>) + Send>;

/// A station interface.
pub trait ClientModeManager: Send {
    /// Begin switching to `role`; completion is reported as
    /// [`ManagerEvent::RoleChanged`].
    fn set_role(&mut self, role: Role, requestor: &WorkSource);

    /// Begin tearing down; completion is reported as [`ManagerEvent::Stopped`].
    fn stop(&mut self);

    fn interface_name(&self) -> Option<String>;

    /// Network an association is in progress with.
    fn connecting(&self) -> Option<LinkTarget> {
        None
    }

    /// Network currently associated with.
    fn connected(&self) -> Option<LinkTarget> {
        None
    }

    /// Whether `bssid` is an affiliated link of the current multi-link
    /// association.
    fn is_affiliated_link(&self, _bssid: &str) -> bool {
        false
    }

    fn current_network(&self) -> Option<Network> {
        None
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo::default()
    }
}

/// An access point interface.
pub trait SoftApManager: Send {
    fn stop(&mut self);

    fn interface_name(&self) -> Option<String>;

    fn update_capability(&mut self, _capability: &SoftApCapability) {}

    fn update_configuration(&mut self, _configuration: &SoftApConfiguration) {}
}

/// Brings interfaces up. Creation starts the manager; success or failure is
/// reported through `sink`.
pub trait ModeManagerFactory: Send + Sync {
    fn create_client(
        &self,
        role: Role,
        requestor: &WorkSource,
        sink: ManagerEventSink,
    ) -> Box<dyn ClientModeManager>;

    fn create_soft_ap(
        &self,
        config: &SoftApModeConfig,
        requestor: &WorkSource,
        sink: ManagerEventSink,
    ) -> Box<dyn SoftApManager>;
}
