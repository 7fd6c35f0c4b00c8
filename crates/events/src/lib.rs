//! Controller event contracts, observer fan-out and the read snapshot.
//!
//! Structural and primary-changed notifications are produced on the
//! controller's runner thread and delivered through [`Fanout`] after the
//! controller has released its state. API callers that only need derived
//! values read [`ServiceSnapshot`] instead, which never touches the runner.

mod bus;
mod observer;
mod recorder;
mod snapshot;

pub use bus::{EmittedEvent, EventBus, EventBusRef, InMemoryEventBus, NullEventBus};
pub use observer::{
    Fanout, ModeChangeObserver, NullObserver, ObserverId, ObserverList, PrimaryChangedObserver,
    RestartObserver,
};
pub use recorder::RecordingObserver;
pub use snapshot::ServiceSnapshot;

use modewarden_roles::ManagerInfo;
use serde::{Deserialize, Serialize};

/// A notification produced by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModeEvent {
    Added {
        manager: ManagerInfo,
    },
    Removed {
        manager: ManagerInfo,
    },
    RoleChanged {
        manager: ManagerInfo,
    },
    PrimaryChanged {
        #[serde(default)]
        previous: Option<ManagerInfo>,
        #[serde(default)]
        next: Option<ManagerInfo>,
    },
    SubsystemRestarting,
    SubsystemRestarted,
}

impl ModeEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            ModeEvent::Added { .. } => event_names::MANAGER_ADDED,
            ModeEvent::Removed { .. } => event_names::MANAGER_REMOVED,
            ModeEvent::RoleChanged { .. } => event_names::MANAGER_ROLE_CHANGED,
            ModeEvent::PrimaryChanged { .. } => event_names::PRIMARY_CHANGED,
            ModeEvent::SubsystemRestarting => event_names::SUBSYSTEM_RESTARTING,
            ModeEvent::SubsystemRestarted => event_names::SUBSYSTEM_RESTARTED,
        }
    }

    /// Id of the manager the event is about, if any. For primary changes
    /// this is the manager gaining the role, or else the one losing it.
    pub fn manager_id(&self) -> Option<modewarden_roles::ManagerId> {
        match self {
            ModeEvent::Added { manager }
            | ModeEvent::Removed { manager }
            | ModeEvent::RoleChanged { manager } => Some(manager.id),
            ModeEvent::PrimaryChanged { previous, next } => {
                next.as_ref().or(previous.as_ref()).map(|m| m.id)
            }
            ModeEvent::SubsystemRestarting | ModeEvent::SubsystemRestarted => None,
        }
    }
}

/// Event names as constants to prevent typos.
pub mod event_names {
    pub const MANAGER_ADDED: &str = "mode:added";
    pub const MANAGER_REMOVED: &str = "mode:removed";
    pub const MANAGER_ROLE_CHANGED: &str = "mode:role_changed";
    pub const PRIMARY_CHANGED: &str = "mode:primary_changed";
    pub const SUBSYSTEM_RESTARTING: &str = "subsystem:restarting";
    pub const SUBSYSTEM_RESTARTED: &str = "subsystem:restarted";
}
