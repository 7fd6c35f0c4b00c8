//! Observer that records every callback as a [`ModeEvent`].

use std::sync::{Mutex, PoisonError};

use modewarden_roles::ManagerInfo;

use crate::observer::{ModeChangeObserver, PrimaryChangedObserver, RestartObserver};
use crate::ModeEvent;

/// Captures callbacks from all three observer categories into one ordered
/// log. Register the same instance in several categories to check cross
/// category ordering.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ModeEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ModeEvent> {
        self.lock().clone()
    }

    /// Topics of the recorded events, oldest first.
    pub fn topics(&self) -> Vec<&'static str> {
        self.lock().iter().map(ModeEvent::topic).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn push(&self, event: ModeEvent) {
        self.lock().push(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ModeEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ModeChangeObserver for RecordingObserver {
    fn on_added(&self, manager: &ManagerInfo) {
        self.push(ModeEvent::Added {
            manager: manager.clone(),
        });
    }

    fn on_removed(&self, manager: &ManagerInfo) {
        self.push(ModeEvent::Removed {
            manager: manager.clone(),
        });
    }

    fn on_role_changed(&self, manager: &ManagerInfo) {
        self.push(ModeEvent::RoleChanged {
            manager: manager.clone(),
        });
    }
}

impl PrimaryChangedObserver for RecordingObserver {
    fn on_primary_changed(&self, previous: Option<&ManagerInfo>, next: Option<&ManagerInfo>) {
        self.push(ModeEvent::PrimaryChanged {
            previous: previous.cloned(),
            next: next.cloned(),
        });
    }
}

impl RestartObserver for RecordingObserver {
    fn on_restarting(&self) {
        self.push(ModeEvent::SubsystemRestarting);
    }

    fn on_restarted(&self) {
        self.push(ModeEvent::SubsystemRestarted);
    }
}
