//! Observer traits and the fan-out that delivers controller events.
//!
//! Registration hands back an [`ObserverId`]; deregistration is by id, so
//! observers never need to implement equality.

use std::sync::{Arc, Mutex, PoisonError};

use modewarden_roles::ManagerInfo;
use uuid::Uuid;

use crate::bus::EventBusRef;
use crate::ModeEvent;

/// Structural changes to the set of live managers.
pub trait ModeChangeObserver: Send + Sync {
    /// A manager finished starting and now holds a role.
    fn on_added(&self, manager: &ManagerInfo);

    /// A manager stopped or failed to start.
    fn on_removed(&self, manager: &ManagerInfo);

    /// A manager completed an in-place role switch.
    fn on_role_changed(&self, manager: &ManagerInfo);
}

/// Changes of the manager that carries the default route.
pub trait PrimaryChangedObserver: Send + Sync {
    /// The primary moved from `previous` to `next`. `next` is `None` when the
    /// primary went away without a successor; `previous` is `None` when there
    /// was no primary before. A primary that starts stopping is reported as
    /// lost before any replacement is reported.
    fn on_primary_changed(&self, previous: Option<&ManagerInfo>, next: Option<&ManagerInfo>);
}

/// Subsystem recovery lifecycle.
pub trait RestartObserver: Send + Sync {
    fn on_restarting(&self);
    fn on_restarted(&self);
}

/// Observer that ignores everything. Useful as a base or placeholder.
pub struct NullObserver;

impl ModeChangeObserver for NullObserver {
    fn on_added(&self, _manager: &ManagerInfo) {}
    fn on_removed(&self, _manager: &ManagerInfo) {}
    fn on_role_changed(&self, _manager: &ManagerInfo) {}
}

impl PrimaryChangedObserver for NullObserver {
    fn on_primary_changed(&self, _previous: Option<&ManagerInfo>, _next: Option<&ManagerInfo>) {}
}

impl RestartObserver for NullObserver {
    fn on_restarting(&self) {}
    fn on_restarted(&self) {}
}

/// Handle returned on registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(Uuid);

impl ObserverId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registration list for one observer category.
pub struct ObserverList<T: ?Sized> {
    entries: Mutex<Vec<(ObserverId, Arc<T>)>>,
}

impl<T: ?Sized> Default for ObserverList<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<T: ?Sized> ObserverList<T> {
    pub fn register(&self, observer: Arc<T>) -> ObserverId {
        let id = ObserverId::new();
        self.lock().push((id, observer));
        id
    }

    /// Returns false if `id` was not registered.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current registrations, so callbacks run without the lock
    /// and may register or unregister re-entrantly.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.lock().iter().map(|(_, o)| Arc::clone(o)).collect()
    }

    pub fn get(&self, id: ObserverId) -> Option<Arc<T>> {
        self.lock()
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, o)| Arc::clone(o))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ObserverId, Arc<T>)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Delivers [`ModeEvent`]s to every registered observer, in registration
/// order, and mirrors them onto an optional [`crate::EventBus`].
#[derive(Default)]
pub struct Fanout {
    pub mode_change: ObserverList<dyn ModeChangeObserver>,
    pub primary_changed: ObserverList<dyn PrimaryChangedObserver>,
    pub restart: ObserverList<dyn RestartObserver>,
    bus: Option<EventBusRef>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bus(bus: EventBusRef) -> Self {
        Self {
            bus: Some(bus),
            ..Self::default()
        }
    }

    pub fn dispatch(&self, event: &ModeEvent) {
        match event {
            ModeEvent::Added { manager } => {
                for o in self.mode_change.snapshot() {
                    o.on_added(manager);
                }
            }
            ModeEvent::Removed { manager } => {
                for o in self.mode_change.snapshot() {
                    o.on_removed(manager);
                }
            }
            ModeEvent::RoleChanged { manager } => {
                for o in self.mode_change.snapshot() {
                    o.on_role_changed(manager);
                }
            }
            ModeEvent::PrimaryChanged { previous, next } => {
                for o in self.primary_changed.snapshot() {
                    o.on_primary_changed(previous.as_ref(), next.as_ref());
                }
            }
            ModeEvent::SubsystemRestarting => {
                for o in self.restart.snapshot() {
                    o.on_restarting();
                }
            }
            ModeEvent::SubsystemRestarted => {
                for o in self.restart.snapshot() {
                    o.on_restarted();
                }
            }
        }
        if let Some(bus) = &self.bus {
            bus.emit_event(event);
        }
    }
}
