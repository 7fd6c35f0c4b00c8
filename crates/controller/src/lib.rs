//! Radio mode controller for modewarden.
//!
//! Decides which station and access-point interfaces exist and in which
//! role, reacting to user toggles, airplane and satellite mode, emergency
//! state, recovery requests and requests for additional stations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Domain Layer                             │
//! │  policy.rs    - Admission decisions for role requests (pure)│
//! │  registry.rs  - Live managers indexed by role               │
//! │  graveyard.rs - Post-mortem ring of stopped managers        │
//! │  features.rs  - Published feature set                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     State Machine                            │
//! │  machine/     - Disabled / Enabled handlers, deferral,      │
//! │                 lifecycle bookkeeping                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Application Layer                          │
//! │  controller.rs - Thread-safe handle on a serial runner      │
//! │  sim.rs        - In-memory collaborators                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use modewarden_controller::{sim::SimDriver, ControllerConfig, ModeController};
//! use modewarden_roles::WorkSource;
//!
//! let driver = SimDriver::new();
//! let controller = ModeController::spawn(driver.dependencies(), ControllerConfig::default())?;
//! controller.start();
//!
//! driver.settings.set_wifi_enabled(true);
//! controller.wifi_toggled(WorkSource::settings());
//! ```

mod config;
mod controller;
mod deps;
mod error;
mod features;
mod graveyard;
mod machine;
mod manager;
mod message;
mod policy;
mod registry;
mod ring;
pub mod sim;

pub use config::{ControllerConfig, MAX_RECOVERY_DELAY};
pub use controller::ModeController;
pub use deps::{
    BatteryStats, CapabilityOracle, ConcurrencyLimits, ConnectivityReset, Dependencies,
    Diagnostics, DppSessionMonitor, NullHooks, PermissionChecker, RecoveryTracker, ScanControl,
    SettingsStore, SoftApStateListener,
};
pub use error::{ConfigError, ControllerError, Result};
pub use features::compute_feature_set;
pub use graveyard::{GraveyardEntry, StopReason, GRAVEYARD_DEPTH};
pub use machine::{ControllerState, MESSAGE_LOG_DEPTH};
pub use manager::{
    ClientModeManager, EventDelivery, ManagerEvent, ManagerEventSink, ModeManagerFactory,
    RoleRequestListener, SoftApManager,
};
pub use message::RecoveryReason;
pub use policy::RoleRequest;
