//! Domain types for radio mode arbitration.
//!
//! Everything in this crate is plain data: roles and their classification,
//! requestor attribution, feature and band bitmasks, and the immutable
//! manager snapshots that flow from the controller to its observers.
//!
//! ```text
//! Role ──► SecondaryRole (requestable subset)
//!   │
//!   └──► ManagerInfo { id, kind, role, target_role, requestor, link, soft_ap }
//! ```

mod manager;
mod role;
pub mod types;
mod worksource;

pub use manager::{ManagerId, ManagerInfo, ManagerKind};
pub use role::{MultiStaUseCase, Role, SecondaryRole, SoftApMode};
pub use types::{
    band, ConnectionInfo, FeatureSet, LinkTarget, Network, SoftApCapability,
    SoftApConfiguration, SoftApModeConfig, WifiState,
};
pub use worksource::{
    Requestor, WorkSource, ROOT_UID, SETTINGS_PACKAGE, SYSTEM_UID, WIFI_PACKAGE, WIFI_UID,
};
