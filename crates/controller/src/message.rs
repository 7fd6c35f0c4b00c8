//! Typed inputs of the controller state machine.

use std::fmt;

use modewarden_roles::{
    ManagerId, Role, SoftApCapability, SoftApConfiguration, SoftApMode, SoftApModeConfig,
    WorkSource,
};
use serde::{Deserialize, Serialize};

use crate::manager::{ManagerEvent, RoleRequestListener};
use crate::policy::RoleRequest;

/// Why a recovery restart was asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryReason {
    LastResortWatchdog,
    NativeFailure,
    StaIfaceDown,
    ApiCall,
    SubsystemRestart,
    IfaceAdded,
}

impl RecoveryReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryReason::LastResortWatchdog => "last resort watchdog",
            RecoveryReason::NativeFailure => "native failure",
            RecoveryReason::StaIfaceDown => "sta interface down",
            RecoveryReason::ApiCall => "api call",
            RecoveryReason::SubsystemRestart => "subsystem restart",
            RecoveryReason::IfaceAdded => "interface added",
        }
    }
}

impl fmt::Display for RecoveryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A manager captured before a recovery shutdown, recreated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecoverySnapshot {
    Client {
        role: Role,
        requestor: WorkSource,
    },
    SoftAp {
        config: SoftApModeConfig,
        requestor: WorkSource,
    },
}

/// Soft-AP on/off request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoftApCommand {
    Start {
        config: SoftApModeConfig,
        requestor: WorkSource,
    },
    /// Stop soft-APs in `mode`, or every soft-AP when `None`.
    Stop { mode: Option<SoftApMode> },
}

/// Everything the state machine reacts to.
pub enum Message {
    WifiToggled(WorkSource),
    ScanAlwaysModeChanged(WorkSource),
    AirplaneToggled,
    SatelliteModeChanged,
    SetSoftAp(SoftApCommand),
    UpdateApCapability {
        capability: SoftApCapability,
        mode: SoftApMode,
    },
    UpdateApConfig(SoftApConfiguration),
    EmergencyCallbackModeChanged(bool),
    EmergencyCallStateChanged(bool),
    EmergencyScanStateChanged {
        in_progress: bool,
        requestor: WorkSource,
    },
    RequestAdditional {
        request: RoleRequest,
        listener: RoleRequestListener,
    },
    RemoveAdditional(ManagerId),
    StaStopped,
    StaStartFailure,
    ApStopped,
    ApStartFailure,
    RecoveryRestart {
        reason: String,
        bug_report: bool,
    },
    DeferredRecoveryRestart(Vec<RecoverySnapshot>),
    RecoveryRestartContinue(Vec<RecoverySnapshot>),
    RecoveryDisable,
    /// Lifecycle report from a manager, routed through the queue.
    Lifecycle(ManagerId, ManagerEvent),
}

impl Message {
    pub fn label(&self) -> &'static str {
        match self {
            Message::WifiToggled(_) => "wifi_toggled",
            Message::ScanAlwaysModeChanged(_) => "scan_always_mode_changed",
            Message::AirplaneToggled => "airplane_toggled",
            Message::SatelliteModeChanged => "satellite_mode_changed",
            Message::SetSoftAp(SoftApCommand::Start { .. }) => "set_ap_on",
            Message::SetSoftAp(SoftApCommand::Stop { .. }) => "set_ap_off",
            Message::UpdateApCapability { .. } => "update_ap_capability",
            Message::UpdateApConfig(_) => "update_ap_config",
            Message::EmergencyCallbackModeChanged(_) => "emergency_callback_mode_changed",
            Message::EmergencyCallStateChanged(_) => "emergency_call_state_changed",
            Message::EmergencyScanStateChanged { .. } => "emergency_scan_state_changed",
            Message::RequestAdditional { .. } => "request_additional",
            Message::RemoveAdditional(_) => "remove_additional",
            Message::StaStopped => "sta_stopped",
            Message::StaStartFailure => "sta_start_failure",
            Message::ApStopped => "ap_stopped",
            Message::ApStartFailure => "ap_start_failure",
            Message::RecoveryRestart { .. } => "recovery_restart",
            Message::DeferredRecoveryRestart(_) => "deferred_recovery_restart",
            Message::RecoveryRestartContinue(_) => "recovery_restart_continue",
            Message::RecoveryDisable => "recovery_disable",
            Message::Lifecycle(_, _) => "manager_lifecycle",
        }
    }

    pub(crate) fn is_stop_or_failure(&self) -> bool {
        matches!(
            self,
            Message::StaStopped
                | Message::StaStartFailure
                | Message::ApStopped
                | Message::ApStartFailure
        )
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::WifiToggled(ws) | Message::ScanAlwaysModeChanged(ws) => {
                write!(f, "{}({})", self.label(), ws)
            }
            Message::EmergencyCallbackModeChanged(on) | Message::EmergencyCallStateChanged(on) => {
                write!(f, "{}({})", self.label(), on)
            }
            Message::EmergencyScanStateChanged { in_progress, .. } => {
                write!(f, "{}({})", self.label(), in_progress)
            }
            Message::RequestAdditional { request, .. } => {
                write!(f, "{}({} {})", self.label(), request.role, request.requestor)
            }
            Message::RemoveAdditional(id) => write!(f, "{}({})", self.label(), id),
            Message::RecoveryRestart { reason, .. } => write!(f, "{}({})", self.label(), reason),
            Message::DeferredRecoveryRestart(list) | Message::RecoveryRestartContinue(list) => {
                write!(f, "{}(n={})", self.label(), list.len())
            }
            Message::Lifecycle(id, event) => write!(f, "{}({} {})", self.label(), id, event),
            _ => f.write_str(self.label()),
        }
    }
}
