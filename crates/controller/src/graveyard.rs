//! Post-mortem snapshots of recently removed managers.

use chrono::{DateTime, Utc};
use modewarden_roles::{ManagerInfo, ManagerKind};
use serde::{Deserialize, Serialize};

use crate::ring::Ring;

/// Entries kept per manager kind.
pub const GRAVEYARD_DEPTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Stopped,
    StartFailure,
}

impl StopReason {
    pub fn label(&self) -> &'static str {
        match self {
            StopReason::Stopped => "stopped",
            StopReason::StartFailure => "start_failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraveyardEntry {
    pub info: ManagerInfo,
    pub reason: StopReason,
    pub stopped_at: DateTime<Utc>,
}

impl std::fmt::Display for GraveyardEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} at {}",
            self.info,
            self.reason.label(),
            self.stopped_at.format("%m-%d %H:%M:%S%.3f")
        )
    }
}

#[derive(Debug, Default)]
pub struct Graveyard {
    clients: Ring<GraveyardEntry, GRAVEYARD_DEPTH>,
    soft_aps: Ring<GraveyardEntry, GRAVEYARD_DEPTH>,
}

impl Graveyard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inter(&mut self, info: ManagerInfo, reason: StopReason) {
        let kind = info.kind;
        let entry = GraveyardEntry {
            info,
            reason,
            stopped_at: Utc::now(),
        };
        let ring = match kind {
            ManagerKind::Client => &mut self.clients,
            ManagerKind::SoftAp => &mut self.soft_aps,
        };
        if let Some(evicted) = ring.push(entry) {
            tracing::trace!(id = %evicted.info.id, "graveyard evicted");
        }
    }

    /// Oldest first.
    pub fn entries(&self, kind: ManagerKind) -> Vec<GraveyardEntry> {
        match kind {
            ManagerKind::Client => self.clients.to_vec(),
            ManagerKind::SoftAp => self.soft_aps.to_vec(),
        }
    }

    pub fn dump(&self, out: &mut String) {
        use std::fmt::Write;
        for (title, ring) in [("client", &self.clients), ("soft_ap", &self.soft_aps)] {
            let _ = writeln!(out, "graveyard {title} ({}):", ring.len());
            for entry in ring.iter() {
                let _ = writeln!(out, "  {entry}");
            }
        }
    }
}
