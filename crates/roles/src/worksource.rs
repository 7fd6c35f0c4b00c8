//! Requestor attribution.
//!
//! A work source names every party a radio interface is being brought up
//! for. It drives battery attribution and priority comparisons.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Uid of the root user.
pub const ROOT_UID: u32 = 0;

/// Uid of the system server.
pub const SYSTEM_UID: u32 = 1000;

/// Uid the Wi-Fi stack runs as.
pub const WIFI_UID: u32 = 1010;

/// Package name attributed to system settings.
pub const SETTINGS_PACKAGE: &str = "com.android.settings";

/// Package name attributed to the Wi-Fi stack itself.
pub const WIFI_PACKAGE: &str = "android";

/// One attributed party.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Requestor {
    pub uid: u32,
    #[serde(default)]
    pub package: Option<String>,
}

impl Requestor {
    pub fn new(uid: u32, package: impl Into<String>) -> Self {
        Self {
            uid,
            package: Some(package.into()),
        }
    }

    pub fn uid(uid: u32) -> Self {
        Self { uid, package: None }
    }
}

/// Ordered set of requestors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkSource {
    requestors: BTreeSet<Requestor>,
}

impl WorkSource {
    /// An empty work source.
    pub fn new() -> Self {
        Self::default()
    }

    /// A work source with a single requestor.
    pub fn of(requestor: Requestor) -> Self {
        let mut ws = Self::new();
        ws.add(requestor);
        ws
    }

    /// Attribution used for user-initiated changes through system settings.
    pub fn settings() -> Self {
        Self::of(Requestor::new(SYSTEM_UID, SETTINGS_PACKAGE))
    }

    /// Attribution used for work the Wi-Fi stack does on its own behalf.
    pub fn internal() -> Self {
        Self::of(Requestor::new(WIFI_UID, WIFI_PACKAGE))
    }

    /// Add a requestor. Returns false if it was already present.
    pub fn add(&mut self, requestor: Requestor) -> bool {
        self.requestors.insert(requestor)
    }

    /// Merge every requestor of `other` into this set.
    pub fn merge(&mut self, other: &WorkSource) {
        self.requestors.extend(other.requestors.iter().cloned());
    }

    /// A copy of this set extended with `other`.
    pub fn with(&self, other: &WorkSource) -> WorkSource {
        let mut merged = self.clone();
        merged.merge(other);
        merged
    }

    pub fn is_empty(&self) -> bool {
        self.requestors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.requestors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Requestor> {
        self.requestors.iter()
    }

    /// Distinct uids in this set, ascending.
    pub fn uids(&self) -> impl Iterator<Item = u32> + '_ {
        let mut last = None;
        self.requestors.iter().filter_map(move |r| {
            if last == Some(r.uid) {
                None
            } else {
                last = Some(r.uid);
                Some(r.uid)
            }
        })
    }

    /// The first requestor, used when a single identity is needed for
    /// permission checks.
    pub fn first(&self) -> Option<&Requestor> {
        self.requestors.iter().next()
    }
}

impl std::fmt::Display for WorkSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WorkSource{{")?;
        for (i, r) in self.requestors.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match &r.package {
                Some(package) => write!(f, "{} {}", r.uid, package)?,
                None => write!(f, "{}", r.uid)?,
            }
        }
        write!(f, "}}")
    }
}
