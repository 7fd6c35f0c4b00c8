//! Read-side snapshot for API callers.
//!
//! Guarded by its own lock, independent of the controller's runner, so
//! simple reads never wait behind scheduling work. Getters return copies.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use modewarden_roles::{band, ConnectionInfo, FeatureSet, Network, WifiState, WorkSource};

#[derive(Debug, Default)]
struct Guarded {
    current_network: Option<Network>,
    connection_info: ConnectionInfo,
    feature_set: FeatureSet,
    request_worksources: Vec<WorkSource>,
}

/// Thread-safe, copy-on-read view of controller-derived state.
#[derive(Debug)]
pub struct ServiceSnapshot {
    guarded: Mutex<Guarded>,
    sta_bands: AtomicU32,
    wifi_state: AtomicU8,
}

impl Default for ServiceSnapshot {
    fn default() -> Self {
        Self {
            guarded: Mutex::new(Guarded::default()),
            sta_bands: AtomicU32::new(band::DEFAULT),
            wifi_state: AtomicU8::new(WifiState::Disabled.to_raw()),
        }
    }
}

impl ServiceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_network(&self) -> Option<Network> {
        self.lock().current_network.clone()
    }

    pub fn set_current_network(&self, network: Option<Network>) {
        self.lock().current_network = network;
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        self.lock().connection_info.clone()
    }

    pub fn set_connection_info(&self, info: ConnectionInfo) {
        self.lock().connection_info = info;
    }

    pub fn feature_set(&self) -> FeatureSet {
        self.lock().feature_set
    }

    pub fn set_feature_set(&self, features: FeatureSet) {
        self.lock().feature_set = features;
    }

    /// Work sources of callers holding local-only or long-lived secondary
    /// managers.
    pub fn request_worksources(&self) -> Vec<WorkSource> {
        self.lock().request_worksources.clone()
    }

    /// Track `ws`; a work source already present is not added twice.
    pub fn add_request_worksource(&self, ws: &WorkSource) {
        let mut guarded = self.lock();
        if !guarded.request_worksources.contains(ws) {
            guarded.request_worksources.push(ws.clone());
        }
    }

    pub fn remove_request_worksource(&self, ws: &WorkSource) -> bool {
        let mut guarded = self.lock();
        let before = guarded.request_worksources.len();
        guarded.request_worksources.retain(|existing| existing != ws);
        guarded.request_worksources.len() != before
    }

    pub fn sta_bands(&self) -> u32 {
        self.sta_bands.load(Ordering::Acquire)
    }

    pub fn set_sta_bands(&self, bands: u32) {
        self.sta_bands.store(bands, Ordering::Release);
    }

    /// True if every bit of `band` is supported for station mode.
    pub fn is_band_supported_for_sta(&self, band: u32) -> bool {
        band != 0 && self.sta_bands() & band == band
    }

    pub fn wifi_state(&self) -> WifiState {
        WifiState::from_raw(self.wifi_state.load(Ordering::Acquire))
    }

    /// Store `state`, returning the previous one.
    pub fn set_wifi_state(&self, state: WifiState) -> WifiState {
        WifiState::from_raw(self.wifi_state.swap(state.to_raw(), Ordering::AcqRel))
    }

    fn lock(&self) -> MutexGuard<'_, Guarded> {
        self.guarded.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
