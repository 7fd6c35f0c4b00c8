//! End-to-end behavior of the mode controller against the simulated driver.
//!
//! Most tests drive a manual runner on the test thread: inputs are queued,
//! `settle()` runs everything ready, and queries execute inline.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use modewarden_controller::sim::{SimDriver, SimOracle};
use modewarden_controller::{
    ControllerConfig, ControllerState, ManagerEvent, ModeController, RecoveryReason, RoleRequest,
    GRAVEYARD_DEPTH,
};
use modewarden_events::{InMemoryEventBus, ModeEvent, RecordingObserver};
use modewarden_roles::{
    band, FeatureSet, LinkTarget, ManagerId, ManagerInfo, ManagerKind, Requestor, Role,
    SecondaryRole, SoftApMode, SoftApModeConfig, WifiState, WorkSource,
};
use modewarden_runner::{RunnerConfig, SerialRunner};

const PEER_SSID: &str = "Foo";
const PEER_BSSID: &str = "AA:BB:CC:DD:EE:FF";

fn app(uid: u32) -> WorkSource {
    WorkSource::of(Requestor::new(uid, format!("com.example.app{uid}")))
}

type Answers = Arc<Mutex<Vec<Option<ManagerInfo>>>>;

struct Harness {
    driver: SimDriver,
    controller: ModeController,
    recorder: Arc<RecordingObserver>,
}

impl Harness {
    fn new(config: ControllerConfig) -> Self {
        Self::with_driver(SimDriver::with_oracle(SimOracle::dual_sta()), config)
    }

    fn with_driver(driver: SimDriver, config: ControllerConfig) -> Self {
        let runner = SerialRunner::manual(RunnerConfig::named("modewarden-test"));
        let controller = ModeController::new(driver.dependencies(), config, runner);
        let recorder = Arc::new(RecordingObserver::new());
        controller.register_mode_change_observer(recorder.clone());
        controller.register_primary_changed_observer(recorder.clone());
        controller.register_restart_observer(recorder.clone());
        Self {
            driver,
            controller,
            recorder,
        }
    }

    /// Start with Wi-Fi on and wait for the primary.
    fn started_with_wifi(config: ControllerConfig) -> Self {
        let h = Self::new(config);
        h.driver.settings.set_wifi_enabled(true);
        h.start();
        assert!(h.controller.primary_client_mode_manager().is_some());
        h.recorder.clear();
        h
    }

    fn start(&self) {
        self.controller.start();
        self.settle();
    }

    fn settle(&self) {
        self.controller.runner().dispatch_all();
    }

    fn set_wifi(&self, on: bool) {
        self.driver.settings.set_wifi_enabled(on);
        self.controller.wifi_toggled(WorkSource::settings());
        self.settle();
    }

    fn primary(&self) -> ManagerInfo {
        self.controller
            .primary_client_mode_manager()
            .expect("primary client mode manager")
    }

    fn state(&self) -> ControllerState {
        self.controller.current_state().expect("controller state")
    }

    fn request(&self, request: RoleRequest) -> Answers {
        let answers: Answers = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&answers);
        self.controller
            .request_client_mode_manager(request, move |info| sink.lock().unwrap().push(info));
        answers
    }

    fn count_created(&self, role: Role) -> usize {
        let needle = format!(" {role}");
        self.driver
            .factory
            .calls()
            .iter()
            .filter(|c| c.starts_with("create_client") && c.ends_with(&needle))
            .count()
    }

    fn assert_invariants(&self) {
        let clients = self.controller.client_mode_managers();
        let soft_aps = self.controller.soft_ap_managers();
        let live = !clients.is_empty() || !soft_aps.is_empty();
        assert_eq!(
            self.state() == ControllerState::Enabled,
            live,
            "enabled state must match a non-empty registry: {clients:?} {soft_aps:?}"
        );
        for role in [Role::ClientPrimary, Role::ClientScanOnly] {
            let holders = clients.iter().filter(|c| c.role == Some(role)).count();
            assert!(holders <= 1, "{holders} managers hold {role}");
        }
    }
}

fn single_answer(answers: &Answers) -> Option<ManagerInfo> {
    let answers = answers.lock().unwrap();
    assert_eq!(answers.len(), 1, "listener must be answered exactly once");
    answers[0].clone()
}

fn position(events: &[ModeEvent], pred: impl Fn(&ModeEvent) -> bool) -> usize {
    events
        .iter()
        .position(pred)
        .unwrap_or_else(|| panic!("event not found in {events:?}"))
}

// =============================================================================
// Toggles
// =============================================================================

mod toggles {
    use super::*;

    #[test]
    fn test_toggle_on_creates_primary() {
        let h = Harness::new(ControllerConfig::default());
        h.start();
        assert_eq!(h.state(), ControllerState::Disabled);
        assert!(h.controller.client_mode_managers().is_empty());

        h.set_wifi(true);

        let primary = h.primary();
        assert_eq!(primary.role, Some(Role::ClientPrimary));
        assert_eq!(h.controller.client_mode_managers().len(), 1);
        assert_eq!(h.state(), ControllerState::Enabled);
        assert_eq!(h.controller.wifi_state(), WifiState::Enabled);
        assert_eq!(h.recorder.topics(), vec!["mode:added", "mode:primary_changed"]);
        assert_eq!(h.driver.hooks.last_scan_mode(), Some((true, true)));
        assert_eq!(h.driver.hooks.wifi_on_reports(), 1);
        h.assert_invariants();
    }

    #[test]
    fn test_start_twice_is_ignored() {
        let h = Harness::new(ControllerConfig::default());
        h.driver.settings.set_wifi_enabled(true);
        h.start();
        h.start();
        assert_eq!(h.count_created(Role::ClientPrimary), 1);
    }

    #[test]
    fn test_toggle_off_stops_everything() {
        let h = Harness::started_with_wifi(ControllerConfig::default());
        let primary = h.primary();

        h.set_wifi(false);

        assert_eq!(h.state(), ControllerState::Disabled);
        assert_eq!(h.controller.wifi_state(), WifiState::Disabled);
        assert!(h.controller.primary_client_mode_manager().is_none());
        assert_eq!(h.driver.hooks.connectivity_resets(), 1);
        assert_eq!(h.driver.hooks.wifi_off_reports(), 1);
        assert_eq!(h.driver.hooks.wifi_stopped_reports(), 1);
        let graveyard = h.controller.graveyard(ManagerKind::Client);
        assert_eq!(graveyard.len(), 1);
        assert_eq!(graveyard[0].info.id, primary.id);
        assert_eq!(graveyard[0].info.previous_role, Some(Role::ClientPrimary));
        h.assert_invariants();
    }

    #[test]
    fn test_scan_only_switches_in_place_to_primary() {
        let h = Harness::new(ControllerConfig::default());
        h.driver.settings.set_scan_only_available(true);
        h.start();

        let scan_only = h
            .controller
            .scan_only_client_mode_manager()
            .expect("scan-only manager");
        assert_eq!(h.driver.hooks.last_scan_mode(), Some((true, false)));
        assert!(h.driver.hooks.scan_mode_active_reports() >= 1);
        h.recorder.clear();

        h.set_wifi(true);

        let primary = h.primary();
        assert_eq!(primary.id, scan_only.id);
        assert_eq!(primary.previous_role, Some(Role::ClientScanOnly));
        assert_eq!(h.count_created(Role::ClientPrimary), 0);
        assert_eq!(
            h.recorder.topics(),
            vec!["mode:role_changed", "mode:primary_changed"]
        );
        assert_eq!(h.driver.hooks.last_scan_mode(), Some((true, true)));

        // Toggle off falls back to scan-only, still in place.
        h.set_wifi(false);
        let back = h
            .controller
            .scan_only_client_mode_manager()
            .expect("scan-only manager");
        assert_eq!(back.id, scan_only.id);
        assert_eq!(h.controller.wifi_state(), WifiState::Disabled);
        h.assert_invariants();
    }

    #[test]
    fn test_location_change_reevaluates_scan_only() {
        let h = Harness::new(ControllerConfig::default());
        h.start();
        h.driver.settings.set_scan_only_available(true);
        h.controller.location_mode_changed();
        h.settle();
        assert!(h.controller.scan_only_client_mode_manager().is_some());

        h.driver.settings.set_scan_only_available(false);
        h.controller.location_mode_changed();
        h.settle();
        assert_eq!(h.state(), ControllerState::Disabled);
        h.assert_invariants();
    }

    #[test]
    fn test_primary_start_failure_returns_to_disabled() {
        let h = Harness::new(ControllerConfig::default());
        h.start();
        h.driver.factory.fail_next_client_starts(1);

        h.set_wifi(true);

        assert_eq!(h.state(), ControllerState::Disabled);
        assert_eq!(h.controller.wifi_state(), WifiState::Disabled);
        assert!(h.recorder.is_empty(), "no added event for a failed start");
        let graveyard = h.controller.graveyard(ManagerKind::Client);
        assert_eq!(graveyard.len(), 1);
        assert_eq!(graveyard[0].reason.label(), "start_failure");
        h.assert_invariants();
    }

    #[test]
    fn test_every_resolved_country_code_resends_scan_mode() {
        let h = Harness::started_with_wifi(ControllerConfig::default());
        let before = h.driver.hooks.scan_modes().len();

        h.controller
            .update_client_scan_mode_after_country_code_update(Some("US".to_string()));
        h.controller
            .update_client_scan_mode_after_country_code_update(Some("US".to_string()));
        h.settle();
        assert_eq!(h.driver.hooks.scan_modes().len(), before + 2);

        h.controller
            .update_client_scan_mode_after_country_code_update(None);
        h.settle();
        assert_eq!(h.driver.hooks.scan_modes().len(), before + 2);
        assert_eq!(h.driver.hooks.last_scan_mode(), Some((true, true)));
    }
}

// =============================================================================
// Invariants
// =============================================================================

mod invariants {
    use super::*;

    #[test]
    fn test_enabled_matches_registry_through_toggle_sequence() {
        let h = Harness::new(ControllerConfig::default());
        h.start();
        h.assert_invariants();
        for on in [true, false, true, true, false, false, true] {
            h.set_wifi(on);
            h.assert_invariants();
        }
        h.controller
            .start_soft_ap(SoftApModeConfig::new(SoftApMode::Tethered), app(10001));
        h.settle();
        h.assert_invariants();
        h.set_wifi(false);
        assert_eq!(h.state(), ControllerState::Enabled, "soft AP keeps it enabled");
        h.controller.stop_soft_ap(None);
        h.settle();
        assert_eq!(h.state(), ControllerState::Disabled);
        h.assert_invariants();
    }

    #[test]
    fn test_graveyard_is_bounded_fifo() {
        let h = Harness::new(ControllerConfig::default());
        h.start();
        let mut ids = Vec::new();
        for _ in 0..5 {
            h.set_wifi(true);
            ids.push(h.primary().id);
            h.set_wifi(false);
        }

        let graveyard = h.controller.graveyard(ManagerKind::Client);
        assert_eq!(graveyard.len(), GRAVEYARD_DEPTH);
        let kept: Vec<ManagerId> = graveyard.iter().map(|e| e.info.id).collect();
        assert_eq!(kept, ids[ids.len() - GRAVEYARD_DEPTH..].to_vec());
        assert!(h.controller.graveyard(ManagerKind::SoftAp).is_empty());
    }

    #[test]
    fn test_primary_replacement_ordering() {
        let h = Harness::started_with_wifi(ControllerConfig::default());
        let old = h.primary();
        h.driver.factory.set_auto_complete(false);

        h.set_wifi(false);
        h.set_wifi(true);
        let new_id = h
            .controller
            .client_mode_managers()
            .iter()
            .map(|c| c.id)
            .find(|id| *id != old.id)
            .expect("replacement manager");

        h.driver.factory.report(old.id, ManagerEvent::Stopped);
        h.driver.factory.report(new_id, ManagerEvent::Started);
        h.settle();

        let events = h.recorder.events();
        let lost = position(&events, |e| {
            matches!(e, ModeEvent::PrimaryChanged { previous: Some(p), next: None } if p.id == old.id)
        });
        let removed = position(&events, |e| {
            matches!(e, ModeEvent::Removed { manager } if manager.id == old.id)
        });
        let added = position(&events, |e| {
            matches!(e, ModeEvent::Added { manager } if manager.id == new_id)
        });
        let gained = position(&events, |e| {
            matches!(e, ModeEvent::PrimaryChanged { previous: None, next: Some(n) } if n.id == new_id)
        });
        assert!(lost < removed);
        assert!(added < gained);
        assert_eq!(h.primary().id, new_id);
        assert_eq!(h.controller.wifi_state(), WifiState::Enabled);
        h.assert_invariants();
    }

    #[test]
    fn test_primary_loss_reported_before_replacement_starts() {
        let h = Harness::started_with_wifi(ControllerConfig::default());
        let old = h.primary();
        h.driver.factory.set_auto_complete(false);

        h.set_wifi(false);
        assert!(h.controller.primary_client_mode_manager().is_none());
        let events = h.recorder.events();
        assert_eq!(events.len(), 1, "{events:?}");
        assert!(matches!(
            &events[0],
            ModeEvent::PrimaryChanged { previous: Some(p), next: None } if p.id == old.id
        ));

        h.set_wifi(true);
        let new_id = h
            .controller
            .client_mode_managers()
            .iter()
            .map(|c| c.id)
            .find(|id| *id != old.id)
            .expect("replacement manager");

        // The replacement comes up before the old interface finishes stopping.
        h.driver.factory.report(new_id, ManagerEvent::Started);
        h.driver.factory.report(old.id, ManagerEvent::Stopped);
        h.settle();

        let events = h.recorder.events();
        let lost = position(&events, |e| {
            matches!(e, ModeEvent::PrimaryChanged { previous: Some(p), next: None } if p.id == old.id)
        });
        let gained = position(&events, |e| {
            matches!(e, ModeEvent::PrimaryChanged { previous, next: Some(n) } if n.id == new_id && previous.is_none())
        });
        let removed = position(&events, |e| {
            matches!(e, ModeEvent::Removed { manager } if manager.id == old.id)
        });
        assert!(lost < gained);
        assert!(gained < removed);
        assert!(!events.iter().any(|e| matches!(
            e,
            ModeEvent::PrimaryChanged { previous: Some(p), next: Some(_) } if p.id == old.id
        )));
        assert_eq!(h.primary().id, new_id);
        assert_eq!(h.controller.wifi_state(), WifiState::Enabled);
        h.assert_invariants();
    }

    #[test]
    fn test_late_primary_observer_gets_current_primary() {
        let h = Harness::started_with_wifi(ControllerConfig::default());
        let primary = h.primary();
        let late = Arc::new(RecordingObserver::new());
        h.controller.register_primary_changed_observer(late.clone());
        h.settle();

        assert_eq!(
            late.events(),
            vec![ModeEvent::PrimaryChanged {
                previous: None,
                next: Some(primary),
            }]
        );
    }

    #[test]
    fn test_unregistered_observer_is_silent() {
        let h = Harness::new(ControllerConfig::default());
        h.start();
        let other = Arc::new(RecordingObserver::new());
        let id = h.controller.register_mode_change_observer(other.clone());
        assert!(h.controller.unregister_mode_change_observer(id));
        assert!(!h.controller.unregister_mode_change_observer(id));

        h.set_wifi(true);
        assert!(other.is_empty());
        assert!(!h.recorder.is_empty());
    }
}

// =============================================================================
// Additional client requests
// =============================================================================

mod requests {
    use super::*;

    fn multi_sta() -> ControllerConfig {
        ControllerConfig::default().with_all_multi_sta()
    }

    #[test]
    fn test_local_only_request_creates_secondary() {
        let h = Harness::started_with_wifi(multi_sta());
        let requestor = app(10010);

        let answers = h.request(
            RoleRequest::new(SecondaryRole::LocalOnly, requestor.clone())
                .with_target("peer", Some("11:22:33:44:55:66")),
        );
        h.settle();

        let info = single_answer(&answers).expect("granted");
        assert_eq!(info.role, Some(Role::ClientLocalOnly));
        assert_ne!(info.id, h.primary().id);
        assert_eq!(h.controller.secondary_request_worksources(), vec![requestor]);
        assert_eq!(
            h.driver.oracle.last_use_case(),
            Some(modewarden_roles::MultiStaUseCase::NonTransientUnbiased)
        );
        assert_eq!(h.controller.client_mode_managers().len(), 2);
        assert_eq!(h.controller.internet_connectivity_client_mode_managers().len(), 1);
        h.assert_invariants();
    }

    #[test]
    fn test_same_request_twice_yields_same_manager() {
        let h = Harness::started_with_wifi(multi_sta());
        let request = || RoleRequest::new(SecondaryRole::SecondaryTransient, app(10011));

        // Second request arrives while the first manager is still starting.
        let first = h.request(request());
        let second = h.request(request());
        h.settle();
        let third = h.request(request());
        h.settle();

        let a = single_answer(&first).expect("granted");
        let b = single_answer(&second).expect("granted");
        let c = single_answer(&third).expect("granted");
        assert_eq!(a.id, b.id);
        assert_eq!(b.id, c.id);
        assert_eq!(h.count_created(Role::ClientSecondaryTransient), 1);
    }

    #[test]
    fn test_same_bssid_conflict_switches_role_in_place() {
        let h = Harness::started_with_wifi(multi_sta());

        let transient = h.request(
            RoleRequest::new(SecondaryRole::SecondaryTransient, app(10020))
                .with_target(PEER_SSID, Some(PEER_BSSID)),
        );
        h.settle();
        let transient = single_answer(&transient).expect("granted");
        h.driver.factory.set_link(
            transient.id,
            Some(LinkTarget::new(PEER_SSID, Some(PEER_BSSID))),
            &[],
        );
        h.recorder.clear();

        let local_only = h.request(
            RoleRequest::new(SecondaryRole::LocalOnly, app(10021))
                .with_target(PEER_SSID, Some(PEER_BSSID)),
        );
        h.settle();

        let switched = single_answer(&local_only).expect("granted");
        assert_eq!(switched.id, transient.id);
        assert_eq!(switched.role, Some(Role::ClientLocalOnly));
        assert_eq!(switched.previous_role, Some(Role::ClientSecondaryTransient));
        assert_eq!(h.count_created(Role::ClientLocalOnly), 0);
        assert_eq!(h.recorder.topics(), vec!["mode:role_changed"]);
        assert_eq!(h.controller.secondary_request_worksources(), vec![app(10021)]);
        h.assert_invariants();
    }

    #[test]
    fn test_affiliated_link_counts_as_same_network() {
        let h = Harness::started_with_wifi(multi_sta());
        let primary = h.primary();
        h.driver.factory.set_link(
            primary.id,
            Some(LinkTarget::new(PEER_SSID, Some("00:00:00:00:00:01"))),
            &[PEER_BSSID],
        );

        let answers = h.request(
            RoleRequest::new(SecondaryRole::SecondaryTransient, app(10022))
                .with_target(PEER_SSID, Some(PEER_BSSID)),
        );
        h.settle();

        assert_eq!(single_answer(&answers).map(|i| i.id), Some(primary.id));
        assert_eq!(h.count_created(Role::ClientSecondaryTransient), 0);
    }

    #[test]
    fn test_conflict_rejected_when_oracle_refuses() {
        let h = Harness::started_with_wifi(multi_sta());
        let transient = h.request(
            RoleRequest::new(SecondaryRole::SecondaryTransient, app(10030))
                .with_target(PEER_SSID, Some(PEER_BSSID)),
        );
        h.settle();
        let transient = single_answer(&transient).expect("granted");
        h.driver.factory.set_link(
            transient.id,
            Some(LinkTarget::new(PEER_SSID, Some(PEER_BSSID))),
            &[],
        );
        h.driver.oracle.set_can_create_sta(false);

        let answers = h.request(
            RoleRequest::new(SecondaryRole::LocalOnly, app(10031))
                .with_target(PEER_SSID, Some(PEER_BSSID)),
        );
        h.settle();

        assert!(single_answer(&answers).is_none());
        assert_eq!(
            h.controller
                .client_mode_manager_in_role(Role::ClientSecondaryTransient)
                .map(|c| c.id),
            Some(transient.id)
        );
    }

    #[test]
    fn test_single_sta_falls_back_to_primary() {
        let h = Harness::with_driver(SimDriver::new(), multi_sta());
        h.driver.settings.set_wifi_enabled(true);
        h.start();
        let primary = h.primary();

        let answers = h.request(RoleRequest::new(SecondaryRole::LocalOnly, app(10040)));
        h.settle();

        assert_eq!(single_answer(&answers).map(|i| i.id), Some(primary.id));
        assert!(!h.controller.is_sta_sta_concurrency_supported_for_local_only());
    }

    #[test]
    fn test_car_mode_app_shares_primary() {
        let h = Harness::started_with_wifi(multi_sta());
        h.driver.hooks.grant_car_mode_priority(10050);

        let shared = h.request(RoleRequest::new(SecondaryRole::LocalOnly, app(10050)));
        let own = h.request(
            RoleRequest::new(SecondaryRole::LocalOnly, app(10050)).prefer_secondary(true),
        );
        h.settle();

        assert_eq!(single_answer(&shared).map(|i| i.id), Some(h.primary().id));
        assert_eq!(
            single_answer(&own).and_then(|i| i.role),
            Some(Role::ClientLocalOnly)
        );
    }

    #[test]
    fn test_modern_local_only_request_is_rejected_when_chip_is_busy() {
        let h = Harness::started_with_wifi(multi_sta());
        h.driver.oracle.set_can_create_sta(false);
        let modern = h.request(RoleRequest::new(SecondaryRole::LocalOnly, app(10060)));
        h.driver.hooks.mark_legacy(10061);
        let legacy = h.request(RoleRequest::new(SecondaryRole::LocalOnly, app(10061)));
        h.settle();

        assert!(single_answer(&modern).is_none());
        assert_eq!(single_answer(&legacy).map(|i| i.id), Some(h.primary().id));
    }

    #[test]
    fn test_dpp_session_keeps_transient_on_primary() {
        let h = Harness::started_with_wifi(multi_sta());
        h.driver.hooks.set_dpp_in_progress(true);

        let answers = h.request(RoleRequest::new(SecondaryRole::SecondaryTransient, app(10070)));
        h.settle();

        assert_eq!(single_answer(&answers).map(|i| i.id), Some(h.primary().id));
        assert_eq!(h.count_created(Role::ClientSecondaryTransient), 0);
    }

    #[test]
    fn test_request_while_disabled_is_rejected() {
        let h = Harness::new(multi_sta());
        h.start();
        let answers = h.request(RoleRequest::new(SecondaryRole::SecondaryLongLived, app(10080)));
        h.settle();
        assert!(single_answer(&answers).is_none());
    }

    #[test]
    fn test_pending_request_answered_none_on_start_failure() {
        let h = Harness::started_with_wifi(multi_sta());
        h.driver.factory.fail_next_client_starts(1);

        let answers = h.request(RoleRequest::new(SecondaryRole::SecondaryLongLived, app(10090)));
        h.settle();

        assert!(single_answer(&answers).is_none());
        assert!(h.controller.secondary_request_worksources().is_empty());
        assert_eq!(h.state(), ControllerState::Enabled);
        h.assert_invariants();
    }

    #[test]
    fn test_remove_secondary_but_not_primary() {
        let h = Harness::started_with_wifi(multi_sta());
        let answers = h.request(RoleRequest::new(SecondaryRole::SecondaryLongLived, app(10100)));
        h.settle();
        let secondary = single_answer(&answers).expect("granted");
        assert_eq!(h.controller.secondary_request_worksources().len(), 1);

        h.controller.remove_client_mode_manager(&h.primary());
        h.controller.remove_client_mode_manager(&secondary);
        h.settle();

        let remaining = h.controller.client_mode_managers();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].role, Some(Role::ClientPrimary));
        assert!(h.controller.secondary_request_worksources().is_empty());
    }

    #[test]
    fn test_stop_all_in_role() {
        let h = Harness::started_with_wifi(multi_sta());
        h.request(RoleRequest::new(SecondaryRole::SecondaryTransient, app(10110)));
        h.settle();
        assert!(h
            .controller
            .client_mode_manager_in_role(Role::ClientSecondaryTransient)
            .is_some());

        h.controller
            .stop_all_client_mode_managers_in_role(Role::ClientSecondaryTransient);
        h.settle();

        assert!(h
            .controller
            .client_mode_manager_in_role(Role::ClientSecondaryTransient)
            .is_none());
        assert!(h.controller.has_primary_client_mode_manager());
    }

    #[test]
    fn test_toggle_off_with_scan_only_stops_secondaries() {
        let h = Harness::new(multi_sta());
        h.driver.settings.set_wifi_enabled(true);
        h.driver.settings.set_scan_only_available(true);
        h.start();
        h.request(RoleRequest::new(SecondaryRole::SecondaryLongLived, app(10120)));
        h.settle();
        assert_eq!(h.controller.client_mode_managers().len(), 2);

        h.set_wifi(false);

        let clients = h.controller.client_mode_managers();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].role, Some(Role::ClientScanOnly));
        assert_eq!(h.driver.hooks.connectivity_resets(), 1);
    }

    #[test]
    fn test_capability_queries() {
        let h = Harness::new(multi_sta());
        h.start();
        assert!(h.controller.is_sta_sta_concurrency_supported_for_mbb());
        assert!(h.controller.is_sta_sta_concurrency_supported_for_restricted());
        assert!(h.controller.is_sta_sta_concurrency_supported_for_multi_internet());
        assert!(h.controller.can_request_more_client_mode_managers_in_role(
            &app(1),
            SecondaryRole::SecondaryTransient,
            false
        ));
        assert!(h.controller.can_request_more_soft_ap_managers(&app(1)));
        h.driver.oracle.set_can_create_ap(false);
        assert!(!h.controller.can_request_more_soft_ap_managers(&app(1)));
    }
}

// =============================================================================
// Soft AP
// =============================================================================

mod soft_ap {
    use super::*;

    #[test]
    fn test_soft_ap_from_disabled() {
        let h = Harness::new(ControllerConfig::default());
        h.start();
        h.controller
            .start_soft_ap(SoftApModeConfig::new(SoftApMode::LocalOnly), app(10200));
        h.settle();

        let ap = h
            .controller
            .local_only_soft_ap_manager()
            .expect("local-only soft AP");
        assert_eq!(ap.role, Some(Role::SoftApLocalOnly));
        assert_eq!(h.state(), ControllerState::Enabled);
        assert!(h.controller.tethered_soft_ap_manager().is_none());

        h.controller.stop_soft_ap(Some(SoftApMode::LocalOnly));
        h.settle();
        assert_eq!(h.state(), ControllerState::Disabled);
        assert_eq!(h.controller.graveyard(ManagerKind::SoftAp).len(), 1);
    }

    #[test]
    fn test_duplicate_mode_is_refused() {
        let h = Harness::started_with_wifi(ControllerConfig::default());
        let config = SoftApModeConfig::new(SoftApMode::Tethered);
        h.controller.start_soft_ap(config.clone(), app(10210));
        h.controller.start_soft_ap(config.clone(), app(10211));
        h.settle();

        assert_eq!(h.controller.soft_ap_managers().len(), 1);
        assert_eq!(h.driver.hooks.refused_soft_aps(), vec![config]);
    }

    #[test]
    fn test_soft_ap_stop_restarts_client_when_enabled() {
        let h = Harness::new(ControllerConfig::default());
        h.start();
        h.controller
            .start_soft_ap(SoftApModeConfig::new(SoftApMode::Tethered), app(10220));
        h.settle();

        // Wi-Fi gets turned on by settings while only the AP is up.
        h.driver.settings.set_wifi_enabled(true);
        h.controller.stop_soft_ap(None);
        h.settle();

        assert!(h.controller.has_primary_client_mode_manager());
        assert_eq!(h.state(), ControllerState::Enabled);
        h.assert_invariants();
    }

    #[test]
    fn test_capability_update_reaches_matching_mode() {
        let h = Harness::started_with_wifi(ControllerConfig::default());
        h.controller
            .start_soft_ap(SoftApModeConfig::new(SoftApMode::Tethered), app(10230));
        h.settle();
        h.driver.factory.clear_calls();

        let capability = modewarden_roles::SoftApCapability {
            max_clients: 8,
            features: 0,
        };
        h.controller
            .update_soft_ap_capability(capability.clone(), SoftApMode::LocalOnly);
        h.controller
            .update_soft_ap_capability(capability, SoftApMode::Tethered);
        h.controller
            .update_soft_ap_configuration(modewarden_roles::SoftApConfiguration {
                ssid: Some("hotspot".to_string()),
                ..Default::default()
            });
        h.settle();

        let calls = h.driver.factory.calls();
        assert_eq!(calls.len(), 2, "{calls:?}");
        assert!(calls[0].starts_with("update_capability") && calls[0].ends_with("max_clients=8"));
        assert!(calls[1].ends_with("ssid=hotspot"));
        let ap = h.controller.tethered_soft_ap_manager().expect("tethered");
        assert_eq!(
            ap.soft_ap.and_then(|c| c.configuration).and_then(|c| c.ssid),
            Some("hotspot".to_string())
        );
    }
}

// =============================================================================
// Airplane and satellite
// =============================================================================

mod radio_modes {
    use super::*;

    #[test]
    fn test_airplane_on_disables_and_off_restores() {
        let h = Harness::started_with_wifi(ControllerConfig::default());
        h.driver.settings.set_airplane_mode(true);
        h.controller.airplane_mode_toggled();
        h.settle();
        assert_eq!(h.state(), ControllerState::Disabled);

        h.driver.settings.set_airplane_mode(false);
        h.controller.airplane_mode_toggled();
        h.settle();
        assert!(h.controller.has_primary_client_mode_manager());
        h.assert_invariants();
    }

    #[test]
    fn test_airplane_on_keeps_wifi_when_configured() {
        let h = Harness::started_with_wifi(ControllerConfig::default());
        h.driver
            .settings
            .remain_enabled_in_airplane
            .store(true, std::sync::atomic::Ordering::SeqCst);
        h.driver.settings.set_airplane_mode(true);
        h.controller.airplane_mode_toggled();
        h.settle();
        assert!(h.controller.has_primary_client_mode_manager());
    }

    #[test]
    fn test_airplane_off_while_disabling_is_deferred() {
        let h = Harness::started_with_wifi(ControllerConfig::default());
        let old = h.primary();
        h.driver.factory.set_auto_complete(false);

        h.driver.settings.set_airplane_mode(true);
        h.controller.airplane_mode_toggled();
        h.settle();
        assert_eq!(h.controller.wifi_state(), WifiState::Disabling);

        h.driver.settings.set_airplane_mode(false);
        h.controller.airplane_mode_toggled();
        h.settle();
        assert_eq!(h.count_created(Role::ClientPrimary), 1, "deferred, nothing new yet");

        h.driver.factory.report(old.id, ManagerEvent::Stopped);
        h.settle();
        assert_eq!(h.count_created(Role::ClientPrimary), 2);
        assert_eq!(h.state(), ControllerState::Enabled);

        let replacement = h
            .controller
            .client_mode_managers()
            .into_iter()
            .find(|c| c.id != old.id)
            .expect("replacement");
        h.driver
            .factory
            .report(replacement.id, ManagerEvent::Started);
        h.settle();
        assert_eq!(h.primary().id, replacement.id);
        h.assert_invariants();
    }

    #[test]
    fn test_satellite_mode_blocks_wifi() {
        let h = Harness::started_with_wifi(ControllerConfig::default());
        h.driver.settings.set_satellite_mode(true);
        h.controller.satellite_mode_changed();
        h.settle();
        assert_eq!(h.state(), ControllerState::Disabled);

        h.controller.wifi_toggled(WorkSource::settings());
        h.controller.airplane_mode_toggled();
        h.settle();
        assert_eq!(h.state(), ControllerState::Disabled);

        h.driver.settings.set_satellite_mode(false);
        h.controller.satellite_mode_changed();
        h.settle();
        assert!(h.controller.has_primary_client_mode_manager());
        h.assert_invariants();
    }
}

// =============================================================================
// Emergency
// =============================================================================

mod emergency {
    use super::*;

    fn ecm_config() -> ControllerConfig {
        ControllerConfig {
            disable_wifi_in_emergency: true,
            track_emergency_call_state: true,
            ..ControllerConfig::default()
        }
    }

    #[test]
    fn test_emergency_call_shuts_down_and_restores() {
        let h = Harness::started_with_wifi(ecm_config());

        h.controller.emergency_call_state_changed(true);
        h.settle();
        assert!(h.controller.is_in_emergency_mode());
        assert!(h.controller.client_mode_managers().is_empty());
        assert_eq!(h.state(), ControllerState::Disabled);

        // Toggles are dropped while in emergency.
        h.controller.wifi_toggled(WorkSource::settings());
        h.settle();
        assert_eq!(h.state(), ControllerState::Disabled);

        h.controller.emergency_call_state_changed(false);
        h.settle();
        assert!(!h.controller.is_in_emergency_mode());
        assert_eq!(h.primary().role, Some(Role::ClientPrimary));
        assert_eq!(h.state(), ControllerState::Enabled);
        h.assert_invariants();
    }

    #[test]
    fn test_call_state_ignored_without_tracking() {
        let config = ControllerConfig {
            track_emergency_call_state: false,
            ..ecm_config()
        };
        let h = Harness::started_with_wifi(config);
        h.controller.emergency_call_state_changed(true);
        h.settle();
        assert!(!h.controller.is_in_emergency_mode());
        assert!(h.controller.has_primary_client_mode_manager());
    }

    #[test]
    fn test_callback_mode_without_disable_keeps_clients() {
        let config = ControllerConfig {
            disable_wifi_in_emergency: false,
            ..ecm_config()
        };
        let h = Harness::started_with_wifi(config);
        h.controller
            .start_soft_ap(SoftApModeConfig::new(SoftApMode::Tethered), app(10300));
        h.settle();

        h.controller.emergency_callback_mode_changed(true);
        h.settle();

        assert!(h.controller.soft_ap_managers().is_empty());
        assert!(h.controller.has_primary_client_mode_manager());
    }

    #[test]
    fn test_requests_refused_in_emergency() {
        let config = ControllerConfig {
            disable_wifi_in_emergency: false,
            ..ecm_config().with_all_multi_sta()
        };
        let h = Harness::started_with_wifi(config);
        h.controller.emergency_callback_mode_changed(true);
        h.settle();

        let answers = h.request(RoleRequest::new(SecondaryRole::SecondaryTransient, app(10310)));
        let config = SoftApModeConfig::new(SoftApMode::LocalOnly);
        h.controller.start_soft_ap(config.clone(), app(10311));
        h.settle();

        assert!(single_answer(&answers).is_none());
        assert_eq!(h.driver.hooks.refused_soft_aps(), vec![config]);
    }

    #[test]
    fn test_emergency_scan_runs_scan_only() {
        let h = Harness::started_with_wifi(ecm_config());
        h.controller.emergency_callback_mode_changed(true);
        h.settle();
        assert_eq!(h.state(), ControllerState::Disabled);

        h.controller
            .set_emergency_scan_in_progress(true, WorkSource::internal());
        h.settle();
        assert!(h.controller.scan_only_client_mode_manager().is_some());
        assert_eq!(h.state(), ControllerState::Enabled);

        h.controller
            .set_emergency_scan_in_progress(false, WorkSource::internal());
        h.settle();
        assert!(h.controller.client_mode_managers().is_empty());
        assert_eq!(h.state(), ControllerState::Disabled);
    }

    #[test]
    fn test_emergency_scan_during_call_demotes_primary() {
        let h = Harness::started_with_wifi(ecm_config());
        let primary = h.primary();
        h.controller
            .set_emergency_scan_in_progress(true, WorkSource::internal());
        h.settle();

        h.controller.emergency_call_state_changed(true);
        h.settle();

        let scan_only = h
            .controller
            .scan_only_client_mode_manager()
            .expect("scan-only");
        assert_eq!(scan_only.id, primary.id);
    }
}

// =============================================================================
// Recovery
// =============================================================================

mod recovery {
    use super::*;

    #[test]
    fn test_restart_recreates_primary_and_tethered_ap() {
        let config = ControllerConfig {
            recovery_delay_ms: 10_000,
            ..ControllerConfig::default()
        };
        let h = Harness::started_with_wifi(config);
        h.controller
            .start_soft_ap(SoftApModeConfig::new(SoftApMode::Tethered), app(10400));
        h.settle();
        h.recorder.clear();

        h.controller
            .recovery_restart_wifi(RecoveryReason::ApiCall, true);
        h.settle();

        assert!(h.controller.client_mode_managers().is_empty());
        assert!(h.controller.soft_ap_managers().is_empty());
        assert_eq!(h.state(), ControllerState::Disabled);

        // The continue fires after the capped delay, not before.
        h.controller
            .runner()
            .advance(Duration::from_millis(3_999));
        assert!(h.controller.primary_client_mode_manager().is_none());
        h.controller.runner().advance(Duration::from_millis(1));
        h.settle();

        assert!(h.controller.has_primary_client_mode_manager());
        assert!(h.controller.tethered_soft_ap_manager().is_some());
        assert_eq!(h.state(), ControllerState::Enabled);

        let events = h.recorder.events();
        let restarting: Vec<_> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, ModeEvent::SubsystemRestarting))
            .map(|(i, _)| i)
            .collect();
        let restarted: Vec<_> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, ModeEvent::SubsystemRestarted))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(restarting.len(), 1);
        assert_eq!(restarted.len(), 1);
        assert!(restarting[0] < restarted[0]);

        let reports = h.driver.hooks.bug_reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, "Wi-Fi BugReport: api call");
        assert_eq!(h.driver.hooks.recoveries_completed(), 1);
        h.assert_invariants();
    }

    #[test]
    fn test_battery_accounting_follows_restart() {
        let h = Harness::started_with_wifi(ControllerConfig::default());
        h.controller
            .start_soft_ap(SoftApModeConfig::new(SoftApMode::Tethered), app(10401));
        h.settle();
        assert_eq!(h.driver.hooks.wifi_on_reports(), 1);

        h.controller
            .recovery_restart_wifi(RecoveryReason::ApiCall, false);
        h.settle();
        assert_eq!(h.driver.hooks.wifi_off_reports(), 1);

        h.controller.runner().advance(Duration::from_secs(5));
        h.settle();

        assert!(h.controller.has_primary_client_mode_manager());
        assert!(h.controller.tethered_soft_ap_manager().is_some());
        assert_eq!(h.driver.hooks.wifi_on_reports(), 2);
        assert_eq!(h.driver.hooks.wifi_off_reports(), 1);
    }

    #[test]
    fn test_restart_while_disabled_starts_from_settings() {
        let h = Harness::new(ControllerConfig::default());
        h.start();
        h.driver.settings.set_wifi_enabled(true);

        h.controller
            .recovery_restart_wifi(RecoveryReason::LastResortWatchdog, false);
        h.settle();
        assert_eq!(h.state(), ControllerState::Disabled);

        h.controller.runner().advance(Duration::from_millis(2_000));
        h.settle();
        assert!(h.controller.has_primary_client_mode_manager());
        assert!(h.driver.hooks.bug_reports().is_empty());
    }

    #[test]
    fn test_recovery_disable_shuts_down() {
        let h = Harness::started_with_wifi(ControllerConfig::default());
        h.controller.recovery_disable_wifi();
        h.settle();
        assert_eq!(h.state(), ControllerState::Disabled);
        h.assert_invariants();
    }

    #[test]
    fn test_native_failure_triggers_recovery_unless_shutting_down() {
        let h = Harness::new(ControllerConfig::default());
        h.controller.on_native_status_changed(true);
        h.controller.on_native_status_changed(false);
        assert_eq!(
            h.driver.hooks.recovery_triggers(),
            vec![RecoveryReason::NativeFailure]
        );

        h.controller.notify_shutting_down();
        h.controller.on_native_status_changed(false);
        assert_eq!(h.driver.hooks.recovery_triggers().len(), 1);
    }
}

// =============================================================================
// Snapshot, bus and diagnostics
// =============================================================================

mod snapshot {
    use super::*;

    #[test]
    fn test_feature_set_and_bands_published() {
        let h = Harness::started_with_wifi(ControllerConfig::default());
        let features = h.controller.supported_feature_set();
        assert!(features.contains(FeatureSet::INFRA | FeatureSet::AP_STA));
        assert!(h.controller.is_band_supported_for_sta(band::BAND_5_GHZ));
        assert!(!h.controller.is_band_supported_for_sta(band::BAND_6_GHZ));
        assert_eq!(
            h.driver
                .settings
                .sta_bands
                .load(std::sync::atomic::Ordering::SeqCst),
            band::DEFAULT
        );
    }

    #[test]
    fn test_cached_bands_used_when_driver_unknown() {
        let h = Harness::new(ControllerConfig::default());
        h.driver.oracle.set_bands(0);
        h.driver
            .settings
            .sta_bands
            .store(band::BAND_24_GHZ | band::BAND_6_GHZ, std::sync::atomic::Ordering::SeqCst);
        h.start();
        h.set_wifi(true);
        assert!(h.controller.is_band_supported_for_sta(band::BAND_6_GHZ));
    }

    #[test]
    fn test_current_network_follows_primary() {
        let h = Harness::new(ControllerConfig::default());
        h.start();
        h.driver.factory.set_auto_complete(false);
        h.set_wifi(true);
        let pending = h.controller.client_mode_managers()[0].clone();
        assert_eq!(pending.target_role, Some(Role::ClientPrimary));
        assert_eq!(h.controller.wifi_state(), WifiState::Enabling);
        h.driver.factory.set_link(
            pending.id,
            Some(LinkTarget::new("home", Some("00:11:22:33:44:55"))),
            &[],
        );
        h.driver
            .factory
            .set_network(pending.id, Some(modewarden_roles::Network { net_id: 7 }));
        h.driver.factory.report(pending.id, ManagerEvent::Started);
        h.settle();

        assert_eq!(h.controller.current_network().map(|n| n.net_id), Some(7));
        assert_eq!(h.controller.connection_info().ssid.as_deref(), Some("home"));
    }

    #[test]
    fn test_events_mirrored_to_bus() {
        let driver = SimDriver::new();
        driver.settings.set_wifi_enabled(true);
        let bus = Arc::new(InMemoryEventBus::new());
        let runner = SerialRunner::manual(RunnerConfig::named("modewarden-bus"));
        let controller = ModeController::with_bus(
            driver.dependencies(),
            ControllerConfig::default(),
            runner,
            bus.clone(),
        );
        controller.start();
        controller.runner().dispatch_all();

        assert_eq!(bus.topics(), vec!["mode:added", "mode:primary_changed"]);
    }

    #[test]
    fn test_dump_lists_state_managers_and_messages() {
        let h = Harness::started_with_wifi(ControllerConfig::default());
        h.set_wifi(false);
        h.set_wifi(true);
        let dump = h.controller.dump();
        assert!(dump.contains("state: enabled"), "{dump}");
        assert!(dump.contains("graveyard client (1):"), "{dump}");
        assert!(dump.contains("wifi_toggled"), "{dump}");
        assert!(dump.contains("manager_lifecycle"), "{dump}");
    }
}

// =============================================================================
// Threaded runner
// =============================================================================

mod threaded {
    use super::*;

    fn wait_for(mut f: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if f() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_blocking_query_returns_default_when_runner_is_wedged() {
        let driver = SimDriver::new();
        let controller =
            ModeController::spawn(driver.dependencies(), ControllerConfig::default()).unwrap();
        controller.start();

        let (release, wedge) = crossbeam_channel::bounded::<()>(1);
        controller.runner().post(move || {
            let _ = wedge.recv_timeout(Duration::from_secs(10));
        });

        let begin = Instant::now();
        let state = controller.current_state();
        let elapsed = begin.elapsed();

        assert_eq!(state, None);
        assert!(elapsed >= Duration::from_millis(4_000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(6_000), "{elapsed:?}");
        release.send(()).unwrap();
        assert!(wait_for(|| controller.current_state().is_some()));
    }

    #[tokio::test]
    async fn test_async_request_on_threaded_runner() {
        let driver = SimDriver::with_oracle(SimOracle::dual_sta());
        driver.settings.set_wifi_enabled(true);
        let controller = ModeController::spawn(
            driver.dependencies(),
            ControllerConfig::default().with_all_multi_sta(),
        )
        .unwrap();
        controller.start();
        assert!(wait_for(|| controller.has_primary_client_mode_manager()));

        let info = controller
            .request_client_mode_manager_async(RoleRequest::new(
                SecondaryRole::SecondaryLongLived,
                app(10500),
            ))
            .await
            .expect("granted");

        assert_eq!(info.role, Some(Role::ClientSecondaryLongLived));
        assert_eq!(controller.client_mode_managers().len(), 2);
    }
}
