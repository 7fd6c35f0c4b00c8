//! Drive a controller against the simulated driver and print its state.
//!
//! Run with: cargo run -p modewarden-controller --example simulate
//!
//! Set RUST_LOG=modewarden=trace for every transition.

use std::sync::mpsc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use modewarden_controller::sim::{SimDriver, SimOracle};
use modewarden_controller::{ControllerConfig, ModeController, RecoveryReason, RoleRequest};
use modewarden_roles::{Requestor, SecondaryRole, SoftApMode, SoftApModeConfig, WorkSource};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,modewarden=debug")),
        )
        .init();

    let driver = SimDriver::with_oracle(SimOracle::dual_sta());
    let config = ControllerConfig::default().with_all_multi_sta();
    let controller = ModeController::spawn(driver.dependencies(), config)
        .context("failed to spawn controller")?;
    controller.start();

    tracing::info!("turning wifi on");
    driver.settings.set_wifi_enabled(true);
    controller.wifi_toggled(WorkSource::settings());
    wait_until("primary", || controller.has_primary_client_mode_manager())?;

    tracing::info!("requesting a local-only station");
    let requestor = WorkSource::of(Requestor::new(10_123, "com.example.iot"));
    let (tx, rx) = mpsc::channel();
    controller.request_client_mode_manager(
        RoleRequest::new(SecondaryRole::LocalOnly, requestor).with_target("iot-device", None),
        move |info| {
            let _ = tx.send(info);
        },
    );
    match rx.recv_timeout(Duration::from_secs(2))? {
        Some(info) => tracing::info!(manager = %info, "local-only station granted"),
        None => tracing::warn!("local-only station refused"),
    }

    tracing::info!("starting a tethered hotspot");
    controller.start_soft_ap(
        SoftApModeConfig::new(SoftApMode::Tethered),
        WorkSource::settings(),
    );
    wait_until("hotspot", || controller.tethered_soft_ap_manager().is_some())?;

    tracing::info!("forcing a recovery restart");
    controller.recovery_restart_wifi(RecoveryReason::ApiCall, false);
    wait_until("recovery", || {
        controller.has_primary_client_mode_manager()
            && controller.tethered_soft_ap_manager().is_some()
    })?;

    println!("{}", controller.dump());
    println!("driver calls:");
    for call in driver.factory.calls() {
        println!("  {call}");
    }

    controller.shutdown();
    Ok(())
}

fn wait_until(what: &str, mut done: impl FnMut() -> bool) -> Result<()> {
    for _ in 0..200 {
        if done() {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    bail!("timed out waiting for {what}")
}
