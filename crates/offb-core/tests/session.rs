use std::time::{Duration, Instant};

use offb_core::params::{ConfigDelta, ModeSelector};
use offb_core::sim::{SimEvent, SimFc};
use offb_core::supervisor::prime_session;
use offb_core::{ExitReason, FlightMode, Shared, Supervisor};
use offb_proto::{ControlCommand, Quaternion};

fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(2));
    }
}

fn bounds() -> ConfigDelta {
    ConfigDelta {
        safe_x_max: Some(2.0),
        safe_x_min: Some(-2.0),
        safe_y_max: Some(2.0),
        safe_y_min: Some(-2.0),
        safe_z_max: Some(3.0),
        ..Default::default()
    }
}

fn is_setpoint(ev: &SimEvent) -> bool {
    matches!(ev, SimEvent::Published(_))
}

#[test]
fn takeoff_stream_then_geofence_landing() {
    let shared = Shared::new();
    shared.params.apply(&bounds());
    shared.telemetry.update_pose([100.0, -100.0, 50.0], Quaternion::IDENTITY);
    shared.telemetry.update_vehicle_state(false, "POSCTL");
    prime_session(&shared);

    let fc = SimFc::new(shared.telemetry.clone())
        .reject_first_mode_requests(2)
        .reject_first_arm_requests(1);
    let log = fc.log();
    let handle = {
        let shared = shared.clone();
        std::thread::spawn(move || Supervisor::new(fc, shared, 500.0).run())
    };

    shared.params.apply(&ConfigDelta { takeoff: Some(true), ..Default::default() });
    wait_for("takeoff flag to clear", || {
        let st = shared.telemetry.vehicle_state();
        st.armed && !shared.params.takeoff_requested()
    });

    // the handshake streamed the seeded hold position the whole time
    let hold: Vec<_> = log.published();
    assert!(!hold.is_empty());
    for cmd in &hold {
        let ControlCommand::Pose { position, .. } = cmd else { panic!("unexpected {:?}", cmd) };
        assert!((position.x - 0.1).abs() < 1e-12 && (position.y + 0.1).abs() < 1e-12);
    }

    shared.params.apply(&ConfigDelta {
        velocity_z: Some(0.3),
        mode: Some(ModeSelector::VelocitySetpoint),
        ..Default::default()
    });
    wait_for("velocity setpoints", || {
        log.published().iter().any(|c| matches!(c, ControlCommand::Velocity { .. }))
    });

    // drift past the ceiling
    shared.telemetry.update_pose([0.0, 0.0, 3500.0], Quaternion::IDENTITY);
    let reason = handle.join().unwrap();
    assert_eq!(reason, ExitReason::EnvelopeViolation);

    let events = log.events();
    let first_land = events
        .iter()
        .position(|ev| matches!(ev, SimEvent::ModeRequest { mode: FlightMode::AutoLand, .. }))
        .expect("a land request");
    assert!(!events[first_land..].iter().any(is_setpoint), "setpoints after violation");
    assert_eq!(shared.telemetry.vehicle_state().mode, "AUTO.LAND");
}

#[test]
fn quit_stops_a_streaming_session() {
    let shared = Shared::new();
    shared.params.apply(&bounds());
    shared.telemetry.update_pose([0.0, 0.0, 500.0], Quaternion::IDENTITY);
    shared.params.apply(&ConfigDelta { mode: Some(ModeSelector::PoseSetpoint), ..Default::default() });

    let fc = SimFc::new(shared.telemetry.clone());
    let log = fc.log();
    let handle = {
        let shared = shared.clone();
        std::thread::spawn(move || Supervisor::new(fc, shared, 500.0).run())
    };

    wait_for("pose setpoints", || log.published().len() >= 5);
    shared.params.apply(&ConfigDelta { quit: Some(true), ..Default::default() });
    assert_eq!(handle.join().unwrap(), ExitReason::Quit);
    // quitting is not landing
    assert_eq!(log.mode_requests(FlightMode::AutoLand), 0);
}

#[test]
fn shutdown_breaks_a_stuck_handshake() {
    let shared = Shared::new();
    shared.params.apply(&bounds());
    shared.params.apply(&ConfigDelta { takeoff: Some(true), ..Default::default() });

    // an autopilot that never accepts offboard
    let fc = SimFc::new(shared.telemetry.clone()).reject_first_mode_requests(u32::MAX);
    let log = fc.log();
    let handle = {
        let shared = shared.clone();
        std::thread::spawn(move || Supervisor::new(fc, shared, 500.0).run())
    };

    wait_for("offboard retries", || log.mode_requests(FlightMode::Offboard) > 10);
    shared.shutdown.request();
    assert_eq!(handle.join().unwrap(), ExitReason::Shutdown);
    assert!(!shared.telemetry.vehicle_state().armed);
}
