//! Offboard/arm handshake.
//!
//! PX4 only accepts OFFBOARD while setpoints are already streaming (2 Hz
//! minimum), so every tick that does not finish the sequence also publishes
//! the hold setpoint. Rejected requests are retried on the next tick with no
//! backoff and no attempt limit; only shutdown or a withdrawn takeoff request
//! ends an unfinished sequence.

use offb_proto::{ControlCommand, VehicleState};
use tracing::{debug, info, warn};

use crate::fc::{FlightController, FlightMode};
use crate::geometry::quaternion_from_euler;
use crate::params::ParamConfig;
use crate::rate::TickRate;
use crate::Shared;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmState {
    RequestingOffboard,
    RequestingArm,
    Armed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    Armed { ticks: u32 },
    Aborted,
}

#[derive(Debug)]
pub struct ArmingSequencer {
    state: ArmState,
    ticks: u32,
    offboard_logged: bool,
    arm_logged: bool,
}

impl Default for ArmingSequencer {
    fn default() -> Self {
        Self::new()
    }
}

/// Pose setpoint streamed while the handshake is in progress.
pub fn hold_setpoint(cfg: &ParamConfig) -> ControlCommand {
    ControlCommand::Pose {
        position: cfg.setpoints.position,
        orientation: quaternion_from_euler(0.0, 0.0, 0.0),
    }
}

impl ArmingSequencer {
    pub fn new() -> Self {
        Self {
            state: ArmState::RequestingOffboard,
            ticks: 0,
            offboard_logged: false,
            arm_logged: false,
        }
    }

    pub fn state(&self) -> ArmState {
        self.state
    }

    /// Advance by one tick against the latest reported vehicle state.
    ///
    /// `Armed` is only ever entered from a reported `armed == true`; an
    /// accepted arm request alone is not enough.
    pub fn step<F: FlightController + ?Sized>(
        &mut self,
        fc: &mut F,
        vehicle: &VehicleState,
        hold: &ControlCommand,
    ) -> ArmState {
        if self.state == ArmState::Armed {
            return self.state;
        }
        self.ticks += 1;

        if !FlightMode::Offboard.is_reported_by(&vehicle.mode) {
            self.state = ArmState::RequestingOffboard;
            if fc.request_mode(FlightMode::Offboard) {
                if !self.offboard_logged {
                    info!("OFFBOARD enabled");
                    self.offboard_logged = true;
                }
            } else {
                debug!("offboard request rejected, retrying");
            }
        } else if vehicle.armed {
            self.state = ArmState::Armed;
            return self.state;
        } else {
            self.state = ArmState::RequestingArm;
            if fc.request_arm() {
                if !self.arm_logged {
                    info!("Vehicle armed");
                    self.arm_logged = true;
                }
            } else {
                debug!("arm request rejected, retrying");
            }
        }

        if let Err(e) = fc.publish(hold) {
            warn!("hold setpoint publish failed: {:#}", e);
        }
        self.state
    }

    /// Run the handshake at loop rate until armed, shutdown, or the takeoff
    /// request is withdrawn.
    pub fn run<F: FlightController + ?Sized>(
        &mut self,
        fc: &mut F,
        shared: &Shared,
        rate: &mut TickRate,
    ) -> ArmOutcome {
        loop {
            if shared.shutdown.is_requested() {
                warn!("arming aborted by shutdown in state {:?}", self.state);
                return ArmOutcome::Aborted;
            }
            let cfg = shared.params.snapshot();
            if !cfg.takeoff_requested {
                warn!("arming aborted: takeoff withdrawn in state {:?}", self.state);
                return ArmOutcome::Aborted;
            }

            let vehicle = shared.telemetry.vehicle_state();
            if self.step(fc, &vehicle, &hold_setpoint(&cfg)) == ArmState::Armed {
                return ArmOutcome::Armed { ticks: self.ticks };
            }
            rate.sleep();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ConfigDelta;
    use crate::sim::{SimEvent, SimFc};
    use crate::telemetry::TelemetryCache;
    use std::sync::Arc;

    fn vehicle(armed: bool, mode: &str) -> VehicleState {
        VehicleState { armed, mode: mode.into() }
    }

    fn hold() -> ControlCommand {
        hold_setpoint(&ParamConfig::default())
    }

    #[test]
    fn requests_offboard_first_and_streams() {
        let telemetry = Arc::new(TelemetryCache::new());
        let mut fc = SimFc::new(telemetry).reject_first_mode_requests(u32::MAX);
        let log = fc.log();
        let mut seq = ArmingSequencer::new();

        let st = seq.step(&mut fc, &vehicle(false, "POSCTL"), &hold());
        assert_eq!(st, ArmState::RequestingOffboard);
        assert_eq!(
            log.events(),
            vec![
                SimEvent::ModeRequest { mode: FlightMode::Offboard, accepted: false },
                SimEvent::Published(hold()),
            ]
        );
    }

    #[test]
    fn never_armed_while_disarmed() {
        let telemetry = Arc::new(TelemetryCache::new());
        let mut fc = SimFc::new(telemetry);
        let mut seq = ArmingSequencer::new();

        for _ in 0..20 {
            let st = seq.step(&mut fc, &vehicle(false, "OFFBOARD"), &hold());
            assert_eq!(st, ArmState::RequestingArm);
        }
        for _ in 0..5 {
            let st = seq.step(&mut fc, &vehicle(false, "MANUAL"), &hold());
            assert_eq!(st, ArmState::RequestingOffboard);
        }
    }

    #[test]
    fn armed_once_reported() {
        let telemetry = Arc::new(TelemetryCache::new());
        let mut fc = SimFc::new(telemetry);
        let log = fc.log();
        let mut seq = ArmingSequencer::new();

        assert_eq!(seq.step(&mut fc, &vehicle(true, "OFFBOARD"), &hold()), ArmState::Armed);
        assert!(log.events().is_empty());
    }

    #[test]
    fn run_reaches_armed_after_rejections() {
        let shared = Shared::new();
        shared.params.apply(&ConfigDelta { takeoff: Some(true), position_z: Some(1.0), ..Default::default() });
        let mut fc = SimFc::new(shared.telemetry.clone())
            .reject_first_mode_requests(3)
            .reject_first_arm_requests(2);
        let log = fc.log();

        let out = ArmingSequencer::new().run(&mut fc, &shared, &mut TickRate::new(1000.0));

        // 4 mode requests, 3 arm requests, one tick to observe armed
        assert_eq!(out, ArmOutcome::Armed { ticks: 8 });
        assert_eq!(log.mode_requests(FlightMode::Offboard), 4);
        assert_eq!(log.arm_requests(), 3);
        assert_eq!(log.published().len(), 7);
        assert!(shared.telemetry.vehicle_state().armed);
    }

    #[test]
    fn run_aborts_on_shutdown() {
        let shared = Shared::new();
        shared.params.apply(&ConfigDelta { takeoff: Some(true), ..Default::default() });
        shared.shutdown.request();
        let mut fc = SimFc::new(shared.telemetry.clone());

        let out = ArmingSequencer::new().run(&mut fc, &shared, &mut TickRate::new(1000.0));
        assert_eq!(out, ArmOutcome::Aborted);
        assert!(fc.log().events().is_empty());
    }

    #[test]
    fn run_aborts_when_takeoff_withdrawn() {
        let shared = Shared::new();
        let mut fc = SimFc::new(shared.telemetry.clone());
        let out = ArmingSequencer::new().run(&mut fc, &shared, &mut TickRate::new(1000.0));
        assert_eq!(out, ArmOutcome::Aborted);
    }
}
