//! Fixed-rate mode dispatcher.
//!
//! Each tick reads one snapshot of the parameters, then either runs the
//! arming handshake, streams the setpoint of the active mode, or lands. An
//! envelope violation in any streaming mode lands the vehicle and ends the
//! session for good.

use offb_proto::ControlCommand;
use tracing::{debug, info, warn};

use crate::arming::{ArmOutcome, ArmingSequencer};
use crate::fc::FlightController;
use crate::geometry::quaternion_from_euler;
use crate::landing::{land, LandOutcome};
use crate::params::{ConfigDelta, ModeSelector, ParamConfig, SetpointBank};
use crate::rate::TickRate;
use crate::safety::in_envelope;
use crate::Shared;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Operator set QUIT.
    Quit,
    /// Left the envelope; the vehicle was put into AUTO.LAND.
    EnvelopeViolation,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Exit(ExitReason),
}

/// Setpoint for a streaming mode, `None` for modes that publish nothing.
pub fn setpoint_for(mode: ModeSelector, bank: &SetpointBank) -> Option<ControlCommand> {
    match mode {
        ModeSelector::PoseSetpoint => Some(ControlCommand::Pose {
            position: bank.position,
            orientation: quaternion_from_euler(0.0, 0.0, 0.0),
        }),
        ModeSelector::AttitudeSetpoint => {
            let att = &bank.attitude;
            Some(ControlCommand::Attitude {
                orientation: quaternion_from_euler(att.roll, att.pitch, 0.0),
                thrust: att.thrust,
                body_yaw_rate: att.yaw_rate,
            })
        }
        ModeSelector::VelocitySetpoint => {
            let v = &bank.velocity;
            Some(ControlCommand::Velocity { vx: v.vx, vy: v.vy, vz: v.vz })
        }
        // Hold relies on the autopilot keeping the last accepted setpoint.
        ModeSelector::PositionHold | ModeSelector::ForceLand => None,
    }
}

/// Seed the session: hold where the tracker currently sees the vehicle and
/// reset the control flags.
pub fn prime_session(shared: &Shared) -> ParamConfig {
    let p = shared.telemetry.pose().position;
    info!("hold position seeded at ({:.3}, {:.3}, {:.3})", p.x, p.y, p.z);
    shared.params.apply(&ConfigDelta {
        position_x: Some(p.x),
        position_y: Some(p.y),
        position_z: Some(p.z),
        mode: Some(ModeSelector::PositionHold),
        quit: Some(false),
        takeoff: Some(false),
        ..Default::default()
    })
}

pub struct Supervisor<F> {
    fc: F,
    shared: Shared,
    rate: TickRate,
    // AUTO.LAND already confirmed during the current ForceLand stretch
    force_land_confirmed: bool,
}

impl<F: FlightController> Supervisor<F> {
    pub fn new(fc: F, shared: Shared, rate_hz: f64) -> Self {
        Self { fc, shared, rate: TickRate::new(rate_hz), force_land_confirmed: false }
    }

    pub fn flight_controller(&self) -> &F {
        &self.fc
    }

    /// Run until quit, envelope violation, or shutdown.
    pub fn run(mut self) -> ExitReason {
        info!("supervisor: running at {:?} per tick", self.rate.period());
        loop {
            match self.tick() {
                Tick::Continue => self.rate.sleep(),
                Tick::Exit(reason) => {
                    info!("supervisor: exit {:?}", reason);
                    return reason;
                }
            }
        }
    }

    /// One control-loop iteration, without the trailing sleep.
    pub fn tick(&mut self) -> Tick {
        if self.shared.shutdown.is_requested() {
            return Tick::Exit(ExitReason::Shutdown);
        }

        let cfg = self.shared.params.snapshot();
        if cfg.quit_requested {
            return Tick::Exit(ExitReason::Quit);
        }

        if cfg.takeoff_requested {
            let outcome = ArmingSequencer::new().run(&mut self.fc, &self.shared, &mut self.rate);
            // one-shot: a single takeoff edge triggers a single pass
            self.shared.params.clear_takeoff();
            match outcome {
                ArmOutcome::Armed { ticks } => debug!("takeoff sequence done in {} ticks", ticks),
                ArmOutcome::Aborted => warn!("takeoff sequence did not complete"),
            }
            return Tick::Continue;
        }

        if cfg.mode != ModeSelector::ForceLand {
            self.force_land_confirmed = false;
        }

        match cfg.mode {
            ModeSelector::ForceLand => self.force_land(),
            mode => {
                let pose = self.shared.telemetry.pose();
                if !in_envelope(&pose, &cfg.bounds) {
                    let p = pose.position;
                    warn!(
                        "envelope violated in {:?} at ({:.3}, {:.3}, {:.3}), landing",
                        mode, p.x, p.y, p.z
                    );
                    return match land(&mut self.fc, &self.shared, &mut self.rate) {
                        LandOutcome::Landed { .. } => {
                            info!("LAND success");
                            Tick::Exit(ExitReason::EnvelopeViolation)
                        }
                        LandOutcome::Aborted => Tick::Exit(ExitReason::Shutdown),
                    };
                }
                if let Some(cmd) = setpoint_for(mode, &cfg.setpoints) {
                    self.publish(&cmd);
                }
                Tick::Continue
            }
        }
    }

    // Re-enterable: the loop keeps running in ForceLand after touchdown mode
    // is confirmed, so later ticks come back here and find AUTO.LAND already
    // active.
    fn force_land(&mut self) -> Tick {
        match land(&mut self.fc, &self.shared, &mut self.rate) {
            LandOutcome::Landed { requests } => {
                if !self.force_land_confirmed || requests > 0 {
                    info!("LAND success");
                }
                self.force_land_confirmed = true;
                Tick::Continue
            }
            LandOutcome::Aborted => Tick::Exit(ExitReason::Shutdown),
        }
    }

    fn publish(&mut self, cmd: &ControlCommand) {
        if let Err(e) = self.fc.publish(cmd) {
            warn!("{} setpoint publish failed: {:#}", cmd.label(), e);
        }
    }
}
