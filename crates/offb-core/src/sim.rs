//! In-process stand-in for the autopilot, used for bench runs without
//! hardware and by the tests.
//!
//! Accepted requests are reflected into the [`TelemetryCache`] immediately,
//! the way a real link would report them on its next heartbeat.

use std::sync::{Arc, Mutex};

use offb_proto::ControlCommand;
use tracing::debug;

use crate::fc::{FlightController, FlightMode};
use crate::telemetry::{lock, TelemetryCache};

#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    ModeRequest { mode: FlightMode, accepted: bool },
    ArmRequest { accepted: bool },
    Published(ControlCommand),
}

/// Everything the simulated autopilot was asked to do, in order.
#[derive(Debug, Clone, Default)]
pub struct SimLog(Arc<Mutex<Vec<SimEvent>>>);

impl SimLog {
    fn push(&self, ev: SimEvent) {
        lock(&self.0).push(ev);
    }

    pub fn events(&self) -> Vec<SimEvent> {
        lock(&self.0).clone()
    }

    pub fn published(&self) -> Vec<ControlCommand> {
        lock(&self.0)
            .iter()
            .filter_map(|ev| match ev {
                SimEvent::Published(cmd) => Some(*cmd),
                _ => None,
            })
            .collect()
    }

    pub fn mode_requests(&self, mode: FlightMode) -> usize {
        lock(&self.0)
            .iter()
            .filter(|ev| matches!(ev, SimEvent::ModeRequest { mode: m, .. } if *m == mode))
            .count()
    }

    pub fn arm_requests(&self) -> usize {
        lock(&self.0).iter().filter(|ev| matches!(ev, SimEvent::ArmRequest { .. })).count()
    }

    pub fn clear(&self) {
        lock(&self.0).clear();
    }
}

pub struct SimFc {
    telemetry: Arc<TelemetryCache>,
    reject_modes: u32,
    reject_arms: u32,
    log: SimLog,
}

impl SimFc {
    pub fn new(telemetry: Arc<TelemetryCache>) -> Self {
        Self { telemetry, reject_modes: 0, reject_arms: 0, log: SimLog::default() }
    }

    /// Reject the first `n` mode-change requests, like a link that is still
    /// settling.
    pub fn reject_first_mode_requests(mut self, n: u32) -> Self {
        self.reject_modes = n;
        self
    }

    pub fn reject_first_arm_requests(mut self, n: u32) -> Self {
        self.reject_arms = n;
        self
    }

    pub fn log(&self) -> SimLog {
        self.log.clone()
    }
}

impl FlightController for SimFc {
    fn request_mode(&mut self, mode: FlightMode) -> bool {
        let accepted = self.reject_modes == 0;
        if accepted {
            let armed = self.telemetry.vehicle_state().armed;
            self.telemetry.update_vehicle_state(armed, mode.as_str());
        } else {
            self.reject_modes -= 1;
        }
        debug!("sim: mode {} -> accepted={}", mode, accepted);
        self.log.push(SimEvent::ModeRequest { mode, accepted });
        accepted
    }

    fn request_arm(&mut self) -> bool {
        let accepted = self.reject_arms == 0;
        if accepted {
            let mode = self.telemetry.vehicle_state().mode;
            self.telemetry.update_vehicle_state(true, mode);
        } else {
            self.reject_arms -= 1;
        }
        debug!("sim: arm -> accepted={}", accepted);
        self.log.push(SimEvent::ArmRequest { accepted });
        accepted
    }

    fn publish(&mut self, cmd: &ControlCommand) -> anyhow::Result<()> {
        self.log.push(SimEvent::Published(*cmd));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_requests_do_not_change_state() {
        let telemetry = Arc::new(TelemetryCache::new());
        let mut fc = SimFc::new(telemetry.clone()).reject_first_mode_requests(1);

        assert!(!fc.request_mode(FlightMode::Offboard));
        assert_eq!(telemetry.vehicle_state().mode, "");

        assert!(fc.request_mode(FlightMode::Offboard));
        assert_eq!(telemetry.vehicle_state().mode, "OFFBOARD");
        assert_eq!(fc.log().mode_requests(FlightMode::Offboard), 2);
    }

    #[test]
    fn arming_keeps_the_mode() {
        let telemetry = Arc::new(TelemetryCache::new());
        telemetry.update_vehicle_state(false, "OFFBOARD");
        let mut fc = SimFc::new(telemetry.clone());

        assert!(fc.request_arm());
        let st = telemetry.vehicle_state();
        assert!(st.armed);
        assert_eq!(st.mode, "OFFBOARD");
    }
}
