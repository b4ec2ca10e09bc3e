use tracing::{debug, warn};

use crate::fc::{FlightController, FlightMode};
use crate::rate::TickRate;
use crate::Shared;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandOutcome {
    /// Autopilot reports AUTO.LAND. `requests` is how many land requests
    /// this call had to send; zero if it was already landing.
    Landed { requests: u32 },
    Aborted,
}

/// Ask for AUTO.LAND once per tick until the autopilot reports it.
///
/// Disarming is left to the autopilot's own touchdown detection.
pub fn land<F: FlightController + ?Sized>(fc: &mut F, shared: &Shared, rate: &mut TickRate) -> LandOutcome {
    let mut requests = 0;
    loop {
        if shared.shutdown.is_requested() {
            warn!("landing aborted by shutdown after {} requests", requests);
            return LandOutcome::Aborted;
        }
        if FlightMode::AutoLand.is_reported_by(&shared.telemetry.vehicle_state().mode) {
            return LandOutcome::Landed { requests };
        }
        if !fc.request_mode(FlightMode::AutoLand) {
            debug!("land request rejected, retrying");
        }
        requests += 1;
        rate.sleep();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimFc;

    #[test]
    fn already_landing_sends_nothing() {
        let shared = Shared::new();
        shared.telemetry.update_vehicle_state(true, "AUTO.LAND");
        let mut fc = SimFc::new(shared.telemetry.clone());

        let out = land(&mut fc, &shared, &mut TickRate::new(1000.0));
        assert_eq!(out, LandOutcome::Landed { requests: 0 });
        assert!(fc.log().events().is_empty());
    }

    #[test]
    fn retries_one_request_per_tick() {
        let shared = Shared::new();
        shared.telemetry.update_vehicle_state(true, "OFFBOARD");
        let mut fc = SimFc::new(shared.telemetry.clone()).reject_first_mode_requests(4);
        let log = fc.log();

        let out = land(&mut fc, &shared, &mut TickRate::new(1000.0));
        assert_eq!(out, LandOutcome::Landed { requests: 5 });
        assert_eq!(log.mode_requests(FlightMode::AutoLand), 5);
        assert!(log.published().is_empty());
        // the driver never touches arming
        assert_eq!(log.arm_requests(), 0);
        assert!(shared.telemetry.vehicle_state().armed);
    }

    #[test]
    fn shutdown_interrupts() {
        let shared = Shared::new();
        shared.shutdown.request();
        let mut fc = SimFc::new(shared.telemetry.clone());
        assert_eq!(land(&mut fc, &shared, &mut TickRate::new(1000.0)), LandOutcome::Aborted);
    }
}
