use std::fmt;

use offb_proto::ControlCommand;

/// Autopilot modes the supervisor asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightMode {
    Offboard,
    AutoLand,
}

impl FlightMode {
    /// Mode name as the autopilot reports it.
    pub fn as_str(self) -> &'static str {
        match self {
            FlightMode::Offboard => "OFFBOARD",
            FlightMode::AutoLand => "AUTO.LAND",
        }
    }

    pub fn is_reported_by(self, mode: &str) -> bool {
        self.as_str() == mode
    }
}

impl fmt::Display for FlightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command side of the flight-controller link.
///
/// Mode and arm requests are synchronous and report whether the autopilot
/// accepted them. A `false` is a transient rejection; callers retry on the
/// next tick. Status flows back separately through the telemetry cache.
pub trait FlightController {
    fn request_mode(&mut self, mode: FlightMode) -> bool;
    fn request_arm(&mut self) -> bool;
    fn publish(&mut self, cmd: &ControlCommand) -> anyhow::Result<()>;
}

impl<F: FlightController + ?Sized> FlightController for Box<F> {
    fn request_mode(&mut self, mode: FlightMode) -> bool {
        (**self).request_mode(mode)
    }

    fn request_arm(&mut self) -> bool {
        (**self).request_arm()
    }

    fn publish(&mut self, cmd: &ControlCommand) -> anyhow::Result<()> {
        (**self).publish(cmd)
    }
}
