pub mod command;
pub mod geometry;
pub mod telemetry;

pub use command::ControlCommand;
pub use geometry::{Pose, Position, Quaternion};
pub use telemetry::{EventKind, MonitorEvent, PoseSample, VehicleState};
