use serde::{Deserialize, Serialize};

use crate::geometry::{Position, Quaternion};

/// Setpoint streamed to the flight controller, one per tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlCommand {
    Pose {
        position: Position,
        orientation: Quaternion,
    },
    Attitude {
        orientation: Quaternion,
        /// Normalized collective thrust, 0..=1
        thrust: f64,
        /// rad/s, FLU body frame
        body_yaw_rate: f64,
    },
    Velocity {
        vx: f64,
        vy: f64,
        vz: f64,
    },
}

impl ControlCommand {
    pub fn label(&self) -> &'static str {
        match self {
            ControlCommand::Pose { .. } => "pose",
            ControlCommand::Attitude { .. } => "attitude",
            ControlCommand::Velocity { .. } => "velocity",
        }
    }
}
