pub mod frame;
pub mod mav;
pub mod px4;
pub mod state;

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct FcConfig {
    /// MAVLink connection string, or "sim" for the in-process simulator.
    /// Examples: "serial:/dev/ttyACM0:921600", "udpin:0.0.0.0:14540"
    pub connection: String,

    /// MAVLink ids we use (companion side)
    pub sys_id: u8,
    pub comp_id: u8,

    /// target system/component (autopilot side). 1/1 for PX4.
    pub target_sys: u8,
    pub target_comp: u8,

    /// How long a mode/arm request waits for COMMAND_ACK before counting as
    /// rejected. Default 250 ms.
    pub ack_timeout_ms: Option<u64>,

    /// Companion heartbeat send rate. Default 1 Hz.
    pub send_heartbeat_hz: Option<f32>,
}

impl FcConfig {
    pub fn is_sim(&self) -> bool {
        self.connection == "sim"
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms.unwrap_or(250))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        let hz = self.send_heartbeat_hz.unwrap_or(1.0).max(0.2);
        Duration::from_secs_f32(1.0 / hz)
    }
}
