use serde::{Deserialize, Serialize};

use crate::geometry::{Pose, Quaternion};

/// Latest autopilot status as reported over the link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleState {
    pub armed: bool,
    /// PX4 mode name, e.g. "OFFBOARD" or "AUTO.LAND"
    pub mode: String,
}

/// One sample from the external tracking system. Position is in millimetres
/// exactly as the tracker reports it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    pub position_mm: [f64; 3],
    #[serde(default)]
    pub orientation: Quaternion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventKind {
    Marker,
    SessionEnd,
}

/// Bookkeeping record sent to the optional monitor endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorEvent {
    pub ts_unix_ms: i64,
    pub kind: EventKind,
    pub pose: Option<Pose>,
    pub msg: String,
}
