use std::sync::{Mutex, MutexGuard, PoisonError};

use offb_proto::{Pose, Position, Quaternion, VehicleState};

/// Latest vehicle state and tracked pose.
///
/// Written by the ingestion side (tracker datagrams, link reader) and read by
/// the control loop. Each field group sits behind its own lock so a reader
/// always sees a complete pose or a complete vehicle state, never a mix of
/// old and new components.
#[derive(Debug, Default)]
pub struct TelemetryCache {
    pose: Mutex<Pose>,
    vehicle: Mutex<VehicleState>,
}

const MM_PER_M: f64 = 1000.0;

impl TelemetryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a tracker sample. The tracker reports millimetres; everything
    /// downstream of this call works in metres.
    pub fn update_pose(&self, raw_position_mm: [f64; 3], orientation: Quaternion) {
        let [x, y, z] = raw_position_mm;
        let pose = Pose {
            position: Position::new(x / MM_PER_M, y / MM_PER_M, z / MM_PER_M),
            orientation,
        };
        *lock(&self.pose) = pose;
    }

    pub fn update_vehicle_state(&self, armed: bool, mode: impl Into<String>) {
        let state = VehicleState { armed, mode: mode.into() };
        *lock(&self.vehicle) = state;
    }

    pub fn pose(&self) -> Pose {
        *lock(&self.pose)
    }

    pub fn vehicle_state(&self) -> VehicleState {
        lock(&self.vehicle).clone()
    }
}

// Writers only ever assign whole values, so a poisoned guard still holds a
// complete snapshot.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
