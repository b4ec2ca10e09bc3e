use offb_proto::Pose;

use crate::params::SafetyBounds;

/// Geofence containment test. Strict inequalities, so a pose sitting exactly
/// on a bound is outside. There is no lower altitude check: `z_min` is not
/// consulted.
pub fn in_envelope(pose: &Pose, bounds: &SafetyBounds) -> bool {
    let p = &pose.position;
    bounds.x_min < p.x
        && p.x < bounds.x_max
        && bounds.y_min < p.y
        && p.y < bounds.y_max
        && p.z < bounds.z_max
}
