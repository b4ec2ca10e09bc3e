use nalgebra::{Quaternion as NaQuaternion, UnitQuaternion};
use offb_proto::Quaternion;

/// Static-axis XYZ Euler angles (roll about x, then pitch about y, then yaw
/// about z) to a wire quaternion.
pub fn quaternion_from_euler(roll: f64, pitch: f64, yaw: f64) -> Quaternion {
    to_wire(&UnitQuaternion::from_euler_angles(roll, pitch, yaw))
}

pub fn to_wire(q: &UnitQuaternion<f64>) -> Quaternion {
    Quaternion { x: q.i, y: q.j, z: q.k, w: q.w }
}

pub fn from_wire(q: &Quaternion) -> UnitQuaternion<f64> {
    UnitQuaternion::from_quaternion(NaQuaternion::new(q.w, q.x, q.y, q.z))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_6};

    fn close(a: &Quaternion, b: &Quaternion) -> bool {
        let d = (a.x - b.x).abs() + (a.y - b.y).abs() + (a.z - b.z).abs() + (a.w - b.w).abs();
        d < 1e-9
    }

    #[test]
    fn zero_angles_give_identity() {
        assert!(close(&quaternion_from_euler(0.0, 0.0, 0.0), &Quaternion::IDENTITY));
    }

    #[test]
    fn pure_roll() {
        let q = quaternion_from_euler(FRAC_PI_6, 0.0, 0.0);
        let half = FRAC_PI_6 / 2.0;
        assert!(close(&q, &Quaternion { x: half.sin(), y: 0.0, z: 0.0, w: half.cos() }));
    }

    #[test]
    fn pure_yaw() {
        let q = quaternion_from_euler(0.0, 0.0, FRAC_PI_2);
        let half = FRAC_PI_2 / 2.0;
        assert!(close(&q, &Quaternion { x: 0.0, y: 0.0, z: half.sin(), w: half.cos() }));
    }

    #[test]
    fn wire_round_trip() {
        let q = quaternion_from_euler(0.1, -0.2, 0.3);
        assert!(close(&to_wire(&from_wire(&q)), &q));
    }
}
