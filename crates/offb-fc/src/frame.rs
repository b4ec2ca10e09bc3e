//! Local ENU / body FLU (tracker and operator frames) to local NED / body
//! FRD (what PX4 expects on the wire).

use std::f64::consts::{FRAC_PI_2, PI};

use nalgebra::UnitQuaternion;
use offb_core::geometry::from_wire;
use offb_proto::{Position, Quaternion};

fn ned_enu() -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(PI, 0.0, FRAC_PI_2)
}

fn aircraft_baselink() -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(PI, 0.0, 0.0)
}

pub fn position_to_ned(p: &Position) -> [f32; 3] {
    [p.y as f32, p.x as f32, -p.z as f32]
}

pub fn velocity_to_ned(vx: f64, vy: f64, vz: f64) -> [f32; 3] {
    [vy as f32, vx as f32, -vz as f32]
}

pub fn orientation_to_ned(q: &Quaternion) -> UnitQuaternion<f64> {
    ned_enu() * from_wire(q) * aircraft_baselink()
}

/// MAVLink quaternion order: w, x, y, z.
pub fn to_mav_q(q: &UnitQuaternion<f64>) -> [f32; 4] {
    [q.w as f32, q.i as f32, q.j as f32, q.k as f32]
}

pub fn yaw_rate_to_frd(yaw_rate: f64) -> f32 {
    -yaw_rate as f32
}
