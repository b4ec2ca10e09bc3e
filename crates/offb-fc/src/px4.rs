//! PX4 custom-mode encoding.
//!
//! HEARTBEAT.custom_mode packs the main mode in bits 16..24 and the sub mode
//! in bits 24..32. Names follow the usual ground-station spelling
//! ("OFFBOARD", "AUTO.LAND", ...).

use offb_core::FlightMode;

const MAIN_MANUAL: u8 = 1;
const MAIN_ALTCTL: u8 = 2;
const MAIN_POSCTL: u8 = 3;
const MAIN_AUTO: u8 = 4;
const MAIN_ACRO: u8 = 5;
const MAIN_OFFBOARD: u8 = 6;
const MAIN_STABILIZED: u8 = 7;
const MAIN_RATTITUDE: u8 = 8;

const AUTO_READY: u8 = 1;
const AUTO_TAKEOFF: u8 = 2;
const AUTO_LOITER: u8 = 3;
const AUTO_MISSION: u8 = 4;
const AUTO_RTL: u8 = 5;
const AUTO_LAND: u8 = 6;
const AUTO_FOLLOW_TARGET: u8 = 8;
const AUTO_PRECLAND: u8 = 9;

pub fn split(custom_mode: u32) -> (u8, u8) {
    let main = ((custom_mode >> 16) & 0xff) as u8;
    let sub = ((custom_mode >> 24) & 0xff) as u8;
    (main, sub)
}

pub fn join(main: u8, sub: u8) -> u32 {
    ((main as u32) << 16) | ((sub as u32) << 24)
}

/// Main/sub mode pair for a DO_SET_MODE request.
pub fn mode_for(mode: FlightMode) -> (u8, u8) {
    match mode {
        FlightMode::Offboard => (MAIN_OFFBOARD, 0),
        FlightMode::AutoLand => (MAIN_AUTO, AUTO_LAND),
    }
}

pub fn mode_name(custom_mode: u32) -> String {
    let (main, sub) = split(custom_mode);
    let name = match (main, sub) {
        (MAIN_MANUAL, _) => "MANUAL",
        (MAIN_ALTCTL, _) => "ALTCTL",
        (MAIN_POSCTL, _) => "POSCTL",
        (MAIN_ACRO, _) => "ACRO",
        (MAIN_OFFBOARD, _) => "OFFBOARD",
        (MAIN_STABILIZED, _) => "STABILIZED",
        (MAIN_RATTITUDE, _) => "RATTITUDE",
        (MAIN_AUTO, AUTO_READY) => "AUTO.READY",
        (MAIN_AUTO, AUTO_TAKEOFF) => "AUTO.TAKEOFF",
        (MAIN_AUTO, AUTO_LOITER) => "AUTO.LOITER",
        (MAIN_AUTO, AUTO_MISSION) => "AUTO.MISSION",
        (MAIN_AUTO, AUTO_RTL) => "AUTO.RTL",
        (MAIN_AUTO, AUTO_LAND) => "AUTO.LAND",
        (MAIN_AUTO, AUTO_FOLLOW_TARGET) => "AUTO.FOLLOW_TARGET",
        (MAIN_AUTO, AUTO_PRECLAND) => "AUTO.PRECLAND",
        _ => return format!("CMODE({})", custom_mode),
    };
    name.to_string()
}
