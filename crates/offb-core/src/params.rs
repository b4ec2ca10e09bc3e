//! Live-tunable configuration: safety bounds, per-mode setpoints and the
//! control flags.
//!
//! Operators send partial [`ConfigDelta`]s; the store merges them into a
//! versioned [`ParamConfig`] and hands back the full result so it can be
//! echoed as acknowledgement. Angles cross the boundary in degrees and are
//! kept in radians internally.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use offb_proto::Position;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::telemetry::lock;

#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("unknown parameter `{0}`")]
    UnknownKey(String),
    #[error("expected `key=value`, got `{0}`")]
    MalformedAssignment(String),
    #[error("invalid value `{value}` for `{key}`")]
    InvalidValue { key: ParamKey, value: String },
    #[error("unknown mode code {0} (expected 0..=4)")]
    UnknownMode(u8),
}

/// Active control mode. The numeric codes only exist at the configuration
/// boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ModeSelector {
    #[default]
    PositionHold = 0,
    PoseSetpoint = 1,
    AttitudeSetpoint = 2,
    VelocitySetpoint = 3,
    ForceLand = 4,
}

impl TryFrom<u8> for ModeSelector {
    type Error = ParamError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => ModeSelector::PositionHold,
            1 => ModeSelector::PoseSetpoint,
            2 => ModeSelector::AttitudeSetpoint,
            3 => ModeSelector::VelocitySetpoint,
            4 => ModeSelector::ForceLand,
            other => return Err(ParamError::UnknownMode(other)),
        })
    }
}

impl From<ModeSelector> for u8 {
    fn from(mode: ModeSelector) -> Self {
        mode as u8
    }
}

/// Rectangular geofence, metres.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SafetyBounds {
    pub x_max: f64,
    pub x_min: f64,
    pub y_max: f64,
    pub y_min: f64,
    pub z_max: f64,
    /// Accepted and echoed, not part of the containment test.
    pub z_min: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AttitudeSetpoint {
    /// rad
    pub roll: f64,
    /// rad
    pub pitch: f64,
    pub thrust: f64,
    /// rad/s
    pub yaw_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VelocitySetpoint {
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SetpointBank {
    pub position: Position,
    pub attitude: AttitudeSetpoint,
    pub velocity: VelocitySetpoint,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParamConfig {
    /// Bumped on every applied delta.
    pub version: u64,
    pub bounds: SafetyBounds,
    pub setpoints: SetpointBank,
    pub mode: ModeSelector,
    pub takeoff_requested: bool,
    pub quit_requested: bool,
}

/// Partial update over the recognized options. Absent fields are left
/// untouched by [`ParameterStore::apply`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_x_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_x_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_y_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_y_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_z_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_z_min: Option<f64>,

    /// degrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll: Option<f64>,
    /// degrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thrust: Option<f64>,
    /// degrees/s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yaw_rate: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity_z: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_z: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ModeSelector>,
    #[serde(default, rename = "QUIT", skip_serializing_if = "Option::is_none")]
    pub quit: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub takeoff: Option<bool>,
}

/// Names of every recognized option, as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKey {
    SafeXMax,
    SafeXMin,
    SafeYMax,
    SafeYMin,
    SafeZMax,
    SafeZMin,
    Roll,
    Pitch,
    Thrust,
    YawRate,
    VelocityX,
    VelocityY,
    VelocityZ,
    PositionX,
    PositionY,
    PositionZ,
    Mode,
    Quit,
    Takeoff,
}

impl ParamKey {
    pub const ALL: [ParamKey; 19] = [
        ParamKey::SafeXMax,
        ParamKey::SafeXMin,
        ParamKey::SafeYMax,
        ParamKey::SafeYMin,
        ParamKey::SafeZMax,
        ParamKey::SafeZMin,
        ParamKey::Roll,
        ParamKey::Pitch,
        ParamKey::Thrust,
        ParamKey::YawRate,
        ParamKey::VelocityX,
        ParamKey::VelocityY,
        ParamKey::VelocityZ,
        ParamKey::PositionX,
        ParamKey::PositionY,
        ParamKey::PositionZ,
        ParamKey::Mode,
        ParamKey::Quit,
        ParamKey::Takeoff,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ParamKey::SafeXMax => "safe_x_max",
            ParamKey::SafeXMin => "safe_x_min",
            ParamKey::SafeYMax => "safe_y_max",
            ParamKey::SafeYMin => "safe_y_min",
            ParamKey::SafeZMax => "safe_z_max",
            ParamKey::SafeZMin => "safe_z_min",
            ParamKey::Roll => "roll",
            ParamKey::Pitch => "pitch",
            ParamKey::Thrust => "thrust",
            ParamKey::YawRate => "yaw_rate",
            ParamKey::VelocityX => "velocity_x",
            ParamKey::VelocityY => "velocity_y",
            ParamKey::VelocityZ => "velocity_z",
            ParamKey::PositionX => "position_x",
            ParamKey::PositionY => "position_y",
            ParamKey::PositionZ => "position_z",
            ParamKey::Mode => "mode",
            ParamKey::Quit => "QUIT",
            ParamKey::Takeoff => "takeoff",
        }
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamKey {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParamKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ParamError::UnknownKey(s.to_string()))
    }
}

impl ConfigDelta {
    /// Set one option from its textual form, e.g. `("mode", "3")`.
    pub fn set(&mut self, key: ParamKey, raw: &str) -> Result<(), ParamError> {
        let invalid = || ParamError::InvalidValue { key, value: raw.to_string() };
        let raw = raw.trim();

        let float = || raw.parse::<f64>().map_err(|_| invalid());
        let flag = || match raw {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(invalid()),
        };

        match key {
            ParamKey::SafeXMax => self.safe_x_max = Some(float()?),
            ParamKey::SafeXMin => self.safe_x_min = Some(float()?),
            ParamKey::SafeYMax => self.safe_y_max = Some(float()?),
            ParamKey::SafeYMin => self.safe_y_min = Some(float()?),
            ParamKey::SafeZMax => self.safe_z_max = Some(float()?),
            ParamKey::SafeZMin => self.safe_z_min = Some(float()?),
            ParamKey::Roll => self.roll = Some(float()?),
            ParamKey::Pitch => self.pitch = Some(float()?),
            ParamKey::Thrust => self.thrust = Some(float()?),
            ParamKey::YawRate => self.yaw_rate = Some(float()?),
            ParamKey::VelocityX => self.velocity_x = Some(float()?),
            ParamKey::VelocityY => self.velocity_y = Some(float()?),
            ParamKey::VelocityZ => self.velocity_z = Some(float()?),
            ParamKey::PositionX => self.position_x = Some(float()?),
            ParamKey::PositionY => self.position_y = Some(float()?),
            ParamKey::PositionZ => self.position_z = Some(float()?),
            ParamKey::Mode => {
                let code = raw.parse::<u8>().map_err(|_| invalid())?;
                self.mode = Some(ModeSelector::try_from(code)?);
            }
            ParamKey::Quit => self.quit = Some(flag()?),
            ParamKey::Takeoff => self.takeoff = Some(flag()?),
        }
        Ok(())
    }

    /// Build a delta from `key=value` assignments.
    pub fn from_assignments<'a, I>(items: I) -> Result<Self, ParamError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut delta = ConfigDelta::default();
        for item in items {
            let (key, value) = item
                .split_once('=')
                .ok_or_else(|| ParamError::MalformedAssignment(item.to_string()))?;
            delta.set(key.trim().parse()?, value)?;
        }
        Ok(delta)
    }

    pub fn is_empty(&self) -> bool {
        self == &ConfigDelta::default()
    }
}

/// Full echo of a configuration, in external units.
impl From<&ParamConfig> for ConfigDelta {
    fn from(cfg: &ParamConfig) -> Self {
        let b = &cfg.bounds;
        let sp = &cfg.setpoints;
        ConfigDelta {
            safe_x_max: Some(b.x_max),
            safe_x_min: Some(b.x_min),
            safe_y_max: Some(b.y_max),
            safe_y_min: Some(b.y_min),
            safe_z_max: Some(b.z_max),
            safe_z_min: Some(b.z_min),
            roll: Some(sp.attitude.roll.to_degrees()),
            pitch: Some(sp.attitude.pitch.to_degrees()),
            thrust: Some(sp.attitude.thrust),
            yaw_rate: Some(sp.attitude.yaw_rate.to_degrees()),
            velocity_x: Some(sp.velocity.vx),
            velocity_y: Some(sp.velocity.vy),
            velocity_z: Some(sp.velocity.vz),
            position_x: Some(sp.position.x),
            position_y: Some(sp.position.y),
            position_z: Some(sp.position.z),
            mode: Some(cfg.mode),
            quit: Some(cfg.quit_requested),
            takeoff: Some(cfg.takeoff_requested),
        }
    }
}

fn put<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

impl ParamConfig {
    fn merge(&mut self, d: &ConfigDelta) {
        let b = &mut self.bounds;
        put(&mut b.x_max, d.safe_x_max);
        put(&mut b.x_min, d.safe_x_min);
        put(&mut b.y_max, d.safe_y_max);
        put(&mut b.y_min, d.safe_y_min);
        put(&mut b.z_max, d.safe_z_max);
        put(&mut b.z_min, d.safe_z_min);

        let att = &mut self.setpoints.attitude;
        put(&mut att.roll, d.roll.map(f64::to_radians));
        put(&mut att.pitch, d.pitch.map(f64::to_radians));
        put(&mut att.thrust, d.thrust);
        put(&mut att.yaw_rate, d.yaw_rate.map(f64::to_radians));

        let vel = &mut self.setpoints.velocity;
        put(&mut vel.vx, d.velocity_x);
        put(&mut vel.vy, d.velocity_y);
        put(&mut vel.vz, d.velocity_z);

        let pos = &mut self.setpoints.position;
        put(&mut pos.x, d.position_x);
        put(&mut pos.y, d.position_y);
        put(&mut pos.z, d.position_z);

        put(&mut self.mode, d.mode);
        put(&mut self.quit_requested, d.quit);
        put(&mut self.takeoff_requested, d.takeoff);
    }
}

/// Shared configuration. One lock covers the whole config, so every field
/// group is always read as a consistent unit.
#[derive(Debug, Default)]
pub struct ParameterStore {
    inner: Mutex<ParamConfig>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `delta` and return the resulting configuration.
    ///
    /// Bound ordering is not validated: inverted bounds make every position
    /// read as outside the envelope.
    pub fn apply(&self, delta: &ConfigDelta) -> ParamConfig {
        let cfg = {
            let mut cfg = lock(&self.inner);
            cfg.merge(delta);
            cfg.version += 1;
            *cfg
        };
        info!("reconfigure request: takeoff={}", cfg.takeoff_requested);
        cfg
    }

    pub fn snapshot(&self) -> ParamConfig {
        *lock(&self.inner)
    }

    pub fn takeoff_requested(&self) -> bool {
        lock(&self.inner).takeoff_requested
    }

    pub fn clear_takeoff(&self) -> ParamConfig {
        self.apply(&ConfigDelta { takeoff: Some(false), ..Default::default() })
    }
}
