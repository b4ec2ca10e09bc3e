pub mod arming;
pub mod doctor;
pub mod fc;
pub mod geometry;
pub mod landing;
pub mod params;
pub mod rate;
pub mod safety;
pub mod sim;
pub mod supervisor;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::params::{ConfigDelta, ParameterStore};
use crate::rate::Shutdown;
use crate::telemetry::TelemetryCache;

pub use crate::fc::{FlightController, FlightMode};
pub use crate::supervisor::{ExitReason, Supervisor};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SupervisorConfig {
    /// Control loop rate. Offboard mode drops out below 2 Hz. Default 50.
    pub rate_hz: Option<f64>,

    /// Wait after the link comes up before seeding the hold position from
    /// the tracker. Default 1000 ms.
    pub settle_ms: Option<u64>,

    /// Reference tag position published once at startup, metres.
    /// Default [0.0, 0.0, 0.05].
    pub marker: Option<[f64; 3]>,

    /// Initial parameter values applied before anything else, e.g. the
    /// safety bounds.
    pub params: Option<ConfigDelta>,
}

impl SupervisorConfig {
    pub fn rate_hz(&self) -> f64 {
        self.rate_hz.unwrap_or(50.0)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms.unwrap_or(1000))
    }

    pub fn marker(&self) -> [f64; 3] {
        self.marker.unwrap_or([0.0, 0.0, 0.05])
    }
}

/// State shared between the ingestion side and the control loop.
#[derive(Debug, Clone, Default)]
pub struct Shared {
    pub telemetry: Arc<TelemetryCache>,
    pub params: Arc<ParameterStore>,
    pub shutdown: Shutdown,
}

impl Shared {
    pub fn new() -> Self {
        Self::default()
    }
}
