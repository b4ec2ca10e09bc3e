use std::time::{Duration, Instant};

/// Link health as seen by the reader thread.
#[derive(Debug, Clone, Default)]
pub struct FcStatus {
    pub connected: bool,
    pub connection: Option<String>,
    pub last_heartbeat: Option<Instant>,
    pub armed: bool,
    pub mode: Option<String>,
    pub msgs_received: u64,
    pub acks_denied: u64,
}

impl FcStatus {
    pub fn hb_age(&self) -> Option<Duration> {
        self.last_heartbeat.map(|t| t.elapsed())
    }
}
