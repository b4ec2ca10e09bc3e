//! UDP ingestion: tracker poses in, reconfiguration deltas in (with the full
//! configuration echoed back to the sender).

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use offb_core::params::{ConfigDelta, ParameterStore};
use offb_core::telemetry::TelemetryCache;
use offb_proto::PoseSample;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

const MAX_DATAGRAM: usize = 4096;

pub struct PoseListener {
    sock: UdpSocket,
}

impl PoseListener {
    pub async fn bind(addr: &str) -> Result<Self> {
        let sock = UdpSocket::bind(addr).await.with_context(|| format!("bind pose socket {}", addr))?;
        info!("ingest: tracker poses on {}", sock.local_addr()?);
        Ok(Self { sock })
    }

    pub async fn run(self, telemetry: Arc<TelemetryCache>) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (n, peer) = match self.sock.recv_from(&mut buf).await {
                Ok(r) => r,
                Err(e) => {
                    warn!("ingest: pose recv failed: {}", e);
                    continue;
                }
            };
            match serde_json::from_slice::<PoseSample>(&buf[..n]) {
                Ok(s) => telemetry.update_pose(s.position_mm, s.orientation),
                Err(e) => debug!("ingest: bad pose datagram from {}: {}", peer, e),
            }
        }
    }
}

pub struct ReconfigureServer {
    sock: UdpSocket,
}

impl ReconfigureServer {
    pub async fn bind(addr: &str) -> Result<Self> {
        let sock = UdpSocket::bind(addr).await.with_context(|| format!("bind reconfigure socket {}", addr))?;
        info!("ingest: reconfiguration on {}", sock.local_addr()?);
        Ok(Self { sock })
    }

    pub async fn run(self, params: Arc<ParameterStore>) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (n, peer) = match self.sock.recv_from(&mut buf).await {
                Ok(r) => r,
                Err(e) => {
                    warn!("ingest: reconfigure recv failed: {}", e);
                    continue;
                }
            };
            let reply = handle_delta(&buf[..n], &params, peer);
            if let Err(e) = self.sock.send_to(reply.as_bytes(), peer).await {
                warn!("ingest: reconfigure ack to {} failed: {}", peer, e);
            }
        }
    }
}

fn handle_delta(raw: &[u8], params: &ParameterStore, peer: SocketAddr) -> String {
    match serde_json::from_slice::<ConfigDelta>(raw) {
        Ok(delta) => {
            let cfg = params.apply(&delta);
            debug!("ingest: {} applied {:?} -> version {}", peer, delta, cfg.version);
            serde_json::to_string(&ConfigDelta::from(&cfg)).unwrap_or_else(|e| error_reply(&e))
        }
        Err(e) => {
            warn!("ingest: rejected reconfiguration from {}: {}", peer, e);
            error_reply(&e)
        }
    }
}

fn error_reply(e: &serde_json::Error) -> String {
    serde_json::json!({ "error": e.to_string() }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use offb_core::params::ModeSelector;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn delta_is_applied_and_echoed() {
        let params = ParameterStore::new();
        let reply = handle_delta(br#"{"mode": 2, "roll": 10.0}"#, &params, peer());

        assert_eq!(params.snapshot().mode, ModeSelector::AttitudeSetpoint);
        let echo: ConfigDelta = serde_json::from_str(&reply).unwrap();
        assert_eq!(echo.mode, Some(ModeSelector::AttitudeSetpoint));
        assert!((echo.roll.unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(echo.takeoff, Some(false));
    }

    #[test]
    fn bad_delta_changes_nothing() {
        let params = ParameterStore::new();
        let reply = handle_delta(br#"{"mode": 9}"#, &params, peer());

        assert!(reply.contains("error"));
        assert_eq!(params.snapshot().version, 0);
    }

    #[tokio::test]
    async fn pose_datagrams_reach_the_cache() {
        let listener = PoseListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.sock.local_addr().unwrap();
        let telemetry = Arc::new(TelemetryCache::new());
        tokio::spawn(listener.run(telemetry.clone()));

        let tx = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        tx.send_to(br#"{"position_mm":[250.0,0.0,1200.0]}"#, addr).await.unwrap();

        for _ in 0..100 {
            if telemetry.pose().position.z > 0.0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let p = telemetry.pose().position;
        assert_eq!((p.x, p.z), (0.25, 1.2));
    }
}
