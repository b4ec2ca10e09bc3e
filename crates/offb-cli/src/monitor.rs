use anyhow::{Context, Result};
use offb_core::ExitReason;
use offb_proto::telemetry::{EventKind, MonitorEvent};
use offb_proto::{Pose, Position, Quaternion};
use tokio::net::UdpSocket;
use tracing::{info, warn};

/// Optional bookkeeping output. Without an address events only go to the
/// log.
pub struct Monitor {
    sock: Option<UdpSocket>,
}

fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn marker_event(position: [f64; 3]) -> MonitorEvent {
    let [x, y, z] = position;
    MonitorEvent {
        ts_unix_ms: now_ms(),
        kind: EventKind::Marker,
        pose: Some(Pose { position: Position::new(x, y, z), orientation: Quaternion::IDENTITY }),
        msg: "tag_world".into(),
    }
}

pub fn session_end_event(reason: ExitReason) -> MonitorEvent {
    MonitorEvent {
        ts_unix_ms: now_ms(),
        kind: EventKind::SessionEnd,
        pose: None,
        msg: format!("{:?}", reason),
    }
}

impl Monitor {
    pub async fn connect(addr: Option<&str>) -> Result<Self> {
        let Some(addr) = addr else { return Ok(Self { sock: None }) };
        let sock = UdpSocket::bind("0.0.0.0:0").await.context("bind monitor socket")?;
        sock.connect(addr).await.with_context(|| format!("monitor connect {}", addr))?;
        info!("monitor: events to {}", addr);
        Ok(Self { sock: Some(sock) })
    }

    pub async fn publish(&self, ev: &MonitorEvent) {
        info!("monitor: {:?} {}", ev.kind, ev.msg);
        let Some(sock) = &self.sock else { return };
        let body = match serde_json::to_vec(ev) {
            Ok(b) => b,
            Err(e) => {
                warn!("monitor: encode failed: {}", e);
                return;
            }
        };
        if let Err(e) = sock.send(&body).await {
            warn!("monitor: send failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_sits_at_the_tag() {
        let ev = marker_event([0.0, 0.0, 0.05]);
        assert!(matches!(ev.kind, EventKind::Marker));
        assert_eq!(ev.pose.unwrap().position, Position::new(0.0, 0.0, 0.05));
    }

    #[tokio::test]
    async fn events_arrive_as_json() {
        let rx = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = rx.local_addr().unwrap().to_string();
        let monitor = Monitor::connect(Some(&addr)).await.unwrap();

        monitor.publish(&session_end_event(ExitReason::Quit)).await;

        let mut buf = [0u8; 1024];
        let n = rx.recv(&mut buf).await.unwrap();
        let ev: MonitorEvent = serde_json::from_slice(&buf[..n]).unwrap();
        assert!(matches!(ev.kind, EventKind::SessionEnd));
        assert_eq!(ev.msg, "Quit");
    }
}
