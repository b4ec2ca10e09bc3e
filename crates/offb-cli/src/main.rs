mod ingest;
mod monitor;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::UdpSocket;
use tracing::{info, warn};

use offb_core::fc::FlightController;
use offb_core::params::ConfigDelta;
use offb_core::rate::Shutdown;
use offb_core::sim::SimFc;
use offb_core::supervisor::prime_session;
use offb_core::{doctor as core_doctor, Shared, Supervisor, SupervisorConfig};
use offb_fc::mav::FcLink;
use offb_fc::FcConfig;
use offb_proto::VehicleState;

use ingest::{PoseListener, ReconfigureServer};
use monitor::{marker_event, session_end_event, Monitor};

#[derive(Debug, Parser)]
#[command(name = "offb", version, about = "Offboard flight-mode supervisor for PX4")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Doctor,
    Run,
    /// Send a reconfiguration to a running supervisor, e.g. `offb set mode=2 roll=5`.
    Set {
        #[arg(required = true)]
        assignments: Vec<String>,
        /// Override the target address (defaults to ingest.reconfigure_bind).
        #[arg(long)]
        addr: Option<String>,
    },
    Fc { #[command(subcommand)] cmd: FcCmd },
}

#[derive(Debug, Subcommand)]
enum FcCmd {
    /// Open the link, wait for one heartbeat and print what the autopilot reports.
    Status {
        #[arg(long, default_value_t = 5)]
        wait_s: u64,
    },
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    supervisor: Option<SupervisorConfig>,
    fc: FcConfig,
    ingest: IngestCfg,
}

#[derive(Debug, serde::Deserialize)]
struct IngestCfg {
    pose_bind: String,
    reconfigure_bind: String,
    monitor_addr: Option<String>,
}

impl Config {
    fn supervisor(&self) -> SupervisorConfig {
        self.supervisor.clone().unwrap_or_default()
    }
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    let cfg: Config = toml::from_str(&s).context("parse config")?;
    Ok(cfg)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Run => run(&cfg).await?,
        Command::Set { assignments, addr } => set(&cfg, &assignments, addr.as_deref()).await?,
        Command::Fc { cmd } => fc_cmd(&cfg, cmd).await?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: checking config");
    let sup = cfg.supervisor();
    core_doctor::check_supervisor(&sup)?;

    anyhow::ensure!(!cfg.fc.connection.is_empty(), "fc.connection is empty");
    if cfg.fc.is_sim() {
        warn!("doctor: fc.connection = \"sim\", no autopilot will be contacted");
    }
    anyhow::ensure!(
        cfg.fc.ack_timeout() < Duration::from_secs_f64(1.0 / sup.rate_hz()) * 50,
        "fc.ack_timeout_ms {:?} would stall the loop for too many ticks",
        cfg.fc.ack_timeout()
    );

    for (name, addr) in [("pose_bind", &cfg.ingest.pose_bind), ("reconfigure_bind", &cfg.ingest.reconfigure_bind)] {
        addr.parse::<std::net::SocketAddr>()
            .with_context(|| format!("ingest.{} {:?} is not host:port", name, addr))?;
    }
    if cfg.ingest.monitor_addr.is_none() {
        info!("doctor: no ingest.monitor_addr, events only go to the log");
    }

    info!("doctor: OK");
    Ok(())
}

async fn set(cfg: &Config, assignments: &[String], addr: Option<&str>) -> Result<()> {
    let delta = ConfigDelta::from_assignments(assignments.iter().map(String::as_str))?;
    anyhow::ensure!(!delta.is_empty(), "nothing to set");

    let target = addr.unwrap_or(&cfg.ingest.reconfigure_bind);
    let sock = UdpSocket::bind("0.0.0.0:0").await.context("bind")?;
    sock.connect(target).await.with_context(|| format!("connect {}", target))?;
    sock.send(&serde_json::to_vec(&delta)?).await.context("send reconfiguration")?;

    let mut buf = vec![0u8; 4096];
    let n = tokio::time::timeout(Duration::from_secs(2), sock.recv(&mut buf))
        .await
        .with_context(|| format!("no reply from {}", target))?
        .context("recv reply")?;
    let reply: serde_json::Value = serde_json::from_slice(&buf[..n]).context("parse reply")?;
    if let Some(err) = reply.get("error") {
        anyhow::bail!("rejected: {}", err);
    }
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}

async fn fc_cmd(cfg: &Config, cmd: FcCmd) -> Result<()> {
    match cmd {
        FcCmd::Status { wait_s } => {
            anyhow::ensure!(!cfg.fc.is_sim(), "fc.connection is \"sim\", nothing to query");
            let link = FcLink::open(&cfg.fc).context("FC open")?;
            let shutdown = Shutdown::default();
            spawn_reader(&link, shutdown.clone(), |_| {});

            let timer = shutdown.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(wait_s)).await;
                timer.request();
            });

            let status = link.status();
            let heard = tokio::task::spawn_blocking(move || link.wait_for_heartbeat(&shutdown)).await?;

            let st = status.lock().map_err(|_| anyhow::anyhow!("FC status lock poisoned"))?.clone();
            println!("connected={}", st.connected);
            println!("connection={:?}", st.connection);
            println!("last_heartbeat_age={:?}", st.hb_age());
            println!("armed={} mode={:?}", st.armed, st.mode);
            println!("msgs_received={} acks_denied={}", st.msgs_received, st.acks_denied);
            heard
        }
    }
}

/// The reader blocks in `recv`, so it gets its own thread rather than a
/// runtime blocking slot that would hold up shutdown on a silent link.
fn spawn_reader<S>(link: &FcLink, shutdown: Shutdown, on_state: S)
where
    S: FnMut(VehicleState) + Send + 'static,
{
    let reader = link.reader(on_state);
    let spawned = std::thread::Builder::new()
        .name("fc-reader".into())
        .spawn(move || reader.run(shutdown));
    if let Err(e) = spawned {
        warn!("FC: reader thread failed to start: {}", e);
    }
}

async fn open_flight_controller(cfg: &Config, shared: &Shared) -> Result<Box<dyn FlightController + Send>> {
    if cfg.fc.is_sim() {
        warn!("FC: using the in-process simulator");
        return Ok(Box::new(SimFc::new(shared.telemetry.clone())));
    }

    let link = FcLink::open(&cfg.fc).context("FC open")?;
    let telemetry = shared.telemetry.clone();
    spawn_reader(&link, shared.shutdown.clone(), move |st| telemetry.update_vehicle_state(st.armed, st.mode));

    info!("FC: waiting for autopilot on {}", cfg.fc.connection);
    let shutdown = shared.shutdown.clone();
    let link = tokio::task::spawn_blocking(move || -> Result<FcLink> {
        link.wait_for_heartbeat(&shutdown)?;
        Ok(link)
    })
    .await
    .context("FC wait task")??;
    Ok(Box::new(link))
}

async fn run(cfg: &Config) -> Result<()> {
    let sup = cfg.supervisor();
    core_doctor::check_rate(sup.rate_hz())?;

    let shared = Shared::new();
    if let Some(p) = &sup.params {
        shared.params.apply(p);
    }

    let ctrl_c = shared.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c: shutting down");
            ctrl_c.request();
        }
    });

    let poses = PoseListener::bind(&cfg.ingest.pose_bind).await?;
    tokio::spawn(poses.run(shared.telemetry.clone()));
    let reconf = ReconfigureServer::bind(&cfg.ingest.reconfigure_bind).await?;
    tokio::spawn(reconf.run(shared.params.clone()));
    let monitor = Monitor::connect(cfg.ingest.monitor_addr.as_deref()).await?;

    let fc = open_flight_controller(cfg, &shared).await?;

    tokio::time::sleep(sup.settle()).await;
    let primed = prime_session(&shared);
    info!(
        "run: session primed, hold at ({:.2}, {:.2}, {:.2})",
        primed.setpoints.position.x, primed.setpoints.position.y, primed.setpoints.position.z
    );
    monitor.publish(&marker_event(sup.marker())).await;

    let supervisor = Supervisor::new(fc, shared.clone(), sup.rate_hz());
    let reason = tokio::task::spawn_blocking(move || supervisor.run())
        .await
        .context("supervisor task")?;

    shared.shutdown.request();
    monitor.publish(&session_end_event(reason)).await;
    info!("run: supervisor exited: {:?}", reason);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [supervisor]
        rate_hz = 50.0

        [supervisor.params]
        safe_x_max = 2.0
        safe_x_min = -2.0
        safe_y_max = 2.0
        safe_y_min = -2.0
        safe_z_max = 2.5

        [fc]
        connection = "sim"
        sys_id = 1
        comp_id = 191
        target_sys = 1
        target_comp = 1

        [ingest]
        pose_bind = "127.0.0.1:5005"
        reconfigure_bind = "127.0.0.1:5006"
    "#;

    #[test]
    fn sample_config_passes_doctor() {
        let cfg: Config = toml::from_str(SAMPLE).unwrap();
        assert!(cfg.fc.is_sim());
        assert!(doctor(&cfg).is_ok());
    }

    #[test]
    fn missing_supervisor_section_uses_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [fc]
            connection = "udpin:0.0.0.0:14540"
            sys_id = 1
            comp_id = 191
            target_sys = 1
            target_comp = 1
            [ingest]
            pose_bind = "0.0.0.0:5005"
            reconfigure_bind = "0.0.0.0:5006"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.supervisor().rate_hz(), 50.0);
    }

    #[test]
    fn shipped_config_parses() {
        let cfg: Config = toml::from_str(include_str!("../../../config/offb.toml")).unwrap();
        assert_eq!(cfg.supervisor().settle(), Duration::from_millis(1000));
        assert!(doctor(&cfg).is_ok());
    }

    #[test]
    fn bad_bind_address_fails_doctor() {
        let mut cfg: Config = toml::from_str(SAMPLE).unwrap();
        cfg.ingest.pose_bind = "localhost".into();
        assert!(doctor(&cfg).is_err());
    }
}
