use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use mavlink::{
    common::{
        AttitudeTargetTypemask, MavAutopilot, MavCmd, MavFrame, MavMessage, MavModeFlag, MavResult, MavState,
        MavType, PositionTargetTypemask, COMMAND_ACK_DATA, COMMAND_LONG_DATA, HEARTBEAT_DATA,
        SET_ATTITUDE_TARGET_DATA, SET_POSITION_TARGET_LOCAL_NED_DATA,
    },
    MavConnection, MavHeader,
};
use offb_core::rate::Shutdown;
use offb_core::{FlightController, FlightMode};
use offb_proto::{ControlCommand, VehicleState};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::state::FcStatus;
use crate::{frame, px4, FcConfig};

/// Send half shared by the command side and the reader's heartbeat.
struct MavTx {
    conn: Box<dyn MavConnection<MavMessage> + Sync + Send>,
    sys_id: u8,
    comp_id: u8,
    sequence: AtomicU8,
}

impl MavTx {
    fn send(&self, msg: &MavMessage) -> Result<()> {
        let hdr = MavHeader {
            system_id: self.sys_id,
            component_id: self.comp_id,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        self.conn.send(&hdr, msg).context("mavlink send")?;
        Ok(())
    }
}

pub struct FcLink {
    tx: Arc<MavTx>,
    target_sys: u8,
    target_comp: u8,
    acks: Receiver<COMMAND_ACK_DATA>,
    ack_tx: Sender<COMMAND_ACK_DATA>,
    ack_timeout: Duration,
    heartbeat_interval: Duration,
    boot: Instant,
    status: Arc<Mutex<FcStatus>>,
}

fn status_lock(status: &Mutex<FcStatus>) -> std::sync::MutexGuard<'_, FcStatus> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FcLink {
    /// Serial connections are probed through tokio-serial first, so call this
    /// from inside a tokio runtime.
    pub fn open(cfg: &FcConfig) -> Result<Self> {
        let url = cfg.connection.as_str();
        if let Some(rest) = url.strip_prefix("serial:") {
            // quick validate device
            let (dev, baud) = rest.rsplit_once(':').context("serial connection must be serial:<dev>:<baud>")?;
            let baud: u32 = baud.parse().with_context(|| format!("bad baud rate in {}", url))?;
            let _ = tokio_serial::new(dev, baud)
                .open_native_async()
                .with_context(|| format!("open fc serial device {}", dev))?;
        }

        let conn = mavlink::connect::<MavMessage>(url).with_context(|| format!("mavlink connect {}", url))?;
        let (ack_tx, acks) = mpsc::channel();
        let status = FcStatus { connection: Some(url.to_string()), ..Default::default() };

        Ok(Self {
            tx: Arc::new(MavTx { conn, sys_id: cfg.sys_id, comp_id: cfg.comp_id, sequence: AtomicU8::new(0) }),
            target_sys: cfg.target_sys,
            target_comp: cfg.target_comp,
            acks,
            ack_tx,
            ack_timeout: cfg.ack_timeout(),
            heartbeat_interval: cfg.heartbeat_interval(),
            boot: Instant::now(),
            status: Arc::new(Mutex::new(status)),
        })
    }

    pub fn status(&self) -> Arc<Mutex<FcStatus>> {
        self.status.clone()
    }

    /// Receive side. Run it on a blocking thread; `recv` blocks until the
    /// next message arrives.
    pub fn reader<S>(&self, on_state: S) -> FcReader<S>
    where
        S: FnMut(VehicleState) + Send + 'static,
    {
        FcReader {
            tx: self.tx.clone(),
            target_sys: self.target_sys,
            acks: self.ack_tx.clone(),
            status: self.status.clone(),
            heartbeat_interval: self.heartbeat_interval,
            on_state,
        }
    }

    /// Block until the autopilot's first heartbeat. No timeout: without the
    /// autopilot there is nothing useful to do.
    pub fn wait_for_heartbeat(&self, shutdown: &Shutdown) -> Result<()> {
        let start = Instant::now();
        let mut next_note = Duration::from_secs(5);
        loop {
            if status_lock(&self.status).last_heartbeat.is_some() {
                info!("FC: heartbeat after {:?}", start.elapsed());
                return Ok(());
            }
            anyhow::ensure!(!shutdown.is_requested(), "shutdown while waiting for FC heartbeat");
            if start.elapsed() >= next_note {
                info!("FC: still waiting for autopilot heartbeat ({:?})", start.elapsed());
                next_note += Duration::from_secs(5);
            }
            std::thread::sleep(Duration::from_millis(25));
        }
    }

    fn time_boot_ms(&self) -> u32 {
        self.boot.elapsed().as_millis() as u32
    }

    /// Send a COMMAND_LONG and wait for its ack. `Ok(false)` on denial or
    /// ack timeout.
    fn command(&mut self, command: MavCmd, params: [f32; 7]) -> Result<bool> {
        // drop acks that arrived late for earlier requests
        while self.acks.try_recv().is_ok() {}

        let cmd = COMMAND_LONG_DATA {
            target_system: self.target_sys,
            target_component: self.target_comp,
            command,
            confirmation: 0,
            param1: params[0],
            param2: params[1],
            param3: params[2],
            param4: params[3],
            param5: params[4],
            param6: params[5],
            param7: params[6],
        };
        self.tx.send(&MavMessage::COMMAND_LONG(cmd))?;

        let deadline = Instant::now() + self.ack_timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.acks.recv_timeout(left) {
                Ok(ack) if ack.command == command => {
                    let accepted = ack.result == MavResult::MAV_RESULT_ACCEPTED;
                    if !accepted {
                        debug!("FC: {:?} -> {:?}", command, ack.result);
                        status_lock(&self.status).acks_denied += 1;
                    }
                    return Ok(accepted);
                }
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => {
                    debug!("FC: no ack for {:?} within {:?}", command, self.ack_timeout);
                    return Ok(false);
                }
                Err(RecvTimeoutError::Disconnected) => anyhow::bail!("FC reader stopped"),
            }
        }
    }

    fn setpoint_message(&self, cmd: &ControlCommand) -> MavMessage {
        let time_boot_ms = self.time_boot_ms();
        match *cmd {
            ControlCommand::Pose { position, orientation } => {
                let [x, y, z] = frame::position_to_ned(&position);
                let (_, _, yaw) = frame::orientation_to_ned(&orientation).euler_angles();
                MavMessage::SET_POSITION_TARGET_LOCAL_NED(SET_POSITION_TARGET_LOCAL_NED_DATA {
                    time_boot_ms,
                    target_system: self.target_sys,
                    target_component: self.target_comp,
                    coordinate_frame: MavFrame::MAV_FRAME_LOCAL_NED,
                    type_mask: PositionTargetTypemask::POSITION_TARGET_TYPEMASK_VX_IGNORE
                        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_VY_IGNORE
                        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_VZ_IGNORE
                        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AX_IGNORE
                        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AY_IGNORE
                        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AZ_IGNORE
                        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_YAW_RATE_IGNORE,
                    x,
                    y,
                    z,
                    yaw: yaw as f32,
                    ..Default::default()
                })
            }
            ControlCommand::Velocity { vx, vy, vz } => {
                let [vx, vy, vz] = frame::velocity_to_ned(vx, vy, vz);
                MavMessage::SET_POSITION_TARGET_LOCAL_NED(SET_POSITION_TARGET_LOCAL_NED_DATA {
                    time_boot_ms,
                    target_system: self.target_sys,
                    target_component: self.target_comp,
                    coordinate_frame: MavFrame::MAV_FRAME_LOCAL_NED,
                    type_mask: PositionTargetTypemask::POSITION_TARGET_TYPEMASK_X_IGNORE
                        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_Y_IGNORE
                        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_Z_IGNORE
                        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AX_IGNORE
                        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AY_IGNORE
                        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AZ_IGNORE
                        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_YAW_IGNORE
                        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_YAW_RATE_IGNORE,
                    vx,
                    vy,
                    vz,
                    ..Default::default()
                })
            }
            ControlCommand::Attitude { orientation, thrust, body_yaw_rate } => {
                MavMessage::SET_ATTITUDE_TARGET(SET_ATTITUDE_TARGET_DATA {
                    time_boot_ms,
                    target_system: self.target_sys,
                    target_component: self.target_comp,
                    // roll and pitch rates come from the attitude loop
                    type_mask: AttitudeTargetTypemask::ATTITUDE_TARGET_TYPEMASK_BODY_ROLL_RATE_IGNORE
                        | AttitudeTargetTypemask::ATTITUDE_TARGET_TYPEMASK_BODY_PITCH_RATE_IGNORE,
                    q: frame::to_mav_q(&frame::orientation_to_ned(&orientation)),
                    body_yaw_rate: frame::yaw_rate_to_frd(body_yaw_rate),
                    thrust: thrust as f32,
                    ..Default::default()
                })
            }
        }
    }
}

impl FlightController for FcLink {
    fn request_mode(&mut self, mode: FlightMode) -> bool {
        let (main, sub) = px4::mode_for(mode);
        let base = MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED.bits() as f32;
        self.command(MavCmd::MAV_CMD_DO_SET_MODE, [base, main as f32, sub as f32, 0.0, 0.0, 0.0, 0.0])
            .unwrap_or_else(|e| {
                warn!("FC: {} request failed: {:#}", mode, e);
                false
            })
    }

    fn request_arm(&mut self) -> bool {
        self.command(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])
            .unwrap_or_else(|e| {
                warn!("FC: arm request failed: {:#}", e);
                false
            })
    }

    fn publish(&mut self, cmd: &ControlCommand) -> Result<()> {
        let msg = self.setpoint_message(cmd);
        self.tx.send(&msg)
    }
}

pub struct FcReader<S> {
    tx: Arc<MavTx>,
    target_sys: u8,
    acks: Sender<COMMAND_ACK_DATA>,
    status: Arc<Mutex<FcStatus>>,
    heartbeat_interval: Duration,
    on_state: S,
}

impl<S: FnMut(VehicleState)> FcReader<S> {
    /// Read until shutdown, sending the companion heartbeat along the way.
    pub fn run(mut self, shutdown: Shutdown) {
        let mut last_hb_send: Option<Instant> = None;
        while !shutdown.is_requested() {
            if last_hb_send.map_or(true, |t| t.elapsed() >= self.heartbeat_interval) {
                if let Err(e) = self.tx.send(&companion_heartbeat()) {
                    debug!("FC: heartbeat send failed: {:#}", e);
                }
                last_hb_send = Some(Instant::now());
            }

            match self.tx.conn.recv() {
                Ok((hdr, msg)) => self.handle(&hdr, msg),
                Err(e) => {
                    debug!("FC: recv error: {:?}", e);
                    // Light sleep to avoid busy loop
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
        }
        debug!("FC: reader stopped");
    }

    fn handle(&mut self, hdr: &MavHeader, msg: MavMessage) {
        status_lock(&self.status).msgs_received += 1;
        match msg {
            MavMessage::HEARTBEAT(hb) if is_autopilot(hdr, &hb, self.target_sys) => {
                let state = decode_heartbeat(&hb);
                {
                    let mut st = status_lock(&self.status);
                    if st.last_heartbeat.is_none() {
                        info!("FC: autopilot up, mode={} armed={}", state.mode, state.armed);
                    }
                    st.connected = true;
                    st.last_heartbeat = Some(Instant::now());
                    st.armed = state.armed;
                    st.mode = Some(state.mode.clone());
                }
                (self.on_state)(state);
            }
            MavMessage::COMMAND_ACK(ack) => {
                // the link side may have gone away during shutdown
                let _ = self.acks.send(ack);
            }
            _ => {}
        }
    }
}

fn is_autopilot(hdr: &MavHeader, hb: &HEARTBEAT_DATA, target_sys: u8) -> bool {
    hdr.system_id == target_sys && hb.autopilot != MavAutopilot::MAV_AUTOPILOT_INVALID
}

pub fn decode_heartbeat(hb: &HEARTBEAT_DATA) -> VehicleState {
    VehicleState {
        armed: hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED),
        mode: px4::mode_name(hb.custom_mode),
    }
}

fn companion_heartbeat() -> MavMessage {
    MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_ONBOARD_CONTROLLER,
        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
        base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
        system_status: MavState::MAV_STATE_ACTIVE,
        mavlink_version: 3,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat(base_mode: MavModeFlag, custom_mode: u32) -> HEARTBEAT_DATA {
        HEARTBEAT_DATA {
            custom_mode,
            mavtype: MavType::MAV_TYPE_QUADROTOR,
            autopilot: MavAutopilot::MAV_AUTOPILOT_PX4,
            base_mode,
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        }
    }

    #[test]
    fn armed_offboard_heartbeat() {
        let hb = heartbeat(
            MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED | MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
            px4::join(6, 0),
        );
        assert_eq!(decode_heartbeat(&hb), VehicleState { armed: true, mode: "OFFBOARD".into() });
    }

    #[test]
    fn disarmed_landing_heartbeat() {
        let hb = heartbeat(MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED, px4::join(4, 6));
        assert_eq!(decode_heartbeat(&hb), VehicleState { armed: false, mode: "AUTO.LAND".into() });
    }

    #[test]
    fn own_heartbeats_are_not_the_autopilot() {
        let hdr = MavHeader { system_id: 1, component_id: 191, sequence: 0 };
        let MavMessage::HEARTBEAT(hb) = companion_heartbeat() else { unreachable!() };
        assert!(!is_autopilot(&hdr, &hb, 1));
    }
}
