//! Looper session management
//!
//! Drives the OSC link through its lifecycle:
//!
//! ```text
//! Disconnected -> Connecting -> AwaitingPingAck -> Live
//!       ^                                           |
//!       +------------- heartbeat lost --------------+
//! ```
//!
//! Liveness is a countdown reset by every message from the looper and
//! decremented on every tick. The looper also announces its loop count and
//! engine identity, which drive loop (re)discovery.

use std::fmt;

use tracing::{debug, info, warn};

use crate::leds::HEARTBEAT_SLOT;
use crate::loops::MAX_LOOPS;
use crate::midi::{CC_DISPLAY, CC_LED_OFF, CC_LED_ON};
use crate::osc::{fire, LooperCommand, LooperLink, RemoteInfo};
use crate::state::BridgeState;

/// Ticks without looper traffic before the countdown reaches zero
pub const DEFAULT_HEARTBEAT_BUDGET: i32 = 5;

/// Countdown value below which the session is considered lost
pub const DEFAULT_STALE_THRESHOLD: i32 = -5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    AwaitingPingAck,
    Live,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::AwaitingPingAck => "awaiting ping ack",
            LinkState::Live => "live",
        };
        f.write_str(name)
    }
}

/// Session with the looper
#[derive(Debug)]
pub struct SessionManager {
    state: LinkState,
    heartbeat: i32,
    budget: i32,
    stale_threshold: i32,
    engine_id: Option<i32>,
    remote: Option<RemoteInfo>,
    alive_led_on: bool,
    failed_attempts: u32,
    reconnects: u32,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_BUDGET, DEFAULT_STALE_THRESHOLD)
    }
}

impl SessionManager {
    pub fn new(budget: i32, stale_threshold: i32) -> Self {
        Self {
            state: LinkState::Disconnected,
            heartbeat: budget,
            budget,
            stale_threshold,
            engine_id: None,
            remote: None,
            alive_led_on: false,
            failed_attempts: 0,
            reconnects: 0,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn heartbeat(&self) -> i32 {
        self.heartbeat
    }

    pub fn engine_id(&self) -> Option<i32> {
        self.engine_id
    }

    /// Number of times the session was lost and re-established
    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }

    /// Advance the session by one tick
    pub fn tick(&mut self, link: &mut dyn LooperLink, st: &mut BridgeState) {
        match self.state {
            LinkState::Disconnected => {
                self.set_state(LinkState::Connecting);
            }

            LinkState::Connecting => match link.open() {
                Ok(()) => {
                    if self.failed_attempts > 0 {
                        info!("OSC link opened after {} failed attempts", self.failed_attempts);
                    }
                    self.failed_attempts = 0;
                    self.heartbeat = self.budget;
                    self.set_state(LinkState::AwaitingPingAck);
                    fire(link, LooperCommand::Ping);
                }
                Err(e) => {
                    self.failed_attempts += 1;
                    if self.failed_attempts == 1 || self.failed_attempts % 25 == 0 {
                        warn!("Cannot open OSC link (attempt {}): {:#}", self.failed_attempts, e);
                    } else {
                        debug!("Cannot open OSC link: {:#}", e);
                    }
                }
            },

            LinkState::AwaitingPingAck | LinkState::Live => {
                self.heartbeat -= 1;
                if self.heartbeat < self.stale_threshold {
                    self.lose(link, st);
                    return;
                }
                if self.state == LinkState::Live {
                    self.toggle_alive_led(st);
                }
            }
        }
    }

    /// Any message from the looper proves it is alive
    pub fn on_traffic(&mut self) {
        self.heartbeat = self.budget;
    }

    /// Handshake reply: discover every loop and go live
    pub fn on_ping_ack(&mut self, info: RemoteInfo, link: &mut dyn LooperLink, st: &mut BridgeState) {
        self.on_traffic();
        if self.state == LinkState::Disconnected || self.state == LinkState::Connecting {
            debug!("Ignoring /pingack while {}", self.state);
            return;
        }

        info!(
            "Looper {} (version {}) answered: {} loops, engine {}",
            info.url, info.version, info.loop_count, info.engine_id
        );
        self.sync_all(info.loop_count, link, st);
        self.engine_id = Some(info.engine_id);
        self.remote = Some(info);
        self.set_state(LinkState::Live);
    }

    /// Periodic announcement: detect engine restarts and new loops
    pub fn on_heartbeat(&mut self, info: RemoteInfo, link: &mut dyn LooperLink, st: &mut BridgeState) {
        self.on_traffic();
        if self.state == LinkState::Disconnected || self.state == LinkState::Connecting {
            debug!("Ignoring /heartbeat while {}", self.state);
            return;
        }

        if self.engine_id != Some(info.engine_id) {
            if info.loop_count > 0 {
                info!(
                    "Looper engine changed ({:?} -> {}), rediscovering {} loops",
                    self.engine_id, info.engine_id, info.loop_count
                );
                self.sync_all(info.loop_count, link, st);
                self.engine_id = Some(info.engine_id);
                self.set_state(LinkState::Live);
            }
        } else if info.loop_count.min(MAX_LOOPS) > st.loops.len() {
            let added = st.extend_to(info.loop_count);
            if !added.is_empty() {
                info!("Looper grew to {} loops", st.loops.len());
            }
            for index in added {
                fire(link, LooperCommand::RegisterAutoUpdate(index));
                fire(link, LooperCommand::GetState(index));
            }
            fire(link, LooperCommand::GetSelectedLoop);
            st.refresh();
        }

        self.remote = Some(info);
    }

    /// Unregister from the looper, switch every LED off and close the link
    pub fn shutdown(&mut self, link: &mut dyn LooperLink, st: &mut BridgeState) {
        if link.is_open() {
            for index in 0..st.loops.len() {
                fire(link, LooperCommand::UnregisterAutoUpdate(index));
            }
            fire(link, LooperCommand::UnregisterGlobalUpdate);
        }

        st.leds.all_off();
        st.leds.send_control(CC_LED_OFF, HEARTBEAT_SLOT);
        st.leds.send_control(CC_DISPLAY, 0);
        self.alive_led_on = false;

        link.close();
        self.engine_id = None;
        self.set_state(LinkState::Disconnected);
    }

    /// Rebuild every loop and register for their updates
    fn sync_all(&mut self, count: usize, link: &mut dyn LooperLink, st: &mut BridgeState) {
        let count = st.rebuild(count);
        for index in 0..count {
            fire(link, LooperCommand::RegisterAutoUpdate(index));
        }
        fire(link, LooperCommand::RegisterGlobalUpdate);
        for index in 0..count {
            fire(link, LooperCommand::GetState(index));
        }
        fire(link, LooperCommand::GetSelectedLoop);
    }

    fn lose(&mut self, link: &mut dyn LooperLink, st: &mut BridgeState) {
        let looper = self
            .remote
            .take()
            .map(|remote| remote.url)
            .unwrap_or_else(|| "looper".to_string());
        warn!(
            "No news from {} for {} ticks, reconnecting",
            looper,
            self.budget - self.heartbeat
        );
        link.close();
        if self.alive_led_on {
            st.leds.send_control(CC_LED_OFF, HEARTBEAT_SLOT);
            self.alive_led_on = false;
        }
        self.engine_id = None;
        self.heartbeat = self.budget;
        self.reconnects += 1;
        self.set_state(LinkState::Disconnected);
    }

    fn toggle_alive_led(&mut self, st: &mut BridgeState) {
        self.alive_led_on = !self.alive_led_on;
        let cc = if self.alive_led_on { CC_LED_ON } else { CC_LED_OFF };
        st.leds.send_control(cc, HEARTBEAT_SLOT);
    }

    fn set_state(&mut self, state: LinkState) {
        if self.state != state {
            debug!("Session {} -> {}", self.state, state);
            self.state = state;
        }
    }
}
