//! Bridge - composition root of the pedal bridge
//!
//! All events (ticks, controller input, OSC messages) arrive on one channel
//! and are handled here one at a time. The bridge owns every piece of mutable
//! state, so handlers run to completion without locking:
//! - Controller bytes are decoded into pedal events and dispatched
//! - OSC messages are decoded once and routed to the session or the loops
//! - Ticks drive the session, blink timers and controller hot-plug
//!
//! Every handled event ends with a flush of the queued LED writes to the
//! controller and, when a monitor is attached, to the monitor.

use rosc::{OscMessage, OscType};
use tracing::{debug, info, trace, warn};

use crate::config::AppConfig;
use crate::controller::ControllerPort;
use crate::dispatch::dispatch;
use crate::leds::{LedSnapshot, NUM_LEDS};
use crate::midi::{format_hex, MidiMessage};
use crate::osc::{Inbound, LooperLink, ReplyTarget};
use crate::pedal::PedalEvent;
use crate::session::{LinkState, SessionManager};
use crate::state::BridgeState;

#[cfg(test)]
mod tests;

/// Ticks between controller presence checks
const CONTROLLER_POLL_TICKS: u64 = 5;

/// Path of LED updates sent to a monitor
const LED_PATH: &str = "/led";

/// Path of selected-loop updates sent to a monitor
const DISPLAY_PATH: &str = "/display";

/// An event for the bridge
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    Tick,
    /// Raw bytes from the controller
    Controller(Vec<u8>),
    Osc(OscMessage),
}

/// Listener mirroring the LED panel
#[derive(Debug, Clone, PartialEq, Eq)]
struct Monitor {
    host: String,
    port: u16,
}

pub struct Bridge<L: LooperLink, C: ControllerPort> {
    state: BridgeState,
    session: SessionManager,
    link: L,
    controller: C,
    prefix: String,
    monitor: Option<Monitor>,
    ticks: u64,
}

impl<L: LooperLink, C: ControllerPort> Bridge<L, C> {
    pub fn new(link: L, controller: C, config: &AppConfig) -> Self {
        Self {
            state: BridgeState::new(),
            session: SessionManager::new(
                config.bridge.heartbeat_budget,
                config.bridge.stale_threshold,
            ),
            link,
            controller,
            prefix: config.osc.prefix.clone(),
            monitor: None,
            ticks: 0,
        }
    }

    pub fn state(&self) -> &BridgeState {
        &self.state
    }

    pub fn link_state(&self) -> LinkState {
        self.session.state()
    }

    /// Handle one event to completion
    pub fn handle(&mut self, event: BridgeEvent) {
        match event {
            BridgeEvent::Tick => self.on_tick(),
            BridgeEvent::Controller(bytes) => self.on_controller(&bytes),
            BridgeEvent::Osc(msg) => self.on_osc(msg),
        }
        self.flush();
    }

    /// Leave the looper and darken the controller
    pub fn shutdown(&mut self) {
        info!("Shutting down bridge");
        self.session.shutdown(&mut self.link, &mut self.state);
        self.monitor = None;
        self.state.leds.detach_monitor();
        self.state.leds.flush(&mut self.controller);
    }

    fn on_tick(&mut self) {
        if self.ticks % CONTROLLER_POLL_TICKS == 0 && self.controller.poll() {
            info!("Controller output ready, resetting LEDs");
            self.state.leds.all_off();
            self.state.redraw();
        }
        self.ticks = self.ticks.wrapping_add(1);

        self.session.tick(&mut self.link, &mut self.state);
        self.state.leds.tick();
    }

    fn on_controller(&mut self, bytes: &[u8]) {
        let Some(message) = MidiMessage::parse(bytes) else {
            debug!("Unparseable controller input: {}", format_hex(bytes));
            return;
        };

        match PedalEvent::from_message(&message) {
            Some(event) => dispatch(event, &mut self.state, &mut self.link),
            None => trace!("Ignoring controller message {}", message),
        }
    }

    fn on_osc(&mut self, msg: OscMessage) {
        let inbound = match Inbound::decode(&msg, &self.prefix) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!("Dropping OSC message: {}", e);
                return;
            }
        };

        if inbound.is_looper_traffic() {
            self.session.on_traffic();
        }

        match inbound {
            Inbound::PingAck(info) => {
                self.session.on_ping_ack(info, &mut self.link, &mut self.state);
            }
            Inbound::Heartbeat(info) => {
                self.session.on_heartbeat(info, &mut self.link, &mut self.state);
            }
            Inbound::LoopState { index, state } => {
                self.state.apply_state(index, state);
            }
            Inbound::SelectedLoop(raw) => {
                if self.state.apply_selection_report(raw) {
                    if let Some(monitor) = self.monitor.clone() {
                        self.send(&monitor.host, monitor.port, self.display_message(DISPLAY_PATH));
                    }
                }
            }
            Inbound::Ignored => {}
            Inbound::Ping(target) => self.reply_ping(&target),
            Inbound::Leds(target) => {
                for snapshot in self.state.leds.snapshot() {
                    self.send(&target.host, target.port, led_message(&target.path, &snapshot));
                }
            }
            Inbound::Display(target) => {
                self.send(&target.host, target.port, self.display_message(DISPLAY_PATH));
            }
            Inbound::RegisterMonitor { host, port } => {
                info!("LED monitor attached at {}:{}", host, port);
                self.monitor = Some(Monitor { host, port });
                self.state.leds.attach_monitor();
            }
            Inbound::UnregisterMonitor { host, port } => {
                if self.monitor.as_ref() == Some(&Monitor { host: host.clone(), port }) {
                    info!("LED monitor at {}:{} detached", host, port);
                    self.monitor = None;
                    self.state.leds.detach_monitor();
                } else {
                    debug!("No LED monitor registered at {}:{}", host, port);
                }
            }
        }
    }

    fn reply_ping(&mut self, target: &ReplyTarget) {
        let msg = OscMessage {
            addr: target.path.clone(),
            args: vec![
                OscType::String(self.link.reply_url()),
                OscType::String(env!("CARGO_PKG_VERSION").to_string()),
                OscType::Int(NUM_LEDS as i32),
                OscType::Int(std::process::id() as i32),
            ],
        };
        self.send(&target.host, target.port, msg);
    }

    fn display_message(&self, path: &str) -> OscMessage {
        let selected = self.state.selected.map(|index| index as i32).unwrap_or(-1);
        OscMessage {
            addr: path.to_string(),
            args: vec![OscType::Int(selected)],
        }
    }

    fn send(&mut self, host: &str, port: u16, msg: OscMessage) {
        let path = msg.addr.clone();
        if let Err(e) = self.link.send_to(host, port, msg) {
            debug!("Could not send {} to {}:{}: {:#}", path, host, port, e);
        }
    }

    fn flush(&mut self) {
        if self.controller.is_connected() {
            self.state.leds.flush(&mut self.controller);
        } else {
            let dropped = self.state.leds.take_writes();
            if !dropped.is_empty() {
                trace!("Controller offline, dropped {} LED writes", dropped.len());
            }
        }

        let snapshots = self.state.leds.take_snapshots();
        if let Some(monitor) = self.monitor.clone() {
            for snapshot in snapshots {
                self.send(&monitor.host, monitor.port, led_message(LED_PATH, &snapshot));
            }
        }
    }
}

fn led_message(path: &str, led: &LedSnapshot) -> OscMessage {
    OscMessage {
        addr: path.to_string(),
        args: vec![
            OscType::Int(led.index as i32),
            OscType::Int(led.on as i32),
            OscType::Int(led.timer as i32),
            OscType::Int(led.pattern.code()),
        ],
    }
}
