//! Outbound looper commands
//!
//! Everything the bridge asks of the looper, as one enum. The transport turns
//! a command into an OSC message, filling in its own reply address.

use std::fmt;

use rosc::{OscMessage, OscType};

use crate::pedal::Phase;

/// Path the looper sends requested control values back to
pub const CTRL_PATH: &str = "/ctrl";

/// Path the looper answers pings on
pub const PINGACK_PATH: &str = "/pingack";

/// Auto-update interval requested from the looper, in milliseconds
pub const AUTO_UPDATE_INTERVAL_MS: i32 = 100;

/// Loop addressed by a down/up action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every loop (`/sl/-1/...`)
    All,
    Loop(usize),
}

impl Target {
    fn wire_index(self) -> i64 {
        match self {
            Target::All => -1,
            Target::Loop(index) => index as i64,
        }
    }
}

/// Down/up actions understood by the looper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Record,
    Overdub,
    Multiply,
    Replace,
    Insert,
    Substitute,
    Mute,
    Undo,
    UndoAll,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Record => "record",
            Action::Overdub => "overdub",
            Action::Multiply => "multiply",
            Action::Replace => "replace",
            Action::Insert => "insert",
            Action::Substitute => "substitute",
            Action::Mute => "mute",
            Action::Undo => "undo",
            Action::UndoAll => "undo_all",
        }
    }
}

/// One-shot actions sent to all loops through `/sl/-1/hit`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hit {
    Trigger,
    MuteOn,
    MuteOff,
}

impl Hit {
    pub fn as_str(self) -> &'static str {
        match self {
            Hit::Trigger => "trigger",
            Hit::MuteOn => "mute_on",
            Hit::MuteOff => "mute_off",
        }
    }
}

/// A command for the looper
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LooperCommand {
    Action {
        target: Target,
        phase: Phase,
        action: Action,
    },
    Hit(Hit),
    SelectLoop(usize),
    GetState(usize),
    GetSelectedLoop,
    RegisterAutoUpdate(usize),
    UnregisterAutoUpdate(usize),
    RegisterGlobalUpdate,
    UnregisterGlobalUpdate,
    Ping,
}

impl LooperCommand {
    pub fn action(target: Target, phase: Phase, action: Action) -> Self {
        LooperCommand::Action { target, phase, action }
    }

    /// OSC address of the command
    pub fn address(&self) -> String {
        match self {
            LooperCommand::Action { target, phase, .. } => {
                format!("/sl/{}/{}", target.wire_index(), phase.as_str())
            }
            LooperCommand::Hit(_) => "/sl/-1/hit".to_string(),
            LooperCommand::SelectLoop(_) => "/set".to_string(),
            LooperCommand::GetState(index) => format!("/sl/{}/get", index),
            LooperCommand::GetSelectedLoop => "/get".to_string(),
            LooperCommand::RegisterAutoUpdate(index) => {
                format!("/sl/{}/register_auto_update", index)
            }
            LooperCommand::UnregisterAutoUpdate(index) => {
                format!("/sl/{}/unregister_auto_update", index)
            }
            LooperCommand::RegisterGlobalUpdate => "/register_update".to_string(),
            LooperCommand::UnregisterGlobalUpdate => "/unregister_update".to_string(),
            LooperCommand::Ping => "/ping".to_string(),
        }
    }

    /// Build the OSC message, using `reply_url` wherever the looper needs to answer
    pub fn to_osc(&self, reply_url: &str) -> OscMessage {
        let text = |s: &str| OscType::String(s.to_string());
        let reply = || vec![text(reply_url), text(CTRL_PATH)];

        let args = match self {
            LooperCommand::Action { action, .. } => vec![text(action.as_str())],
            LooperCommand::Hit(hit) => vec![text(hit.as_str())],
            LooperCommand::SelectLoop(index) => {
                vec![text("selected_loop_num"), OscType::Int(*index as i32)]
            }
            LooperCommand::GetState(_) => {
                let mut args = vec![text("state")];
                args.extend(reply());
                args
            }
            LooperCommand::GetSelectedLoop
            | LooperCommand::RegisterGlobalUpdate
            | LooperCommand::UnregisterGlobalUpdate => {
                let mut args = vec![text("selected_loop_num")];
                args.extend(reply());
                args
            }
            LooperCommand::RegisterAutoUpdate(_) | LooperCommand::UnregisterAutoUpdate(_) => {
                let mut args = vec![text("state"), OscType::Int(AUTO_UPDATE_INTERVAL_MS)];
                args.extend(reply());
                args
            }
            LooperCommand::Ping => vec![text(reply_url), text(PINGACK_PATH)],
        };

        OscMessage {
            addr: self.address(),
            args,
        }
    }
}

impl fmt::Display for LooperCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LooperCommand::Action { action, .. } => {
                write!(f, "{} {}", self.address(), action.as_str())
            }
            LooperCommand::Hit(hit) => write!(f, "{} {}", self.address(), hit.as_str()),
            LooperCommand::SelectLoop(index) => {
                write!(f, "{} selected_loop_num {}", self.address(), index)
            }
            other => write!(f, "{}", other.address()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "osc.udp://localhost:9000/";

    #[test]
    fn test_action_on_loop() {
        let cmd = LooperCommand::action(Target::Loop(1), Phase::Down, Action::Overdub);
        let msg = cmd.to_osc(URL);

        assert_eq!(msg.addr, "/sl/1/down");
        assert_eq!(msg.args, vec![OscType::String("overdub".into())]);
        assert_eq!(cmd.to_string(), "/sl/1/down overdub");
    }

    #[test]
    fn test_action_on_all_loops() {
        let cmd = LooperCommand::action(Target::All, Phase::Up, Action::UndoAll);
        assert_eq!(cmd.to_string(), "/sl/-1/up undo_all");
    }

    #[test]
    fn test_hit() {
        assert_eq!(LooperCommand::Hit(Hit::MuteOff).to_string(), "/sl/-1/hit mute_off");
    }

    #[test]
    fn test_select_loop() {
        let msg = LooperCommand::SelectLoop(2).to_osc(URL);
        assert_eq!(msg.addr, "/set");
        assert_eq!(
            msg.args,
            vec![OscType::String("selected_loop_num".into()), OscType::Int(2)]
        );
    }

    #[test]
    fn test_register_auto_update_carries_interval_and_reply() {
        let msg = LooperCommand::RegisterAutoUpdate(3).to_osc(URL);
        assert_eq!(msg.addr, "/sl/3/register_auto_update");
        assert_eq!(
            msg.args,
            vec![
                OscType::String("state".into()),
                OscType::Int(100),
                OscType::String(URL.into()),
                OscType::String("/ctrl".into()),
            ]
        );
    }

    #[test]
    fn test_get_state_and_selection() {
        let msg = LooperCommand::GetState(0).to_osc(URL);
        assert_eq!(msg.addr, "/sl/0/get");
        assert_eq!(msg.args.len(), 3);

        let msg = LooperCommand::GetSelectedLoop.to_osc(URL);
        assert_eq!(msg.addr, "/get");
        assert_eq!(msg.args[0], OscType::String("selected_loop_num".into()));

        let msg = LooperCommand::UnregisterGlobalUpdate.to_osc(URL);
        assert_eq!(msg.addr, "/unregister_update");
    }

    #[test]
    fn test_ping() {
        let msg = LooperCommand::Ping.to_osc(URL);
        assert_eq!(msg.addr, "/ping");
        assert_eq!(
            msg.args,
            vec![OscType::String(URL.into()), OscType::String("/pingack".into())]
        );
    }
}
