//! Inbound OSC decoding
//!
//! Every message is decoded once into an [`Inbound`] value; handlers then
//! match on the variant instead of re-inspecting addresses and arguments.

use rosc::{OscMessage, OscType};
use thiserror::Error;

use crate::loops::LoopState;

/// Loop index used by the looper for global control updates
const GLOBAL_INDEX: i32 = -2;

/// Errors raised while decoding an inbound message
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("unknown address '{0}'")]
    UnknownAddress(String),

    #[error("'{addr}' expects {expected} arguments, got {got}")]
    ArgCount {
        addr: String,
        expected: usize,
        got: usize,
    },

    #[error("'{addr}' argument {index} should be {expected}")]
    ArgType {
        addr: String,
        index: usize,
        expected: &'static str,
    },

    #[error("'{addr}' carries out-of-range value {value}")]
    OutOfRange { addr: String, value: i64 },

    #[error("'{addr}' argument {index} is not a finite number")]
    NotFinite { addr: String, index: usize },
}

/// Identity announced by the looper in `/pingack` and `/heartbeat`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInfo {
    pub url: String,
    pub version: String,
    pub loop_count: usize,
    pub engine_id: i32,
}

/// Where a diagnostic reply should go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTarget {
    pub host: String,
    pub port: u16,
    pub path: String,
}

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    PingAck(RemoteInfo),
    Heartbeat(RemoteInfo),
    /// Selected loop reported by the looper, `-1` for none
    SelectedLoop(i32),
    LoopState { index: usize, state: LoopState },
    /// Well-formed looper traffic the bridge does not act on
    Ignored,
    Ping(ReplyTarget),
    Leds(ReplyTarget),
    Display(ReplyTarget),
    RegisterMonitor { host: String, port: u16 },
    UnregisterMonitor { host: String, port: u16 },
}

impl Inbound {
    /// True for messages that originate from the looper itself
    pub fn is_looper_traffic(&self) -> bool {
        matches!(
            self,
            Inbound::PingAck(_)
                | Inbound::Heartbeat(_)
                | Inbound::SelectedLoop(_)
                | Inbound::LoopState { .. }
                | Inbound::Ignored
        )
    }

    /// Decode a message. `prefix` is the diagnostic namespace, e.g. `loop4r`.
    pub fn decode(msg: &OscMessage, prefix: &str) -> Result<Self, DecodeError> {
        let addr = msg.addr.as_str();
        let args = Args { addr, args: &msg.args };

        match addr {
            "/pingack" => Ok(Inbound::PingAck(args.remote_info()?)),
            "/heartbeat" => Ok(Inbound::Heartbeat(args.remote_info()?)),
            "/ctrl" => decode_ctrl(&args),
            _ => {
                let command = addr
                    .strip_prefix('/')
                    .and_then(|rest| rest.strip_prefix(prefix))
                    .and_then(|rest| rest.strip_prefix('/'))
                    .ok_or_else(|| DecodeError::UnknownAddress(addr.to_string()))?;

                match command {
                    "ping" => Ok(Inbound::Ping(args.reply_target()?)),
                    "leds" => Ok(Inbound::Leds(args.reply_target()?)),
                    "display" => Ok(Inbound::Display(args.reply_target()?)),
                    "register_auto_update" => {
                        let (host, port) = args.host_port()?;
                        Ok(Inbound::RegisterMonitor { host, port })
                    }
                    "unregister_auto_update" => {
                        let (host, port) = args.host_port()?;
                        Ok(Inbound::UnregisterMonitor { host, port })
                    }
                    _ => Err(DecodeError::UnknownAddress(addr.to_string())),
                }
            }
        }
    }
}

fn decode_ctrl(args: &Args<'_>) -> Result<Inbound, DecodeError> {
    args.at_least(3)?;
    let index = args.int(0)?;
    let control = args.string(1)?;
    let value = args.float(2)?;

    match index {
        GLOBAL_INDEX if control == "selected_loop_num" => {
            if !value.is_finite() {
                return Err(DecodeError::NotFinite {
                    addr: args.addr.to_string(),
                    index: 2,
                });
            }
            Ok(Inbound::SelectedLoop(value as i32))
        }
        i if i >= 0 && control == "state" => Ok(Inbound::LoopState {
            index: i as usize,
            state: LoopState::from_float(value),
        }),
        _ => Ok(Inbound::Ignored),
    }
}

/// Typed access to message arguments
struct Args<'a> {
    addr: &'a str,
    args: &'a [OscType],
}

impl<'a> Args<'a> {
    fn at_least(&self, expected: usize) -> Result<(), DecodeError> {
        if self.args.len() < expected {
            return Err(DecodeError::ArgCount {
                addr: self.addr.to_string(),
                expected,
                got: self.args.len(),
            });
        }
        Ok(())
    }

    fn type_error(&self, index: usize, expected: &'static str) -> DecodeError {
        DecodeError::ArgType {
            addr: self.addr.to_string(),
            index,
            expected,
        }
    }

    fn string(&self, index: usize) -> Result<&'a str, DecodeError> {
        match self.args.get(index) {
            Some(OscType::String(s)) => Ok(s.as_str()),
            _ => Err(self.type_error(index, "a string")),
        }
    }

    fn int(&self, index: usize) -> Result<i32, DecodeError> {
        match self.args.get(index) {
            Some(OscType::Int(i)) => Ok(*i),
            _ => Err(self.type_error(index, "an int32")),
        }
    }

    fn float(&self, index: usize) -> Result<f32, DecodeError> {
        match self.args.get(index) {
            Some(OscType::Float(f)) => Ok(*f),
            Some(OscType::Double(d)) => Ok(*d as f32),
            Some(OscType::Int(i)) => Ok(*i as f32),
            _ => Err(self.type_error(index, "a float32")),
        }
    }

    fn port(&self, index: usize) -> Result<u16, DecodeError> {
        let value = self.int(index)?;
        u16::try_from(value)
            .ok()
            .filter(|port| *port > 0)
            .ok_or(DecodeError::OutOfRange {
                addr: self.addr.to_string(),
                value: value as i64,
            })
    }

    fn remote_info(&self) -> Result<RemoteInfo, DecodeError> {
        self.at_least(4)?;
        let loop_count = self.int(2)?;
        Ok(RemoteInfo {
            url: self.string(0)?.to_string(),
            version: self.string(1)?.to_string(),
            loop_count: loop_count.max(0) as usize,
            engine_id: self.int(3)?,
        })
    }

    fn host_port(&self) -> Result<(String, u16), DecodeError> {
        self.at_least(2)?;
        Ok((self.string(0)?.to_string(), self.port(1)?))
    }

    fn reply_target(&self) -> Result<ReplyTarget, DecodeError> {
        self.at_least(3)?;
        let (host, port) = self.host_port()?;
        Ok(ReplyTarget {
            host,
            port,
            path: self.string(2)?.to_string(),
        })
    }
}
