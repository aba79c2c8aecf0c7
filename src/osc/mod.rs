//! OSC side of the bridge
//!
//! - `command`: outbound looper commands and their wire form
//! - `inbound`: decoding of looper replies and diagnostic requests
//! - `link`: the UDP transport

pub mod command;
pub mod inbound;
pub mod link;

pub use command::{Action, Hit, LooperCommand, Target};
pub use inbound::{DecodeError, Inbound, RemoteInfo, ReplyTarget};
pub use link::{fire, InboundCallback, LooperLink, UdpLink};
