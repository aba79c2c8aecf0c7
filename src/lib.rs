//! Pedal Bridge - FCB1010 foot controller to SooperLooper over OSC
//!
//! Pedal presses become looper commands; looper state comes back as LED
//! patterns on the controller.

pub mod bridge;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod leds;
pub mod loops;
pub mod midi;
pub mod osc;
pub mod pedal;
pub mod session;
pub mod state;

pub use bridge::{Bridge, BridgeEvent};
pub use config::AppConfig;
