//! Behringer FCB1010 driver
//!
//! Handles MIDI communication with the foot controller. Ports are matched by
//! case-insensitive substring and re-checked periodically, so the controller
//! can be unplugged and plugged back in while the bridge runs.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use tracing::{debug, info, warn};

use crate::leds::ControllerWrite;
use crate::midi::format_hex;

/// Callback receiving raw bytes from the controller
pub type InputCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// The controller as seen by the bridge
pub trait ControllerPort: ControllerWrite {
    /// Check the device, opening or dropping ports as it comes and goes.
    ///
    /// Returns true when the output port was (re)opened, so the caller can
    /// reset the LEDs.
    fn poll(&mut self) -> bool;

    fn is_connected(&self) -> bool;
}

/// Case-insensitive substring match
fn matches_pattern(name: &str, pattern: &str) -> bool {
    name.to_lowercase().contains(&pattern.to_lowercase())
}

/// FCB1010 connected through midir
pub struct Fcb1010 {
    input_conn: Option<MidiInputConnection<()>>,
    output_conn: Option<MidiOutputConnection>,

    /// Name of the connected input port
    input_name: Option<String>,
    /// Name of the connected output port
    output_name: Option<String>,

    input_port_name: String,
    output_port_name: String,

    on_input: InputCallback,
}

impl Fcb1010 {
    /// Create the driver. Fails only when no MIDI client can be created.
    pub fn new(
        input_port_name: impl Into<String>,
        output_port_name: impl Into<String>,
        on_input: InputCallback,
    ) -> Result<Self> {
        MidiInput::new("Pedal-Bridge-Probe").context("Failed to create MIDI input client")?;
        MidiOutput::new("Pedal-Bridge-Probe").context("Failed to create MIDI output client")?;

        Ok(Self {
            input_conn: None,
            output_conn: None,
            input_name: None,
            output_name: None,
            input_port_name: input_port_name.into(),
            output_port_name: output_port_name.into(),
            on_input,
        })
    }

    fn find_input_port(
        midi_in: &MidiInput,
        pattern: &str,
    ) -> Option<(midir::MidiInputPort, String)> {
        for port in midi_in.ports() {
            if let Ok(name) = midi_in.port_name(&port) {
                if matches_pattern(&name, pattern) {
                    debug!("Found port '{}' matching pattern '{}'", name, pattern);
                    return Some((port, name));
                }
            }
        }
        None
    }

    fn find_output_port(
        midi_out: &MidiOutput,
        pattern: &str,
    ) -> Option<(midir::MidiOutputPort, String)> {
        for port in midi_out.ports() {
            if let Ok(name) = midi_out.port_name(&port) {
                if matches_pattern(&name, pattern) {
                    debug!("Found port '{}' matching pattern '{}'", name, pattern);
                    return Some((port, name));
                }
            }
        }
        None
    }

    fn connect_input(&mut self) -> Result<()> {
        let midi_in = MidiInput::new("Pedal-Bridge-Input").context("Failed to create MIDI input")?;

        let (port, name) = Self::find_input_port(&midi_in, &self.input_port_name)
            .ok_or_else(|| anyhow!("Input port '{}' not found", self.input_port_name))?;

        let on_input = Arc::clone(&self.on_input);
        let conn = midi_in
            .connect(
                &port,
                "Pedal-Bridge",
                move |_timestamp, data, _| {
                    on_input(data);
                },
                (),
            )
            .map_err(|e| anyhow!("Failed to connect to input port '{}': {}", name, e))?;

        info!("Controller input connected: {}", name);
        self.input_conn = Some(conn);
        self.input_name = Some(name);
        Ok(())
    }

    fn connect_output(&mut self) -> Result<()> {
        let midi_out =
            MidiOutput::new("Pedal-Bridge-Output").context("Failed to create MIDI output")?;

        let (port, name) = Self::find_output_port(&midi_out, &self.output_port_name)
            .ok_or_else(|| anyhow!("Output port '{}' not found", self.output_port_name))?;

        let conn = midi_out
            .connect(&port, "Pedal-Bridge")
            .map_err(|e| anyhow!("Failed to connect to output port '{}': {}", name, e))?;

        info!("Controller output connected: {}", name);
        self.output_conn = Some(conn);
        self.output_name = Some(name);
        Ok(())
    }

    /// True when a port with exactly this name is still listed
    fn input_present(name: &str) -> bool {
        MidiInput::new("Pedal-Bridge-Scanner")
            .map(|midi_in| {
                midi_in
                    .ports()
                    .iter()
                    .any(|port| midi_in.port_name(port).is_ok_and(|n| n == name))
            })
            .unwrap_or(true)
    }

    fn output_present(name: &str) -> bool {
        MidiOutput::new("Pedal-Bridge-Scanner")
            .map(|midi_out| {
                midi_out
                    .ports()
                    .iter()
                    .any(|port| midi_out.port_name(port).is_ok_and(|n| n == name))
            })
            .unwrap_or(true)
    }

    /// Drop both connections
    pub fn disconnect(&mut self) {
        self.input_conn = None;
        self.output_conn = None;
        self.input_name = None;
        self.output_name = None;
        info!("Controller disconnected");
    }
}

impl ControllerWrite for Fcb1010 {
    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let conn = self
            .output_conn
            .as_mut()
            .ok_or_else(|| anyhow!("Controller output is not connected"))?;

        conn.send(bytes)
            .map_err(|e| anyhow!("Failed to send {}: {}", format_hex(bytes), e))?;
        Ok(bytes.len())
    }
}

impl ControllerPort for Fcb1010 {
    fn poll(&mut self) -> bool {
        if let Some(name) = self.input_name.clone() {
            if !Self::input_present(&name) {
                warn!("Controller input '{}' vanished", name);
                self.input_conn = None;
                self.input_name = None;
            }
        }
        if self.input_conn.is_none() {
            if let Err(e) = self.connect_input() {
                debug!("{:#}", e);
            }
        }

        if let Some(name) = self.output_name.clone() {
            if !Self::output_present(&name) {
                warn!("Controller output '{}' vanished", name);
                self.output_conn = None;
                self.output_name = None;
            }
        }
        if self.output_conn.is_none() {
            return match self.connect_output() {
                Ok(()) => true,
                Err(e) => {
                    debug!("{:#}", e);
                    false
                }
            };
        }

        false
    }

    fn is_connected(&self) -> bool {
        self.input_conn.is_some() && self.output_conn.is_some()
    }
}

/// Port discovery utilities
pub mod discovery {
    use super::*;
    use colored::*;

    /// Information about a MIDI port
    #[derive(Debug, Clone)]
    pub struct PortInfo {
        pub index: usize,
        pub name: String,
        pub is_virtual: bool,
    }

    fn is_virtual(name: &str) -> bool {
        name.contains("Virtual") || name.contains("Midi Through") || name.contains("IAC")
    }

    pub fn discover_input_ports() -> Result<Vec<PortInfo>> {
        let midi_in = MidiInput::new("Pedal-Bridge-Discovery")?;

        let mut port_infos = Vec::new();
        for (index, port) in midi_in.ports().iter().enumerate() {
            if let Ok(name) = midi_in.port_name(port) {
                port_infos.push(PortInfo {
                    index,
                    is_virtual: is_virtual(&name),
                    name,
                });
            }
        }

        Ok(port_infos)
    }

    pub fn discover_output_ports() -> Result<Vec<PortInfo>> {
        let midi_out = MidiOutput::new("Pedal-Bridge-Discovery")?;

        let mut port_infos = Vec::new();
        for (index, port) in midi_out.ports().iter().enumerate() {
            if let Ok(name) = midi_out.port_name(port) {
                port_infos.push(PortInfo {
                    index,
                    is_virtual: is_virtual(&name),
                    name,
                });
            }
        }

        Ok(port_infos)
    }

    fn print_section(title: &str, ports: &[PortInfo], pattern: &str) {
        println!("\n{}", title.bold());
        if ports.is_empty() {
            println!("  {}", "No ports found".dimmed());
            return;
        }
        for port in ports {
            let marker = if port.is_virtual {
                "[VIRTUAL]".yellow()
            } else {
                "[PHYSICAL]".green()
            };
            let name = if matches_pattern(&port.name, pattern) {
                port.name.bright_white().bold()
            } else {
                port.name.normal()
            };
            println!("  {} {}: {}", marker, port.index, name);
        }
    }

    /// Print all ports, highlighting the ones the bridge would pick
    pub fn list_ports_formatted(input_pattern: &str, output_pattern: &str) -> Result<()> {
        println!("\n{}", "=== Available MIDI Ports ===".bold().cyan());

        let inputs = discover_input_ports()?;
        print_section("Input Ports:", &inputs, input_pattern);

        let outputs = discover_output_ports()?;
        print_section("Output Ports:", &outputs, output_pattern);

        let input = inputs.iter().find(|p| matches_pattern(&p.name, input_pattern));
        let output = outputs.iter().find(|p| matches_pattern(&p.name, output_pattern));
        if let (Some(input), Some(output)) = (input, output) {
            println!("\n{}", "Controller:".bold().bright_green());
            println!("  Input:  {}", input.name.bright_white());
            println!("  Output: {}", output.name.bright_white());
        }

        println!();
        Ok(())
    }
}
