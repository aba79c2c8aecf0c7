//! MIDI message types used on the controller link
//!
//! The FCB1010 in I/O mode only speaks channel voice messages; everything
//! else is parsed far enough to be logged and then ignored.

use std::fmt;

/// Control change status byte on channel 1
pub const STATUS_CONTROL: u8 = 0xB0;

/// Controller number that switches a pedal LED on
pub const CC_LED_ON: u8 = 106;

/// Controller number that switches a pedal LED off
pub const CC_LED_OFF: u8 = 107;

/// Controller number driving the selected-loop display
pub const CC_DISPLAY: u8 = 108;

/// MIDI message types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Note On: channel (0-15), note (0-127), velocity (0-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },

    /// Program Change: channel (0-15), program (0-127)
    ProgramChange { channel: u8, program: u8 },

    /// Anything else, kept raw for logging
    Other { data: Vec<u8> },
}

impl MidiMessage {
    /// Parse a MIDI message from raw bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        let &status = data.first()?;

        // Running status is not used by the controller
        if status < 0x80 {
            return None;
        }

        let channel = status & 0x0F;
        let data1 = data.get(1).map(|b| b & 0x7F);
        let data2 = data.get(2).map(|b| b & 0x7F);

        let message = match (status & 0xF0, data1, data2) {
            (0x80, Some(note), Some(velocity)) => MidiMessage::NoteOff { channel, note, velocity },
            (0x90, Some(note), Some(0)) => MidiMessage::NoteOff { channel, note, velocity: 0 },
            (0x90, Some(note), Some(velocity)) => MidiMessage::NoteOn { channel, note, velocity },
            (0xB0, Some(cc), Some(value)) => MidiMessage::ControlChange { channel, cc, value },
            (0xC0, Some(program), _) => MidiMessage::ProgramChange { channel, program },
            (0x80 | 0x90 | 0xB0 | 0xC0, _, _) => return None,
            _ => MidiMessage::Other { data: data.to_vec() },
        };

        Some(message)
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                write!(f, "NoteOff ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
            MidiMessage::ProgramChange { channel, program } => {
                write!(f, "ProgramChange ch:{} p:{}", channel + 1, program)
            }
            MidiMessage::Other { ref data } => write!(f, "Other [{}]", format_hex(data)),
        }
    }
}

/// Build the 3-byte control write understood by the controller firmware
pub fn control_write(cc: u8, value: u8) -> [u8; 3] {
    [STATUS_CONTROL, cc & 0x7F, value & 0x7F]
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
