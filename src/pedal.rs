//! Pedal decoding for the FCB1010 in I/O mode
//!
//! The controller reports every footswitch as a control change: the controller
//! number tells whether the pedal went down or up, the value identifies the pedal.

use std::fmt;

use crate::midi::MidiMessage;

/// Controller number carrying pedal-down events
pub const CC_PEDAL_DOWN: u8 = 104;

/// Controller number carrying pedal-up events
pub const CC_PEDAL_UP: u8 = 105;

/// Logical pedal on the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pedal {
    Track1,
    Track2,
    Track3,
    Track4,
    Record,
    Multiply,
    Replace,
    Insert,
    Substitute,
    Undo,
    /// The "UP" side pedal
    Clear,
    /// The "DOWN" side pedal
    Mute,
    /// Unmapped hardware value, kept as-is
    Other(u8),
}

impl Pedal {
    /// Decode a raw controller value into a pedal.
    ///
    /// Values 1-9 are the numbered footswitches (slots 0-8), 0 is the tenth
    /// footswitch (Undo), 10 and 11 are the two side pedals.
    pub fn decode(raw: u8) -> Self {
        match raw {
            1 => Pedal::Track1,
            2 => Pedal::Track2,
            3 => Pedal::Track3,
            4 => Pedal::Track4,
            5 => Pedal::Record,
            6 => Pedal::Multiply,
            7 => Pedal::Replace,
            8 => Pedal::Insert,
            9 => Pedal::Substitute,
            0 => Pedal::Undo,
            10 => Pedal::Clear,
            11 => Pedal::Mute,
            other => Pedal::Other(other),
        }
    }

    /// LED slot lit under this pedal
    pub fn led_index(self) -> usize {
        match self {
            Pedal::Track1 => 0,
            Pedal::Track2 => 1,
            Pedal::Track3 => 2,
            Pedal::Track4 => 3,
            Pedal::Record => 4,
            Pedal::Multiply => 5,
            Pedal::Replace => 6,
            Pedal::Insert => 7,
            Pedal::Substitute => 8,
            Pedal::Undo => 9,
            Pedal::Clear => 10,
            Pedal::Mute => 11,
            Pedal::Other(raw) => raw as usize,
        }
    }

    /// Loop index selected by a track pedal
    pub fn track(self) -> Option<usize> {
        match self {
            Pedal::Track1 => Some(0),
            Pedal::Track2 => Some(1),
            Pedal::Track3 => Some(2),
            Pedal::Track4 => Some(3),
            _ => None,
        }
    }
}

impl fmt::Display for Pedal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pedal::Other(raw) => write!(f, "Pedal({})", raw),
            named => write!(f, "{:?}", named),
        }
    }
}

/// Edge of a pedal event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Down,
    Up,
}

impl Phase {
    pub fn is_down(self) -> bool {
        self == Phase::Down
    }

    /// Path segment used by the looper for this edge
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Down => "down",
            Phase::Up => "up",
        }
    }
}

/// A decoded pedal press or release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PedalEvent {
    pub pedal: Pedal,
    pub phase: Phase,
}

impl PedalEvent {
    pub fn new(pedal: Pedal, phase: Phase) -> Self {
        Self { pedal, phase }
    }

    /// Decode a controller message, ignoring anything that is not a pedal edge
    pub fn from_message(message: &MidiMessage) -> Option<Self> {
        match *message {
            MidiMessage::ControlChange { cc, value, .. } => {
                let phase = match cc {
                    CC_PEDAL_DOWN => Phase::Down,
                    CC_PEDAL_UP => Phase::Up,
                    _ => return None,
                };
                Some(Self::new(Pedal::decode(value), phase))
            }
            _ => None,
        }
    }
}
