//! Loop tracking and the loop-state → LED state machine
//!
//! Each loop reported by the looper lights the LED with the same index.
//! Some states also light a function pedal ("side LED") for as long as a loop
//! stays in them. The Record and side LEDs keep their pedal meaning, so loops
//! on those slots are tracked without being shown.

use std::fmt;
use std::ops::Range;

use tracing::debug;

use crate::leds::{LedPanel, LedPattern, NUM_LEDS};
use crate::pedal::Pedal;

/// Upper bound on tracked loops: one LED per loop
pub const MAX_LOOPS: usize = NUM_LEDS;

/// Global pedal mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Play,
    Record,
}

impl Mode {
    pub fn toggled(self) -> Self {
        match self {
            Mode::Play => Mode::Record,
            Mode::Record => Mode::Play,
        }
    }
}

/// Loop state as reported by the looper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopState {
    Unknown,
    Off,
    WaitStart,
    Recording,
    WaitStop,
    Playing,
    Overdubbing,
    Multiplying,
    Inserting,
    Replacing,
    Delay,
    Muted,
    Scratching,
    OneShot,
    Substitute,
    Paused,
    /// Terminal sentinel of the looper's state table
    Last,
}

impl LoopState {
    /// Decode the looper's numeric state code. Unrecognised codes map to `Unknown`.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => LoopState::Off,
            1 => LoopState::WaitStart,
            2 => LoopState::Recording,
            3 => LoopState::WaitStop,
            4 => LoopState::Playing,
            5 => LoopState::Overdubbing,
            6 => LoopState::Multiplying,
            7 => LoopState::Inserting,
            8 => LoopState::Replacing,
            9 => LoopState::Delay,
            10 => LoopState::Muted,
            11 => LoopState::Scratching,
            12 => LoopState::OneShot,
            13 => LoopState::Substitute,
            14 => LoopState::Paused,
            20 => LoopState::Last,
            _ => LoopState::Unknown,
        }
    }

    /// State codes arrive as floats on the wire
    pub fn from_float(value: f32) -> Self {
        if value.is_finite() {
            Self::from_code(value as i32)
        } else {
            LoopState::Unknown
        }
    }

    /// True when the loop produces no sound
    pub fn is_silent(self) -> bool {
        matches!(
            self,
            LoopState::Unknown | LoopState::Off | LoopState::Muted | LoopState::Paused
        )
    }

    /// Function pedal lit while a loop is in this state
    pub fn side_led(self) -> Option<Pedal> {
        match self {
            LoopState::Multiplying => Some(Pedal::Multiply),
            LoopState::Replacing => Some(Pedal::Replace),
            LoopState::Inserting => Some(Pedal::Insert),
            LoopState::Substitute => Some(Pedal::Substitute),
            _ => None,
        }
    }

    /// LED pattern for a loop in this state
    pub fn pattern(self, mode: Mode) -> LedPattern {
        match self {
            LoopState::Unknown | LoopState::Off | LoopState::Last => LedPattern::Dark,
            LoopState::WaitStart | LoopState::WaitStop => LedPattern::FastBlink,
            LoopState::Recording
            | LoopState::Overdubbing
            | LoopState::Delay
            | LoopState::Scratching
            | LoopState::OneShot => LedPattern::Light,
            LoopState::Multiplying
            | LoopState::Inserting
            | LoopState::Replacing
            | LoopState::Substitute => LedPattern::FastBlink,
            LoopState::Playing => match mode {
                Mode::Play => LedPattern::Light,
                Mode::Record => LedPattern::Blink,
            },
            LoopState::Muted | LoopState::Paused => LedPattern::Blink,
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One loop of the looper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loop {
    pub index: usize,
    pub state: LoopState,
    pub empty: bool,
}

impl Loop {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            state: LoopState::Off,
            empty: true,
        }
    }

    /// LED showing this loop
    pub fn led(&self) -> usize {
        self.index
    }

    /// False when the loop's LED belongs to a function pedal
    pub fn shown(&self) -> bool {
        shows_loop(self.index)
    }
}

/// Pedals whose LED is never driven by a loop
const PEDAL_LEDS: [Pedal; 5] = [
    Pedal::Record,
    Pedal::Multiply,
    Pedal::Replace,
    Pedal::Insert,
    Pedal::Substitute,
];

fn shows_loop(led: usize) -> bool {
    PEDAL_LEDS.iter().all(|pedal| pedal.led_index() != led)
}

/// The collection of loops known to the bridge
#[derive(Debug, Default)]
pub struct Loops {
    loops: Vec<Loop>,
}

impl Loops {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Loop> {
        self.loops.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Loop> {
        self.loops.iter()
    }

    /// True when no loop is currently audible
    pub fn all_silent(&self) -> bool {
        self.loops.iter().all(|l| l.state.is_silent())
    }

    /// Drop every loop and create `count` fresh ones, all Off.
    ///
    /// LEDs of loops beyond `count` are switched off on the controller too.
    pub fn rebuild(&mut self, count: usize, mode: Mode, panel: &mut LedPanel) {
        for lp in self.loops.drain(..) {
            if let Some(side) = lp.state.side_led() {
                panel.turn_off(side.led_index());
            }
            if lp.index >= count && lp.shown() {
                panel.set_pattern(lp.led(), LedPattern::Dark);
                panel.turn_off(lp.led());
            }
        }

        self.loops = (0..count).map(Loop::new).collect();
        for index in 0..count {
            self.apply(index, LoopState::Off, mode, panel);
        }
        debug!("Loop collection rebuilt with {} loops", count);
    }

    /// Append loops up to `count`, returning the indices that were added.
    /// Never shrinks.
    pub fn extend_to(&mut self, count: usize) -> Range<usize> {
        let start = self.loops.len();
        if count > start {
            self.loops.extend((start..count).map(Loop::new));
            debug!("Loop collection grew from {} to {}", start, count);
            start..count
        } else {
            start..start
        }
    }

    /// Apply a reported state to a loop and return the pattern shown.
    ///
    /// The side LED of the outgoing state is switched off unless another loop
    /// is still in that state.
    pub fn apply(
        &mut self,
        index: usize,
        new_state: LoopState,
        mode: Mode,
        panel: &mut LedPanel,
    ) -> Option<LedPattern> {
        let old_state = self.loops.get(index)?.state;
        let pattern = new_state.pattern(mode);

        if shows_loop(index) {
            panel.set_pattern(index, pattern);
            if pattern == LedPattern::Dark {
                panel.turn_off(index);
            } else {
                panel.turn_on(index);
            }
        }

        if let Some(side) = new_state.side_led() {
            panel.turn_on(side.led_index());
        }

        if new_state != old_state {
            if let Some(side) = old_state.side_led() {
                let still_active = self
                    .loops
                    .iter()
                    .any(|l| l.index != index && l.state == old_state);
                if !still_active {
                    panel.turn_off(side.led_index());
                }
            }
        }

        let lp = &mut self.loops[index];
        lp.state = new_state;
        lp.empty = new_state == LoopState::Off;

        debug!("Loop {} -> {} ({:?})", index, new_state, pattern);
        Some(pattern)
    }

    /// Re-apply every loop's current state, e.g. after a mode change
    pub fn refresh(&mut self, mode: Mode, panel: &mut LedPanel) {
        for index in 0..self.loops.len() {
            let state = self.loops[index].state;
            self.apply(index, state, mode, panel);
        }
    }
}
