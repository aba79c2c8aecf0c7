//! Bridge state - everything the event handlers mutate
//!
//! One `BridgeState` is owned by the bridge and only touched from its
//! serialized handler, so nothing in here is locked.

use std::ops::Range;

use tracing::{debug, info, warn};

use crate::leds::{LedPanel, LedPattern};
use crate::loops::{LoopState, Loops, Mode, MAX_LOOPS};
use crate::midi::CC_DISPLAY;
use crate::pedal::Pedal;

#[derive(Debug, Default)]
pub struct BridgeState {
    pub mode: Mode,
    /// Selected loop, always an index into `loops` when set
    pub selected: Option<usize>,
    pub loops: Loops,
    pub leds: LedPanel,
}

impl BridgeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a loop. Returns false when the loop does not exist.
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.loops.len() {
            debug!("Cannot select loop {} ({} loops known)", index, self.loops.len());
            return false;
        }
        self.selected = Some(index);
        true
    }

    /// Apply a selection reported by the looper and update the display.
    ///
    /// `-1` clears the selection. Reports outside the loop range are dropped.
    pub fn apply_selection_report(&mut self, raw: i32) -> bool {
        let selected = match raw {
            -1 => None,
            i if i >= 0 && (i as usize) < self.loops.len() => Some(i as usize),
            other => {
                warn!(
                    "Ignoring selected loop {} ({} loops known)",
                    other,
                    self.loops.len()
                );
                return false;
            }
        };

        self.selected = selected;
        self.leds.send_control(CC_DISPLAY, self.display_value());
        debug!("Selected loop is now {:?}", self.selected);
        true
    }

    /// Value shown on the controller display: selected loop + 1, 0 for none
    pub fn display_value(&self) -> u8 {
        self.selected.map(|index| (index + 1).min(0x7F) as u8).unwrap_or(0)
    }

    /// Replace every loop with `count` fresh ones.
    ///
    /// Counts above the LED capacity are clamped. A selection that no longer
    /// exists is cleared.
    pub fn rebuild(&mut self, count: usize) -> usize {
        let count = clamp_count(count);
        self.loops.rebuild(count, self.mode, &mut self.leds);
        if self.selected.is_some_and(|index| index >= count) {
            self.selected = None;
        }
        count
    }

    /// Grow the loop collection, returning the indices added
    pub fn extend_to(&mut self, count: usize) -> Range<usize> {
        let added = self.loops.extend_to(clamp_count(count));
        for index in added.clone() {
            self.loops.apply(index, LoopState::Off, self.mode, &mut self.leds);
        }
        added
    }

    pub fn apply_state(&mut self, index: usize, state: LoopState) -> Option<LedPattern> {
        let pattern = self.loops.apply(index, state, self.mode, &mut self.leds);
        if pattern.is_none() {
            debug!("State {} for unknown loop {}", state, index);
        }
        pattern
    }

    /// Re-apply every loop's state to the LEDs
    pub fn refresh(&mut self) {
        self.loops.refresh(self.mode, &mut self.leds);
    }

    /// Switch mode and light the Record pedal while in Record mode
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        self.show_mode();
        info!("Mode: {:?}", mode);
    }

    /// Rewrite the display, the Record LED and every loop LED
    pub fn redraw(&mut self) {
        self.leds.send_control(CC_DISPLAY, self.display_value());
        self.show_mode();
        self.refresh();
    }

    fn show_mode(&mut self) {
        let led = Pedal::Record.led_index();
        match self.mode {
            Mode::Record => {
                self.leds.set_pattern(led, LedPattern::Light);
                self.leds.turn_on(led);
            }
            Mode::Play => {
                self.leds.set_pattern(led, LedPattern::Dark);
                self.leds.turn_off(led);
            }
        }
    }
}

fn clamp_count(count: usize) -> usize {
    if count > MAX_LOOPS {
        warn!("Looper reports {} loops, only {} can be shown", count, MAX_LOOPS);
        MAX_LOOPS
    } else {
        count
    }
}
