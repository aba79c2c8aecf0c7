//! Pedal LED panel
//!
//! Owns the visual state of every LED on the controller and turns state
//! changes into control writes. Writes are queued and flushed to the
//! controller once per handled event, so a handler never blocks on the device.

use anyhow::Result;
use tracing::{debug, trace, warn};

use crate::midi::{control_write, format_hex, CC_LED_OFF, CC_LED_ON};

/// Number of LEDs on the controller
pub const NUM_LEDS: usize = 23;

/// Hardware slot of the "bridge alive" indicator
pub const HEARTBEAT_SLOT: u8 = 23;

/// Ticks between toggles of a blinking LED
pub const BLINK_PERIOD: u32 = 4;

/// Ticks between toggles of a fast-blinking LED
pub const FAST_BLINK_PERIOD: u32 = 2;

/// Visual behaviour of an LED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedPattern {
    #[default]
    Dark,
    Light,
    Blink,
    FastBlink,
}

impl LedPattern {
    /// Toggle period in ticks, `None` for steady patterns
    pub fn period(self) -> Option<u32> {
        match self {
            LedPattern::Blink => Some(BLINK_PERIOD),
            LedPattern::FastBlink => Some(FAST_BLINK_PERIOD),
            LedPattern::Dark | LedPattern::Light => None,
        }
    }

    /// Numeric code published to monitors
    pub fn code(self) -> i32 {
        match self {
            LedPattern::Dark => 0,
            LedPattern::Light => 1,
            LedPattern::Blink => 2,
            LedPattern::FastBlink => 3,
        }
    }
}

/// One LED on the panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Led {
    pub index: usize,
    pub on: bool,
    pub pattern: LedPattern,
    pub timer: u32,
}

impl Led {
    fn new(index: usize) -> Self {
        Self {
            index,
            on: false,
            pattern: LedPattern::Dark,
            timer: 0,
        }
    }

    fn snapshot(&self) -> LedSnapshot {
        LedSnapshot {
            index: self.index,
            on: self.on,
            timer: self.timer,
            pattern: self.pattern,
        }
    }
}

/// State of an LED as seen by a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedSnapshot {
    pub index: usize,
    pub on: bool,
    pub timer: u32,
    pub pattern: LedPattern,
}

/// Destination of raw controller writes
pub trait ControllerWrite {
    /// Write one message, returning the number of bytes accepted
    fn write(&mut self, bytes: &[u8]) -> Result<usize>;
}

/// Map an LED index to the slot number the firmware expects.
///
/// Footswitches 1-9 are slots 1-9, the tenth footswitch is slot 0, anything
/// above is addressed directly.
pub fn hw_slot(index: usize) -> u8 {
    match index {
        0..=8 => index as u8 + 1,
        9 => 0,
        other => other.min(0x7F) as u8,
    }
}

/// The LED panel
#[derive(Debug)]
pub struct LedPanel {
    leds: Vec<Led>,
    pending: Vec<[u8; 3]>,
    monitored: bool,
    snapshots: Vec<LedSnapshot>,
}

impl Default for LedPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl LedPanel {
    pub fn new() -> Self {
        Self {
            leds: (0..NUM_LEDS).map(Led::new).collect(),
            pending: Vec::new(),
            monitored: false,
            snapshots: Vec::new(),
        }
    }

    pub fn get(&self, index: usize) -> Option<&Led> {
        self.leds.get(index)
    }

    pub fn is_on(&self, index: usize) -> bool {
        self.leds.get(index).map(|led| led.on).unwrap_or(false)
    }

    pub fn turn_on(&mut self, index: usize) {
        self.switch(index, true);
    }

    pub fn turn_off(&mut self, index: usize) {
        self.switch(index, false);
    }

    /// Switch every LED off, e.g. after the controller output (re)opens
    pub fn all_off(&mut self) {
        for index in 0..self.leds.len() {
            self.switch(index, false);
        }
    }

    /// Set the pattern of an LED and restart its blink timer
    pub fn set_pattern(&mut self, index: usize, pattern: LedPattern) {
        let Some(led) = self.leds.get_mut(index) else {
            warn!("Ignoring pattern {:?} for unknown LED {}", pattern, index);
            return;
        };
        led.pattern = pattern;
        led.timer = pattern.period().unwrap_or(0);
    }

    /// Advance blink timers by one tick
    pub fn tick(&mut self) {
        let mut toggles = Vec::new();

        for led in self.leds.iter_mut() {
            let Some(period) = led.pattern.period() else {
                continue;
            };

            led.timer = led.timer.saturating_sub(1);
            if led.timer == 0 {
                led.timer = period;
                toggles.push((led.index, !led.on));
            }
        }

        for (index, on) in toggles {
            trace!("Blink LED {} -> {}", index, on);
            self.switch(index, on);
        }
    }

    /// Queue a raw control write that is not tied to an LED
    pub fn send_control(&mut self, cc: u8, value: u8) {
        self.pending.push(control_write(cc, value));
    }

    pub fn attach_monitor(&mut self) {
        self.monitored = true;
    }

    pub fn detach_monitor(&mut self) {
        self.monitored = false;
        self.snapshots.clear();
    }

    pub fn is_monitored(&self) -> bool {
        self.monitored
    }

    /// Full panel snapshot, for diagnostic replies
    pub fn snapshot(&self) -> Vec<LedSnapshot> {
        self.leds.iter().map(Led::snapshot).collect()
    }

    /// Take queued controller writes
    pub fn take_writes(&mut self) -> Vec<[u8; 3]> {
        std::mem::take(&mut self.pending)
    }

    /// Take snapshots published since the last call
    pub fn take_snapshots(&mut self) -> Vec<LedSnapshot> {
        std::mem::take(&mut self.snapshots)
    }

    /// Send queued writes to the controller.
    ///
    /// A failed or short write is logged and dropped; the next state change
    /// re-asserts the LED.
    pub fn flush(&mut self, out: &mut dyn ControllerWrite) {
        for bytes in self.take_writes() {
            match out.write(&bytes) {
                Ok(written) if written == bytes.len() => {
                    trace!("LED write {}", format_hex(&bytes));
                }
                Ok(written) => {
                    warn!(
                        "Short write to controller ({} of {} bytes): {}",
                        written,
                        bytes.len(),
                        format_hex(&bytes)
                    );
                }
                Err(e) => {
                    debug!("Could not write {} to controller: {}", format_hex(&bytes), e);
                }
            }
        }
    }

    fn switch(&mut self, index: usize, on: bool) {
        let Some(led) = self.leds.get_mut(index) else {
            warn!("Ignoring write to unknown LED {}", index);
            return;
        };
        led.on = on;
        let snapshot = led.snapshot();

        let cc = if on { CC_LED_ON } else { CC_LED_OFF };
        self.pending.push(control_write(cc, hw_slot(index)));

        if self.monitored {
            self.snapshots.push(snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct ShortWriter {
        calls: usize,
    }

    impl ControllerWrite for ShortWriter {
        fn write(&mut self, bytes: &[u8]) -> Result<usize> {
            self.calls += 1;
            Ok(bytes.len() - 1)
        }
    }

    #[test]
    fn test_hw_slot_mapping() {
        assert_eq!(hw_slot(0), 1);
        assert_eq!(hw_slot(8), 9);
        assert_eq!(hw_slot(9), 0);
        assert_eq!(hw_slot(10), 10);
        assert_eq!(hw_slot(22), 22);
    }

    #[test]
    fn test_turn_on_emits_write() {
        let mut panel = LedPanel::new();
        panel.turn_on(9);
        panel.turn_off(0);

        assert!(panel.is_on(9));
        assert_eq!(panel.take_writes(), vec![[0xB0, 106, 0], [0xB0, 107, 1]]);
        assert!(panel.take_writes().is_empty());
    }

    #[test]
    fn test_unknown_led_is_ignored() {
        let mut panel = LedPanel::new();
        panel.turn_on(NUM_LEDS + 4);
        assert!(panel.take_writes().is_empty());
    }

    #[test]
    fn test_snapshots_only_when_monitored() {
        let mut panel = LedPanel::new();
        panel.turn_on(2);
        assert!(panel.take_snapshots().is_empty());

        panel.attach_monitor();
        panel.set_pattern(2, LedPattern::Blink);
        panel.turn_off(2);
        assert_eq!(
            panel.take_snapshots(),
            vec![LedSnapshot {
                index: 2,
                on: false,
                timer: BLINK_PERIOD,
                pattern: LedPattern::Blink,
            }]
        );
    }

    #[test]
    fn test_steady_patterns_ignore_tick() {
        let mut panel = LedPanel::new();
        panel.set_pattern(0, LedPattern::Light);
        panel.turn_on(0);
        panel.take_writes();

        for _ in 0..20 {
            panel.tick();
        }
        assert!(panel.is_on(0));
        assert!(panel.take_writes().is_empty());
    }

    #[test]
    fn test_fast_blink_is_faster() {
        assert!(BLINK_PERIOD > FAST_BLINK_PERIOD);
    }

    #[test]
    fn test_short_write_is_dropped() {
        let mut panel = LedPanel::new();
        panel.turn_on(1);
        panel.turn_on(2);

        let mut out = ShortWriter { calls: 0 };
        panel.flush(&mut out);
        assert_eq!(out.calls, 2);
        assert!(panel.take_writes().is_empty());
    }

    proptest! {
        #[test]
        fn prop_blink_toggles_once_per_period(
            fast in any::<bool>(),
            ticks in 0u32..200,
        ) {
            let pattern = if fast { LedPattern::FastBlink } else { LedPattern::Blink };
            let period = pattern.period().unwrap();

            let mut panel = LedPanel::new();
            panel.set_pattern(3, pattern);
            panel.take_writes();

            let mut toggles = 0;
            let mut last = panel.is_on(3);
            for n in 1..=ticks {
                panel.tick();
                let now = panel.is_on(3);
                if now != last {
                    toggles += 1;
                    prop_assert_eq!(n % period, 0);
                }
                last = now;
            }
            prop_assert_eq!(toggles, ticks / period);
        }
    }
}
