//! Pedal dispatch
//!
//! Turns a pedal event into looper commands according to the current mode.
//! Actions are forwarded as down/up pairs and the looper decides what a press
//! means; the bridge only tracks mode and selection.

use tracing::{debug, info};

use crate::loops::{LoopState, Mode};
use crate::osc::{fire, Action, Hit, LooperCommand, LooperLink, Target};
use crate::pedal::{Pedal, PedalEvent, Phase};
use crate::state::BridgeState;

/// Handle one pedal event, then refresh every loop LED
pub fn dispatch(event: PedalEvent, state: &mut BridgeState, link: &mut dyn LooperLink) {
    let PedalEvent { pedal, phase } = event;
    debug!("Pedal {} {} in {:?} mode", pedal, phase.as_str(), state.mode);

    match pedal {
        Pedal::Record => {
            if !phase.is_down() {
                state.set_mode(state.mode.toggled());
            }
        }

        Pedal::Track1 | Pedal::Track2 | Pedal::Track3 | Pedal::Track4 => {
            if let Some(index) = pedal.track() {
                track(index, phase, state, link);
            }
        }

        Pedal::Multiply
        | Pedal::Replace
        | Pedal::Insert
        | Pedal::Substitute
        | Pedal::Undo => {
            if state.mode == Mode::Record {
                if let Some(action) = function_action(pedal) {
                    on_selected(action, phase, state, link);
                }
            }
        }

        Pedal::Clear => match state.mode {
            Mode::Play => fire(link, LooperCommand::action(Target::All, phase, Action::UndoAll)),
            Mode::Record => on_selected(Action::UndoAll, phase, state, link),
        },

        Pedal::Mute => match state.mode {
            Mode::Play => {
                if phase.is_down() {
                    if state.loops.all_silent() {
                        fire(link, LooperCommand::Hit(Hit::Trigger));
                        fire(link, LooperCommand::Hit(Hit::MuteOff));
                    } else {
                        fire(link, LooperCommand::Hit(Hit::MuteOn));
                    }
                }
            }
            Mode::Record => on_selected(Action::Mute, phase, state, link),
        },

        Pedal::Other(raw) => {
            debug!("Ignoring unmapped pedal value {}", raw);
        }
    }

    state.refresh();
}

fn function_action(pedal: Pedal) -> Option<Action> {
    match pedal {
        Pedal::Multiply => Some(Action::Multiply),
        Pedal::Replace => Some(Action::Replace),
        Pedal::Insert => Some(Action::Insert),
        Pedal::Substitute => Some(Action::Substitute),
        Pedal::Undo => Some(Action::Undo),
        _ => None,
    }
}

fn track(index: usize, phase: Phase, state: &mut BridgeState, link: &mut dyn LooperLink) {
    if state.loops.get(index).is_none() {
        debug!("Track pedal for missing loop {}", index);
        return;
    }

    if phase.is_down() && state.select(index) {
        info!("Selecting loop {}", index);
        fire(link, LooperCommand::SelectLoop(index));
    }

    let action = match state.mode {
        Mode::Play => Action::Mute,
        Mode::Record => record_or_overdub(state, index),
    };
    fire(link, LooperCommand::action(Target::Loop(index), phase, action));
}

/// Record an empty or recording loop, overdub anything else
fn record_or_overdub(state: &BridgeState, index: usize) -> Action {
    match state.loops.get(index) {
        Some(lp) if lp.state == LoopState::Recording => Action::Record,
        Some(lp) if lp.state == LoopState::Overdubbing => Action::Overdub,
        Some(lp) if lp.empty => Action::Record,
        _ => Action::Overdub,
    }
}

fn on_selected(action: Action, phase: Phase, state: &BridgeState, link: &mut dyn LooperLink) {
    match state.selected {
        Some(index) => fire(link, LooperCommand::action(Target::Loop(index), phase, action)),
        None => debug!("No loop selected, skipping {}", action.as_str()),
    }
}
