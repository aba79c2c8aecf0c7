//! Tests for the Bridge event handler

use super::*;
use crate::controller::mock::MockController;
use crate::leds::{LedPattern, HEARTBEAT_SLOT};
use crate::loops::{LoopState, Mode};
use crate::osc::link::mock::RecordingLink;
use crate::pedal::{CC_PEDAL_DOWN, CC_PEDAL_UP};

type TestBridge = Bridge<RecordingLink, MockController>;

fn make_bridge() -> TestBridge {
    Bridge::new(
        RecordingLink::default(),
        MockController::connected(),
        &AppConfig::default(),
    )
}

fn osc(addr: &str, args: Vec<OscType>) -> BridgeEvent {
    BridgeEvent::Osc(OscMessage {
        addr: addr.to_string(),
        args,
    })
}

fn s(value: &str) -> OscType {
    OscType::String(value.to_string())
}

fn ping_ack(loops: i32, engine: i32) -> BridgeEvent {
    osc(
        "/pingack",
        vec![s("osc.udp://looper:9951/"), s("1.7.3"), OscType::Int(loops), OscType::Int(engine)],
    )
}

fn heartbeat(loops: i32, engine: i32) -> BridgeEvent {
    osc(
        "/heartbeat",
        vec![s("osc.udp://looper:9951/"), s("1.7.3"), OscType::Int(loops), OscType::Int(engine)],
    )
}

fn loop_state(index: i32, code: f32) -> BridgeEvent {
    osc("/ctrl", vec![OscType::Int(index), s("state"), OscType::Float(code)])
}

fn selected(index: f32) -> BridgeEvent {
    osc(
        "/ctrl",
        vec![OscType::Int(-2), s("selected_loop_num"), OscType::Float(index)],
    )
}

fn pedal(value: u8, down: bool) -> BridgeEvent {
    let cc = if down { CC_PEDAL_DOWN } else { CC_PEDAL_UP };
    BridgeEvent::Controller(vec![0xB0, cc, value])
}

/// Bridge connected to a looper with `loops` loops
fn live_bridge(loops: i32) -> TestBridge {
    let mut bridge = make_bridge();
    bridge.handle(BridgeEvent::Tick);
    bridge.handle(BridgeEvent::Tick);
    assert_eq!(bridge.link_state(), LinkState::AwaitingPingAck);

    bridge.handle(ping_ack(loops, 1));
    assert_eq!(bridge.link_state(), LinkState::Live);
    bridge.link.sent.clear();
    bridge.controller.written.clear();
    bridge
}

#[test]
fn test_handshake_scenario() {
    let mut bridge = make_bridge();

    bridge.handle(BridgeEvent::Tick);
    assert_eq!(bridge.link_state(), LinkState::Connecting);
    bridge.handle(BridgeEvent::Tick);
    assert_eq!(bridge.link.take(), vec!["/ping"]);

    bridge.handle(ping_ack(2, 7));
    assert_eq!(bridge.link_state(), LinkState::Live);
    assert_eq!(bridge.state().loops.len(), 2);
    assert!(bridge.state().loops.iter().all(|l| l.empty));

    let sent = bridge.link.take();
    assert!(sent.contains(&"/sl/0/register_auto_update".to_string()));
    assert!(sent.contains(&"/sl/1/register_auto_update".to_string()));
    assert!(sent.contains(&"/register_update".to_string()));
    assert!(sent.contains(&"/sl/1/get".to_string()));
    assert_eq!(sent.last().map(String::as_str), Some("/get"));
}

#[test]
fn test_loop_state_report_lights_led() {
    let mut bridge = live_bridge(2);

    bridge.handle(loop_state(0, 4.0));
    let lp = bridge.state().loops.get(0).unwrap();
    assert_eq!(lp.state, LoopState::Playing);
    assert!(!lp.empty);
    assert_eq!(bridge.state().leds.get(0).unwrap().pattern, LedPattern::Light);
    assert_eq!(bridge.controller.written, vec![vec![0xB0, 106, 1]]);
}

#[test]
fn test_overdubbing_report_is_light_in_play_mode() {
    let mut bridge = live_bridge(1);
    bridge.handle(loop_state(0, 5.0));
    assert_eq!(bridge.state().loops.get(0).unwrap().state, LoopState::Overdubbing);
    assert_eq!(bridge.state().leds.get(0).unwrap().pattern, LedPattern::Light);
}

#[test]
fn test_state_for_unknown_loop_is_ignored() {
    let mut bridge = live_bridge(1);
    bridge.handle(loop_state(5, 4.0));
    assert_eq!(bridge.state().loops.len(), 1);
    assert!(bridge.controller.written.is_empty());
}

#[test]
fn test_malformed_message_does_not_mutate() {
    let mut bridge = live_bridge(1);
    bridge.handle(osc("/heartbeat", vec![s("only-url")]));
    bridge.handle(osc("/ctrl", vec![s("state")]));
    bridge.handle(osc("/nothing/here", vec![]));

    assert_eq!(bridge.state().loops.len(), 1);
    assert!(bridge.link.sent.is_empty());
    assert!(bridge.controller.written.is_empty());
}

#[test]
fn test_track_pedal_overdubs_in_record_mode() {
    let mut bridge = live_bridge(2);

    // Record pedal: mode flips on release
    bridge.handle(pedal(5, true));
    assert_eq!(bridge.state().mode, Mode::Play);
    bridge.handle(pedal(5, false));
    assert_eq!(bridge.state().mode, Mode::Record);

    bridge.handle(loop_state(1, 5.0));
    bridge.handle(pedal(2, true));
    bridge.handle(pedal(2, false));

    assert_eq!(
        bridge.link.take(),
        vec![
            "/set selected_loop_num 1",
            "/sl/1/down overdub",
            "/sl/1/up overdub",
        ]
    );
}

#[test]
fn test_mute_pedal_with_all_loops_off() {
    let mut bridge = live_bridge(2);
    bridge.handle(pedal(11, true));
    bridge.handle(pedal(11, false));
    assert_eq!(
        bridge.link.take(),
        vec!["/sl/-1/hit trigger", "/sl/-1/hit mute_off"]
    );
}

#[test]
fn test_non_pedal_controller_input_is_ignored() {
    let mut bridge = live_bridge(1);
    bridge.handle(BridgeEvent::Controller(vec![0x90, 60, 100]));
    bridge.handle(BridgeEvent::Controller(vec![0xB0, 7, 1]));
    bridge.handle(BridgeEvent::Controller(vec![]));
    assert!(bridge.link.sent.is_empty());
}

#[test]
fn test_selection_report_updates_display() {
    let mut bridge = live_bridge(3);
    bridge.handle(selected(2.0));
    assert_eq!(bridge.state().selected, Some(2));
    assert_eq!(bridge.controller.written, vec![vec![0xB0, 108, 3]]);

    bridge.controller.written.clear();
    bridge.handle(selected(9.0));
    assert_eq!(bridge.state().selected, Some(2));
    assert!(bridge.controller.written.is_empty());
}

#[test]
fn test_heartbeat_engine_change_rebuilds() {
    let mut bridge = live_bridge(3);
    bridge.handle(loop_state(2, 4.0));
    bridge.handle(selected(2.0));

    bridge.handle(heartbeat(2, 42));
    assert_eq!(bridge.state().loops.len(), 2);
    assert!(bridge.state().loops.iter().all(|l| l.state == LoopState::Off));
    assert_eq!(bridge.state().selected, None);
}

#[test]
fn test_shrinking_rebuild_switches_dropped_led_off() {
    let mut bridge = live_bridge(3);
    bridge.handle(loop_state(2, 4.0));
    assert!(bridge.controller.written.contains(&vec![0xB0, 106, 3]));
    bridge.controller.written.clear();

    bridge.handle(heartbeat(2, 42));
    assert!(!bridge.state().leds.is_on(2));
    assert!(bridge.controller.written.contains(&vec![0xB0, 107, 3]));

    bridge.handle(loop_state(1, 4.0));
    bridge.controller.written.clear();
    bridge.handle(ping_ack(1, 43));
    assert!(bridge.controller.written.contains(&vec![0xB0, 107, 2]));
}

#[test]
fn test_side_led_survives_refresh_with_many_loops() {
    let mut bridge = live_bridge(6);
    let multiply = crate::pedal::Pedal::Multiply.led_index();

    bridge.handle(loop_state(0, 6.0));
    assert!(bridge.state().leds.is_on(multiply));

    bridge.handle(pedal(5, true));
    bridge.handle(pedal(5, false));
    assert_eq!(bridge.state().mode, Mode::Record);
    assert!(bridge.state().leds.is_on(multiply));
    assert!(bridge.state().leds.is_on(crate::pedal::Pedal::Record.led_index()));
}

#[test]
fn test_nan_selection_is_dropped() {
    let mut bridge = live_bridge(3);
    bridge.handle(selected(2.0));
    bridge.controller.written.clear();

    bridge.handle(selected(f32::NAN));
    assert_eq!(bridge.state().selected, Some(2));
    assert!(bridge.controller.written.is_empty());
}

#[test]
fn test_heartbeat_growth() {
    let mut bridge = live_bridge(1);
    bridge.handle(heartbeat(2, 1));
    assert_eq!(bridge.state().loops.len(), 2);
    assert_eq!(
        bridge.link.take(),
        vec!["/sl/1/register_auto_update", "/sl/1/get", "/get"]
    );
}

#[test]
fn test_silence_resets_session() {
    let mut bridge = live_bridge(1);

    for _ in 0..11 {
        bridge.handle(BridgeEvent::Tick);
    }
    assert_eq!(bridge.link_state(), LinkState::Disconnected);
    assert!(!bridge.link.open);

    bridge.handle(BridgeEvent::Tick);
    assert_eq!(bridge.link_state(), LinkState::Connecting);
}

#[test]
fn test_looper_traffic_keeps_session_live() {
    let mut bridge = live_bridge(1);
    for _ in 0..30 {
        bridge.handle(BridgeEvent::Tick);
        bridge.handle(loop_state(0, 4.0));
    }
    assert_eq!(bridge.link_state(), LinkState::Live);
}

#[test]
fn test_alive_led_blinks_while_live() {
    let mut bridge = live_bridge(0);
    bridge.handle(BridgeEvent::Tick);
    bridge.handle(BridgeEvent::Tick);

    let alive: Vec<_> = bridge
        .controller
        .written
        .iter()
        .filter(|w| w[2] == HEARTBEAT_SLOT)
        .cloned()
        .collect();
    assert_eq!(
        alive,
        vec![vec![0xB0, 106, HEARTBEAT_SLOT], vec![0xB0, 107, HEARTBEAT_SLOT]]
    );
}

#[test]
fn test_controller_reopen_redraws_leds() {
    let mut bridge = live_bridge(1);
    bridge.handle(loop_state(0, 4.0));
    assert!(bridge.state().leds.is_on(0));

    // Two ticks were spent connecting; the next poll is on the sixth tick
    bridge.controller.reopened = true;
    for _ in 0..3 {
        bridge.handle(BridgeEvent::Tick);
        bridge.handle(loop_state(0, 4.0));
    }
    assert!(bridge.controller.reopened);
    assert!(bridge.state().leds.is_on(0));

    bridge.controller.written.clear();
    bridge.handle(BridgeEvent::Tick);
    assert!(!bridge.controller.reopened);
    assert!(bridge.state().leds.is_on(0));

    let written = &bridge.controller.written;
    let off = written.iter().position(|w| *w == vec![0xB0, 107, 1]);
    let on = written.iter().rposition(|w| *w == vec![0xB0, 106, 1]);
    assert!(off.is_some() && on > off);
    assert!(written.contains(&vec![0xB0, 108, 0]));
}

#[test]
fn test_diagnostic_ping() {
    let mut bridge = live_bridge(1);
    bridge.handle(osc(
        "/loop4r/ping",
        vec![s("127.0.0.1"), OscType::Int(9100), s("/pong")],
    ));

    let (host, port, msg) = bridge.link.replies.pop().unwrap();
    assert_eq!((host.as_str(), port), ("127.0.0.1", 9100));
    assert_eq!(msg.addr, "/pong");
    assert_eq!(msg.args[0], s("osc.udp://localhost:9000/"));
    assert_eq!(msg.args[2], OscType::Int(23));
}

#[test]
fn test_diagnostic_leds_dump() {
    let mut bridge = live_bridge(1);
    bridge.handle(loop_state(0, 10.0));
    bridge.handle(osc(
        "/loop4r/leds",
        vec![s("127.0.0.1"), OscType::Int(9100), s("/led")],
    ));

    assert_eq!(bridge.link.replies.len(), NUM_LEDS);
    let (_, _, first) = &bridge.link.replies[0];
    assert_eq!(
        first.args,
        vec![
            OscType::Int(0),
            OscType::Int(1),
            OscType::Int(4),
            OscType::Int(LedPattern::Blink.code()),
        ]
    );
}

#[test]
fn test_diagnostic_display() {
    let mut bridge = live_bridge(2);
    bridge.handle(osc(
        "/loop4r/display",
        vec![s("127.0.0.1"), OscType::Int(9100), s("/ignored")],
    ));
    let (_, _, msg) = bridge.link.replies.pop().unwrap();
    assert_eq!(msg.addr, "/display");
    assert_eq!(msg.args, vec![OscType::Int(-1)]);
}

#[test]
fn test_led_mirror() {
    let mut bridge = live_bridge(2);
    bridge.handle(osc(
        "/loop4r/register_auto_update",
        vec![s("127.0.0.1"), OscType::Int(9200)],
    ));

    bridge.handle(loop_state(1, 4.0));
    let led_updates: Vec<_> = bridge
        .link
        .replies
        .iter()
        .filter(|(_, port, msg)| *port == 9200 && msg.addr == "/led")
        .map(|(_, _, msg)| msg.args[0].clone())
        .collect();
    assert_eq!(led_updates, vec![OscType::Int(1)]);

    bridge.handle(selected(1.0));
    let (_, _, msg) = bridge.link.replies.last().unwrap();
    assert_eq!(msg.addr, "/display");
    assert_eq!(msg.args, vec![OscType::Int(1)]);

    // Unregistering another listener keeps the mirror
    bridge.handle(osc(
        "/loop4r/unregister_auto_update",
        vec![s("127.0.0.1"), OscType::Int(9300)],
    ));
    assert!(bridge.state().leds.is_monitored());

    bridge.handle(osc(
        "/loop4r/unregister_auto_update",
        vec![s("127.0.0.1"), OscType::Int(9200)],
    ));
    assert!(!bridge.state().leds.is_monitored());

    bridge.link.replies.clear();
    bridge.handle(loop_state(0, 4.0));
    assert!(bridge.link.replies.is_empty());
}

#[test]
fn test_shutdown_unregisters_and_darkens() {
    let mut bridge = live_bridge(1);
    bridge.handle(loop_state(0, 4.0));
    bridge.controller.written.clear();

    bridge.shutdown();
    assert_eq!(
        bridge.link.take(),
        vec!["/sl/0/unregister_auto_update", "/unregister_update"]
    );
    assert!(bridge.controller.written.contains(&vec![0xB0, 107, 1]));
    assert_eq!(bridge.link_state(), LinkState::Disconnected);
}
