//! Machine integration tests
//!
//! Machines are built from YAML configs and driven by manual steps on a
//! manual clock.

use std::sync::Arc;

use serde_json::json;
use streamsheet::clock::ManualClock;
use streamsheet::config::MachineConfig;
use streamsheet::error::Result;
use streamsheet::machine::{Machine, RunState};
use streamsheet::message::Message;
use streamsheet::sheet::{ErrorCode, Value};
use streamsheet::trigger::{TriggerConfig, TriggerKind, TriggerState};

fn build(yaml: &str) -> Result<(Machine, ManualClock)> {
    let clock = ManualClock::new(1_000);
    let machine = MachineConfig::from_yaml(yaml)?.build_with_clock(Arc::new(clock.clone()))?;
    Ok((machine, clock))
}

fn cell(m: &Machine, sheet: &str, name: &str) -> Option<Value> {
    m.streamsheet(sheet)?.value_at(name)
}

/// Integration test: a continuously triggered counter advances once per step
#[test]
fn test_counter_from_config() -> Result<()> {
    let (mut m, _) = build(
        r#"
name: counter
sheets:
  - name: S1
    cells:
      - { name: A1, value: 1, formula: { fn: add, cell: A1 } }
"#,
    )?;
    for _ in 0..3 {
        m.step()?;
    }
    assert_eq!(cell(&m, "S1", "A1"), Some(Value::Number(4.0)));
    assert_eq!(m.steps(), 3);

    m.start()?;
    m.stop()?;
    assert_eq!(m.steps(), 0);
    assert_eq!(m.state(), RunState::Stopped);
    Ok(())
}

/// Integration test: arrival sheets keep their last message after consuming it
#[test]
fn test_arrival_retains_last_message() -> Result<()> {
    let (mut m, _) = build(
        r#"
sheets:
  - name: S1
    trigger: { type: arrival }
    cells:
      - { name: A1, formula: { fn: data, pointer: /v } }
"#,
    )?;
    m.put_message("S1", Message::new(json!({"v": 1})).with_id("m1"))?;
    m.put_message("S1", Message::new(json!({"v": 2})).with_id("m2"))?;

    m.step()?;
    assert_eq!(cell(&m, "S1", "A1"), Some(Value::Number(1.0)));
    m.step()?;
    assert_eq!(cell(&m, "S1", "A1"), Some(Value::Number(2.0)));
    m.step()?;

    let sheet = m.streamsheet("S1").unwrap();
    assert_eq!(sheet.inbox().ids(), vec!["m2".to_string()]);
    assert!(!sheet.inbox().has_unprocessed());
    assert_eq!(sheet.stats().steps, 2);
    Ok(())
}

/// Integration test: duplicate message ids are rejected by the inbox
#[test]
fn test_duplicate_message_rejected() -> Result<()> {
    let (mut m, _) = build("sheets: [{ name: S1, trigger: { type: arrival } }]")?;
    m.put_message("S1", Message::new(json!(1)).with_id("x"))?;
    assert!(m.put_message("S1", Message::new(json!(2)).with_id("x")).is_err());
    assert!(m.put_message("nope", Message::new(json!(3))).is_err());
    Ok(())
}

const CHAIN: &str = r#"
name: chain
sheets:
  - name: S1
    cells:
      - { name: A1, formula: { fn: execute, target: S2 } }
  - name: S2
    trigger: { type: execute, repeat: endless }
    cells:
      - { name: B1, formula: { fn: add, cell: B1 } }
      - { name: B2, formula: { fn: return_when, cell: B1, divisor: 3 } }
"#;

/// Integration test: a caller waits on an endless callee until it returns
#[test]
fn test_execute_chain_from_config() -> Result<()> {
    let (mut m, _) = build(CHAIN)?;

    m.step()?;
    assert_eq!(cell(&m, "S1", "A1"), Some(Value::Error(ErrorCode::Waiting)));
    assert_eq!(m.snapshot().active_executes, 1);
    m.step()?;
    assert_eq!(cell(&m, "S1", "A1"), Some(Value::Error(ErrorCode::Waiting)));
    m.step()?;
    assert_eq!(cell(&m, "S1", "A1"), Some(Value::Bool(true)));
    assert_eq!(cell(&m, "S2", "B1"), Some(Value::Number(3.0)));
    assert!(m.bridge().is_empty());
    Ok(())
}

/// Integration test: removing a callee mid-chain fails the caller's cell
#[test]
fn test_remove_callee_mid_chain() -> Result<()> {
    let (mut m, _) = build(CHAIN)?;
    m.step()?;
    m.remove_streamsheet("S2")?;
    assert_eq!(
        cell(&m, "S1", "A1"),
        Some(Value::Error(ErrorCode::NoStreamSheet))
    );
    assert!(m.bridge().is_empty());
    Ok(())
}

/// Integration test: a caller pointing at a missing sheet shows the error
#[test]
fn test_execute_unknown_target() -> Result<()> {
    let (mut m, _) = build(
        r#"
sheets:
  - name: S1
    cells:
      - { name: A1, formula: { fn: execute, target: GHOST } }
"#,
    )?;
    m.step()?;
    assert_eq!(
        cell(&m, "S1", "A1"),
        Some(Value::Error(ErrorCode::NoStreamSheet))
    );
    Ok(())
}

/// Integration test: await resumes the sheet once its request resolves
#[test]
fn test_request_and_await_from_config() -> Result<()> {
    let (mut m, _) = build(
        r#"
sheets:
  - name: S1
    cells:
      - { name: A1, formula: { fn: request, label: fetch } }
      - { name: A2, formula: { fn: await, cells: [A1] } }
      - { name: A3, formula: { fn: add, cell: A3 } }
"#,
    )?;
    m.step()?;
    let sheet = m.streamsheet("S1").unwrap();
    assert_eq!(sheet.suspension().reason(), "await");
    assert_eq!(sheet.trigger().state(), TriggerState::Suspended);

    let id = match cell(&m, "S1", "A1") {
        Some(Value::Text(id)) => id,
        other => panic!("expected a request id, got {:?}", other),
    };
    // stepping again while suspended does nothing
    m.step()?;
    assert_eq!(cell(&m, "S1", "A3"), Some(Value::Empty));

    assert!(m.resolve_request(&id)?);
    assert_eq!(cell(&m, "S1", "A3"), Some(Value::Number(1.0)));
    assert_eq!(m.requests().pending_count(), 0);
    Ok(())
}

/// Integration test: timer triggers configured in seconds fire on the clock
#[test]
fn test_timer_from_config() -> Result<()> {
    let (mut m, clock) = build(
        r#"
sheets:
  - name: T
    trigger: { type: timer, interval: 1, intervalUnit: s }
    cells:
      - { name: A1, formula: { fn: add, cell: A1 } }
"#,
    )?;
    m.start()?;
    m.tick()?;
    assert_eq!(cell(&m, "T", "A1"), Some(Value::Empty));
    clock.advance(1_000);
    m.tick()?;
    assert_eq!(cell(&m, "T", "A1"), Some(Value::Number(1.0)));
    Ok(())
}

/// Integration test: swapping a trigger at runtime
#[test]
fn test_set_trigger_at_runtime() -> Result<()> {
    let (mut m, _) = build(
        r#"
sheets:
  - name: S1
    trigger: { type: arrival }
    cells:
      - { name: A1, formula: { fn: add, cell: A1 } }
"#,
    )?;
    m.step()?;
    assert_eq!(cell(&m, "S1", "A1"), Some(Value::Empty));

    m.set_trigger("S1", TriggerConfig::new(TriggerKind::Continuously))?;
    m.step()?;
    assert_eq!(cell(&m, "S1", "A1"), Some(Value::Number(1.0)));

    let persisted = m.streamsheet("S1").unwrap().trigger().to_json()?;
    assert_eq!(persisted, json!({"type": "continuously", "repeat": "once"}));
    Ok(())
}

/// Integration test: loop mode walks the message payload one element per step
#[test]
fn test_loop_mode_from_config() -> Result<()> {
    let (mut m, _) = build(
        r#"
sheets:
  - name: S1
    trigger: { type: arrival }
    loop: { enabled: true, path: /items }
    cells:
      - { name: A1, formula: { fn: data } }
      - { name: A2, formula: { fn: loop_index } }
"#,
    )?;
    m.put_message("S1", Message::new(json!({"items": ["a", "b"]})))?;
    m.step()?;
    assert_eq!(cell(&m, "S1", "A1"), Some(Value::Text("a".into())));
    m.step()?;
    assert_eq!(cell(&m, "S1", "A1"), Some(Value::Text("b".into())));
    assert_eq!(cell(&m, "S1", "A2"), Some(Value::Number(1.0)));
    assert_eq!(m.streamsheet("S1").unwrap().stats().finishedsteps, 1);
    Ok(())
}
