//! Scenario files replayed end to end

use actionmap::{InputSettings, Phase, Scenario};
use std::io::Write;
use tempfile::NamedTempFile;

const TAP: &str = r#"
devices:
  - layout: Gamepad
actions:
  - name: jump
    bindings:
      - path: "<Gamepad>/buttonSouth"
        interactions: tap
steps:
  - set: { control: "<Gamepad>/buttonSouth", value: 1.0 }
  - update
  - at: 0.15
  - set: { control: "<Gamepad>/buttonSouth", value: 0.0 }
  - update
"#;

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn phases(scenario: &Scenario, settings: Option<InputSettings>) -> Vec<Phase> {
    let report = match settings {
        Some(settings) => scenario.run_with(settings).unwrap(),
        None => scenario.run().unwrap(),
    };
    report.events.iter().map(|e| e.phase).collect()
}

#[test]
fn test_load_and_replay_from_file() {
    let file = write_temp(TAP);
    let scenario = Scenario::load(file.path()).unwrap();
    assert_eq!(scenario.steps.len(), 5);
    assert_eq!(phases(&scenario, None), vec![Phase::Started, Phase::Performed]);
}

#[test]
fn test_settings_override_changes_the_outcome() {
    let scenario = Scenario::from_yaml(TAP).unwrap();

    let settings_file = write_temp("default_tap_time: 0.1\n");
    let settings = InputSettings::load(settings_file.path()).unwrap();
    assert_eq!(phases(&scenario, Some(settings)), vec![Phase::Started, Phase::Canceled]);
}

#[test]
fn test_inline_settings_are_used_by_run() {
    let yaml = format!("settings:\n  default_tap_time: 0.1\n{}", TAP);
    let scenario = Scenario::from_yaml(&yaml).unwrap();
    assert_eq!(phases(&scenario, None), vec![Phase::Started, Phase::Canceled]);
}

#[test]
fn test_explicit_event_times() {
    let yaml = r#"
devices: [{ layout: Gamepad }]
actions:
  - name: charge
    bindings: [{ path: "<Gamepad>/buttonSouth", interactions: "hold(duration=0.4)" }]
steps:
  - at: 1.0
  - set: { control: "<Gamepad>/buttonSouth", value: 1.0, time: 0.2 }
  - update
"#;
    let report = Scenario::from_yaml(yaml).unwrap().run().unwrap();

    // Started at the event time, performed by the timer pass at the end of the update
    let phases: Vec<Phase> = report.events.iter().map(|e| e.phase).collect();
    assert_eq!(phases, vec![Phase::Started, Phase::Performed]);
    assert_eq!(report.events[0].time, 0.2);
    assert_eq!(report.events[1].time, 1.0);
    assert_eq!(report.events[1].start_time, 0.2);
}

#[test]
fn test_enable_and_disable_steps() {
    let yaml = r#"
devices: [{ layout: Gamepad }]
actions:
  - name: fire
    bindings: [{ path: "<Gamepad>/rightTrigger" }]
enable_actions: false
steps:
  - set: { control: "<Gamepad>/rightTrigger", value: 1.0 }
  - update
  - enable: fire
  - set: { control: "<Gamepad>/rightTrigger", value: 0.0 }
  - update
  - advance: 0.1
  - set: { control: "<Gamepad>/rightTrigger", value: 1.0 }
  - update
  - disable: fire
"#;
    let report = Scenario::from_yaml(yaml).unwrap().run().unwrap();
    let phases: Vec<Phase> = report.events.iter().map(|e| e.phase).collect();
    assert_eq!(phases, vec![Phase::Started, Phase::Performed, Phase::Canceled]);
    assert_eq!(report.events[0].time, 0.1);
    assert_eq!(report.updates, 3);
    assert!((report.final_time - 0.1).abs() < 1e-9);
}

#[test]
fn test_device_usages_and_second_device() {
    let yaml = r#"
devices:
  - layout: Gamepad
  - layout: Gamepad
    usages: [RightHand]
actions:
  - name: grab
    bindings: [{ path: "<Gamepad>{RightHand}/buttonSouth" }]
steps:
  - set: { control: "<Gamepad>/buttonSouth", value: 1.0 }
  - update
  - set: { control: "/Gamepad1/buttonSouth", value: 1.0 }
  - update
"#;
    let report = Scenario::from_yaml(yaml).unwrap().run().unwrap();
    assert_eq!(report.events.len(), 2);
    assert!(report.events.iter().all(|e| e.control_path == "/Gamepad1/buttonSouth"));
}

#[test]
fn test_report_serializes_to_json() {
    let report = Scenario::from_yaml(TAP).unwrap().run().unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["updates"], 2);
    assert_eq!(json["events"][0]["phase"], "Started");
    assert_eq!(json["events"][1]["action_name"], "jump");
    assert_eq!(json["events"][1]["interaction"], "tap");
}

#[test]
fn test_missing_file_reports_path() {
    let err = Scenario::load("/nonexistent/scenario.yaml").unwrap_err();
    assert!(format!("{:#}", err).contains("/nonexistent/scenario.yaml"));
}

#[test]
fn test_unknown_control_fails_the_step() {
    let yaml = r#"
devices: [{ layout: Gamepad }]
steps:
  - update
  - set: { control: "<Gamepad>/missing", value: 1.0 }
"#;
    let err = Scenario::from_yaml(yaml).unwrap().run().unwrap_err();
    assert!(format!("{:#}", err).contains("Step 1"));
}
