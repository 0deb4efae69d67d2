//! Scripted input scenarios
//!
//! A scenario describes devices, actions and a timeline of steps in YAML and
//! replays them against an [`InputSystem`] driven by a [`ManualClock`]:
//!
//! ```yaml
//! devices:
//!   - layout: Gamepad
//! actions:
//!   - name: charge
//!     bindings:
//!       - path: "<Gamepad>/buttonSouth"
//!         interactions: "hold(duration=0.4)"
//! steps:
//!   - at: 10.0
//!   - set: { control: "<Gamepad>/buttonSouth", value: 1.0 }
//!   - update
//!   - advance: 0.5
//!   - update
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::action::{ActionDef, ActionEvent, ActionTrace};
use crate::clock::ManualClock;
use crate::config::InputSettings;
use crate::device::Value;
use crate::system::InputSystem;

/// A device to create before the first step
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceSpec {
    pub layout: String,
    #[serde(default)]
    pub usages: Vec<String>,
}

/// Queue one control value
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SetStep {
    /// Binding path; the first matching control is written
    pub control: String,
    pub value: Value,
    /// Event time; defaults to the clock time at the next update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Set the clock to an absolute time
    At(f64),
    /// Move the clock forward
    Advance(f64),
    Set(SetStep),
    Update,
    Enable(String),
    Disable(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Scenario {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<InputSettings>,
    #[serde(default = "default_start_time")]
    pub start_time: f64,
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
    #[serde(default)]
    pub actions: Vec<ActionDef>,
    /// Enable every action before the first step
    #[serde(default = "default_enable_actions")]
    pub enable_actions: bool,
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub steps: Vec<Step>,
}

/// What a replay produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub events: Vec<ActionEvent>,
    pub updates: u64,
    pub final_time: f64,
}

impl Scenario {
    /// Load a scenario from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("Failed to parse scenario: {}", path.display()))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let scenario: Scenario = serde_yaml::from_str(yaml)?;
        Ok(scenario)
    }

    /// Replay with the scenario's own settings
    pub fn run(&self) -> Result<ScenarioReport> {
        self.run_with(self.settings.clone().unwrap_or_default())
    }

    /// Replay with explicit settings
    pub fn run_with(&self, settings: InputSettings) -> Result<ScenarioReport> {
        let clock = ManualClock::new(self.start_time);
        let mut system =
            InputSystem::with_clock(settings, clock.clone()).context("Invalid settings")?;

        for spec in &self.devices {
            let id = system
                .add_device(&spec.layout)
                .with_context(|| format!("Failed to add device '{}'", spec.layout))?;
            if !spec.usages.is_empty() {
                system.set_device_usages(id, &spec.usages)?;
            }
        }

        let trace = ActionTrace::new();
        trace.subscribe_to_all(&mut system);
        for def in &self.actions {
            let name = def.name.clone();
            let id = system.add_action(def.clone());
            if self.enable_actions {
                system
                    .enable_action(id)
                    .with_context(|| format!("Failed to enable action '{}'", name))?;
            }
        }

        for (index, step) in self.steps.iter().enumerate() {
            debug!("Step {}: {:?}", index, step);
            self.apply_step(&mut system, &clock, step)
                .with_context(|| format!("Step {} failed", index))?;
        }

        let report = ScenarioReport {
            events: trace.drain(),
            updates: system.update_count(),
            final_time: system.now(),
        };
        info!(
            "Scenario finished: {} event(s) over {} update(s)",
            report.events.len(),
            report.updates
        );
        Ok(report)
    }

    fn apply_step(&self, system: &mut InputSystem, clock: &ManualClock, step: &Step) -> Result<()> {
        match step {
            Step::At(time) => clock.set(*time),
            Step::Advance(seconds) => clock.advance(*seconds),
            Step::Update => system.update(),
            Step::Set(set) => {
                let control = system.control(&set.control)?;
                match set.time {
                    None => system.queue_value(control, set.value)?,
                    Some(time) => {
                        let event = system
                            .state_event(control.device)?
                            .set_control(control, set.value)?
                            .at(time)
                            .build();
                        system.queue_event(event);
                    }
                }
            }
            Step::Enable(name) => {
                let id = system
                    .action_by_name(name)
                    .with_context(|| format!("Unknown action '{}'", name))?;
                system.enable_action(id)?;
            }
            Step::Disable(name) => {
                let id = system
                    .action_by_name(name)
                    .with_context(|| format!("Unknown action '{}'", name))?;
                system.disable_action(id)?;
            }
        }
        Ok(())
    }
}

fn default_start_time() -> f64 { 0.0 }
fn default_enable_actions() -> bool { true }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interactions::Phase;

    const HOLD: &str = r#"
devices:
  - layout: Gamepad
actions:
  - name: charge
    bindings:
      - path: "<Gamepad>/buttonSouth"
        interactions: "hold(duration=0.4)"
steps:
  - at: 10.0
  - set: { control: "<Gamepad>/buttonSouth", value: 1.0 }
  - update
  - advance: 0.5
  - update
  - set: { control: "<Gamepad>/buttonSouth", value: 0.0 }
  - update
"#;

    #[test]
    fn test_hold_scenario_replays() {
        let scenario = Scenario::from_yaml(HOLD).unwrap();
        let report = scenario.run().unwrap();

        let phases: Vec<Phase> = report.events.iter().map(|e| e.phase).collect();
        assert_eq!(phases, vec![Phase::Started, Phase::Performed, Phase::Canceled]);
        assert_eq!(report.events[1].time, 10.5);
        assert_eq!(report.updates, 3);
        assert_eq!(report.final_time, 10.5);
    }

    #[test]
    fn test_unknown_action_step_fails() {
        let yaml = "steps:\n  - enable: missing\n";
        let err = Scenario::from_yaml(yaml).unwrap().run().unwrap_err();
        assert!(format!("{:#}", err).contains("missing"));
    }

    #[test]
    fn test_bad_interaction_fails_at_enable() {
        let yaml = r#"
devices: [{ layout: Gamepad }]
actions:
  - name: broken
    bindings: [{ path: "<Gamepad>/buttonSouth", interactions: "hold(duration=abc)" }]
"#;
        let err = Scenario::from_yaml(yaml).unwrap().run().unwrap_err();
        assert!(format!("{:#}", err).contains("broken"));
    }
}
