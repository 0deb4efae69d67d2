//! Action phase behavior driven through the full update loop

use actionmap::device::ControlId;
use actionmap::{
    ActionDef, ActionId, ActionTrace, BindingDef, InputSettings, InputSystem, ManualClock, Phase,
};
use proptest::prelude::*;

struct Rig {
    system: InputSystem,
    clock: ManualClock,
    trace: ActionTrace,
}

impl Rig {
    fn new() -> Self {
        let clock = ManualClock::new(0.0);
        let mut system = InputSystem::with_clock(InputSettings::default(), clock.clone()).unwrap();
        system.add_device("Gamepad").unwrap();
        Self {
            system,
            clock,
            trace: ActionTrace::new(),
        }
    }

    fn action(&mut self, def: ActionDef) -> ActionId {
        let id = self.system.add_action(def);
        self.trace.subscribe_to(&mut self.system, id).unwrap();
        self.system.enable_action(id).unwrap();
        id
    }

    fn control(&self, path: &str) -> ControlId {
        self.system.control(path).unwrap()
    }

    /// Set `control` at `time` and run an update
    fn set(&mut self, control: ControlId, value: f32, time: f64) -> Vec<Phase> {
        self.clock.set(time);
        self.system.queue_value(control, value).unwrap();
        self.tick(time)
    }

    /// Queue a south button event stamped with `time` without updating
    fn queue_south(&self, value: f32, time: f64) {
        let pad = self.system.device_by_name("Gamepad").unwrap().id();
        let event = self
            .system
            .state_event(pad)
            .unwrap()
            .set("buttonSouth", value)
            .unwrap()
            .at(time)
            .build();
        self.system.queue_event(event);
    }

    /// Run an update at `time` without input
    fn tick(&mut self, time: f64) -> Vec<Phase> {
        self.clock.set(time);
        self.trace.clear();
        self.system.update();
        self.trace.phases()
    }
}

fn south_with(interactions: &str) -> BindingDef {
    BindingDef::new("<Gamepad>/buttonSouth").with_interactions(interactions)
}

fn hold_action() -> ActionDef {
    ActionDef::button("charge")
        .with_binding_def(south_with("hold(duration=0.4)"))
}

#[test]
fn test_hold_timeline() {
    let mut rig = Rig::new();
    let action = rig.action(hold_action());
    let south = rig.control("<Gamepad>/buttonSouth");

    assert_eq!(rig.set(south, 1.0, 10.0), vec![Phase::Started]);
    assert_eq!(rig.set(south, 0.0, 10.25), vec![Phase::Canceled]);
    let canceled = rig.trace.events()[0].clone();
    assert!((canceled.duration() - 0.25).abs() < 1e-9);
    assert_eq!(canceled.interaction.as_deref(), Some("hold"));

    assert_eq!(rig.set(south, 1.0, 10.5), vec![Phase::Started]);
    assert_eq!(rig.tick(11.0), vec![Phase::Performed]);
    let performed = rig.trace.events()[0].clone();
    assert_eq!(performed.time, 11.0);
    assert_eq!(performed.start_time, 10.5);
    assert_eq!(rig.system.action_phase(action).unwrap(), Phase::Performed);

    assert_eq!(rig.set(south, 0.0, 11.5), vec![Phase::Canceled]);
    let canceled = rig.trace.events()[0].clone();
    assert!((canceled.duration() - 1.0).abs() < 1e-9);
    assert_eq!(canceled.read_value::<f32>(), 0.0);
    assert_eq!(rig.system.action_phase(action).unwrap(), Phase::Waiting);
}

#[test]
fn test_hold_completion_advances_without_update() {
    let mut rig = Rig::new();
    let action = rig.action(hold_action());
    let south = rig.control("<Gamepad>/buttonSouth");

    assert_eq!(rig.system.timeout_completion_percentage(action).unwrap(), 0.0);
    rig.set(south, 1.0, 2.0);

    rig.clock.set(2.1);
    let completion = rig.system.timeout_completion_percentage(action).unwrap();
    assert!((completion - 0.25).abs() < 1e-5);

    rig.clock.set(2.3);
    let completion = rig.system.timeout_completion_percentage(action).unwrap();
    assert!((completion - 0.75).abs() < 1e-5);

    rig.tick(2.5);
    assert_eq!(rig.system.timeout_completion_percentage(action).unwrap(), 1.0);
}

#[test]
fn test_tap_completion_advances_without_update() {
    let mut rig = Rig::new();
    let action = rig.action(
        ActionDef::button("tap").with_binding_def(south_with("tap")),
    );
    let south = rig.control("<Gamepad>/buttonSouth");

    assert_eq!(rig.system.timeout_completion_percentage(action).unwrap(), 0.0);
    rig.set(south, 1.0, 1.0);

    rig.clock.set(1.1);
    let completion = rig.system.timeout_completion_percentage(action).unwrap();
    assert!((completion - 0.5).abs() < 1e-5);

    rig.clock.set(1.15);
    let completion = rig.system.timeout_completion_percentage(action).unwrap();
    assert!((completion - 0.75).abs() < 1e-5);

    assert_eq!(rig.tick(1.3), vec![Phase::Canceled]);
    assert_eq!(rig.system.timeout_completion_percentage(action).unwrap(), 0.0);
}

#[test]
fn test_multi_tap_completion_spans_every_window() {
    let mut rig = Rig::new();
    let action = rig.action(ActionDef::button("dash").with_binding_def(
        south_with("multiTap(tapCount=2,tapTime=0.2,tapDelay=0.3)"),
    ));
    let south = rig.control("<Gamepad>/buttonSouth");

    assert_eq!(rig.system.timeout_completion_percentage(action).unwrap(), 0.0);
    rig.set(south, 1.0, 1.0);

    // Halfway through the first tap window
    rig.clock.set(1.1);
    let completion = rig.system.timeout_completion_percentage(action).unwrap();
    assert!((completion - 0.125).abs() < 1e-5);

    // Halfway through the delay before the second tap
    assert!(rig.set(south, 0.0, 1.15).is_empty());
    rig.clock.set(1.3);
    let completion = rig.system.timeout_completion_percentage(action).unwrap();
    assert!((completion - 0.375).abs() < 1e-5);

    assert_eq!(rig.tick(1.5), vec![Phase::Canceled]);
    assert_eq!(rig.system.timeout_completion_percentage(action).unwrap(), 0.0);
}

#[test]
fn test_tap_performs_on_quick_release_and_cancels_on_timeout() {
    let mut rig = Rig::new();
    rig.action(
        ActionDef::button("tap").with_binding_def(south_with("tap")),
    );
    let south = rig.control("<Gamepad>/buttonSouth");

    assert_eq!(rig.set(south, 1.0, 1.0), vec![Phase::Started]);
    assert_eq!(rig.set(south, 0.0, 1.1), vec![Phase::Performed]);

    assert_eq!(rig.set(south, 1.0, 2.0), vec![Phase::Started]);
    assert!(rig.tick(2.1).is_empty());
    assert_eq!(rig.tick(2.3), vec![Phase::Canceled]);
    assert!(rig.set(south, 0.0, 2.4).is_empty());
}

#[test]
fn test_tap_released_exactly_at_duration_performs() {
    let mut rig = Rig::new();
    rig.action(
        ActionDef::button("tap").with_binding_def(south_with("tap")),
    );
    let south = rig.control("<Gamepad>/buttonSouth");

    assert_eq!(rig.set(south, 1.0, 0.0), vec![Phase::Started]);
    // The release reaches the tap before its due timer
    assert_eq!(rig.set(south, 0.0, 0.2), vec![Phase::Performed]);
    assert!(rig.system.timers().is_empty());
}

#[test]
fn test_hold_released_late_within_one_update_cancels() {
    let mut rig = Rig::new();
    let action = rig.action(hold_action());
    rig.queue_south(1.0, 0.0);
    rig.queue_south(0.0, 0.5);

    assert_eq!(rig.tick(0.5), vec![Phase::Started, Phase::Canceled]);
    assert!(!rig.system.was_performed_this_update(action).unwrap());
    assert!(rig.system.timers().is_empty());
}

#[test]
fn test_multi_tap_rounds() {
    let mut rig = Rig::new();
    rig.action(ActionDef::button("dash").with_binding_def(
        south_with("multiTap(tapTime=0.2,tapDelay=0.3)"),
    ));
    let south = rig.control("<Gamepad>/buttonSouth");

    assert_eq!(rig.set(south, 1.0, 0.0), vec![Phase::Started]);
    assert!(rig.set(south, 0.0, 0.1).is_empty());
    assert!(rig.set(south, 1.0, 0.3).is_empty());
    assert_eq!(rig.set(south, 0.0, 0.4), vec![Phase::Performed]);

    // Second tap never comes
    assert_eq!(rig.set(south, 1.0, 1.0), vec![Phase::Started]);
    assert!(rig.set(south, 0.0, 1.1).is_empty());
    assert_eq!(rig.tick(1.5), vec![Phase::Canceled]);
}

#[test]
fn test_tap_hands_over_to_slow_tap() {
    let mut rig = Rig::new();
    rig.action(ActionDef::button("attack").with_binding_def(
        south_with("tap,slowTap"),
    ));
    let south = rig.control("<Gamepad>/buttonSouth");

    assert_eq!(rig.set(south, 1.0, 0.0), vec![Phase::Started]);
    assert_eq!(rig.tick(0.3), vec![Phase::Canceled, Phase::Started]);
    let handed_over = rig.trace.events()[1].clone();
    assert_eq!(handed_over.interaction.as_deref(), Some("slowTap"));
    assert_eq!(handed_over.start_time, 0.0);

    assert_eq!(rig.set(south, 0.0, 0.7), vec![Phase::Performed]);
    let performed = rig.trace.events()[0].clone();
    assert_eq!(performed.interaction.as_deref(), Some("slowTap"));
    assert!((performed.duration() - 0.7).abs() < 1e-9);
}

#[test]
fn test_late_release_within_one_update_ends_the_chain() {
    let mut rig = Rig::new();
    let action = rig.action(ActionDef::button("attack").with_binding_def(
        south_with("tap,slowTap"),
    ));
    rig.queue_south(1.0, 0.0);
    rig.queue_south(0.0, 0.7);

    // Tap sees the release after its window; slowTap replays a released button
    assert_eq!(rig.tick(0.7), vec![Phase::Started, Phase::Canceled]);
    assert_eq!(rig.trace.events()[1].interaction.as_deref(), Some("tap"));
    assert!(!rig.system.was_performed_this_update(action).unwrap());
    assert_eq!(rig.system.action_phase(action).unwrap(), Phase::Waiting);
    assert!(rig.system.timers().is_empty());
}

#[test]
fn test_tap_wins_chain_when_released_quickly() {
    let mut rig = Rig::new();
    rig.action(ActionDef::button("attack").with_binding_def(
        south_with("tap,slowTap"),
    ));
    let south = rig.control("<Gamepad>/buttonSouth");

    rig.set(south, 1.0, 0.0);
    assert_eq!(rig.set(south, 0.0, 0.1), vec![Phase::Performed]);
    assert_eq!(rig.trace.events()[0].interaction.as_deref(), Some("tap"));
}

#[test]
fn test_release_only_press() {
    let mut rig = Rig::new();
    rig.action(ActionDef::button("throw").with_binding_def(
        BindingDef::new("<Gamepad>/leftTrigger").with_interactions("press(behavior=1)"),
    ));
    let trigger = rig.control("<Gamepad>/leftTrigger");

    assert_eq!(rig.set(trigger, 0.35, 0.0), vec![Phase::Started]);
    assert!(rig.set(trigger, 0.5, 0.1).is_empty());
    assert_eq!(rig.set(trigger, 0.3, 0.2), vec![Phase::Performed, Phase::Canceled]);
}

#[test]
fn test_button_started_and_canceled_pair_within_one_update() {
    let mut rig = Rig::new();
    let action = rig.action(ActionDef::button("fire").with_binding("<Gamepad>/buttonSouth"));
    let south = rig.control("<Gamepad>/buttonSouth");

    rig.system.queue_value(south, 1.0).unwrap();
    rig.system.queue_value(south, 0.0).unwrap();
    assert_eq!(rig.tick(1.0), vec![Phase::Started, Phase::Performed, Phase::Canceled]);
    assert!(rig.system.was_performed_this_update(action).unwrap());

    rig.tick(1.1);
    assert!(!rig.system.was_performed_this_update(action).unwrap());
}

#[test]
fn test_button_stays_performed_while_another_control_holds_it() {
    let mut rig = Rig::new();
    let action = rig.action(
        ActionDef::button("fire")
            .with_binding("<Gamepad>/buttonSouth")
            .with_binding("<Gamepad>/buttonNorth"),
    );
    let south = rig.control("<Gamepad>/buttonSouth");
    let north = rig.control("<Gamepad>/buttonNorth");

    assert_eq!(rig.set(south, 1.0, 0.0), vec![Phase::Started, Phase::Performed]);
    // Equal actuation keeps the current control
    assert!(rig.set(north, 1.0, 0.1).is_empty());
    assert!(rig.set(south, 0.0, 0.2).is_empty());
    assert_eq!(rig.system.action_phase(action).unwrap(), Phase::Performed);

    assert_eq!(rig.set(north, 0.0, 0.3), vec![Phase::Canceled]);
    assert_eq!(rig.trace.events()[0].control, north);
}

#[test]
fn test_most_actuated_trigger_drives_value_action() {
    let mut rig = Rig::new();
    let action = rig.action(
        ActionDef::value("throttle")
            .with_binding("<Gamepad>/leftTrigger")
            .with_binding("<Gamepad>/rightTrigger"),
    );
    let left = rig.control("<Gamepad>/leftTrigger");
    let right = rig.control("<Gamepad>/rightTrigger");

    assert_eq!(rig.set(left, 0.3, 0.0), vec![Phase::Started, Phase::Performed]);

    assert_eq!(rig.set(right, 0.6, 0.1), vec![Phase::Performed]);
    let event = rig.trace.events()[0].clone();
    assert_eq!(event.control, right);
    assert!((event.read_value::<f32>() - 0.6).abs() < 1e-6);
    assert_eq!(event.start_time, 0.0);

    // Weaker than the driving trigger
    assert!(rig.set(left, 0.4, 0.2).is_empty());

    assert_eq!(rig.set(right, 0.0, 0.3), vec![Phase::Performed]);
    let event = rig.trace.events()[0].clone();
    assert_eq!(event.control, left);
    assert!((event.read_value::<f32>() - 0.4).abs() < 1e-6);
    assert!((rig.system.read_action_value::<f32>(action).unwrap() - 0.4).abs() < 1e-6);

    assert_eq!(rig.set(left, 0.0, 0.4), vec![Phase::Canceled]);
    assert_eq!(rig.system.action_phase(action).unwrap(), Phase::Waiting);
}

#[test]
fn test_hold_moves_to_the_stronger_trigger() {
    let mut rig = Rig::new();
    let hold = |path: &str| BindingDef::new(path).with_interactions("hold(duration=0.4)");
    rig.action(
        ActionDef::button("charge")
            .with_binding_def(hold("<Gamepad>/leftTrigger"))
            .with_binding_def(hold("<Gamepad>/rightTrigger")),
    );
    let left = rig.control("<Gamepad>/leftTrigger");
    let right = rig.control("<Gamepad>/rightTrigger");

    assert_eq!(rig.set(left, 0.6, 0.0), vec![Phase::Started]);
    assert!(rig.set(right, 1.0, 0.1).is_empty());
    // Releasing the weaker trigger no longer cancels
    assert!(rig.set(left, 0.0, 0.2).is_empty());
    assert_eq!(rig.system.timers().len(), 1);

    assert_eq!(rig.tick(0.4), vec![Phase::Performed]);
    let performed = rig.trace.events()[0].clone();
    assert_eq!(performed.control, right);
    assert_eq!(performed.start_time, 0.0);
}

#[test]
fn test_value_action_performs_on_every_change() {
    let mut rig = Rig::new();
    let action = rig.action(ActionDef::value("throttle").with_binding("<Gamepad>/rightTrigger"));
    let trigger = rig.control("<Gamepad>/rightTrigger");

    assert_eq!(rig.set(trigger, 0.3, 0.0), vec![Phase::Started, Phase::Performed]);
    assert_eq!(rig.set(trigger, 0.6, 0.1), vec![Phase::Performed]);
    assert!((rig.system.read_action_value::<f32>(action).unwrap() - 0.6).abs() < 1e-6);
    assert_eq!(rig.set(trigger, 0.0, 0.2), vec![Phase::Canceled]);
    assert_eq!(rig.system.read_action_value::<f32>(action).unwrap(), 0.0);
}

#[test]
fn test_pass_through_reports_every_change() {
    let mut rig = Rig::new();
    rig.action(ActionDef::pass_through("look").with_binding("<Gamepad>/leftTrigger"));
    let trigger = rig.control("<Gamepad>/leftTrigger");

    assert_eq!(rig.set(trigger, 0.2, 0.0), vec![Phase::Performed]);
    assert_eq!(rig.set(trigger, 0.0, 0.1), vec![Phase::Performed]);
}

#[test]
fn test_disabling_in_progress_action_cancels() {
    let mut rig = Rig::new();
    let action = rig.action(hold_action());
    let south = rig.control("<Gamepad>/buttonSouth");

    rig.set(south, 1.0, 0.0);
    rig.trace.clear();
    rig.system.disable_action(action).unwrap();
    assert_eq!(rig.trace.phases(), vec![Phase::Canceled]);
    assert!(rig.system.monitors().is_empty());
    assert!(rig.system.timers().is_empty());

    // No timer left to perform the hold
    assert!(rig.tick(1.0).is_empty());
}

#[test]
fn test_binding_override_rebinds_live_action() {
    let mut rig = Rig::new();
    let action = rig.action(ActionDef::button("fire").with_binding("<Gamepad>/buttonSouth"));
    let south = rig.control("<Gamepad>/buttonSouth");
    let east = rig.control("<Gamepad>/buttonEast");

    rig.system.apply_binding_override(action, 0, "<Gamepad>/buttonEast").unwrap();
    assert_eq!(rig.system.action_controls(action).unwrap(), vec![east]);
    assert!(rig.set(south, 1.0, 0.0).is_empty());
    assert_eq!(rig.set(east, 1.0, 0.1), vec![Phase::Started, Phase::Performed]);

    rig.system.remove_all_binding_overrides(action).unwrap();
    assert_eq!(rig.system.action_controls(action).unwrap(), vec![south]);
    assert!(rig.system.apply_binding_override(action, 3, "<Gamepad>/start").is_err());
}

#[test]
fn test_bad_interaction_fails_enable() {
    let mut rig = Rig::new();
    let id = rig.system.add_action(
        ActionDef::button("broken")
            .with_binding_def(south_with("hold(duration=x)")),
    );
    assert!(rig.system.enable_action(id).is_err());
    assert!(!rig.system.is_action_enabled(id).unwrap());
    assert!(rig.system.monitors().is_empty());
}

#[test]
fn test_action_follows_added_devices() {
    let mut rig = Rig::new();
    let action = rig.action(ActionDef::button("fire").with_binding("<Gamepad>/buttonSouth"));
    assert_eq!(rig.system.action_controls(action).unwrap().len(), 1);

    let second = rig.system.add_device("Gamepad").unwrap();
    assert_eq!(rig.system.device(second).unwrap().name, "Gamepad1");
    assert_eq!(rig.system.action_controls(action).unwrap().len(), 2);

    let south = rig.system.control("/Gamepad1/buttonSouth").unwrap();
    assert_eq!(rig.set(south, 1.0, 0.0), vec![Phase::Started, Phase::Performed]);
    assert_eq!(rig.trace.events()[0].control_path, "/Gamepad1/buttonSouth");

    rig.system.remove_device(second).unwrap();
    assert_eq!(rig.system.action_controls(action).unwrap().len(), 1);
    assert_eq!(rig.system.action_phase(action).unwrap(), Phase::Waiting);
}

proptest! {
    #[test]
    fn prop_hold_completion_is_monotonic(
        duration in 0.1f64..2.0,
        offsets in proptest::collection::vec(0.0f64..4.0, 1..20),
    ) {
        let mut rig = Rig::new();
        let action = rig.action(
            ActionDef::button("charge").with_binding_def(
                BindingDef::new("<Gamepad>/buttonSouth")
                    .with_interactions(format!("hold(duration={})", duration)),
            ),
        );
        let south = rig.control("<Gamepad>/buttonSouth");
        rig.set(south, 1.0, 1.0);

        let mut offsets = offsets;
        offsets.sort_by(f64::total_cmp);
        let mut last = 0.0f32;
        for offset in offsets {
            rig.clock.set(1.0 + offset);
            let completion = rig.system.timeout_completion_percentage(action).unwrap();
            prop_assert!((0.0..=1.0).contains(&completion));
            prop_assert!(completion >= last);
            last = completion;
        }
    }

    #[test]
    fn prop_tap_completion_is_monotonic_until_cancel(
        duration in 0.1f64..1.0,
        offsets in proptest::collection::vec(0.0f64..2.0, 1..20),
    ) {
        let mut rig = Rig::new();
        let action = rig.action(
            ActionDef::button("tap").with_binding_def(
                BindingDef::new("<Gamepad>/buttonSouth")
                    .with_interactions(format!("tap(duration={})", duration)),
            ),
        );
        let south = rig.control("<Gamepad>/buttonSouth");
        rig.set(south, 1.0, 1.0);

        let mut offsets = offsets;
        offsets.sort_by(f64::total_cmp);
        let mut last = 0.0f32;
        for offset in offsets {
            rig.clock.set(1.0 + offset);
            let completion = rig.system.timeout_completion_percentage(action).unwrap();
            prop_assert!((0.0..=1.0).contains(&completion));
            prop_assert!(completion >= last);
            last = completion;
        }

        rig.tick(1.0 + duration + 0.5);
        prop_assert_eq!(rig.system.timeout_completion_percentage(action).unwrap(), 0.0);
    }
}
