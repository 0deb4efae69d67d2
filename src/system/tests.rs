//! Tests for the input system core loop

use super::*;
use crate::clock::ManualClock;
use crate::monitor::{on_change, MonitorContext, StateChange, TimerExpiry};
use parking_lot::Mutex;
use std::sync::Arc;

type Log = Arc<Mutex<Vec<String>>>;

fn system() -> (InputSystem, ManualClock, DeviceId) {
    let clock = ManualClock::new(0.0);
    let mut system = InputSystem::with_clock(InputSettings::default(), clock.clone()).unwrap();
    let pad = system.add_device("Gamepad").unwrap();
    (system, clock, pad)
}

fn logging(log: &Log, name: &'static str) -> impl StateChangeMonitor + 'static {
    let log = Arc::clone(log);
    on_change(move |_cx: &mut MonitorContext<'_>, _change: &StateChange<'_>| {
        log.lock().push(name.to_string());
        Ok(())
    })
}

/// Arms a timeout on every change and re-arms it once when it fires
struct Rearming {
    log: Log,
    delay: f64,
    rearmed: bool,
}

impl StateChangeMonitor for Rearming {
    fn notify_control_state_changed(
        &mut self,
        cx: &mut MonitorContext<'_>,
        change: &StateChange<'_>,
    ) -> anyhow::Result<()> {
        let expiration = cx.time() + self.delay;
        cx.add_change_monitor_timeout(change.control, change.monitor, expiration, 7);
        Ok(())
    }

    fn notify_timer_expired(
        &mut self,
        cx: &mut MonitorContext<'_>,
        expiry: &TimerExpiry,
    ) -> anyhow::Result<()> {
        self.log.lock().push(format!("timer {} at {}", expiry.timer_index, expiry.time));
        if !self.rearmed {
            self.rearmed = true;
            // Already due, but must wait for the next pass
            cx.add_change_monitor_timeout(expiry.control, expiry.monitor, expiry.time, 7);
        }
        Ok(())
    }
}

#[test]
fn test_monitor_removing_itself_does_not_disturb_others() {
    let (mut system, _clock, _pad) = system();
    let south = system.control("<Gamepad>/buttonSouth").unwrap();
    let log: Log = Arc::default();

    let first_log = Arc::clone(&log);
    system
        .add_change_monitor(
            south,
            on_change(move |cx: &mut MonitorContext<'_>, change: &StateChange<'_>| {
                first_log.lock().push("first".into());
                cx.remove_change_monitor(change.monitor);
                Ok(())
            }),
            0,
        )
        .unwrap();
    system.add_change_monitor(south, logging(&log, "second"), 0).unwrap();

    system.queue_value(south, 1.0).unwrap();
    system.update();
    assert_eq!(*log.lock(), vec!["first", "second"]);

    system.queue_value(south, 0.0).unwrap();
    system.update();
    assert_eq!(*log.lock(), vec!["first", "second", "second"]);
    assert_eq!(system.monitors().monitors_on(south).len(), 1);
}

#[test]
fn test_monitor_removed_mid_event_never_fires() {
    let (mut system, _clock, _pad) = system();
    let south = system.control("<Gamepad>/buttonSouth").unwrap();
    let log: Log = Arc::default();

    let victim: Arc<Mutex<Option<MonitorHandle>>> = Arc::default();
    let target = Arc::clone(&victim);
    system
        .add_change_monitor(
            south,
            on_change(move |cx: &mut MonitorContext<'_>, _change: &StateChange<'_>| {
                if let Some(handle) = target.lock().take() {
                    cx.remove_change_monitor(handle);
                }
                Ok(())
            }),
            0,
        )
        .unwrap();
    let handle = system.add_change_monitor(south, logging(&log, "victim"), 0).unwrap();
    *victim.lock() = Some(handle);

    system.queue_value(south, 1.0).unwrap();
    system.update();
    assert!(log.lock().is_empty());
}

#[test]
fn test_monitor_added_mid_event_waits_for_next_event() {
    let (mut system, _clock, _pad) = system();
    let south = system.control("<Gamepad>/buttonSouth").unwrap();
    let log: Log = Arc::default();

    let late_log = Arc::clone(&log);
    let added = Arc::new(Mutex::new(false));
    system
        .add_change_monitor(
            south,
            on_change(move |cx: &mut MonitorContext<'_>, change: &StateChange<'_>| {
                let mut added = added.lock();
                if !*added {
                    *added = true;
                    cx.add_change_monitor(change.control, logging(&late_log, "late"), 0)?;
                }
                Ok(())
            }),
            0,
        )
        .unwrap();

    system.queue_value(south, 1.0).unwrap();
    system.update();
    assert!(log.lock().is_empty());

    system.queue_value(south, 0.0).unwrap();
    system.update();
    assert_eq!(*log.lock(), vec!["late"]);
}

#[test]
fn test_failing_callback_does_not_stop_others() {
    let (mut system, _clock, _pad) = system();
    let south = system.control("<Gamepad>/buttonSouth").unwrap();
    let log: Log = Arc::default();

    system
        .add_change_monitor(
            south,
            on_change(|_cx: &mut MonitorContext<'_>, _change: &StateChange<'_>| {
                Err(anyhow::anyhow!("boom"))
            }),
            0,
        )
        .unwrap();
    system.add_change_monitor(south, logging(&log, "after"), 0).unwrap();

    system.queue_value(south, 1.0).unwrap();
    system.update();
    assert_eq!(*log.lock(), vec!["after"]);
}

#[test]
fn test_owner_index_and_order_across_controls() {
    let (mut system, _clock, pad) = system();
    let south = system.control("<Gamepad>/buttonSouth").unwrap();
    let trigger = system.control("<Gamepad>/leftTrigger").unwrap();
    let log: Log = Arc::default();

    let record = |log: &Log| {
        let log = Arc::clone(log);
        on_change(move |_cx: &mut MonitorContext<'_>, change: &StateChange<'_>| {
            log.lock().push(format!("owner {}", change.owner_index));
            Ok(())
        })
    };
    // Registered trigger first; declaration order still puts the button first
    system.add_change_monitor(trigger, record(&log), 2).unwrap();
    system.add_change_monitor(south, record(&log), 1).unwrap();

    let event = system
        .state_event(pad)
        .unwrap()
        .set("leftTrigger", 1.0)
        .unwrap()
        .set("buttonSouth", 1.0)
        .unwrap()
        .build();
    system.queue_event(event);
    system.update();
    assert_eq!(*log.lock(), vec!["owner 1", "owner 2"]);
}

#[test]
fn test_timeouts_fire_once_and_rearm_for_next_pass() {
    let (mut system, clock, _pad) = system();
    let south = system.control("<Gamepad>/buttonSouth").unwrap();
    let log: Log = Arc::default();

    system
        .add_change_monitor(
            south,
            Rearming {
                log: Arc::clone(&log),
                delay: 0.5,
                rearmed: false,
            },
            0,
        )
        .unwrap();

    clock.set(1.0);
    system.queue_value(south, 1.0).unwrap();
    system.update();
    assert_eq!(system.timers().len(), 1);
    assert!(log.lock().is_empty());

    clock.set(2.0);
    system.update();
    assert_eq!(*log.lock(), vec!["timer 7 at 2"]);
    assert_eq!(system.timers().len(), 1);

    system.update();
    assert_eq!(log.lock().len(), 2);
    assert!(system.timers().is_empty());
}

#[test]
fn test_removing_monitor_drops_its_timeouts() {
    let (mut system, clock, _pad) = system();
    let south = system.control("<Gamepad>/buttonSouth").unwrap();
    let log: Log = Arc::default();
    let handle = system
        .add_change_monitor(
            south,
            Rearming {
                log: Arc::clone(&log),
                delay: 0.1,
                rearmed: true,
            },
            0,
        )
        .unwrap();
    system.add_change_monitor_timeout(south, handle, 0.5, 1);
    system.add_change_monitor_timeout(south, handle, 0.7, 2);

    assert!(system.remove_change_monitor(handle));
    assert!(system.timers().is_empty());

    clock.set(5.0);
    system.update();
    assert!(log.lock().is_empty());
}

#[test]
fn test_delta_event_only_signals_covered_controls() {
    let (mut system, _clock, _pad) = system();
    let south = system.control("<Gamepad>/buttonSouth").unwrap();
    let trigger = system.control("<Gamepad>/leftTrigger").unwrap();
    let log: Log = Arc::default();
    system.add_change_monitor(south, logging(&log, "south"), 0).unwrap();
    system.add_change_monitor(trigger, logging(&log, "trigger"), 0).unwrap();

    system.queue_value(trigger, 0.6).unwrap();
    system.update();
    assert_eq!(*log.lock(), vec!["trigger"]);
    assert_eq!(system.read_value(trigger), Some(Value::Float(0.6)));
}

#[test]
fn test_previous_and_default_values() {
    let (mut system, _clock, _pad) = system();
    let trigger = system.control("<Gamepad>/leftTrigger").unwrap();

    system.queue_value(trigger, 0.8).unwrap();
    system.update();
    assert_eq!(system.read_previous_value(trigger, UpdateType::Dynamic), Some(Value::Float(0.0)));
    assert_eq!(system.read_value(trigger), Some(Value::Float(0.8)));

    system.update();
    assert_eq!(system.read_previous_value(trigger, UpdateType::Dynamic), Some(Value::Float(0.8)));
    assert_eq!(system.read_default_value(trigger), Some(Value::Float(0.0)));
}

#[test]
fn test_events_for_unknown_devices_are_dropped() {
    let (mut system, _clock, pad) = system();
    let stale = crate::event::StateEvent::new(DeviceId(99), vec![1, 2, 3]);
    system.queue_event(stale);
    system.update();
    assert_eq!(system.pending_events(), 0);

    system.remove_device(pad).unwrap();
    assert!(system.remove_device(pad).is_err());
}

#[test]
fn test_removing_device_clears_its_monitors() {
    let (mut system, _clock, pad) = system();
    let south = system.control("<Gamepad>/buttonSouth").unwrap();
    let log: Log = Arc::default();
    let handle = system.add_change_monitor(south, logging(&log, "south"), 0).unwrap();
    system.add_change_monitor_timeout(south, handle, 1.0, 0);

    system.remove_device(pad).unwrap();
    assert!(system.monitors().is_empty());
    assert!(system.timers().is_empty());
    assert!(system.find_controls("<Gamepad>/buttonSouth").unwrap().is_empty());
}

#[test]
fn test_events_from_other_threads() {
    let (mut system, _clock, pad) = system();
    let event = system.state_event(pad).unwrap().set("buttonSouth", 1.0).unwrap().build();
    let sender = system.event_sender();
    std::thread::spawn(move || sender.send(event)).join().unwrap();

    system.update();
    let south = system.control("<Gamepad>/buttonSouth").unwrap();
    assert_eq!(system.magnitude(south), 1.0);
}

#[test]
fn test_invalid_settings_are_rejected() {
    let settings = InputSettings {
        button_release_threshold: 0.0,
        ..InputSettings::default()
    };
    assert!(InputSystem::new(settings).is_err());
}
