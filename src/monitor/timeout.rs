//! Timeout scheduler
//!
//! Timers hang off monitors. A pass over the scheduler only considers entries
//! that existed when the pass began, so a timer armed from inside a callback
//! never fires in the same pass.

use super::MonitorHandle;
use crate::device::ControlId;

/// A pending timeout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimerEntry {
    pub control: ControlId,
    pub monitor: MonitorHandle,
    pub expiration: f64,
    pub timer_index: usize,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    entry: TimerEntry,
    alive: bool,
}

/// Pending timeouts in insertion order
#[derive(Debug, Default)]
pub struct TimeoutScheduler {
    slots: Vec<Slot>,
}

impl TimeoutScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer; an existing timer with the same monitor and index is replaced
    pub fn add(
        &mut self,
        control: ControlId,
        monitor: MonitorHandle,
        expiration: f64,
        timer_index: usize,
    ) {
        self.remove(monitor, timer_index);
        self.slots.push(Slot {
            entry: TimerEntry {
                control,
                monitor,
                expiration,
                timer_index,
            },
            alive: true,
        });
    }

    /// Disarm a timer without firing it
    pub fn remove(&mut self, monitor: MonitorHandle, timer_index: usize) {
        for slot in &mut self.slots {
            let entry = &slot.entry;
            if slot.alive && entry.monitor == monitor && entry.timer_index == timer_index {
                slot.alive = false;
            }
        }
    }

    /// Disarm every timer of a monitor
    pub fn remove_for_monitor(&mut self, monitor: MonitorHandle) {
        for slot in &mut self.slots {
            if slot.entry.monitor == monitor {
                slot.alive = false;
            }
        }
    }

    /// Number of entries a pass starting now would consider
    pub(crate) fn pass_len(&self) -> usize {
        self.slots.len()
    }

    /// Consume entry `index` if it is armed and due at `now`
    pub(crate) fn take_expired(&mut self, index: usize, now: f64) -> Option<TimerEntry> {
        let slot = self.slots.get_mut(index)?;
        if slot.alive && slot.entry.expiration <= now {
            slot.alive = false;
            Some(slot.entry)
        } else {
            None
        }
    }

    /// Drop consumed and disarmed entries
    pub(crate) fn compact(&mut self) {
        self.slots.retain(|s| s.alive);
    }

    /// Pending timers
    pub fn pending(&self) -> impl Iterator<Item = &TimerEntry> {
        self.slots.iter().filter(|s| s.alive).map(|s| &s.entry)
    }

    pub fn get(&self, monitor: MonitorHandle, timer_index: usize) -> Option<&TimerEntry> {
        self.pending()
            .find(|e| e.monitor == monitor && e.timer_index == timer_index)
    }

    pub fn len(&self) -> usize {
        self.pending().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(index: u32) -> MonitorHandle {
        MonitorHandle {
            index,
            generation: 0,
        }
    }

    fn run_pass(scheduler: &mut TimeoutScheduler, now: f64) -> Vec<TimerEntry> {
        let mut fired = Vec::new();
        for i in 0..scheduler.pass_len() {
            if let Some(entry) = scheduler.take_expired(i, now) {
                fired.push(entry);
            }
        }
        scheduler.compact();
        fired
    }

    #[test]
    fn test_fires_once_when_due() {
        let mut scheduler = TimeoutScheduler::new();
        scheduler.add(ControlId::default(), handle(0), 1.0, 0);

        assert!(run_pass(&mut scheduler, 0.5).is_empty());
        assert_eq!(run_pass(&mut scheduler, 1.0).len(), 1);
        assert!(run_pass(&mut scheduler, 2.0).is_empty());
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_rearm_replaces_timer() {
        let mut scheduler = TimeoutScheduler::new();
        scheduler.add(ControlId::default(), handle(0), 1.0, 7);
        scheduler.add(ControlId::default(), handle(0), 3.0, 7);

        assert_eq!(scheduler.len(), 1);
        assert!(run_pass(&mut scheduler, 2.0).is_empty());
        assert_eq!(scheduler.get(handle(0), 7).unwrap().expiration, 3.0);
    }

    #[test]
    fn test_timers_added_during_pass_wait_for_next_pass() {
        let mut scheduler = TimeoutScheduler::new();
        scheduler.add(ControlId::default(), handle(0), 1.0, 0);

        let count = scheduler.pass_len();
        let mut fired = 0;
        for i in 0..count {
            if scheduler.take_expired(i, 5.0).is_some() {
                fired += 1;
                // Re-arm from within the "callback", already due
                scheduler.add(ControlId::default(), handle(0), 2.0, 0);
            }
        }
        scheduler.compact();

        assert_eq!(fired, 1);
        assert_eq!(scheduler.len(), 1);
        assert_eq!(run_pass(&mut scheduler, 5.0).len(), 1);
    }

    #[test]
    fn test_remove_for_monitor_cascades() {
        let mut scheduler = TimeoutScheduler::new();
        scheduler.add(ControlId::default(), handle(0), 1.0, 0);
        scheduler.add(ControlId::default(), handle(0), 1.0, 1);
        scheduler.add(ControlId::default(), handle(1), 1.0, 0);

        scheduler.remove_for_monitor(handle(0));
        let fired = run_pass(&mut scheduler, 10.0);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].monitor, handle(1));
    }
}
