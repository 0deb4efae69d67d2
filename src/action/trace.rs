//! Recording of action events

use parking_lot::Mutex;
use std::sync::Arc;

use super::{ActionEvent, ActionId};
use crate::error::Result;
use crate::interactions::Phase;
use crate::system::InputSystem;

/// Collects action events into a shared buffer
///
/// Clones share the same buffer, so a trace can be handed to several
/// actions and read back from the test or tool that created it.
#[derive(Debug, Clone, Default)]
pub struct ActionTrace {
    events: Arc<Mutex<Vec<ActionEvent>>>,
}

impl ActionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listener that appends to this trace
    pub fn listener(&self) -> impl FnMut(&ActionEvent) + Send + 'static {
        let events = Arc::clone(&self.events);
        move |event| events.lock().push(event.clone())
    }

    pub fn subscribe_to(&self, system: &mut InputSystem, action: ActionId) -> Result<()> {
        system.on_action(action, self.listener())
    }

    /// Record events of every action, including ones added later
    pub fn subscribe_to_all(&self, system: &mut InputSystem) {
        system.on_any_action(self.listener());
    }

    pub fn events(&self) -> Vec<ActionEvent> {
        self.events.lock().clone()
    }

    /// Take the recorded events, leaving the trace empty
    pub fn drain(&self) -> Vec<ActionEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.events.lock().iter().map(|e| e.phase).collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}
