//! actionmap - low-latency input actions
//!
//! Device state arrives as raw byte images, is written into double-buffered
//! state memory and watched by change monitors. Actions sit on top of those
//! monitors and turn control changes into `Started`/`Performed`/`Canceled`
//! phases through pluggable interactions (press, hold, tap, slow tap,
//! multi tap). Interactive rebinding listens to the same monitors to find
//! the control a user actuated.
//!
//! ```ignore
//! let mut system = InputSystem::new(InputSettings::default())?;
//! let pad = system.add_device("Gamepad")?;
//! let fire = system.add_action(
//!     ActionDef::button("fire")
//!         .with_binding_def(BindingDef::new("<Gamepad>/buttonSouth").with_interactions("hold")),
//! );
//! system.on_action(fire, |event| println!("{} {}", event.action_name, event.phase))?;
//! system.enable_action(fire)?;
//! system.queue_event(system.state_event(pad)?.set("buttonSouth", 1.0)?.build());
//! system.update();
//! ```

pub mod action;
pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod interactions;
pub mod monitor;
pub mod rebind;
pub mod scenario;
pub mod state;
pub mod system;

pub use action::{ActionDef, ActionEvent, ActionId, ActionKind, ActionTrace, BindingDef};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::InputSettings;
pub use device::{ControlId, DeviceId, Value};
pub use error::{InputError, Result};
pub use event::{EventSender, StateEvent};
pub use interactions::{Interaction, InteractionContext, InteractionRegistry, Phase};
pub use monitor::{
    on_change, MonitorContext, MonitorHandle, StateChange, StateChangeMonitor, TimerExpiry,
};
pub use rebind::{Candidate, RebindId, RebindStatus, RebindingOperation};
pub use scenario::{Scenario, ScenarioReport};
pub use state::UpdateType;
pub use system::InputSystem;
