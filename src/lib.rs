//! Control-surface input pipeline
//!
//! Decodes raw MIDI messages from hardware controllers into logical control
//! events and conditions their values (relative encoders, soft takeover,
//! inversion, ...) before they reach application logic. The reverse
//! direction renders logical values into feedback bytes for LEDs and
//! motorized faders.

pub mod conditioning;
pub mod config;
pub mod device;
pub mod feedback;
pub mod mapping;
pub mod midi;
pub mod monitor;

pub use conditioning::{ConditioningState, ControlValue, Engine, EngineSettings, Outcome};
pub use device::{ControlEvent, Device, Dispatch, IgnoreReason};
pub use feedback::FeedbackSpec;
pub use mapping::{ControlName, MappingDiff, MappingError, MappingTable, MidiKey, MidiOptions};
pub use midi::{Message, OpCode};
