//! Per-device input pipeline
//!
//! A [`Device`] owns the mapping table and the conditioning state of every
//! control on one connected controller. Messages must be fed in arrival
//! order. Different devices share nothing and can run on different threads.
//!
//! State for each key sits in its own map slot, so distinct keys may be
//! processed concurrently while updates to one key are serialized. The
//! mapping table is held for reading for the whole of [`Device::process`];
//! [`Device::reload`] takes it for writing, so no message is ever
//! conditioned against a mix of old and new mappings.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info, trace};

use crate::conditioning::{ConditioningState, ControlValue, Engine, Outcome};
use crate::mapping::{ControlName, MappingTable, MidiKey};
use crate::midi::{format_hex, is_clock_signal, Message};


/// A conditioned value for a logical control
#[derive(Debug, Clone, PartialEq)]
pub struct ControlEvent {
    pub key: MidiKey,
    pub control: ControlName,
    pub value: ControlValue,
}

/// Why a message produced nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Empty, running status, or missing value byte
    Malformed,
    /// Real-time timing clock
    Clock,
    /// No mapping for the key
    Unmapped,
}

/// Result of processing one message
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Emit(ControlEvent),
    /// Dropped by soft takeover
    Suppressed { key: MidiKey, control: ControlName },
    /// Hand the raw value to the custom handler for this control
    Script {
        key: MidiKey,
        control: ControlName,
        raw: u8,
    },
    Ignored(IgnoreReason),
}

struct Mapping {
    table: Arc<MappingTable>,
    engine: Engine,
}

/// Input pipeline of one connected device
pub struct Device {
    name: String,
    mapping: RwLock<Mapping>,
    states: DashMap<MidiKey, ConditioningState>,
}

impl Device {
    pub fn new(name: impl Into<String>, table: Arc<MappingTable>) -> Self {
        let engine = Engine::new(*table.settings());
        Self {
            name: name.into(),
            mapping: RwLock::new(Mapping { table, engine }),
            states: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> Arc<MappingTable> {
        Arc::clone(&self.mapping.read().table)
    }

    /// Run one raw message through decode, lookup and conditioning
    pub fn process(&self, data: &[u8]) -> Dispatch {
        let Some(message) = Message::parse(data) else {
            trace!(device = %self.name, "ignoring malformed message [{}]", format_hex(data));
            return Dispatch::Ignored(IgnoreReason::Malformed);
        };
        self.process_message(&message)
    }

    pub fn process_message(&self, message: &Message) -> Dispatch {
        let key = message.key();
        if is_clock_signal(&key) {
            return Dispatch::Ignored(IgnoreReason::Clock);
        }

        let Some(raw) = message.value() else {
            trace!(device = %self.name, %key, "ignoring message without value: {}", message);
            return Dispatch::Ignored(IgnoreReason::Malformed);
        };

        let mapping = self.mapping.read();
        let Some(entry) = mapping.table.get(&key) else {
            trace!(device = %self.name, %key, "no mapping for {}", message);
            return Dispatch::Ignored(IgnoreReason::Unmapped);
        };

        let outcome = {
            let mut state = self.states.entry(key).or_default();
            mapping.engine.condition(key, &entry.options, raw, &mut state)
        };

        let control = entry.name.clone();
        match outcome {
            Outcome::Emit(value) => {
                debug!(device = %self.name, %key, "{} <- {:?}", control, value);
                Dispatch::Emit(ControlEvent {
                    key,
                    control,
                    value,
                })
            }
            Outcome::Suppressed => Dispatch::Suppressed { key, control },
            Outcome::Script { raw } => Dispatch::Script { key, control, raw },
        }
    }

    /// Report the value the software side now holds for a control
    ///
    /// Feeds soft takeover for every key bound to the control. `value` is
    /// in the same 0..=127 domain the engine emits.
    pub fn set_software_value(&self, control: &ControlName, value: f64) {
        let mapping = self.mapping.read();
        let threshold = mapping.engine.takeover_threshold();
        for key in mapping.table.keys_for(control) {
            self.states
                .entry(key)
                .or_default()
                .takeover
                .set_software_value(value, threshold);
        }
    }

    /// Conditioning state of a key, if any message reached it
    pub fn state(&self, key: &MidiKey) -> Option<ConditioningState> {
        self.states.get(key).map(|state| *state)
    }

    /// Swap in a new mapping table and drop all conditioning state
    pub fn reload(&self, table: Arc<MappingTable>) {
        let mut mapping = self.mapping.write();
        mapping.engine = Engine::new(*table.settings());
        mapping.table = table;
        self.states.clear();
        info!(
            device = %self.name,
            "Mapping reloaded ({} controls)",
            mapping.table.len()
        );
    }

    /// Forget all conditioning state (device disconnected)
    pub fn reset(&self) {
        let _mapping = self.mapping.write();
        self.states.clear();
    }
}
