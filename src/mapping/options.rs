//! Per-mapping behavior switches
//!
//! Each flag selects part of the conditioning applied to a control's raw
//! values. In mapping files they are written as a list of names:
//!
//! ```yaml
//! options: [rot64, invert]
//! ```

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Behavior switches of one mapping entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct MidiOptions {
    pub invert: bool,
    pub rot64: bool,
    pub rot64_inv: bool,
    pub rot64_fast: bool,
    pub diff: bool,
    /// Button down (!= 0) and up (0) arrive on the same control
    pub button: bool,
    /// Button down and up arrive as separate messages
    pub sw: bool,
    /// Accelerated difference from 64
    pub spread64: bool,
    /// Hercules jog wheel range correction
    pub herc_jog: bool,
    /// Endless relative knob
    pub selectknob: bool,
    pub soft_takeover: bool,
    /// Route to a custom handler instead of conditioning
    pub script: bool,
}

/// Flag names in bit order
const NAMES: [&str; 12] = [
    "invert",
    "rot64",
    "rot64_inv",
    "rot64_fast",
    "diff",
    "button",
    "sw",
    "spread64",
    "herc_jog",
    "selectknob",
    "soft_takeover",
    "script",
];

impl MidiOptions {
    fn slots(&self) -> [bool; 12] {
        [
            self.invert,
            self.rot64,
            self.rot64_inv,
            self.rot64_fast,
            self.diff,
            self.button,
            self.sw,
            self.spread64,
            self.herc_jog,
            self.selectknob,
            self.soft_takeover,
            self.script,
        ]
    }

    fn slot_mut(&mut self, index: usize) -> Option<&mut bool> {
        Some(match index {
            0 => &mut self.invert,
            1 => &mut self.rot64,
            2 => &mut self.rot64_inv,
            3 => &mut self.rot64_fast,
            4 => &mut self.diff,
            5 => &mut self.button,
            6 => &mut self.sw,
            7 => &mut self.spread64,
            8 => &mut self.herc_jog,
            9 => &mut self.selectknob,
            10 => &mut self.soft_takeover,
            11 => &mut self.script,
            _ => return None,
        })
    }

    /// Decode from the packed form. Bits above the known flags are ignored.
    pub fn from_bits(bits: u32) -> Self {
        let mut options = Self::default();
        for index in 0..NAMES.len() {
            if bits & (1 << index) != 0 {
                if let Some(slot) = options.slot_mut(index) {
                    *slot = true;
                }
            }
        }
        options
    }

    /// Packed form, one bit per flag in declaration order
    pub fn bits(&self) -> u32 {
        self.slots()
            .iter()
            .enumerate()
            .filter(|(_, set)| **set)
            .fold(0, |acc, (index, _)| acc | (1 << index))
    }

    pub fn is_empty(&self) -> bool {
        self.bits() == 0
    }

    /// Set a flag by name. Returns false if the name is unknown.
    pub fn set(&mut self, name: &str) -> bool {
        let name = name.trim().to_ascii_lowercase();
        match NAMES.iter().position(|n| *n == name) {
            Some(index) => self.slot_mut(index).map(|slot| *slot = true).is_some(),
            None => false,
        }
    }

    /// Names of the flags that are set
    pub fn names(&self) -> Vec<&'static str> {
        self.slots()
            .iter()
            .zip(NAMES)
            .filter(|(set, _)| **set)
            .map(|(_, name)| name)
            .collect()
    }

    /// Any of the flags whose output is motion rather than a position
    pub fn is_relative(&self) -> bool {
        self.rot64
            || self.rot64_inv
            || self.rot64_fast
            || self.spread64
            || self.diff
            || self.herc_jog
            || self.selectknob
    }
}

impl From<Vec<String>> for MidiOptions {
    fn from(names: Vec<String>) -> Self {
        let mut options = Self::default();
        for name in &names {
            if !options.set(name) {
                warn!("Ignoring unknown mapping option '{}'", name);
            }
        }
        options
    }
}

impl From<MidiOptions> for Vec<String> {
    fn from(options: MidiOptions) -> Self {
        options.names().into_iter().map(String::from).collect()
    }
}
