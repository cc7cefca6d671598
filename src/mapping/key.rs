//! Control identity used as the mapping-table key

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of one physical control on one channel
///
/// Status byte (opcode + channel) and control number. Two keys are equal
/// exactly when both bytes are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MidiKey {
    pub status: u8,
    pub control: u8,
}

impl MidiKey {
    pub const fn new(status: u8, control: u8) -> Self {
        Self { status, control }
    }

    /// Packed form: status in the low byte, control in the high byte
    pub fn raw(&self) -> u16 {
        u16::from(self.status) | (u16::from(self.control) << 8)
    }

    pub fn from_raw(raw: u16) -> Self {
        Self {
            status: (raw & 0xFF) as u8,
            control: (raw >> 8) as u8,
        }
    }
}

impl fmt::Display for MidiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}/0x{:02X}", self.status, self.control)
    }
}
