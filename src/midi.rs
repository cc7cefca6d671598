//! MIDI status decoding and message types
//!
//! Splits status bytes into channel and opcode, classifies message length,
//! and parses raw byte slices into transient [`Message`] values.

use std::fmt;

use crate::mapping::MidiKey;

/// Control number used in the lookup key of messages that carry no
/// control number of their own (program change, pitch bend, ...)
pub const NO_CONTROL: u8 = 0xFF;

/// Largest valid data byte
pub const MAX_DATA: u8 = 0x7F;

/// MIDI opcodes
///
/// Channel voice opcodes hold only the high nibble; system opcodes hold the
/// whole status byte. Anything else decodes to [`OpCode::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    NoteOff,
    NoteOn,
    Aftertouch,
    ControlChange,
    ProgramChange,
    ChannelAftertouch,
    PitchBend,
    SysEx,
    TimeCode,
    SongPosition,
    SongSelect,
    Undefined1,
    Undefined2,
    TuneRequest,
    EndOfExclusive,
    TimingClock,
    Undefined3,
    Start,
    Continue,
    Stop,
    Undefined4,
    ActiveSensing,
    SystemReset,
    /// Value outside the known set, kept verbatim
    Unknown(u8),
}

impl OpCode {
    /// Map a raw opcode value onto the enumeration
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x80 => OpCode::NoteOff,
            0x90 => OpCode::NoteOn,
            0xA0 => OpCode::Aftertouch,
            0xB0 => OpCode::ControlChange,
            0xC0 => OpCode::ProgramChange,
            0xD0 => OpCode::ChannelAftertouch,
            0xE0 => OpCode::PitchBend,
            0xF0 => OpCode::SysEx,
            0xF1 => OpCode::TimeCode,
            0xF2 => OpCode::SongPosition,
            0xF3 => OpCode::SongSelect,
            0xF4 => OpCode::Undefined1,
            0xF5 => OpCode::Undefined2,
            0xF6 => OpCode::TuneRequest,
            0xF7 => OpCode::EndOfExclusive,
            0xF8 => OpCode::TimingClock,
            0xF9 => OpCode::Undefined3,
            0xFA => OpCode::Start,
            0xFB => OpCode::Continue,
            0xFC => OpCode::Stop,
            0xFD => OpCode::Undefined4,
            0xFE => OpCode::ActiveSensing,
            0xFF => OpCode::SystemReset,
            other => OpCode::Unknown(other),
        }
    }

    /// Raw opcode value
    pub fn as_u8(self) -> u8 {
        match self {
            OpCode::NoteOff => 0x80,
            OpCode::NoteOn => 0x90,
            OpCode::Aftertouch => 0xA0,
            OpCode::ControlChange => 0xB0,
            OpCode::ProgramChange => 0xC0,
            OpCode::ChannelAftertouch => 0xD0,
            OpCode::PitchBend => 0xE0,
            OpCode::SysEx => 0xF0,
            OpCode::TimeCode => 0xF1,
            OpCode::SongPosition => 0xF2,
            OpCode::SongSelect => 0xF3,
            OpCode::Undefined1 => 0xF4,
            OpCode::Undefined2 => 0xF5,
            OpCode::TuneRequest => 0xF6,
            OpCode::EndOfExclusive => 0xF7,
            OpCode::TimingClock => 0xF8,
            OpCode::Undefined3 => 0xF9,
            OpCode::Start => 0xFA,
            OpCode::Continue => 0xFB,
            OpCode::Stop => 0xFC,
            OpCode::Undefined4 => 0xFD,
            OpCode::ActiveSensing => 0xFE,
            OpCode::SystemReset => 0xFF,
            OpCode::Unknown(value) => value,
        }
    }

    /// Whether this opcode carries a channel in its status byte
    pub fn is_channel_message(self) -> bool {
        (0x80..0xF0).contains(&self.as_u8())
    }
}

/// Channel (0-15) from the low nibble of a status byte
pub fn channel(status: u8) -> u8 {
    status & 0x0F
}

/// Opcode from a status byte
///
/// System messages (high nibble 0xF) have no channel, so the whole byte is
/// the opcode.
pub fn opcode(status: u8) -> OpCode {
    let mut op = status & 0xF0;
    if op == 0xF0 {
        op = status;
    }
    OpCode::from_u8(op)
}

/// Whether messages with this opcode carry two data bytes (control + value)
pub fn is_two_byte_message(opcode: OpCode) -> bool {
    matches!(
        opcode,
        OpCode::SongSelect
            | OpCode::NoteOff
            | OpCode::NoteOn
            | OpCode::Aftertouch
            | OpCode::ControlChange
    )
}

/// Whether a key addresses the real-time timing clock
pub fn is_clock_signal(key: &MidiKey) -> bool {
    let clock = OpCode::TimingClock.as_u8();
    key.status & clock == clock
}

/// A raw message as received from a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub status: u8,
    pub data1: u8,
    pub data2: Option<u8>,
}

impl Message {
    /// Parse a message from raw bytes
    ///
    /// Returns `None` for an empty slice or when the first byte is a data
    /// byte (running status is not tracked). Unknown opcodes still parse.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;
        if status < 0x80 {
            return None;
        }

        Some(Self {
            status,
            data1: rest.first().copied().unwrap_or(0),
            data2: rest.get(1).copied(),
        })
    }

    pub fn channel(&self) -> u8 {
        channel(self.status)
    }

    pub fn opcode(&self) -> OpCode {
        opcode(self.status)
    }

    /// Mapping-table key for this message
    pub fn key(&self) -> MidiKey {
        if is_two_byte_message(self.opcode()) {
            MidiKey::new(self.status, self.data1)
        } else {
            MidiKey::new(self.status, NO_CONTROL)
        }
    }

    /// Raw 7-bit value to condition
    ///
    /// Two-byte messages carry the value in `data2` and yield `None` when it
    /// is missing. Song Select is classified as two-byte, so a bare
    /// `F3 nn` has no value either. Other messages use `data2` if present
    /// (pitch bend MSB), otherwise `data1`.
    ///
    /// `None` as well when any data byte has its high bit set: such a byte
    /// is a status byte in the wrong place, not a value.
    pub fn value(&self) -> Option<u8> {
        if self.data1 > MAX_DATA || self.data2.is_some_and(|d2| d2 > MAX_DATA) {
            return None;
        }
        if is_two_byte_message(self.opcode()) {
            self.data2
        } else {
            Some(self.data2.unwrap_or(self.data1))
        }
    }

    /// Re-encode to wire bytes
    pub fn bytes(&self) -> Vec<u8> {
        let mut out = vec![self.status, self.data1];
        out.extend(self.data2);
        out
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.opcode();
        if op.is_channel_message() {
            write!(f, "{:?} ch:{} d1:{}", op, self.channel() + 1, self.data1)?;
        } else {
            write!(f, "{:?} d1:{}", op, self.data1)?;
        }
        if let Some(d2) = self.data2 {
            write!(f, " d2:{}", d2)?;
        }
        Ok(())
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a line of whitespace separated hex bytes ("B0 10 41")
pub fn parse_hex(line: &str) -> Option<Vec<u8>> {
    line.split_whitespace()
        .map(|tok| {
            let tok = tok.trim_start_matches("0x").trim_start_matches("0X");
            u8::from_str_radix(tok, 16).ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn channel_messages_split_nibbles(status in 0x00u8..0xF0) {
            prop_assert_eq!(channel(status), status & 0x0F);
            prop_assert_eq!(opcode(status).as_u8(), status & 0xF0);
        }

        #[test]
        fn system_messages_use_full_byte(status in 0xF0u8..=0xFF) {
            prop_assert_eq!(opcode(status).as_u8(), status);
        }
    }

    #[test]
    fn test_two_byte_classification() {
        let two_byte = [0x80, 0x90, 0xA0, 0xB0, 0xF3];
        for value in 0..=255u8 {
            let op = OpCode::from_u8(value);
            assert_eq!(
                is_two_byte_message(op),
                two_byte.contains(&value),
                "opcode 0x{:02X}",
                value
            );
        }
    }

    #[test]
    fn test_unknown_opcode_is_kept() {
        assert_eq!(OpCode::from_u8(0x42), OpCode::Unknown(0x42));
        assert_eq!(OpCode::Unknown(0x42).as_u8(), 0x42);
        assert!(!is_two_byte_message(OpCode::Unknown(0x42)));
    }

    #[test]
    fn test_clock_signal() {
        assert!(is_clock_signal(&MidiKey::new(0xF8, 0)));
        assert!(is_clock_signal(&MidiKey::new(0xF8, 0x40)));
        assert!(!is_clock_signal(&MidiKey::new(0xB0, 0xF8)));
        assert!(!is_clock_signal(&MidiKey::new(0x90, 0x3C)));
    }

    #[test]
    fn test_parse_control_change() {
        let msg = Message::parse(&[0xB2, 7, 100]).unwrap();
        assert_eq!(msg.channel(), 2);
        assert_eq!(msg.opcode(), OpCode::ControlChange);
        assert_eq!(msg.key(), MidiKey::new(0xB2, 7));
        assert_eq!(msg.value(), Some(100));
        assert_eq!(msg.bytes(), vec![0xB2, 7, 100]);
    }

    #[test]
    fn test_parse_rejects_data_byte_status() {
        assert_eq!(Message::parse(&[]), None);
        assert_eq!(Message::parse(&[0x40, 0x10]), None);
    }

    #[test]
    fn test_short_two_byte_message_has_no_value() {
        let msg = Message::parse(&[0x90, 60]).unwrap();
        assert_eq!(msg.value(), None);
    }

    #[test]
    fn test_data_byte_with_high_bit_has_no_value() {
        assert_eq!(Message::parse(&[0xB0, 0x07, 0xC8]).unwrap().value(), None);
        assert_eq!(Message::parse(&[0xE0, 0x00, 0xFF]).unwrap().value(), None);
        assert_eq!(Message::parse(&[0xB0, 0x90, 0x10]).unwrap().value(), None);
        assert_eq!(Message::parse(&[0xB0, 0x07, 0x7F]).unwrap().value(), Some(0x7F));
    }

    #[test]
    fn test_song_select_needs_two_data_bytes() {
        let msg = Message::parse(&[0xF3, 0x05]).unwrap();
        assert_eq!(msg.key(), MidiKey::new(0xF3, 0x05));
        assert_eq!(msg.value(), None);
    }

    #[test]
    fn test_pitch_bend_keys_on_status_only() {
        let msg = Message::parse(&[0xE1, 0x00, 0x40]).unwrap();
        assert_eq!(msg.key(), MidiKey::new(0xE1, NO_CONTROL));
        assert_eq!(msg.value(), Some(0x40));

        let msg = Message::parse(&[0xC0, 5]).unwrap();
        assert_eq!(msg.key(), MidiKey::new(0xC0, NO_CONTROL));
        assert_eq!(msg.value(), Some(5));
    }

    #[test]
    fn test_hex_helpers() {
        assert_eq!(format_hex(&[0xB0, 0x10, 0x41]), "B0 10 41");
        assert_eq!(parse_hex("b0 10 0x41"), Some(vec![0xB0, 0x10, 0x41]));
        assert_eq!(parse_hex("b0 zz"), None);
    }
}
