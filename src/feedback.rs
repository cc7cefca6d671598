//! Feedback output rendering
//!
//! Maps logical values back onto the bytes that drive LEDs and motorized
//! faders. Wrapping the byte into a full message is left to the caller.

use serde::{Deserialize, Serialize};

/// Highest 7-bit feedback byte
const MAX_BYTE: f64 = 127.0;

/// How a logical value range maps onto an outgoing control
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSpec {
    pub min: f32,
    pub max: f32,
    pub status: u8,
    pub control: u8,
    #[serde(default = "default_on")]
    pub on: u8,
    #[serde(default)]
    pub off: u8,
}

fn default_on() -> u8 {
    0x7F
}

impl FeedbackSpec {
    /// Packed form: status, control, on, off from the low byte up
    pub fn raw(&self) -> u32 {
        u32::from(self.status)
            | (u32::from(self.control) << 8)
            | (u32::from(self.on) << 16)
            | (u32::from(self.off) << 24)
    }

    /// Scale a logical value from `[min, max]` onto 0..=127
    ///
    /// `min` renders as 0 and `max` as 127, so `min > max` gives a reversed
    /// scale (faders mounted upside down). Out-of-range values clamp to the
    /// nearest bound. A collapsed range renders as a step at `max`.
    pub fn render(&self, value: f64) -> u8 {
        if value.is_nan() {
            return 0;
        }

        let min = f64::from(self.min);
        let max = f64::from(self.max);
        let span = max - min;

        if span == 0.0 || !span.is_finite() {
            return if value >= max { MAX_BYTE as u8 } else { 0 };
        }

        let t = ((value - min) / span).clamp(0.0, 1.0);
        (t * MAX_BYTE).round() as u8
    }

    /// `on` when active, `off` otherwise
    pub fn render_boolean(&self, active: bool) -> u8 {
        if active {
            self.on
        } else {
            self.off
        }
    }

    /// `on` while the value lies between `min` and `max`
    pub fn render_in_range(&self, value: f64) -> u8 {
        let lo = f64::from(self.min.min(self.max));
        let hi = f64::from(self.min.max(self.max));
        let inside = value >= lo && value <= hi;
        self.render_boolean(inside)
    }

    /// Logical value a feedback byte stands for (inverse of [`render`])
    ///
    /// [`render`]: FeedbackSpec::render
    pub fn value_of(&self, byte: u8) -> f64 {
        let min = f64::from(self.min);
        let max = f64::from(self.max);
        let t = f64::from(byte.min(MAX_BYTE as u8)) / MAX_BYTE;
        min + t * (max - min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn spec(min: f32, max: f32) -> FeedbackSpec {
        FeedbackSpec {
            min,
            max,
            status: 0x90,
            control: 0x3B,
            on: 0x7F,
            off: 0x00,
        }
    }

    #[test]
    fn test_render_scales_linearly() {
        let s = spec(0.0, 1.0);
        assert_eq!(s.render(0.0), 0);
        assert_eq!(s.render(1.0), 127);
        assert_eq!(s.render(0.5), 64);
    }

    #[test]
    fn test_render_clamps() {
        let s = spec(-1.0, 1.0);
        assert_eq!(s.render(-5.0), 0);
        assert_eq!(s.render(5.0), 127);
        assert_eq!(s.render(f64::NAN), 0);
        assert_eq!(s.render(f64::INFINITY), 127);
    }

    #[test]
    fn test_collapsed_range() {
        let s = spec(1.0, 1.0);
        assert_eq!(s.render(0.9), 0);
        assert_eq!(s.render(1.0), 127);
    }

    #[test]
    fn test_reversed_range() {
        let s = spec(1.0, 0.0);
        assert_eq!(s.render(1.0), 0);
        assert_eq!(s.render(0.0), 127);
        assert_eq!(s.render(0.5), 64);
        assert_eq!(s.render(0.25), 95);
        assert_eq!(s.render(2.0), 0);
        assert_eq!(s.render(-1.0), 127);

        assert_eq!(s.value_of(0), 1.0);
        assert_eq!(s.value_of(127), 0.0);
        assert_eq!(s.render(s.value_of(32)), 32);
        assert_eq!(s.render_in_range(0.5), 0x7F);
        assert_eq!(s.render_in_range(1.5), 0x00);
    }

    #[test]
    fn test_boolean_and_range() {
        let s = FeedbackSpec { on: 0x41, off: 0x01, ..spec(0.5, 1.0) };
        assert_eq!(s.render_boolean(true), 0x41);
        assert_eq!(s.render_boolean(false), 0x01);
        assert_eq!(s.render_in_range(0.75), 0x41);
        assert_eq!(s.render_in_range(0.25), 0x01);
    }

    #[test]
    fn test_raw_packing() {
        let s = FeedbackSpec { on: 0x7F, off: 0x01, ..spec(0.0, 1.0) };
        assert_eq!(s.raw(), 0x017F_3B90);
    }

    #[test]
    fn test_yaml_defaults() {
        let s: FeedbackSpec =
            serde_yaml::from_str("{ min: 0.0, max: 2.0, status: 0x90, control: 12 }").unwrap();
        assert_eq!(s.on, 0x7F);
        assert_eq!(s.off, 0x00);
        assert_eq!(s.status, 0x90);
    }

    proptest! {
        #[test]
        fn render_round_trips_within_one_step(
            min in -1000.0f32..1000.0,
            span in 0.001f32..1000.0,
            t in 0.0f64..=1.0,
        ) {
            let s = spec(min, min + span);
            let lo = f64::from(s.min);
            let hi = f64::from(s.max);
            let value = lo + t * (hi - lo);

            let byte = s.render(value);
            let back = s.value_of(byte);
            prop_assert!((i32::from(s.render(back)) - i32::from(byte)).abs() <= 1);

            let step = (hi - lo) / 127.0;
            prop_assert!((back - value).abs() <= step);
        }
    }
}
