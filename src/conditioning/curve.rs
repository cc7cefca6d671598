//! Hardware-tuned response curves for relative controls
//!
//! Jog acceleration and spread scaling depend on the controller model, so
//! they are pluggable. The serde-configurable specs below cover the usual
//! shapes; anything else can implement the traits directly.

use serde::{Deserialize, Serialize};

/// Scaling applied to the magnitude of a relative delta
///
/// Implementations must be monotonically increasing and map 0 to 0. The
/// engine reapplies the sign, so only non-negative inputs are passed in.
pub trait RelativeCurve: Send + Sync + std::fmt::Debug {
    fn scale(&self, magnitude: f64) -> f64;

    /// Apply to a signed delta, keeping sign and zero
    fn apply(&self, delta: f64) -> f64 {
        if delta == 0.0 {
            return 0.0;
        }
        self.scale(delta.abs()).copysign(delta)
    }
}

/// Remaps a vendor-specific jog encoding onto the 64-centred domain
pub trait JogRemap: Send + Sync + std::fmt::Debug {
    /// Returns a value where 64 means "no motion"
    fn remap(&self, raw: u8) -> f64;
}

/// Configurable curve shapes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveSpec {
    /// `factor * |d|`
    Linear { factor: f64 },
    /// `scale * |d|^exponent`
    Power { exponent: f64, scale: f64 },
}

impl CurveSpec {
    /// Acceleration for jog wheels that report the same delta range at
    /// every speed
    pub fn default_fast() -> Self {
        CurveSpec::Linear { factor: 1.5 }
    }

    /// Spread for encoders that already accelerate in the raw byte. Unit
    /// steps stay unit steps.
    pub fn default_spread() -> Self {
        CurveSpec::Power {
            exponent: 2.0,
            scale: 1.0,
        }
    }

    /// Check the parameters give a strictly increasing curve through zero
    pub fn validate(&self) -> Result<(), String> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(format!("{} must be a finite number above 0, got {}", name, v))
            }
        };
        match *self {
            CurveSpec::Linear { factor } => positive("factor", factor),
            CurveSpec::Power { exponent, scale } => {
                positive("exponent", exponent)?;
                positive("scale", scale)
            }
        }
    }
}

impl RelativeCurve for CurveSpec {
    fn scale(&self, magnitude: f64) -> f64 {
        match *self {
            CurveSpec::Linear { factor } => magnitude * factor.abs(),
            CurveSpec::Power { exponent, scale } => {
                scale.abs() * magnitude.powf(exponent.max(0.0))
            }
        }
    }
}

/// Configurable jog encodings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JogSpec {
    /// 1..=64 forward, 65..=127 backward as `raw - 128`
    #[default]
    TwosComplement,
    /// Signed offset from a vendor-specific centre
    Offset { center: u8 },
}

impl JogRemap for JogSpec {
    fn remap(&self, raw: u8) -> f64 {
        let signed = match *self {
            JogSpec::TwosComplement => {
                if raw > 64 {
                    f64::from(raw) - 128.0
                } else {
                    f64::from(raw)
                }
            }
            JogSpec::Offset { center } => f64::from(raw) - f64::from(center),
        };
        64.0 + signed
    }
}
