//! Signal conditioning for incoming control values
//!
//! Turns a raw 7-bit value plus the mapping's [`MidiOptions`] and the
//! control's [`ConditioningState`] into the value handed to the consumer.
//!
//! Flags combine in a fixed order:
//!
//! 1. `script` bypasses everything else
//! 2. `button` / `sw` select a press/release event shape
//! 3. relative stage: `herc_jog` (feeds rot64), `rot64*`, `spread64`,
//!    `diff`, then `selectknob` accumulation
//! 4. `invert`
//! 5. `soft_takeover` guards absolute outputs

pub mod curve;
pub mod takeover;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::mapping::{MidiKey, MidiOptions};

pub use curve::{CurveSpec, JogRemap, JogSpec, RelativeCurve};
pub use takeover::SoftTakeover;

/// Upper bound of a 7-bit absolute control
pub const MAX_7BIT: f64 = 127.0;

/// Neutral value of 64-centred relative encoders
pub const CENTER: f64 = 64.0;

/// Conditioned value delivered to the consumer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlValue {
    /// Position within 0..=127
    Absolute(f64),
    /// Signed motion since the previous message
    Delta(f64),
    /// Running position of an endless knob
    Position(f64),
    /// Press/release carried on one control
    Button { pressed: bool },
    /// One discrete event of a control whose press and release arrive on
    /// separate controls
    Trigger,
}

/// Result of conditioning one message
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Emit(ControlValue),
    /// Held back by soft takeover
    Suppressed,
    /// Needs the custom handler; no built-in transform applied
    Script { raw: u8 },
}

/// Mutable per-control state
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConditioningState {
    /// Last raw value received
    pub last_raw: Option<u8>,
    /// Accumulated `selectknob` position
    pub position: f64,
    pub takeover: SoftTakeover,
}

/// Serializable engine tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Soft takeover tolerance in 7-bit units
    pub takeover_threshold: f64,
    pub rot64_fast: CurveSpec,
    pub spread64: CurveSpec,
    pub herc_jog: JogSpec,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            takeover_threshold: takeover::DEFAULT_THRESHOLD,
            rot64_fast: CurveSpec::default_fast(),
            spread64: CurveSpec::default_spread(),
            herc_jog: JogSpec::default(),
        }
    }
}

impl EngineSettings {
    /// Reject tuning that breaks the curve or takeover guarantees
    pub fn validate(&self) -> Result<(), String> {
        if !(self.takeover_threshold.is_finite() && self.takeover_threshold >= 0.0) {
            return Err(format!(
                "takeover_threshold must be a finite number >= 0, got {}",
                self.takeover_threshold
            ));
        }
        self.rot64_fast
            .validate()
            .map_err(|e| format!("rot64_fast: {}", e))?;
        self.spread64
            .validate()
            .map_err(|e| format!("spread64: {}", e))?;
        if let JogSpec::Offset { center } = self.herc_jog {
            if center > 0x7F {
                return Err(format!("herc_jog: center must be 0..=127, got {}", center));
            }
        }
        Ok(())
    }
}

/// Conditioning engine
///
/// Stateless apart from its tuning; all per-control state is passed in.
#[derive(Debug, Clone)]
pub struct Engine {
    takeover_threshold: f64,
    fast_curve: Arc<dyn RelativeCurve>,
    spread_curve: Arc<dyn RelativeCurve>,
    jog: Arc<dyn JogRemap>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

impl Engine {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            takeover_threshold: settings.takeover_threshold.abs(),
            fast_curve: Arc::new(settings.rot64_fast),
            spread_curve: Arc::new(settings.spread64),
            jog: Arc::new(settings.herc_jog),
        }
    }

    /// Replace the `rot64_fast` acceleration curve
    pub fn with_fast_curve(mut self, curve: impl RelativeCurve + 'static) -> Self {
        self.fast_curve = Arc::new(curve);
        self
    }

    /// Replace the `spread64` curve
    pub fn with_spread_curve(mut self, curve: impl RelativeCurve + 'static) -> Self {
        self.spread_curve = Arc::new(curve);
        self
    }

    /// Replace the `herc_jog` remap
    pub fn with_jog_remap(mut self, jog: impl JogRemap + 'static) -> Self {
        self.jog = Arc::new(jog);
        self
    }

    pub fn takeover_threshold(&self) -> f64 {
        self.takeover_threshold
    }

    /// Condition one raw value
    ///
    /// The key is only used for tracing.
    pub fn condition(
        &self,
        key: MidiKey,
        options: &MidiOptions,
        raw: u8,
        state: &mut ConditioningState,
    ) -> Outcome {
        state.last_raw = Some(raw);

        if options.script {
            tracing::trace!(%key, raw, "routed to script handler");
            return Outcome::Script { raw };
        }

        if options.button {
            let pressed = (raw != 0) != options.invert;
            return Outcome::Emit(ControlValue::Button { pressed });
        }
        if options.sw {
            return Outcome::Emit(ControlValue::Trigger);
        }

        if let Some(delta) = self.relative_delta(options, raw) {
            let delta = if options.invert { -delta } else { delta };
            if options.selectknob {
                state.position += delta;
                return Outcome::Emit(ControlValue::Position(state.position));
            }
            return Outcome::Emit(ControlValue::Delta(delta));
        }

        let value = f64::from(raw);
        let value = if options.invert { MAX_7BIT - value } else { value };

        if options.soft_takeover && !state.takeover.admit(value, self.takeover_threshold) {
            tracing::debug!(%key, value, "soft takeover suppressed value");
            return Outcome::Suppressed;
        }

        Outcome::Emit(ControlValue::Absolute(value))
    }

    /// Signed delta for relative modes, `None` for absolute controls
    fn relative_delta(&self, options: &MidiOptions, raw: u8) -> Option<f64> {
        if !options.is_relative() {
            return None;
        }
        let rot64 = options.rot64 || options.rot64_inv || options.rot64_fast;

        let delta = if options.herc_jog || rot64 {
            let centred = if options.herc_jog {
                self.jog.remap(raw)
            } else {
                f64::from(raw)
            };
            let mut delta = centred - CENTER;
            if options.rot64_fast {
                delta = self.fast_curve.apply(delta);
            }
            if options.rot64_inv {
                delta = -delta;
            }
            delta
        } else if options.spread64 {
            self.spread_curve.apply(f64::from(raw) - CENTER)
        } else {
            // diff, selectknob
            signed_7bit(raw)
        };

        Some(delta)
    }
}

/// Interpret a 7-bit value as two's complement (64..=127 are negative)
pub fn signed_7bit(raw: u8) -> f64 {
    let raw = f64::from(raw & 0x7F);
    if raw >= CENTER {
        raw - 128.0
    } else {
        raw
    }
}
