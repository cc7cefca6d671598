//! Soft takeover latch
//!
//! Keeps an absolute hardware control from yanking a value the software side
//! changed on its own (motor lag, page switch, preset load). Hardware input
//! is held back until it comes close to, or sweeps across, the software
//! value.

/// Default tolerance in 7-bit units (3/128 of the range)
pub const DEFAULT_THRESHOLD: f64 = 3.0;

/// Per-control takeover state
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SoftTakeover {
    /// Last value the software side reported as current
    software: Option<f64>,
    /// Last value received from the hardware
    hardware: Option<f64>,
    /// Hardware currently drives the value
    engaged: bool,
}

impl SoftTakeover {
    pub fn software(&self) -> Option<f64> {
        self.software
    }

    pub fn hardware(&self) -> Option<f64> {
        self.hardware
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    /// Record the value the software side now holds
    ///
    /// Disengages when the hardware is no longer within `threshold` of it.
    pub fn set_software_value(&mut self, value: f64, threshold: f64) {
        self.software = Some(value);
        match self.hardware {
            Some(hw) if (hw - value).abs() <= threshold => {}
            Some(_) => self.engaged = false,
            // Hardware position unknown: wait for it to reach the value
            None => self.engaged = false,
        }
    }

    /// Decide whether a hardware value may pass
    ///
    /// The hardware value is always recorded, accepted or not.
    pub fn admit(&mut self, hw: f64, threshold: f64) -> bool {
        let previous = self.hardware.replace(hw);

        let sw = match self.software {
            Some(sw) => sw,
            None => {
                self.engaged = true;
                return true;
            }
        };

        let close = (hw - sw).abs() <= threshold;
        let crossed = previous
            .map(|prev| (prev - sw).signum() != (hw - sw).signum())
            .unwrap_or(false);

        if self.engaged || close || crossed {
            self.engaged = true;
            self.software = Some(hw);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_when_software_unknown() {
        let mut latch = SoftTakeover::default();
        assert!(latch.admit(90.0, DEFAULT_THRESHOLD));
        assert!(latch.is_engaged());
    }

    #[test]
    fn test_suppresses_far_value_then_accepts_match() {
        let mut latch = SoftTakeover::default();
        latch.set_software_value(50.0, DEFAULT_THRESHOLD);

        assert!(!latch.admit(10.0, DEFAULT_THRESHOLD));
        assert_eq!(latch.hardware(), Some(10.0));
        assert_eq!(latch.software(), Some(50.0));

        assert!(latch.admit(50.0, DEFAULT_THRESHOLD));
        assert!(latch.is_engaged());
    }

    #[test]
    fn test_accepts_within_tolerance() {
        let mut latch = SoftTakeover::default();
        latch.set_software_value(50.0, DEFAULT_THRESHOLD);
        assert!(latch.admit(52.0, DEFAULT_THRESHOLD));
    }

    #[test]
    fn test_crossing_the_software_value_engages() {
        let mut latch = SoftTakeover::default();
        latch.set_software_value(50.0, DEFAULT_THRESHOLD);

        assert!(!latch.admit(30.0, DEFAULT_THRESHOLD));
        assert!(!latch.admit(40.0, DEFAULT_THRESHOLD));
        // Fast move jumps over the tolerance window
        assert!(latch.admit(60.0, DEFAULT_THRESHOLD));
        // Engaged: follows the hardware from here on
        assert!(latch.admit(100.0, DEFAULT_THRESHOLD));
    }

    #[test]
    fn test_software_jump_disengages() {
        let mut latch = SoftTakeover::default();
        assert!(latch.admit(20.0, DEFAULT_THRESHOLD));

        latch.set_software_value(21.0, DEFAULT_THRESHOLD);
        assert!(latch.is_engaged());

        latch.set_software_value(100.0, DEFAULT_THRESHOLD);
        assert!(!latch.is_engaged());
        assert!(!latch.admit(22.0, DEFAULT_THRESHOLD));
    }
}
