//! Directional "target reached" predicate.

/// Whether a ramp from `start` to `end` has arrived, given `current`.
///
/// Heating ramps arrive once `current >= end`, cooling ramps once
/// `current <= end`. A ramp with `start == end` never reports arrival here;
/// callers treat it as already complete (see `RampLeg::is_complete`).
pub fn temperature_reached(start: f64, end: f64, current: f64) -> bool {
    if start < end {
        current >= end
    } else if start > end {
        current <= end
    } else {
        false
    }
}

/// One leg of a ramp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampLeg {
    pub from: f64,
    pub to: f64,
}

impl RampLeg {
    pub fn new(from: f64, to: f64) -> Self {
        Self { from, to }
    }

    /// Nothing to do: the leg starts at its end.
    pub fn is_degenerate(&self) -> bool {
        self.from == self.to
    }

    pub fn is_complete(&self, current: f64) -> bool {
        self.is_degenerate() || temperature_reached(self.from, self.to, current)
    }

    /// `magnitude` with the sign that moves from `from` toward `to`.
    pub fn signed_rate(&self, magnitude: f64) -> f64 {
        if self.to < self.from {
            -magnitude.abs()
        } else {
            magnitude.abs()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heating_reached_iff_at_or_above_end() {
        for current in [-10.0, 29.9, 30.0, 599.99, 600.0, 600.01, 1000.0] {
            assert_eq!(temperature_reached(30.0, 600.0, current), current >= 600.0);
        }
    }

    #[test]
    fn cooling_reached_iff_at_or_below_end() {
        for current in [1000.0, 600.0, 30.01, 30.0, 29.99, -273.0] {
            assert_eq!(temperature_reached(600.0, 30.0, current), current <= 30.0);
        }
    }

    #[test]
    fn equal_endpoints_never_reached() {
        for current in [29.0, 30.0, 31.0] {
            assert!(!temperature_reached(30.0, 30.0, current));
        }
        assert!(RampLeg::new(30.0, 30.0).is_complete(12.0));
    }

    #[test]
    fn signed_rate_follows_direction_not_input_sign() {
        assert_eq!(RampLeg::new(650.0, 30.0).signed_rate(0.2), -0.2);
        assert_eq!(RampLeg::new(30.0, 600.0).signed_rate(0.2), 0.2);
        assert_eq!(RampLeg::new(30.0, 600.0).signed_rate(-0.2), 0.2);
        assert_eq!(RampLeg::new(600.0, 30.0).signed_rate(-0.2), -0.2);
        assert_eq!(RampLeg::new(30.0, 30.0).signed_rate(0.2), 0.2);
    }
}
