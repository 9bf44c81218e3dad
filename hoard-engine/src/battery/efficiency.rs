use chrono::TimeDelta;
use hoard_quantities::{energy::KilowattHours, power::Kilowatts};
use serde::{Deserialize, Serialize};

use crate::prelude::*;

/// First-order battery conversion losses.
///
/// Battery power is signed: positive discharges the battery into the site, negative charges it.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Efficiency {
    /// Charging efficiency, `0..=1`.
    pub charging: f64,

    /// Discharging efficiency, `0..=1`.
    pub discharging: f64,
}

impl Efficiency {
    pub const IDEAL: Self = Self { charging: 1.0, discharging: 1.0 };

    pub fn validate(self) -> Result {
        for (name, value) in [("charging", self.charging), ("discharging", self.discharging)] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(Error::Validation(format!("invalid {name} efficiency: {value}")));
            }
        }
        Ok(())
    }

    /// Change of the stored energy when the battery runs at the power for the duration.
    ///
    /// Charging stores only a fraction of the imported energy, while discharging drains more
    /// than it delivers.
    pub fn stored_delta(self, battery_power: Kilowatts, duration: TimeDelta) -> KilowattHours {
        let external = battery_power * duration;
        if external > KilowattHours::ZERO {
            -(external / self.discharging)
        } else {
            -external * self.charging
        }
    }

    /// Battery power that changes the stored energy by the delta over the duration.
    ///
    /// Inverse of [`Self::stored_delta`].
    pub fn battery_power(self, stored_delta: KilowattHours, duration: TimeDelta) -> Kilowatts {
        if stored_delta > KilowattHours::ZERO {
            -(stored_delta / self.charging / duration)
        } else {
            -(stored_delta * self.discharging) / duration
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    const EFFICIENCY: Efficiency = Efficiency { charging: 0.9, discharging: 0.8 };

    #[test]
    fn test_charging_stores_less() {
        let delta = EFFICIENCY.stored_delta(Kilowatts::from(-2.0), TimeDelta::hours(1));
        assert_abs_diff_eq!(delta.get(), 1.8);
    }

    #[test]
    fn test_discharging_drains_more() {
        let delta = EFFICIENCY.stored_delta(Kilowatts::from(2.0), TimeDelta::hours(1));
        assert_abs_diff_eq!(delta.get(), -2.5);
    }

    #[test]
    fn test_battery_power_is_inverse() {
        let duration = TimeDelta::minutes(30);
        for power in [-3.0, -0.5, 0.0, 0.7, 4.0] {
            let delta = EFFICIENCY.stored_delta(Kilowatts::from(power), duration);
            assert_abs_diff_eq!(EFFICIENCY.battery_power(delta, duration).get(), power, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_invalid_efficiency() {
        assert!(Efficiency { charging: 0.0, discharging: 1.0 }.validate().is_err());
        assert!(Efficiency { charging: 1.0, discharging: 1.1 }.validate().is_err());
        assert!(Efficiency { charging: f64::NAN, discharging: 1.0 }.validate().is_err());
    }
}
