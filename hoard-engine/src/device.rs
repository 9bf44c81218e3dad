use derive_more::{Display, From, FromStr};
use hoard_quantities::{
    cost::Cost,
    energy::KilowattHours,
    percent::Percent,
    power::Kilowatts,
    rate::KilowattHourRate,
};
use serde::{Deserialize, Serialize};

use crate::{battery::Efficiency, ops::RangeInclusive, prelude::*, solver::TerminalConstraint};

#[derive(Clone, Debug, Display, Eq, From, FromStr, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Physical site with a battery.
///
/// The identity is immutable, the battery specification is configuration.
#[must_use]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,

    #[serde(default)]
    pub name: Option<String>,

    pub battery: BatterySpec,
}

#[must_use]
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct BatterySpec {
    /// Rated usable capacity, before the state-of-health correction.
    #[serde(rename = "capacity_kwh")]
    pub capacity: KilowattHours,

    /// Allowed state-of-charge window.
    #[serde(rename = "state_of_charge")]
    pub soc_window: RangeInclusive<Percent>,

    #[serde(rename = "max_charge_power_kw")]
    pub max_charge_power: Kilowatts,

    #[serde(rename = "max_discharge_power_kw")]
    pub max_discharge_power: Kilowatts,

    pub efficiency: Efficiency,

    /// Cost per kilowatt-hour cycled through the battery, charge and discharge alike.
    #[serde(default = "KilowattHourRate::zero", rename = "degradation_cost_per_kwh")]
    pub degradation_rate: KilowattHourRate,

    #[serde(default = "Cost::zero")]
    pub capital_cost: Cost,

    /// Required state of charge at the end of every planning horizon.
    #[serde(default)]
    pub terminal: Option<TerminalConstraint>,
}

impl BatterySpec {
    pub fn validate(&self) -> Result {
        if !self.capacity.is_finite() || self.capacity <= KilowattHours::ZERO {
            return Err(Error::Validation(format!("invalid capacity: {}", self.capacity)));
        }
        let window = self.soc_window;
        if !(Percent::ZERO <= window.min && window.min < window.max && window.max <= Percent::HUNDRED)
        {
            return Err(Error::Validation(format!("invalid state-of-charge window: {window:?}")));
        }
        for (name, power) in
            [("charge", self.max_charge_power), ("discharge", self.max_discharge_power)]
        {
            if !power.is_finite() || power < Kilowatts::ZERO {
                return Err(Error::Validation(format!("invalid maximum {name} power: {power}")));
            }
        }
        self.efficiency.validate()?;
        if !self.degradation_rate.is_finite() || self.degradation_rate < KilowattHourRate::ZERO {
            return Err(Error::Validation(format!(
                "invalid degradation cost: {}",
                self.degradation_rate
            )));
        }
        if !self.capital_cost.is_finite() || self.capital_cost < Cost::ZERO {
            return Err(Error::Validation(format!("invalid capital cost: {}", self.capital_cost)));
        }
        if let Some(terminal) = self.terminal {
            terminal.validate()?;
        }
        Ok(())
    }

    /// Capacity corrected on the state of health, when known.
    pub fn actual_capacity(&self, state_of_health: Option<Percent>) -> KilowattHours {
        state_of_health.map_or(self.capacity, |soh| self.capacity * soh.to_proportion())
    }

    /// Maximum power in the direction of the signed battery power, discharge being positive.
    pub fn power_limit(&self, battery_power: Kilowatts) -> Kilowatts {
        if battery_power >= Kilowatts::ZERO { self.max_discharge_power } else { self.max_charge_power }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    pub fn spec() -> BatterySpec {
        BatterySpec {
            capacity: KilowattHours::from(10.0),
            soc_window: RangeInclusive::from(Percent::from(10.0)..=Percent::from(90.0)),
            max_charge_power: Kilowatts::from(5.0),
            max_discharge_power: Kilowatts::from(5.0),
            efficiency: Efficiency { charging: 0.9, discharging: 0.9 },
            degradation_rate: KilowattHourRate::ZERO,
            capital_cost: Cost::from(5000.0),
            terminal: None,
        }
    }

    #[test]
    fn test_valid_spec() {
        assert!(spec().validate().is_ok());
    }

    #[test]
    fn test_inverted_window_is_rejected() {
        let mut spec = spec();
        spec.soc_window = RangeInclusive::from(Percent::from(90.0)..=Percent::from(10.0));
        assert!(matches!(spec.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_negative_capital_cost_is_rejected() {
        let mut spec = spec();
        spec.capital_cost = Cost::from(-1.0);
        assert!(matches!(spec.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_actual_capacity() {
        let capacity = spec().actual_capacity(Some(Percent::from(80.0)));
        assert_abs_diff_eq!(capacity.get(), 8.0, epsilon = 1e-9);
    }
}
