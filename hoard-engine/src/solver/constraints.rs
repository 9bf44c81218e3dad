use bon::Builder;
use chrono::TimeDelta;
use hoard_quantities::{
    cost::Cost,
    energy::KilowattHours,
    percent::Percent,
    power::Kilowatts,
    rate::KilowattHourRate,
};
use serde::{Deserialize, Serialize};

use crate::{battery::Efficiency, device::BatterySpec, ops::RangeInclusive, prelude::*};

/// Energies closer than this are considered equal.
pub const ENERGY_TOLERANCE: KilowattHours = KilowattHours::new(1e-9);

/// Required state of charge at the end of the horizon.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerminalConstraint {
    #[serde(rename = "target_soc")]
    pub target: Percent,

    /// Allowed deviation from the target in either direction.
    #[serde(default = "Percent::zero")]
    pub tolerance: Percent,
}

impl TerminalConstraint {
    /// No stricter than the window minimum: any state of charge within the window passes.
    pub fn unconstrained(soc_window: RangeInclusive<Percent>) -> Self {
        Self { target: soc_window.min, tolerance: soc_window.max - soc_window.min }
    }

    pub fn validate(self) -> Result {
        if !(self.target.is_finite() && Percent::ZERO <= self.target && self.target <= Percent::HUNDRED) {
            return Err(Error::Validation(format!("invalid terminal target: {}", self.target)));
        }
        if !(self.tolerance.is_finite() && self.tolerance >= Percent::ZERO) {
            return Err(Error::Validation(format!("invalid terminal tolerance: {}", self.tolerance)));
        }
        Ok(())
    }

    pub fn band(self) -> RangeInclusive<Percent> {
        RangeInclusive { min: self.target - self.tolerance, max: self.target + self.tolerance }
    }
}

/// Physical constraints of a single optimization run.
#[must_use]
#[derive(Copy, Clone, Debug, Builder)]
pub struct Constraints {
    /// Usable capacity, already corrected on the state of health.
    pub capacity: KilowattHours,

    pub soc_window: RangeInclusive<Percent>,
    pub max_charge_power: Kilowatts,
    pub max_discharge_power: Kilowatts,
    pub efficiency: Efficiency,

    #[builder(default = KilowattHourRate::ZERO)]
    pub degradation_rate: KilowattHourRate,

    /// Defaults to [`TerminalConstraint::unconstrained`].
    pub terminal: Option<TerminalConstraint>,
}

impl Constraints {
    pub fn from_spec(spec: &BatterySpec, state_of_health: Option<Percent>) -> Self {
        Self {
            capacity: spec.actual_capacity(state_of_health),
            soc_window: spec.soc_window,
            max_charge_power: spec.max_charge_power,
            max_discharge_power: spec.max_discharge_power,
            efficiency: spec.efficiency,
            degradation_rate: spec.degradation_rate,
            terminal: spec.terminal,
        }
    }

    pub fn validate(&self) -> Result {
        BatterySpec {
            capacity: self.capacity,
            soc_window: self.soc_window,
            max_charge_power: self.max_charge_power,
            max_discharge_power: self.max_discharge_power,
            efficiency: self.efficiency,
            degradation_rate: self.degradation_rate,
            capital_cost: Cost::ZERO,
            terminal: self.terminal,
        }
        .validate()
    }

    pub fn terminal(&self) -> TerminalConstraint {
        self.terminal.unwrap_or_else(|| TerminalConstraint::unconstrained(self.soc_window))
    }

    pub fn energy_of(&self, soc: Percent) -> KilowattHours {
        self.capacity * soc.to_proportion()
    }

    pub fn soc_of(&self, energy: KilowattHours) -> Percent {
        Percent::from_proportion(energy / self.capacity)
    }

    pub fn min_energy(&self) -> KilowattHours {
        self.energy_of(self.soc_window.min)
    }

    pub fn max_energy(&self) -> KilowattHours {
        self.energy_of(self.soc_window.max)
    }

    /// Largest increase of the stored energy within the duration, ignoring the window.
    pub fn max_gain(&self, duration: TimeDelta) -> KilowattHours {
        self.efficiency.stored_delta(-self.max_charge_power, duration)
    }

    /// Largest decrease of the stored energy within the duration, ignoring the window.
    pub fn max_drop(&self, duration: TimeDelta) -> KilowattHours {
        -self.efficiency.stored_delta(self.max_discharge_power, duration)
    }

    /// Final stored energies satisfying both the window and the terminal constraint.
    ///
    /// Returns [`None`] when the two do not intersect.
    pub fn terminal_energies(&self) -> Option<RangeInclusive<KilowattHours>> {
        let band = self.terminal().band();
        let min = self.energy_of(band.min).max(self.min_energy());
        let max = self.energy_of(band.max).min(self.max_energy());
        (min <= max + ENERGY_TOLERANCE).then(|| RangeInclusive { min, max: max.max(min) })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn constraints(terminal: Option<TerminalConstraint>) -> Constraints {
        Constraints::builder()
            .capacity(KilowattHours::from(10.0))
            .soc_window(RangeInclusive::from(Percent::from(10.0)..=Percent::from(90.0)))
            .max_charge_power(Kilowatts::from(5.0))
            .max_discharge_power(Kilowatts::from(5.0))
            .efficiency(Efficiency::IDEAL)
            .maybe_terminal(terminal)
            .build()
    }

    #[test]
    fn test_default_terminal_accepts_the_window() {
        let energies = constraints(None).terminal_energies().unwrap();
        assert_abs_diff_eq!(energies.min.get(), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(energies.max.get(), 9.0, epsilon = 1e-9);
    }

    #[test]
    fn test_terminal_band_is_clipped_to_the_window() {
        let terminal = TerminalConstraint { target: Percent::from(85.0), tolerance: Percent::from(10.0) };
        let energies = constraints(Some(terminal)).terminal_energies().unwrap();
        assert_abs_diff_eq!(energies.min.get(), 7.5, epsilon = 1e-9);
        assert_abs_diff_eq!(energies.max.get(), 9.0, epsilon = 1e-9);
    }

    #[test]
    fn test_max_gain_and_drop() {
        let mut constraints = constraints(None);
        constraints.efficiency = Efficiency { charging: 0.9, discharging: 0.8 };
        assert_abs_diff_eq!(constraints.max_gain(TimeDelta::minutes(30)).get(), 2.25, epsilon = 1e-9);
        assert_abs_diff_eq!(constraints.max_drop(TimeDelta::minutes(30)).get(), 3.125, epsilon = 1e-9);
    }

    #[test]
    fn test_terminal_band_outside_the_window() {
        let terminal = TerminalConstraint { target: Percent::from(95.0), tolerance: Percent::from(1.0) };
        assert!(constraints(Some(terminal)).terminal_energies().is_none());
    }
}
