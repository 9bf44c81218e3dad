use hoard_quantities::{
    cost::Cost,
    energy::KilowattHours,
    percent::Percent,
    power::Kilowatts,
    rate::KilowattHourRate,
};
use serde::Serialize;

use crate::{device::DeviceId, ops::Interval};

/// Planned battery operation within a single interval.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct ScheduleStep {
    #[serde(flatten)]
    pub interval: Interval,

    /// Site consumption minus production.
    #[serde(rename = "net_load_kwh")]
    pub net_load: KilowattHours,

    /// Positive discharges, negative charges.
    #[serde(rename = "battery_power_kw")]
    pub battery_power: Kilowatts,

    /// Positive imports, negative exports.
    #[serde(rename = "grid_kwh")]
    pub grid: KilowattHours,

    /// Price of the first imported kilowatt-hour.
    pub rate: KilowattHourRate,

    pub resulting_soc: Percent,

    #[serde(rename = "stored_energy_kwh")]
    pub energy_after: KilowattHours,

    /// Grid cost of the interval, excluding the degradation penalty.
    pub interval_cost: Cost,

    pub degradation_cost: Cost,
}

impl ScheduleStep {
    /// Energy cycled through the battery terminals.
    pub fn throughput(&self) -> KilowattHours {
        (self.battery_power * self.interval.len()).abs()
    }

    pub fn import_power(&self) -> Kilowatts {
        self.grid.positive() / self.interval.len()
    }
}

/// Optimal battery operation over the horizon.
///
/// Computed on demand and never mutated afterwards.
#[must_use]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DispatchSchedule {
    pub device_id: DeviceId,

    /// Starting state of charge, after clamping into the window.
    pub initial_soc: Percent,

    pub steps: Vec<ScheduleStep>,
}

impl DispatchSchedule {
    pub fn grid_cost(&self) -> Cost {
        self.steps.iter().map(|step| step.interval_cost).sum()
    }

    pub fn degradation_cost(&self) -> Cost {
        self.steps.iter().map(|step| step.degradation_cost).sum()
    }

    /// Optimization target: grid cost plus the degradation penalty.
    pub fn objective(&self) -> Cost {
        self.grid_cost() + self.degradation_cost()
    }

    pub fn throughput(&self) -> KilowattHours {
        self.steps.iter().map(ScheduleStep::throughput).sum()
    }

    pub fn horizon(&self) -> Option<Interval> {
        Some(Interval::new(self.steps.first()?.interval.start, self.steps.last()?.interval.end))
    }
}
