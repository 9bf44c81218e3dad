use hoard_quantities::percent::Percent;
use itertools::{Itertools, MinMaxResult};
use serde::Serialize;

use crate::{battery::BatteryState, device::DeviceId};

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct TemperatureSummary {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
}

/// Health summary derived from the snapshot history.
#[must_use]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatteryHealth {
    pub device_id: DeviceId,

    /// Latest known state of health.
    pub state_of_health: Option<Percent>,

    /// State-of-health drop per thousand equivalent full cycles.
    ///
    /// Requires at least two state-of-health readings that are some cycles apart.
    pub degradation_per_kilocycle: Option<Percent>,

    pub temperature: Option<TemperatureSummary>,
    pub cycle_count: u32,
    pub cycles_per_day: Option<f64>,
    pub n_snapshots: usize,
}

impl BatteryHealth {
    pub fn from_history(device_id: DeviceId, history: &[BatteryState]) -> Self {
        let history: Vec<&BatteryState> =
            history.iter().sorted_by_key(|state| (state.timestamp, state.version)).collect();

        let readings: Vec<(u32, Percent)> = history
            .iter()
            .filter_map(|state| state.state_of_health.map(|soh| (state.cycle_count, soh)))
            .collect();
        let degradation_per_kilocycle = match (readings.first(), readings.last()) {
            (Some((first_cycles, first_soh)), Some((last_cycles, last_soh)))
                if last_cycles > first_cycles =>
            {
                let cycles = f64::from(last_cycles - first_cycles);
                Some((*first_soh - *last_soh) * (1000.0 / cycles))
            }
            _ => None,
        };

        let temperatures: Vec<f64> =
            history.iter().filter_map(|state| state.temperature_celsius).collect();
        #[expect(clippy::cast_precision_loss)]
        let temperature = match temperatures.iter().copied().minmax_by(f64::total_cmp) {
            MinMaxResult::NoElements => None,
            MinMaxResult::OneElement(value) => {
                Some(TemperatureSummary { min: value, mean: value, max: value })
            }
            MinMaxResult::MinMax(min, max) => Some(TemperatureSummary {
                min,
                mean: temperatures.iter().sum::<f64>() / temperatures.len() as f64,
                max,
            }),
        };

        let cycles_per_day = match (history.first(), history.last()) {
            (Some(first), Some(last)) if last.timestamp > first.timestamp => {
                let days = (last.timestamp - first.timestamp).as_seconds_f64() / 86400.0;
                Some(f64::from(last.cycle_count.saturating_sub(first.cycle_count)) / days)
            }
            _ => None,
        };

        Self {
            device_id,
            state_of_health: readings.last().map(|(_, soh)| *soh),
            degradation_per_kilocycle,
            temperature,
            cycle_count: history.last().map_or(0, |state| state.cycle_count),
            cycles_per_day,
            n_snapshots: history.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::{TimeZone, Utc};
    use hoard_quantities::energy::KilowattHours;

    use super::*;

    fn snapshot(day: u32, cycle_count: u32, soh: Option<f64>, temperature: Option<f64>) -> BatteryState {
        BatteryState {
            device_id: DeviceId::from("site-1"),
            version: u64::from(day),
            timestamp: Utc.with_ymd_and_hms(2025, 6, day, 0, 0, 0).unwrap(),
            state_of_charge: Percent::from(50.0),
            state_of_health: soh.map(Percent::from),
            temperature_celsius: temperature,
            voltage_volts: None,
            current_amperes: None,
            power: None,
            cycle_count,
            remaining_capacity: None,
            throughput: KilowattHours::ZERO,
        }
    }

    #[test]
    fn test_from_history() {
        let history = [
            snapshot(1, 100, Some(99.0), Some(20.0)),
            snapshot(3, 150, None, Some(30.0)),
            snapshot(5, 300, Some(98.0), Some(25.0)),
        ];
        let health = BatteryHealth::from_history(DeviceId::from("site-1"), &history);
        assert_eq!(health.state_of_health, Some(Percent::from(98.0)));
        assert_abs_diff_eq!(health.degradation_per_kilocycle.unwrap().get(), 5.0, epsilon = 1e-9);
        assert_eq!(health.temperature, Some(TemperatureSummary { min: 20.0, mean: 25.0, max: 30.0 }));
        assert_eq!(health.cycle_count, 300);
        assert_abs_diff_eq!(health.cycles_per_day.unwrap(), 50.0, epsilon = 1e-9);
        assert_eq!(health.n_snapshots, 3);
    }

    #[test]
    fn test_single_snapshot() {
        let health =
            BatteryHealth::from_history(DeviceId::from("site-1"), &[snapshot(1, 0, None, None)]);
        assert_eq!(health.state_of_health, None);
        assert_eq!(health.degradation_per_kilocycle, None);
        assert_eq!(health.temperature, None);
        assert_eq!(health.cycles_per_day, None);
    }
}
