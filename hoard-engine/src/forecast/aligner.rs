use hoard_quantities::{energy::KilowattHours, power::Kilowatts};
use itertools::Itertools;
use serde::Serialize;

use crate::{
    forecast::{Estimate, ForecastKind, ForecastSeries},
    ops::Interval,
    prelude::*,
};

/// Forecast energy flows of a single grid interval.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct NetLoad {
    pub interval: Interval,

    #[serde(rename = "consumption_kwh")]
    pub consumption: KilowattHours,

    #[serde(rename = "production_kwh")]
    pub production: KilowattHours,
}

impl NetLoad {
    /// Energy the site needs from the grid without a battery, negative when it has a surplus.
    pub fn energy(&self) -> KilowattHours {
        self.consumption - self.production
    }
}

/// Resample the forecasts onto the grid of consecutive intervals.
///
/// Without a production forecast, the site is assumed to produce nothing.
#[instrument(skip_all, fields(n_intervals = grid.len()))]
pub fn align(
    consumption: &ForecastSeries,
    production: Option<&ForecastSeries>,
    grid: &[Interval],
    estimate: Estimate,
) -> Result<Vec<NetLoad>> {
    if grid.is_empty() {
        return Err(Error::Validation("empty horizon".to_owned()));
    }
    if let Some(interval) = grid.iter().find(|interval| interval.is_empty()) {
        return Err(Error::Validation(format!("empty interval: {interval:?}")));
    }
    if let Some((lhs, rhs)) = grid.iter().tuple_windows().find(|(lhs, rhs)| lhs.end != rhs.start) {
        return Err(Error::Validation(format!("gap in the grid between {lhs:?} and {rhs:?}")));
    }
    let consumption = segments(consumption, ForecastKind::Consumption, estimate)?;
    let production = production
        .map(|series| segments(series, ForecastKind::Production, estimate))
        .transpose()?;

    let net_loads = grid
        .iter()
        .map(|&interval| {
            Ok(NetLoad {
                interval,
                consumption: integrate(&consumption, interval, ForecastKind::Consumption)?,
                production: production.as_ref().map_or(Ok(KilowattHours::ZERO), |production| {
                    integrate(production, interval, ForecastKind::Production)
                })?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    debug!(n_intervals = net_loads.len(), "aligned");
    Ok(net_loads)
}

fn segments(
    series: &ForecastSeries,
    expected_kind: ForecastKind,
    estimate: Estimate,
) -> Result<Vec<(Interval, Kilowatts)>> {
    if series.kind != expected_kind {
        return Err(Error::Validation(format!(
            "expected a {expected_kind} forecast, got {}",
            series.kind,
        )));
    }
    series.validate()?;
    Ok(series.segments(estimate))
}

/// Integrate the piecewise-constant power over the interval.
fn integrate(
    segments: &[(Interval, Kilowatts)],
    interval: Interval,
    kind: ForecastKind,
) -> Result<KilowattHours> {
    let mut energy = KilowattHours::ZERO;
    let mut covered_until = interval.start;
    let first = segments.partition_point(|(segment, _)| segment.end <= interval.start);
    for (segment, power) in &segments[first..] {
        if segment.start > covered_until || covered_until >= interval.end {
            break;
        }
        let Some(overlap) = segment.intersection(interval) else {
            break;
        };
        energy += *power * overlap.len();
        covered_until = overlap.end;
    }
    if covered_until < interval.end {
        let missing = Interval::new(covered_until, interval.end);
        let missing = segments[first..]
            .iter()
            .find(|(segment, _)| segment.start > covered_until)
            .map_or(missing, |(segment, _)| missing.with_end(segment.start.min(interval.end)));
        return Err(Error::InsufficientForecastCoverage { kind, missing });
    }
    Ok(energy)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    use super::*;
    use crate::forecast::series::tests::hourly;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, hour, minute, 0).unwrap()
    }

    fn grid(horizon: Interval, step: TimeDelta) -> Vec<Interval> {
        horizon.split(step).collect()
    }

    #[test]
    fn test_net_load() {
        let consumption = hourly(ForecastKind::Consumption, at(0, 0), &[2.0, 3.0, 4.0]);
        let production = hourly(ForecastKind::Production, at(0, 0), &[0.5, 0.5, 5.0]);
        let net_loads = align(
            &consumption,
            Some(&production),
            &grid(Interval::new(at(0, 0), at(3, 0)), TimeDelta::hours(1)),
            Estimate::Expected,
        )
        .unwrap();
        let energies: Vec<f64> = net_loads.iter().map(|net_load| net_load.energy().get()).collect();
        assert_eq!(energies, [1.5, 2.5, -1.0]);
    }

    #[test]
    fn test_resample_across_samples() {
        let consumption = hourly(ForecastKind::Consumption, at(0, 0), &[2.0, 4.0]);
        let net_loads = align(
            &consumption,
            None,
            &grid(Interval::new(at(0, 30), at(2, 0)), TimeDelta::minutes(60)),
            Estimate::Expected,
        )
        .unwrap();
        assert_eq!(net_loads.len(), 2);

        // Half an hour at 2 kW, then half an hour at 4 kW:
        assert_abs_diff_eq!(net_loads[0].consumption.get(), 3.0);
        assert_eq!(net_loads[1].interval, Interval::new(at(1, 30), at(2, 0)));
        assert_abs_diff_eq!(net_loads[1].consumption.get(), 2.0);
    }

    #[test]
    fn test_horizon_beyond_forecast() {
        let consumption = hourly(ForecastKind::Consumption, at(0, 0), &[2.0, 2.0]);
        let result = align(
            &consumption,
            None,
            &grid(Interval::new(at(0, 0), at(3, 0)), TimeDelta::hours(1)),
            Estimate::Expected,
        );
        assert!(matches!(
            result,
            Err(Error::InsufficientForecastCoverage { kind: ForecastKind::Consumption, missing })
                if missing == Interval::new(at(2, 0), at(3, 0)),
        ));
    }

    #[test]
    fn test_gap_in_forecast() {
        let mut consumption = hourly(ForecastKind::Consumption, at(0, 0), &[2.0, 2.0, 2.0]);
        consumption.points.remove(1);
        let result = align(
            &consumption,
            None,
            &grid(Interval::new(at(0, 0), at(3, 0)), TimeDelta::minutes(30)),
            Estimate::Expected,
        );
        assert!(matches!(
            result,
            Err(Error::InsufficientForecastCoverage { missing, .. })
                if missing == Interval::new(at(1, 0), at(1, 30)),
        ));
    }

    #[test]
    fn test_wrong_kind_is_rejected() {
        let production = hourly(ForecastKind::Production, at(0, 0), &[2.0]);
        let result = align(
            &production,
            None,
            &grid(Interval::new(at(0, 0), at(1, 0)), TimeDelta::hours(1)),
            Estimate::Expected,
        );
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_gap_in_grid_is_rejected() {
        let consumption = hourly(ForecastKind::Consumption, at(0, 0), &[2.0, 2.0, 2.0]);
        let grid = [Interval::new(at(0, 0), at(1, 0)), Interval::new(at(2, 0), at(3, 0))];
        let result = align(&consumption, None, &grid, Estimate::Expected);
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
