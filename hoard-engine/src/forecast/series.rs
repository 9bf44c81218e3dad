use chrono::{DateTime, TimeDelta, Utc};
use derive_more::Display;
use hoard_quantities::power::Kilowatts;
use serde::{Deserialize, Serialize};

use crate::{device::DeviceId, ops::Interval, prelude::*};

#[derive(Copy, Clone, Debug, Display, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecastKind {
    #[display("consumption")]
    Consumption,

    #[display("production")]
    Production,
}

/// Which forecast value to plan against.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Estimate {
    #[default]
    Expected,

    /// High consumption and low production, when the confidence bounds are known.
    Conservative,
}

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// Offset from the generation time.
    pub offset_minutes: u32,

    /// Average power over the sample.
    #[serde(rename = "expected_kw")]
    pub expected: Kilowatts,

    #[serde(default, rename = "confidence_low_kw")]
    pub confidence_low: Option<Kilowatts>,

    #[serde(default, rename = "confidence_high_kw")]
    pub confidence_high: Option<Kilowatts>,
}

/// Forecast produced by an external forecaster.
#[must_use]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ForecastSeries {
    pub device_id: DeviceId,

    #[serde(rename = "forecast_type")]
    pub kind: ForecastKind,

    pub generated_at: DateTime<Utc>,
    pub horizon_hours: u32,

    /// How long each sample holds its value, unless the next sample comes earlier.
    pub resolution_minutes: u32,

    /// Ordered by offset.
    pub points: Vec<ForecastPoint>,
}

impl ForecastSeries {
    pub fn validate(&self) -> Result {
        if self.resolution_minutes == 0 {
            return Err(Error::Validation(format!("{} forecast has zero resolution", self.kind)));
        }
        if !self.points.is_sorted_by(|lhs, rhs| lhs.offset_minutes < rhs.offset_minutes) {
            return Err(Error::Validation(format!(
                "{} forecast points are not strictly ordered by offset",
                self.kind,
            )));
        }
        let is_finite = |point: &ForecastPoint| {
            [Some(point.expected), point.confidence_low, point.confidence_high]
                .into_iter()
                .flatten()
                .all(Kilowatts::is_finite)
        };
        if !self.points.iter().all(is_finite) {
            return Err(Error::Validation(format!("{} forecast has non-finite values", self.kind)));
        }
        Ok(())
    }

    /// Validity window of the whole forecast.
    pub fn window(&self) -> Interval {
        Interval::new(
            self.generated_at,
            self.generated_at + TimeDelta::hours(i64::from(self.horizon_hours)),
        )
    }

    /// Constant-power segments, ordered and non-overlapping, clipped to the forecast window.
    pub fn segments(&self, estimate: Estimate) -> Vec<(Interval, Kilowatts)> {
        let resolution = TimeDelta::minutes(i64::from(self.resolution_minutes));
        let window = self.window();
        let starts: Vec<DateTime<Utc>> = self
            .points
            .iter()
            .map(|point| self.generated_at + TimeDelta::minutes(i64::from(point.offset_minutes)))
            .collect();
        self.points
            .iter()
            .zip(&starts)
            .enumerate()
            .filter_map(|(index, (point, start))| {
                let mut end = *start + resolution;
                if let Some(next_start) = starts.get(index + 1) {
                    end = end.min(*next_start);
                }
                let segment = Interval::new(*start, end).intersection(window)?;
                Some((segment, self.value(point, estimate)))
            })
            .collect()
    }

    fn value(&self, point: &ForecastPoint, estimate: Estimate) -> Kilowatts {
        match (estimate, self.kind) {
            (Estimate::Expected, _) => point.expected,
            (Estimate::Conservative, ForecastKind::Consumption) => {
                point.confidence_high.unwrap_or(point.expected)
            }
            (Estimate::Conservative, ForecastKind::Production) => {
                point.confidence_low.unwrap_or(point.expected)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::TimeZone;

    use super::*;

    pub fn hourly(
        kind: ForecastKind,
        generated_at: DateTime<Utc>,
        values: &[f64],
    ) -> ForecastSeries {
        ForecastSeries {
            device_id: DeviceId::from("site-1"),
            kind,
            generated_at,
            horizon_hours: u32::try_from(values.len()).unwrap(),
            resolution_minutes: 60,
            points: values
                .iter()
                .zip(0..)
                .map(|(value, hour)| ForecastPoint {
                    offset_minutes: hour * 60,
                    expected: Kilowatts::from(*value),
                    confidence_low: Some(Kilowatts::from(value * 0.5)),
                    confidence_high: Some(Kilowatts::from(value * 1.5)),
                })
                .collect(),
        }
    }

    fn midnight() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_segments_hold_until_next_sample() {
        let mut series = hourly(ForecastKind::Consumption, midnight(), &[1.0, 2.0]);
        series.resolution_minutes = 90;
        let segments = series.segments(Estimate::Expected);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].0, Interval::new(midnight(), midnight() + TimeDelta::hours(1)));
        assert_eq!(segments[1].0.end, midnight() + TimeDelta::hours(2));
    }

    #[test]
    fn test_conservative_estimate() {
        let consumption = hourly(ForecastKind::Consumption, midnight(), &[2.0]);
        assert_eq!(consumption.segments(Estimate::Conservative)[0].1, Kilowatts::from(3.0));
        let production = hourly(ForecastKind::Production, midnight(), &[2.0]);
        assert_eq!(production.segments(Estimate::Conservative)[0].1, Kilowatts::from(1.0));
    }

    #[test]
    fn test_unordered_points_are_rejected() {
        let mut series = hourly(ForecastKind::Consumption, midnight(), &[1.0, 2.0]);
        series.points.swap(0, 1);
        assert!(matches!(series.validate(), Err(Error::Validation(_))));
    }
}
