use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    device::DeviceId,
    forecast::{ForecastKind, ForecastSeries},
    prelude::*,
};

#[async_trait]
pub trait ForecastProvider: Send + Sync {
    /// Most recent forecast of the kind generated no later than `start`.
    async fn forecast(
        &self,
        device_id: &DeviceId,
        kind: ForecastKind,
        start: DateTime<Utc>,
        horizon_hours: u32,
    ) -> Result<Option<ForecastSeries>>;
}

#[derive(Default)]
pub struct InMemoryForecasts(Vec<ForecastSeries>);

impl InMemoryForecasts {
    pub fn try_new(forecasts: impl IntoIterator<Item = ForecastSeries>) -> Result<Self> {
        let forecasts: Vec<ForecastSeries> = forecasts.into_iter().collect();
        for series in &forecasts {
            series.validate()?;
        }
        Ok(Self(forecasts))
    }
}

#[async_trait]
impl ForecastProvider for InMemoryForecasts {
    async fn forecast(
        &self,
        device_id: &DeviceId,
        kind: ForecastKind,
        start: DateTime<Utc>,
        _horizon_hours: u32,
    ) -> Result<Option<ForecastSeries>> {
        Ok(self
            .0
            .iter()
            .filter(|series| {
                &series.device_id == device_id && series.kind == kind && series.generated_at <= start
            })
            .max_by_key(|series| series.generated_at)
            .cloned())
    }
}
