use std::{path::Path, sync::Arc};

use hoard_engine::{
    Engine,
    EngineSettings,
    battery::Measurement,
    device::{Device, DeviceId},
    forecast::ForecastSeries,
    store::{BatteryStateStore, InMemoryDevices, InMemoryForecasts, InMemoryTariffs},
    tariff::EnergyTariff,
};
use serde::Deserialize;

use crate::prelude::*;

/// Everything the engine knows about the site, read from a TOML file.
#[must_use]
#[derive(Deserialize)]
pub struct Site {
    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub devices: Vec<Device>,

    #[serde(default)]
    pub tariffs: Vec<EnergyTariff>,

    #[serde(default)]
    pub forecasts: Vec<ForecastSeries>,

    /// Initial readings, applied to devices without any recorded state.
    #[serde(default)]
    pub states: Vec<StateSeed>,
}

#[derive(Deserialize)]
pub struct StateSeed {
    pub device_id: DeviceId,
    pub measurement: Measurement,
}

impl Site {
    pub fn read(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        Self::parse(&contents).with_context(|| format!("failed to parse `{}`", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    #[instrument(skip_all)]
    pub async fn into_engine(self, states: Arc<dyn BatteryStateStore>) -> Result<Engine> {
        info!(
            n_devices = self.devices.len(),
            n_tariffs = self.tariffs.len(),
            n_forecasts = self.forecasts.len(),
            "loading the site…",
        );
        let engine = Engine::builder()
            .devices(Arc::new(InMemoryDevices::try_new(self.devices)?))
            .tariffs(Arc::new(InMemoryTariffs::try_new(self.tariffs)?))
            .forecasts(Arc::new(InMemoryForecasts::try_new(self.forecasts)?))
            .states(states)
            .settings(self.engine)
            .build()?;
        for seed in self.states {
            match engine.get_battery_state(&seed.device_id).await {
                Ok(state) => {
                    debug!(device_id = %seed.device_id, version = state.version, "state is already recorded");
                }
                Err(hoard_engine::Error::NoBatteryState(_)) => {
                    engine
                        .update_battery_state(&seed.device_id, seed.measurement)
                        .await
                        .with_context(|| format!("failed to seed the state of `{}`", seed.device_id))?;
                }
                Err(error) => return Err(error.into()),
            }
        }
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use hoard_engine::store::InMemoryBatteryStates;
    use hoard_quantities::{cost::Cost, percent::Percent};

    use super::*;

    const DEMO: &str = include_str!("../../demos/site.toml");

    #[test]
    fn test_parse_demo_ok() -> Result {
        let site = Site::parse(DEMO)?;
        assert_eq!(site.devices.len(), 1);
        assert_eq!(site.tariffs.len(), 2);
        assert_eq!(site.forecasts.len(), 2);
        assert_eq!(site.states.len(), 1);
        assert_eq!(site.engine.interval_minutes, 60);
        Ok(())
    }

    #[tokio::test]
    async fn test_demo_plan_ok() -> Result {
        let engine = Site::parse(DEMO)?.into_engine(Arc::new(InMemoryBatteryStates::new())).await?;
        let device_id = DeviceId::from("home");
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();

        let state = engine.get_battery_state(&device_id).await?;
        assert_eq!(state.version, 1);
        assert_eq!(state.state_of_charge, Percent::from(50.0));

        let schedule = engine.get_optimal_operation(&device_id, 24, now).await?;
        assert_eq!(schedule.steps.len(), 24);
        for step in &schedule.steps {
            assert!(step.resulting_soc >= Percent::from(10.0 - 1e-6));
            assert!(step.resulting_soc <= Percent::from(95.0 + 1e-6));
        }

        let roi = engine.calculate_roi(&device_id, 24, None, now).await?;
        assert_eq!(roi.capital_cost, Cost::from(6000.0));
        assert!(roi.baseline_cost > Cost::ZERO);
        Ok(())
    }

    #[tokio::test]
    async fn test_seed_skipped_when_recorded() -> Result {
        let states = InMemoryBatteryStates::new();
        let first = Site::parse(DEMO)?.into_engine(Arc::new(states.clone())).await?;
        let device_id = DeviceId::from("home");
        let measurement = Measurement::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 0, 30, 0).unwrap(),
            Percent::from(70.0),
        );
        first.update_battery_state(&device_id, measurement).await?;

        let second = Site::parse(DEMO)?.into_engine(Arc::new(states)).await?;
        let state = second.get_battery_state(&device_id).await?;
        assert_eq!(state.version, 2);
        assert_eq!(state.state_of_charge, Percent::from(70.0));
        Ok(())
    }
}
