use std::sync::Arc;

use bon::bon;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    battery::{BatteryHealth, BatteryState, ControlCommand, Measurement, Tracker},
    device::{Device, DeviceId},
    forecast::{self, Estimate, ForecastKind, NetLoad},
    ops::{Interval, RangeInclusive},
    prelude::*,
    roi::{self, RoiResult},
    schedule::DispatchSchedule,
    solver::{Constraints, Solver, SolverSettings},
    store::{BatteryStateStore, DeviceStore, ForecastProvider, TariffStore},
    tariff::{EnergyTariff, RateQuote, TariffId, TariffResolver},
};

/// Allowed planning horizon.
pub const HORIZON_HOURS: RangeInclusive<u32> = RangeInclusive { min: 1, max: 168 };

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Length of the common interval grid.
    pub interval_minutes: u32,

    #[serde(flatten)]
    pub solver: SolverSettings,

    pub forecast_estimate: Estimate,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            interval_minutes: 60,
            solver: SolverSettings::default(),
            forecast_estimate: Estimate::Expected,
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result {
        if !(1..=24 * 60).contains(&self.interval_minutes) {
            return Err(Error::Validation(format!(
                "interval must be between 1 minute and 1 day, got {} minutes",
                self.interval_minutes,
            )));
        }
        self.solver.validate()
    }

    fn interval(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.interval_minutes))
    }
}

/// Optimization inputs and output, kept together for the evaluation.
struct Plan {
    device: Device,
    net_loads: Vec<NetLoad>,
    rates: Vec<RateQuote>,
    schedule: DispatchSchedule,
}

/// Battery dispatch service over the collaborator stores.
///
/// Requests for different devices are independent. For the same device, state writes are
/// serialized, and a plan starts from the latest snapshot committed at the time the request
/// is admitted.
pub struct Engine {
    devices: Arc<dyn DeviceStore>,
    tariffs: Arc<dyn TariffStore>,
    forecasts: Arc<dyn ForecastProvider>,
    tracker: Tracker,
    settings: EngineSettings,
}

#[bon]
impl Engine {
    #[builder]
    pub fn new(
        devices: Arc<dyn DeviceStore>,
        tariffs: Arc<dyn TariffStore>,
        forecasts: Arc<dyn ForecastProvider>,
        states: Arc<dyn BatteryStateStore>,
        #[builder(default)] settings: EngineSettings,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self { devices, tariffs, forecasts, tracker: Tracker::new(states), settings })
    }

    /// Cost-minimizing battery schedule for the next hours.
    #[instrument(skip_all, fields(device_id = %device_id, horizon_hours = horizon_hours))]
    pub async fn get_optimal_operation(
        &self,
        device_id: &DeviceId,
        horizon_hours: u32,
        now: DateTime<Utc>,
    ) -> Result<DispatchSchedule> {
        Ok(self.plan(device_id, horizon_hours, None, now).await?.schedule)
    }

    /// Evaluate the investment into the battery over the horizon.
    ///
    /// The schedule is optimized against the specified tariff only, or against the tariffs
    /// active for the device when none is specified.
    #[instrument(skip_all, fields(device_id = %device_id, horizon_hours = horizon_hours, tariff_id = ?tariff_id))]
    pub async fn calculate_roi(
        &self,
        device_id: &DeviceId,
        horizon_hours: u32,
        tariff_id: Option<&TariffId>,
        now: DateTime<Utc>,
    ) -> Result<RoiResult> {
        let plan = self.plan(device_id, horizon_hours, tariff_id, now).await?;
        roi::evaluate(&plan.schedule, plan.device.battery.capital_cost, &plan.net_loads, &plan.rates)
    }

    /// Apply the command to the tracked state.
    ///
    /// Schedules computed earlier are left as they are, the next plan starts from the new state.
    #[instrument(skip_all, fields(device_id = %device_id))]
    pub async fn apply_control_command(
        &self,
        device_id: &DeviceId,
        command: ControlCommand,
        now: DateTime<Utc>,
    ) -> Result<BatteryState> {
        let device = self.device(device_id).await?;
        self.tracker.apply_control(device_id, &device.battery, command, now).await
    }

    #[instrument(skip_all, fields(device_id = %device_id))]
    pub async fn get_battery_state(&self, device_id: &DeviceId) -> Result<BatteryState> {
        self.ensure_device(device_id).await?;
        self.tracker.latest(device_id).await
    }

    #[instrument(skip_all, fields(device_id = %device_id))]
    pub async fn update_battery_state(
        &self,
        device_id: &DeviceId,
        measurement: Measurement,
    ) -> Result<BatteryState> {
        self.ensure_device(device_id).await?;
        self.tracker.update(device_id, measurement).await
    }

    #[instrument(skip_all, fields(device_id = %device_id))]
    pub async fn get_battery_health(&self, device_id: &DeviceId) -> Result<BatteryHealth> {
        self.ensure_device(device_id).await?;
        let history = self.tracker.history(device_id).await?;
        if history.is_empty() {
            return Err(Error::NoBatteryState(device_id.clone()));
        }
        Ok(BatteryHealth::from_history(device_id.clone(), &history))
    }

    /// All known tariffs, ordered by the start of their validity.
    pub async fn list_tariffs(&self) -> Result<Vec<EnergyTariff>> {
        let mut tariffs = self.tariffs.tariffs().await?;
        tariffs.sort_by(|lhs, rhs| (lhs.effective_from, &lhs.id).cmp(&(rhs.effective_from, &rhs.id)));
        Ok(tariffs)
    }

    async fn device(&self, device_id: &DeviceId) -> Result<Device> {
        self.devices.get(device_id).await?.ok_or_else(|| Error::UnknownDevice(device_id.clone()))
    }

    async fn ensure_device(&self, device_id: &DeviceId) -> Result {
        self.device(device_id).await.map(drop)
    }

    async fn plan(
        &self,
        device_id: &DeviceId,
        horizon_hours: u32,
        tariff_id: Option<&TariffId>,
        now: DateTime<Utc>,
    ) -> Result<Plan> {
        if !HORIZON_HOURS.contains(horizon_hours) {
            return Err(Error::Validation(format!(
                "horizon must be between {} and {} hours, got {horizon_hours}",
                HORIZON_HOURS.min, HORIZON_HOURS.max,
            )));
        }
        let device = self.device(device_id).await?;
        let state = self.tracker.latest(device_id).await?;

        let start = now
            .duration_trunc(TimeDelta::minutes(1))
            .map_err(|error| Error::Validation(format!("invalid start time {now}: {error}")))?;
        let horizon = Interval::new(start, start + TimeDelta::hours(i64::from(horizon_hours)));

        let tariffs = match tariff_id {
            Some(tariff_id) => vec![
                self.tariffs
                    .tariff(tariff_id)
                    .await?
                    .ok_or_else(|| Error::UnknownTariff(tariff_id.clone()))?,
            ],
            None => self.tariffs.active_within(horizon).await?,
        };
        let resolver = match tariffs.as_slice() {
            [tariff] if tariff_id.is_some() => TariffResolver::pinned(device_id, tariff)?,
            _ => TariffResolver::new(device_id, &tariffs),
        };

        // Intervals follow the clock and never straddle a price change:
        let price_changes: Vec<DateTime<Utc>> = tariffs
            .iter()
            .filter(|tariff| tariff.applies_to(device_id))
            .flat_map(|tariff| tariff.price_changes(horizon))
            .sorted_unstable()
            .dedup()
            .collect();
        let grid: Vec<Interval> = horizon
            .split_aligned(self.settings.interval())
            .flat_map(|interval| interval.cut(&price_changes))
            .collect();
        let net_loads = self.net_loads(device_id, horizon, horizon_hours, &grid).await?;
        let rates = resolver.rate_series(&grid)?;

        let constraints = Constraints::from_spec(&device.battery, state.state_of_health);
        let steps = Solver::builder()
            .net_loads(&net_loads)
            .rates(&rates)
            .constraints(&constraints)
            .settings(self.settings.solver)
            .build()
            .solve(state.state_of_charge)?;
        let schedule = DispatchSchedule {
            device_id: device_id.clone(),
            initial_soc: state
                .state_of_charge
                .clamp(device.battery.soc_window.min, device.battery.soc_window.max),
            steps,
        };
        info!(
            version = state.version,
            objective = ?schedule.objective(),
            throughput = ?schedule.throughput(),
            "planned",
        );
        Ok(Plan { device, net_loads, rates, schedule })
    }

    async fn net_loads(
        &self,
        device_id: &DeviceId,
        horizon: Interval,
        horizon_hours: u32,
        grid: &[Interval],
    ) -> Result<Vec<NetLoad>> {
        let consumption = self
            .forecasts
            .forecast(device_id, ForecastKind::Consumption, horizon.start, horizon_hours)
            .await?
            .ok_or(Error::InsufficientForecastCoverage {
                kind: ForecastKind::Consumption,
                missing: horizon,
            })?;
        let production = self
            .forecasts
            .forecast(device_id, ForecastKind::Production, horizon.start, horizon_hours)
            .await?;
        if production.is_none() {
            debug!("no production forecast, assuming none");
        }
        forecast::align(
            &consumption,
            production.as_ref(),
            grid,
            self.settings.forecast_estimate,
        )
    }
}
