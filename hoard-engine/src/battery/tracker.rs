use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, TimeDelta, Utc};
use hoard_quantities::{energy::KilowattHours, percent::Percent, power::Kilowatts};

use crate::{
    battery::{BatteryState, ControlCommand, Measurement},
    device::{BatterySpec, DeviceId},
    prelude::*,
    store::BatteryStateStore,
};

/// Keeps the per-device battery state as a versioned sequence of snapshots.
///
/// Writes are serialized per device: concurrent writers for the same device queue up on the
/// device lock, and a writer bypassing the tracker is caught by the store version check.
pub struct Tracker {
    store: Arc<dyn BatteryStateStore>,
    locks: Mutex<HashMap<DeviceId, Arc<tokio::sync::Mutex<()>>>>,
}

impl Tracker {
    pub fn new(store: Arc<dyn BatteryStateStore>) -> Self {
        Self { store, locks: Mutex::default() }
    }

    /// Latest committed snapshot.
    pub async fn latest(&self, device_id: &DeviceId) -> Result<BatteryState> {
        self.store
            .latest(device_id)
            .await?
            .ok_or_else(|| Error::NoBatteryState(device_id.clone()))
    }

    pub async fn history(&self, device_id: &DeviceId) -> Result<Vec<BatteryState>> {
        self.store.history(device_id).await
    }

    /// Append a snapshot from the telemetry reading.
    #[instrument(skip_all, fields(device_id = %device_id))]
    pub async fn update(&self, device_id: &DeviceId, measurement: Measurement) -> Result<BatteryState> {
        let lock = self.device_lock(device_id)?;
        let _guard = lock.lock().await;

        let previous = self.store.latest(device_id).await?;
        let snapshot = Self::ingest(device_id, previous.as_ref(), measurement)?;
        debug!(version = snapshot.version, soc = ?snapshot.state_of_charge, "appending");
        self.store.append(snapshot).await
    }

    /// Project the command onto the latest snapshot and append the result.
    #[instrument(skip_all, fields(device_id = %device_id, power = ?command.power))]
    pub async fn apply_control(
        &self,
        device_id: &DeviceId,
        spec: &BatterySpec,
        command: ControlCommand,
        now: DateTime<Utc>,
    ) -> Result<BatteryState> {
        Self::check_command(spec, command)?;

        let lock = self.device_lock(device_id)?;
        let _guard = lock.lock().await;

        let previous = self.latest(device_id).await?;
        let snapshot = Self::project(spec, &previous, command, now);
        info!(
            version = snapshot.version,
            soc = ?snapshot.state_of_charge,
            actual_power = ?snapshot.power,
            "applied",
        );
        self.store.append(snapshot).await
    }

    fn device_lock(&self, device_id: &DeviceId) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks =
            self.locks.lock().map_err(|error| Error::Internal(format!("poisoned lock: {error}")))?;
        Ok(locks.entry(device_id.clone()).or_default().clone())
    }

    fn check_command(spec: &BatterySpec, command: ControlCommand) -> Result {
        if command.duration_minutes == 0 {
            return Err(Error::Validation("command duration must be positive".to_owned()));
        }
        if !command.power.is_finite() {
            return Err(Error::Validation(format!("invalid command power: {}", command.power)));
        }
        let limit = spec.power_limit(command.power);
        if command.power.abs() > limit {
            return Err(Error::CommandOutOfRange {
                requested: command.power,
                limit,
                direction: if command.power > Kilowatts::ZERO { "discharge" } else { "charge" },
            });
        }
        Ok(())
    }

    fn ingest(
        device_id: &DeviceId,
        previous: Option<&BatteryState>,
        measurement: Measurement,
    ) -> Result<BatteryState> {
        let optional_fields = [
            ("temperature", measurement.temperature_celsius),
            ("voltage", measurement.voltage_volts),
            ("current", measurement.current_amperes),
            ("power", measurement.power.map(Kilowatts::get)),
            ("remaining capacity", measurement.remaining_capacity.map(KilowattHours::get)),
        ];
        for (name, value) in optional_fields {
            if value.is_some_and(|value| !value.is_finite()) {
                return Err(Error::Validation(format!("non-finite {name}")));
            }
        }
        let state_of_charge = clamp_percent("state of charge", measurement.state_of_charge)?;
        let state_of_health = measurement
            .state_of_health
            .map(|soh| clamp_percent("state of health", soh))
            .transpose()?;

        let Some(previous) = previous else {
            return Ok(BatteryState {
                device_id: device_id.clone(),
                version: 1,
                timestamp: measurement.timestamp,
                state_of_charge,
                state_of_health,
                temperature_celsius: measurement.temperature_celsius,
                voltage_volts: measurement.voltage_volts,
                current_amperes: measurement.current_amperes,
                power: measurement.power,
                cycle_count: measurement.cycle_count.unwrap_or_default(),
                remaining_capacity: measurement.remaining_capacity,
                throughput: KilowattHours::ZERO,
            });
        };

        if measurement.timestamp < previous.timestamp {
            return Err(Error::Validation(format!(
                "measurement at {} is older than the latest snapshot at {}",
                measurement.timestamp, previous.timestamp,
            )));
        }
        let cycle_count = measurement.cycle_count.unwrap_or(previous.cycle_count);
        if cycle_count < previous.cycle_count {
            return Err(Error::Validation(format!(
                "cycle count decreased from {} to {cycle_count}",
                previous.cycle_count,
            )));
        }
        Ok(BatteryState {
            device_id: device_id.clone(),
            version: previous.version + 1,
            timestamp: measurement.timestamp,
            state_of_charge,
            state_of_health: state_of_health.or(previous.state_of_health),
            temperature_celsius: measurement.temperature_celsius,
            voltage_volts: measurement.voltage_volts,
            current_amperes: measurement.current_amperes,
            power: measurement.power,
            cycle_count,
            remaining_capacity: measurement.remaining_capacity,
            throughput: previous.throughput,
        })
    }

    /// Run the battery at the commanded power, stopping at the window boundary.
    ///
    /// A battery that is already outside the window is not pushed further out, but it may
    /// stay where it is. The snapshot is stamped with the admission time, so that telemetry
    /// arriving while the command runs supersedes the projection.
    fn project(
        spec: &BatterySpec,
        previous: &BatteryState,
        command: ControlCommand,
        now: DateTime<Utc>,
    ) -> BatteryState {
        let duration = TimeDelta::minutes(i64::from(command.duration_minutes));
        let capacity = spec.actual_capacity(previous.state_of_health);
        let stored = previous.stored_energy(spec);
        let min_energy = (capacity * spec.soc_window.min.to_proportion()).min(stored);
        let max_energy = (capacity * spec.soc_window.max.to_proportion()).max(stored);

        let target = stored + spec.efficiency.stored_delta(command.power, duration);
        let energy_after = target.clamp(min_energy, max_energy);
        let actual_power = spec.efficiency.battery_power(energy_after - stored, duration);

        let throughput = previous.throughput + (actual_power * duration).abs();
        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let equivalent_cycles = (throughput / (spec.capacity * 2.0)).floor() as u32;

        BatteryState {
            device_id: previous.device_id.clone(),
            version: previous.version + 1,
            timestamp: now.max(previous.timestamp),
            state_of_charge: Percent::from_proportion(energy_after / capacity),
            state_of_health: previous.state_of_health,
            temperature_celsius: previous.temperature_celsius,
            voltage_volts: previous.voltage_volts,
            current_amperes: previous.voltage_volts.map(|volts| actual_power.get() * 1000.0 / volts),
            power: Some(actual_power),
            cycle_count: previous.cycle_count.max(equivalent_cycles),
            remaining_capacity: Some(energy_after),
            throughput,
        }
    }
}

/// Clamp the reading into `0..=100`, rejecting garbage.
fn clamp_percent(name: &str, value: Percent) -> Result<Percent> {
    if !value.is_finite() {
        return Err(Error::Validation(format!("non-finite {name}")));
    }
    let clamped = value.clamp(Percent::ZERO, Percent::HUNDRED);
    if clamped != value {
        warn!(?value, ?clamped, "{name} is out of range, clamped");
    }
    Ok(clamped)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;

    use super::*;
    use crate::{device::tests::spec, store::InMemoryBatteryStates};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap()
    }

    async fn tracker_at(soc: f64) -> Tracker {
        let tracker = Tracker::new(Arc::new(InMemoryBatteryStates::new()));
        tracker
            .update(&DeviceId::from("site-1"), Measurement::new(at(10), Percent::from(soc)))
            .await
            .unwrap();
        tracker
    }

    #[tokio::test]
    async fn test_update_clamps_state_of_charge() {
        let tracker = tracker_at(104.0).await;
        let state = tracker.latest(&DeviceId::from("site-1")).await.unwrap();
        assert_eq!(state.state_of_charge, Percent::HUNDRED);
        assert_eq!(state.version, 1);
    }

    #[tokio::test]
    async fn test_update_rejects_non_finite() {
        let tracker = tracker_at(50.0).await;
        let result = tracker
            .update(&DeviceId::from("site-1"), Measurement::new(at(11), Percent::from(f64::NAN)))
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_rejects_decreasing_cycle_count() {
        let tracker = Tracker::new(Arc::new(InMemoryBatteryStates::new()));
        let device_id = DeviceId::from("site-1");
        let mut measurement = Measurement::new(at(10), Percent::from(50.0));
        measurement.cycle_count = Some(7);
        tracker.update(&device_id, measurement).await.unwrap();

        let mut measurement = Measurement::new(at(11), Percent::from(55.0));
        measurement.cycle_count = Some(6);
        let result = tracker.update(&device_id, measurement).await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(tracker.latest(&device_id).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_update_rejects_older_measurement() {
        let tracker = tracker_at(50.0).await;
        let result = tracker
            .update(&DeviceId::from("site-1"), Measurement::new(at(9), Percent::from(40.0)))
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_control_charges_with_losses() {
        let tracker = tracker_at(50.0).await;
        let command = ControlCommand { power: Kilowatts::from(-2.0), duration_minutes: 60 };
        let state =
            tracker.apply_control(&DeviceId::from("site-1"), &spec(), command, at(10)).await.unwrap();

        // 5 kWh stored + 2 kWh × 0.9.
        assert_abs_diff_eq!(state.state_of_charge.get(), 68.0, epsilon = 1e-9);
        assert_abs_diff_eq!(state.power.unwrap().get(), -2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(state.throughput.get(), 2.0, epsilon = 1e-9);
        assert_eq!(state.timestamp, at(10));
        assert_eq!(state.version, 2);
    }

    #[tokio::test]
    async fn test_telemetry_accepted_while_command_runs() {
        let tracker = tracker_at(50.0).await;
        let device_id = DeviceId::from("site-1");
        let command = ControlCommand { power: Kilowatts::from(-2.0), duration_minutes: 240 };
        tracker.apply_control(&device_id, &spec(), command, at(10)).await.unwrap();

        let quarter_past = at(10) + TimeDelta::minutes(15);
        let state = tracker.update(&device_id, Measurement::new(quarter_past, Percent::from(53.0))).await.unwrap();
        assert_eq!(state.version, 3);

        let latest = tracker.latest(&device_id).await.unwrap();
        assert_eq!(latest.timestamp, quarter_past);
        assert_eq!(latest.state_of_charge, Percent::from(53.0));
    }

    #[tokio::test]
    async fn test_control_stops_at_window_boundary() {
        let tracker = tracker_at(20.0).await;
        let command = ControlCommand { power: Kilowatts::from(5.0), duration_minutes: 120 };
        let state =
            tracker.apply_control(&DeviceId::from("site-1"), &spec(), command, at(10)).await.unwrap();
        assert_abs_diff_eq!(state.state_of_charge.get(), 10.0, epsilon = 1e-9);

        // Only 1 kWh could be drained, which delivers 0.9 kWh over two hours.
        assert_abs_diff_eq!(state.power.unwrap().get(), 0.45, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn test_control_out_of_range() {
        let tracker = tracker_at(50.0).await;
        let command = ControlCommand { power: Kilowatts::from(-6.0), duration_minutes: 15 };
        let result = tracker.apply_control(&DeviceId::from("site-1"), &spec(), command, at(10)).await;
        assert!(matches!(result, Err(Error::CommandOutOfRange { direction: "charge", .. })));
    }

    #[tokio::test]
    async fn test_control_without_state() {
        let tracker = Tracker::new(Arc::new(InMemoryBatteryStates::new()));
        let command = ControlCommand { power: Kilowatts::from(1.0), duration_minutes: 15 };
        let result = tracker.apply_control(&DeviceId::from("site-1"), &spec(), command, at(10)).await;
        assert!(matches!(result, Err(Error::NoBatteryState(_))));
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_serialized() {
        let tracker = Arc::new(tracker_at(50.0).await);
        let command = ControlCommand { power: Kilowatts::from(-1.0), duration_minutes: 15 };
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                tokio::spawn(async move {
                    tracker.apply_control(&DeviceId::from("site-1"), &spec(), command, at(10)).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let history = tracker.history(&DeviceId::from("site-1")).await.unwrap();
        assert_eq!(history.iter().map(|state| state.version).collect::<Vec<_>>(), [1, 2, 3, 4, 5]);
    }
}
