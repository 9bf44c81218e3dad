use chrono::{DateTime, Utc};
use hoard_quantities::{energy::KilowattHours, percent::Percent, power::Kilowatts};
use serde::{Deserialize, Serialize};

use crate::device::{BatterySpec, DeviceId};

/// Immutable point-in-time battery snapshot.
///
/// A new snapshot is appended on every telemetry update and after every applied control
/// command. The current state is the latest snapshot.
#[must_use]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatteryState {
    pub device_id: DeviceId,

    /// Per-device sequence number, starting with 1.
    pub version: u64,

    pub timestamp: DateTime<Utc>,
    pub state_of_charge: Percent,

    /// Unknown until enough cycle history exists.
    pub state_of_health: Option<Percent>,

    pub temperature_celsius: Option<f64>,
    pub voltage_volts: Option<f64>,
    pub current_amperes: Option<f64>,

    #[serde(rename = "power_kw")]
    pub power: Option<Kilowatts>,

    /// Non-decreasing.
    pub cycle_count: u32,

    #[serde(rename = "remaining_capacity_kwh")]
    pub remaining_capacity: Option<KilowattHours>,

    /// Lifetime energy cycled through the battery terminals, charge and discharge alike.
    #[serde(default = "KilowattHours::zero", rename = "throughput_kwh")]
    pub throughput: KilowattHours,
}

impl BatteryState {
    /// Energy currently stored, corrected on the state of health.
    pub fn stored_energy(&self, spec: &BatterySpec) -> KilowattHours {
        spec.actual_capacity(self.state_of_health) * self.state_of_charge.to_proportion()
    }
}

/// Raw telemetry reading as reported by a device.
#[must_use]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Measurement {
    pub timestamp: DateTime<Utc>,
    pub state_of_charge: Percent,

    #[serde(default)]
    pub state_of_health: Option<Percent>,

    #[serde(default)]
    pub temperature_celsius: Option<f64>,

    #[serde(default)]
    pub voltage_volts: Option<f64>,

    #[serde(default)]
    pub current_amperes: Option<f64>,

    #[serde(default, rename = "power_kw")]
    pub power: Option<Kilowatts>,

    #[serde(default)]
    pub cycle_count: Option<u32>,

    #[serde(default, rename = "remaining_capacity_kwh")]
    pub remaining_capacity: Option<KilowattHours>,
}

impl Measurement {
    pub const fn new(timestamp: DateTime<Utc>, state_of_charge: Percent) -> Self {
        Self {
            timestamp,
            state_of_charge,
            state_of_health: None,
            temperature_celsius: None,
            voltage_volts: None,
            current_amperes: None,
            power: None,
            cycle_count: None,
            remaining_capacity: None,
        }
    }
}

/// Requested constant battery power for a duration.
#[must_use]
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct ControlCommand {
    /// Positive discharges, negative charges.
    #[serde(rename = "power_kw")]
    pub power: Kilowatts,

    pub duration_minutes: u32,
}
