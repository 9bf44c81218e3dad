use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use hoard_engine::{
    battery::{ControlCommand, Measurement},
    device::DeviceId,
};
use hoard_quantities::{energy::KilowattHours, percent::Percent, power::Kilowatts};

#[derive(Parser)]
pub struct BatteryArgs {
    #[command(subcommand)]
    pub command: BatteryCommand,
}

#[derive(Subcommand)]
pub enum BatteryCommand {
    /// Show the latest battery state.
    #[clap(name = "state")]
    State { device_id: DeviceId },

    /// Summarize the battery health over the recorded history.
    #[clap(name = "health")]
    Health { device_id: DeviceId },

    /// Record a telemetry reading.
    #[clap(name = "update")]
    Update(Box<UpdateArgs>),

    /// Apply a power command and record the projected state.
    #[clap(name = "control")]
    Control(ControlArgs),
}

#[derive(Parser)]
pub struct UpdateArgs {
    pub device_id: DeviceId,

    #[clap(long = "soc-percent")]
    pub state_of_charge: Percent,

    #[clap(long = "soh-percent")]
    pub state_of_health: Option<Percent>,

    #[clap(long = "temperature-celsius")]
    pub temperature_celsius: Option<f64>,

    #[clap(long = "voltage-volts")]
    pub voltage_volts: Option<f64>,

    #[clap(long = "current-amperes")]
    pub current_amperes: Option<f64>,

    #[clap(long = "power-kilowatts", allow_hyphen_values = true)]
    pub power: Option<Kilowatts>,

    #[clap(long = "cycle-count")]
    pub cycle_count: Option<u32>,

    #[clap(long = "remaining-capacity-kwh")]
    pub remaining_capacity: Option<KilowattHours>,

    /// Reading time, defaults to now.
    #[clap(long = "at")]
    pub at: Option<DateTime<Utc>>,
}

impl UpdateArgs {
    pub fn measurement(&self) -> Measurement {
        Measurement {
            state_of_health: self.state_of_health,
            temperature_celsius: self.temperature_celsius,
            voltage_volts: self.voltage_volts,
            current_amperes: self.current_amperes,
            power: self.power,
            cycle_count: self.cycle_count,
            remaining_capacity: self.remaining_capacity,
            ..Measurement::new(self.at.unwrap_or_else(Utc::now), self.state_of_charge)
        }
    }
}

#[derive(Parser)]
pub struct ControlArgs {
    pub device_id: DeviceId,

    /// Positive discharges, negative charges.
    #[clap(long = "power-kilowatts", allow_hyphen_values = true)]
    pub power: Kilowatts,

    #[clap(long = "duration-minutes")]
    pub duration_minutes: u32,

    /// Command time, defaults to now.
    #[clap(long = "at")]
    pub at: Option<DateTime<Utc>>,
}

impl ControlArgs {
    pub const fn command(&self) -> ControlCommand {
        ControlCommand { power: self.power, duration_minutes: self.duration_minutes }
    }
}
