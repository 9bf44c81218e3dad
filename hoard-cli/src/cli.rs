mod battery;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use hoard_engine::{device::DeviceId, tariff::TariffId};

pub use self::battery::{BatteryArgs, BatteryCommand};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[clap(flatten)]
    pub site: SiteArgs,

    /// Print JSON instead of tables.
    #[clap(long, global = true, env = "HOARD_JSON")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Optimize the battery schedule for the upcoming hours.
    #[clap(name = "plan")]
    Plan(PlanArgs),

    /// Evaluate the battery investment against the no-battery baseline.
    #[clap(name = "roi")]
    Roi(RoiArgs),

    /// List the known tariffs.
    #[clap(name = "tariffs")]
    Tariffs,

    /// Inspect and update the tracked battery state.
    #[clap(name = "battery")]
    Battery(BatteryArgs),
}

#[derive(Parser)]
pub struct SiteArgs {
    /// Site file with devices, tariffs, forecasts, and initial battery states.
    #[clap(long = "site", env = "HOARD_SITE", default_value = "site.toml")]
    pub path: PathBuf,

    /// JSON-lines journal persisting the battery state between runs.
    #[clap(long = "journal", env = "HOARD_JOURNAL")]
    pub journal: Option<PathBuf>,

    /// Override the interval length from the site file.
    #[clap(long = "interval-minutes", env = "HOARD_INTERVAL_MINUTES")]
    pub interval_minutes: Option<u32>,
}

#[derive(Parser)]
pub struct HorizonArgs {
    #[clap(long = "horizon-hours", default_value = "24", env = "HOARD_HORIZON_HOURS")]
    pub hours: u32,

    /// Plan as of this instant instead of now.
    #[clap(long = "at")]
    pub at: Option<DateTime<Utc>>,
}

impl HorizonArgs {
    pub fn now(&self) -> DateTime<Utc> {
        self.at.unwrap_or_else(Utc::now)
    }
}

#[derive(Parser)]
pub struct PlanArgs {
    pub device_id: DeviceId,

    #[clap(flatten)]
    pub horizon: HorizonArgs,
}

#[derive(Parser)]
pub struct RoiArgs {
    pub device_id: DeviceId,

    /// Evaluate against this tariff only, instead of the tariffs active for the device.
    #[clap(long = "tariff")]
    pub tariff_id: Option<TariffId>,

    #[clap(flatten)]
    pub horizon: HorizonArgs,
}
