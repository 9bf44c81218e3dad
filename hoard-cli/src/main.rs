mod cli;
mod journal;
mod prelude;
mod site;
mod tables;

use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, crate_version};
use comfy_table::Table;
use hoard_engine::{
    Engine,
    store::{BatteryStateStore, InMemoryBatteryStates},
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::{
    cli::{Args, BatteryCommand, Command, SiteArgs},
    journal::Journal,
    prelude::*,
    site::Site,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .without_time()
        .compact()
        .init();
    info!(version = crate_version!(), "starting…");

    let args = Args::parse();
    let engine = open_engine(&args.site).await?;

    match args.command {
        Command::Plan(plan_args) => {
            let schedule = engine
                .get_optimal_operation(&plan_args.device_id, plan_args.horizon.hours, plan_args.horizon.now())
                .await?;
            info!(
                grid_cost = %schedule.grid_cost(),
                degradation_cost = %schedule.degradation_cost(),
                throughput = %schedule.throughput(),
                "planned",
            );
            print(args.json, &schedule, tables::build_schedule_table)
        }

        Command::Roi(roi_args) => {
            let roi = engine
                .calculate_roi(
                    &roi_args.device_id,
                    roi_args.horizon.hours,
                    roi_args.tariff_id.as_ref(),
                    roi_args.horizon.now(),
                )
                .await?;
            print(args.json, &roi, tables::build_roi_table)
        }

        Command::Tariffs => {
            let tariffs = engine.list_tariffs().await?;
            print(args.json, &tariffs, |tariffs| tables::build_tariffs_table(tariffs))
        }

        Command::Battery(battery_args) => match battery_args.command {
            BatteryCommand::State { device_id } => {
                let state = engine.get_battery_state(&device_id).await?;
                print(args.json, &state, tables::build_state_table)
            }
            BatteryCommand::Health { device_id } => {
                let health = engine.get_battery_health(&device_id).await?;
                print(args.json, &health, tables::build_health_table)
            }
            BatteryCommand::Update(update_args) => {
                let state =
                    engine.update_battery_state(&update_args.device_id, update_args.measurement()).await?;
                print(args.json, &state, tables::build_state_table)
            }
            BatteryCommand::Control(control_args) => {
                let state = engine
                    .apply_control_command(
                        &control_args.device_id,
                        control_args.command(),
                        control_args.at.unwrap_or_else(Utc::now),
                    )
                    .await?;
                print(args.json, &state, tables::build_state_table)
            }
        },
    }
}

async fn open_engine(args: &SiteArgs) -> Result<Engine> {
    let mut site = Site::read(&args.path)?;
    if let Some(interval_minutes) = args.interval_minutes {
        site.engine.interval_minutes = interval_minutes;
    }
    let states: Arc<dyn BatteryStateStore> = match &args.journal {
        Some(path) => Arc::new(Journal::open(path.clone()).await?),
        None => Arc::new(InMemoryBatteryStates::new()),
    };
    site.into_engine(states).await
}

fn print<T: Serialize + ?Sized>(json: bool, value: &T, build_table: impl FnOnce(&T) -> Table) -> Result {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", build_table(value));
    }
    Ok(())
}
