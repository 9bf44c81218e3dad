use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};
use hoard_engine::{
    battery::{BatteryHealth, BatteryState},
    roi::RoiResult,
    schedule::DispatchSchedule,
    tariff::EnergyTariff,
};
use hoard_quantities::{cost::Cost, energy::KilowattHours, power::Kilowatts, rate::KilowattHourRate};
use itertools::Itertools;

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .enforce_styling();
    table
}

fn optional<T: ToString>(value: Option<T>) -> Cell {
    value.map_or_else(|| Cell::new("n/a").add_attribute(Attribute::Dim), |value| Cell::new(value))
}

pub fn build_schedule_table(schedule: &DispatchSchedule) -> Table {
    let mean_rate = if schedule.steps.is_empty() {
        KilowattHourRate::ZERO
    } else {
        schedule.steps.iter().map(|step| step.rate).sum::<KilowattHourRate>()
            / schedule.steps.len() as f64
    };

    let mut table = new_table();
    table.set_header(vec!["Date", "Start", "End", "Rate", "Net load", "Battery", "Grid", "SoC", "Cost"]);
    for step in &schedule.steps {
        table.add_row(vec![
            Cell::new(step.interval.start.format("%b %d")).add_attribute(Attribute::Dim),
            Cell::new(step.interval.start.format("%H:%M")),
            Cell::new(step.interval.end.format("%H:%M")).add_attribute(Attribute::Dim),
            Cell::new(step.rate).fg(if step.rate >= mean_rate { Color::Red } else { Color::Green }),
            Cell::new(step.net_load).set_alignment(CellAlignment::Right).add_attribute(Attribute::Dim),
            Cell::new(step.battery_power).set_alignment(CellAlignment::Right).fg(
                if step.battery_power > Kilowatts::ZERO {
                    Color::DarkYellow
                } else if step.battery_power < Kilowatts::ZERO {
                    Color::Blue
                } else {
                    Color::Reset
                },
            ),
            Cell::new(step.grid).set_alignment(CellAlignment::Right).fg(
                if step.grid > KilowattHours::ZERO { Color::Red } else { Color::Green },
            ),
            Cell::new(step.resulting_soc).set_alignment(CellAlignment::Right),
            Cell::new(step.interval_cost)
                .set_alignment(CellAlignment::Right)
                .fg(if step.interval_cost > Cost::ZERO { Color::Red } else { Color::Green }),
        ]);
    }
    table.add_row(vec![
        Cell::new("Total").add_attribute(Attribute::Bold),
        Cell::new(""),
        Cell::new(""),
        Cell::new(""),
        Cell::new(""),
        Cell::new(schedule.throughput()).set_alignment(CellAlignment::Right).add_attribute(Attribute::Dim),
        Cell::new(""),
        Cell::new(""),
        Cell::new(schedule.grid_cost()).set_alignment(CellAlignment::Right).add_attribute(Attribute::Bold),
    ]);
    table
}

pub fn build_roi_table(roi: &RoiResult) -> Table {
    let mut table = new_table();
    table.set_header(vec!["", "Baseline", "Optimized"]);
    table.add_row(vec![
        Cell::new("Cost"),
        Cell::new(roi.baseline_cost).set_alignment(CellAlignment::Right),
        Cell::new(roi.optimized_cost)
            .set_alignment(CellAlignment::Right)
            .fg(if roi.optimized_cost <= roi.baseline_cost { Color::Green } else { Color::Red }),
    ]);
    table.add_row(vec![
        Cell::new("Peak import"),
        Cell::new(roi.baseline_peak_import).set_alignment(CellAlignment::Right),
        Cell::new(roi.optimized_peak_import).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Demand charge"),
        Cell::new(roi.baseline_demand_charge).set_alignment(CellAlignment::Right),
        Cell::new(roi.optimized_demand_charge).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Degradation").add_attribute(Attribute::Dim),
        Cell::new(""),
        Cell::new(roi.degradation_cost).set_alignment(CellAlignment::Right).add_attribute(Attribute::Dim),
    ]);
    table.add_row(vec![
        Cell::new("Savings").add_attribute(Attribute::Bold),
        Cell::new(format!("{:.0} h", roi.horizon_hours)).add_attribute(Attribute::Dim),
        Cell::new(roi.savings)
            .set_alignment(CellAlignment::Right)
            .fg(if roi.savings > Cost::ZERO { Color::Green } else { Color::Red }),
    ]);
    table.add_row(vec![
        Cell::new("Annual savings"),
        Cell::new(""),
        Cell::new(roi.annual_savings).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Capital cost"),
        Cell::new(""),
        Cell::new(roi.capital_cost).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Payback"),
        Cell::new(""),
        optional(roi.payback_period_years.map(|years| format!("{years:.1} years")))
            .set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("ROI"),
        Cell::new(""),
        optional(roi.roi_percent).set_alignment(CellAlignment::Right),
    ]);
    table
}

pub fn build_state_table(state: &BatteryState) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Version", "Timestamp", "SoC", "SoH", "Temperature", "Power", "Cycles", "Throughput"]);
    table.add_row(vec![
        Cell::new(state.version).add_attribute(Attribute::Dim),
        Cell::new(state.timestamp.format("%b %d %H:%M")),
        Cell::new(state.state_of_charge).set_alignment(CellAlignment::Right),
        optional(state.state_of_health).set_alignment(CellAlignment::Right),
        optional(state.temperature_celsius.map(|celsius| format!("{celsius:.1} °C")))
            .set_alignment(CellAlignment::Right),
        optional(state.power).set_alignment(CellAlignment::Right),
        Cell::new(state.cycle_count).set_alignment(CellAlignment::Right),
        Cell::new(state.throughput).set_alignment(CellAlignment::Right).add_attribute(Attribute::Dim),
    ]);
    table
}

pub fn build_health_table(health: &BatteryHealth) -> Table {
    let mut table = new_table();
    table.set_header(vec!["SoH", "Loss per 1000 cycles", "Temperature", "Cycles", "Cycles per day", "Snapshots"]);
    table.add_row(vec![
        optional(health.state_of_health).set_alignment(CellAlignment::Right),
        optional(health.degradation_per_kilocycle).set_alignment(CellAlignment::Right),
        optional(health.temperature.map(|summary| {
            format!("{:.1}…{:.1} °C (mean {:.1})", summary.min, summary.max, summary.mean)
        })),
        Cell::new(health.cycle_count).set_alignment(CellAlignment::Right),
        optional(health.cycles_per_day.map(|cycles| format!("{cycles:.2}")))
            .set_alignment(CellAlignment::Right),
        Cell::new(health.n_snapshots).set_alignment(CellAlignment::Right).add_attribute(Attribute::Dim),
    ]);
    table
}

pub fn build_tariffs_table(tariffs: &[EnergyTariff]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["ID", "Name", "Provider", "Device", "Base", "Rates", "From", "To"]);
    for tariff in tariffs {
        table.add_row(vec![
            Cell::new(&tariff.id).add_attribute(Attribute::Bold),
            Cell::new(&tariff.name),
            Cell::new(&tariff.provider).add_attribute(Attribute::Dim),
            optional(tariff.device_id.as_ref()),
            Cell::new(format!("{} {}", tariff.base_rate, tariff.currency)),
            Cell::new(tariff.rate.rates().iter().join(", ")),
            Cell::new(tariff.effective_from.format("%Y-%m-%d %H:%M")),
            optional(tariff.effective_to.map(|to| to.format("%Y-%m-%d %H:%M"))),
        ]);
    }
    table
}
