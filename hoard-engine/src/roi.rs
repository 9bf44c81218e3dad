use hoard_quantities::{cost::Cost, percent::Percent, power::Kilowatts};
use serde::Serialize;

use crate::{
    forecast::NetLoad,
    prelude::*,
    schedule::DispatchSchedule,
    tariff::RateQuote,
};

const HOURS_PER_YEAR: f64 = 365.0 * 24.0;

/// Return on the battery investment, extrapolated from a single horizon.
#[must_use]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RoiResult {
    pub capital_cost: Cost,
    pub horizon_hours: f64,

    /// Cost without the battery, including the demand charge on its own peak.
    pub baseline_cost: Cost,

    /// Grid cost of the schedule, including the demand charge on its own peak.
    pub optimized_cost: Cost,

    pub savings: Cost,
    pub annual_savings: Cost,

    /// Unavailable when there are no savings.
    pub payback_period_years: Option<f64>,

    /// Annual savings relative to the capital cost, unavailable without a capital cost.
    pub roi_percent: Option<Percent>,

    #[serde(rename = "baseline_peak_import_kw")]
    pub baseline_peak_import: Kilowatts,

    #[serde(rename = "optimized_peak_import_kw")]
    pub optimized_peak_import: Kilowatts,

    pub baseline_demand_charge: Cost,
    pub optimized_demand_charge: Cost,

    /// Degradation penalty of the schedule, which is not a cash flow and excluded from the savings.
    pub degradation_cost: Cost,
}

/// Compare the schedule against serving the same net load without a battery.
///
/// The schedule must have been optimized on the same rates.
#[instrument(skip_all, fields(device_id = %schedule.device_id, capital_cost = ?capital_cost))]
pub fn evaluate(
    schedule: &DispatchSchedule,
    capital_cost: Cost,
    baseline_net_load: &[NetLoad],
    rates: &[RateQuote],
) -> Result<RoiResult> {
    if !capital_cost.is_finite() || capital_cost < Cost::ZERO {
        return Err(Error::Validation(format!("invalid capital cost: {capital_cost}")));
    }
    if schedule.steps.is_empty() {
        return Err(Error::Validation("the schedule is empty".to_owned()));
    }
    if schedule.steps.len() != baseline_net_load.len() || schedule.steps.len() != rates.len() {
        return Err(Error::Validation(format!(
            "got {} schedule steps, {} baseline intervals, and {} rates",
            schedule.steps.len(),
            baseline_net_load.len(),
            rates.len(),
        )));
    }
    if let Some((step, net_load)) = schedule
        .steps
        .iter()
        .zip(baseline_net_load)
        .find(|(step, net_load)| step.interval != net_load.interval)
    {
        return Err(Error::Validation(format!(
            "schedule interval {:?} does not match baseline interval {:?}",
            step.interval, net_load.interval,
        )));
    }

    let (baseline_peak_import, baseline_demand_charge) = demand_charge(
        baseline_net_load
            .iter()
            .map(|net_load| net_load.energy().positive() / net_load.interval.len())
            .zip(rates),
    );
    let baseline_cost = baseline_net_load
        .iter()
        .zip(rates)
        .map(|(net_load, quote)| quote.grid_cost(net_load.energy()))
        .sum::<Cost>()
        + baseline_demand_charge;

    let (optimized_peak_import, optimized_demand_charge) =
        demand_charge(schedule.steps.iter().map(|step| step.import_power()).zip(rates));
    let optimized_cost = schedule.grid_cost() + optimized_demand_charge;

    let horizon_hours: f64 = schedule
        .steps
        .iter()
        .map(|step| step.interval.len().as_seconds_f64() / 3600.0)
        .sum();
    let savings = baseline_cost - optimized_cost;
    let annual_savings = savings * (HOURS_PER_YEAR / horizon_hours);
    let payback_period_years =
        (savings > Cost::ZERO).then(|| capital_cost / annual_savings);
    let roi_percent = (capital_cost > Cost::ZERO)
        .then(|| Percent::from_proportion(annual_savings / capital_cost));

    info!(?baseline_cost, ?optimized_cost, ?savings, ?payback_period_years, "evaluated");
    Ok(RoiResult {
        capital_cost,
        horizon_hours,
        baseline_cost,
        optimized_cost,
        savings,
        annual_savings,
        payback_period_years,
        roi_percent,
        baseline_peak_import,
        optimized_peak_import,
        baseline_demand_charge,
        optimized_demand_charge,
        degradation_cost: schedule.degradation_cost(),
    })
}

/// Peak import power and the demand charge on it.
///
/// The charge applies once per horizon, at the most expensive interval when the demand rate
/// varies.
fn demand_charge<'a>(
    imports: impl Iterator<Item = (Kilowatts, &'a RateQuote)>,
) -> (Kilowatts, Cost) {
    imports.fold((Kilowatts::ZERO, Cost::ZERO), |(peak, charge), (power, quote)| {
        (peak.max(power), charge.max(power * quote.demand_charge))
    })
}
