mod constraints;
mod lattice;
mod space;
mod table;

use std::time::Instant;

use bon::Builder;
use chrono::TimeDelta;
use hoard_quantities::{cost::Cost, energy::KilowattHours, percent::Percent, power::Kilowatts};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

pub use self::constraints::{Constraints, TerminalConstraint};
use self::{
    lattice::Location,
    space::SolutionSpace,
    table::{Action, Decision, ValueTable},
};
use crate::{forecast::NetLoad, prelude::*, schedule::ScheduleStep, tariff::RateQuote};

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Size of the state-of-charge lattice, including both window bounds.
    pub n_energy_levels: usize,

    /// Number of evenly spaced power steps per direction, besides the lattice-landing ones.
    pub n_power_steps: usize,

    /// Costs closer than this are considered equal, and the lower power wins.
    pub tie_tolerance: Cost,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self { n_energy_levels: 101, n_power_steps: 10, tie_tolerance: Cost::new(1e-9) }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> Result {
        if self.n_energy_levels < 2 {
            return Err(Error::Validation(format!(
                "at least 2 energy levels are required, got {}",
                self.n_energy_levels,
            )));
        }
        if self.n_power_steps == 0 {
            return Err(Error::Validation("at least 1 power step is required".to_owned()));
        }
        if !(self.tie_tolerance.is_finite() && self.tie_tolerance >= Cost::ZERO) {
            return Err(Error::Validation(format!("invalid tie tolerance: {}", self.tie_tolerance)));
        }
        Ok(())
    }
}

#[derive(Builder)]
pub struct Solver<'a> {
    /// Forecast net load per interval, defining the grid.
    net_loads: &'a [NetLoad],

    /// Price of each interval.
    rates: &'a [RateQuote],

    constraints: &'a Constraints,

    #[builder(default)]
    settings: SolverSettings,
}

impl Solver<'_> {
    /// Find the cost-minimizing battery schedule.
    ///
    /// Works backwards from the horizon end to the present, computing the minimum cost-to-go
    /// at each `(interval, energy level)` state, and then follows the best actions forward
    /// from the initial state of charge. Cost is money spent on grid import, minus the export
    /// credit, plus the degradation penalty.
    ///
    /// The [DP][1] state space:
    ///
    /// - Time dimension: each interval of the grid
    /// - Energy dimension: stored energy quantized to a uniform lattice over the energies
    ///   the terminal constraint is still reachable from, separately for each interval
    ///
    /// Transitions landing between two levels take the interpolated value of the neighbours.
    ///
    /// [1]: https://en.wikipedia.org/wiki/Dynamic_programming
    #[instrument(skip_all, fields(n_intervals = self.net_loads.len()))]
    pub fn solve(self, initial_soc: Percent) -> Result<Vec<ScheduleStep>> {
        let start_instant = Instant::now();
        self.validate()?;

        if !initial_soc.is_finite() {
            return Err(Error::Validation(format!("invalid initial state of charge: {initial_soc}")));
        }
        let clamped_soc = initial_soc.clamp(self.constraints.soc_window.min, self.constraints.soc_window.max);
        if clamped_soc != initial_soc {
            warn!(?initial_soc, ?clamped_soc, "initial state of charge is outside the window, clamped");
        }
        let Some(terminal_energies) = self.constraints.terminal_energies() else {
            return Err(Error::InfeasibleSchedule(format!(
                "terminal state of charge {:?} lies outside the window {:?}",
                self.constraints.terminal().band(),
                self.constraints.soc_window,
            )));
        };

        let durations: Vec<TimeDelta> =
            self.net_loads.iter().map(|net_load| net_load.interval.len()).collect();
        let space = SolutionSpace::new(
            self.constraints,
            &durations,
            terminal_energies,
            self.settings.n_energy_levels,
        );
        let initial_energy = self.constraints.energy_of(clamped_soc);
        if !space.is_reachable(0, initial_energy) {
            let reachable = space.reachable(0);
            return Err(Error::InfeasibleSchedule(format!(
                "the terminal state of charge {:?} is unreachable from {clamped_soc}, the horizon must start within {}..={}",
                self.constraints.terminal().band(),
                self.constraints.soc_of(reachable.min),
                self.constraints.soc_of(reachable.max),
            )));
        }
        info!(reachable = ?space.reachable(0), ?terminal_energies, "optimizing…");

        let mut table = ValueTable::new(self.net_loads.len(), self.settings.n_energy_levels);

        // Going backwards:
        for interval_index in (0..self.net_loads.len()).rev() {
            let Some(lattice) = space.lattice(interval_index) else {
                continue;
            };
            for level in 0..lattice.n_levels() {
                *table.get_mut(interval_index, level) =
                    self.decide(&table, &space, interval_index, lattice.level(level))?;
            }
        }

        let steps = self.backtrack(&table, &space, initial_energy)?;
        info!(elapsed = ?start_instant.elapsed(), "optimized");
        Ok(steps)
    }

    /// Total cost of serving the net load without the battery.
    pub fn base_cost(&self) -> Cost {
        self.net_loads
            .iter()
            .zip(self.rates)
            .map(|(net_load, quote)| quote.grid_cost(net_load.energy()))
            .sum()
    }

    fn validate(&self) -> Result {
        if self.net_loads.is_empty() {
            return Err(Error::Validation("nothing to optimize: the horizon is empty".to_owned()));
        }
        if self.net_loads.len() != self.rates.len() {
            return Err(Error::Validation(format!(
                "got {} net load intervals but {} rates",
                self.net_loads.len(),
                self.rates.len(),
            )));
        }
        if let Some(net_load) = self.net_loads.iter().find(|net_load| !net_load.energy().is_finite()) {
            return Err(Error::Validation(format!("non-finite net load at {:?}", net_load.interval)));
        }
        self.settings.validate()?;
        self.constraints.validate()
    }

    /// Follow the best actions from the initial energy.
    fn backtrack(
        &self,
        table: &ValueTable,
        space: &SolutionSpace,
        initial_energy: KilowattHours,
    ) -> Result<Vec<ScheduleStep>> {
        let mut energy = initial_energy;
        let mut steps = Vec::with_capacity(self.net_loads.len());
        for interval_index in 0..self.net_loads.len() {
            let location = space.lattice(interval_index).and_then(|lattice| lattice.locate(energy));
            let decision = match location {
                Some(Location::At(level)) => table.get(interval_index, level).copied(),
                _ => self.decide(table, space, interval_index, energy)?,
            };
            let Some(decision) = decision else {
                return Err(Error::Internal(format!(
                    "no action keeps the terminal state of charge reachable from {:?} at {:?}",
                    self.constraints.soc_of(energy),
                    self.net_loads[interval_index].interval.start,
                )));
            };
            let step = self.step(interval_index, decision.action);
            debug!(
                interval = ?step.interval,
                battery_power = ?step.battery_power,
                resulting_soc = ?step.resulting_soc,
                cost = ?step.interval_cost,
                "planned",
            );
            steps.push(step);
            energy = decision.action.energy_after;
        }
        Ok(steps)
    }

    /// Pick the cheapest action from the state.
    ///
    /// # Returns
    ///
    /// - [`Some`] [`Decision`], if the terminal constraint is reachable from the state.
    /// - [`None`], if it is not.
    fn decide(
        &self,
        table: &ValueTable,
        space: &SolutionSpace,
        interval_index: usize,
        energy: KilowattHours,
    ) -> Result<Option<Decision>> {
        let net_load = &self.net_loads[interval_index];
        let duration = net_load.interval.len();
        let mut best: Option<Decision> = None;

        // Actions are ordered by absolute power, so that the lower power wins a tie:
        for action in self.actions(space, interval_index, energy, duration) {
            let Some(future) = Self::future_value(table, space, interval_index + 1, action.energy_after)
            else {
                continue;
            };
            let value = self.immediate_cost(interval_index, action.battery_power, duration) + future;
            if !value.is_finite() {
                return Err(Error::Internal(format!(
                    "non-finite cost at {:?} for {:?}",
                    net_load.interval, action,
                )));
            }
            if best.is_none_or(|best| value < best.value - self.settings.tie_tolerance) {
                best = Some(Decision { value, action });
            }
        }
        Ok(best)
    }

    /// Cost-to-go after the interval, exact at the horizon end.
    fn future_value(
        table: &ValueTable,
        space: &SolutionSpace,
        next_interval_index: usize,
        energy: KilowattHours,
    ) -> Option<Cost> {
        match space.lattice(next_interval_index) {
            Some(lattice) => table.value_at(lattice, next_interval_index, energy),
            None => space.is_reachable(next_interval_index, energy).then_some(Cost::ZERO),
        }
    }

    /// Feasible actions from the energy, ordered by absolute power.
    ///
    /// Candidates are idling, moving to the nearest energy the terminal constraint is still
    /// reachable from, landing exactly on each reachable level of the next lattice, and evenly
    /// spaced fractions of the maximum charge and discharge.
    fn actions(
        &self,
        space: &SolutionSpace,
        interval_index: usize,
        energy: KilowattHours,
        duration: TimeDelta,
    ) -> Vec<Action> {
        let constraints = self.constraints;
        let min_energy = constraints.min_energy();
        let max_energy = constraints.max_energy();
        let max_gain = constraints.max_gain(duration).min(max_energy - energy).positive();
        let max_drop = constraints.max_drop(duration).min(energy - min_energy).positive();

        let next = space.reachable(interval_index + 1);
        let nearest = energy.clamp(next.min, next.max) - energy;

        let n_power_steps = self.settings.n_power_steps;
        #[expect(clippy::cast_precision_loss)]
        let fractions = (1..=n_power_steps).map(|step| step as f64 / n_power_steps as f64);
        let landings = space.lattice(interval_index + 1).into_iter().flat_map(|lattice| {
            lattice
                .levels_within(energy - max_drop, energy + max_gain)
                .map(move |level| lattice.level(level) - energy)
        });
        let deltas = [KilowattHours::ZERO, nearest]
            .into_iter()
            .chain(fractions.flat_map(|fraction| [max_gain * fraction, -(max_drop * fraction)]))
            .chain(landings);

        deltas
            .map(|delta| {
                let delta = delta.clamp(-max_drop, max_gain);
                let energy_after = (energy + delta).clamp(min_energy, max_energy);
                let battery_power = constraints
                    .efficiency
                    .battery_power(energy_after - energy, duration)
                    .clamp(-constraints.max_charge_power, constraints.max_discharge_power);
                Action { battery_power, energy_after }
            })
            .sorted_by_key(|action| (action.battery_power.abs(), action.battery_power))
            .dedup_by(|lhs, rhs| lhs.battery_power == rhs.battery_power)
            .collect()
    }

    /// Grid cost of the interval plus the degradation penalty.
    fn immediate_cost(&self, interval_index: usize, battery_power: Kilowatts, duration: TimeDelta) -> Cost {
        let grid = self.net_loads[interval_index].energy() - battery_power * duration;
        self.rates[interval_index].grid_cost(grid)
            + (battery_power * duration).abs() * self.constraints.degradation_rate
    }

    fn step(&self, interval_index: usize, action: Action) -> ScheduleStep {
        let net_load = &self.net_loads[interval_index];
        let quote = &self.rates[interval_index];
        let duration = net_load.interval.len();
        let grid = net_load.energy() - action.battery_power * duration;
        ScheduleStep {
            interval: net_load.interval,
            net_load: net_load.energy(),
            battery_power: action.battery_power,
            grid,
            rate: quote.energy.unit_rate(),
            resulting_soc: self.constraints.soc_of(action.energy_after),
            energy_after: action.energy_after,
            interval_cost: quote.grid_cost(grid),
            degradation_cost: (action.battery_power * duration).abs() * self.constraints.degradation_rate,
        }
    }
}
