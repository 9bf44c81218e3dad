use hoard_quantities::{cost::Cost, energy::KilowattHours, power::Kilowatts};

use crate::solver::lattice::{Lattice, Location};

/// Battery action within a single interval.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Action {
    pub battery_power: Kilowatts,
    pub energy_after: KilowattHours,
}

/// Best action from a state, along with the resulting cost-to-go.
#[must_use]
#[derive(Copy, Clone, Debug)]
pub struct Decision {
    /// Cost from this state till the end of the horizon.
    pub value: Cost,

    pub action: Action,
}

/// Cost-to-go table over `(interval, energy level)` states.
pub struct ValueTable {
    n_intervals: usize,
    n_levels: usize,

    /// Flattened 2D array, [`None`] meaning that the terminal constraint is unreachable from
    /// the state.
    flat_matrix: Vec<Option<Decision>>,
}

impl ValueTable {
    pub fn new(n_intervals: usize, n_levels: usize) -> Self {
        Self { n_intervals, n_levels, flat_matrix: vec![None; n_intervals * n_levels] }
    }

    pub fn get(&self, interval_index: usize, level: usize) -> Option<&Decision> {
        self.flat_matrix[self.flat_index(interval_index, level)].as_ref()
    }

    pub fn get_mut(&mut self, interval_index: usize, level: usize) -> &mut Option<Decision> {
        let flat_index = self.flat_index(interval_index, level);
        &mut self.flat_matrix[flat_index]
    }

    /// Cost-to-go at an arbitrary energy, interpolated between the neighbouring levels.
    ///
    /// An energy next to an unreachable level is unreachable itself.
    pub fn value_at(&self, lattice: &Lattice, interval_index: usize, energy: KilowattHours) -> Option<Cost> {
        match lattice.locate(energy)? {
            Location::At(level) => Some(self.get(interval_index, level)?.value),
            Location::Between { lower, weight } => {
                let lower_value = self.get(interval_index, lower)?.value;
                let upper_value = self.get(interval_index, lower + 1)?.value;
                Some(lower_value + (upper_value - lower_value) * weight)
            }
        }
    }

    #[must_use]
    fn flat_index(&self, interval_index: usize, level: usize) -> usize {
        debug_assert!(interval_index < self.n_intervals, "interval index is out of bounds");
        debug_assert!(level < self.n_levels, "energy level is out of bounds");
        interval_index * self.n_levels + level
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn decision(value: f64) -> Option<Decision> {
        Some(Decision {
            value: Cost::from(value),
            action: Action { battery_power: Kilowatts::ZERO, energy_after: KilowattHours::ZERO },
        })
    }

    #[test]
    fn test_interpolation() {
        let lattice = Lattice::new(KilowattHours::from(0.0), KilowattHours::from(2.0), 3);
        let mut table = ValueTable::new(1, 3);
        *table.get_mut(0, 0) = decision(1.0);
        *table.get_mut(0, 1) = decision(3.0);

        let value = table.value_at(&lattice, 0, KilowattHours::from(0.25)).unwrap();
        assert_abs_diff_eq!(value.get(), 1.5);
        assert_eq!(table.value_at(&lattice, 0, KilowattHours::from(1.0)), Some(Cost::from(3.0)));

        // The upper neighbour is unreachable:
        assert_eq!(table.value_at(&lattice, 0, KilowattHours::from(1.5)), None);
    }
}
