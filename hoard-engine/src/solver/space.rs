use chrono::TimeDelta;
use hoard_quantities::energy::KilowattHours;

use crate::{
    ops::RangeInclusive,
    solver::{Constraints, constraints::ENERGY_TOLERANCE, lattice::Lattice},
};

/// Stored energies from which the terminal constraint remains reachable.
///
/// Computed backwards from the terminal band: the battery may start an interval anywhere it
/// can still get into the next reachable range within the power limits.
pub struct SolutionSpace {
    /// One range per interval boundary, the last one being the terminal band.
    reachable: Vec<RangeInclusive<KilowattHours>>,

    /// One lattice per interval, spanning the energies reachable at its start.
    lattices: Vec<Lattice>,
}

impl SolutionSpace {
    pub fn new(
        constraints: &Constraints,
        durations: &[TimeDelta],
        terminal: RangeInclusive<KilowattHours>,
        n_levels: usize,
    ) -> Self {
        let mut reachable = vec![terminal; durations.len() + 1];
        for (index, duration) in durations.iter().enumerate().rev() {
            let next = reachable[index + 1];
            let min = (next.min - constraints.max_gain(*duration)).max(constraints.min_energy());
            let max = (next.max + constraints.max_drop(*duration)).min(constraints.max_energy());
            reachable[index] = RangeInclusive { min, max: max.max(min) };
        }
        let lattices = reachable[..durations.len()]
            .iter()
            .map(|range| Lattice::new(range.min, range.max, n_levels))
            .collect();
        Self { reachable, lattices }
    }

    /// Lattice of the interval, [`None`] past the horizon end.
    pub fn lattice(&self, interval_index: usize) -> Option<&Lattice> {
        self.lattices.get(interval_index)
    }

    /// Reachable energies at the start of the interval, or at the horizon end past the last one.
    pub fn reachable(&self, boundary_index: usize) -> RangeInclusive<KilowattHours> {
        self.reachable[boundary_index]
    }

    #[must_use]
    pub fn is_reachable(&self, boundary_index: usize, energy: KilowattHours) -> bool {
        let range = self.reachable(boundary_index);
        range.min - ENERGY_TOLERANCE <= energy && energy <= range.max + ENERGY_TOLERANCE
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use hoard_quantities::{percent::Percent, power::Kilowatts};

    use super::*;
    use crate::battery::Efficiency;

    #[test]
    fn test_reachable_widens_backwards() {
        let constraints = Constraints::builder()
            .capacity(KilowattHours::from(10.0))
            .soc_window(RangeInclusive::from(Percent::from(10.0)..=Percent::from(90.0)))
            .max_charge_power(Kilowatts::from(3.97))
            .max_discharge_power(Kilowatts::from(5.0))
            .efficiency(Efficiency::IDEAL)
            .build();
        let terminal = RangeInclusive { min: KilowattHours::from(9.0), max: KilowattHours::from(9.0) };
        let space = SolutionSpace::new(&constraints, &[TimeDelta::hours(1); 2], terminal, 101);

        assert_abs_diff_eq!(space.reachable(2).min.get(), 9.0);
        assert_abs_diff_eq!(space.reachable(1).min.get(), 5.03, epsilon = 1e-9);
        assert_abs_diff_eq!(space.reachable(0).min.get(), 1.06, epsilon = 1e-9);
        assert_abs_diff_eq!(space.reachable(0).max.get(), 9.0, epsilon = 1e-9);
        assert!(space.is_reachable(0, KilowattHours::from(1.08)));
        assert!(!space.is_reachable(0, KilowattHours::from(1.05)));
        assert_eq!(space.lattice(1).map(Lattice::n_levels), Some(101));
        assert!(space.lattice(2).is_none());
    }
}
