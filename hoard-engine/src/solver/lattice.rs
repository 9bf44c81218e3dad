use hoard_quantities::energy::KilowattHours;

use crate::solver::constraints::ENERGY_TOLERANCE;

/// Positions closer than this to a level snap onto it.
const SNAP: f64 = 1e-9;

/// Uniform grid of stored energies between the bounds, inclusive.
///
/// Bounds that coincide make a single-level lattice.
#[must_use]
#[derive(Copy, Clone, Debug)]
pub struct Lattice {
    min: KilowattHours,
    max: KilowattHours,
    step: KilowattHours,
    n_levels: usize,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Location {
    At(usize),

    /// Strictly between the level and the next one, `weight` being the share of the next one.
    Between { lower: usize, weight: f64 },
}

impl Lattice {
    /// The number of levels must be at least 2.
    #[expect(clippy::cast_precision_loss)]
    pub fn new(min: KilowattHours, max: KilowattHours, n_levels: usize) -> Self {
        debug_assert!(n_levels >= 2);
        debug_assert!(min <= max);
        if max - min <= ENERGY_TOLERANCE {
            return Self { min, max: min, step: KilowattHours::ZERO, n_levels: 1 };
        }
        Self { min, max, step: (max - min) / (n_levels - 1) as f64, n_levels }
    }

    #[must_use]
    pub const fn n_levels(&self) -> usize {
        self.n_levels
    }

    #[expect(clippy::cast_precision_loss)]
    pub fn level(&self, index: usize) -> KilowattHours {
        self.min + self.step * index as f64
    }

    fn position(&self, energy: KilowattHours) -> f64 {
        (energy - self.min) / self.step
    }

    fn covers(&self, energy: KilowattHours) -> bool {
        self.min - ENERGY_TOLERANCE <= energy && energy <= self.max + ENERGY_TOLERANCE
    }

    /// Locate the energy on the lattice, or [`None`] if it lies outside.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn locate(&self, energy: KilowattHours) -> Option<Location> {
        if !self.covers(energy) {
            return None;
        }
        if self.n_levels == 1 {
            return Some(Location::At(0));
        }
        let position = self.position(energy).clamp(0.0, (self.n_levels - 1) as f64);
        let lower = position.floor();
        let weight = position - lower;
        let lower = lower as usize;
        if weight < SNAP {
            Some(Location::At(lower))
        } else if weight > 1.0 - SNAP {
            Some(Location::At(lower + 1))
        } else {
            Some(Location::Between { lower, weight })
        }
    }

    /// Indices of the levels within the energy range, inclusive.
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn levels_within(&self, from: KilowattHours, to: KilowattHours) -> std::ops::RangeInclusive<usize> {
        if self.n_levels == 1 {
            return if from - ENERGY_TOLERANCE <= self.min && self.min <= to + ENERGY_TOLERANCE {
                0..=0
            } else {
                1..=0
            };
        }
        let last = (self.n_levels - 1) as f64;
        let first = (self.position(from) - SNAP).ceil();
        let end = (self.position(to) + SNAP).floor();
        if end < 0.0 || first > last {
            return 1..=0;
        }
        (first.max(0.0) as usize)..=(end.min(last) as usize)
    }
}
