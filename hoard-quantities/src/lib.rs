//! Dimensioned quantities used throughout the dispatch engine.
//!
//! The const parameters are the exponents of power, time and cost. They only serve to keep
//! dimensions apart at compile time: cross-dimension arithmetic is implemented explicitly
//! per unit pair.

pub mod cost;
pub mod energy;
pub mod percent;
pub mod power;
pub mod rate;

use std::ops::{Div, Mul};

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

#[derive(
    Clone,
    Copy,
    Deserialize,
    Eq,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    derive_more::Add,
    derive_more::AddAssign,
    derive_more::From,
    derive_more::FromStr,
    derive_more::Neg,
    derive_more::Sub,
    derive_more::SubAssign,
    derive_more::Sum,
)]
#[from(f64, OrderedFloat<f64>)]
#[must_use]
pub struct Quantity<const POWER: isize, const TIME: isize, const COST: isize>(
    pub OrderedFloat<f64>,
);

impl<const POWER: isize, const TIME: isize, const COST: isize> Quantity<POWER, TIME, COST> {
    pub const ZERO: Self = Self(OrderedFloat(0.0));

    /// Zero, usable as a `serde` default.
    pub const fn zero() -> Self {
        Self::ZERO
    }

    pub const fn new(value: f64) -> Self {
        Self(OrderedFloat(value))
    }

    #[must_use]
    pub const fn get(self) -> f64 {
        self.0.0
    }

    pub const fn abs(mut self) -> Self {
        self.0 = OrderedFloat(self.0.0.abs());
        self
    }

    #[must_use]
    pub const fn is_finite(self) -> bool {
        self.0.0.is_finite()
    }

    /// Positive part, `max(self, 0)`.
    pub fn positive(self) -> Self {
        self.max(Self::ZERO)
    }

    /// Negative part as a non-negative value, `max(-self, 0)`.
    pub fn negative(self) -> Self {
        (-self).max(Self::ZERO)
    }
}

impl<const POWER: isize, const TIME: isize, const COST: isize> Mul<f64>
    for Quantity<POWER, TIME, COST>
{
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl<const POWER: isize, const TIME: isize, const COST: isize> Div<f64>
    for Quantity<POWER, TIME, COST>
{
    type Output = Self;

    fn div(self, rhs: f64) -> Self::Output {
        Self(self.0 / rhs)
    }
}

impl<const POWER: isize, const TIME: isize, const COST: isize> Div<Self>
    for Quantity<POWER, TIME, COST>
{
    type Output = f64;

    fn div(self, rhs: Self) -> Self::Output {
        self.0.0 / rhs.0.0
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::{Debug, Formatter};

    use super::*;

    pub type Bare = Quantity<0, 1, 0>;

    impl Debug for Bare {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self.0)
        }
    }

    #[test]
    fn test_min() {
        assert_eq!(Bare::from(1.0).min(Bare::from(2.0)), Bare::from(1.0));
        assert_eq!(Bare::from(2.0).min(Bare::from(1.0)), Bare::from(1.0));
    }

    #[test]
    fn test_max() {
        assert_eq!(Bare::from(1.0).max(Bare::from(2.0)), Bare::from(2.0));
        assert_eq!(Bare::from(2.0).max(Bare::from(1.0)), Bare::from(2.0));
    }

    #[test]
    fn test_clamp() {
        assert_eq!(Bare::from(1.0).clamp(Bare::from(2.0), Bare::from(3.0)), Bare::from(2.0));
        assert_eq!(Bare::from(4.0).clamp(Bare::from(2.0), Bare::from(3.0)), Bare::from(3.0));
        assert_eq!(Bare::from(2.0).clamp(Bare::from(1.0), Bare::from(3.0)), Bare::from(2.0));
    }

    #[test]
    fn test_positive_negative_parts() {
        assert_eq!(Bare::from(-2.5).positive(), Bare::ZERO);
        assert_eq!(Bare::from(-2.5).negative(), Bare::from(2.5));
        assert_eq!(Bare::from(1.5).positive(), Bare::from(1.5));
        assert_eq!(Bare::from(1.5).negative(), Bare::ZERO);
    }

    #[test]
    fn test_sum() {
        let total: Bare = [1.0, 2.0, 3.5].into_iter().map(Bare::from).sum();
        assert_eq!(total, Bare::from(6.5));
    }
}
