use std::fmt::{Debug, Display, Formatter};

use crate::Quantity;

pub type Percent = Quantity<0, 0, 0>;

impl Percent {
    pub const HUNDRED: Self = Self::new(100.0);

    /// Convert the percentage into `0.0..=1.0`.
    #[must_use]
    pub const fn to_proportion(self) -> f64 {
        0.01 * self.0.0
    }

    pub const fn from_proportion(proportion: f64) -> Self {
        Self::new(proportion * 100.0)
    }
}

impl Display for Percent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}%", self.0)
    }
}

impl Debug for Percent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}%", self.0)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_proportion() {
        assert_abs_diff_eq!(Percent::from(45.0).to_proportion(), 0.45);
        assert_eq!(Percent::from_proportion(0.5), Percent::from(50.0));
    }
}
