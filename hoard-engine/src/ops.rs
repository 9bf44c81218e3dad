use std::{
    fmt::{Debug, Formatter},
    ops::Sub,
};

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

pub type Interval<Tz = Utc> = RangeExclusive<DateTime<Tz>>;

#[must_use]
#[derive(Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeExclusive<T: Copy> {
    pub start: T,
    pub end: T,
}

impl<T: Copy + Debug> Debug for RangeExclusive<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}..{:?}", self.start, self.end)
    }
}

impl<T: Copy> RangeExclusive<T> {
    pub const fn new(start: T, end: T) -> Self {
        Self { start, end }
    }

    pub const fn with_start(mut self, start: T) -> Self {
        self.start = start;
        self
    }

    pub const fn with_end(mut self, end: T) -> Self {
        self.end = end;
        self
    }
}

impl<T: Copy + Sub> RangeExclusive<T> {
    #[must_use]
    pub fn len(self) -> <T as Sub>::Output {
        self.end - self.start
    }
}

impl<T: Copy + PartialOrd> RangeExclusive<T> {
    #[must_use]
    pub fn contains(self, other: T) -> bool {
        (self.start <= other) && (other < self.end)
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.start >= self.end
    }

    /// Overlapping part of the two ranges, if any.
    #[must_use]
    pub fn intersection(self, other: Self) -> Option<Self> {
        let start = if self.start >= other.start { self.start } else { other.start };
        let end = if self.end <= other.end { self.end } else { other.end };
        (start < end).then_some(Self { start, end })
    }
}

impl Interval {
    /// Split the interval into consecutive steps, truncating the last one at the interval end.
    ///
    /// An interval shorter than the step yields exactly one (truncated) step.
    pub fn split(self, step: TimeDelta) -> impl Iterator<Item = Self> {
        debug_assert!(step > TimeDelta::zero());
        let mut start = self.start;
        std::iter::from_fn(move || {
            (start < self.end).then(|| {
                let end = (start + step).min(self.end);
                let interval = Self::new(start, end);
                start = end;
                interval
            })
        })
    }

    /// Split the interval at the multiples of the step since the epoch.
    ///
    /// The first step starts at the interval start, so it is shorter unless the start is aligned.
    pub fn split_aligned(self, step: TimeDelta) -> impl Iterator<Item = Self> {
        let aligned = self.start.duration_trunc(step).unwrap_or(self.start);
        self.with_start(aligned)
            .split(step)
            .map(move |interval| interval.with_start(interval.start.max(self.start)))
    }

    /// Further split the interval at the instants falling strictly inside it.
    ///
    /// The instants must be sorted.
    pub fn cut(self, instants: &[DateTime<Utc>]) -> impl Iterator<Item = Self> {
        let inner = instants.iter().copied().filter(move |instant| self.start < *instant && *instant < self.end);
        std::iter::once(self.start)
            .chain(inner)
            .chain(std::iter::once(self.end))
            .tuple_windows()
            .map(|(start, end)| Self::new(start, end))
    }
}

#[must_use]
#[derive(Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeInclusive<T: Copy> {
    pub min: T,
    pub max: T,
}

impl<T: Copy + Debug> Debug for RangeInclusive<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}..={:?}", self.min, self.max)
    }
}

impl<T: Copy> From<std::ops::RangeInclusive<T>> for RangeInclusive<T> {
    fn from(range: std::ops::RangeInclusive<T>) -> Self {
        Self::from_std(range)
    }
}

impl<T: Copy> RangeInclusive<T> {
    pub const fn from_std(range: std::ops::RangeInclusive<T>) -> Self {
        Self { min: *range.start(), max: *range.end() }
    }
}

impl<T: Copy + PartialOrd> RangeInclusive<T> {
    #[must_use]
    pub fn contains(self, other: T) -> bool {
        (self.min <= other) && (other <= self.max)
    }
}

impl<T: Copy + Ord> RangeInclusive<T> {
    pub fn clamp(self, value: T) -> T {
        value.clamp(self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_contains_is_half_open() {
        let interval = Interval::new(at(10, 0), at(11, 0));
        assert!(interval.contains(at(10, 0)));
        assert!(interval.contains(at(10, 59)));
        assert!(!interval.contains(at(11, 0)));
    }

    #[test]
    fn test_split_truncates_last_step() {
        let steps: Vec<_> = Interval::new(at(10, 0), at(12, 30)).split(TimeDelta::hours(1)).collect();
        assert_eq!(
            steps,
            vec![
                Interval::new(at(10, 0), at(11, 0)),
                Interval::new(at(11, 0), at(12, 0)),
                Interval::new(at(12, 0), at(12, 30)),
            ]
        );
    }

    #[test]
    fn test_split_shorter_than_step() {
        let steps: Vec<_> = Interval::new(at(10, 0), at(10, 20)).split(TimeDelta::hours(1)).collect();
        assert_eq!(steps, vec![Interval::new(at(10, 0), at(10, 20))]);
    }

    #[test]
    fn test_split_aligned_trims_first_step() {
        let steps: Vec<_> =
            Interval::new(at(1, 30), at(3, 30)).split_aligned(TimeDelta::hours(1)).collect();
        assert_eq!(
            steps,
            vec![
                Interval::new(at(1, 30), at(2, 0)),
                Interval::new(at(2, 0), at(3, 0)),
                Interval::new(at(3, 0), at(3, 30)),
            ]
        );
    }

    #[test]
    fn test_cut() {
        let interval = Interval::new(at(10, 0), at(11, 0));
        let steps: Vec<_> = interval.cut(&[at(9, 0), at(10, 0), at(10, 20), at(11, 0)]).collect();
        assert_eq!(steps, vec![Interval::new(at(10, 0), at(10, 20)), Interval::new(at(10, 20), at(11, 0))]);
    }

    #[test]
    fn test_intersection() {
        let lhs = Interval::new(at(10, 0), at(11, 0));
        assert_eq!(
            lhs.intersection(Interval::new(at(10, 30), at(12, 0))),
            Some(Interval::new(at(10, 30), at(11, 0)))
        );
        assert_eq!(lhs.intersection(Interval::new(at(11, 0), at(12, 0))), None);
    }
}
