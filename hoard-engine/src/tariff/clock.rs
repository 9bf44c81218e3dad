use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Wall-clock time of day in whole minutes, `00:00..=24:00`.
///
/// `24:00` is only meaningful as a period end.
#[must_use]
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime(u16);

impl ClockTime {
    pub const END_OF_DAY: Self = Self(24 * 60);

    pub const fn from_hm(hour: u16, minute: u16) -> Option<Self> {
        if minute < 60 && (hour < 24 || (hour == 24 && minute == 0)) {
            Some(Self(hour * 60 + minute))
        } else {
            None
        }
    }

    /// Time of day of the instant, shifted by the UTC offset.
    #[expect(clippy::cast_possible_truncation)]
    pub fn of(instant: DateTime<Utc>, utc_offset_minutes: i32) -> Self {
        let minutes = i64::from(instant.hour() * 60 + instant.minute())
            + i64::from(utc_offset_minutes);
        Self(minutes.rem_euclid(24 * 60) as u16)
    }

    #[must_use]
    pub const fn minutes(self) -> u16 {
        self.0
    }
}

impl Display for ClockTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl FromStr for ClockTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("`{s}` is not a valid `HH:MM` time");
        let (hour, minute) = s.split_once(':').ok_or_else(invalid)?;
        if minute.len() != 2 {
            return Err(invalid());
        }
        let hour = hour.parse().map_err(|_| invalid())?;
        let minute = minute.parse().map_err(|_| invalid())?;
        Self::from_hm(hour, minute).ok_or_else(invalid)
    }
}

impl TryFrom<String> for ClockTime {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(time: ClockTime) -> Self {
        time.to_string()
    }
}
