use chrono::{DateTime, Utc};
use derive_more::Display;
use hoard_quantities::{
    cost::Cost,
    energy::KilowattHours,
    rate::{KilowattHourRate, KilowattRate},
};
use serde::{Deserialize, Serialize};

use crate::tariff::{ClockTime, TariffId};

#[derive(Copy, Clone, Debug, Display, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    #[display("flat")]
    Flat,

    /// Time-of-use fallback outside any configured period.
    #[display("base")]
    Base,

    #[display("peak")]
    Peak,

    #[display("shoulder")]
    Shoulder,

    #[display("off-peak")]
    OffPeak,

    #[display("tiered")]
    Tiered,
}

/// Daily time-of-use period.
///
/// A period whose end is not after its start spans midnight.
#[must_use]
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct TouPeriod {
    pub tier: Tier,
    pub start: ClockTime,
    pub end: ClockTime,
}

impl TouPeriod {
    #[must_use]
    pub fn contains(self, time: ClockTime) -> bool {
        if self.start < self.end {
            self.start <= time && time < self.end
        } else {
            self.start <= time || time < self.end
        }
    }
}

/// Consumption block of a tiered tariff.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Upper bound of the block in imported energy per interval, open-ended when absent.
    #[serde(default, rename = "up_to_kwh")]
    pub up_to: Option<KilowattHours>,

    pub rate: KilowattHourRate,
}

/// Rate-resolution strategy of a tariff.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RateType {
    /// Base rate at any time.
    Flat,

    TimeOfUse {
        peak_rate: KilowattHourRate,
        off_peak_rate: KilowattHourRate,

        #[serde(default)]
        shoulder_rate: Option<KilowattHourRate>,

        /// Matched in order, the first match wins.
        periods: Vec<TouPeriod>,

        /// Offset of the local wall clock the periods are expressed in.
        #[serde(default)]
        utc_offset_minutes: i32,
    },

    Tiered {
        blocks: Vec<Block>,
    },
}

impl RateType {
    pub fn rates(&self) -> Vec<KilowattHourRate> {
        match self {
            Self::Flat => Vec::new(),
            Self::TimeOfUse { peak_rate, off_peak_rate, shoulder_rate, .. } => {
                [Some(*peak_rate), Some(*off_peak_rate), *shoulder_rate].into_iter().flatten().collect()
            }
            Self::Tiered { blocks } => blocks.iter().map(|block| block.rate).collect(),
        }
    }

    pub(super) fn validate(&self) -> Result<(), String> {
        match self {
            Self::Flat => Ok(()),

            Self::TimeOfUse { shoulder_rate, periods, utc_offset_minutes, .. } => {
                if utc_offset_minutes.abs() > 14 * 60 {
                    return Err(format!("UTC offset of {utc_offset_minutes} minutes"));
                }
                for period in periods {
                    match period.tier {
                        Tier::Peak | Tier::OffPeak => {}
                        Tier::Shoulder if shoulder_rate.is_some() => {}
                        Tier::Shoulder => return Err("shoulder period without a rate".to_owned()),
                        tier => return Err(format!("`{tier}` is not a time-of-use tier")),
                    }
                    if period.start == period.end {
                        return Err(format!("empty period at {}", period.start));
                    }
                }
                Ok(())
            }

            Self::Tiered { blocks } => {
                let Some((last, bounded)) = blocks.split_last() else {
                    return Err("no blocks".to_owned());
                };
                if last.up_to.is_some() {
                    return Err("the last block must be open-ended".to_owned());
                }
                let mut lower = KilowattHours::ZERO;
                for block in bounded {
                    match block.up_to {
                        Some(up_to) if up_to.is_finite() && up_to > lower => lower = up_to,
                        _ => return Err("block bounds must be finite and increasing".to_owned()),
                    }
                }
                Ok(())
            }
        }
    }

    pub(super) fn resolve(
        &self,
        base_rate: KilowattHourRate,
        instant: DateTime<Utc>,
    ) -> (Tier, EnergyPrice) {
        match self {
            Self::Flat => (Tier::Flat, EnergyPrice::Linear(base_rate)),

            Self::TimeOfUse { peak_rate, off_peak_rate, shoulder_rate, periods, utc_offset_minutes } => {
                let time = ClockTime::of(instant, *utc_offset_minutes);
                let tier = periods
                    .iter()
                    .find(|period| period.contains(time))
                    .map_or(Tier::Base, |period| period.tier);
                let rate = match tier {
                    Tier::Peak => *peak_rate,
                    Tier::OffPeak => *off_peak_rate,
                    Tier::Shoulder => shoulder_rate.unwrap_or(base_rate),
                    Tier::Flat | Tier::Base | Tier::Tiered => base_rate,
                };
                (tier, EnergyPrice::Linear(rate))
            }

            Self::Tiered { blocks } => (Tier::Tiered, EnergyPrice::Blocks(blocks.clone())),
        }
    }
}

/// Energy price applicable within a single interval.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnergyPrice {
    Linear(KilowattHourRate),

    /// Blocks apply to the energy imported within the interval.
    Blocks(Vec<Block>),
}

impl EnergyPrice {
    /// Price of the first imported kilowatt-hour.
    pub fn unit_rate(&self) -> KilowattHourRate {
        match self {
            Self::Linear(rate) => *rate,
            Self::Blocks(blocks) => blocks.first().map_or(KilowattHourRate::ZERO, |block| block.rate),
        }
    }

    pub fn import_cost(&self, energy: KilowattHours) -> Cost {
        match self {
            Self::Linear(rate) => energy * *rate,
            Self::Blocks(blocks) => {
                let mut cost = Cost::ZERO;
                let mut lower = KilowattHours::ZERO;
                for block in blocks {
                    if lower >= energy {
                        break;
                    }
                    let upper = block.up_to.map_or(energy, |up_to| up_to.min(energy));
                    cost += (upper - lower) * block.rate;
                    lower = upper;
                }
                cost
            }
        }
    }
}

/// Everything needed to price a single interval.
#[must_use]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RateQuote {
    pub tariff_id: TariffId,
    pub tier: Tier,
    pub energy: EnergyPrice,

    /// Zero when the tariff does not credit exports.
    pub export_rate: KilowattHourRate,

    /// Zero when the tariff has no demand charge.
    pub demand_charge: KilowattRate,
}

impl RateQuote {
    /// Net cost of the grid energy: positive imports, negative exports.
    pub fn grid_cost(&self, grid: KilowattHours) -> Cost {
        self.energy.import_cost(grid.positive()) - grid.negative() * self.export_rate
    }
}
