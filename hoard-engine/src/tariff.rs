mod clock;
mod rate;
mod resolver;

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use derive_more::{Display, From, FromStr};
use hoard_quantities::rate::{KilowattHourRate, KilowattRate};
use serde::{Deserialize, Serialize};

pub use self::{
    clock::ClockTime,
    rate::{Block, EnergyPrice, RateQuote, RateType, Tier, TouPeriod},
    resolver::TariffResolver,
};
use crate::{device::DeviceId, ops::Interval, prelude::*};

#[derive(Clone, Debug, Display, Eq, From, FromStr, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct TariffId(pub String);

impl From<&str> for TariffId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

#[must_use]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnergyTariff {
    pub id: TariffId,
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    pub provider: String,

    /// Owning device, or [`None`] for a tariff that applies to any device without its own.
    #[serde(default)]
    pub device_id: Option<DeviceId>,

    #[serde(default = "default_currency")]
    pub currency: String,

    /// Rate outside any time-of-use period.
    pub base_rate: KilowattHourRate,

    pub rate: RateType,

    /// Credit for exported energy, zero when absent.
    #[serde(default)]
    pub export_rate: Option<KilowattHourRate>,

    /// Charge on the peak import power, applied once per billing period.
    #[serde(default, rename = "demand_charge_per_kw")]
    pub demand_charge: Option<KilowattRate>,

    pub effective_from: DateTime<Utc>,

    /// Exclusive end of the validity window, open-ended when absent.
    #[serde(default)]
    pub effective_to: Option<DateTime<Utc>>,
}

fn default_currency() -> String {
    "USD".to_owned()
}

impl EnergyTariff {
    #[must_use]
    pub fn is_active_at(&self, instant: DateTime<Utc>) -> bool {
        self.effective_from <= instant && self.effective_to.is_none_or(|to| instant < to)
    }

    /// Whether the validity window overlaps the interval.
    #[must_use]
    pub fn is_active_within(&self, interval: Interval) -> bool {
        self.effective_from < interval.end && self.effective_to.is_none_or(|to| interval.start < to)
    }

    #[must_use]
    pub fn applies_to(&self, device_id: &DeviceId) -> bool {
        self.device_id.as_ref().is_none_or(|owner| owner == device_id)
    }

    pub fn validate(&self) -> Result {
        if let Some(effective_to) = self.effective_to
            && effective_to <= self.effective_from
        {
            return Err(Error::Validation(format!(
                "tariff `{}` ends before it starts ({} >= {effective_to})",
                self.id, self.effective_from,
            )));
        }
        let rates = [Some(self.base_rate), self.export_rate].into_iter().flatten();
        if rates.chain(self.rate.rates()).any(|rate| !rate.is_finite()) {
            return Err(Error::Validation(format!("tariff `{}` has a non-finite rate", self.id)));
        }
        if let Some(demand_charge) = self.demand_charge
            && !(demand_charge.is_finite() && demand_charge >= KilowattRate::ZERO)
        {
            return Err(Error::Validation(format!(
                "tariff `{}` has an invalid demand charge: {demand_charge}",
                self.id,
            )));
        }
        self.rate.validate().map_err(|message| {
            Error::Validation(format!("tariff `{}` is misconfigured: {message}", self.id))
        })
    }

    /// Sorted instants strictly inside the interval at which the price may change.
    ///
    /// These are the validity window bounds, and the period bounds of a time-of-use rate.
    pub fn price_changes(&self, interval: Interval) -> Vec<DateTime<Utc>> {
        let mut instants: Vec<DateTime<Utc>> =
            [Some(self.effective_from), self.effective_to].into_iter().flatten().collect();
        if let RateType::TimeOfUse { periods, utc_offset_minutes, .. } = &self.rate {
            let offset = TimeDelta::minutes(i64::from(*utc_offset_minutes));
            let last_day = (interval.end + offset).date_naive();
            for day in (interval.start + offset).date_naive().iter_days().take_while(|day| *day <= last_day) {
                let midnight = day.and_time(NaiveTime::MIN).and_utc() - offset;
                instants.extend(periods.iter().flat_map(|period| {
                    [period.start, period.end]
                        .map(|time| midnight + TimeDelta::minutes(i64::from(time.minutes())))
                }));
            }
        }
        instants.retain(|instant| interval.start < *instant && *instant < interval.end);
        instants.sort_unstable();
        instants.dedup();
        instants
    }

    /// Price applicable at the instant, which must fall within the validity window.
    pub fn quote(&self, instant: DateTime<Utc>) -> RateQuote {
        let (tier, energy) = self.rate.resolve(self.base_rate, instant);
        RateQuote {
            tariff_id: self.id.clone(),
            tier,
            energy,
            export_rate: self.export_rate.unwrap_or(KilowattHourRate::ZERO),
            demand_charge: self.demand_charge.unwrap_or(KilowattRate::ZERO),
        }
    }
}
