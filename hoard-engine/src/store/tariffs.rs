use async_trait::async_trait;
use itertools::Itertools;

use crate::{
    ops::Interval,
    prelude::*,
    tariff::{EnergyTariff, TariffId},
};

#[async_trait]
pub trait TariffStore: Send + Sync {
    async fn tariffs(&self) -> Result<Vec<EnergyTariff>>;

    async fn tariff(&self, tariff_id: &TariffId) -> Result<Option<EnergyTariff>> {
        Ok(self.tariffs().await?.into_iter().find(|tariff| &tariff.id == tariff_id))
    }

    /// Tariffs whose validity window overlaps the interval.
    async fn active_within(&self, interval: Interval) -> Result<Vec<EnergyTariff>> {
        Ok(self
            .tariffs()
            .await?
            .into_iter()
            .filter(|tariff| tariff.is_active_within(interval))
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryTariffs(Vec<EnergyTariff>);

impl InMemoryTariffs {
    /// Build the store, validating each tariff.
    pub fn try_new(tariffs: impl IntoIterator<Item = EnergyTariff>) -> Result<Self> {
        let tariffs: Vec<EnergyTariff> = tariffs.into_iter().collect();
        for tariff in &tariffs {
            tariff.validate()?;
        }
        if let Some(duplicate) = tariffs.iter().map(|tariff| &tariff.id).duplicates().next() {
            return Err(Error::Validation(format!("duplicate tariff `{duplicate}`")));
        }
        Ok(Self(tariffs))
    }
}

#[async_trait]
impl TariffStore for InMemoryTariffs {
    async fn tariffs(&self) -> Result<Vec<EnergyTariff>> {
        Ok(self.0.clone())
    }
}
