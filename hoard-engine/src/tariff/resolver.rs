use chrono::{DateTime, Utc};

use crate::{
    device::DeviceId,
    ops::Interval,
    prelude::*,
    tariff::{EnergyTariff, RateQuote},
};

/// Resolves the tariff applicable to a device.
///
/// Tariffs owned by the device take precedence over device-agnostic defaults.
pub struct TariffResolver<'a> {
    device_id: &'a DeviceId,
    owned: Vec<&'a EnergyTariff>,
    defaults: Vec<&'a EnergyTariff>,
}

impl<'a> TariffResolver<'a> {
    pub fn new(device_id: &'a DeviceId, tariffs: &'a [EnergyTariff]) -> Self {
        let (owned, defaults): (Vec<_>, Vec<_>) = tariffs
            .iter()
            .filter(|tariff| tariff.applies_to(device_id))
            .partition(|tariff| tariff.device_id.is_some());
        Self { device_id, owned, defaults }
    }

    /// Resolve against the one tariff only, as if it were the only one.
    pub fn pinned(device_id: &'a DeviceId, tariff: &'a EnergyTariff) -> Result<Self> {
        if !tariff.applies_to(device_id) {
            return Err(Error::Validation(format!(
                "tariff `{}` does not apply to device `{device_id}`",
                tariff.id,
            )));
        }
        Ok(Self { device_id, owned: vec![tariff], defaults: Vec::new() })
    }

    /// Tariff active at the instant.
    pub fn active(&self, instant: DateTime<Utc>) -> Result<&'a EnergyTariff> {
        for candidates in [&self.owned, &self.defaults] {
            let mut active = candidates.iter().copied().filter(|tariff| tariff.is_active_at(instant));
            if let Some(first) = active.next() {
                if let Some(second) = active.next() {
                    return Err(Error::OverlappingTariffs {
                        device_id: self.device_id.clone(),
                        instant,
                        first: first.id.clone(),
                        second: second.id.clone(),
                    });
                }
                return Ok(first);
            }
        }
        Err(Error::NoTariffFound { device_id: self.device_id.clone(), instant })
    }

    pub fn resolve(&self, instant: DateTime<Utc>) -> Result<RateQuote> {
        Ok(self.active(instant)?.quote(instant))
    }

    /// Quote every interval of the grid at its start.
    #[instrument(skip_all, fields(device_id = %self.device_id, n_intervals = grid.len()))]
    pub fn rate_series(&self, grid: &[Interval]) -> Result<Vec<RateQuote>> {
        let quotes = grid
            .iter()
            .map(|interval| self.resolve(interval.start))
            .collect::<Result<Vec<_>>>()?;
        debug!("resolved");
        Ok(quotes)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::tariff::{TariffId, tests::flat};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, day, 0, 0, 0).unwrap()
    }

    fn owned_by(mut tariff: EnergyTariff, device_id: &str) -> EnergyTariff {
        tariff.device_id = Some(DeviceId::from(device_id));
        tariff
    }

    #[test]
    fn test_boundary_fails_over_to_next_tariff() {
        let tariffs = [flat("may", 0.2, at(1), Some(at(10))), flat("june", 0.3, at(10), None)];
        let device_id = DeviceId::from("site-1");
        let resolver = TariffResolver::new(&device_id, &tariffs);
        assert_eq!(resolver.active(at(9)).unwrap().id, TariffId::from("may"));
        assert_eq!(resolver.active(at(10)).unwrap().id, TariffId::from("june"));
    }

    #[test]
    fn test_boundary_without_successor() {
        let tariffs = [flat("may", 0.2, at(1), Some(at(10)))];
        let device_id = DeviceId::from("site-1");
        let resolver = TariffResolver::new(&device_id, &tariffs);
        assert!(matches!(resolver.resolve(at(10)), Err(Error::NoTariffFound { .. })));
    }

    #[test]
    fn test_owned_tariff_takes_precedence() {
        let tariffs = [
            flat("default", 0.2, at(1), None),
            owned_by(flat("own", 0.25, at(1), None), "site-1"),
            owned_by(flat("other", 0.5, at(1), None), "site-2"),
        ];
        let device_id = DeviceId::from("site-1");
        let resolver = TariffResolver::new(&device_id, &tariffs);
        assert_eq!(resolver.active(at(5)).unwrap().id, TariffId::from("own"));

        let device_id = DeviceId::from("site-3");
        let resolver = TariffResolver::new(&device_id, &tariffs);
        assert_eq!(resolver.active(at(5)).unwrap().id, TariffId::from("default"));
    }

    #[test]
    fn test_overlapping_tariffs() {
        let tariffs = [flat("one", 0.2, at(1), None), flat("two", 0.3, at(5), None)];
        let device_id = DeviceId::from("site-1");
        let resolver = TariffResolver::new(&device_id, &tariffs);
        assert!(resolver.active(at(3)).is_ok());
        assert!(matches!(resolver.active(at(6)), Err(Error::OverlappingTariffs { .. })));
    }

    #[test]
    fn test_pinned_tariff_of_another_device() {
        let tariff = owned_by(flat("other", 0.5, at(1), None), "site-2");
        let device_id = DeviceId::from("site-1");
        assert!(matches!(
            TariffResolver::pinned(&device_id, &tariff),
            Err(Error::Validation(_)),
        ));
    }
}
