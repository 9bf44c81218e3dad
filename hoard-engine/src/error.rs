use chrono::{DateTime, Utc};

use crate::{device::DeviceId, forecast::ForecastKind, ops::Interval, tariff::TariffId};

pub type Result<T = (), E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or out-of-range input.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("no tariff is active for device `{device_id}` at {instant}")]
    NoTariffFound { device_id: DeviceId, instant: DateTime<Utc> },

    /// At most one tariff may be active for a device at any instant.
    #[error("tariffs `{first}` and `{second}` are both active for device `{device_id}` at {instant}")]
    OverlappingTariffs {
        device_id: DeviceId,
        instant: DateTime<Utc>,
        first: TariffId,
        second: TariffId,
    },

    #[error("{kind} forecast does not cover {missing:?}")]
    InsufficientForecastCoverage { kind: ForecastKind, missing: Interval },

    #[error("no feasible schedule: {0}")]
    InfeasibleSchedule(String),

    #[error("requested power {requested} exceeds the {direction} limit of {limit}")]
    CommandOutOfRange {
        requested: hoard_quantities::power::Kilowatts,
        limit: hoard_quantities::power::Kilowatts,
        direction: &'static str,
    },

    /// Another writer has appended a snapshot for the same device in the meantime.
    #[error("concurrent write for device `{device_id}`: expected version {expected}, found {found}")]
    Conflict { device_id: DeviceId, expected: u64, found: u64 },

    #[error("unknown device `{0}`")]
    UnknownDevice(DeviceId),

    #[error("unknown tariff `{0}`")]
    UnknownTariff(TariffId),

    #[error("no battery state has been recorded for device `{0}`")]
    NoBatteryState(DeviceId),

    /// Opaque failure that must never produce a partial result.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller is at fault, that is the failure maps to a 4xx-like response.
    ///
    /// None of the errors are retryable: the same inputs reproduce the same failure.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}
