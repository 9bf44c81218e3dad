//! Collaborators the engine reads from and writes to.
//!
//! Persistence itself is out of scope: the in-memory implementations back the tests and serve
//! as the reference behaviour for real storage adapters.

mod devices;
mod forecasts;
mod states;
mod tariffs;

pub use self::{
    devices::{DeviceStore, InMemoryDevices},
    forecasts::{ForecastProvider, InMemoryForecasts},
    states::{BatteryStateStore, InMemoryBatteryStates},
    tariffs::{InMemoryTariffs, TariffStore},
};
