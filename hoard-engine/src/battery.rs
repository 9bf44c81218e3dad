mod efficiency;
mod health;
mod state;
mod tracker;

pub use self::{
    efficiency::Efficiency,
    health::{BatteryHealth, TemperatureSummary},
    state::{BatteryState, ControlCommand, Measurement},
    tracker::Tracker,
};
