#![doc = include_str!("../../README.md")]

pub mod battery;
pub mod device;
pub mod engine;
mod error;
pub mod forecast;
pub mod ops;
mod prelude;
pub mod roi;
pub mod schedule;
pub mod solver;
pub mod store;
pub mod tariff;

pub use self::{
    engine::{Engine, EngineSettings},
    error::{Error, Result},
};
