mod aligner;
mod series;

pub use self::{
    aligner::{NetLoad, align},
    series::{Estimate, ForecastKind, ForecastPoint, ForecastSeries},
};
