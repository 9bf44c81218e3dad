#![allow(unused_imports)]

pub use tracing::{debug, info, instrument, warn};

pub use crate::error::{Error, Result};
