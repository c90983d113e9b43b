pub mod config;
pub mod dataset;
pub mod error;
pub mod fixtures;

pub use config::FlightConfig;
pub use dataset::Dataset;
pub use error::{CoreError, Result};
