#![forbid(unsafe_code)]

pub mod error;
pub mod format;
pub mod model;
pub mod scoring;
pub mod time;

pub use error::Error;
pub use scoring::ScoringEngine;
pub use time::Clock;
