#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod gate;
pub mod model;
pub mod time;
pub mod weights;

pub use error::Error;
pub use time::Clock;
