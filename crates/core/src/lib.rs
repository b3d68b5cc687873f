pub mod config;
pub mod error;

pub use config::JobConfig;
pub use error::*;
