mod config;
mod cost_cache;
mod key;
mod sketch;
mod telemetry_cache;

pub use config::*;
pub use cost_cache::*;
pub use key::*;
pub use telemetry_cache::*;
