mod client;
mod config;
mod filters;
mod telemetry_repository;

pub use client::*;
pub use config::*;
pub use filters::*;
pub use telemetry_repository::*;
