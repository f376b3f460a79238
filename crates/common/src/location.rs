mod config;
mod http_location_service;

pub use config::*;
pub use http_location_service::*;
