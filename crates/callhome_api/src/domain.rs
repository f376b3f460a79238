mod dashboard;
mod telemetry_service;
mod template;

pub use dashboard::*;
pub use telemetry_service::*;
pub use template::*;
