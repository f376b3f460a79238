mod location;
mod result;
mod summary;
mod telemetry;

pub use location::*;
pub use result::*;
pub use summary::*;
pub use telemetry::*;
