pub mod callhome_api;
pub mod domain;
pub mod http;

pub use callhome_api::*;
pub use domain::*;
pub use http::*;
