mod error;
mod handlers;
mod requests;
mod server;

pub use error::*;
pub use handlers::*;
pub use requests::*;
pub use server::*;
