pub mod callhome_client;
mod config;
mod deployment;
mod error;
mod heartbeat;
mod network;

pub use callhome_client::*;
pub use config::*;
pub use deployment::*;
pub use error::*;
pub use heartbeat::*;
pub use network::*;
