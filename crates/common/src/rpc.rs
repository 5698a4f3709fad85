mod client;
mod config;
mod messages;

pub use client::*;
pub use config::*;
pub use messages::*;
