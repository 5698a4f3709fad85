mod client;
mod config;
mod device_repository;
mod migration;

pub use client::*;
pub use config::*;
pub use device_repository::*;
pub use migration::*;
