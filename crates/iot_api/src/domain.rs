mod device_service;
mod patch;
mod query;

pub use device_service::*;
pub use patch::*;
pub use query::*;
