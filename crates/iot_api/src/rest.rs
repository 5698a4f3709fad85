mod device_handler;
mod representation;
mod routes;

pub use device_handler::*;
pub use representation::*;
pub use routes::*;
