mod driver;
mod handler;
mod local_transport;

pub use driver::*;
pub use handler::*;
pub use local_transport::*;
