pub mod conductor;
pub mod domain;
pub mod nats;

pub use conductor::*;
pub use domain::*;
pub use nats::*;
