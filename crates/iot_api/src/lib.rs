pub mod domain;
pub mod iot_api;
pub mod rest;

pub use domain::*;
pub use iot_api::*;
pub use rest::*;
