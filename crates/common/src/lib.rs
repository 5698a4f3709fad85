pub mod auth;
pub mod domain;
pub mod garde;
pub mod http;
pub mod memory;
pub mod nats;
pub mod objects;
pub mod postgres;
pub mod rpc;
pub mod telemetry;
