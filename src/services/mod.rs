pub mod error;
pub mod ports;
pub mod registry;
pub mod subscription;
