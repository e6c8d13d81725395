pub mod device;
pub mod gateway;
pub mod metrics;
pub mod service;
