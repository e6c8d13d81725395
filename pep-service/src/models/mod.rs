//! Domain models for the policy enforcement point.

mod device;
mod policy;
mod requester;
mod service;

pub use device::{Device, UserDevicesPolicy};
pub use policy::{Policy, ServicePolicy};
pub use requester::Requester;
pub use service::{GatewayService, Service, UserServicesPolicies};
