//! service-core: shared infrastructure for the policy enforcement point.
pub mod config;
pub mod error;
pub mod observability;
