//! Services layer for pep-service.
//!
//! Pure computations (canonical signing, compatibility evaluation) and
//! the adapters around the store and the identity registry, combined by
//! the orchestration in [`policy`].

pub mod compat;
mod database;
pub mod metrics;
mod policy;
mod registry;
mod signer;

pub use compat::is_service_allowed;
pub use database::{Database, PolicyStore};
pub use policy::PolicyService;
pub use registry::{RegistryHttpClient, ResourceRegistry};
pub use signer::PolicySigner;
