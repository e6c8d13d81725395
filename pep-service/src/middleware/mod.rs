mod auth;

pub use auth::{
    device_owner_auth, service_owner_auth, BearerVerifier, OwnerIdentity, DEVICE_OWNER_ROLE,
    SERVICE_OWNER_ROLE,
};
