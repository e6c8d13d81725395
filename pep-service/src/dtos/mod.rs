//! Request/response bodies that are not domain models.

use serde::{Deserialize, Serialize};

/// Acknowledgement for device-policy writes.
#[derive(Debug, Serialize, Deserialize)]
pub struct PolicyUpdated {
    pub resource: String,
    pub updated: bool,
}

impl Default for PolicyUpdated {
    fn default() -> Self {
        Self {
            resource: "policy".to_string(),
            updated: true,
        }
    }
}

/// Acknowledgement for service-policy writes.
#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceUpdated {
    pub resource: String,
    pub updated: bool,
}

impl Default for ServiceUpdated {
    fn default() -> Self {
        Self {
            resource: "service".to_string(),
            updated: true,
        }
    }
}

/// Signed device statement returned to the gateway.
#[derive(Debug, Serialize, Deserialize)]
pub struct SignedMessage {
    /// Compact signed token over the device's canonical encoding.
    pub signature: String,
}
