use serde::{Deserialize, Serialize};

/// Identity extracted from a verified bearer token.
///
/// Used purely as the store's owner/namespace key; it has no lifecycle
/// of its own in this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requester {
    /// User name, the store's `username` column.
    pub preferred_username: String,
    /// Stable subject identifier at the identity provider.
    pub sub: String,
}
