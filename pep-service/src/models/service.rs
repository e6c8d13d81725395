use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

/// A service and the scopes it requires from a device's policy list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Service {
    /// Service name, lower-cased on ingestion: the store is keyed by
    /// the lowercase form.
    #[validate(length(min = 1, max = 30))]
    #[serde(deserialize_with = "deserialize_lowercase")]
    pub name: String,
    /// Scopes the service declares it needs. Treated as a set.
    pub resource_scopes: Vec<super::ServicePolicy>,
}

/// Response for `GET /service`: the policy vocabulary plus the
/// requester's registered services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserServicesPolicies {
    pub available_policy: Vec<String>,
    #[serde(default)]
    pub service_policy_list: Vec<Service>,
}

/// Gateway filter request: candidate service names plus the signed
/// device token whose verification establishes trust for the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayService {
    #[serde(deserialize_with = "deserialize_lowercase_list")]
    pub service_list: Vec<String>,
    /// Compact signed token resolving to a [`super::Device`] once
    /// verified. Verification failure is an authentication failure,
    /// never an empty result.
    pub sign_device: String,
}

fn deserialize_lowercase<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(String::deserialize(deserializer)?.to_lowercase())
}

fn deserialize_lowercase_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Vec::<String>::deserialize(deserializer)?
        .into_iter()
        .map(|name| name.to_lowercase())
        .collect())
}
