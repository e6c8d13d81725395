use serde::{Deserialize, Serialize};

/// Device-scoped usage policy tags supported by the system.
///
/// The vocabulary is fixed: policies are enumerated wire names, not
/// entities with a lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    AnonymizationPolicy,
    AttributionPolicy,
    CommercialPolicy,
    DerivativeDataRedistributionPolicy,
    DisclosurePolicy,
    ModificationPolicy,
    OriginalDataRedistributionPolicy,
    PurposeAdvertisementsPolicy,
    PurposeEntertainmentPolicy,
    PurposeProfilingPolicy,
    PurposePublicUtilityPolicy,
    PurposeRecommendationPolicy,
    PurposeSafetyPolicy,
}

/// Scopes a service may declare as required.
///
/// Superset of [`Policy`]: `storage_policy` denotes a time-bound
/// retention requirement rather than a present/absent flag, and has no
/// device-side counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServicePolicy {
    AnonymizationPolicy,
    AttributionPolicy,
    CommercialPolicy,
    DerivativeDataRedistributionPolicy,
    DisclosurePolicy,
    ModificationPolicy,
    OriginalDataRedistributionPolicy,
    PurposeAdvertisementsPolicy,
    PurposeEntertainmentPolicy,
    PurposeProfilingPolicy,
    PurposePublicUtilityPolicy,
    PurposeRecommendationPolicy,
    PurposeSafetyPolicy,
    StoragePolicy,
}

impl ServicePolicy {
    /// The device-side policy satisfying this scope, or `None` for the
    /// time-bound storage scope.
    pub fn as_device_policy(self) -> Option<Policy> {
        match self {
            ServicePolicy::AnonymizationPolicy => Some(Policy::AnonymizationPolicy),
            ServicePolicy::AttributionPolicy => Some(Policy::AttributionPolicy),
            ServicePolicy::CommercialPolicy => Some(Policy::CommercialPolicy),
            ServicePolicy::DerivativeDataRedistributionPolicy => {
                Some(Policy::DerivativeDataRedistributionPolicy)
            }
            ServicePolicy::DisclosurePolicy => Some(Policy::DisclosurePolicy),
            ServicePolicy::ModificationPolicy => Some(Policy::ModificationPolicy),
            ServicePolicy::OriginalDataRedistributionPolicy => {
                Some(Policy::OriginalDataRedistributionPolicy)
            }
            ServicePolicy::PurposeAdvertisementsPolicy => Some(Policy::PurposeAdvertisementsPolicy),
            ServicePolicy::PurposeEntertainmentPolicy => Some(Policy::PurposeEntertainmentPolicy),
            ServicePolicy::PurposeProfilingPolicy => Some(Policy::PurposeProfilingPolicy),
            ServicePolicy::PurposePublicUtilityPolicy => Some(Policy::PurposePublicUtilityPolicy),
            ServicePolicy::PurposeRecommendationPolicy => Some(Policy::PurposeRecommendationPolicy),
            ServicePolicy::PurposeSafetyPolicy => Some(Policy::PurposeSafetyPolicy),
            ServicePolicy::StoragePolicy => None,
        }
    }
}
