//! Service compatibility evaluation.
//!
//! Decides, per service, whether the scopes a service requires are
//! satisfied by the policies granted to a device. Pure computation: no
//! I/O, no clock reads. `now` is supplied by the caller as a single
//! snapshot so one filtering pass sees one consistent instant.

use chrono::NaiveDateTime;
use std::collections::HashSet;

use crate::models::{Policy, ServicePolicy};

/// Whether a device's granted policies satisfy a service's required
/// scopes.
///
/// The storage scope is evaluated separately from set containment: it
/// passes only when a storage expiry is present and strictly after
/// `now`. A failed storage check excludes the service outright, without
/// evaluating the remaining scopes. Every other required scope must be
/// explicitly granted; surplus granted policies are ignored.
pub fn is_service_allowed(
    required_scopes: &[ServicePolicy],
    granted_policies: &[Policy],
    storage_expiry: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> bool {
    let mut required: HashSet<ServicePolicy> = required_scopes.iter().copied().collect();

    if required.remove(&ServicePolicy::StoragePolicy) {
        match storage_expiry {
            Some(expiry) if expiry > now => {}
            _ => return false,
        }
    }

    let granted: HashSet<Policy> = granted_policies.iter().copied().collect();
    required
        .into_iter()
        .all(|scope| scope.as_device_policy().is_some_and(|p| granted.contains(&p)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn now() -> NaiveDateTime {
        Utc::now().naive_utc()
    }

    #[test]
    fn extra_granted_policies_are_ignored() {
        assert!(is_service_allowed(
            &[ServicePolicy::CommercialPolicy],
            &[Policy::CommercialPolicy, Policy::AttributionPolicy],
            None,
            now(),
        ));
    }

    #[test]
    fn missing_required_scope_denies_the_service() {
        assert!(!is_service_allowed(
            &[ServicePolicy::CommercialPolicy, ServicePolicy::ModificationPolicy],
            &[Policy::CommercialPolicy],
            None,
            now(),
        ));
    }

    #[test]
    fn empty_required_scopes_are_vacuously_satisfied() {
        assert!(is_service_allowed(&[], &[], None, now()));
    }

    #[test]
    fn empty_grants_only_allow_empty_requirements() {
        assert!(!is_service_allowed(
            &[ServicePolicy::DisclosurePolicy],
            &[],
            None,
            now(),
        ));
    }

    #[test]
    fn storage_requires_an_unexpired_retention_window() {
        let reference = now();
        let storage_only = [ServicePolicy::StoragePolicy];

        assert!(is_service_allowed(
            &storage_only,
            &[],
            Some(reference + Duration::hours(1)),
            reference,
        ));
        assert!(!is_service_allowed(
            &storage_only,
            &[],
            Some(reference - Duration::hours(1)),
            reference,
        ));
        assert!(!is_service_allowed(&storage_only, &[], None, reference));
    }

    #[test]
    fn expired_storage_short_circuits_remaining_scopes() {
        // Even fully granted scopes cannot rescue a failed storage check.
        assert!(!is_service_allowed(
            &[ServicePolicy::StoragePolicy, ServicePolicy::CommercialPolicy],
            &[Policy::CommercialPolicy],
            None,
            now(),
        ));
    }

    #[test]
    fn duplicate_scopes_behave_as_a_set() {
        assert!(is_service_allowed(
            &[ServicePolicy::CommercialPolicy, ServicePolicy::CommercialPolicy],
            &[Policy::CommercialPolicy],
            None,
            now(),
        ));
    }
}
