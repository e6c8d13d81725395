use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

/// A device and the usage policies its owner attached to it.
///
/// The serialized form doubles as the canonical signing input: fields
/// appear in declaration order, absent fields are omitted instead of
/// being emitted as nulls, and the storage instant carries no timezone.
/// Equal devices therefore always encode to identical bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Device {
    /// Externally supplied identifier, e.g. a MAC-like string.
    #[validate(length(min = 1, max = 30))]
    pub device_id: String,
    /// Policies granted to the device. Kept in the order the owner
    /// submitted them; treated as a set for compatibility checks.
    #[serde(deserialize_with = "deserialize_policy_gaps")]
    pub policy_list: Vec<super::Policy>,
    /// Instant after which storing the device's data is no longer
    /// permitted. Timezone-naive by construction.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_naive_instant"
    )]
    pub storage_policy: Option<NaiveDateTime>,
}

impl Device {
    /// Canonical byte representation used as the exact signing input.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Policy lists may carry null gaps between entries; gaps are dropped
/// on ingestion, so the canonical form never emits them.
fn deserialize_policy_gaps<'de, D>(deserializer: D) -> Result<Vec<super::Policy>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Vec::<Option<super::Policy>>::deserialize(deserializer)?
        .into_iter()
        .flatten()
        .collect())
}

/// Accept both naive and offset-bearing instants, keeping the local
/// clock fields and dropping the offset.
fn deserialize_naive_instant<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(value) => strip_timezone(&value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn strip_timezone(value: &str) -> Result<NaiveDateTime, String> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.naive_local());
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| format!("invalid storage instant '{value}': {e}"))
}

/// Response for `GET /policy`: the system-wide policy vocabulary plus
/// the devices the requester already configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDevicesPolicy {
    pub available_policy: Vec<String>,
    #[serde(default)]
    pub device_policy_list: Vec<Device>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Policy;
    use chrono::NaiveDate;

    fn storage_instant() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 5, 7)
            .unwrap()
            .and_hms_micro_opt(7, 50, 39, 818_706)
            .unwrap()
    }

    #[test]
    fn absent_storage_policy_is_omitted_from_encoding() {
        let device = Device {
            device_id: "4eeb".to_string(),
            policy_list: vec![Policy::CommercialPolicy, Policy::AnonymizationPolicy],
            storage_policy: None,
        };

        let encoded = String::from_utf8(device.canonical_bytes().unwrap()).unwrap();
        assert_eq!(
            encoded,
            r#"{"device_id":"4eeb","policy_list":["commercial_policy","anonymization_policy"]}"#
        );
    }

    #[test]
    fn timezone_is_stripped_on_deserialization() {
        let device: Device = serde_json::from_str(
            r#"{
                "device_id": "4eeb",
                "policy_list": ["commercial_policy"],
                "storage_policy": "2021-05-07T07:50:39.818706+00:00"
            }"#,
        )
        .unwrap();

        assert_eq!(device.storage_policy, Some(storage_instant()));

        let encoded = String::from_utf8(device.canonical_bytes().unwrap()).unwrap();
        assert!(
            encoded.contains("\"storage_policy\":\"2021-05-07T07:50:39.818706\""),
            "no timezone suffix in canonical form: {encoded}"
        );
    }

    #[test]
    fn null_gaps_in_the_policy_list_are_dropped() {
        let device: Device = serde_json::from_str(
            r#"{
                "device_id": "4eeb",
                "policy_list": ["commercial_policy", null, "anonymization_policy", null]
            }"#,
        )
        .unwrap();

        assert_eq!(
            device.policy_list,
            vec![Policy::CommercialPolicy, Policy::AnonymizationPolicy]
        );

        let encoded = String::from_utf8(device.canonical_bytes().unwrap()).unwrap();
        assert_eq!(
            encoded,
            r#"{"device_id":"4eeb","policy_list":["commercial_policy","anonymization_policy"]}"#
        );
    }

    #[test]
    fn naive_storage_instants_are_accepted_verbatim() {
        let device: Device = serde_json::from_str(
            r#"{
                "device_id": "4eeb",
                "policy_list": [],
                "storage_policy": "2021-05-07T07:50:39.818706"
            }"#,
        )
        .unwrap();
        assert_eq!(device.storage_policy, Some(storage_instant()));
    }

    #[test]
    fn canonical_encoding_round_trips() {
        let device = Device {
            device_id: "device_a".to_string(),
            policy_list: vec![Policy::ModificationPolicy, Policy::DisclosurePolicy],
            storage_policy: Some(storage_instant()),
        };

        let bytes = device.canonical_bytes().unwrap();
        let decoded: Device = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, device);
        // Deterministic: re-encoding equal values yields identical bytes.
        assert_eq!(decoded.canonical_bytes().unwrap(), bytes);
    }

    #[test]
    fn device_id_length_is_bounded() {
        let device = Device {
            device_id: "x".repeat(31),
            policy_list: vec![],
            storage_policy: None,
        };
        assert!(device.validate().is_err());
    }
}
