//! Encoding of cached values for the shared tier
//!
//! The shared tier only stores UTF-8 strings and knows nothing about the
//! caller's types, so every cacheable type declares how it is encoded:
//! scalars as their literal text, everything else as structured JSON.

use crate::cache::CacheError;
use crate::cache::EntryOptions;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Origin version carried by entries that are not subject to invalidation
pub const UNVERSIONED: i64 = 0;

/// Self-describing encoded payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoded {
    Scalar(String),
    Structured(serde_json::Value),
}

/// A value that can live in both cache tiers
pub trait CacheValue: Clone + Send + Sync + 'static {
    fn encode(&self) -> Result<Encoded, CacheError>;
    fn decode(encoded: Encoded) -> Result<Self, CacheError>;
}

macro_rules! scalar_cache_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CacheValue for $ty {
                fn encode(&self) -> Result<Encoded, CacheError> {
                    Ok(Encoded::Scalar(self.to_string()))
                }

                fn decode(encoded: Encoded) -> Result<Self, CacheError> {
                    match encoded {
                        Encoded::Scalar(raw) => raw.parse::<$ty>().map_err(|_| {
                            CacheError::Decode(format!(
                                "'{raw}' is not a valid {}",
                                stringify!($ty)
                            ))
                        }),
                        Encoded::Structured(_) => Err(CacheError::Decode(format!(
                            "expected scalar {}, found structured value",
                            stringify!($ty)
                        ))),
                    }
                }
            }
        )*
    };
}

scalar_cache_value!(i32, i64, u32, u64, bool, String);

/// Implements [`CacheValue`] for a serde type using the structured encoding
macro_rules! structured_cache_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::cache::CacheValue for $ty {
                fn encode(&self) -> Result<$crate::cache::Encoded, $crate::cache::CacheError> {
                    $crate::cache::value::encode_structured(self)
                }

                fn decode(
                    encoded: $crate::cache::Encoded,
                ) -> Result<Self, $crate::cache::CacheError> {
                    $crate::cache::value::decode_structured(encoded)
                }
            }
        )*
    };
}

pub(crate) use structured_cache_value;

pub fn encode_structured<T: Serialize>(value: &T) -> Result<Encoded, CacheError> {
    Ok(Encoded::Structured(serde_json::to_value(value)?))
}

pub fn decode_structured<T: DeserializeOwned>(encoded: Encoded) -> Result<T, CacheError> {
    match encoded {
        Encoded::Structured(value) => Ok(serde_json::from_value(value)?),
        Encoded::Scalar(_) => Err(CacheError::Decode(
            "expected structured value, found scalar".to_string(),
        )),
    }
}

impl<T> CacheValue for Vec<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn encode(&self) -> Result<Encoded, CacheError> {
        encode_structured(self)
    }

    fn decode(encoded: Encoded) -> Result<Self, CacheError> {
        decode_structured(encoded)
    }
}

/// A cached payload tagged with the origin version it was built against
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub origin_version: i64,
    pub payload: T,
}

impl<T: CacheValue> CacheEntry<T> {
    pub fn new(origin_version: i64, payload: T) -> Self {
        Self {
            origin_version,
            payload,
        }
    }

    pub fn unversioned(payload: T) -> Self {
        Self::new(UNVERSIONED, payload)
    }

    pub fn is_valid_for(&self, required_version: i64) -> bool {
        self.origin_version == required_version
    }

    pub(crate) fn to_stored(&self, options: EntryOptions) -> Result<StoredEntry, CacheError> {
        Ok(StoredEntry {
            origin_version: self.origin_version,
            options,
            stored_at: Some(Utc::now()),
            payload: self.payload.encode()?,
        })
    }

    /// Decodes a shared-tier envelope; the returned options carry only what
    /// is left of the absolute window
    pub(crate) fn from_stored(stored: StoredEntry) -> Result<(Self, EntryOptions), CacheError> {
        let age = stored.age();
        Ok((
            Self::new(stored.origin_version, T::decode(stored.payload)?),
            stored.options.aged(age),
        ))
    }
}

/// Envelope written to the shared tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredEntry {
    pub origin_version: i64,
    #[serde(default)]
    pub options: EntryOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_at: Option<DateTime<Utc>>,
    pub payload: Encoded,
}

impl StoredEntry {
    pub fn to_json(&self) -> Result<String, CacheError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, CacheError> {
        Ok(serde_json::from_str(raw)?)
    }

    fn age(&self) -> std::time::Duration {
        self.stored_at
            .and_then(|stored_at| Utc::now().signed_duration_since(stored_at).to_std().ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        tags: Vec<String>,
    }

    structured_cache_value!(Sample);

    #[test]
    fn test_scalars_encode_as_literal_text() {
        assert_eq!(42i64.encode().unwrap(), Encoded::Scalar("42".to_string()));
        assert_eq!(true.encode().unwrap(), Encoded::Scalar("true".to_string()));
        assert_eq!(
            i64::decode(Encoded::Scalar("1700000000".to_string())).unwrap(),
            1_700_000_000
        );
    }

    #[test]
    fn test_scalar_rejects_structured_payload() {
        let result = i64::decode(Encoded::Structured(serde_json::json!({"a": 1})));
        assert!(matches!(result, Err(CacheError::Decode(_))));
    }

    #[test]
    fn test_malformed_scalar_is_a_decode_error() {
        let result = u32::decode(Encoded::Scalar("-7".to_string()));
        assert!(matches!(result, Err(CacheError::Decode(_))));
    }

    #[test]
    fn test_structured_envelope_is_self_describing() {
        let entry = CacheEntry::new(
            17,
            Sample {
                name: "front page".to_string(),
                tags: vec!["a".to_string()],
            },
        );
        let json = entry.to_stored(EntryOptions::default()).unwrap().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["origin_version"], 17);
        assert_eq!(value["payload"]["structured"]["name"], "front page");

        let (decoded, _) =
            CacheEntry::<Sample>::from_stored(StoredEntry::from_json(&json).unwrap()).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_decoded_options_keep_the_absolute_deadline() {
        let hour = std::time::Duration::from_secs(60 * 60);
        let options = EntryOptions::sliding(hour).with_absolute(6 * hour);
        let mut stored = CacheEntry::new(1, 5i64).to_stored(options).unwrap();
        stored.stored_at = Some(Utc::now() - chrono::Duration::hours(1));

        let (_, decoded) = CacheEntry::<i64>::from_stored(stored).unwrap();
        let absolute = decoded.absolute.unwrap();
        assert!(absolute <= 5 * hour);
        assert!(absolute > 5 * hour - std::time::Duration::from_secs(60));
        assert_eq!(decoded.sliding, Some(hour));
    }

    #[test]
    fn test_entry_validity_follows_origin_version() {
        let entry = CacheEntry::new(3, 10i64);
        assert!(entry.is_valid_for(3));
        assert!(!entry.is_valid_for(4));
        assert!(CacheEntry::unversioned(1i64).is_valid_for(UNVERSIONED));
    }
}
