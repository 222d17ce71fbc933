use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;
use std::fmt;
use zeroize::Zeroizing;

/// Year used by Google for keys that never expire on their own
pub const DEFAULT_SYSTEM_KEY_YEAR: i32 = 9999;

/// A key bound to one service account, as listed by the provider
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Key {
    /// Full resource name, also used for deletion
    pub name: String,
    /// RFC 3339 start of validity
    #[serde(rename = "validAfterTime", default)]
    pub valid_after: String,
    /// RFC 3339 end of validity
    #[serde(rename = "validBeforeTime", default)]
    pub valid_before: String,
}

impl Key {
    pub fn new(
        name: impl Into<String>,
        valid_after: impl Into<String>,
        valid_before: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            valid_after: valid_after.into(),
            valid_before: valid_before.into(),
        }
    }

    pub fn valid_after_time(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.valid_after)
    }

    pub fn valid_before_time(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.valid_before)
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// A freshly created key together with its private material
///
/// The material is zeroed on drop and never shown by `Debug`.
pub struct CreatedKey {
    pub key: Key,
    pub private_material: Zeroizing<Vec<u8>>,
}

impl CreatedKey {
    pub fn new(key: Key, private_material: Vec<u8>) -> Self {
        Self {
            key,
            private_material: Zeroizing::new(private_material),
        }
    }
}

impl fmt::Debug for CreatedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreatedKey")
            .field("key", &self.key)
            .field("private_material", &"<redacted>")
            .finish()
    }
}

/// Who owns the lifecycle of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClassification {
    /// Issued by the provider; must never be deleted
    SystemManaged,
    /// Created by rotation; counts against the retention ceiling
    UserManaged,
}

impl fmt::Display for KeyClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyClassification::SystemManaged => write!(f, "system-managed"),
            KeyClassification::UserManaged => write!(f, "user-managed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedKey {
    pub key: Key,
    pub classification: KeyClassification,
}

impl ClassifiedKey {
    pub fn is_system_managed(&self) -> bool {
        self.classification == KeyClassification::SystemManaged
    }
}

/// Decides whether a listed key belongs to the provider
pub trait SystemKeyRule: Send + Sync {
    fn is_system_managed(&self, key: &Key) -> bool;
}

/// Keys whose `validBefore` falls in a far-future sentinel year are system-managed.
///
/// An unparsable `validBefore` is treated as user-managed so it never blocks rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentinelYear(pub i32);

impl Default for SentinelYear {
    fn default() -> Self {
        Self(DEFAULT_SYSTEM_KEY_YEAR)
    }
}

impl SystemKeyRule for SentinelYear {
    fn is_system_managed(&self, key: &Key) -> bool {
        key.valid_before_time()
            .map(|before| before.year() == self.0)
            .unwrap_or(false)
    }
}

/// Classify a live key listing; recomputed every run
pub fn classify(keys: &[Key], rule: &dyn SystemKeyRule) -> Vec<ClassifiedKey> {
    keys.iter()
        .map(|key| ClassifiedKey {
            key: key.clone(),
            classification: if rule.is_system_managed(key) {
                KeyClassification::SystemManaged
            } else {
                KeyClassification::UserManaged
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_year_detects_system_key() {
        let rule = SentinelYear::default();
        let key = Key::new("a", "2020-05-05T13:34:26Z", "9999-12-31T23:59:59Z");
        assert!(rule.is_system_managed(&key));
    }

    #[test]
    fn test_sentinel_year_user_key() {
        let rule = SentinelYear::default();
        let key = Key::new("b", "2020-05-05T13:34:26Z", "2022-05-08T04:58:36Z");
        assert!(!rule.is_system_managed(&key));
    }

    #[test]
    fn test_unparsable_valid_before_is_user_managed() {
        let rule = SentinelYear::default();
        let key = Key::new("c", "2020-05-05T13:34:26Z", "not a date");
        assert!(!rule.is_system_managed(&key));

        let key = Key::new("d", "2020-05-05T13:34:26Z", "");
        assert!(!rule.is_system_managed(&key));
    }

    #[test]
    fn test_custom_sentinel() {
        let rule = SentinelYear(3000);
        let key = Key::new("a", "2020-05-05T13:34:26Z", "3000-01-01T00:00:00Z");
        assert!(rule.is_system_managed(&key));
        let key = Key::new("b", "2020-05-05T13:34:26Z", "9999-12-31T23:59:59Z");
        assert!(!rule.is_system_managed(&key));
    }

    #[test]
    fn test_classify() {
        let keys = vec![
            Key::new("a", "2020-05-04T13:34:26Z", "9999-12-31T23:59:59Z"),
            Key::new("b", "2020-05-05T13:34:26Z", "2022-05-08T04:58:36Z"),
        ];
        let classified = classify(&keys, &SentinelYear::default());
        assert_eq!(classified[0].classification, KeyClassification::SystemManaged);
        assert_eq!(classified[1].classification, KeyClassification::UserManaged);
        assert_eq!(classified[1].key, keys[1]);
    }

    #[test]
    fn test_key_deserializes_from_iam_json() {
        let json = r#"{
            "name": "projects/p/serviceAccounts/sa@p.iam.gserviceaccount.com/keys/abc",
            "validAfterTime": "2020-05-05T13:34:26Z",
            "validBeforeTime": "9999-12-31T23:59:59Z",
            "keyAlgorithm": "KEY_ALG_RSA_2048"
        }"#;
        let key: Key = serde_json::from_str(json).unwrap();
        assert!(key.name.ends_with("/keys/abc"));
        assert_eq!(key.valid_after_time().unwrap().to_rfc3339(), "2020-05-05T13:34:26+00:00");
    }

    #[test]
    fn test_created_key_debug_redacts_material() {
        let created = CreatedKey::new(Key::new("k", "", ""), b"super secret".to_vec());
        let shown = format!("{:?}", created);
        assert!(shown.contains("<redacted>"));
        assert!(!shown.contains("super secret"));
    }
}
