//! Retention policy
//!
//! Decides which keys of an identity may be deleted before a new one is created.

use tracing::debug;

use crate::keys::{classify, ClassifiedKey, Key, SentinelYear, SystemKeyRule};

/// Default number of keys an identity may carry
pub const DEFAULT_MAX_KEYS: usize = 3;

pub struct RetentionPolicy {
    max_keys: usize,
    rule: Box<dyn SystemKeyRule>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_KEYS)
    }
}

impl RetentionPolicy {
    /// Policy using the default year-9999 system key rule
    pub fn new(max_keys: usize) -> Self {
        Self::with_rule(max_keys, SentinelYear::default())
    }

    pub fn with_rule(max_keys: usize, rule: impl SystemKeyRule + 'static) -> Self {
        Self {
            max_keys,
            rule: Box::new(rule),
        }
    }

    pub fn max_keys(&self) -> usize {
        self.max_keys
    }

    pub fn classify(&self, keys: &[Key]) -> Vec<ClassifiedKey> {
        classify(keys, self.rule.as_ref())
    }

    /// Keys to delete, oldest first.
    ///
    /// Nothing is deleted while the listing holds at most `max_keys` keys. Beyond
    /// that, `len - max_keys` user-managed keys are picked in ascending
    /// `validAfter` order; equal timestamps keep listing order and unparsable
    /// timestamps sort first. System-managed keys are never candidates.
    pub fn keys_to_delete(&self, keys: &[Key]) -> Vec<Key> {
        if keys.len() <= self.max_keys {
            return Vec::new();
        }
        let excess = keys.len() - self.max_keys;

        let mut candidates: Vec<Key> = self
            .classify(keys)
            .into_iter()
            .filter(|classified| {
                if classified.is_system_managed() {
                    debug!("Found system managed key: {}", classified.key.name);
                    return false;
                }
                true
            })
            .map(|classified| classified.key)
            .collect();

        // sort_by_key is stable
        candidates.sort_by_key(|key| key.valid_after_time());
        candidates.truncate(excess);
        candidates
    }
}
