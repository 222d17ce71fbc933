//! Service account keys
//!
//! This module provides the key model, the system-managed classification and the
//! directory abstraction used to list, create and delete keys for an identity.

mod directory;
mod iam;
mod key;

pub use directory::KeyDirectory;
pub use iam::IamClient;
pub use key::{
    classify, ClassifiedKey, CreatedKey, Key, KeyClassification, SentinelYear, SystemKeyRule,
    DEFAULT_SYSTEM_KEY_YEAR,
};
