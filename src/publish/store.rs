use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ApiError, ValidationError};

/// A repository that receives the rotated secret
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Destination {
    pub owner: String,
    pub repo: String,
}

impl Destination {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for Destination {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidRepository(s.to_string());
        let (owner, repo) = s.trim().split_once('/').ok_or_else(invalid)?;
        let valid_part = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !valid_part(owner) || !valid_part(repo) {
            return Err(invalid());
        }
        Ok(Self::new(owner, repo))
    }
}

/// The store's current sealing key
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorePublicKey {
    pub key_id: String,
    /// Base64 encoded X25519 public key
    pub key: String,
}

/// Wire payload for an upsert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncryptedSecret {
    #[serde(skip)]
    pub name: String,
    pub key_id: String,
    /// Base64 encoded sealed box
    pub encrypted_value: String,
}

/// Result of a create-or-update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStatus {
    Created,
    Updated,
}

impl fmt::Display for UpsertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpsertStatus::Created => write!(f, "201 Created"),
            UpsertStatus::Updated => write!(f, "204 No Content"),
        }
    }
}

/// Trait for secret stores that accept sealed values (GitHub Actions, etc.)
#[async_trait::async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the key secrets must be sealed for; may change between calls
    async fn get_public_key(&self, destination: &Destination) -> Result<StorePublicKey, ApiError>;

    /// Create or replace a secret atomically
    async fn upsert_secret(
        &self,
        destination: &Destination,
        secret: &EncryptedSecret,
    ) -> Result<UpsertStatus, ApiError>;

    /// Get the store name for display purposes
    fn store_type(&self) -> &'static str;
}
