use crate::error::ApiError;

use super::key::{CreatedKey, Key};

/// Trait for credential providers that hold keys bound to an identity
#[async_trait::async_trait]
pub trait KeyDirectory: Send + Sync {
    /// List every key currently bound to the identity
    async fn list_keys(&self, identity: &str) -> Result<Vec<Key>, ApiError>;

    /// Create a new key; the private material is only ever returned here
    async fn create_key(&self, identity: &str) -> Result<CreatedKey, ApiError>;

    /// Delete a key by its full name
    ///
    /// Returns `ApiError::NotFound` when the key is already gone.
    async fn delete_key(&self, key_name: &str) -> Result<(), ApiError>;

    /// Get the provider name for display purposes
    fn provider_type(&self) -> &'static str;
}
