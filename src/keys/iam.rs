use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::directory::KeyDirectory;
use super::key::{CreatedKey, Key};
use crate::error::ApiError;

/// Google Cloud IAM client for service account keys
#[derive(Clone)]
pub struct IamClient {
    client: Client,
    api_url: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ListKeysResponse {
    #[serde(default)]
    keys: Vec<Key>,
}

#[derive(Debug, Deserialize)]
struct CreateKeyResponse {
    #[serde(flatten)]
    key: Key,
    #[serde(rename = "privateKeyData")]
    private_key_data: String,
}

impl IamClient {
    /// Create a new IAM client
    pub fn new(api_url: String, access_token: String) -> Result<Self, ApiError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ApiError::transport("build http client", e))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            access_token,
        })
    }

    pub(crate) fn keys_url(&self, service_account: &str) -> String {
        format!(
            "{}/v1/projects/-/serviceAccounts/{}/keys",
            self.api_url, service_account
        )
    }

    pub(crate) fn key_url(&self, key_name: &str) -> String {
        format!("{}/v1/{}", self.api_url, key_name.trim_start_matches('/'))
    }
}

/// The provider returns base64 key material; tolerate both alphabets.
fn decode_private_key_data(data: &str) -> Result<Vec<u8>, ApiError> {
    STANDARD
        .decode(data)
        .or_else(|_| URL_SAFE.decode(data))
        .map_err(|e| ApiError::Malformed {
            operation: "create key".to_string(),
            message: format!("privateKeyData is not base64: {}", e),
        })
}

#[async_trait::async_trait]
impl KeyDirectory for IamClient {
    async fn list_keys(&self, identity: &str) -> Result<Vec<Key>, ApiError> {
        let operation = "list keys";
        let url = self.keys_url(identity);
        debug!("Listing keys from: {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| ApiError::transport(operation, e))?;
        let response = ApiError::check(operation, identity, response).await?;

        let body: ListKeysResponse = response.json().await.map_err(|e| ApiError::Malformed {
            operation: operation.to_string(),
            message: e.to_string(),
        })?;

        for key in &body.keys {
            debug!("Listing key: {}", key.name);
        }
        Ok(body.keys)
    }

    async fn create_key(&self, identity: &str) -> Result<CreatedKey, ApiError> {
        let operation = "create key";
        let url = self.keys_url(identity);
        debug!("Creating key at: {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| ApiError::transport(operation, e))?;
        let response = ApiError::check(operation, identity, response).await?;

        let body: CreateKeyResponse = response.json().await.map_err(|e| ApiError::Malformed {
            operation: operation.to_string(),
            message: e.to_string(),
        })?;
        let material = decode_private_key_data(&body.private_key_data)?;

        info!("Created key: {}", body.key.name);
        Ok(CreatedKey::new(body.key, material))
    }

    async fn delete_key(&self, key_name: &str) -> Result<(), ApiError> {
        let operation = "delete key";
        let url = self.key_url(key_name);
        debug!("Deleting key at: {}", url);

        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| ApiError::transport(operation, e))?;
        ApiError::check(operation, key_name, response).await?;

        info!("Deleted key: {}", key_name);
        Ok(())
    }

    fn provider_type(&self) -> &'static str {
        "Google Cloud IAM"
    }
}
