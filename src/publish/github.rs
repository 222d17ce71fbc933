use reqwest::{Client, StatusCode};
use tracing::{debug, info};

use super::store::{Destination, EncryptedSecret, SecretStore, StorePublicKey, UpsertStatus};
use crate::error::ApiError;

const USER_AGENT: &str = concat!("gcp-key-sync/", env!("CARGO_PKG_VERSION"));

/// GitHub Actions repository secrets client
#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    api_url: String,
    token: String,
}

impl GitHubClient {
    /// Create a new GitHub client
    pub fn new(api_url: String, token: String) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ApiError::transport("build http client", e))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub(crate) fn public_key_url(&self, destination: &Destination) -> String {
        format!(
            "{}/repos/{}/{}/actions/secrets/public-key",
            self.api_url, destination.owner, destination.repo
        )
    }

    pub(crate) fn secret_url(&self, destination: &Destination, name: &str) -> String {
        format!(
            "{}/repos/{}/{}/actions/secrets/{}",
            self.api_url, destination.owner, destination.repo, name
        )
    }
}

#[async_trait::async_trait]
impl SecretStore for GitHubClient {
    async fn get_public_key(&self, destination: &Destination) -> Result<StorePublicKey, ApiError> {
        let operation = "get public key";
        let url = self.public_key_url(destination);
        debug!("Fetching public key from: {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| ApiError::transport(operation, e))?;
        let response = ApiError::check(operation, &destination.to_string(), response).await?;

        response.json().await.map_err(|e| ApiError::Malformed {
            operation: operation.to_string(),
            message: e.to_string(),
        })
    }

    async fn upsert_secret(
        &self,
        destination: &Destination,
        secret: &EncryptedSecret,
    ) -> Result<UpsertStatus, ApiError> {
        let operation = "create or update secret";
        let url = self.secret_url(destination, &secret.name);
        debug!("Writing secret to: {}", url);

        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(secret)
            .send()
            .await
            .map_err(|e| ApiError::transport(operation, e))?;
        let response = ApiError::check(operation, &destination.to_string(), response).await?;

        let status = match response.status() {
            StatusCode::CREATED => UpsertStatus::Created,
            _ => UpsertStatus::Updated,
        };
        info!("Wrote secret {} to {}", secret.name, destination);
        Ok(status)
    }

    fn store_type(&self) -> &'static str {
        "GitHub Actions"
    }
}
