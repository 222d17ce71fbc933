//! Secret publishing
//!
//! This module provides the secret store abstraction, the GitHub Actions store
//! implementation and the publisher that seals a plaintext for a destination
//! before upserting it.

mod github;
mod store;

pub use github::GitHubClient;
pub use store::{Destination, EncryptedSecret, SecretStore, StorePublicKey, UpsertStatus};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, info};

use crate::error::{PublishError, SealError};
use crate::seal;

/// Seals plaintexts for a destination and writes them to its store
pub struct SecretPublisher<'a> {
    store: &'a dyn SecretStore,
}

impl<'a> SecretPublisher<'a> {
    pub fn new(store: &'a dyn SecretStore) -> Self {
        Self { store }
    }

    /// Fetch the destination's current public key, seal `plaintext` for it and
    /// create or update `secret_name`.
    ///
    /// Nothing is written locally. Calling this again with the same plaintext
    /// replaces the stored value with an equivalent one.
    pub async fn publish(
        &self,
        destination: &Destination,
        secret_name: &str,
        plaintext: &[u8],
    ) -> Result<UpsertStatus, PublishError> {
        info!(
            "Publishing {} to {} ({})",
            secret_name,
            destination,
            self.store.store_type()
        );

        let public_key = self
            .store
            .get_public_key(destination)
            .await
            .map_err(|source| PublishError::Api {
                destination: destination.to_string(),
                source,
            })?;
        debug!("Using public key {} for {}", public_key.key_id, destination);

        let seal_error = |source: SealError| PublishError::Seal {
            destination: destination.to_string(),
            source,
        };
        let recipient = seal::decode_public_key(&public_key.key).map_err(seal_error)?;
        let sealed = seal::seal(plaintext, &recipient).map_err(seal_error)?;

        let secret = EncryptedSecret {
            name: secret_name.to_string(),
            key_id: public_key.key_id,
            encrypted_value: STANDARD.encode(sealed),
        };

        let status = self
            .store
            .upsert_secret(destination, &secret)
            .await
            .map_err(|source| PublishError::Api {
                destination: destination.to_string(),
                source,
            })?;

        info!("Secret {} on {}: {}", secret_name, destination, status);
        Ok(status)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ApiError;
    use crypto_box::SecretKey;
    use rand::rngs::OsRng;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// In-memory secret store holding one recipient key pair per store
    pub(crate) struct FakeStore {
        secret_key: SecretKey,
        pub public_key_override: Mutex<Option<String>>,
        pub secrets: Mutex<HashMap<(String, String), EncryptedSecret>>,
        pub fail_upsert: Mutex<HashSet<String>>,
        pub upserts: Mutex<usize>,
    }

    impl FakeStore {
        pub fn new() -> Self {
            Self {
                secret_key: SecretKey::generate(&mut OsRng),
                public_key_override: Mutex::new(None),
                secrets: Mutex::new(HashMap::new()),
                fail_upsert: Mutex::new(HashSet::new()),
                upserts: Mutex::new(0),
            }
        }

        /// Decrypt what is stored, as the store's owner would
        pub fn open(&self, destination: &Destination, name: &str) -> Option<Vec<u8>> {
            let secrets = self.secrets.lock().unwrap();
            let secret = secrets.get(&(destination.to_string(), name.to_string()))?;
            let sealed = STANDARD.decode(&secret.encrypted_value).ok()?;
            self.secret_key.unseal(&sealed).ok()
        }
    }

    #[async_trait::async_trait]
    impl SecretStore for FakeStore {
        async fn get_public_key(&self, _destination: &Destination) -> Result<StorePublicKey, ApiError> {
            let key = self
                .public_key_override
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| STANDARD.encode(self.secret_key.public_key().as_bytes()));
            Ok(StorePublicKey {
                key_id: "key-1".to_string(),
                key,
            })
        }

        async fn upsert_secret(
            &self,
            destination: &Destination,
            secret: &EncryptedSecret,
        ) -> Result<UpsertStatus, ApiError> {
            if self.fail_upsert.lock().unwrap().contains(&destination.to_string()) {
                return Err(ApiError::Transient {
                    operation: "upsert secret".into(),
                    message: "timeout".into(),
                });
            }
            *self.upserts.lock().unwrap() += 1;
            let previous = self
                .secrets
                .lock()
                .unwrap()
                .insert((destination.to_string(), secret.name.clone()), secret.clone());
            Ok(if previous.is_some() {
                UpsertStatus::Updated
            } else {
                UpsertStatus::Created
            })
        }

        fn store_type(&self) -> &'static str {
            "fake"
        }
    }

    fn destination() -> Destination {
        "shelmangroup/github-secrets-sync".parse().unwrap()
    }

    #[tokio::test]
    async fn test_publish_seals_for_store_key() {
        let store = FakeStore::new();
        let publisher = SecretPublisher::new(&store);

        let status = publisher
            .publish(&destination(), "GOOGLE_APPLICATION_CREDENTIALS", b"{\"k\":1}")
            .await
            .unwrap();

        assert_eq!(status, UpsertStatus::Created);
        assert_eq!(
            store.open(&destination(), "GOOGLE_APPLICATION_CREDENTIALS").unwrap(),
            b"{\"k\":1}"
        );
        let secrets = store.secrets.lock().unwrap();
        let stored = secrets.values().next().unwrap();
        assert_eq!(stored.key_id, "key-1");
    }

    #[tokio::test]
    async fn test_publish_twice_is_idempotent() {
        let store = FakeStore::new();
        let publisher = SecretPublisher::new(&store);
        let dest = destination();

        publisher.publish(&dest, "CREDS", b"same").await.unwrap();
        let first = store.open(&dest, "CREDS").unwrap();
        let status = publisher.publish(&dest, "CREDS", b"same").await.unwrap();
        let second = store.open(&dest, "CREDS").unwrap();

        assert_eq!(status, UpsertStatus::Updated);
        assert_eq!(first, second);
        assert_eq!(store.secrets.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_rejects_malformed_public_key() {
        let store = FakeStore::new();
        *store.public_key_override.lock().unwrap() = Some(STANDARD.encode([1u8; 16]));
        let publisher = SecretPublisher::new(&store);

        let err = publisher
            .publish(&destination(), "CREDS", b"x")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PublishError::Seal {
                source: SealError::InvalidKey { actual: 16, .. },
                ..
            }
        ));
        assert_eq!(*store.upserts.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_publish_failure_names_destination() {
        let store = FakeStore::new();
        store
            .fail_upsert
            .lock()
            .unwrap()
            .insert("shelmangroup/github-secrets-sync".to_string());
        let publisher = SecretPublisher::new(&store);

        let err = publisher
            .publish(&destination(), "CREDS", b"x")
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("publishing to shelmangroup/github-secrets-sync failed"));
    }
}
