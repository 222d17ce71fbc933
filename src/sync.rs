//! Rotate-then-publish for every configured destination.

use std::collections::BTreeMap;
use tracing::{error, info, warn};

use crate::error::{PublishError, RotationError, ValidationError};
use crate::keys::KeyDirectory;
use crate::policy::RetentionPolicy;
use crate::publish::{SecretPublisher, SecretStore, UpsertStatus};
use crate::rotation::RotationCoordinator;
use crate::validation::{validate_mapping, validate_secret_name, Mapping};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub secret_name: String,
    /// Stop at the first failed destination and skip the rest
    pub fail_fast: bool,
}

#[derive(Debug)]
pub enum SyncOutcome {
    Published(UpsertStatus),
    RotationFailed(RotationError),
    /// The key was rotated but its material never reached the store
    PublishFailed(PublishError),
    Skipped,
}

impl SyncOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SyncOutcome::RotationFailed(_) | SyncOutcome::PublishFailed(_)
        )
    }
}

#[derive(Debug)]
pub struct DestinationReport {
    pub mapping: Mapping,
    pub outcome: SyncOutcome,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub results: Vec<DestinationReport>,
}

impl SyncReport {
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_failure()).count()
    }

    pub fn is_success(&self) -> bool {
        self.results
            .iter()
            .all(|r| matches!(r.outcome, SyncOutcome::Published(_)))
    }
}

pub struct SyncRunner<'a> {
    coordinator: RotationCoordinator<'a>,
    publisher: SecretPublisher<'a>,
    options: SyncOptions,
}

impl<'a> SyncRunner<'a> {
    pub fn new(
        directory: &'a dyn KeyDirectory,
        store: &'a dyn SecretStore,
        policy: RetentionPolicy,
        options: SyncOptions,
    ) -> Self {
        Self {
            coordinator: RotationCoordinator::new(directory, policy),
            publisher: SecretPublisher::new(store),
            options,
        }
    }

    /// Validate the whole mapping, then sync each destination in turn.
    ///
    /// Nothing remote is touched when validation fails.
    pub async fn run(
        &self,
        repositories: &BTreeMap<String, String>,
    ) -> Result<SyncReport, ValidationError> {
        validate_secret_name(&self.options.secret_name)?;
        let mappings = validate_mapping(repositories)?;
        Ok(self.run_mappings(mappings).await)
    }

    /// Sync already validated mappings
    pub async fn run_mappings(&self, mappings: Vec<Mapping>) -> SyncReport {
        let mut report = SyncReport::default();
        let mut aborted = false;

        for mapping in mappings {
            let outcome = if aborted {
                warn!("Skipping {} after earlier failure", mapping.destination);
                SyncOutcome::Skipped
            } else {
                self.sync_one(&mapping).await
            };

            if outcome.is_failure() && self.options.fail_fast {
                aborted = true;
            }
            report.results.push(DestinationReport { mapping, outcome });
        }

        info!(
            "Synced {} destination(s), {} failed",
            report.results.len(),
            report.failures()
        );
        report
    }

    /// Rotate the destination's service account and publish the new key
    pub async fn sync_one(&self, mapping: &Mapping) -> SyncOutcome {
        let created = match self.coordinator.rotate(&mapping.service_account).await {
            Ok(created) => created,
            Err(e) => {
                error!("Failed to rotate {}: {}", mapping.service_account, e);
                return SyncOutcome::RotationFailed(e);
            }
        };

        // `created` is dropped, and its material zeroed, when this returns
        match self
            .publisher
            .publish(
                &mapping.destination,
                &self.options.secret_name,
                &created.private_material,
            )
            .await
        {
            Ok(status) => SyncOutcome::Published(status),
            Err(e) => {
                error!(
                    "Key {} was rotated but not published: {}",
                    created.key.name, e
                );
                SyncOutcome::PublishFailed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Key;
    use crate::publish::tests::FakeStore;
    use crate::publish::Destination;
    use crate::rotation::tests::FakeDirectory;

    const FOO: &str = "foo@proj-1.iam.gserviceaccount.com";
    const BAR: &str = "bar@proj-1.iam.gserviceaccount.com";

    fn repositories() -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("org/bar".to_string(), BAR.to_string());
        map.insert("org/foo".to_string(), FOO.to_string());
        map
    }

    fn options(fail_fast: bool) -> SyncOptions {
        SyncOptions {
            secret_name: "GOOGLE_APPLICATION_CREDENTIALS".to_string(),
            fail_fast,
        }
    }

    #[tokio::test]
    async fn test_sync_publishes_rotated_material() {
        let directory = FakeDirectory::with_keys(
            FOO,
            vec![Key::new("old", "2020-01-01T00:00:00Z", "2022-01-01T00:00:00Z")],
        );
        let store = FakeStore::new();
        let runner = SyncRunner::new(&directory, &store, RetentionPolicy::default(), options(false));

        let report = runner.run(&repositories()).await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.results.len(), 2);

        let foo = Destination::new("org", "foo");
        let published = store.open(&foo, "GOOGLE_APPLICATION_CREDENTIALS").unwrap();
        assert!(String::from_utf8(published).unwrap().starts_with("material-foo@"));
        assert_eq!(directory.names(FOO).len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_identity_fails_before_remote_calls() {
        let directory = FakeDirectory::default();
        let store = FakeStore::new();
        let runner = SyncRunner::new(&directory, &store, RetentionPolicy::default(), options(false));

        let mut map = repositories();
        map.insert("org/baz".to_string(), FOO.to_string());

        let err = runner.run(&map).await.unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateServiceAccount { .. }));
        assert!(directory.calls().is_empty());
        assert_eq!(*store.upserts.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_secret_name_fails_before_remote_calls() {
        let directory = FakeDirectory::default();
        let store = FakeStore::new();
        let mut options = options(false);
        options.secret_name = "MY SECRET".to_string();
        let runner = SyncRunner::new(&directory, &store, RetentionPolicy::default(), options);

        let err = runner.run(&repositories()).await.unwrap_err();
        assert_eq!(err, ValidationError::InvalidSecretName("MY SECRET".to_string()));
        assert!(directory.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failures_do_not_block_other_destinations() {
        let directory = FakeDirectory::default();
        directory.fail_list.lock().unwrap().insert(BAR.to_string());
        let store = FakeStore::new();
        let runner = SyncRunner::new(&directory, &store, RetentionPolicy::default(), options(false));

        let report = runner.run(&repositories()).await.unwrap();
        assert_eq!(report.failures(), 1);
        assert!(matches!(report.results[0].outcome, SyncOutcome::RotationFailed(_)));
        assert!(matches!(report.results[1].outcome, SyncOutcome::Published(UpsertStatus::Created)));
    }

    #[tokio::test]
    async fn test_fail_fast_skips_remaining() {
        let directory = FakeDirectory::default();
        directory.fail_create.lock().unwrap().insert(BAR.to_string());
        let store = FakeStore::new();
        let runner = SyncRunner::new(&directory, &store, RetentionPolicy::default(), options(true));

        let report = runner.run(&repositories()).await.unwrap();
        assert!(!report.is_success());
        assert!(matches!(report.results[1].outcome, SyncOutcome::Skipped));
        assert!(!directory.calls().iter().any(|c| c.contains(FOO)));
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_rotation() {
        let directory = FakeDirectory::default();
        let store = FakeStore::new();
        store.fail_upsert.lock().unwrap().insert("org/bar".to_string());
        let runner = SyncRunner::new(&directory, &store, RetentionPolicy::default(), options(false));

        let report = runner.run(&repositories()).await.unwrap();
        assert!(matches!(report.results[0].outcome, SyncOutcome::PublishFailed(_)));
        assert_eq!(directory.names(BAR).len(), 1);
        assert!(matches!(report.results[1].outcome, SyncOutcome::Published(_)));
    }
}
