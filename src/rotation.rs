use std::fmt;
use tracing::{debug, info, warn};

use crate::error::{ApiError, RotationError};
use crate::keys::{ClassifiedKey, CreatedKey, Key, KeyDirectory};
use crate::policy::RetentionPolicy;

/// Progress of a single identity's rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationState {
    Listing,
    Deleting,
    Creating,
    Done,
    Failed,
}

impl fmt::Display for RotationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RotationState::Listing => "listing keys",
            RotationState::Deleting => "deleting keys",
            RotationState::Creating => "creating key",
            RotationState::Done => "done",
            RotationState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a rotation would do, computed without touching the provider
#[derive(Debug, Clone)]
pub struct RotationPlan {
    pub identity: String,
    pub keys: Vec<ClassifiedKey>,
    pub to_delete: Vec<Key>,
}

/// Runs list, delete, create against a key directory for one identity at a time
pub struct RotationCoordinator<'a> {
    directory: &'a dyn KeyDirectory,
    policy: RetentionPolicy,
}

impl<'a> RotationCoordinator<'a> {
    pub fn new(directory: &'a dyn KeyDirectory, policy: RetentionPolicy) -> Self {
        Self { directory, policy }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// List the identity's keys and compute the retention decision
    pub async fn plan(&self, identity: &str) -> Result<RotationPlan, RotationError> {
        let mut state = RotationState::Listing;
        self.list(identity, &mut state).await
    }

    async fn list(
        &self,
        identity: &str,
        state: &mut RotationState,
    ) -> Result<RotationPlan, RotationError> {
        let keys = self
            .directory
            .list_keys(identity)
            .await
            .map_err(|e| fail(identity, state, e))?;

        Ok(RotationPlan {
            identity: identity.to_string(),
            to_delete: self.policy.keys_to_delete(&keys),
            keys: self.policy.classify(&keys),
        })
    }

    /// Delete keys beyond the retention ceiling, then create exactly one new key.
    ///
    /// A key that is already gone counts as deleted. Any other failure stops the
    /// rotation before a key is created; the identity keeps at least the
    /// ceiling's worth of keys in that case.
    pub async fn rotate(&self, identity: &str) -> Result<CreatedKey, RotationError> {
        info!(
            "Rotating key for {} ({})",
            identity,
            self.directory.provider_type()
        );

        let mut state = RotationState::Listing;
        let plan = self.list(identity, &mut state).await?;
        debug!(
            "{} has {} key(s), {} to delete",
            identity,
            plan.keys.len(),
            plan.to_delete.len()
        );

        transition(identity, &mut state, RotationState::Deleting);
        for key in &plan.to_delete {
            debug!(
                "Deleting key: ({}) ValidAfterTime: ({}) ValidBeforeTime: ({})",
                key.name, key.valid_after, key.valid_before
            );
            match self.directory.delete_key(&key.name).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!("Key {} already deleted", key.name);
                }
                Err(e) => return Err(fail(identity, &mut state, e)),
            }
        }

        transition(identity, &mut state, RotationState::Creating);
        let created = self
            .directory
            .create_key(identity)
            .await
            .map_err(|e| fail(identity, &mut state, e))?;

        transition(identity, &mut state, RotationState::Done);
        info!("Rotated key for {}: {}", identity, created.key.name);
        Ok(created)
    }
}

fn transition(identity: &str, state: &mut RotationState, next: RotationState) {
    debug!("{}: {} -> {}", identity, state, next);
    *state = next;
}

/// Move to `Failed`; the error keeps the step that was running
fn fail(identity: &str, state: &mut RotationState, source: ApiError) -> RotationError {
    let failed_in = *state;
    warn!("{}: {} ({})", identity, failed_in, source);
    transition(identity, state, RotationState::Failed);
    RotationError {
        identity: identity.to_string(),
        state: failed_in,
        source,
    }
}
