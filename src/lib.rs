//! GCP Key Sync Library
//!
//! Rotates Google Cloud service account keys and publishes the new key material
//! as sealed GitHub Actions secrets, without writing it to disk.

pub mod config;
pub mod error;
pub mod keys;
pub mod policy;
pub mod publish;
pub mod rotation;
pub mod seal;
pub mod sync;
pub mod validation;

pub use config::Config;
pub use error::{ApiError, PublishError, RotationError, SealError, ValidationError};
pub use keys::{IamClient, KeyDirectory};
pub use policy::RetentionPolicy;
pub use publish::{GitHubClient, SecretPublisher, SecretStore};
pub use rotation::RotationCoordinator;
pub use sync::{SyncReport, SyncRunner};
