//! Error types shared by the key directory, the publisher and the run orchestration.

use reqwest::{Response, StatusCode};
use thiserror::Error;

use crate::rotation::RotationState;

/// Failure reported by a remote collaborator (IAM or the secret store).
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network failure, 5xx or rate limiting. Safe to retry the whole identity.
    #[error("transient failure during {operation}: {message}")]
    Transient { operation: String, message: String },

    /// Authentication or authorization failure. Not retryable.
    #[error("permission denied during {operation}: {message}")]
    Permission { operation: String, message: String },

    /// The addressed resource does not exist.
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// Any other non-success status.
    #[error("{operation} rejected with status {status}: {message}")]
    Rejected {
        operation: String,
        status: u16,
        message: String,
    },

    /// The remote answered with a body we could not interpret.
    #[error("malformed response during {operation}: {message}")]
    Malformed { operation: String, message: String },
}

impl ApiError {
    /// Map a non-success HTTP status onto the error taxonomy.
    pub fn from_status(operation: &str, resource: &str, status: StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => ApiError::Permission {
                operation: operation.to_string(),
                message: body,
            },
            404 => ApiError::NotFound {
                resource: resource.to_string(),
            },
            429 | 500..=599 => ApiError::Transient {
                operation: operation.to_string(),
                message: format!("status {}: {}", status, body),
            },
            code => ApiError::Rejected {
                operation: operation.to_string(),
                status: code,
                message: body,
            },
        }
    }

    /// Pass a successful response through, otherwise read its body into an error.
    pub(crate) async fn check(
        operation: &str,
        resource: &str,
        response: Response,
    ) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(operation, resource, status, body))
    }

    /// Wrap a transport level failure (connect, timeout, TLS).
    pub fn transport(operation: &str, err: reqwest::Error) -> Self {
        ApiError::Transient {
            operation: operation.to_string(),
            message: err.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Transient { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }
}

/// Failure while sealing a secret for a recipient.
#[derive(Debug, Error)]
pub enum SealError {
    #[error("invalid public key: expected {expected} bytes, got {actual}")]
    InvalidKey { expected: usize, actual: usize },

    #[error("invalid public key encoding: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("sealing the secret failed")]
    Encryption,
}

/// A rotation that stopped before a new key was handed back.
#[derive(Debug, Error)]
#[error("rotation of {identity} failed while {state}: {source}")]
pub struct RotationError {
    pub identity: String,
    pub state: RotationState,
    #[source]
    pub source: ApiError,
}

impl RotationError {
    pub fn is_retryable(&self) -> bool {
        self.source.is_retryable()
    }
}

/// A publish that did not reach the destination.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publishing to {destination} failed: {source}")]
    Api {
        destination: String,
        #[source]
        source: ApiError,
    },

    #[error("cannot seal secret for {destination}: {source}")]
    Seal {
        destination: String,
        #[source]
        source: SealError,
    },
}

/// Problems with the destination to identity mapping, detected before any remote call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no repositories configured")]
    EmptyMapping,

    #[error("invalid repository '{0}': expected owner/repo")]
    InvalidRepository(String),

    #[error("repository {0} is mapped more than once")]
    DuplicateRepository(String),

    #[error("invalid service account email '{0}'")]
    InvalidServiceAccount(String),

    #[error("invalid secret name '{0}': use letters, digits and underscores, not starting with a digit or GITHUB_")]
    InvalidSecretName(String),

    #[error("service account {account} is mapped from more than one repository: {}", .repositories.join(", "))]
    DuplicateServiceAccount {
        account: String,
        repositories: Vec<String>,
    },

    #[error("retention ceiling must be at least 1")]
    InvalidCeiling,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = ApiError::from_status("list keys", "sa", StatusCode::FORBIDDEN, "nope".into());
        assert!(matches!(err, ApiError::Permission { .. }));
        assert!(!err.is_retryable());

        let err = ApiError::from_status("delete key", "k1", StatusCode::NOT_FOUND, String::new());
        assert!(err.is_not_found());

        let err = ApiError::from_status("list keys", "sa", StatusCode::BAD_GATEWAY, String::new());
        assert!(err.is_retryable());

        let err = ApiError::from_status("list keys", "sa", StatusCode::TOO_MANY_REQUESTS, String::new());
        assert!(err.is_retryable());

        let err = ApiError::from_status("create key", "sa", StatusCode::BAD_REQUEST, "bad".into());
        assert!(matches!(err, ApiError::Rejected { status: 400, .. }));
    }

    async fn check_status(code: usize, body: &str) -> Result<Response, ApiError> {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/thing")
            .with_status(code)
            .with_body(body)
            .create_async()
            .await;

        let response = reqwest::get(format!("{}/thing", server.url())).await.unwrap();
        ApiError::check("get thing", "thing", response).await
    }

    #[tokio::test]
    async fn test_check_passes_success_through() {
        let response = check_status(200, "ok").await.unwrap();
        assert_eq!(response.text().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_check_carries_error_body() {
        let err = check_status(409, "already exists").await.unwrap_err();
        match err {
            ApiError::Rejected { operation, status, message } => {
                assert_eq!(operation, "get thing");
                assert_eq!(status, 409);
                assert_eq!(message, "already exists");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = check_status(404, "").await.unwrap_err();
        assert_eq!(err.to_string(), "thing not found");
    }

    #[test]
    fn test_duplicate_message_lists_repositories() {
        let err = ValidationError::DuplicateServiceAccount {
            account: "a@p.iam.gserviceaccount.com".into(),
            repositories: vec!["o/bar".into(), "o/foo".into()],
        };
        assert_eq!(
            err.to_string(),
            "service account a@p.iam.gserviceaccount.com is mapped from more than one repository: o/bar, o/foo"
        );
    }
}
