//! Validation of the repository to service account mapping
//!
//! Runs before any remote call: a service account shared by two repositories
//! would have its keys rotated out from under one of them.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use crate::error::ValidationError;
use crate::publish::Destination;

/// One destination and the identity whose key it receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub destination: Destination,
    pub service_account: String,
}

fn service_account_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9-]+@[a-z0-9-]+\.iam\.gserviceaccount\.com$")
            .expect("service account pattern is valid")
    })
}

fn secret_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("secret name pattern is valid")
    })
}

/// Check that `email` names a Google service account
pub fn validate_service_account_email(email: &str) -> bool {
    service_account_pattern().is_match(email)
}

/// Lowercase and validate a service account email.
///
/// Google treats these addresses case-insensitively, so `Deploy@...` and
/// `deploy@...` are the same credential.
pub fn normalize_service_account(email: &str) -> Result<String, ValidationError> {
    let normalized = email.trim().to_ascii_lowercase();
    if !validate_service_account_email(&normalized) {
        return Err(ValidationError::InvalidServiceAccount(email.to_string()));
    }
    Ok(normalized)
}

/// Check a repository secret name against GitHub's naming rules
pub fn validate_secret_name(name: &str) -> Result<(), ValidationError> {
    if !secret_name_pattern().is_match(name) || name.to_ascii_uppercase().starts_with("GITHUB_") {
        return Err(ValidationError::InvalidSecretName(name.to_string()));
    }
    Ok(())
}

/// Validate a `owner/repo` → service account map and return it in repository order
pub fn validate_mapping(
    repositories: &BTreeMap<String, String>,
) -> Result<Vec<Mapping>, ValidationError> {
    if repositories.is_empty() {
        return Err(ValidationError::EmptyMapping);
    }

    let mut seen_repositories = BTreeSet::new();
    let mut by_account: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut mappings = Vec::with_capacity(repositories.len());

    for (repository, account) in repositories {
        let destination: Destination = repository.parse()?;
        if !seen_repositories.insert(destination.to_string().to_ascii_lowercase()) {
            return Err(ValidationError::DuplicateRepository(repository.clone()));
        }
        let account = normalize_service_account(account)?;
        by_account
            .entry(account.clone())
            .or_default()
            .push(destination.to_string());
        mappings.push(Mapping {
            destination,
            service_account: account,
        });
    }

    if let Some((account, repositories)) = by_account.into_iter().find(|(_, repos)| repos.len() > 1) {
        return Err(ValidationError::DuplicateServiceAccount {
            account,
            repositories,
        });
    }

    Ok(mappings)
}

/// Add `entries` to `target`, refusing any repository that is already mapped.
///
/// GitHub repository names are case-insensitive, so `Org/App` and `org/app`
/// collide.
pub fn merge_repository_map(
    target: &mut BTreeMap<String, String>,
    entries: BTreeMap<String, String>,
) -> Result<(), ValidationError> {
    for (repository, account) in entries {
        insert_repository(target, repository, account)?;
    }
    Ok(())
}

fn insert_repository(
    target: &mut BTreeMap<String, String>,
    repository: String,
    account: String,
) -> Result<(), ValidationError> {
    if target.keys().any(|existing| existing.eq_ignore_ascii_case(&repository)) {
        return Err(ValidationError::DuplicateRepository(repository));
    }
    target.insert(repository, account);
    Ok(())
}

/// Parse `owner/repo=email,owner/repo=email`
pub fn parse_repository_map(input: &str) -> Result<BTreeMap<String, String>, ValidationError> {
    let mut map = BTreeMap::new();
    for entry in input.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (repository, account) = entry
            .split_once('=')
            .ok_or_else(|| ValidationError::InvalidRepository(entry.to_string()))?;
        insert_repository(
            &mut map,
            repository.trim().to_string(),
            account.trim().to_string(),
        )?;
    }
    Ok(map)
}
