use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::ValidationError;
use crate::keys::{SentinelYear, DEFAULT_SYSTEM_KEY_YEAR};
use crate::policy::{RetentionPolicy, DEFAULT_MAX_KEYS};
use crate::validation::{self, Mapping};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
    /// `owner/repo` → service account email
    #[serde(default)]
    pub repositories: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_google_api_url")]
    pub api_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationConfig {
    #[serde(default = "default_max_keys")]
    pub max_keys: usize,
    #[serde(default = "default_secret_name")]
    pub secret_name: String,
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default = "default_system_key_year")]
    pub system_key_year: i32,
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_google_api_url() -> String {
    "https://iam.googleapis.com".to_string()
}

fn default_max_keys() -> usize {
    DEFAULT_MAX_KEYS
}

fn default_secret_name() -> String {
    "GOOGLE_APPLICATION_CREDENTIALS".to_string()
}

fn default_system_key_year() -> i32 {
    DEFAULT_SYSTEM_KEY_YEAR
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: default_github_api_url(),
        }
    }
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            api_url: default_google_api_url(),
        }
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            max_keys: default_max_keys(),
            secret_name: default_secret_name(),
            fail_fast: false,
            system_key_year: default_system_key_year(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        toml::from_str(&contents).context("Failed to parse config file")
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let github = GitHubConfig {
            token: std::env::var("GITHUB_AUTH_TOKEN").unwrap_or_default(),
            api_url: std::env::var("GITHUB_API_URL").unwrap_or_else(|_| default_github_api_url()),
        };

        let google = GoogleConfig {
            access_token: std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN").unwrap_or_default(),
            api_url: std::env::var("GOOGLE_IAM_API_URL")
                .unwrap_or_else(|_| default_google_api_url()),
        };

        let rotation = RotationConfig {
            max_keys: std::env::var("ROTATION_MAX_KEYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_KEYS),
            secret_name: std::env::var("SECRET_NAME").unwrap_or_else(|_| default_secret_name()),
            fail_fast: std::env::var("ROTATION_FAIL_FAST")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(false),
            system_key_year: DEFAULT_SYSTEM_KEY_YEAR,
        };

        let repositories = match std::env::var("REPOSITORY_MAP") {
            Ok(value) => validation::parse_repository_map(&value)
                .context("Failed to parse REPOSITORY_MAP")?,
            Err(_) => BTreeMap::new(),
        };

        Ok(Self {
            github,
            google,
            rotation,
            repositories,
        })
    }

    /// Create a sample configuration file
    pub fn create_sample<P: AsRef<Path>>(path: P) -> Result<()> {
        let mut repositories = BTreeMap::new();
        repositories.insert(
            "your-org/your-repo".to_string(),
            "github-sync@your-project.iam.gserviceaccount.com".to_string(),
        );

        let sample = Self {
            github: GitHubConfig {
                token: "your-github-token-here".to_string(),
                ..GitHubConfig::default()
            },
            google: GoogleConfig {
                access_token: "your-google-access-token-here".to_string(),
                ..GoogleConfig::default()
            },
            rotation: RotationConfig::default(),
            repositories,
        };

        let toml_string =
            toml::to_string_pretty(&sample).context("Failed to serialize sample config")?;
        fs::write(path.as_ref(), toml_string)
            .with_context(|| format!("Failed to write sample config to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Validated destinations in repository order
    pub fn mappings(&self) -> Result<Vec<Mapping>, ValidationError> {
        validation::validate_mapping(&self.repositories)
    }

    /// Repository secret name, checked against GitHub's naming rules
    pub fn secret_name(&self) -> Result<&str, ValidationError> {
        validation::validate_secret_name(&self.rotation.secret_name)?;
        Ok(&self.rotation.secret_name)
    }

    pub fn retention_policy(&self) -> Result<RetentionPolicy, ValidationError> {
        if self.rotation.max_keys == 0 {
            return Err(ValidationError::InvalidCeiling);
        }
        Ok(RetentionPolicy::with_rule(
            self.rotation.max_keys,
            SentinelYear(self.rotation.system_key_year),
        ))
    }
}
