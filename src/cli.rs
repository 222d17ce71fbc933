//! CLI parsing and command execution
//!
//! This module handles command-line argument parsing and routes commands to the appropriate handlers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use gcp_key_sync::config::Config;
use gcp_key_sync::keys::IamClient;
use gcp_key_sync::publish::GitHubClient;
use gcp_key_sync::rotation::RotationCoordinator;
use gcp_key_sync::sync::{SyncOptions, SyncOutcome, SyncRunner};
use gcp_key_sync::validation;

#[derive(Parser)]
#[command(name = "gks")]
#[command(about = "Rotate Google Cloud service account keys into GitHub Actions secrets", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "GKS_CONFIG")]
    pub config: Option<PathBuf>,

    /// GitHub token (overrides config file)
    #[arg(long, env = "GITHUB_AUTH_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Google OAuth access token (overrides config file)
    #[arg(long, env = "GOOGLE_OAUTH_ACCESS_TOKEN", hide_env_values = true)]
    pub google_token: Option<String>,

    /// Name of the repository secret to write
    #[arg(long)]
    pub secret_name: Option<String>,

    /// Maximum number of keys kept per service account
    #[arg(long)]
    pub max_keys: Option<usize>,

    /// Repository to service account mapping, repeatable
    #[arg(long = "repo", value_name = "OWNER/REPO=EMAIL")]
    pub repos: Vec<String>,

    /// Stop at the first failed repository
    #[arg(long)]
    pub fail_fast: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a sample configuration file
    Init {
        /// Output path for the configuration file
        #[arg(short, long, default_value = "gks-config.toml")]
        output: PathBuf,
    },

    /// Validate the repository mapping without calling any API
    Validate,

    /// List the keys of a service account
    Keys {
        /// Service account email
        service_account: String,
    },

    /// Show which keys a sync would delete
    Plan,

    /// Rotate every mapped service account and publish its new key
    Sync,
}

/// Execute a CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    // Handle init command separately as it doesn't need config
    if let Commands::Init { output } = cli.command {
        Config::create_sample(&output)
            .with_context(|| format!("Failed to create sample config at {:?}", output))?;
        info!("Sample configuration created at {:?}", output);
        return Ok(());
    }

    // Load configuration
    let mut config = if let Some(config_path) = cli.config {
        Config::from_file(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        Config::from_env().context("Failed to load config from environment")?
    };

    // Override with CLI arguments if provided
    if let Some(token) = cli.github_token {
        config.github.token = token;
    }
    if let Some(token) = cli.google_token {
        config.google.access_token = token;
    }
    if let Some(name) = cli.secret_name {
        config.rotation.secret_name = name;
    }
    if let Some(max_keys) = cli.max_keys {
        config.rotation.max_keys = max_keys;
    }
    if cli.fail_fast {
        config.rotation.fail_fast = true;
    }
    for repo in &cli.repos {
        let parsed = validation::parse_repository_map(repo)
            .with_context(|| format!("Invalid --repo value: {}", repo))?;
        validation::merge_repository_map(&mut config.repositories, parsed)
            .with_context(|| format!("Conflicting --repo value: {}", repo))?;
    }

    match cli.command {
        Commands::Init { .. } => unreachable!(), // Handled above

        Commands::Validate => {
            let mappings = config.mappings().context("Invalid repository mapping")?;
            config.secret_name().context("Invalid secret name")?;
            config
                .retention_policy()
                .context("Invalid rotation settings")?;
            println!("Mapping is valid:");
            for mapping in mappings {
                println!("  {} <- {}", mapping.destination, mapping.service_account);
            }
        }

        Commands::Keys { service_account } => {
            let service_account = validation::normalize_service_account(&service_account)
                .context("Invalid service account email")?;
            let policy = config
                .retention_policy()
                .context("Invalid rotation settings")?;
            let iam = create_iam_client(&config)?;
            let coordinator = RotationCoordinator::new(&iam, policy);

            let plan = coordinator
                .plan(&service_account)
                .await
                .context("Failed to list keys")?;
            if plan.keys.is_empty() {
                println!("No keys found for {}", service_account);
            }
            for classified in &plan.keys {
                println!(
                    "  {} [{}] valid {} .. {}",
                    classified.key.name,
                    classified.classification,
                    classified.key.valid_after,
                    classified.key.valid_before
                );
            }
        }

        Commands::Plan => {
            let mappings = config.mappings().context("Invalid repository mapping")?;
            let secret_name = config.secret_name().context("Invalid secret name")?;
            let policy = config
                .retention_policy()
                .context("Invalid rotation settings")?;
            let iam = create_iam_client(&config)?;
            let coordinator = RotationCoordinator::new(&iam, policy);

            for mapping in &mappings {
                let plan = coordinator
                    .plan(&mapping.service_account)
                    .await
                    .with_context(|| format!("Failed to plan {}", mapping.destination))?;
                println!(
                    "{} ({}): {} key(s)",
                    mapping.destination,
                    mapping.service_account,
                    plan.keys.len()
                );
                if plan.to_delete.is_empty() {
                    println!("  [DRY RUN] Would delete nothing");
                }
                for key in &plan.to_delete {
                    println!("  [DRY RUN] Would delete {} (valid after {})", key.name, key.valid_after);
                }
                println!("  [DRY RUN] Would create 1 key and publish it as {}", secret_name);
            }
        }

        Commands::Sync => {
            let mappings = config.mappings().context("Invalid repository mapping")?;
            let secret_name = config
                .secret_name()
                .context("Invalid secret name")?
                .to_string();
            let policy = config
                .retention_policy()
                .context("Invalid rotation settings")?;
            let iam = create_iam_client(&config)?;
            let github = create_github_client(&config)?;

            let runner = SyncRunner::new(
                &iam,
                &github,
                policy,
                SyncOptions {
                    secret_name,
                    fail_fast: config.rotation.fail_fast,
                },
            );
            let report = runner.run_mappings(mappings).await;

            for result in &report.results {
                match &result.outcome {
                    SyncOutcome::Published(status) => {
                        println!("✓ {}: {}", result.mapping.destination, status)
                    }
                    SyncOutcome::RotationFailed(e) => {
                        eprintln!("✗ {}: {}", result.mapping.destination, e)
                    }
                    SyncOutcome::PublishFailed(e) => eprintln!(
                        "✗ {}: key rotated but not published, run sync again: {}",
                        result.mapping.destination, e
                    ),
                    SyncOutcome::Skipped => {
                        eprintln!("- {}: skipped", result.mapping.destination)
                    }
                }
            }

            if !report.is_success() {
                anyhow::bail!(
                    "{} of {} repositories failed",
                    report.failures(),
                    report.results.len()
                );
            }
        }
    }

    Ok(())
}

fn create_iam_client(config: &Config) -> Result<IamClient> {
    if config.google.access_token.is_empty() {
        anyhow::bail!("Google access token not configured. Set GOOGLE_OAUTH_ACCESS_TOKEN or [google] access_token");
    }
    IamClient::new(
        config.google.api_url.clone(),
        config.google.access_token.clone(),
    )
    .context("Failed to create IAM client")
}

fn create_github_client(config: &Config) -> Result<GitHubClient> {
    if config.github.token.is_empty() {
        anyhow::bail!("Unauthorized: no GitHub token present. Set GITHUB_AUTH_TOKEN or [github] token");
    }
    GitHubClient::new(config.github.api_url.clone(), config.github.token.clone())
        .context("Failed to create GitHub client")
}
