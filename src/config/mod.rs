//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Sensitive values wrapped in secrecy::SecretString to prevent log leaks.

pub mod secrets;

use crate::error::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";
pub const DEFAULT_INSTANCE_TYPE: &str = "t2.micro";

#[derive(Debug)]
pub struct Config {
    /// Identity of this worker in the shared `executing` tally.
    pub worker_id: String,
    pub database_url: SecretString,
    pub github_api: String,
    pub github_token: Option<SecretString>,
    /// Stop listing repositories once this many have been discovered.
    pub max_repos: u64,
    /// Stop walking a repository's commit pages once this many have been discovered.
    pub max_commits: u64,
    /// Upper bound on concurrently running workers across the fleet.
    pub max_workers: u64,
    /// Deferred items this process may pull before handing off.
    pub max_computations: u64,
    pub fleet: FleetConfig,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

/// Parameters for launching replacement workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetConfig {
    pub region: String,
    pub image_id: String,
    pub subnet_id: String,
    pub security_group_id: String,
    pub iam_instance_arn: String,
    pub key_name: String,
    pub spot_price: String,
    pub instance_type: String,
    pub dry_run: bool,
    /// Where a new worker downloads the autocrawl binary from.
    pub package_url: String,
    /// Executable that submits a launch request to the compute fleet.
    pub launch_command: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// On launched workers, the bootstrap script exports the vars.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars(&lookup);
        Ok(Self {
            worker_id: vars
                .optional("AUTOCRAWL_WORKER_ID")
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            database_url: SecretString::from(vars.required("DATABASE_URL")?),
            github_api: vars
                .optional("GITHUB_API")
                .unwrap_or_else(|| DEFAULT_GITHUB_API.to_string()),
            github_token: vars.optional("GITHUB_TOKEN").map(SecretString::from),
            max_repos: vars.parsed("MAX_REPOS")?,
            max_commits: vars.parsed("MAX_COMMITS")?,
            max_workers: vars.parsed("MAX_WORKERS")?,
            max_computations: vars.parsed("MAX_COMPUTATIONS")?,
            fleet: FleetConfig {
                region: vars.required("FLEET_REGION")?,
                image_id: vars.required("FLEET_IMAGE_ID")?,
                subnet_id: vars.required("FLEET_SUBNET_ID")?,
                security_group_id: vars.required("FLEET_SECURITY_GROUP_ID")?,
                iam_instance_arn: vars.required("FLEET_IAM_INSTANCE_ARN")?,
                key_name: vars.required("FLEET_KEY_NAME")?,
                spot_price: vars.required("FLEET_SPOT_PRICE")?,
                instance_type: vars
                    .optional("FLEET_INSTANCE_TYPE")
                    .unwrap_or_else(|| DEFAULT_INSTANCE_TYPE.to_string()),
                dry_run: vars.optional_parsed("FLEET_DRY_RUN")?.unwrap_or(false),
                package_url: vars.required("FLEET_PACKAGE_URL")?,
                launch_command: PathBuf::from(vars.required("FLEET_LAUNCH_COMMAND")?),
            },
            otel_endpoint: vars.optional("OTEL_ENDPOINT"),
            log_level: vars
                .optional("LOG_LEVEL")
                .unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Every variable a new worker needs, with `worker_id` as its identity.
    ///
    /// Secrets are exposed here: the result is embedded in the new worker's
    /// bootstrap script.
    pub fn export_vars(&self, worker_id: &str) -> Vec<(String, String)> {
        let mut vars = vec![
            ("AUTOCRAWL_WORKER_ID", worker_id.to_string()),
            (
                "DATABASE_URL",
                self.database_url.expose_secret().to_string(),
            ),
            ("GITHUB_API", self.github_api.clone()),
        ];
        if let Some(ref token) = self.github_token {
            vars.push(("GITHUB_TOKEN", token.expose_secret().to_string()));
        }
        vars.extend([
            ("MAX_REPOS", self.max_repos.to_string()),
            ("MAX_COMMITS", self.max_commits.to_string()),
            ("MAX_WORKERS", self.max_workers.to_string()),
            ("MAX_COMPUTATIONS", self.max_computations.to_string()),
            ("FLEET_REGION", self.fleet.region.clone()),
            ("FLEET_IMAGE_ID", self.fleet.image_id.clone()),
            ("FLEET_SUBNET_ID", self.fleet.subnet_id.clone()),
            ("FLEET_SECURITY_GROUP_ID", self.fleet.security_group_id.clone()),
            ("FLEET_IAM_INSTANCE_ARN", self.fleet.iam_instance_arn.clone()),
            ("FLEET_KEY_NAME", self.fleet.key_name.clone()),
            ("FLEET_SPOT_PRICE", self.fleet.spot_price.clone()),
            ("FLEET_INSTANCE_TYPE", self.fleet.instance_type.clone()),
            ("FLEET_DRY_RUN", self.fleet.dry_run.to_string()),
            ("FLEET_PACKAGE_URL", self.fleet.package_url.clone()),
            (
                "FLEET_LAUNCH_COMMAND",
                self.fleet.launch_command.display().to_string(),
            ),
        ]);
        if let Some(ref endpoint) = self.otel_endpoint {
            vars.push(("OTEL_ENDPOINT", endpoint.clone()));
        }
        vars.push(("LOG_LEVEL", self.log_level.clone()));

        vars.into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }
}

struct Vars<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.is_empty())
    }

    fn required(&self, name: &str) -> Result<String> {
        self.optional(name)
            .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
    }

    fn parsed<T: FromStr>(&self, name: &str) -> Result<T> {
        let raw = self.required(name)?;
        parse_var(name, &raw)
    }

    fn optional_parsed<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        self.optional(name)
            .map(|raw| parse_var(name, &raw))
            .transpose()
    }
}

fn parse_var<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("environment variable {name} has invalid value {raw:?}")))
}
