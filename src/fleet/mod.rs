//! Compute fleet: launching replacement workers.
//!
//! A launch is a one-time spot request whose user data bootstraps a fresh
//! autocrawl worker with the launching process's configuration and a new
//! worker identity. Launches are fire-and-forget; nothing waits for the new
//! worker to come up.

use std::path::PathBuf;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::{Config, FleetConfig};
use crate::error::{Error, Result};

pub const WORKER_ID_VAR: &str = "AUTOCRAWL_WORKER_ID";
pub const LAUNCH_SPEC_VAR: &str = "AUTOCRAWL_LAUNCH_SPEC";
pub const LAUNCH_REGION_VAR: &str = "AUTOCRAWL_LAUNCH_REGION";

/// The fleet launcher seam.
#[async_trait]
pub trait FleetLauncher: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec, env: &LaunchEnv) -> Result<()>;
}

/// Provider-side parameters that are not part of the request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchEnv {
    pub region: String,
}

// ---------------------------------------------------------------------------
// Launch specification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LaunchSpec {
    pub instance_count: u32,
    pub dry_run: bool,
    #[serde(rename = "Type")]
    pub request_type: String,
    pub instance_interruption_behavior: String,
    pub spot_price: String,
    pub launch_specification: InstanceSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstanceSpec {
    pub image_id: String,
    pub instance_type: String,
    pub key_name: String,
    pub subnet_id: String,
    pub security_group_ids: Vec<String>,
    pub iam_instance_profile: IamInstanceProfile,
    pub monitoring: Monitoring,
    /// Base64 bootstrap script.
    pub user_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IamInstanceProfile {
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Monitoring {
    pub enabled: bool,
}

impl LaunchSpec {
    /// Decode the bootstrap script.
    pub fn user_data_script(&self) -> Result<String> {
        let bytes = STANDARD
            .decode(&self.launch_specification.user_data)
            .map_err(|e| Error::Launch(format!("user data is not base64: {e}")))?;
        String::from_utf8(bytes).map_err(|e| Error::Launch(format!("user data is not utf-8: {e}")))
    }
}

/// Everything needed to build a launch spec except the new worker's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchTemplate {
    pub fleet: FleetConfig,
    /// Variables exported to the new worker. Any worker id here is replaced.
    pub bootstrap_env: Vec<(String, String)>,
}

impl LaunchTemplate {
    pub fn new(fleet: FleetConfig, bootstrap_env: Vec<(String, String)>) -> Self {
        Self {
            fleet,
            bootstrap_env,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.fleet.clone(), config.export_vars(&config.worker_id))
    }

    pub fn env(&self) -> LaunchEnv {
        LaunchEnv {
            region: self.fleet.region.clone(),
        }
    }

    /// Build the request that boots worker `worker_id`.
    pub fn spec_for(&self, worker_id: &str) -> LaunchSpec {
        let script = bootstrap_script(&self.fleet.package_url, &self.vars_for(worker_id));
        LaunchSpec {
            instance_count: 1,
            dry_run: self.fleet.dry_run,
            request_type: "one-time".to_string(),
            instance_interruption_behavior: "terminate".to_string(),
            spot_price: self.fleet.spot_price.clone(),
            launch_specification: InstanceSpec {
                image_id: self.fleet.image_id.clone(),
                instance_type: self.fleet.instance_type.clone(),
                key_name: self.fleet.key_name.clone(),
                subnet_id: self.fleet.subnet_id.clone(),
                security_group_ids: vec![self.fleet.security_group_id.clone()],
                iam_instance_profile: IamInstanceProfile {
                    arn: self.fleet.iam_instance_arn.clone(),
                },
                monitoring: Monitoring { enabled: false },
                user_data: STANDARD.encode(script),
            },
        }
    }

    fn vars_for(&self, worker_id: &str) -> Vec<(String, String)> {
        let mut vars = vec![(WORKER_ID_VAR.to_string(), worker_id.to_string())];
        vars.extend(
            self.bootstrap_env
                .iter()
                .filter(|(name, _)| name != WORKER_ID_VAR)
                .cloned(),
        );
        vars
    }
}

fn bootstrap_script(package_url: &str, vars: &[(String, String)]) -> String {
    let mut script = String::from("#!/bin/bash\n");
    for (name, value) in vars {
        script.push_str(&format!("export {name}={}\n", shell_quote(value)));
    }
    script.push_str("cd /tmp\n");
    script.push_str(&format!(
        "curl -fsSL {} -o autocrawl\n",
        shell_quote(package_url)
    ));
    script.push_str("chmod +x autocrawl\n");
    script.push_str("./autocrawl run\n");
    script.push_str("sudo shutdown -h now\n");
    script
}

/// Single-quote a value for bash.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

// ---------------------------------------------------------------------------
// Command launcher
// ---------------------------------------------------------------------------

/// Runs an external command that submits the request to the provider.
///
/// The request is passed as JSON in `AUTOCRAWL_LAUNCH_SPEC`, the region in
/// `AUTOCRAWL_LAUNCH_REGION`. A zero exit status is a successful launch.
pub struct CommandLauncher {
    command: PathBuf,
}

impl CommandLauncher {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl FleetLauncher for CommandLauncher {
    async fn launch(&self, spec: &LaunchSpec, env: &LaunchEnv) -> Result<()> {
        // Relative commands resolve against the process cwd.
        let command = if self.command.is_relative() {
            std::env::current_dir()?.join(&self.command)
        } else {
            self.command.clone()
        };
        let spec_json = serde_json::to_string(spec)?;

        debug!(command = %command.display(), region = %env.region, dry_run = spec.dry_run, "running launch command");

        let output = Command::new(&command)
            .env(LAUNCH_SPEC_VAR, spec_json)
            .env(LAUNCH_REGION_VAR, &env.region)
            .output()
            .await?;

        if output.status.success() {
            info!(command = %command.display(), "launch request submitted");
            Ok(())
        } else {
            Err(Error::Launch(format!(
                "launch command exited with status {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}
