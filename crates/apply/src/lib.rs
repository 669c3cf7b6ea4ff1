//! Conduit apply: drives the external `conduktor` command to apply rendered gateway
//! and console resources, plus the credentials it needs.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use conduit_transform::TargetResource;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

mod credentials;

pub use credentials::{Credentials, DEFAULT_SECRET_DIR};

const DEFAULT_CLI: &str = "conduktor";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn max_yaml_bytes() -> usize {
    std::env::var("CONDUIT_MAX_YAML_BYTES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(512 * 1024)
}

/// Captured outcome of one tool invocation. Local failures (launch, timeout,
/// missing credentials) use exit code -1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CliResult {
    pub fn local_failure(message: impl Into<String>) -> Self {
        Self { exit_code: -1, stdout: String::new(), stderr: message.into() }
    }

    pub fn is_success(&self) -> bool { self.exit_code == 0 }

    pub fn error_message(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("CLI exited with code {}", self.exit_code)
        } else {
            stderr.to_string()
        }
    }
}

/// Something that can push a rendered target resource to the external system.
#[async_trait]
pub trait Applier: Send + Sync {
    async fn apply(&self, target: &TargetResource) -> CliResult;
}

/// Runs `<cli> apply -f <file> [--dry-run]` against a temporary YAML file.
#[derive(Debug, Clone)]
pub struct CliDriver {
    cli_path: PathBuf,
    timeout: Duration,
    credentials: Option<Credentials>,
    dry_run: bool,
}

impl CliDriver {
    pub fn new(cli_path: impl Into<PathBuf>, timeout: Duration, credentials: Option<Credentials>) -> Self {
        Self { cli_path: cli_path.into(), timeout, credentials, dry_run: false }
    }

    /// Tool path from `CONDUKTOR_CLI_PATH` and timeout seconds from `CONDUKTOR_CLI_TIMEOUT`.
    pub fn from_env(credentials: Option<Credentials>) -> Self {
        let cli = std::env::var("CONDUKTOR_CLI_PATH").ok().filter(|s| !s.trim().is_empty()).unwrap_or_else(|| DEFAULT_CLI.to_string());
        let secs = std::env::var("CONDUKTOR_CLI_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self::new(cli, Duration::from_secs(secs), credentials)
    }

    /// Route every [`Applier::apply`] call through `--dry-run`.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn has_credentials(&self) -> bool { self.credentials.is_some() }

    pub fn timeout(&self) -> Duration { self.timeout }

    pub async fn apply(&self, target: &TargetResource) -> CliResult {
        self.apply_target(target, false).await
    }

    pub async fn apply_dry_run(&self, target: &TargetResource) -> CliResult {
        self.apply_target(target, true).await
    }

    async fn apply_target(&self, target: &TargetResource, dry_run: bool) -> CliResult {
        match target.to_yaml() {
            Ok(yaml) => {
                debug!(kind = target.kind(), name = target.name(), dry_run, "applying target resource");
                self.apply_yaml(&yaml, dry_run).await
            }
            Err(e) => CliResult::local_failure(format!("Failed to serialize {} {}: {}", target.kind(), target.name(), e)),
        }
    }

    /// Write `yaml` to a temporary file and run the tool on it. The file is removed
    /// whatever the outcome.
    pub async fn apply_yaml(&self, yaml: &str, dry_run: bool) -> CliResult {
        let t0 = Instant::now();
        counter!("cli_apply_attempts", 1u64);
        if !dry_run && self.credentials.is_none() {
            counter!("cli_apply_failures", 1u64, "reason" => "credentials");
            return CliResult::local_failure(
                "Credentials not configured. Set CONDUKTOR_* environment variables or mount the conduktor secret.",
            );
        }
        let max = max_yaml_bytes();
        if yaml.len() > max {
            counter!("cli_apply_failures", 1u64, "reason" => "too_large");
            return CliResult::local_failure(format!("Payload too large: {} bytes exceeds limit of {}", yaml.len(), max));
        }

        let file = match write_payload(yaml).await {
            Ok(f) => f,
            Err(e) => return CliResult::local_failure(format!("Failed to execute CLI: {:#}", e)),
        };
        let result = self.run(file.path(), dry_run).await;
        if let Err(e) = file.close() {
            warn!(error = %e, "failed to remove payload file");
        }

        let ms = t0.elapsed().as_millis() as f64;
        histogram!("cli_apply_latency_ms", ms);
        if result.is_success() {
            info!(dry_run, took_ms = %ms, "cli apply ok");
        } else {
            counter!("cli_apply_failures", 1u64, "reason" => "exit");
            warn!(dry_run, exit_code = result.exit_code, error = %result.error_message(), "cli apply failed");
        }
        result
    }

    async fn run(&self, payload: &std::path::Path, dry_run: bool) -> CliResult {
        let mut cmd = Command::new(&self.cli_path);
        cmd.arg("apply").arg("-f").arg(payload);
        if dry_run {
            cmd.arg("--dry-run");
        }
        if let Some(creds) = &self.credentials {
            for (k, v) in creds.tool_env() {
                cmd.env(k, v);
            }
        }
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return CliResult::local_failure(format!("Failed to execute CLI: {}", e)),
        };
        // Dropping the pending output future drops the child, which kills it.
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Err(_) => {
                counter!("cli_apply_timeouts", 1u64);
                CliResult::local_failure(format!("Command timed out after {} seconds", self.timeout.as_secs()))
            }
            Ok(Err(e)) => CliResult::local_failure(format!("Failed to execute CLI: {}", e)),
            Ok(Ok(out)) => CliResult {
                exit_code: out.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            },
        }
    }
}

async fn write_payload(yaml: &str) -> anyhow::Result<tempfile::NamedTempFile> {
    let file = tempfile::Builder::new()
        .prefix("conduit-")
        .suffix(".yaml")
        .tempfile()
        .context("create payload file")?;
    tokio::fs::write(file.path(), yaml).await.context("write payload file")?;
    Ok(file)
}

#[async_trait]
impl Applier for CliDriver {
    async fn apply(&self, target: &TargetResource) -> CliResult {
        self.apply_target(target, self.dry_run).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_stderr() {
        let r = CliResult { exit_code: 2, stdout: "x".into(), stderr: "  boom \n".into() };
        assert_eq!(r.error_message(), "boom");
        let r = CliResult { exit_code: 2, stdout: String::new(), stderr: " ".into() };
        assert_eq!(r.error_message(), "CLI exited with code 2");
        assert!(!r.is_success());
    }

    #[tokio::test]
    async fn apply_without_credentials_is_refused_locally() {
        let driver = CliDriver::new("/nonexistent/conduktor", Duration::from_secs(5), None);
        let r = driver.apply_yaml("kind: Topic\n", false).await;
        assert_eq!(r.exit_code, -1);
        assert!(r.stdout.is_empty());
        assert!(r.stderr.starts_with("Credentials not configured"), "{}", r.stderr);
    }

    #[tokio::test]
    async fn launch_failure_is_reported() {
        let driver = CliDriver::new("/nonexistent/conduktor", Duration::from_secs(5), None);
        let r = driver.apply_yaml("kind: Topic\n", true).await;
        assert_eq!(r.exit_code, -1);
        assert!(r.stderr.starts_with("Failed to execute CLI: "), "{}", r.stderr);
    }

    #[test]
    fn constructor_defaults() {
        let d = CliDriver::new(DEFAULT_CLI, Duration::from_secs(DEFAULT_TIMEOUT_SECS), None);
        assert_eq!(d.timeout(), Duration::from_secs(30));
        assert!(!d.has_credentials());
    }
}
