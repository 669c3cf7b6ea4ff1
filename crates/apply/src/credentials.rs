use std::fmt;
use std::path::{Path, PathBuf};

use conduit_core::{ConduitError, Result};
use tracing::debug;

pub const DEFAULT_SECRET_DIR: &str = "/var/run/secrets/conduktor";

struct Source {
    env: &'static str,
    key: &'static str,
}

const CONSOLE_URL: Source = Source { env: "CONDUKTOR_CONSOLE_URL", key: "console-url" };
const CONSOLE_TOKEN: Source = Source { env: "CONDUKTOR_CONSOLE_TOKEN", key: "console-token" };
const GATEWAY_URL: Source = Source { env: "CONDUKTOR_GATEWAY_URL", key: "gateway-url" };
const GATEWAY_USER: Source = Source { env: "CONDUKTOR_GATEWAY_USER", key: "gateway-user" };
const GATEWAY_PASSWORD: Source = Source { env: "CONDUKTOR_GATEWAY_PASSWORD", key: "gateway-password" };

/// Connection settings for the console and gateway the command tool talks to.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub console_url: String,
    pub console_token: String,
    pub gateway_url: String,
    pub gateway_user: String,
    pub gateway_password: String,
}

impl Credentials {
    /// Environment first, then files under `CONDUKTOR_SECRET_PATH` (default [`DEFAULT_SECRET_DIR`]).
    pub fn load() -> Result<Self> {
        let dir = std::env::var("CONDUKTOR_SECRET_PATH").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(DEFAULT_SECRET_DIR));
        Self::load_from(&dir)
    }

    pub fn load_from(secret_dir: &Path) -> Result<Self> {
        Self::load_with(|name| std::env::var(name).ok(), secret_dir)
    }

    /// Resolve every value through `env`, falling back to `<secret_dir>/<key>`.
    /// Values are trimmed and blank values count as missing.
    pub fn load_with(env: impl Fn(&str) -> Option<String>, secret_dir: &Path) -> Result<Self> {
        let get = |src: &Source| -> Result<String> {
            if let Some(v) = env(src.env).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
                return Ok(v);
            }
            let path = secret_dir.join(src.key);
            if let Some(v) = std::fs::read_to_string(&path).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
                debug!(key = src.key, "credential read from secret mount");
                return Ok(v);
            }
            Err(ConduitError::Configuration(format!(
                "Missing credential: set {} environment variable or mount secret with key '{}' at {}",
                src.env,
                src.key,
                secret_dir.display()
            )))
        };
        Ok(Self {
            console_url: get(&CONSOLE_URL)?,
            console_token: get(&CONSOLE_TOKEN)?,
            gateway_url: get(&GATEWAY_URL)?,
            gateway_user: get(&GATEWAY_USER)?,
            gateway_password: get(&GATEWAY_PASSWORD)?,
        })
    }

    /// Environment variables the command tool reads.
    pub fn tool_env(&self) -> [(&'static str, &str); 5] {
        [
            ("CDK_BASE_URL", &self.console_url),
            ("CDK_TOKEN", &self.console_token),
            ("CDK_GATEWAY_BASE_URL", &self.gateway_url),
            ("CDK_GATEWAY_USER", &self.gateway_user),
            ("CDK_GATEWAY_PASSWORD", &self.gateway_password),
        ]
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("console_url", &self.console_url)
            .field("console_token", &"***")
            .field("gateway_url", &self.gateway_url)
            .field("gateway_user", &self.gateway_user)
            .field("gateway_password", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    const FULL_ENV: &[(&str, &str)] = &[
        ("CONDUKTOR_CONSOLE_URL", "https://console.local"),
        ("CONDUKTOR_CONSOLE_TOKEN", " tok "),
        ("CONDUKTOR_GATEWAY_URL", "https://gw.local"),
        ("CONDUKTOR_GATEWAY_USER", "admin"),
        ("CONDUKTOR_GATEWAY_PASSWORD", "s3cret"),
    ];

    #[test]
    fn env_values_are_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let c = Credentials::load_with(env_of(FULL_ENV), dir.path()).unwrap();
        assert_eq!(c.console_token, "tok");
        assert_eq!(c.tool_env()[0], ("CDK_BASE_URL", "https://console.local"));
    }

    #[test]
    fn secret_files_fill_gaps_and_env_wins() {
        let dir = tempfile::tempdir().unwrap();
        for (key, val) in [
            ("console-url", "https://from-file"),
            ("console-token", "file-token\n"),
            ("gateway-url", "https://gw-file"),
            ("gateway-user", "file-user"),
            ("gateway-password", "file-pass"),
        ] {
            std::fs::write(dir.path().join(key), val).unwrap();
        }
        let c = Credentials::load_with(env_of(&[("CONDUKTOR_GATEWAY_USER", "env-user"), ("CONDUKTOR_CONSOLE_URL", "  ")]), dir.path())
            .unwrap();
        assert_eq!(c.gateway_user, "env-user");
        assert_eq!(c.console_url, "https://from-file", "blank env falls back to the file");
        assert_eq!(c.console_token, "file-token");
    }

    #[test]
    fn missing_value_names_env_and_key() {
        let dir = tempfile::tempdir().unwrap();
        let err = Credentials::load_with(env_of(&FULL_ENV[..4]), dir.path()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("Missing credential: set CONDUKTOR_GATEWAY_PASSWORD environment variable"), "{}", msg);
        assert!(msg.contains("'gateway-password'"));
        assert!(matches!(err, ConduitError::Configuration(_)));
    }

    #[test]
    fn debug_redacts_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let c = Credentials::load_with(env_of(FULL_ENV), dir.path()).unwrap();
        let s = format!("{:?}", c);
        assert!(!s.contains("s3cret") && !s.contains("tok\""));
        assert!(s.contains("admin"));
    }
}
