//! Command-based credential provider
//!
//! Runs an external command (e.g. `gcloud config config-helper --format=json`)
//! and reads the token from its output.
//!
//! Config keys:
//! - `cmd-path` (required) - program to run
//! - `cmd-args` - whitespace-separated arguments
//! - `token-key` - JSONPath such as `{.credential.access_token}`; without it
//!   the trimmed stdout is the token

use serde_json::Value as JsonValue;
use tokio::process::Command;
use tracing::debug;

use super::AuthRefreshError;
use crate::config::AuthProviderConfig;

/// Provider that shells out for a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandProvider {
    provider: String,
    cmd_path: String,
    cmd_args: Vec<String>,
    token_key: Option<Vec<String>>,
}

impl CommandProvider {
    pub fn from_config(config: &AuthProviderConfig) -> Result<Self, AuthRefreshError> {
        let cmd_path = config
            .get("cmd-path")
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| AuthRefreshError::MissingConfig {
                provider: config.name.clone(),
                key: "cmd-path".to_string(),
            })?;

        let cmd_args = config
            .get("cmd-args")
            .map(|args| args.split_whitespace().map(String::from).collect())
            .unwrap_or_default();

        let token_key = config.get("token-key").map(parse_json_path);

        Ok(Self {
            provider: config.name.clone(),
            cmd_path: cmd_path.to_string(),
            cmd_args,
            token_key,
        })
    }

    pub async fn refresh(&self) -> Result<String, AuthRefreshError> {
        debug!(provider = %self.provider, command = %self.cmd_path, "Running credential command");

        let output = Command::new(&self.cmd_path)
            .args(&self.cmd_args)
            .output()
            .await
            .map_err(|e| AuthRefreshError::Command {
                command: self.cmd_path.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AuthRefreshError::Command {
                command: self.cmd_path.clone(),
                reason: format!("{}: {}", output.status, stderr.trim()),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let token = match &self.token_key {
            Some(path) => self.extract_token(&stdout, path)?,
            None => stdout.trim().to_string(),
        };

        if token.is_empty() {
            return Err(AuthRefreshError::EmptyToken {
                provider: self.provider.clone(),
            });
        }
        Ok(token)
    }

    fn extract_token(&self, stdout: &str, path: &[String]) -> Result<String, AuthRefreshError> {
        let document: JsonValue = serde_json::from_str(stdout).map_err(|e| AuthRefreshError::Provider {
            provider: self.provider.clone(),
            reason: format!("command output is not JSON: {}", e),
        })?;

        let found = path
            .iter()
            .try_fold(&document, |value, segment| value.get(segment))
            .and_then(JsonValue::as_str)
            .ok_or_else(|| AuthRefreshError::Provider {
                provider: self.provider.clone(),
                reason: format!("no string at '{{.{}}}' in command output", path.join(".")),
            })?;

        Ok(found.to_string())
    }
}

/// Split `{.a.b}` into `["a", "b"]`
fn parse_json_path(path: &str) -> Vec<String> {
    path.trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .split('.')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
