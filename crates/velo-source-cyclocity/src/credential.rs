//! Inventory API credentials
//!
//! The bikes API expects the full `Authorization` value (e.g. `Taknv1 ...`).
//! It is either configured directly, or produced by an external helper
//! (typically a headless-browser script) that prints it on stdout.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use velo_core::config::CredentialConfig;
use velo_core::traits::{Credential, CredentialProvider, CredentialProviderFactory};
use velo_core::{Error, Result};

/// Credential fixed at configuration time
pub struct StaticCredential {
    /// ⚠️ NEVER log this value
    credential: Credential,
}

// Custom Debug implementation that hides the token
impl std::fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredential")
            .field("token", &"<REDACTED>")
            .finish()
    }
}

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let credential = Credential::new(token);
        if credential.is_empty() {
            return Err(Error::config("Static credential cannot be empty"));
        }
        Ok(Self { credential })
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn credential(&self) -> Result<Credential> {
        Ok(self.credential.clone())
    }
}

/// Credential printed by an external program, run once per poll
#[derive(Debug, Clone)]
pub struct CommandCredential {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandCredential {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

#[async_trait]
impl CredentialProvider for CommandCredential {
    async fn credential(&self) -> Result<Credential> {
        debug!("Running credential helper {}", self.program);

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::credential(format!("Failed to start {}: {}", self.program, e))
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::credential(format!(
                    "{} did not finish within {}s",
                    self.program,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| Error::credential(format!("Failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.trim().chars().take(200).collect();
            return Err(Error::credential(format!(
                "{} exited with {}: {}",
                self.program, output.status, excerpt
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let token = stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| Error::credential(format!("{} printed no credential", self.program)))?;

        info!("Obtained credential from {}", self.program);
        Ok(Credential::new(token))
    }
}

/// Factory for [`StaticCredential`]
pub struct StaticCredentialFactory;

impl CredentialProviderFactory for StaticCredentialFactory {
    fn create(&self, config: &CredentialConfig) -> Result<Box<dyn CredentialProvider>> {
        match config {
            CredentialConfig::Static { token } => Ok(Box::new(StaticCredential::new(token.clone())?)),
            _ => Err(Error::config("Invalid config for static credential")),
        }
    }
}

/// Factory for [`CommandCredential`]
pub struct CommandCredentialFactory;

impl CredentialProviderFactory for CommandCredentialFactory {
    fn create(&self, config: &CredentialConfig) -> Result<Box<dyn CredentialProvider>> {
        match config {
            CredentialConfig::Command {
                program,
                args,
                timeout_secs,
            } => {
                if program.is_empty() {
                    return Err(Error::config("Credential command is required"));
                }
                Ok(Box::new(CommandCredential::new(
                    program.clone(),
                    args.clone(),
                    Duration::from_secs(*timeout_secs),
                )))
            }
            _ => Err(Error::config("Invalid config for command credential")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_token_not_exposed_in_debug() {
        let provider = StaticCredential::new("Taknv1 secret_token_12345").unwrap();

        let debug_str = format!("{:?}", provider);
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("StaticCredential"));
    }

    #[test]
    fn test_static_factory_missing_token() {
        let config = CredentialConfig::Static {
            token: "  ".to_string(),
        };
        assert!(StaticCredentialFactory.create(&config).is_err());
    }

    #[tokio::test]
    async fn test_static_credential() {
        let provider = StaticCredential::new("Taknv1 abc").unwrap();
        assert_eq!(provider.credential().await.unwrap().expose(), "Taknv1 abc");
    }

    #[cfg(unix)]
    fn sh(script: &str, timeout_secs: u64) -> CommandCredential {
        CommandCredential::new(
            "sh",
            vec!["-c".to_string(), script.to_string()],
            Duration::from_secs(timeout_secs),
        )
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_credential_first_line() {
        let provider = sh("echo; echo '  Taknv1 from-helper  '; echo trailing", 5);
        let credential = provider.credential().await.unwrap();
        assert_eq!(credential.expose(), "Taknv1 from-helper");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_failure_is_credential_error() {
        let provider = sh("echo 'no marker found' >&2; exit 3", 5);
        match provider.credential().await {
            Err(Error::Credential(msg)) => assert!(msg.contains("no marker found")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_without_output_is_error() {
        let provider = sh("true", 5);
        assert!(matches!(
            provider.credential().await,
            Err(Error::Credential(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_timeout() {
        let provider = sh("sleep 10", 1);
        match provider.credential().await {
            Err(Error::Credential(msg)) => assert!(msg.contains("did not finish")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program() {
        let provider = CommandCredential::new(
            "/nonexistent/velo-login-helper",
            Vec::new(),
            Duration::from_secs(1),
        );
        assert!(matches!(
            provider.credential().await,
            Err(Error::Credential(_))
        ));
    }
}
