//! Command execution abstraction for testability.
//!
//! The resolver controller shells out to `dnsmasq`, `systemctl` and `tar`.
//! Going through [`CommandExecutor`] lets unit tests script those calls
//! without running anything.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

#[cfg(test)]
use mockall::automock;

/// Output from command execution
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Whether the command succeeded (exit code 0)
    pub success: bool,
    /// The exit code, if available
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Best available diagnostic: stderr, else stdout, else the exit code.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs external programs.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute `cmd` with `args` and capture its output.
    async fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Runs actual system commands.
///
/// The child is killed if the returned future is dropped, so callers bound
/// execution time by wrapping the call in `tokio::time::timeout`.
#[derive(Debug, Clone, Default)]
pub struct RealCommandExecutor;

impl RealCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for RealCommandExecutor {
    async fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput> {
        let output = Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", cmd))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

/// Helper function to convert a slice of &str to Vec<String>.
///
/// mockall has issues with lifetimes in `&[&str]`, so the trait takes
/// `&[String]` instead.
pub fn args_to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_to_strings() {
        let args = args_to_strings(&["reload", "dnsmasq"]);
        assert_eq!(args, vec!["reload", "dnsmasq"]);
        assert!(args_to_strings(&[]).is_empty());
    }

    #[test]
    fn test_diagnostic_preference() {
        let output = CommandOutput {
            stdout: "out".to_string(),
            stderr: "  err\n".to_string(),
            success: false,
            code: Some(1),
        };
        assert_eq!(output.diagnostic(), "err");

        let output = CommandOutput {
            stdout: "out\n".to_string(),
            ..Default::default()
        };
        assert_eq!(output.diagnostic(), "out");

        let output = CommandOutput {
            code: Some(3),
            ..Default::default()
        };
        assert_eq!(output.diagnostic(), "exit code 3");
        assert_eq!(CommandOutput::default().diagnostic(), "terminated by signal");
    }

    #[tokio::test]
    async fn test_real_command_executor_execute_echo() {
        let executor = RealCommandExecutor::new();
        let output = executor
            .execute("echo", &args_to_strings(&["-n", "hello"]))
            .await
            .unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "hello");
    }

    #[tokio::test]
    async fn test_real_command_executor_execute_failure() {
        let executor = RealCommandExecutor::new();
        let output = executor
            .execute("ls", &args_to_strings(&["--invalid-flag"]))
            .await
            .unwrap();
        // Command runs, just fails
        assert!(!output.success);
    }

    #[tokio::test]
    async fn test_real_command_executor_missing_binary() {
        let executor = RealCommandExecutor::new();
        let result = executor.execute("/nonexistent/pidns-binary", &[]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_real_command_executor_killed_on_timeout() {
        let executor = RealCommandExecutor::new();
        let args = args_to_strings(&["5"]);
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            executor.execute("sleep", &args),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_command_executor() {
        let mut mock = MockCommandExecutor::new();

        mock.expect_execute()
            .withf(|cmd, args| cmd == "systemctl" && args == ["is-active".to_string()])
            .times(1)
            .returning(|_, _| {
                Ok(CommandOutput {
                    stdout: "active\n".to_string(),
                    stderr: String::new(),
                    success: true,
                    code: Some(0),
                })
            });

        let output = mock
            .execute("systemctl", &args_to_strings(&["is-active"]))
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "active");
    }
}
