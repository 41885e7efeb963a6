//! CLI-based command runner for Docker and Podman
//!
//! Invokes the engine executable directly, behind an optional
//! privilege-dropping prefix (e.g. `sudo -u runner`).

use crate::{CommandOutput, CommandRunner, EngineKind, ProviderError, Result};
use async_trait::async_trait;
use runbox_config::EngineConfig;
use std::process::Stdio;
use tokio::process::Command;

/// Runs one-shot engine commands and captures their output
pub struct CliRunner {
    /// Command to use ("docker" or "podman")
    cmd: String,
    /// Optional prefix placed before the engine command
    cmd_prefix: Vec<String>,
    kind: EngineKind,
}

impl CliRunner {
    pub fn new(cmd: impl Into<String>, cmd_prefix: Vec<String>) -> Self {
        let cmd = cmd.into();
        let kind = EngineKind::from_program(&cmd);
        Self {
            cmd,
            cmd_prefix,
            kind,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        if config.program.trim().is_empty() {
            return Err(ProviderError::ConfigError(
                "engine program is empty".to_string(),
            ));
        }
        Ok(Self::new(config.program.clone(), config.prefix.clone()))
    }

    /// Check that the engine executable answers at all
    pub async fn ping(&self) -> Result<()> {
        let output = self.build_command().arg("--version").output().await;
        match output {
            Ok(o) if o.status.success() => Ok(()),
            Ok(o) => Err(ProviderError::EngineUnavailable(
                String::from_utf8_lossy(&o.stderr).trim().to_string(),
            )),
            Err(e) => Err(ProviderError::EngineUnavailable(format!(
                "{}: {}",
                self.cmd, e
            ))),
        }
    }

    /// Build a command with the correct prefix.
    fn build_command(&self) -> Command {
        if self.cmd_prefix.is_empty() {
            Command::new(&self.cmd)
        } else {
            let mut c = Command::new(&self.cmd_prefix[0]);
            for prefix_arg in &self.cmd_prefix[1..] {
                c.arg(prefix_arg);
            }
            c.arg(&self.cmd);
            c
        }
    }
}

#[async_trait]
impl CommandRunner for CliRunner {
    async fn run(&self, args: &[String]) -> CommandOutput {
        tracing::debug!("Running {} {}", self.cmd, args.join(" "));

        let mut cmd = self.build_command();
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        match cmd.output().await {
            Ok(output) => {
                let result = CommandOutput {
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                    exit_code: output.status.code(),
                };
                if !output.status.success() {
                    tracing::debug!(
                        "{} {} exited with {:?}",
                        self.cmd,
                        args.first().map(String::as_str).unwrap_or(""),
                        result.exit_code
                    );
                }
                result
            }
            Err(e) => {
                tracing::warn!("Failed to spawn {}: {}", self.cmd, e);
                CommandOutput {
                    stdout: String::new(),
                    stderr: format!("Error: failed to run {}: {}", self.cmd, e),
                    exit_code: None,
                }
            }
        }
    }

    fn runtime_args(&self) -> (String, Vec<String>) {
        if self.cmd_prefix.is_empty() {
            (self.cmd.clone(), vec![])
        } else {
            let mut args: Vec<String> = self.cmd_prefix[1..].to_vec();
            args.push(self.cmd.clone());
            (self.cmd_prefix[0].clone(), args)
        }
    }

    fn kind(&self) -> EngineKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_args_without_prefix() {
        let runner = CliRunner::new("podman", vec![]);
        assert_eq!(runner.runtime_args(), ("podman".to_string(), vec![]));
        assert_eq!(runner.kind(), EngineKind::Podman);
    }

    #[test]
    fn test_runtime_args_with_prefix() {
        let runner = CliRunner::new(
            "docker",
            vec!["sudo".to_string(), "-u".to_string(), "runner".to_string()],
        );
        assert_eq!(
            runner.runtime_args(),
            (
                "sudo".to_string(),
                vec!["-u".to_string(), "runner".to_string(), "docker".to_string()]
            )
        );
        assert_eq!(runner.kind(), EngineKind::Docker);
    }

    #[test]
    fn test_from_config_rejects_empty_program() {
        let config = EngineConfig {
            program: "  ".to_string(),
            ..EngineConfig::default()
        };
        assert!(CliRunner::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_missing_program_reports_error_text() {
        let runner = CliRunner::new("runbox-definitely-not-an-engine", vec![]);
        let out = runner.run(&["pull".to_string(), "alpine".to_string()]).await;
        assert!(out.stdout.is_empty());
        assert!(out.stderr.contains("Error"));
        assert!(runner.ping().await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_stdout_and_stderr() {
        // `sh -c` stands in for the engine: args are passed straight through
        let runner = CliRunner::new("sh", vec![]);
        let out = runner
            .run(&[
                "-c".to_string(),
                "echo out; echo err 1>&2; exit 3".to_string(),
            ])
            .await;
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        assert_eq!(out.exit_code, Some(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_prefix_is_prepended() {
        let runner = CliRunner::new("echo", vec!["env".to_string()]);
        let out = runner.run(&["hello".to_string()]).await;
        assert_eq!(out.stdout.trim(), "hello");
    }
}
