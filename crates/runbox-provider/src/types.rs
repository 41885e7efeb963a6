//! Common types for the engine runner

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which engine CLI is being driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Docker,
    Podman,
}

impl EngineKind {
    /// Infer the engine flavour from the configured program name
    pub fn from_program(program: &str) -> Self {
        let base = program.rsplit('/').next().unwrap_or(program);
        if base.contains("docker") {
            Self::Docker
        } else {
            Self::Podman
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Docker => write!(f, "docker"),
            Self::Podman => write!(f, "podman"),
        }
    }
}

impl std::str::FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            _ => Err(format!("Unknown engine: {}", s)),
        }
    }
}

/// Captured output of one engine invocation.
///
/// `exit_code` is kept for logging only; success is decided from the text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code: None,
        }
    }
}

/// Builds engine argument vectors for the one managed container
#[derive(Debug, Clone)]
pub struct EngineArgs {
    pub kind: EngineKind,
    pub container_name: String,
    pub shell: String,
    pub host_dir: PathBuf,
    pub container_dir: String,
}

impl EngineArgs {
    /// `pull <image>`
    pub fn pull(&self, image: &str) -> Vec<String> {
        vec!["pull".to_string(), image.to_string()]
    }

    /// `create --name=<name> -it -v <host>:<dir> -w <dir> <image> <shell>`
    pub fn create(&self, image: &str) -> Vec<String> {
        let mut args = vec![
            "create".to_string(),
            format!("--name={}", self.container_name),
            "-i".to_string(),
            "-t".to_string(),
        ];

        // Use :Z for SELinux relabeling on bind mounts (required on Fedora/RHEL)
        let selinux_opt = match self.kind {
            EngineKind::Podman => ":Z",
            EngineKind::Docker => "",
        };
        args.push(format!(
            "-v={}:{}{}",
            self.host_dir.display(),
            self.container_dir,
            selinux_opt
        ));
        args.push(format!("--workdir={}", self.container_dir));
        args.push(image.to_string());
        args.push(self.shell.clone());
        args
    }

    /// Interactive, terminal-allocated attach to the container's shell
    pub fn attach(&self) -> Vec<String> {
        vec![
            "start".to_string(),
            "-ai".to_string(),
            self.container_name.clone(),
        ]
    }

    /// `kill <name>`; stops the container's main shell
    pub fn kill(&self) -> Vec<String> {
        vec!["kill".to_string(), self.container_name.clone()]
    }

    /// `rm -f <name>`
    pub fn remove(&self) -> Vec<String> {
        vec![
            "rm".to_string(),
            "-f".to_string(),
            self.container_name.clone(),
        ]
    }
}
