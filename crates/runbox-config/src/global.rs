//! Global configuration for runbox
//!
//! Located at `~/.config/runbox/config.toml`

use crate::{ConfigError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Global runbox configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub engine: EngineConfig,
    pub session: SessionConfig,
    pub workspace: WorkspaceConfig,
    pub interpreters: InterpreterConfig,
}

/// Container engine invocation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine executable ("podman" or "docker")
    pub program: String,
    /// Privilege-dropping prefix placed before the engine program,
    /// e.g. `["sudo", "-u", "runner"]`
    pub prefix: Vec<String>,
    /// Name of the single container managed by this instance
    pub container_name: String,
    /// Image offered when the caller does not pick one
    pub default_image: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "podman".to_string(),
            prefix: Vec::new(),
            container_name: "runbox".to_string(),
            default_image: "python:3.12".to_string(),
        }
    }
}

/// Interactive session protocol settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Prompt the shell is switched to; used as a synchronization beacon
    pub prompt: String,
    /// Token echoed after every command to delimit its output
    pub marker: String,
    /// Shell the container runs as its main process
    pub shell: String,
    /// TERM value exported inside the session
    pub term: String,
    pub startup_timeout_secs: u64,
    pub prompt_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub marker_timeout_secs: u64,
    pub exit_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            prompt: "PROMPT> ".to_string(),
            marker: "__CMD_END__".to_string(),
            shell: "/bin/sh".to_string(),
            term: "dumb".to_string(),
            startup_timeout_secs: 10,
            prompt_timeout_secs: 20,
            command_timeout_secs: 30,
            marker_timeout_secs: 10,
            exit_timeout_secs: 10,
        }
    }
}

impl SessionConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_secs(self.prompt_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn marker_timeout(&self) -> Duration {
        Duration::from_secs(self.marker_timeout_secs)
    }

    pub fn exit_timeout(&self) -> Duration {
        Duration::from_secs(self.exit_timeout_secs)
    }
}

/// Host directory mounted into the container and the script location inside it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Host directory to mount (defaults to `<data_dir>/workspace`)
    pub host_dir: Option<String>,
    /// Mount point inside the container
    pub container_dir: String,
    /// File name user code is written to before execution
    pub script_name: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            host_dir: None,
            container_dir: "/workspace".to_string(),
            script_name: "snippet.py".to_string(),
        }
    }
}

impl WorkspaceConfig {
    /// Resolve the host directory, expanding `~` and falling back to the data dir
    pub fn resolve_host_dir(&self) -> Result<PathBuf> {
        match self.host_dir {
            Some(ref dir) => Ok(PathBuf::from(shellexpand::tilde(dir).into_owned())),
            None => Ok(GlobalConfig::data_dir()?.join("workspace")),
        }
    }

    /// Path of the user script as seen from inside the container
    pub fn container_script_path(&self) -> String {
        format!(
            "{}/{}",
            self.container_dir.trim_end_matches('/'),
            self.script_name
        )
    }
}

/// Interpreters tried, in order, when executing user code
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    pub primary: String,
    pub fallback: String,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            primary: "python3".to_string(),
            fallback: "python".to_string(),
        }
    }
}

impl GlobalConfig {
    /// Load global configuration from the default path
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load global configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            path: path.clone(),
            source: e,
        })?;
        config.validate()?;

        tracing::debug!(
            "Loaded config from {:?}: engine={}, container={}",
            path,
            config.engine.program,
            config.engine.container_name
        );

        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.clone(),
                source: e,
            })?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.clone(),
            source: e,
        })
    }

    /// Reject settings the session protocol cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.engine.program.trim().is_empty() {
            return Err(ConfigError::Invalid("engine.program is empty".to_string()));
        }
        if self.engine.container_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "engine.container_name is empty".to_string(),
            ));
        }
        // The prompt is sent split in two quoted halves so it needs at least two chars
        if self.session.prompt.trim().chars().count() < 2 {
            return Err(ConfigError::Invalid(
                "session.prompt must be at least two visible characters".to_string(),
            ));
        }
        if self.session.marker.trim().is_empty() || self.session.marker.contains(char::is_whitespace)
        {
            return Err(ConfigError::Invalid(
                "session.marker must be a single non-empty word".to_string(),
            ));
        }
        if self.session.marker.starts_with(self.session.prompt.trim_end()) {
            return Err(ConfigError::Invalid(
                "session.marker must not begin with the prompt".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "runbox").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path
    pub fn data_dir() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "runbox").ok_or(ConfigError::NoDataDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }

    /// Check if the config file exists on disk
    pub fn config_exists() -> bool {
        Self::config_path()
            .map(|p| p.exists())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GlobalConfig::default();
        assert_eq!(config.engine.program, "podman");
        assert_eq!(config.engine.container_name, "runbox");
        assert_eq!(config.session.prompt, "PROMPT> ");
        assert_eq!(config.session.marker, "__CMD_END__");
        assert_eq!(config.session.prompt_timeout(), Duration::from_secs(20));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[engine]
program = "docker"
prefix = ["sudo", "-u", "runner"]
container_name = "sandbox"

[session]
marker = "__DONE__"
command_timeout_secs = 60

[interpreters]
primary = "python3.12"
"#;

        let config: GlobalConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.engine.program, "docker");
        assert_eq!(config.engine.prefix, vec!["sudo", "-u", "runner"]);
        assert_eq!(config.engine.container_name, "sandbox");
        // Unset fields keep their defaults
        assert_eq!(config.engine.default_image, "python:3.12");
        assert_eq!(config.session.marker, "__DONE__");
        assert_eq!(config.session.prompt, "PROMPT> ");
        assert_eq!(config.session.command_timeout(), Duration::from_secs(60));
        assert_eq!(config.interpreters.primary, "python3.12");
        assert_eq!(config.interpreters.fallback, "python");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nope.toml");
        let config = GlobalConfig::load_from(&path).unwrap();
        assert_eq!(config.engine.program, "podman");
    }

    #[test]
    fn test_save_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.toml");
        let mut config = GlobalConfig::default();
        config.engine.program = "docker".to_string();
        config.workspace.host_dir = Some("/srv/runbox".to_string());
        config.save_to(&path).unwrap();

        let loaded = GlobalConfig::load_from(&path).unwrap();
        assert_eq!(loaded.engine.program, "docker");
        assert_eq!(loaded.workspace.host_dir.as_deref(), Some("/srv/runbox"));
    }

    #[test]
    fn test_load_invalid_toml_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[engine\nprogram = ").unwrap();
        let err = GlobalConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TomlParseError { .. }));
    }

    #[test]
    fn test_validate_rejects_short_prompt() {
        let mut config = GlobalConfig::default();
        config.session.prompt = "$".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_marker_with_spaces() {
        let mut config = GlobalConfig::default();
        config.session.marker = "END OF CMD".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_workspace_paths() {
        let ws = WorkspaceConfig {
            host_dir: Some("/tmp/rb".to_string()),
            container_dir: "/workspace/".to_string(),
            script_name: "main.py".to_string(),
        };
        assert_eq!(ws.resolve_host_dir().unwrap(), PathBuf::from("/tmp/rb"));
        assert_eq!(ws.container_script_path(), "/workspace/main.py");
    }
}
