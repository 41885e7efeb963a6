//! Session manager - owns the container lifecycle and coordinates operations
//!
//! Every public operation takes the one session lock for its whole duration,
//! so operations are serialized and at most one interactive shell exists per
//! container. Operations never return `Err`; failures are folded into an
//! [`ActionReport`] for the caller to render.

mod exec;
mod lifecycle;

use crate::session::{SessionEngine, SessionOutput, SessionTimeouts, ShellSpawner};
use crate::{ContainerSession, CoreError, LifecycleState, Result};
use runbox_config::GlobalConfig;
use runbox_provider::{CommandRunner, EngineArgs};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// What an operation returns to the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionReport {
    pub ok: bool,
    /// Lifecycle state after the operation
    pub state: LifecycleState,
    pub text: String,
}

impl std::fmt::Display for ActionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Main session manager
pub struct SessionManager {
    /// One-shot engine commands (pull, create, rm)
    runner: Arc<dyn CommandRunner>,
    /// Interactive sessions (run, execute_*)
    engine: SessionEngine,
    engine_args: EngineArgs,
    config: GlobalConfig,
    /// Host side of the workspace bind mount
    host_dir: PathBuf,
    session: Mutex<ContainerSession>,
}

impl SessionManager {
    /// Create a manager driving the configured engine CLI
    #[cfg(unix)]
    pub fn new(config: GlobalConfig) -> Result<Self> {
        let runner: Arc<dyn CommandRunner> =
            Arc::new(runbox_provider::CliRunner::from_config(&config.engine)?);
        let host_dir = config.workspace.resolve_host_dir()?;
        let engine_args = Self::build_engine_args(&config, runner.as_ref(), &host_dir);
        let spawner = Arc::new(crate::session::PtySpawner::new(
            runner.as_ref(),
            engine_args,
        ));
        Ok(Self::from_parts(config, runner, spawner, host_dir))
    }

    #[cfg(not(unix))]
    pub fn new(_config: GlobalConfig) -> Result<Self> {
        Err(CoreError::SpawnFailed(
            "interactive sessions require a unix host".to_string(),
        ))
    }

    /// Create a manager from explicit collaborators
    pub fn from_parts(
        config: GlobalConfig,
        runner: Arc<dyn CommandRunner>,
        spawner: Arc<dyn ShellSpawner>,
        host_dir: PathBuf,
    ) -> Self {
        let engine_args = Self::build_engine_args(&config, runner.as_ref(), &host_dir);
        let engine = SessionEngine::new(spawner, &config.session);
        let session = ContainerSession::new(config.engine.container_name.clone());
        Self {
            runner,
            engine,
            engine_args,
            config,
            host_dir,
            session: Mutex::new(session),
        }
    }

    /// Override the session protocol timeouts
    pub fn with_timeouts(mut self, timeouts: SessionTimeouts) -> Self {
        self.engine = self.engine.with_timeouts(timeouts);
        self
    }

    fn build_engine_args(
        config: &GlobalConfig,
        runner: &dyn CommandRunner,
        host_dir: &Path,
    ) -> EngineArgs {
        EngineArgs {
            kind: runner.kind(),
            container_name: config.engine.container_name.clone(),
            shell: config.session.shell.clone(),
            host_dir: host_dir.to_path_buf(),
            container_dir: config.workspace.container_dir.clone(),
        }
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    pub fn host_dir(&self) -> &Path {
        &self.host_dir
    }

    /// Snapshot of the container record
    pub async fn session(&self) -> ContainerSession {
        self.session.lock().await.clone()
    }

    pub async fn state(&self) -> LifecycleState {
        self.session.lock().await.state
    }

    /// Describe the current lifecycle state
    pub async fn status(&self) -> ActionReport {
        let session = self.session.lock().await;
        let text = match session.selected_image {
            Some(ref image) => format!(
                "Container {}: {} (image {})",
                session.name, session.state, image
            ),
            None => format!("Container {}: {}", session.name, session.state),
        };
        ActionReport {
            ok: true,
            state: session.state,
            text,
        }
    }

    /// Run `commands` in a fresh interactive session on a blocking thread
    pub(crate) async fn run_commands(
        &self,
        container_name: &str,
        commands: Vec<String>,
        progress: Option<&mpsc::UnboundedSender<String>>,
    ) -> Result<SessionOutput> {
        let engine = self.engine.clone();
        let name = container_name.to_string();
        let progress = progress.cloned();

        tokio::task::spawn_blocking(move || engine.run_session(&commands, &name, progress.as_ref()))
            .await
            .map_err(|e| CoreError::WorkerFailed(e.to_string()))?
    }

    /// Fold an operation result into the report shown to the user
    pub(crate) fn finish(action: &str, state: LifecycleState, result: Result<String>) -> ActionReport {
        match result {
            Ok(text) => {
                tracing::info!("{}: {}", action, text);
                ActionReport {
                    ok: true,
                    state,
                    text,
                }
            }
            Err(e) => {
                tracing::warn!("{} failed: {}", action, e);
                ActionReport {
                    ok: false,
                    state,
                    text: e.to_string(),
                }
            }
        }
    }
}

/// Send a progress message if a channel is attached
pub(crate) fn send_progress(progress: Option<&mpsc::UnboundedSender<String>>, msg: &str) {
    if let Some(tx) = progress {
        let _ = tx.send(msg.to_string());
    }
}
