//! Execution operations for SessionManager

use crate::session::SessionOutput;
use crate::{write_script, ContainerSession, CoreError, Result};
use tokio::sync::mpsc;

use super::{send_progress, ActionReport, SessionManager};

impl SessionManager {
    /// Run each non-blank line of `text` as a shell command; returns the transcript
    pub async fn execute_terminal(&self, text: &str) -> ActionReport {
        self.execute_terminal_inner(text, None).await
    }

    pub async fn execute_terminal_with_progress(
        &self,
        text: &str,
        progress: mpsc::UnboundedSender<String>,
    ) -> ActionReport {
        self.execute_terminal_inner(text, Some(&progress)).await
    }

    async fn execute_terminal_inner(
        &self,
        text: &str,
        progress: Option<&mpsc::UnboundedSender<String>>,
    ) -> ActionReport {
        let session = self.session.lock().await;
        let result = self.do_execute_terminal(&session, text, progress).await;
        Self::finish("execute_terminal", session.state, result)
    }

    async fn do_execute_terminal(
        &self,
        session: &ContainerSession,
        text: &str,
        progress: Option<&mpsc::UnboundedSender<String>>,
    ) -> Result<String> {
        Self::require_executable(session)?;

        let commands: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();
        if commands.is_empty() {
            return Err(CoreError::InvalidInput("no commands to run".to_string()));
        }

        let output = self.run_commands(&session.name, commands, progress).await?;
        Ok(output.terminal_output)
    }

    /// Write `source` to the workspace and run it with the configured interpreter
    pub async fn execute_code(&self, source: &str) -> ActionReport {
        self.execute_code_inner(source, None).await
    }

    pub async fn execute_code_with_progress(
        &self,
        source: &str,
        progress: mpsc::UnboundedSender<String>,
    ) -> ActionReport {
        self.execute_code_inner(source, Some(&progress)).await
    }

    async fn execute_code_inner(
        &self,
        source: &str,
        progress: Option<&mpsc::UnboundedSender<String>>,
    ) -> ActionReport {
        let session = self.session.lock().await;
        let result = self.do_execute_code(&session, source, progress).await;
        Self::finish("execute_code", session.state, result)
    }

    async fn do_execute_code(
        &self,
        session: &ContainerSession,
        source: &str,
        progress: Option<&mpsc::UnboundedSender<String>>,
    ) -> Result<String> {
        Self::require_executable(session)?;
        if source.trim().is_empty() {
            return Err(CoreError::InvalidInput("no code to run".to_string()));
        }

        let workspace = &self.config.workspace;
        write_script(&self.host_dir, &workspace.script_name, source)?;
        let script = workspace.container_script_path();

        let interpreters = &self.config.interpreters;
        let command = format!("{} {}", interpreters.primary, script);
        let mut output = self
            .run_commands(&session.name, vec![command], progress)
            .await?;

        if interpreter_missing(&output, &interpreters.primary)
            && !interpreters.fallback.is_empty()
            && interpreters.fallback != interpreters.primary
        {
            tracing::info!(
                "{} not available in container, retrying with {}",
                interpreters.primary,
                interpreters.fallback
            );
            send_progress(
                progress,
                &format!("{} not found, trying {}...", interpreters.primary, interpreters.fallback),
            );
            let command = format!("{} {}", interpreters.fallback, script);
            output = self
                .run_commands(&session.name, vec![command], progress)
                .await?;
        }

        // A timed out run has no trustworthy code output; show the transcript
        if output.is_complete() {
            Ok(output.code_output)
        } else {
            Ok(output.terminal_output)
        }
    }

    fn require_executable(session: &ContainerSession) -> Result<()> {
        if session.state.can_execute() {
            Ok(())
        } else {
            Err(CoreError::InvalidState(format!(
                "container is {}; create it before executing",
                session.state
            )))
        }
    }
}

/// The shell reported that `interpreter` does not exist
fn interpreter_missing(output: &SessionOutput, interpreter: &str) -> bool {
    let text = &output.terminal_output;
    text.contains(&format!("{}: not found", interpreter))
        || text.contains(&format!("{}: command not found", interpreter))
}
