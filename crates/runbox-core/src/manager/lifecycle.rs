//! Lifecycle operations for SessionManager: pull, create, run, teardown

use crate::{ContainerSession, CoreError, LifecycleEvent, LifecycleState, Result};
use runbox_provider::EngineOutcome;
use tokio::sync::mpsc;

use super::{send_progress, ActionReport, SessionManager};

impl SessionManager {
    /// Pull an image and select it for the container
    pub async fn pull(&self, image: &str) -> ActionReport {
        self.pull_inner(image, None).await
    }

    pub async fn pull_with_progress(
        &self,
        image: &str,
        progress: mpsc::UnboundedSender<String>,
    ) -> ActionReport {
        self.pull_inner(image, Some(&progress)).await
    }

    async fn pull_inner(
        &self,
        image: &str,
        progress: Option<&mpsc::UnboundedSender<String>>,
    ) -> ActionReport {
        let mut session = self.session.lock().await;
        let result = self.do_pull(&mut session, image.trim(), progress).await;
        Self::finish("pull", session.state, result)
    }

    async fn do_pull(
        &self,
        session: &mut ContainerSession,
        image: &str,
        progress: Option<&mpsc::UnboundedSender<String>>,
    ) -> Result<String> {
        if image.is_empty() {
            return Err(CoreError::InvalidInput("no image specified".to_string()));
        }
        if session.state >= LifecycleState::Created {
            if let Some(ref current) = session.selected_image {
                if current != image {
                    return Err(CoreError::InvalidState(format!(
                        "container {} was created from {}; run teardown before switching to {}",
                        session.name, current, image
                    )));
                }
            }
        }

        send_progress(progress, &format!("Pulling {}...", image));
        let output = self.runner.run(&self.engine_args.pull(image)).await;

        let outcome = EngineOutcome::classify(&output);
        if !outcome.is_success() {
            return Err(CoreError::EngineFailed {
                action: "Pull",
                detail: outcome.detail().to_string(),
            });
        }
        session.apply(LifecycleEvent::ImagePulled {
            image: image.to_string(),
        })?;
        Ok(format!("Image {} pulled successfully", image))
    }

    /// Create the container from the selected image
    pub async fn create(&self) -> ActionReport {
        self.create_inner(None).await
    }

    pub async fn create_with_progress(
        &self,
        progress: mpsc::UnboundedSender<String>,
    ) -> ActionReport {
        self.create_inner(Some(&progress)).await
    }

    async fn create_inner(&self, progress: Option<&mpsc::UnboundedSender<String>>) -> ActionReport {
        let mut session = self.session.lock().await;
        let result = self.do_create(&mut session, progress).await;
        Self::finish("create", session.state, result)
    }

    async fn do_create(
        &self,
        session: &mut ContainerSession,
        progress: Option<&mpsc::UnboundedSender<String>>,
    ) -> Result<String> {
        let image = match session.selected_image {
            Some(ref image) if session.state.can_create() => image.clone(),
            _ => {
                return Err(CoreError::InvalidState(
                    "No image pulled yet; pull an image first".to_string(),
                ))
            }
        };

        tokio::fs::create_dir_all(&self.host_dir).await?;

        send_progress(progress, &format!("Creating container {}...", session.name));
        let output = self.runner.run(&self.engine_args.create(&image)).await;

        match EngineOutcome::classify(&output) {
            EngineOutcome::Success => {
                session.apply(LifecycleEvent::ContainerCreated)?;
                Ok(format!("Container {} created from {}", session.name, image))
            }
            EngineOutcome::AlreadyExists(detail) => {
                tracing::debug!("Adopting existing container: {}", detail);
                session.apply(LifecycleEvent::ContainerCreated)?;
                Ok(format!("Container {} already exists; reusing it", session.name))
            }
            other => Err(CoreError::EngineFailed {
                action: "Create",
                detail: other.detail().to_string(),
            }),
        }
    }

    /// Confirm the container accepts interactive sessions
    pub async fn run(&self) -> ActionReport {
        self.run_inner(None).await
    }

    pub async fn run_with_progress(&self, progress: mpsc::UnboundedSender<String>) -> ActionReport {
        self.run_inner(Some(&progress)).await
    }

    async fn run_inner(&self, progress: Option<&mpsc::UnboundedSender<String>>) -> ActionReport {
        let mut session = self.session.lock().await;
        let result = self.do_run(&mut session, progress).await;
        Self::finish("run", session.state, result)
    }

    async fn do_run(
        &self,
        session: &mut ContainerSession,
        progress: Option<&mpsc::UnboundedSender<String>>,
    ) -> Result<String> {
        match session.state {
            LifecycleState::Running => {
                return Ok(format!("Container {} is already running", session.name));
            }
            LifecycleState::Created => {}
            other => {
                return Err(CoreError::InvalidState(format!(
                    "container is {}; create it before running",
                    other
                )));
            }
        }

        let probe = self
            .run_commands(&session.name, vec!["true".to_string()], progress)
            .await;

        match probe {
            Ok(output) if output.is_complete() => {
                session.apply(LifecycleEvent::SessionConfirmed)?;
                Ok(format!("Container {} is running", session.name))
            }
            Ok(output) => {
                session.apply(LifecycleEvent::SessionFailed)?;
                Err(CoreError::SessionIncomplete(
                    output.terminal_output.trim().to_string(),
                ))
            }
            Err(e) => {
                session.apply(LifecycleEvent::SessionFailed)?;
                Err(e)
            }
        }
    }

    /// Remove the container and reset the lifecycle, whatever the engine says
    pub async fn teardown(&self) -> ActionReport {
        self.teardown_inner(None).await
    }

    pub async fn teardown_with_progress(
        &self,
        progress: mpsc::UnboundedSender<String>,
    ) -> ActionReport {
        self.teardown_inner(Some(&progress)).await
    }

    async fn teardown_inner(&self, progress: Option<&mpsc::UnboundedSender<String>>) -> ActionReport {
        let mut session = self.session.lock().await;
        let result = self.do_teardown(&mut session, progress).await;
        Self::finish("teardown", session.state, result)
    }

    async fn do_teardown(
        &self,
        session: &mut ContainerSession,
        progress: Option<&mpsc::UnboundedSender<String>>,
    ) -> Result<String> {
        send_progress(progress, &format!("Removing container {}...", session.name));
        let output = self.runner.run(&self.engine_args.remove()).await;
        session.apply(LifecycleEvent::TornDown)?;

        // `docker rm -f` is silent for unknown names
        if output.stdout.trim().is_empty() && output.stderr.trim().is_empty() {
            return Ok(format!("Container {} was not present", session.name));
        }

        match EngineOutcome::classify(&output) {
            EngineOutcome::Success => Ok(format!("Container {} removed", session.name)),
            EngineOutcome::NotFound(_) => Ok(format!("Container {} was not present", session.name)),
            other => Err(CoreError::EngineFailed {
                action: "Teardown",
                detail: format!("{}; state reset anyway", other.detail()),
            }),
        }
    }
}
