//! Container lifecycle state
//!
//! One `ContainerSession` record per manager. It only moves forward
//! (unselected → pulled → created → running) except on teardown, and every
//! change goes through `LifecycleState::next`.

use crate::{CoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Readiness stage of the managed container
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// No image selected
    Unselected,
    /// Image pulled, container not created
    Pulled,
    /// Container exists
    Created,
    /// A probe session against the container succeeded
    Running,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unselected => write!(f, "unselected"),
            Self::Pulled => write!(f, "pulled"),
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
        }
    }
}

/// Things that happen to the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    ImagePulled { image: String },
    ContainerCreated,
    SessionConfirmed,
    SessionFailed,
    TornDown,
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ImagePulled { image } => write!(f, "pull of {}", image),
            Self::ContainerCreated => write!(f, "create"),
            Self::SessionConfirmed => write!(f, "session confirmed"),
            Self::SessionFailed => write!(f, "session failed"),
            Self::TornDown => write!(f, "teardown"),
        }
    }
}

impl LifecycleState {
    /// The state after `event`, or `None` if the event is not legal here
    pub fn next(self, event: &LifecycleEvent) -> Option<Self> {
        use LifecycleEvent as E;
        use LifecycleState::*;

        match (self, event) {
            (_, E::TornDown) => Some(Unselected),
            (s, E::ImagePulled { .. }) => Some(s.max(Pulled)),
            (s @ (Pulled | Created | Running), E::ContainerCreated) => Some(s.max(Created)),
            (Created | Running, E::SessionConfirmed) => Some(Running),
            (Created | Running, E::SessionFailed) => Some(Created),
            _ => None,
        }
    }

    /// Check if a container can be created from this state
    pub fn can_create(self) -> bool {
        self >= Self::Pulled
    }

    /// Check if commands may be executed in this state.
    ///
    /// A created container that was never probed is usable.
    pub fn can_execute(self) -> bool {
        self >= Self::Created
    }
}

/// The one logical container managed by this instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSession {
    /// Container name (fixed per instance)
    pub name: String,
    /// Image chosen by the last successful pull
    pub selected_image: Option<String>,
    pub state: LifecycleState,
    /// Last transition time
    pub updated_at: DateTime<Utc>,
}

impl ContainerSession {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selected_image: None,
            state: LifecycleState::Unselected,
            updated_at: Utc::now(),
        }
    }

    /// Apply a lifecycle event, rejecting illegal transitions without mutating
    pub fn apply(&mut self, event: LifecycleEvent) -> Result<LifecycleState> {
        let next = self.state.next(&event).ok_or_else(|| {
            CoreError::InvalidState(format!("cannot apply {} while {}", event, self.state))
        })?;

        tracing::debug!("Container {}: {} -> {} ({})", self.name, self.state, next, event);

        match event {
            LifecycleEvent::ImagePulled { image } => self.selected_image = Some(image),
            LifecycleEvent::TornDown => self.selected_image = None,
            _ => {}
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleState::*;

    fn pulled(image: &str) -> LifecycleEvent {
        LifecycleEvent::ImagePulled {
            image: image.to_string(),
        }
    }

    #[test]
    fn test_states_are_ordered() {
        assert!(Unselected < Pulled);
        assert!(Pulled < Created);
        assert!(Created < Running);
    }

    #[test]
    fn test_forward_transitions() {
        assert_eq!(Unselected.next(&pulled("x")), Some(Pulled));
        assert_eq!(Pulled.next(&LifecycleEvent::ContainerCreated), Some(Created));
        assert_eq!(Created.next(&LifecycleEvent::SessionConfirmed), Some(Running));
    }

    #[test]
    fn test_never_moves_backwards_on_repeat() {
        assert_eq!(Running.next(&pulled("x")), Some(Running));
        assert_eq!(Created.next(&pulled("x")), Some(Created));
        assert_eq!(Running.next(&LifecycleEvent::ContainerCreated), Some(Running));
        assert_eq!(Created.next(&LifecycleEvent::ContainerCreated), Some(Created));
    }

    #[test]
    fn test_illegal_transitions() {
        assert_eq!(Unselected.next(&LifecycleEvent::ContainerCreated), None);
        assert_eq!(Pulled.next(&LifecycleEvent::SessionConfirmed), None);
        assert_eq!(Unselected.next(&LifecycleEvent::SessionFailed), None);
    }

    #[test]
    fn test_session_failure_reverts_to_created() {
        assert_eq!(Running.next(&LifecycleEvent::SessionFailed), Some(Created));
        assert_eq!(Created.next(&LifecycleEvent::SessionFailed), Some(Created));
    }

    #[test]
    fn test_teardown_from_any_state() {
        for s in [Unselected, Pulled, Created, Running] {
            assert_eq!(s.next(&LifecycleEvent::TornDown), Some(Unselected));
        }
    }

    #[test]
    fn test_guards() {
        assert!(!Unselected.can_create());
        assert!(Pulled.can_create());
        assert!(!Pulled.can_execute());
        assert!(Created.can_execute());
        assert!(Running.can_execute());
    }

    #[test]
    fn test_apply_records_image_and_resets() {
        let mut cs = ContainerSession::new("runbox");
        let before = cs.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(5));

        cs.apply(pulled("python:3.12")).unwrap();
        assert_eq!(cs.state, Pulled);
        assert_eq!(cs.selected_image.as_deref(), Some("python:3.12"));
        assert!(cs.updated_at > before);

        cs.apply(LifecycleEvent::ContainerCreated).unwrap();
        cs.apply(LifecycleEvent::TornDown).unwrap();
        assert_eq!(cs.state, Unselected);
        assert!(cs.selected_image.is_none());
    }

    #[test]
    fn test_apply_illegal_leaves_record_untouched() {
        let mut cs = ContainerSession::new("runbox");
        let err = cs.apply(LifecycleEvent::ContainerCreated).unwrap_err();
        assert!(err.to_string().contains("cannot apply create while unselected"));
        assert_eq!(cs.state, Unselected);
    }

    #[test]
    fn test_display() {
        assert_eq!(Running.to_string(), "running");
        assert_eq!(LifecycleState::Unselected.to_string(), "unselected");
    }
}
