//! Classification of engine output.
//!
//! The engine has no structured error contract that we rely on; success and
//! failure are read from literal substrings of the captured text. All of that
//! matching lives here so the rest of the code only sees `EngineOutcome`.

use crate::CommandOutput;

/// What an engine invocation amounted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome {
    /// No error text and something on stdout
    Success,
    /// The named object already exists (create conflicts)
    AlreadyExists(String),
    /// The named object does not exist
    NotFound(String),
    /// Any other failure, carrying the text to show the user
    Failed(String),
}

impl EngineOutcome {
    pub fn classify(output: &CommandOutput) -> Self {
        let stderr = output.stderr.trim();

        if stderr.contains("already exists") || stderr.contains("already in use") {
            return Self::AlreadyExists(stderr.to_string());
        }
        // Only container-specific phrases; `command not found` from a prefix is a failure
        if stderr.contains("No such container") || stderr.contains("no such container") {
            return Self::NotFound(stderr.to_string());
        }
        if stderr.contains("Error") {
            return Self::Failed(stderr.to_string());
        }
        if output.stdout.trim().is_empty() {
            let detail = if stderr.is_empty() {
                "engine produced no output".to_string()
            } else {
                stderr.to_string()
            };
            return Self::Failed(detail);
        }
        Self::Success
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Human-readable detail text, empty on success
    pub fn detail(&self) -> &str {
        match self {
            Self::Success => "",
            Self::AlreadyExists(s) | Self::NotFound(s) | Self::Failed(s) => s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_requires_stdout() {
        let out = CommandOutput::new("sha256:abc\n", "");
        assert_eq!(EngineOutcome::classify(&out), EngineOutcome::Success);

        let out = CommandOutput::new("", "");
        assert!(matches!(
            EngineOutcome::classify(&out),
            EngineOutcome::Failed(ref s) if s == "engine produced no output"
        ));
    }

    #[test]
    fn test_progress_on_stderr_is_not_an_error() {
        // podman pull reports progress on stderr
        let out = CommandOutput::new(
            "4f0b8a3c\n",
            "Trying to pull docker.io/library/python:3.12...\nCopying blob 1b2c done\n",
        );
        assert!(EngineOutcome::classify(&out).is_success());
    }

    #[test]
    fn test_error_substring() {
        let out = CommandOutput::new("", "Error: short-name resolution failed");
        assert_eq!(
            EngineOutcome::classify(&out),
            EngineOutcome::Failed("Error: short-name resolution failed".to_string())
        );
    }

    #[test]
    fn test_already_exists_wins_over_error() {
        let out = CommandOutput::new(
            "",
            "Error: creating container storage: the container name \"runbox\" is already in use",
        );
        assert!(matches!(
            EngineOutcome::classify(&out),
            EngineOutcome::AlreadyExists(_)
        ));

        let out = CommandOutput::new("", "Error: container runbox already exists");
        assert!(matches!(
            EngineOutcome::classify(&out),
            EngineOutcome::AlreadyExists(_)
        ));
    }

    #[test]
    fn test_not_found_variants() {
        for stderr in [
            "Error response from daemon: No such container: runbox",
            "Error: no container with name or ID \"runbox\" found: no such container",
        ] {
            let out = CommandOutput::new("", stderr);
            assert!(
                matches!(EngineOutcome::classify(&out), EngineOutcome::NotFound(_)),
                "expected NotFound for {stderr}"
            );
        }
    }

    #[test]
    fn test_missing_engine_is_a_failure() {
        for stderr in [
            "sudo: podman: command not found",
            "Error: docker: executable file not found in $PATH",
            "Error: failed to run podman: No such file or directory (os error 2)",
        ] {
            let out = CommandOutput::new("", stderr);
            assert!(
                matches!(EngineOutcome::classify(&out), EngineOutcome::Failed(_)),
                "expected Failed for {stderr}"
            );
        }
    }

    #[test]
    fn test_detail_text() {
        assert_eq!(EngineOutcome::Success.detail(), "");
        assert_eq!(EngineOutcome::Failed("boom".into()).detail(), "boom");
    }
}
