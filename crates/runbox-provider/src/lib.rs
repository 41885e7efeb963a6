//! Container engine command runner for runbox
//!
//! This crate wraps the external engine executable (Docker or Podman):
//! running one-shot commands, classifying their output, and building the
//! argument vectors used for the managed container.

mod cli_runner;
mod error;
mod outcome;
mod types;

pub use cli_runner::CliRunner;
pub use error::*;
pub use outcome::EngineOutcome;
pub use types::*;

use async_trait::async_trait;

/// Runs non-interactive engine commands.
///
/// Implementations never fail: spawn errors and non-zero exits come back as
/// whatever text was captured, and callers classify it with `EngineOutcome`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the engine with `args` and capture stdout/stderr
    async fn run(&self, args: &[String]) -> CommandOutput;

    /// Program and leading arguments for spawning the engine directly
    /// (used for the interactive attach)
    fn runtime_args(&self) -> (String, Vec<String>);

    /// Engine flavour
    fn kind(&self) -> EngineKind;
}
