//! Interactive session engine
//!
//! Drives one shell inside the container through a terminal. The shell's
//! prompt is switched to a known string that acts as a sync beacon, and every
//! command is followed by `echo <marker>` so its output can be cut out of the
//! stream. A session lives for exactly one call to [`SessionEngine::run_session`]
//! and its transport is closed on every exit path.

mod expect;
#[cfg(unix)]
mod pty;

#[cfg(unix)]
pub use pty::{PtyShell, PtySpawner};

use crate::manager::send_progress;
use crate::sanitize::{marker_echo_command, Sanitizer};
use crate::{CoreError, Result};
use expect::{ExpectError, ShellIo};
use runbox_config::SessionConfig;
use serde::Serialize;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Result of one bounded read from a shell transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Data(String),
    Timeout,
    Eof,
}

/// Byte-level connection to an interactive shell
pub trait ShellTransport: Send {
    /// Write raw text to the shell's input
    fn send(&mut self, data: &str) -> io::Result<()>;

    /// Read whatever is available, waiting at most `timeout`
    fn read_chunk(&mut self, timeout: Duration) -> io::Result<ReadOutcome>;

    /// Terminate the shell and release its resources
    fn close(&mut self);
}

/// Creates shell transports attached to a named container
pub trait ShellSpawner: Send + Sync {
    fn spawn(&self, container_name: &str) -> Result<Box<dyn ShellTransport>>;

    /// Stop the shell running inside the container after a session that
    /// did not end with the shell exiting
    fn stop(&self, container_name: &str) -> Result<()>;
}

/// Bounded waits used by the session protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    pub startup: Duration,
    pub prompt: Duration,
    pub command: Duration,
    pub marker: Duration,
    pub exit: Duration,
    /// Opportunistic drains of a prompt that may or may not arrive
    pub settle: Duration,
}

const SETTLE_TIMEOUT: Duration = Duration::from_millis(500);

impl SessionTimeouts {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            startup: config.startup_timeout(),
            prompt: config.prompt_timeout(),
            command: config.command_timeout(),
            marker: config.marker_timeout(),
            exit: config.exit_timeout(),
            settle: SETTLE_TIMEOUT,
        }
    }
}

/// How a command's capture ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Completed,
    /// The prompt never came back within the command timeout
    TimedOut,
    /// The shell closed the stream while the command was running
    ShellExited,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub command: String,
    /// Sanitized output
    pub output: String,
    pub status: CommandStatus,
}

impl CommandResult {
    pub fn timed_out(&self) -> bool {
        self.status == CommandStatus::TimedOut
    }
}

/// Everything one session produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionOutput {
    /// `> <command>\n<output>\n---\n` per command
    pub terminal_output: String,
    /// Output of the last command plus anything flushed before the shell exited
    pub code_output: String,
    pub results: Vec<CommandResult>,
}

impl SessionOutput {
    /// Every command ran to its prompt
    pub fn is_complete(&self) -> bool {
        self.results
            .iter()
            .all(|r| r.status == CommandStatus::Completed)
    }
}

/// Runs command batches in fresh interactive sessions
#[derive(Clone)]
pub struct SessionEngine {
    spawner: Arc<dyn ShellSpawner>,
    prompt: String,
    marker: String,
    term: String,
    timeouts: SessionTimeouts,
    sanitizer: Sanitizer,
}

impl SessionEngine {
    pub fn new(spawner: Arc<dyn ShellSpawner>, config: &SessionConfig) -> Self {
        Self {
            spawner,
            prompt: config.prompt.clone(),
            marker: config.marker.clone(),
            term: config.term.clone(),
            timeouts: SessionTimeouts::from_config(config),
            sanitizer: Sanitizer::from_config(config),
        }
    }

    pub fn with_timeouts(mut self, timeouts: SessionTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Open a session on `container_name`, run `commands` in order and exit.
    ///
    /// Blocking; callers on the async runtime use `spawn_blocking`. Fails only
    /// when no usable prompt is established. Per-command timeouts are
    /// recorded in the result and the batch continues.
    pub fn run_session(
        &self,
        commands: &[String],
        container_name: &str,
        progress: Option<&mpsc::UnboundedSender<String>>,
    ) -> Result<SessionOutput> {
        send_progress(progress, &format!("Attaching to {}...", container_name));
        let transport = self.spawner.spawn(container_name)?;
        let mut io = ShellIo::new(transport);

        let result = self.drive(&mut io, commands, progress);
        let exited = io.is_eof();
        io.close();

        // Closing the attach client leaves the container's shell alive if it never exited
        if !exited {
            tracing::warn!("Shell in {} did not exit, stopping it", container_name);
            if let Err(e) = self.spawner.stop(container_name) {
                tracing::warn!("Failed to stop shell in {}: {}", container_name, e);
            }
        }
        result
    }

    fn drive(
        &self,
        io: &mut ShellIo,
        commands: &[String],
        progress: Option<&mpsc::UnboundedSender<String>>,
    ) -> Result<SessionOutput> {
        self.establish_prompt(io)?;

        let mut out = SessionOutput::default();
        let mut last_clean = String::new();

        for command in commands {
            send_progress(progress, &format!("$ {}", command));
            let result = self.run_command(io, command)?;

            match result.status {
                CommandStatus::Completed => {
                    out.terminal_output
                        .push_str(&format!("> {}\n{}\n---\n", command, result.output));
                    last_clean = result.output.clone();
                }
                CommandStatus::TimedOut => {
                    tracing::warn!("Timed out waiting for prompt after `{}`", command);
                    out.terminal_output.push_str(&format!(
                        "> {}\n[timed out waiting for prompt]\n---\n",
                        command
                    ));
                    last_clean.clear();
                }
                CommandStatus::ShellExited => {
                    tracing::warn!("Shell exited while running `{}`", command);
                    out.terminal_output
                        .push_str(&format!("> {}\n{}\n---\n", command, result.output));
                    last_clean = result.output.clone();
                }
            }

            let exited = result.status == CommandStatus::ShellExited;
            out.results.push(result);
            if exited {
                break;
            }
        }

        let tail = self.exit_shell(io)?;
        out.code_output = join_nonempty(&last_clean, &tail);
        Ok(out)
    }

    /// Switch the prompt and wait for it to show up
    fn establish_prompt(&self, io: &mut ShellIo) -> Result<()> {
        match io.expect_any(self.timeouts.startup) {
            Ok(_) => {}
            Err(ExpectError::Timeout) => {
                tracing::warn!(
                    "No output from shell within {}s, continuing",
                    self.timeouts.startup.as_secs_f32()
                );
            }
            Err(ExpectError::Eof) => {
                return Err(CoreError::SessionClosed(
                    self.sanitizer.clean("", &io.take_buffer()),
                ));
            }
            Err(ExpectError::Io(e)) => return Err(e.into()),
        }
        io.take_buffer();

        io.send_line(&prompt_setup_line(&self.term, &self.prompt))?;
        io.send_line("")?;

        match io.expect(&self.prompt, self.timeouts.prompt) {
            Ok(_) => {}
            Err(ExpectError::Timeout) => {
                return Err(CoreError::PromptTimeout(self.timeouts.prompt));
            }
            Err(ExpectError::Eof) => {
                return Err(CoreError::SessionClosed(
                    self.sanitizer.clean("", &io.take_buffer()),
                ));
            }
            Err(ExpectError::Io(e)) => return Err(e.into()),
        }

        // The blank line yields a second prompt
        let _ = io.expect(&self.prompt, self.timeouts.settle);
        io.take_buffer();
        tracing::debug!("Shell prompt established");
        Ok(())
    }

    fn run_command(&self, io: &mut ShellIo, command: &str) -> Result<CommandResult> {
        io.send_line(command)?;

        let before_prompt = match io.expect(&self.prompt, self.timeouts.command) {
            Ok(text) => text,
            Err(ExpectError::Timeout) => {
                let partial = io.take_buffer();
                return Ok(CommandResult {
                    command: command.to_string(),
                    output: self.sanitizer.clean(command, &partial),
                    status: CommandStatus::TimedOut,
                });
            }
            Err(ExpectError::Eof) => {
                let partial = io.take_buffer();
                return Ok(CommandResult {
                    command: command.to_string(),
                    output: self.sanitizer.clean(command, &partial),
                    status: CommandStatus::ShellExited,
                });
            }
            Err(ExpectError::Io(e)) => return Err(e.into()),
        };

        io.send_line(&marker_echo_command(&self.marker))?;
        let before_marker = match io.expect_line_start(&self.marker, self.timeouts.marker) {
            Ok(text) => text,
            Err(ExpectError::Timeout) | Err(ExpectError::Eof) => {
                tracing::debug!("Marker not seen after `{}`", command);
                String::new()
            }
            Err(ExpectError::Io(e)) => return Err(e.into()),
        };

        if !io.is_eof() {
            let _ = io.expect(&self.prompt, self.timeouts.settle);
        }
        io.take_buffer();

        // Output without a trailing newline must not share a line with the marker echo
        let mut raw = before_prompt;
        raw.push('\n');
        raw.push_str(&before_marker);
        Ok(CommandResult {
            command: command.to_string(),
            output: self.sanitizer.clean(command, &raw),
            status: CommandStatus::Completed,
        })
    }

    /// Ask the shell to exit and collect anything it flushes on the way out
    fn exit_shell(&self, io: &mut ShellIo) -> Result<String> {
        if io.is_eof() {
            return Ok(self.sanitizer.clean("exit", &io.take_buffer()));
        }
        io.send_line("exit")?;
        match io.expect_eof(self.timeouts.exit) {
            Ok(tail) => Ok(self.sanitizer.clean("exit", &tail)),
            Err(ExpectError::Timeout) => {
                tracing::warn!(
                    "Shell did not exit within {}s, closing",
                    self.timeouts.exit.as_secs_f32()
                );
                Ok(self.sanitizer.clean("exit", &io.take_buffer()))
            }
            Err(ExpectError::Eof) => Ok(String::new()),
            Err(ExpectError::Io(e)) => Err(e.into()),
        }
    }
}

/// `export TERM=.. PS1=..` with the prompt split across two quoted halves,
/// so the echoed input never contains the literal prompt
pub fn prompt_setup_line(term: &str, prompt: &str) -> String {
    let mid = prompt
        .char_indices()
        .nth(prompt.chars().count() / 2)
        .map(|(i, _)| i)
        .unwrap_or(prompt.len());
    let (head, tail) = prompt.split_at(mid);
    format!(
        "export TERM={} PS1={}{}",
        term,
        single_quote(head),
        single_quote(tail)
    )
}

fn single_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn join_nonempty(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (_, true) => a.to_string(),
        _ => format!("{}\n{}", a, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockSpawner, ScriptedShell};
    use std::time::Instant;

    fn fast_timeouts() -> SessionTimeouts {
        SessionTimeouts {
            startup: Duration::from_millis(200),
            prompt: Duration::from_millis(300),
            command: Duration::from_millis(300),
            marker: Duration::from_millis(200),
            exit: Duration::from_millis(200),
            settle: Duration::from_millis(50),
        }
    }

    fn engine(spawner: Arc<MockSpawner>) -> SessionEngine {
        SessionEngine::new(spawner, &SessionConfig::default()).with_timeouts(fast_timeouts())
    }

    fn cmds(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_prompt_setup_line_splits_prompt() {
        let line = prompt_setup_line("dumb", "PROMPT> ");
        assert_eq!(line, "export TERM=dumb PS1='PROM''PT> '");
        assert!(!line.contains("PROMPT> "));
    }

    #[test]
    fn test_prompt_setup_line_escapes_quotes() {
        assert_eq!(prompt_setup_line("dumb", "a'b$ "), r"export TERM=dumb PS1='a'\''''b$ '");
    }

    #[test]
    fn test_runs_commands_and_delimits_output() {
        let shell = ScriptedShell::new("PROMPT> ").respond("ls", "a.txt\r\nb.txt");
        let spawner = Arc::new(MockSpawner::new(shell));
        let out = engine(spawner.clone())
            .run_session(&cmds(&["ls"]), "runbox", None)
            .unwrap();

        assert_eq!(out.terminal_output, "> ls\na.txt\nb.txt\n---\n");
        assert_eq!(out.code_output, "a.txt\nb.txt");
        assert!(out.is_complete());
        assert_eq!(spawner.spawned(), vec!["runbox"]);
        assert_eq!(spawner.close_count(), 1);
        assert!(spawner.stopped().is_empty());
    }

    #[test]
    fn test_output_without_trailing_newline() {
        let shell = ScriptedShell::new("PROMPT> ")
            .respond_raw("printf x", "x")
            .respond("pwd", "/workspace");
        let spawner = Arc::new(MockSpawner::new(shell));
        let out = engine(spawner)
            .run_session(&cmds(&["printf x", "pwd"]), "runbox", None)
            .unwrap();

        assert_eq!(out.results[0].output, "x");
        assert_eq!(out.terminal_output, "> printf x\nx\n---\n> pwd\n/workspace\n---\n");
        assert!(!out.terminal_output.contains("__CMD_END__"));
    }

    #[test]
    fn test_output_without_trailing_newline_no_echo() {
        let shell = ScriptedShell::new("PROMPT> ")
            .without_echo()
            .respond_raw("python3 /workspace/snippet.py", "42");
        let spawner = Arc::new(MockSpawner::new(shell));
        let out = engine(spawner)
            .run_session(&cmds(&["python3 /workspace/snippet.py"]), "runbox", None)
            .unwrap();

        assert_eq!(out.code_output, "42");
    }

    #[test]
    fn test_marker_handshake_without_echo() {
        let shell = ScriptedShell::new("PROMPT> ")
            .without_echo()
            .respond("python3 /workspace/snippet.py", "hello");
        let spawner = Arc::new(MockSpawner::new(shell));
        let out = engine(spawner.clone())
            .run_session(&cmds(&["python3 /workspace/snippet.py"]), "runbox", None)
            .unwrap();

        assert_eq!(out.results[0].output, "hello");
        assert_eq!(out.code_output, "hello");
    }

    #[test]
    fn test_several_commands_in_order() {
        let shell = ScriptedShell::new("PROMPT> ")
            .respond("pwd", "/workspace")
            .respond("whoami", "root");
        let spawner = Arc::new(MockSpawner::new(shell));
        let out = engine(spawner)
            .run_session(&cmds(&["pwd", "whoami"]), "runbox", None)
            .unwrap();

        assert_eq!(
            out.terminal_output,
            "> pwd\n/workspace\n---\n> whoami\nroot\n---\n"
        );
        assert_eq!(out.code_output, "root");
    }

    #[test]
    fn test_prompt_never_appears() {
        let shell = ScriptedShell::new("PROMPT> ").without_prompt();
        let spawner = Arc::new(MockSpawner::new(shell));
        let engine = engine(spawner.clone());

        let started = Instant::now();
        let err = engine.run_session(&cmds(&["ls"]), "runbox", None).unwrap_err();

        assert!(matches!(err, CoreError::PromptTimeout(_)));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(spawner.close_count(), 1);
        assert_eq!(spawner.stopped(), vec!["runbox"]);
    }

    #[test]
    fn test_hanging_command_times_out_and_batch_continues() {
        let shell = ScriptedShell::new("PROMPT> ")
            .hang_on("sleep 100")
            .respond("pwd", "/workspace");
        let spawner = Arc::new(MockSpawner::new(shell));
        let out = engine(spawner.clone())
            .run_session(&cmds(&["sleep 100", "pwd"]), "runbox", None)
            .unwrap();

        assert!(out
            .terminal_output
            .starts_with("> sleep 100\n[timed out waiting for prompt]\n---\n"));
        assert!(out.results[0].timed_out());
        assert_eq!(out.results[1].output, "/workspace");
        assert!(!out.is_complete());
        assert_eq!(spawner.close_count(), 1);
    }

    #[test]
    fn test_shell_that_ignores_exit_is_closed() {
        let shell = ScriptedShell::new("PROMPT> ")
            .ignore_exit()
            .respond("true", "");
        let spawner = Arc::new(MockSpawner::new(shell));
        let out = engine(spawner.clone())
            .run_session(&cmds(&["true"]), "runbox", None)
            .unwrap();

        assert_eq!(out.terminal_output, "> true\n\n---\n");
        assert_eq!(spawner.close_count(), 1);
        assert_eq!(spawner.stopped(), vec!["runbox"]);
    }

    #[test]
    fn test_stop_failure_does_not_mask_output() {
        let shell = ScriptedShell::new("PROMPT> ")
            .ignore_exit()
            .respond("pwd", "/workspace");
        let spawner = Arc::new(MockSpawner::new(shell).fail_stop_with("no such container"));
        let out = engine(spawner.clone())
            .run_session(&cmds(&["pwd"]), "runbox", None)
            .unwrap();

        assert_eq!(out.code_output, "/workspace");
        assert_eq!(spawner.stopped(), vec!["runbox"]);
    }

    #[test]
    fn test_spawn_failure_surfaces() {
        let spawner = Arc::new(
            MockSpawner::new(ScriptedShell::new("PROMPT> ")).fail_with("no such container"),
        );
        let err = engine(spawner.clone())
            .run_session(&cmds(&["ls"]), "runbox", None)
            .unwrap_err();

        assert!(matches!(err, CoreError::SpawnFailed(_)));
        assert_eq!(spawner.close_count(), 0);
        assert!(spawner.stopped().is_empty());
    }

    #[test]
    fn test_progress_messages() {
        let shell = ScriptedShell::new("PROMPT> ").respond("ls", "x");
        let spawner = Arc::new(MockSpawner::new(shell));
        let (tx, mut rx) = mpsc::unbounded_channel();
        engine(spawner)
            .run_session(&cmds(&["ls"]), "runbox", Some(&tx))
            .unwrap();

        assert_eq!(rx.try_recv().unwrap(), "Attaching to runbox...");
        assert_eq!(rx.try_recv().unwrap(), "$ ls");
    }

    #[test]
    fn test_join_nonempty() {
        assert_eq!(join_nonempty("", "b"), "b");
        assert_eq!(join_nonempty("a", ""), "a");
        assert_eq!(join_nonempty("a", "b"), "a\nb");
    }
}
