//! Test support utilities for runbox-core
//!
//! Provides a recording `MockRunner` for engine commands and a scripted fake
//! shell for the session engine, so lifecycle and protocol logic can be
//! tested without a real Docker/Podman runtime.

use crate::session::{ReadOutcome, ShellSpawner, ShellTransport};
use crate::{CoreError, Result};
use async_trait::async_trait;
use runbox_provider::{CommandOutput, CommandRunner, EngineKind};
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Configurable engine runner that records every argv it is given
pub struct MockRunner {
    pub calls: Arc<Mutex<Vec<Vec<String>>>>,
    /// Output per engine subcommand (`pull`, `create`, `rm`, ...)
    pub responses: Arc<Mutex<HashMap<String, CommandOutput>>>,
}

impl MockRunner {
    /// Create a runner where every command succeeds
    pub fn new() -> Self {
        let mut responses = HashMap::new();
        responses.insert("pull".to_string(), CommandOutput::new("sha256:mock\n", ""));
        responses.insert(
            "create".to_string(),
            CommandOutput::new("mock_container_id\n", ""),
        );
        responses.insert("rm".to_string(), CommandOutput::new("runbox\n", ""));
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            responses: Arc::new(Mutex::new(responses)),
        }
    }

    /// Set the output returned for `subcommand`
    pub fn respond(&self, subcommand: &str, output: CommandOutput) {
        self.responses
            .lock()
            .unwrap()
            .insert(subcommand.to_string(), output);
    }

    pub fn get_calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Subcommands in call order
    pub fn subcommands(&self) -> Vec<String> {
        self.get_calls()
            .into_iter()
            .filter_map(|c| c.into_iter().next())
            .collect()
    }

    pub fn was_called_with(&self, args: &[&str]) -> bool {
        self.get_calls()
            .iter()
            .any(|c| c.iter().map(String::as_str).eq(args.iter().copied()))
    }
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, args: &[String]) -> CommandOutput {
        self.calls.lock().unwrap().push(args.to_vec());
        let sub = args.first().cloned().unwrap_or_default();
        self.responses
            .lock()
            .unwrap()
            .get(&sub)
            .cloned()
            .unwrap_or_else(|| CommandOutput::new("ok\n", ""))
    }

    fn runtime_args(&self) -> (String, Vec<String>) {
        ("podman".to_string(), vec![])
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Podman
    }
}

/// A fake interactive shell driven by canned responses.
///
/// Behaves like `sh` on a terminal: echoes input lines, switches its prompt
/// when `PS1=` is set, answers `echo X` with `X`, and closes on `exit`.
/// Clones share the close counter and the input log.
#[derive(Clone)]
pub struct ScriptedShell {
    prompt: String,
    current_prompt: String,
    emits_prompt: bool,
    echo: bool,
    ignore_exit: bool,
    responses: HashMap<String, String>,
    hanging: HashSet<String>,
    pending: String,
    eof: bool,
    closes: Arc<AtomicUsize>,
    open: Arc<AtomicUsize>,
    max_open: Arc<AtomicUsize>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl ScriptedShell {
    /// `prompt` is what the shell shows once `PS1` has been set
    pub fn new(prompt: &str) -> Self {
        Self {
            prompt: prompt.to_string(),
            current_prompt: "$ ".to_string(),
            emits_prompt: true,
            echo: true,
            ignore_exit: false,
            responses: HashMap::new(),
            hanging: HashSet::new(),
            pending: String::new(),
            eof: false,
            closes: Arc::new(AtomicUsize::new(0)),
            open: Arc::new(AtomicUsize::new(0)),
            max_open: Arc::new(AtomicUsize::new(0)),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Output `command` produces; line breaks should be `\r\n`
    pub fn respond(mut self, command: &str, output: &str) -> Self {
        self.responses
            .insert(command.to_string(), format!("{}\r\n", output));
        self
    }

    /// Like `respond`, but without a final line break, so the prompt
    /// follows the output on the same line
    pub fn respond_raw(mut self, command: &str, output: &str) -> Self {
        self.responses
            .insert(command.to_string(), output.to_string());
        self
    }

    /// Never switch to the configured prompt
    pub fn without_prompt(mut self) -> Self {
        self.emits_prompt = false;
        self
    }

    /// Do not echo input lines
    pub fn without_echo(mut self) -> Self {
        self.echo = false;
        self
    }

    /// `command` produces nothing and never returns to the prompt
    pub fn hang_on(mut self, command: &str) -> Self {
        self.hanging.insert(command.to_string());
        self
    }

    /// Keep running after `exit`
    pub fn ignore_exit(mut self) -> Self {
        self.ignore_exit = true;
        self
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Most sessions that were ever open at the same time
    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    /// Every line the shell received, across all sessions
    pub fn sent_lines(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// A new session from this script, sharing counters
    fn fresh(&self) -> Self {
        let mut shell = self.clone();
        shell.current_prompt = "$ ".to_string();
        shell.pending = shell.current_prompt.clone();
        shell.eof = false;
        let now_open = shell.open.fetch_add(1, Ordering::SeqCst) + 1;
        shell.max_open.fetch_max(now_open, Ordering::SeqCst);
        shell
    }

    fn handle_line(&mut self, line: &str) {
        self.sent.lock().unwrap().push(line.to_string());

        if self.echo {
            self.pending.push_str(line);
            self.pending.push_str("\r\n");
        }
        if self.hanging.contains(line) {
            return;
        }

        if line.contains("PS1=") {
            if self.emits_prompt {
                self.current_prompt = self.prompt.clone();
            }
        } else if line.trim() == "exit" {
            if !self.ignore_exit {
                self.eof = true;
                return;
            }
        } else if let Some(text) = line.strip_prefix("echo ") {
            self.pending.push_str(text);
            self.pending.push_str("\r\n");
        } else if let Some(output) = self.responses.get(line) {
            self.pending.push_str(output);
        }

        self.pending.push_str(&self.current_prompt);
    }
}

impl ShellTransport for ScriptedShell {
    fn send(&mut self, data: &str) -> io::Result<()> {
        if self.eof {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "shell exited"));
        }
        for line in data.split_inclusive('\n') {
            self.handle_line(line.trim_end_matches('\n'));
        }
        Ok(())
    }

    fn read_chunk(&mut self, timeout: Duration) -> io::Result<ReadOutcome> {
        if !self.pending.is_empty() {
            return Ok(ReadOutcome::Data(std::mem::take(&mut self.pending)));
        }
        if self.eof {
            return Ok(ReadOutcome::Eof);
        }
        std::thread::sleep(timeout.min(Duration::from_millis(5)));
        Ok(ReadOutcome::Timeout)
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Spawns fresh copies of a `ScriptedShell`
pub struct MockSpawner {
    template: ScriptedShell,
    spawned: Mutex<Vec<String>>,
    stopped: Mutex<Vec<String>>,
    fail_with: Option<String>,
    fail_stop_with: Option<String>,
}

impl MockSpawner {
    pub fn new(template: ScriptedShell) -> Self {
        Self {
            template,
            spawned: Mutex::new(Vec::new()),
            stopped: Mutex::new(Vec::new()),
            fail_with: None,
            fail_stop_with: None,
        }
    }

    /// Make every spawn fail with `message`
    pub fn fail_with(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }

    /// Make every stop fail with `message`
    pub fn fail_stop_with(mut self, message: &str) -> Self {
        self.fail_stop_with = Some(message.to_string());
        self
    }

    /// Container names sessions were opened on
    pub fn spawned(&self) -> Vec<String> {
        self.spawned.lock().unwrap().clone()
    }

    /// Container names whose shell was stopped after a forced close
    pub fn stopped(&self) -> Vec<String> {
        self.stopped.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.template.close_count()
    }

    pub fn max_open(&self) -> usize {
        self.template.max_open()
    }

    pub fn sent_lines(&self) -> Vec<String> {
        self.template.sent_lines()
    }
}

impl ShellSpawner for MockSpawner {
    fn spawn(&self, container_name: &str) -> Result<Box<dyn ShellTransport>> {
        if let Some(ref msg) = self.fail_with {
            return Err(CoreError::SpawnFailed(msg.clone()));
        }
        self.spawned.lock().unwrap().push(container_name.to_string());
        Ok(Box::new(self.template.fresh()))
    }

    fn stop(&self, container_name: &str) -> Result<()> {
        self.stopped.lock().unwrap().push(container_name.to_string());
        match self.fail_stop_with {
            Some(ref msg) => Err(CoreError::EngineFailed {
                action: "Stop",
                detail: msg.clone(),
            }),
            None => Ok(()),
        }
    }
}
