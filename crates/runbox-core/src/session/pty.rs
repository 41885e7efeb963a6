//! PTY-backed shell transport
//!
//! Spawns `<engine> start -ai <name>` with its stdio on the slave side of a
//! host PTY and talks to it through the master side.

use super::{ReadOutcome, ShellSpawner, ShellTransport};
use crate::{CoreError, Result};
use runbox_provider::{CommandRunner, EngineArgs};
use std::io;
use std::os::unix::io::{AsFd, AsRawFd, FromRawFd, IntoRawFd, OwnedFd};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use nix::errno::Errno;
use nix::libc;
use nix::poll::{PollFd, PollFlags, PollTimeout};
use nix::pty::{openpty, Winsize};

/// A shell attached through a host-side PTY
pub struct PtyShell {
    master_fd: OwnedFd,
    child: Child,
    /// Trailing bytes of a UTF-8 sequence split across reads
    pending: Vec<u8>,
    closed: bool,
}

impl PtyShell {
    /// Spawn `program args..` connected to a fresh PTY
    pub fn spawn(program: &str, args: &[String]) -> io::Result<Self> {
        let winsize = Winsize {
            ws_row: 24,
            ws_col: 80,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let pty = openpty(Some(&winsize), None).map_err(io::Error::other)?;
        let master_fd = pty.master;

        let mut cmd = Command::new(program);
        cmd.args(args);

        // Each Stdio::from_raw_fd owns its fd, so stdin and stdout get dups
        // and stderr takes the original.
        let slave_raw = pty.slave.into_raw_fd();
        unsafe {
            cmd.stdin(Stdio::from_raw_fd(libc::dup(slave_raw)));
            cmd.stdout(Stdio::from_raw_fd(libc::dup(slave_raw)));
            cmd.stderr(Stdio::from_raw_fd(slave_raw));
        }

        let child = cmd.spawn()?;
        // The parent must not keep slave fds open or EOF never arrives
        drop(cmd);

        tracing::debug!("Spawned {} {} (pid {})", program, args.join(" "), child.id());
        Ok(Self {
            master_fd,
            child,
            pending: Vec::new(),
            closed: false,
        })
    }

    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        match std::str::from_utf8(&self.pending) {
            Ok(s) => {
                let s = s.to_string();
                self.pending.clear();
                s
            }
            Err(e) if e.error_len().is_none() => {
                // Incomplete sequence at the end; keep it for the next read
                let valid = e.valid_up_to();
                let s = String::from_utf8_lossy(&self.pending[..valid]).into_owned();
                self.pending.drain(..valid);
                s
            }
            Err(_) => {
                let s = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                s
            }
        }
    }
}

impl ShellTransport for PtyShell {
    fn send(&mut self, data: &str) -> io::Result<()> {
        let mut bytes = data.as_bytes();
        while !bytes.is_empty() {
            match nix::unistd::write(&self.master_fd, bytes) {
                Ok(n) => bytes = &bytes[n..],
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::other(e)),
            }
        }
        Ok(())
    }

    fn read_chunk(&mut self, timeout: Duration) -> io::Result<ReadOutcome> {
        let ms = timeout.as_millis().min(u16::MAX as u128) as u16;
        let mut fds = [PollFd::new(self.master_fd.as_fd(), PollFlags::POLLIN)];

        match nix::poll::poll(&mut fds, PollTimeout::from(ms)) {
            Ok(0) => return Ok(ReadOutcome::Timeout),
            Err(Errno::EINTR) => return Ok(ReadOutcome::Timeout),
            Err(e) => return Err(io::Error::other(e)),
            Ok(_) => {}
        }

        let revents = fds[0].revents().unwrap_or(PollFlags::empty());
        if !revents.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR) {
            return Ok(ReadOutcome::Timeout);
        }

        let mut buf = [0u8; 4096];
        match nix::unistd::read(self.master_fd.as_raw_fd(), &mut buf) {
            Ok(0) => Ok(ReadOutcome::Eof),
            Ok(n) => Ok(ReadOutcome::Data(self.decode(&buf[..n]))),
            // Linux reports a closed slave side as EIO
            Err(Errno::EIO) => Ok(ReadOutcome::Eof),
            Err(Errno::EINTR) | Err(Errno::EAGAIN) => Ok(ReadOutcome::Timeout),
            Err(e) => Err(io::Error::other(e)),
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        match self.child.try_wait() {
            Ok(Some(status)) => tracing::debug!("Shell client exited: {}", status),
            _ => {
                let _ = self.child.kill();
                let _ = self.child.wait();
                tracing::debug!("Shell client killed");
            }
        }
    }
}

impl Drop for PtyShell {
    fn drop(&mut self) {
        self.close();
    }
}

/// Attaches PTY shells to containers through the engine CLI
pub struct PtySpawner {
    program: String,
    leading_args: Vec<String>,
    engine_args: EngineArgs,
}

impl PtySpawner {
    pub fn new(runner: &dyn CommandRunner, engine_args: EngineArgs) -> Self {
        let (program, leading_args) = runner.runtime_args();
        Self {
            program,
            leading_args,
            engine_args,
        }
    }

    fn target(&self, container_name: &str) -> EngineArgs {
        let mut target = self.engine_args.clone();
        target.container_name = container_name.to_string();
        target
    }

    fn attach_argv(&self, container_name: &str) -> Vec<String> {
        let mut args = self.leading_args.clone();
        args.extend(self.target(container_name).attach());
        args
    }

    fn kill_argv(&self, container_name: &str) -> Vec<String> {
        let mut args = self.leading_args.clone();
        args.extend(self.target(container_name).kill());
        args
    }
}

impl ShellSpawner for PtySpawner {
    fn spawn(&self, container_name: &str) -> Result<Box<dyn ShellTransport>> {
        let args = self.attach_argv(container_name);
        let shell = PtyShell::spawn(&self.program, &args)
            .map_err(|e| CoreError::SpawnFailed(format!("{}: {}", self.program, e)))?;
        Ok(Box::new(shell))
    }

    /// Kill the container's main process; the next attach starts it again
    fn stop(&self, container_name: &str) -> Result<()> {
        let args = self.kill_argv(container_name);
        tracing::debug!("Running {} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| CoreError::EngineFailed {
                action: "Stop",
                detail: format!("{}: {}", self.program, e),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(CoreError::EngineFailed {
                action: "Stop",
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
