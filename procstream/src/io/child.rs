//! [`ProcessHost`] backed by `std::process::Command`.

use std::io;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::time::Duration;

use tracing::debug;
use wait_timeout::ChildExt;

use crate::core::types::StreamKind;
use crate::io::host::{ProcessHost, RawStream};

/// Which standard streams to pipe when the child is spawned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Redirects {
    pub stdin: bool,
    pub stdout: bool,
    pub stderr: bool,
}

impl Redirects {
    pub fn output_only() -> Self {
        Self {
            stdout: true,
            ..Self::default()
        }
    }

    pub fn error_only() -> Self {
        Self {
            stderr: true,
            ..Self::default()
        }
    }

    pub fn output_and_error() -> Self {
        Self {
            stdout: true,
            stderr: true,
            ..Self::default()
        }
    }

    pub fn with_stdin(mut self) -> Self {
        self.stdin = true;
        self
    }

    pub fn contains(&self, kind: StreamKind) -> bool {
        match kind {
            StreamKind::Output => self.stdout,
            StreamKind::Error => self.stderr,
        }
    }
}

pub struct ChildHost {
    command: Command,
    redirects: Redirects,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    status: Option<ExitStatus>,
}

impl ChildHost {
    pub fn new(command: Command, redirects: Redirects) -> Self {
        Self {
            command,
            redirects,
            child: None,
            stdin: None,
            stdout: None,
            stderr: None,
            status: None,
        }
    }

    pub fn redirects(&self) -> Redirects {
        self.redirects
    }

    /// Take the child's stdin pipe. Dropping it closes the child's input.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    pub fn kill(&mut self) -> io::Result<()> {
        match self.child.as_mut() {
            Some(child) if self.status.is_none() => child.kill(),
            _ => Ok(()),
        }
    }
}

impl ProcessHost for ChildHost {
    fn start(&mut self) -> io::Result<()> {
        if self.child.is_some() && self.status.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "child process is still running",
            ));
        }
        self.command
            .stdin(pipe_or(self.redirects.stdin, Stdio::null))
            .stdout(pipe_or(self.redirects.stdout, Stdio::inherit))
            .stderr(pipe_or(self.redirects.stderr, Stdio::inherit));

        let mut child = self.command.spawn()?;
        debug!(pid = child.id(), redirects = ?self.redirects, "spawned child process");
        self.stdin = child.stdin.take();
        self.stdout = child.stdout.take();
        self.stderr = child.stderr.take();
        self.status = None;
        self.child = Some(child);
        Ok(())
    }

    fn has_started(&self) -> bool {
        self.child.is_some()
    }

    fn is_redirected(&self, kind: StreamKind) -> bool {
        self.redirects.contains(kind)
    }

    fn take_raw_handle(&mut self, kind: StreamKind) -> Option<RawStream> {
        match kind {
            StreamKind::Output => self.stdout.take().map(|s| Box::new(s) as RawStream),
            StreamKind::Error => self.stderr.take().map(|s| Box::new(s) as RawStream),
        }
    }

    fn wait_for_exit(&mut self, timeout: Option<Duration>) -> io::Result<bool> {
        if self.status.is_some() {
            return Ok(true);
        }
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "child was not spawned"))?;
        let status = match timeout {
            Some(timeout) => child.wait_timeout(timeout)?,
            None => Some(child.wait()?),
        };
        match status {
            Some(status) => {
                debug!(exit_code = ?status.code(), "child exited");
                self.status = Some(status);
                Ok(true)
            }
            None => {
                debug!(timeout_ms = timeout.map(|t| t.as_millis() as u64), "child still running");
                Ok(false)
            }
        }
    }

    fn exit_code(&self) -> Option<i32> {
        self.status.and_then(|status| status.code())
    }
}

fn pipe_or(redirect: bool, fallback: fn() -> Stdio) -> Stdio {
    if redirect { Stdio::piped() } else { fallback() }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::Read;

    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn redirected_stdout_is_handed_over_once() {
        let mut host = ChildHost::new(sh("printf hi"), Redirects::output_only());
        assert!(!host.has_started());
        host.start().expect("start");
        assert!(host.is_redirected(StreamKind::Output));
        assert!(!host.is_redirected(StreamKind::Error));
        assert!(host.take_raw_handle(StreamKind::Error).is_none());

        let mut raw = host.take_raw_handle(StreamKind::Output).expect("stdout");
        assert!(host.take_raw_handle(StreamKind::Output).is_none());
        let mut text = String::new();
        raw.read_to_string(&mut text).expect("read");
        assert_eq!(text, "hi");

        assert!(host.wait_for_exit(None).expect("wait"));
        assert_eq!(host.exit_code(), Some(0));
    }

    #[test]
    fn timed_wait_reports_running_child() {
        let mut host = ChildHost::new(sh("exec sleep 5"), Redirects::default());
        host.start().expect("start");
        assert!(!host.wait_for_exit(Some(Duration::from_millis(20))).expect("wait"));
        host.kill().expect("kill");
        assert!(host.wait_for_exit(None).expect("wait"));
    }

    #[test]
    fn wait_before_spawn_is_an_error() {
        let mut host = ChildHost::new(sh("true"), Redirects::default());
        let err = host.wait_for_exit(None).expect_err("not spawned");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn exit_code_is_reported() {
        let mut host = ChildHost::new(sh("exit 7"), Redirects::default());
        host.start().expect("start");
        assert!(host.wait_for_exit(None).expect("wait"));
        assert_eq!(host.exit_code(), Some(7));
    }
}
