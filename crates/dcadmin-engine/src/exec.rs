//! Shell command execution
//!
//! Every interaction with the cluster goes through an [`Executor`]. The
//! production implementation runs `bash -c <command>`; tests substitute a
//! recording fake.

use dcadmin_core::errors::{command_failed, io_error, ExError, ExErrorKind, Result};
use std::io::{self, Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread;

/// Runs commands synchronously, treating a non-zero exit as a hard failure
pub trait Executor {
    /// Run a shell command and return its stdout
    ///
    /// # Errors
    ///
    /// Returns `CommandFailed` carrying the command, exit status, and stderr.
    fn run(&self, command: &str) -> Result<Vec<u8>>;

    /// Run a shell command, streaming its stdout into `sink`
    ///
    /// # Errors
    ///
    /// Returns `CommandFailed` on non-zero exit and `Io` if `sink` rejects a
    /// write.
    fn run_to(&self, command: &str, sink: &mut dyn Write) -> Result<()>;

    /// Start a long-running process without waiting for it
    ///
    /// # Errors
    ///
    /// Returns `CommandFailed` if the process cannot be started.
    fn spawn(&self, argv: &[String]) -> Result<Box<dyn BackgroundProcess>>;
}

/// A process started by [`Executor::spawn`]
pub trait BackgroundProcess {
    /// The command line, for logs
    fn describe(&self) -> &str;

    /// Kill the process and reap it. Calling this twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error if the process could not be reaped.
    fn terminate(&mut self) -> Result<()>;
}

/// Executor backed by a local shell
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
        }
    }
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn command(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(command).stdin(Stdio::null());
        cmd
    }
}

impl Executor for ShellExecutor {
    fn run(&self, command: &str) -> Result<Vec<u8>> {
        tracing::debug!(command, "running command");
        let output = self
            .command(command)
            .output()
            .map_err(|e| command_failed(command, e, b""))?;
        if !output.status.success() {
            return Err(command_failed(command, output.status, &output.stderr));
        }
        Ok(output.stdout)
    }

    fn run_to(&self, command: &str, sink: &mut dyn Write) -> Result<()> {
        tracing::debug!(command, "running command (streaming stdout)");
        let mut child = self
            .command(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| command_failed(command, e, b""))?;

        // stderr is drained on its own thread so a chatty command cannot
        // block on a full pipe while stdout is being copied.
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf);
                buf
            })
        });

        let copied = match child.stdout.take() {
            Some(mut stdout) => io::copy(&mut stdout, sink).map(|_| ()),
            None => Ok(()),
        };
        if copied.is_err() {
            let _ = child.kill();
        }

        let status = child
            .wait()
            .map_err(|e| command_failed(command, e, b""))?;
        let stderr = stderr_reader
            .and_then(|h| h.join().ok())
            .unwrap_or_default();

        copied.map_err(|e| io_error("stream_command_output", e).with_command(command))?;
        if !status.success() {
            return Err(command_failed(command, status, &stderr));
        }
        Ok(())
    }

    fn spawn(&self, argv: &[String]) -> Result<Box<dyn BackgroundProcess>> {
        let (program, args) = argv.split_first().ok_or_else(|| {
            ExError::new(ExErrorKind::Internal)
                .with_op("spawn")
                .with_message("empty command line")
        })?;
        let description = argv.join(" ");
        tracing::debug!(command = %description, "starting background process");
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| command_failed(&description, e, b""))?;
        Ok(Box::new(ChildProcess {
            description,
            child,
            reaped: false,
        }))
    }
}

/// An OS child process owned by the caller
struct ChildProcess {
    description: String,
    child: Child,
    reaped: bool,
}

impl BackgroundProcess for ChildProcess {
    fn describe(&self) -> &str {
        &self.description
    }

    fn terminate(&mut self) -> Result<()> {
        if self.reaped {
            return Ok(());
        }
        // kill fails with InvalidInput once the child has already exited
        if let Err(e) = self.child.kill() {
            if e.kind() != io::ErrorKind::InvalidInput {
                return Err(io_error("kill_background_process", e)
                    .with_command(self.description.clone()));
            }
        }
        self.child.wait().map_err(|e| {
            io_error("reap_background_process", e).with_command(self.description.clone())
        })?;
        self.reaped = true;
        Ok(())
    }
}

/// Quote a value for interpolation into a `bash -c` command line
///
/// Values made only of characters that are safe unquoted are returned as-is,
/// so typical paths keep their familiar form in logs.
pub fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=@%+,".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}
