#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Subprocess execution with an explicit working directory.
//!
//! Nothing in the crate changes the process-wide current directory; every
//! external tool receives its directory through [`CommandSpec::cwd`].

use std::{
    ffi::OsString,
    path::PathBuf,
    process::{ExitStatus, Stdio},
    time::Duration,
};

use anyhow::{Context, Result};
use bon::Builder;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, BufReader},
    process::{Child, Command},
    time::timeout,
};

/// Kills the child on drop unless it was awaited to completion.
struct ChildDropGuard(Option<Child>);

impl ChildDropGuard {
    /// Wraps a freshly spawned child.
    fn new(child: Child) -> Self {
        Self(Some(child))
    }

    /// Returns a mutable reference to the underlying child process.
    fn child_mut(&mut self) -> Result<&mut Child> {
        self.0
            .as_mut()
            .context("child process already taken from guard")
    }

    /// Leaves the (finished) child alone on drop.
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for ChildDropGuard {
    fn drop(&mut self) {
        if let Some(child) = self.0.as_mut() {
            let _ = child.start_kill();
        }
    }
}

/// Captured result of a finished subprocess.
#[derive(Debug)]
pub struct Collected {
    /// Exit status returned by the process.
    pub status: ExitStatus,
    /// Contents written to stdout.
    pub stdout: Vec<u8>,
    /// Contents written to stderr.
    pub stderr: Vec<u8>,
}

impl Collected {
    /// Stdout decoded as UTF-8, replacing invalid sequences.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stderr decoded as UTF-8, replacing invalid sequences.
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// How a bounded run ended.
#[derive(Debug)]
pub enum Outcome {
    /// The process exited on its own.
    Finished(Collected),
    /// The deadline elapsed and the process was killed.
    TimedOut(Duration),
}

/// One external command invocation.
#[derive(Debug, Clone, Builder)]
pub struct CommandSpec {
    /// Program path or name.
    #[builder(into)]
    program:  PathBuf,
    /// Arguments, in order.
    #[builder(default)]
    args:     Vec<OsString>,
    /// Bytes written to stdin before it is closed; stdin is null otherwise.
    stdin:    Option<Vec<u8>>,
    /// Working directory of the child.
    #[builder(into)]
    cwd:      Option<PathBuf>,
    /// Extra environment variables.
    #[builder(default)]
    env:      Vec<(OsString, OsString)>,
    /// Kill the child after this long.
    deadline: Option<Duration>,
}

impl CommandSpec {
    /// Shell-like rendering used in log messages and error contexts.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The configured working directory, if any.
    pub fn working_dir(&self) -> Option<&PathBuf> {
        self.cwd.as_ref()
    }

    /// Runs the command and collects its output, failing if the deadline
    /// elapses.
    pub async fn collect(&self) -> Result<Collected> {
        match self.run().await? {
            Outcome::Finished(collected) => Ok(collected),
            Outcome::TimedOut(limit) => anyhow::bail!(
                "`{}` timed out after {}s in {:?}",
                self.display(),
                limit.as_secs(),
                self.cwd
            ),
        }
    }

    /// Spawns the command, feeds stdin, and waits for it within the deadline.
    pub async fn run(&self) -> Result<Outcome> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let mut guard = ChildDropGuard::new(
            cmd.spawn()
                .with_context(|| format!("failed to spawn `{}` in {:?}", self.display(), self.cwd))?,
        );

        if let Some(bytes) = self.stdin.clone()
            && let Some(mut handle) = guard.child_mut()?.stdin.take()
        {
            tokio::spawn(async move {
                if !bytes.is_empty() {
                    let _ = handle.write_all(&bytes).await;
                }
                let _ = handle.shutdown().await;
            });
        }

        let stdout = guard
            .child_mut()?
            .stdout
            .take()
            .context("missing stdout pipe")?;
        let stderr = guard
            .child_mut()?
            .stderr
            .take()
            .context("missing stderr pipe")?;

        let out_task = tokio::spawn(read_all(stdout));
        let err_task = tokio::spawn(read_all(stderr));

        let wait_future = async move {
            let mut guard = guard;
            let status = guard
                .child_mut()?
                .wait()
                .await
                .context("failed to wait on process")?;
            let stdout = out_task.await.context("stdout task join error")??;
            let stderr = err_task.await.context("stderr task join error")??;
            guard.disarm();
            Ok(Collected {
                status,
                stdout,
                stderr,
            })
        };

        match self.deadline {
            Some(limit) => match timeout(limit, wait_future).await {
                Ok(collected) => collected.map(Outcome::Finished),
                Err(_) => Ok(Outcome::TimedOut(limit)),
            },
            None => wait_future.await.map(Outcome::Finished),
        }
    }
}

/// Drains a child pipe to the end.
async fn read_all(pipe: impl tokio::io::AsyncRead + Unpin) -> Result<Vec<u8>> {
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    reader
        .read_to_end(&mut buf)
        .await
        .context("failed to read child output")?;
    Ok(buf)
}

/// Converts string arguments into the owned form [`CommandSpec`] expects.
pub fn os_args<I, S>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    args.into_iter().map(Into::into).collect()
}
