use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

const STOP_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("failed to spawn training command: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("could not read log file {0}: {1}")]
    ReadLog(PathBuf, #[source] std::io::Error),
    #[error("failed to signal process {0}: {1}")]
    Signal(u32, #[source] nix::Error),
}

/// Runs a shell command in `working_dir`, redirecting combined stdout+stderr into
/// `<working_dir>/last_training.log`. Started, polled for liveness, and stopped by the state
/// machine; it never inspects the command's semantics beyond pid and log bytes.
pub struct Executor {
    working_dir: PathBuf,
    log_file_name: &'static str,
    child: Option<Child>,
    started_at: Option<Instant>,
}

impl Executor {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            log_file_name: "last_training.log",
            child: None,
            started_at: None,
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.working_dir.join(self.log_file_name)
    }

    /// Seconds since the subprocess was started, or `None` if nothing is running.
    pub fn uptime(&self) -> Option<Duration> {
        if self.child.is_some() {
            self.started_at.map(|t| t.elapsed())
        } else {
            None
        }
    }

    /// Non-blocking spawn. `cmd` is handed to `/bin/sh -c`, matching the original trainer's
    /// shell-redirection invocation exactly: the log file is opened in append mode and attached
    /// to both stdout and stderr via shell redirection rather than piping through tokio, so the
    /// subprocess sees a real file descriptor and behaves the same as run interactively.
    pub async fn start(&mut self, cmd: &str) -> Result<(), ExecutorError> {
        let log_path = self.log_path();
        let shell_cmd = format!("{cmd} >> {} 2>&1", shell_quote(&log_path));

        let mut command = Command::new("/bin/sh");
        command
            .arg("-c")
            .arg(&shell_cmd)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        debug!(%shell_cmd, dir = %self.working_dir.display(), "starting executor subprocess");
        let child = command.spawn().map_err(ExecutorError::Spawn)?;
        self.started_at = Some(Instant::now());
        self.child = Some(child);
        Ok(())
    }

    /// True iff a child was started and the OS still reports it alive. Calling this reaps a
    /// finished child's exit status (so a later call correctly reports "not running") without
    /// blocking.
    pub fn is_process_running(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                info!(?status, "training subprocess exited");
                self.child = None;
                false
            }
            Ok(None) => true,
            Err(err) => {
                warn!(%err, "failed to poll subprocess status, assuming dead");
                self.child = None;
                false
            }
        }
    }

    /// Full current contents of the log file. Missing file reads as an empty log (nothing has
    /// been written yet).
    pub async fn get_log(&self) -> Result<String, ExecutorError> {
        let path = self.log_path();
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(contents),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(err) => Err(ExecutorError::ReadLog(path, err)),
        }
    }

    /// Graceful terminate, wait up to 3s, then kill. Idempotent: calling it with nothing running
    /// is a no-op.
    pub async fn stop(&mut self) -> Result<(), ExecutorError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        self.started_at = None;

        if let Some(pid) = child.id() {
            debug!(pid, "sending SIGTERM to training subprocess");
            signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
                .map_err(|err| ExecutorError::Signal(pid, err))?;
        }

        match timeout(STOP_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                info!(?status, "training subprocess terminated gracefully");
                Ok(())
            }
            Ok(Err(err)) => {
                warn!(%err, "error waiting on terminated subprocess");
                Ok(())
            }
            Err(_) => {
                warn!("training subprocess did not exit within grace period, killing");
                child.start_kill().ok();
                let _ = child.wait().await;
                Ok(())
            }
        }
    }
}

fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_and_logs_and_reports_exit() {
        let dir = tempfile::tempdir().unwrap();
        let mut executor = Executor::new(dir.path());
        executor.start("echo hello").await.unwrap();

        // give the shell time to write and exit
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!executor.is_process_running());

        let log = executor.get_log().await.unwrap();
        assert_eq!(log.trim(), "hello");
    }

    #[tokio::test]
    async fn missing_log_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Executor::new(dir.path());
        assert_eq!(executor.get_log().await.unwrap(), "");
    }

    #[tokio::test]
    async fn stop_on_idle_executor_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut executor = Executor::new(dir.path());
        executor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_terminates_a_long_running_process() {
        let dir = tempfile::tempdir().unwrap();
        let mut executor = Executor::new(dir.path());
        executor.start("sleep 30").await.unwrap();
        assert!(executor.is_process_running());

        let start = Instant::now();
        executor.stop().await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(!executor.is_process_running());
    }
}
