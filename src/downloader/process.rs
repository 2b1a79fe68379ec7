// ProcessSupervisor - runs one yt-dlp process and streams its output
//
// stdout and stderr share one pipe, so lines arrive in the order the
// process wrote them. The read loop checks the stop flag before and after
// every line and abandons the stream as soon as a stop arrives.

use std::io::PipeReader;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::cancel::CancellationToken;
use super::errors::DownloadError;
use super::models::{LineKind, RunOutcome};
use super::traits::ProcessRunner;

/// Graceful → forced termination windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationPolicy {
    /// How long to wait after the graceful signal
    pub grace: Duration,
    /// How long to wait after the forced kill
    pub kill_wait: Duration,
}

impl Default for TerminationPolicy {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(3),
            kill_wait: Duration::from_secs(2),
        }
    }
}

/// Owned handle to a running process.
///
/// `terminate` may be called any number of times, including after the
/// process has exited on its own.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
    policy: TerminationPolicy,
    exit: Option<ExitStatus>,
}

impl ProcessHandle {
    pub fn new(child: Child, policy: TerminationPolicy) -> Self {
        let pid = child.id();
        Self {
            child,
            pid,
            policy,
            exit: None,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the process to exit on its own
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        if let Some(status) = self.exit {
            return Ok(status);
        }
        let status = self.child.wait().await?;
        self.exit = Some(status);
        Ok(status)
    }

    /// Graceful signal, wait, forced kill, wait. Best-effort: failures are
    /// logged and swallowed. Returns the exit status if the process was reaped.
    pub async fn terminate(&mut self) -> Option<ExitStatus> {
        if let Some(status) = self.exit {
            return Some(status);
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit = Some(status);
                return Some(status);
            }
            Ok(None) => {}
            Err(e) => tracing::debug!("[supervisor] try_wait failed: {}", e),
        }

        self.signal_graceful();
        if let Ok(Ok(status)) = timeout(self.policy.grace, self.child.wait()).await {
            self.exit = Some(status);
            return Some(status);
        }

        tracing::warn!(
            "[supervisor] Process {:?} still running after {:?}, killing",
            self.pid,
            self.policy.grace
        );
        if let Err(e) = self.child.start_kill() {
            tracing::debug!("[supervisor] Kill failed: {}", e);
        }
        match timeout(self.policy.kill_wait, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.exit = Some(status);
                Some(status)
            }
            Ok(Err(e)) => {
                tracing::warn!("[supervisor] Wait after kill failed: {}", e);
                None
            }
            Err(_) => {
                tracing::error!(
                    "[supervisor] Process {:?} did not exit {:?} after kill",
                    self.pid,
                    self.policy.kill_wait
                );
                None
            }
        }
    }

    #[cfg(unix)]
    fn signal_graceful(&mut self) {
        let Some(pid) = self.pid.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
            return;
        };
        // SAFETY: kill(2) only sends a signal; the child is not reaped yet so the pid is ours
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc != 0 {
            tracing::debug!("[supervisor] SIGTERM to {} failed", pid);
        }
    }

    #[cfg(not(unix))]
    fn signal_graceful(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::debug!("[supervisor] Terminate failed: {}", e);
        }
    }
}

/// Runs yt-dlp (or any line-oriented program) under supervision
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    program: PathBuf,
    policy: TerminationPolicy,
}

impl ProcessSupervisor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            policy: TerminationPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: TerminationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Spawn with stdout and stderr both writing into one pipe
    fn spawn(&self, args: &[String]) -> Result<((Child, OutputPipe), Option<u32>), DownloadError> {
        let launch_error = |e| DownloadError::launch(&self.program.to_string_lossy(), e);

        let (reader, writer) = std::io::pipe().map_err(launch_error)?;
        let stderr_writer = writer.try_clone().map_err(launch_error)?;
        let output = output_pipe(reader).map_err(launch_error)?;

        // The Command owns our copies of the write end; it is dropped at the
        // end of this statement so EOF arrives once the child closes its copies
        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr_writer)
            .kill_on_drop(true)
            .spawn()
            .map_err(launch_error)?;
        let pid = child.id();
        Ok(((child, output), pid))
    }
}

#[async_trait]
impl ProcessRunner for ProcessSupervisor {
    async fn run(
        &self,
        args: &[String],
        token: &CancellationToken,
        on_line: &mut (dyn for<'l> FnMut(&'l str) -> LineKind + Send),
    ) -> Result<RunOutcome, DownloadError> {
        let mut outcome = RunOutcome::default();

        let (child, output) = match token.launch_with(|| self.spawn(args)) {
            Some(result) => result?,
            None => {
                outcome.interrupted = true;
                return Ok(outcome);
            }
        };
        let mut handle = ProcessHandle::new(child, self.policy);
        tracing::debug!(
            "[supervisor] Started {} (pid {:?})",
            self.program.display(),
            handle.pid()
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let reader = spawn_line_reader(output, tx);

        loop {
            if token.is_stopped() {
                outcome.interrupted = true;
                break;
            }
            let line = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    outcome.interrupted = true;
                    break;
                }
                line = rx.recv() => line,
            };
            let Some(line) = line else {
                break;
            };
            outcome.record(on_line(&line));
        }

        reader.abort();
        drop(rx);

        // Unpublish while the child is still unreaped; from here on a stop
        // reaches it only through the owned handle
        token.clear_process();

        let status = if outcome.interrupted {
            handle.terminate().await
        } else {
            // Output closed; the process may still be finishing up
            tokio::select! {
                status = handle.wait() => match status {
                    Ok(status) => Some(status),
                    Err(e) => {
                        tracing::warn!("[supervisor] Wait failed: {}", e);
                        None
                    }
                },
                _ = token.cancelled() => {
                    outcome.interrupted = true;
                    handle.terminate().await
                }
            }
        };

        outcome.exit_code = status.and_then(|s| s.code());
        tracing::debug!(
            "[supervisor] Process exited: code={:?} lines={} interrupted={}",
            outcome.exit_code,
            outcome.lines,
            outcome.interrupted
        );
        Ok(outcome)
    }
}

#[cfg(unix)]
type OutputPipe = tokio::net::unix::pipe::Receiver;

#[cfg(not(unix))]
type OutputPipe = PipeReader;

#[cfg(unix)]
fn output_pipe(reader: PipeReader) -> std::io::Result<OutputPipe> {
    tokio::net::unix::pipe::Receiver::from_owned_fd(reader.into())
}

#[cfg(not(unix))]
fn output_pipe(reader: PipeReader) -> std::io::Result<OutputPipe> {
    Ok(reader)
}

/// Decoded line with trailing whitespace removed; `None` for blank lines
fn decode_line(buf: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(buf);
    let line = text.trim_end();
    (!line.is_empty()).then(|| line.to_string())
}

/// Forward lines from the merged output, decoding invalid UTF-8 with replacement
#[cfg(unix)]
fn spawn_line_reader(stream: OutputPipe, tx: mpsc::UnboundedSender<String>) -> JoinHandle<()> {
    use tokio::io::{AsyncBufReadExt, BufReader};

    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let Some(line) = decode_line(&buf) else {
                        continue;
                    };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    // Treated as end of stream; the exit code decides the run
                    tracing::debug!("[supervisor] Stream read failed: {}", e);
                    break;
                }
            }
        }
    })
}

/// Blocking variant for targets without an async pipe type
#[cfg(not(unix))]
fn spawn_line_reader(stream: OutputPipe, tx: mpsc::UnboundedSender<String>) -> JoinHandle<()> {
    use std::io::{BufRead, BufReader};

    tokio::task::spawn_blocking(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let Some(line) = decode_line(&buf) else {
                        continue;
                    };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!("[supervisor] Stream read failed: {}", e);
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_termination_windows() {
        let policy = TerminationPolicy::default();
        assert_eq!(policy.grace, Duration::from_secs(3));
        assert_eq!(policy.kill_wait, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_missing_binary_is_launch_failure() {
        let supervisor = ProcessSupervisor::new("/nonexistent/definitely-not-yt-dlp");
        let token = CancellationToken::new();
        let mut on_line = |_: &str| LineKind::Unclassified;

        let err = supervisor
            .run(&[], &token, &mut on_line)
            .await
            .unwrap_err();
        assert!(err.is_launch_failure());
        assert_eq!(token.active_pid(), None);
    }

    #[tokio::test]
    async fn test_stopped_token_never_launches() {
        let supervisor = ProcessSupervisor::new("/nonexistent/definitely-not-yt-dlp");
        let token = CancellationToken::new();
        token.stop();
        let mut on_line = |_: &str| LineKind::Unclassified;

        let outcome = supervisor.run(&[], &token, &mut on_line).await.unwrap();
        assert!(outcome.interrupted);
        assert_eq!(outcome.lines, 0);
    }

    #[test]
    fn test_decode_line_trims_and_skips_blank() {
        assert_eq!(decode_line(b"[download] 10%\r\n"), Some("[download] 10%".to_string()));
        assert_eq!(decode_line(b"  \n"), None);
        assert_eq!(decode_line(b"\xffx\n"), Some("\u{FFFD}x".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pid_unpublished_before_process_is_reaped() {
        let supervisor = ProcessSupervisor::new("/bin/sh");
        let token = CancellationToken::new();
        let mut published = None;
        let mut on_line = |_: &str| {
            published = token.active_pid();
            LineKind::Unclassified
        };
        // Output closes early while the process keeps running for a while
        let args = vec![
            "-c".to_string(),
            "echo hi; exec 1>&- 2>&-; sleep 1".to_string(),
        ];

        let (outcome, slot_while_running) = tokio::join!(
            supervisor.run(&args, &token, &mut on_line),
            async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                token.active_pid()
            }
        );

        let outcome = outcome.unwrap();
        assert_eq!(outcome.exit_code, Some(0));
        assert!(published.is_some());
        assert_eq!(slot_while_running, None);
        assert_eq!(token.active_pid(), None);
    }
}
