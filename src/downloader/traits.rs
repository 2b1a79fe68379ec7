// Process runner seam and the event emitter handed to the presentation layer

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::cancel::CancellationToken;
use super::errors::DownloadError;
use super::models::{DownloadProgress, JobEvent, JobResult, LineKind, NoticeLevel, RunOutcome};

/// Runs one external process to completion (or until stopped)
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Launch with `args`, feed every output line to `on_line` in order,
    /// and tally the returned classifications into the outcome.
    ///
    /// Only a launch failure is an error; stream problems end the run.
    async fn run(
        &self,
        args: &[String],
        token: &CancellationToken,
        on_line: &mut (dyn for<'l> FnMut(&'l str) -> LineKind + Send),
    ) -> Result<RunOutcome, DownloadError>;
}

/// Progress emitter helper.
///
/// Sends are fire-and-forget: a caller that dropped its receiver does not
/// stop the job.
#[derive(Debug, Clone)]
pub struct ProgressEmitter {
    tx: mpsc::UnboundedSender<JobEvent>,
}

impl ProgressEmitter {
    pub fn new(tx: mpsc::UnboundedSender<JobEvent>) -> Self {
        Self { tx }
    }

    /// Emitter plus the receiving end for the presentation layer
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: JobEvent) {
        let _ = self.tx.send(event);
    }

    pub fn line(&self, line: &str) {
        self.emit(JobEvent::Line(line.to_string()));
    }

    pub fn progress(&self, progress: DownloadProgress) {
        self.emit(JobEvent::Progress(progress));
    }

    pub fn notice(&self, level: NoticeLevel, message: impl Into<String>) {
        self.emit(JobEvent::Notice {
            level,
            message: message.into(),
        });
    }

    pub fn finished(&self, result: JobResult) {
        self.emit(JobEvent::Finished(result));
    }
}
