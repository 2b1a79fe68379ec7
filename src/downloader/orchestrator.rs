// Downloader - runs one job on a worker task, restart loop or single shot

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::ytdlp::CommandBuilder;

use super::cancel::CancellationToken;
use super::models::{Completion, CompletionReason, DownloadJob, JobResult, NoticeLevel};
use super::progress::ProgressTracker;
use super::restart::{emit_final_progress, forward_line, RestartController, RestartPolicy};
use super::traits::{ProcessRunner, ProgressEmitter};

pub struct Downloader {
    runner: Arc<dyn ProcessRunner>,
    restart_policy: RestartPolicy,
}

impl Downloader {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            restart_policy: RestartPolicy::default(),
        }
    }

    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    /// Start `job` on a worker task. Must be called inside a tokio runtime.
    pub fn start(&self, job: DownloadJob, emitter: ProgressEmitter) -> JobHandle {
        let token = CancellationToken::new();
        let worker = Self {
            runner: Arc::clone(&self.runner),
            restart_policy: self.restart_policy,
        };
        let task = {
            let token = token.clone();
            tokio::spawn(async move { worker.run_job(&job, &token, &emitter).await })
        };
        JobHandle { token, task }
    }

    /// Run `job` to its terminal state on the current task.
    ///
    /// Emits exactly one `Finished` event, after every other event.
    pub async fn run_job(
        &self,
        job: &DownloadJob,
        token: &CancellationToken,
        emitter: &ProgressEmitter,
    ) -> JobResult {
        tracing::info!(
            "[downloader] Starting {} job for {} (restart: {})",
            job.mode(),
            job.url(),
            job.restart_enabled()
        );
        emitter.notice(
            NoticeLevel::Info,
            format!("Starting {} download: {}", job.mode(), job.url()),
        );

        let result = if job.restart_enabled() {
            let mut controller = RestartController::new(Arc::clone(&self.runner), emitter.clone())
                .with_policy(self.restart_policy);
            controller.run(job, token).await
        } else {
            self.run_single_shot(job, token, emitter).await
        };

        match &result {
            JobResult::Completed(completion) => tracing::info!(
                "[downloader] Finished: {:?}, progress {}",
                completion.reason,
                completion.progress
            ),
            JobResult::Stopped => tracing::info!("[downloader] Stopped by request"),
            JobResult::Error { detail } => tracing::error!("[downloader] Failed: {}", detail),
        }
        emitter.finished(result.clone());
        result
    }

    /// One run, no item cap
    async fn run_single_shot(
        &self,
        job: &DownloadJob,
        token: &CancellationToken,
        emitter: &ProgressEmitter,
    ) -> JobResult {
        let args = CommandBuilder::new(job).build();
        tracing::debug!("[downloader] yt-dlp args: {:?}", args);

        let mut tracker = if job.mode().is_single_item() {
            ProgressTracker::with_total(1)
        } else {
            ProgressTracker::new()
        };

        let outcome = {
            let mut on_line = |line: &str| forward_line(&mut tracker, emitter, line);
            self.runner.run(&args, token, &mut on_line).await
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                emitter.notice(NoticeLevel::Error, e.to_string());
                return JobResult::Error {
                    detail: e.to_string(),
                };
            }
        };

        // A stop wins over whatever exit code the killed process reported
        if outcome.interrupted || token.is_stopped() {
            return JobResult::Stopped;
        }

        let reason = if outcome.success() {
            tracker.finish();
            emit_final_progress(&tracker, emitter);
            CompletionReason::Success
        } else {
            tracing::warn!(
                "[downloader] yt-dlp exited with {:?}; finished items are kept",
                outcome.exit_code
            );
            emitter.notice(
                NoticeLevel::Warning,
                format!(
                    "yt-dlp exited with code {:?}; the download may be incomplete",
                    outcome.exit_code
                ),
            );
            CompletionReason::NonZeroExit
        };

        JobResult::Completed(Completion {
            reason,
            exit_code: outcome.exit_code,
            items_downloaded: 0,
            progress: tracker.state(),
        })
    }
}

/// Caller's side of a running job
#[derive(Debug)]
pub struct JobHandle {
    token: CancellationToken,
    task: JoinHandle<JobResult>,
}

impl JobHandle {
    /// Request a stop; returns immediately
    pub fn stop(&self) {
        self.token.stop();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Wait for the terminal state
    pub async fn wait(self) -> JobResult {
        match self.task.await {
            Ok(result) => result,
            Err(e) => JobResult::Error {
                detail: format!("download worker failed: {}", e),
            },
        }
    }
}
