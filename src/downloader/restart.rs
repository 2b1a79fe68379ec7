// RestartController - relaunch yt-dlp after every downloaded item
//
// Each run is capped at one item. A run that produced a genuine download
// restarts immediately. A run without one is "empty"; the job concludes
// when an empty run exits cleanly, hits the archive, or when too many
// empty runs come in a row. Anything else is retried.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::ytdlp::{parse_item_percent, CommandBuilder};

use super::cancel::CancellationToken;
use super::models::{
    Completion, CompletionReason, DownloadJob, DownloadProgress, JobResult, LineKind,
    NoticeLevel, RunOutcome,
};
use super::progress::ProgressTracker;
use super::traits::{ProcessRunner, ProgressEmitter};

/// Consecutive runs without a new item before the job is considered done
pub const MAX_CONSECUTIVE_EMPTY_RUNS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub max_consecutive_empty_runs: u32,
    /// Give up once empty runs have kept failing for this long. `None` retries
    /// until the empty-run limit alone ends the job.
    pub retry_window: Option<Duration>,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_empty_runs: MAX_CONSECUTIVE_EMPTY_RUNS,
            retry_window: None,
        }
    }
}

/// What to do after a run has been evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunDecision {
    /// A new item was downloaded; launch the next run
    Restart,
    /// Empty run that looks transient; launch again
    Retry,
    Complete(CompletionReason),
}

/// Classify a line, publish the progress update, then the raw line
pub(crate) fn forward_line(
    tracker: &mut ProgressTracker,
    emitter: &ProgressEmitter,
    line: &str,
) -> LineKind {
    let kind = tracker.classify(line);
    let item_percent = parse_item_percent(line);
    if kind != LineKind::Unclassified || item_percent.is_some() {
        let state = tracker.state();
        emitter.progress(DownloadProgress {
            downloaded: state.downloaded,
            total: state.total,
            kind: Some(kind),
            item_percent,
        });
    }
    emitter.line(line);
    kind
}

/// Publish the final counters once a job concludes
pub(crate) fn emit_final_progress(tracker: &ProgressTracker, emitter: &ProgressEmitter) {
    let state = tracker.state();
    emitter.progress(DownloadProgress {
        downloaded: state.downloaded,
        total: state.total,
        kind: None,
        item_percent: None,
    });
}

pub struct RestartController {
    runner: Arc<dyn ProcessRunner>,
    policy: RestartPolicy,
    tracker: ProgressTracker,
    emitter: ProgressEmitter,
    items_restarted: u32,
    empty_runs: u32,
    empty_since: Option<Instant>,
}

impl RestartController {
    pub fn new(runner: Arc<dyn ProcessRunner>, emitter: ProgressEmitter) -> Self {
        Self {
            runner,
            policy: RestartPolicy::default(),
            tracker: ProgressTracker::new(),
            emitter,
            items_restarted: 0,
            empty_runs: 0,
            empty_since: None,
        }
    }

    pub fn with_policy(mut self, policy: RestartPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Items downloaded by runs that ended in a restart
    pub fn items_restarted(&self) -> u32 {
        self.items_restarted
    }

    /// Drive the job until it completes, is stopped, or fails to launch
    pub async fn run(&mut self, job: &DownloadJob, token: &CancellationToken) -> JobResult {
        let args = CommandBuilder::new(job).max_downloads(1).build();
        let mut run_number: u32 = 0;

        loop {
            if token.is_stopped() {
                return self.stopped();
            }

            run_number += 1;
            tracing::info!(
                "[restart] Run {} (items so far: {}, progress {})",
                run_number,
                self.items_restarted,
                self.tracker.state()
            );

            let tracker = &mut self.tracker;
            let emitter = &self.emitter;
            let mut on_line = |line: &str| forward_line(tracker, emitter, line);
            let outcome = match self.runner.run(&args, token, &mut on_line).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("[restart] Launch failed: {}", e);
                    self.emitter.notice(NoticeLevel::Error, e.to_string());
                    return JobResult::Error {
                        detail: e.to_string(),
                    };
                }
            };

            if outcome.interrupted || token.is_stopped() {
                return self.stopped();
            }

            match self.evaluate(&outcome) {
                RunDecision::Restart => {
                    self.emitter.notice(
                        NoticeLevel::Info,
                        format!(
                            "Item downloaded ({} this session), restarting",
                            self.items_restarted
                        ),
                    );
                }
                RunDecision::Retry => {
                    tracing::warn!(
                        "[restart] Empty run {}/{} exited with {:?}, retrying",
                        self.empty_runs,
                        self.policy.max_consecutive_empty_runs,
                        outcome.exit_code
                    );
                    self.emitter.notice(
                        NoticeLevel::Warning,
                        format!(
                            "No new item in this run (exit code {:?}), retrying",
                            outcome.exit_code
                        ),
                    );
                }
                RunDecision::Complete(reason) => {
                    return self.complete(reason, outcome.exit_code);
                }
            }
        }
    }

    /// Update the counters from one finished run and pick the next step
    pub fn evaluate(&mut self, outcome: &RunOutcome) -> RunDecision {
        if outcome.genuine_completion {
            self.items_restarted += 1;
            self.empty_runs = 0;
            self.empty_since = None;
            return RunDecision::Restart;
        }

        self.empty_runs += 1;
        let since = *self.empty_since.get_or_insert_with(Instant::now);

        if outcome.success() {
            RunDecision::Complete(CompletionReason::Success)
        } else if outcome.archive_skips > 0 {
            RunDecision::Complete(CompletionReason::ArchiveExhausted)
        } else if self.empty_runs >= self.policy.max_consecutive_empty_runs {
            RunDecision::Complete(CompletionReason::EmptyRunLimit)
        } else if self
            .policy
            .retry_window
            .is_some_and(|window| since.elapsed() >= window)
        {
            RunDecision::Complete(CompletionReason::RetryWindowElapsed)
        } else {
            RunDecision::Retry
        }
    }

    fn complete(&mut self, reason: CompletionReason, exit_code: Option<i32>) -> JobResult {
        let progress = self.tracker.finish();
        emit_final_progress(&self.tracker, &self.emitter);

        tracing::info!(
            "[restart] Completed ({:?}): {} new items, progress {}",
            reason,
            self.items_restarted,
            progress
        );
        let level = if reason.is_warning() {
            NoticeLevel::Warning
        } else {
            NoticeLevel::Info
        };
        self.emitter.notice(
            level,
            format!("Done: {} new items downloaded", self.items_restarted),
        );

        JobResult::Completed(Completion {
            reason,
            exit_code,
            items_downloaded: self.items_restarted,
            progress,
        })
    }

    fn stopped(&self) -> JobResult {
        tracing::info!(
            "[restart] Stopped after {} items, progress {}",
            self.items_restarted,
            self.tracker.state()
        );
        JobResult::Stopped
    }
}
