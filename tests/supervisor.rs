//! Process-level tests: real `sh` processes stand in for yt-dlp.
#![cfg(unix)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use download_master_lib::downloader::models::{
    Completion, CompletionReason, DownloadMode, JobEvent, LineKind, ProgressState,
};
use download_master_lib::downloader::{
    CancellationToken, DownloadError, DownloadJobBuilder, Downloader, JobResult, ProcessHandle,
    ProcessRunner, ProcessSupervisor, ProgressEmitter, RunOutcome, TerminationPolicy,
};

const FAST_STOP: TerminationPolicy = TerminationPolicy {
    grace: Duration::from_millis(500),
    kill_wait: Duration::from_secs(2),
};

fn sh() -> ProcessSupervisor {
    ProcessSupervisor::new("/bin/sh").with_policy(FAST_STOP)
}

fn script_args(script: &str) -> Vec<String> {
    vec!["-c".to_string(), script.to_string()]
}

async fn run_script(
    script: &str,
    token: &CancellationToken,
    mut on_line: impl FnMut(&str) -> LineKind + Send,
) -> RunOutcome {
    sh().run(&script_args(script), token, &mut on_line)
        .await
        .expect("sh should launch")
}

#[tokio::test]
async fn lines_arrive_in_order_with_exit_code() {
    let token = CancellationToken::new();
    let mut lines = Vec::new();

    let outcome = run_script("for i in 1 2 3 4 5; do echo line $i; done; exit 3", &token, |line| {
        lines.push(line.to_string());
        LineKind::Unclassified
    })
    .await;

    assert_eq!(lines, vec!["line 1", "line 2", "line 3", "line 4", "line 5"]);
    assert_eq!(outcome.exit_code, Some(3));
    assert_eq!(outcome.lines, 5);
    assert!(!outcome.interrupted);
}

#[tokio::test]
async fn invalid_utf8_is_replaced_not_fatal() {
    let token = CancellationToken::new();
    let mut lines = Vec::new();

    let outcome = run_script(r"printf 'ok\n\377bad\n'", &token, |line| {
        lines.push(line.to_string());
        LineKind::Unclassified
    })
    .await;

    assert_eq!(lines, vec!["ok".to_string(), "\u{FFFD}bad".to_string()]);
    assert_eq!(outcome.exit_code, Some(0));
}

#[tokio::test]
async fn stderr_is_merged_in_emission_order() {
    let token = CancellationToken::new();
    let mut lines = Vec::new();

    let outcome = run_script(
        "i=1; while [ $i -le 200 ]; do echo out$i; echo err$i >&2; i=$((i+1)); done",
        &token,
        |line| {
            lines.push(line.to_string());
            LineKind::Unclassified
        },
    )
    .await;

    let expected: Vec<String> = (1..=200)
        .flat_map(|i| [format!("out{}", i), format!("err{}", i)])
        .collect();
    assert_eq!(lines, expected);
    assert_eq!(outcome.exit_code, Some(0));
}

#[tokio::test]
async fn classifications_are_tallied() {
    let token = CancellationToken::new();
    let script = "echo '[download] Downloading item 1 of 2'; \
                  echo '[download] 100% of 1.00MiB'; \
                  echo '[download] b: has already been recorded in the archive'; \
                  exit 101";

    let mut tracker = download_master_lib::downloader::ProgressTracker::new();
    let outcome = run_script(script, &token, |line| tracker.classify(line)).await;

    assert!(outcome.genuine_completion);
    assert_eq!(outcome.archive_skips, 1);
    assert_eq!(outcome.exit_code, Some(101));
    assert_eq!(tracker.state(), ProgressState { downloaded: 2, total: 2 });
}

#[tokio::test]
async fn stop_mid_stream_terminates_without_waiting_for_eof() {
    let token = CancellationToken::new();
    let started = Instant::now();
    let mut seen = 0;

    let outcome = run_script("echo start; exec sleep 30", &token, |_| {
        seen += 1;
        token.stop();
        LineKind::Unclassified
    })
    .await;

    assert!(outcome.interrupted);
    assert_eq!(seen, 1);
    assert_eq!(outcome.exit_code, None, "killed by a signal");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn ignored_sigterm_escalates_to_kill() {
    let token = CancellationToken::new();
    let started = Instant::now();

    let outcome = run_script(
        "trap '' TERM; echo ready; while :; do sleep 0.1; done",
        &token,
        |_| {
            token.stop();
            LineKind::Unclassified
        },
    )
    .await;

    let elapsed = started.elapsed();
    assert!(outcome.interrupted);
    assert!(elapsed >= FAST_STOP.grace, "grace period honoured: {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(10), "kill took {:?}", elapsed);
}

#[tokio::test]
async fn terminate_after_exit_is_a_noop() {
    let child = tokio::process::Command::new("/bin/sh")
        .args(["-c", "exit 7"])
        .spawn()
        .unwrap();
    let mut handle = ProcessHandle::new(child, FAST_STOP);

    let status = handle.wait().await.unwrap();
    assert_eq!(status.code(), Some(7));

    let started = Instant::now();
    assert_eq!(handle.terminate().await.and_then(|s| s.code()), Some(7));
    assert_eq!(handle.terminate().await.and_then(|s| s.code()), Some(7));
    assert!(started.elapsed() < FAST_STOP.grace);
}

/// Runs a fixed shell script in place of yt-dlp, recording the arguments
/// the engine asked for.
struct ShellDownloader {
    supervisor: ProcessSupervisor,
    script: String,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ShellDownloader {
    fn new(script: String) -> Arc<Self> {
        Arc::new(Self {
            supervisor: sh(),
            script,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for ShellDownloader {
    async fn run(
        &self,
        args: &[String],
        token: &CancellationToken,
        on_line: &mut (dyn for<'l> FnMut(&'l str) -> LineKind + Send),
    ) -> Result<RunOutcome, DownloadError> {
        self.calls.lock().unwrap().push(args.to_vec());
        self.supervisor
            .run(&script_args(&self.script), token, on_line)
            .await
    }
}

/// Each run bumps a counter file; runs 1 and 2 download an item, run 3
/// only finds archived items.
fn counting_playlist_script(dir: &Path) -> String {
    let counter = dir.join("runs");
    format!(
        r#"n=$(cat "{c}" 2>/dev/null || echo 0); n=$((n+1)); echo $n > "{c}"
echo "[download] Downloading item $n of 2"
if [ $n -le 2 ]; then echo "[download] 100% of 1.00MiB in 00:00:01"; exit 101; fi
echo "[download] x: has already been recorded in the archive"
exit 1"#,
        c = counter.display()
    )
}

#[tokio::test]
async fn restart_loop_with_real_processes() {
    let dir = tempfile::tempdir().unwrap();
    let runner = ShellDownloader::new(counting_playlist_script(dir.path()));
    let job = DownloadJobBuilder::new(DownloadMode::Playlist, "https://www.youtube.com/playlist?list=PL1")
        .output_dir(dir.path().join("out"))
        .restart_each_item(true)
        .build_and_prepare()
        .unwrap();
    let (emitter, mut events) = ProgressEmitter::channel();

    let result = Downloader::new(runner.clone()).start(job, emitter).wait().await;

    assert_eq!(
        result,
        JobResult::Completed(Completion {
            reason: CompletionReason::ArchiveExhausted,
            exit_code: Some(1),
            items_downloaded: 2,
            progress: ProgressState { downloaded: 2, total: 2 },
        })
    );

    let calls = runner.calls();
    assert_eq!(calls.len(), 3);
    for args in &calls {
        assert!(args.windows(2).any(|w| w[0] == "--max-downloads" && w[1] == "1"));
    }

    // Runs never interleave: each run's item counter line precedes the next one's
    let mut item_lines = Vec::new();
    let mut finished = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            JobEvent::Line(line) if line.contains("Downloading item") => item_lines.push(line),
            JobEvent::Finished(_) => finished += 1,
            _ => {}
        }
    }
    assert_eq!(
        item_lines,
        vec![
            "[download] Downloading item 1 of 2",
            "[download] Downloading item 2 of 2",
            "[download] Downloading item 3 of 2",
        ]
    );
    assert_eq!(finished, 1);
}

#[tokio::test]
async fn stop_through_job_handle_ends_in_stopped() {
    let runner = ShellDownloader::new(
        "echo '[download] Downloading item 1 of 5'; exec sleep 30".to_string(),
    );
    let job = DownloadJobBuilder::new(DownloadMode::Channel, "https://www.youtube.com/@chan")
        .output_dir("/tmp")
        .restart_each_item(true)
        .build()
        .unwrap();
    let (emitter, mut events) = ProgressEmitter::channel();

    let handle = Downloader::new(runner.clone()).start(job, emitter);

    // Wait until the process is producing output, then stop
    loop {
        match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Some(JobEvent::Line(_))) => break,
            Ok(Some(_)) => continue,
            other => panic!("no output from the fake downloader: {:?}", other),
        }
    }
    let started = Instant::now();
    handle.stop();
    handle.stop();
    let result = handle.wait().await;

    assert_eq!(result, JobResult::Stopped);
    assert_eq!(runner.calls().len(), 1, "no relaunch after stop");
    assert!(started.elapsed() < Duration::from_secs(5));
}
