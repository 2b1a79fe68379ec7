// ProgressTracker - turns downloader output lines into item counters
//
// Only two counters are kept. Every line is classified on its own:
// - "Downloading item N of M" sets the total and rewinds to N-1
// - a 100% / "already downloaded" marker is a genuine completion
// - "already recorded in the archive" is an archive skip
// Completions and skips both advance the aggregate counter, but only
// completions count as new downloads for the restart loop.

use lazy_static::lazy_static;
use regex::Regex;

use super::models::{LineKind, ProgressState};

/// Markers of an item that was actually transferred (or found on disk)
const COMPLETION_MARKERS: [&str; 2] = ["[download] 100%", "has already been downloaded"];

/// Marker of an item skipped because the archive already lists it
const ARCHIVE_SKIP_MARKER: &str = "has already been recorded in the archive";

lazy_static! {
    static ref ITEM_COUNTER_RE: Regex =
        Regex::new(r"(?i)downloading\s+(?:item|video)\s+(\d+)\s+of\s+(\d+)").unwrap();
}

/// Parse "Downloading item N of M" into `(N, M)`
pub fn parse_item_counter(line: &str) -> Option<(u64, u64)> {
    let caps = ITEM_COUNTER_RE.captures(line)?;
    let current = caps.get(1)?.as_str().parse().ok()?;
    let total = caps.get(2)?.as_str().parse().ok()?;
    Some((current, total))
}

pub fn is_completion_line(line: &str) -> bool {
    COMPLETION_MARKERS.iter().any(|marker| line.contains(marker))
}

pub fn is_archive_skip_line(line: &str) -> bool {
    line.contains(ARCHIVE_SKIP_MARKER)
}

#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    state: ProgressState,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker for jobs whose item count is known up front (single video)
    pub fn with_total(total: u64) -> Self {
        Self {
            state: ProgressState {
                downloaded: 0,
                total,
            },
        }
    }

    pub fn state(&self) -> ProgressState {
        self.state
    }

    /// Classify one line and update the counters
    pub fn classify(&mut self, line: &str) -> LineKind {
        if let Some((current, total)) = parse_item_counter(line) {
            self.state.total = total;
            // The line announces item N, so N-1 are behind us
            self.state.downloaded = current.saturating_sub(1).min(total);
            return LineKind::ProgressTotal;
        }

        let kind = if is_completion_line(line) {
            LineKind::GenuineCompletion
        } else if is_archive_skip_line(line) {
            LineKind::ArchiveSkip
        } else {
            return LineKind::Unclassified;
        };

        self.advance();
        kind
    }

    /// Force the counters to "all done" when the job concludes
    pub fn finish(&mut self) -> ProgressState {
        if self.state.is_known() {
            self.state.downloaded = self.state.total;
        }
        self.state
    }

    fn advance(&mut self) {
        if self.state.is_known() && self.state.downloaded < self.state.total {
            self.state.downloaded += 1;
        }
    }
}
