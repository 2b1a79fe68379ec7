// Helper functions shared by the job builder and tool discovery

use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

use super::errors::DownloadError;

/// Channel page tabs that already select a listing
const CHANNEL_TABS: [&str; 8] = [
    "/videos",
    "/shorts",
    "/streams",
    "/playlists",
    "/community",
    "/about",
    "/featured",
    "/channels",
];

/// Basic sanity check: http(s), a known domain, or something domain-like
pub fn is_valid_url_format(url: &str) -> bool {
    let url = url.trim().to_lowercase();
    if url.is_empty() {
        return false;
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        return true;
    }
    if ["youtube.com", "youtu.be", "www."]
        .iter()
        .any(|domain| url.contains(domain))
    {
        return true;
    }
    url.contains('.') && !url.starts_with('.') && !url.contains(' ')
}

pub fn is_youtube_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("youtube.com") || lower.contains("youtu.be")
}

/// Trim whitespace and trailing slashes
pub fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Point a bare channel URL at its uploads tab.
/// Returns the URL and whether `/videos` was appended.
pub fn normalize_channel_url(url: &str) -> (String, bool) {
    let url = normalize_url(url);
    if url.is_empty() {
        return (url, false);
    }

    let lower = url.to_lowercase();
    let has_tab = CHANNEL_TABS.iter().any(|tab| lower.ends_with(tab));
    let has_special_path = url.contains("/watch?") || url.contains("/playlist?");

    if has_tab || has_special_path {
        (url, false)
    } else {
        (format!("{}/videos", url), true)
    }
}

/// Run a short-lived command and capture its output.
/// The child is killed if it outlives `limit`.
pub async fn capture_output(
    program: &str,
    args: &[&str],
    limit: Duration,
) -> Result<Output, DownloadError> {
    let child = TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| DownloadError::launch(program, e))?;

    match timeout(limit, child.wait_with_output()).await {
        Ok(output) => Ok(output?),
        Err(_) => Err(DownloadError::Timeout(format!(
            "{} did not finish within {}s",
            program,
            limit.as_secs()
        ))),
    }
}
