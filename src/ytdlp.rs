// yt-dlp invocation surface: argument vectors and per-item percent parsing

use lazy_static::lazy_static;
use regex::Regex;

use crate::downloader::format_selector::{FormatSelector, AUDIO_SOURCE_SPEC};
use crate::downloader::models::{AudioSource, DownloadJob, DownloadMode};

/// Seconds yt-dlp sleeps between its own retries
pub const RETRY_SLEEP_SECS: u32 = 5;

/// Builds the ordered argument vector for one yt-dlp run.
///
/// Deterministic and free of I/O: the same job always yields the same
/// arguments. The program name is not included; the URL is always last.
pub struct CommandBuilder<'a> {
    job: &'a DownloadJob,
    max_downloads: Option<u32>,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(job: &'a DownloadJob) -> Self {
        Self {
            job,
            max_downloads: None,
        }
    }

    /// Stop after `count` items in this run
    pub fn max_downloads(mut self, count: u32) -> Self {
        self.max_downloads = Some(count);
        self
    }

    pub fn build(&self) -> Vec<String> {
        let job = self.job;
        let mut args = vec![
            "-o".to_string(),
            job.output_template().to_string(),
            "--continue".to_string(),
            "--no-overwrites".to_string(),
            "--no-post-overwrites".to_string(),
        ];

        for flag in [
            "--retries",
            "--fragment-retries",
            "--extractor-retries",
            "--file-access-retries",
        ] {
            args.push(flag.to_string());
            args.push("infinite".to_string());
        }
        args.push("--retry-sleep".to_string());
        args.push(RETRY_SLEEP_SECS.to_string());

        // One progress update per line, unbuffered
        args.push("--progress".to_string());
        args.push("--newline".to_string());

        if let Some(cookies) = job.cookies().filter(|p| !p.as_os_str().is_empty()) {
            args.push("--cookies".to_string());
            args.push(cookies.to_string_lossy().into_owned());
        }

        match job.mode() {
            DownloadMode::Audio(source) => {
                args.push("-f".to_string());
                args.push(AUDIO_SOURCE_SPEC.to_string());
                args.push("-x".to_string());
                args.push("--audio-format".to_string());
                args.push(job.audio_format().codec().to_string());
                args.extend(FormatSelector::audio_quality_args(
                    job.audio_format(),
                    job.audio_bitrate(),
                ));

                match source {
                    AudioSource::Video => args.push("--no-playlist".to_string()),
                    AudioSource::Playlist | AudioSource::Channel => {
                        args.push("--playlist-reverse".to_string());
                        self.push_archive(&mut args);
                    }
                }
            }
            DownloadMode::Video => {
                args.push("-f".to_string());
                args.push(FormatSelector::video_format_spec(job.video_quality()));
                args.push("--no-playlist".to_string());
            }
            DownloadMode::Channel | DownloadMode::Playlist => {
                args.push("-f".to_string());
                args.push(FormatSelector::video_format_spec(job.video_quality()));
                args.push("--playlist-reverse".to_string());
                self.push_archive(&mut args);
            }
        }

        if let Some(count) = self.max_downloads {
            args.push("--max-downloads".to_string());
            args.push(count.to_string());
        }

        args.push(job.url().to_string());
        args
    }

    fn push_archive(&self, args: &mut Vec<String>) {
        if let Some(archive) = self.job.archive_path() {
            args.push("--download-archive".to_string());
            args.push(archive.to_string_lossy().into_owned());
        }
    }
}

/// Parse the percent of the current item from a progress line like:
/// [download]   6.2% of ~ 343.72MiB at  420.30KiB/s ETA 12:32 (frag 29/454)
pub fn parse_item_percent(line: &str) -> Option<f32> {
    lazy_static! {
        static ref PERCENT_RE: Regex = Regex::new(r"\[download\]\s+(\d+(?:\.\d+)?)%").unwrap();
    }

    let caps = PERCENT_RE.captures(line)?;
    let percent: f32 = caps.get(1)?.as_str().parse().ok()?;
    Some(percent.clamp(0.0, 100.0))
}
