//! Builder pattern for download jobs.
//!
//! Resolves the settings a caller picks (mode, URL, folder, quality) into
//! an immutable `DownloadJob`: normalised URL, output template, and the
//! archive path for modes that deduplicate.

use std::path::{Path, PathBuf};

use super::errors::DownloadError;
use super::models::{
    AudioBitrate, AudioFormat, AudioSource, DownloadJob, DownloadMode, VideoQuality,
};
use super::utils::{is_valid_url_format, is_youtube_url, normalize_channel_url, normalize_url};

/// File name of the download archive inside the output folder
pub const ARCHIVE_FILE_NAME: &str = "archive.txt";

const ITEM_FILE: &str = "%(title)s [%(id)s].%(ext)s";
const NUMBERED_ITEM_FILE: &str = "%(playlist_autonumber)05d. %(title)s [%(id)s].%(ext)s";

/// Builder for constructing download jobs.
///
/// # Example
///
/// ```ignore
/// let job = DownloadJobBuilder::new(DownloadMode::Audio(AudioSource::Playlist), url)
///     .output_dir("/music")
///     .audio_format(AudioFormat::Mp3)
///     .audio_bitrate(AudioBitrate::Kbps(192))
///     .restart_each_item(true)
///     .build()?;
/// ```
pub struct DownloadJobBuilder {
    mode: DownloadMode,
    url: String,
    output_dir: PathBuf,
    cookies: Option<PathBuf>,
    video_quality: VideoQuality,
    audio_format: AudioFormat,
    audio_bitrate: AudioBitrate,
    restart_each_item: bool,
}

impl DownloadJobBuilder {
    pub fn new(mode: DownloadMode, url: &str) -> Self {
        Self {
            mode,
            url: url.to_string(),
            output_dir: PathBuf::new(),
            cookies: None,
            video_quality: VideoQuality::default(),
            audio_format: AudioFormat::default(),
            audio_bitrate: AudioBitrate::default(),
            restart_each_item: false,
        }
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Cookie file; an empty path means "no cookies"
    pub fn cookies(mut self, path: Option<impl Into<PathBuf>>) -> Self {
        self.cookies = path
            .map(Into::<PathBuf>::into)
            .filter(|p| !p.as_os_str().is_empty());
        self
    }

    pub fn video_quality(mut self, quality: VideoQuality) -> Self {
        self.video_quality = quality;
        self
    }

    pub fn audio_format(mut self, format: AudioFormat) -> Self {
        self.audio_format = format;
        self
    }

    pub fn audio_bitrate(mut self, bitrate: AudioBitrate) -> Self {
        self.audio_bitrate = bitrate;
        self
    }

    /// Relaunch the downloader after every new item (archive modes only)
    pub fn restart_each_item(mut self, enabled: bool) -> Self {
        self.restart_each_item = enabled;
        self
    }

    /// Validate and resolve the job without touching the filesystem
    pub fn build(self) -> Result<DownloadJob, DownloadError> {
        let raw_url = self.url.trim();
        if raw_url.is_empty() {
            return Err(DownloadError::InvalidJob("URL is empty".to_string()));
        }
        if !is_valid_url_format(raw_url) {
            return Err(DownloadError::InvalidJob(format!(
                "'{}' does not look like a URL",
                raw_url
            )));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(DownloadError::InvalidJob(
                "output folder is not set".to_string(),
            ));
        }

        let url = if self.mode.is_channel_source() {
            let (url, appended) = normalize_channel_url(raw_url);
            if appended {
                tracing::info!("[builder] Channel URL without tab, using {}", url);
            }
            url
        } else {
            normalize_url(raw_url)
        };

        if !is_youtube_url(&url) {
            tracing::warn!("[builder] {} is not a YouTube URL, results may vary", url);
        }

        let archive_path = self
            .mode
            .uses_archive()
            .then(|| self.output_dir.join(ARCHIVE_FILE_NAME));

        if self.restart_each_item && archive_path.is_none() {
            tracing::debug!("[builder] Restart ignored for {} mode (no archive)", self.mode);
        }

        Ok(DownloadJob {
            mode: self.mode,
            url,
            output_template: output_template(&self.output_dir, self.mode),
            archive_path,
            cookies: self.cookies,
            video_quality: self.video_quality,
            audio_format: self.audio_format,
            audio_bitrate: self.audio_bitrate,
            restart_each_item: self.restart_each_item,
        })
    }

    /// Build, then make sure the output folder exists and the cookie file is present
    pub fn build_and_prepare(self) -> Result<DownloadJob, DownloadError> {
        let output_dir = self.output_dir.clone();
        let job = self.build()?;

        if let Some(cookies) = job.cookies() {
            if !cookies.is_file() {
                return Err(DownloadError::InvalidJob(format!(
                    "cookie file not found: {}",
                    cookies.display()
                )));
            }
        }

        if !output_dir.exists() {
            std::fs::create_dir_all(&output_dir)?;
            tracing::info!("[builder] Created output folder {}", output_dir.display());
        }

        Ok(job)
    }
}

/// Output path template; placeholders are expanded by yt-dlp
fn output_template(output_dir: &Path, mode: DownloadMode) -> String {
    let path = match mode {
        DownloadMode::Channel | DownloadMode::Audio(AudioSource::Channel) => {
            output_dir.join("%(uploader)s").join(NUMBERED_ITEM_FILE)
        }
        DownloadMode::Playlist | DownloadMode::Audio(AudioSource::Playlist) => output_dir
            .join("%(uploader)s")
            .join("%(playlist_title)s")
            .join(NUMBERED_ITEM_FILE),
        DownloadMode::Video | DownloadMode::Audio(AudioSource::Video) => {
            output_dir.join(ITEM_FILE)
        }
    };
    path.to_string_lossy().into_owned()
}
