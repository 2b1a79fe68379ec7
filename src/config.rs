// Persisted settings - last used job parameters, stored as JSON in the home folder

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::downloader::builder::DownloadJobBuilder;
use crate::downloader::errors::DownloadError;
use crate::downloader::models::{
    AudioBitrate, AudioFormat, AudioSource, DownloadJob, DownloadMode, ModeKind, VideoQuality,
};

/// Environment variable pointing at an alternative settings file
pub const CONFIG_PATH_ENV: &str = "DOWNLOAD_MASTER_CONFIG";

const CONFIG_FILE_NAME: &str = ".download_master.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mode: ModeKind,
    pub url: String,
    pub outdir: PathBuf,
    pub cookies: Option<PathBuf>,
    pub video_quality: VideoQuality,
    pub audio_format: AudioFormat,
    pub audio_bitrate: AudioBitrate,
    pub audio_source: AudioSource,
    pub restart_each_video: bool,
    pub ytdlp_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: ModeKind::default(),
            url: String::new(),
            outdir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            cookies: None,
            video_quality: VideoQuality::default(),
            audio_format: AudioFormat::default(),
            audio_bitrate: AudioBitrate::default(),
            audio_source: AudioSource::default(),
            restart_each_video: false,
            ytdlp_path: None,
        }
    }
}

impl Settings {
    /// `DOWNLOAD_MASTER_CONFIG`, else `~/.download_master.json`
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
            return PathBuf::from(path);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_FILE_NAME)
    }

    /// Load settings; a missing or broken file gives defaults
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("[config] No settings at {}, using defaults", path.display());
                return Self::default();
            }
            Err(e) => {
                tracing::warn!("[config] Cannot read {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(
                    "[config] Ignoring malformed settings in {}: {}",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), DownloadError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .map_err(|e| DownloadError::Config(format!("cannot write {}: {}", path.display(), e)))?;
        tracing::debug!("[config] Saved settings to {}", path.display());
        Ok(())
    }

    pub fn download_mode(&self) -> DownloadMode {
        DownloadMode::from_kind(self.mode, self.audio_source)
    }

    /// Builder preloaded with these settings
    pub fn job_builder(&self) -> DownloadJobBuilder {
        DownloadJobBuilder::new(self.download_mode(), &self.url)
            .output_dir(&self.outdir)
            .cookies(self.cookies.clone())
            .video_quality(self.video_quality)
            .audio_format(self.audio_format)
            .audio_bitrate(self.audio_bitrate)
            .restart_each_item(self.restart_each_video)
    }

    /// Build the job and prepare the output folder
    pub fn to_job(&self) -> Result<DownloadJob, DownloadError> {
        self.job_builder().build_and_prepare()
    }
}
