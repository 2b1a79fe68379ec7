// Common data models for the download engine

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where an audio-only job takes its items from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioSource {
    /// One video, playlist expansion disabled
    #[default]
    Video,
    Playlist,
    Channel,
}

impl FromStr for AudioSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "video" | "single" => Ok(Self::Video),
            "playlist" => Ok(Self::Playlist),
            "channel" => Ok(Self::Channel),
            other => Err(format!("unknown audio source '{}' (expected video, playlist or channel)", other)),
        }
    }
}

impl fmt::Display for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Playlist => write!(f, "playlist"),
            Self::Channel => write!(f, "channel"),
        }
    }
}

/// Mode as stored in settings and accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeKind {
    #[default]
    Channel,
    Playlist,
    Video,
    Audio,
}

impl FromStr for ModeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "channel" => Ok(Self::Channel),
            "playlist" => Ok(Self::Playlist),
            "video" | "single" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            other => Err(format!(
                "unknown mode '{}' (expected channel, playlist, video or audio)",
                other
            )),
        }
    }
}

/// What a job downloads. Audio jobs carry their sub-source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMode {
    Channel,
    Playlist,
    Video,
    Audio(AudioSource),
}

impl DownloadMode {
    pub fn from_kind(kind: ModeKind, audio_source: AudioSource) -> Self {
        match kind {
            ModeKind::Channel => Self::Channel,
            ModeKind::Playlist => Self::Playlist,
            ModeKind::Video => Self::Video,
            ModeKind::Audio => Self::Audio(audio_source),
        }
    }

    /// Modes that deduplicate through a download archive
    pub fn uses_archive(&self) -> bool {
        matches!(
            self,
            Self::Channel
                | Self::Playlist
                | Self::Audio(AudioSource::Playlist)
                | Self::Audio(AudioSource::Channel)
        )
    }

    /// Modes that download exactly one item
    pub fn is_single_item(&self) -> bool {
        matches!(self, Self::Video | Self::Audio(AudioSource::Video))
    }

    /// Modes whose URL points at a channel page
    pub fn is_channel_source(&self) -> bool {
        matches!(self, Self::Channel | Self::Audio(AudioSource::Channel))
    }
}

impl fmt::Display for DownloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel => write!(f, "channel"),
            Self::Playlist => write!(f, "playlist"),
            Self::Video => write!(f, "video"),
            Self::Audio(source) => write!(f, "audio ({})", source),
        }
    }
}

/// Video quality ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VideoQuality {
    /// Best available, no height ceiling
    #[default]
    Max,
    /// Height ceiling in pixels (1080 for 1080p)
    Capped(u32),
}

impl VideoQuality {
    pub fn max_height(&self) -> Option<u32> {
        match self {
            Self::Max => None,
            Self::Capped(height) => Some(*height),
        }
    }
}

impl FromStr for VideoQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_lowercase();
        match value.as_str() {
            "max" | "best" => return Ok(Self::Max),
            "4k" => return Ok(Self::Capped(2160)),
            _ => {}
        }
        value
            .strip_suffix('p')
            .unwrap_or(value.as_str())
            .parse::<u32>()
            .ok()
            .filter(|h| *h > 0)
            .map(Self::Capped)
            .ok_or_else(|| format!("unknown video quality '{}' (expected max, 4k, 1080p, ...)", s))
    }
}

impl fmt::Display for VideoQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Max => write!(f, "max"),
            Self::Capped(2160) => write!(f, "4k"),
            Self::Capped(height) => write!(f, "{}p", height),
        }
    }
}

impl TryFrom<String> for VideoQuality {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VideoQuality> for String {
    fn from(value: VideoQuality) -> Self {
        value.to_string()
    }
}

/// Target container/codec for audio extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Wav,
    Mp3,
    Ogg,
}

impl AudioFormat {
    /// Codec name understood by `--audio-format`
    pub fn codec(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Ogg => "vorbis",
        }
    }

    pub fn is_lossless(&self) -> bool {
        matches!(self, Self::Wav)
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wav" => Ok(Self::Wav),
            "mp3" => Ok(Self::Mp3),
            "ogg" | "vorbis" => Ok(Self::Ogg),
            other => Err(format!("unknown audio format '{}' (expected wav, mp3 or ogg)", other)),
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wav => write!(f, "wav"),
            Self::Mp3 => write!(f, "mp3"),
            Self::Ogg => write!(f, "ogg"),
        }
    }
}

/// Audio bitrate for lossy formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AudioBitrate {
    /// Highest VBR quality
    #[default]
    Max,
    /// Constant bitrate in kbit/s
    Kbps(u32),
}

impl FromStr for AudioBitrate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_lowercase();
        if value == "max" {
            return Ok(Self::Max);
        }
        value
            .strip_suffix('k')
            .unwrap_or(value.as_str())
            .parse::<u32>()
            .ok()
            .filter(|kbps| *kbps > 0)
            .map(Self::Kbps)
            .ok_or_else(|| format!("unknown audio bitrate '{}' (expected max, 320, 192, ...)", s))
    }
}

impl fmt::Display for AudioBitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Max => write!(f, "max"),
            Self::Kbps(kbps) => write!(f, "{}", kbps),
        }
    }
}

impl TryFrom<String> for AudioBitrate {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AudioBitrate> for String {
    fn from(value: AudioBitrate) -> Self {
        value.to_string()
    }
}

/// A fully resolved download job. Built by `DownloadJobBuilder`, never
/// mutated after launch.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub(crate) mode: DownloadMode,
    pub(crate) url: String,
    pub(crate) output_template: String,
    pub(crate) archive_path: Option<PathBuf>,
    pub(crate) cookies: Option<PathBuf>,
    pub(crate) video_quality: VideoQuality,
    pub(crate) audio_format: AudioFormat,
    pub(crate) audio_bitrate: AudioBitrate,
    pub(crate) restart_each_item: bool,
}

impl DownloadJob {
    pub fn mode(&self) -> DownloadMode {
        self.mode
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn output_template(&self) -> &str {
        &self.output_template
    }

    pub fn archive_path(&self) -> Option<&Path> {
        self.archive_path.as_deref()
    }

    pub fn cookies(&self) -> Option<&Path> {
        self.cookies.as_deref()
    }

    pub fn video_quality(&self) -> VideoQuality {
        self.video_quality
    }

    pub fn audio_format(&self) -> AudioFormat {
        self.audio_format
    }

    pub fn audio_bitrate(&self) -> AudioBitrate {
        self.audio_bitrate
    }

    /// Restart-per-item only applies when an archive can skip finished items
    pub fn restart_enabled(&self) -> bool {
        self.restart_each_item && self.archive_path.is_some()
    }
}

/// Aggregate item counters. `total == 0` means the tool is still scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressState {
    pub downloaded: u64,
    pub total: u64,
}

impl ProgressState {
    pub fn is_known(&self) -> bool {
        self.total > 0
    }
}

impl fmt::Display for ProgressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            write!(f, "{}/{}", self.downloaded, self.total)
        } else {
            write!(f, "scanning...")
        }
    }
}

/// Classification of one downloader output line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    /// "Downloading item N of M"
    ProgressTotal,
    /// An item finished transferring (or was already on disk)
    GenuineCompletion,
    /// The archive says the item was downloaded by an earlier run
    ArchiveSkip,
    Unclassified,
}

/// Result of a single process run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunOutcome {
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub genuine_completion: bool,
    pub archive_skips: u32,
    /// A stop request cut this run short
    pub interrupted: bool,
    pub lines: u64,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn record(&mut self, kind: LineKind) {
        self.lines += 1;
        match kind {
            LineKind::GenuineCompletion => self.genuine_completion = true,
            LineKind::ArchiveSkip => self.archive_skips += 1,
            LineKind::ProgressTotal | LineKind::Unclassified => {}
        }
    }
}

/// Why a job was concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// The downloader exited with status 0
    Success,
    /// A run only met items already recorded in the archive
    ArchiveExhausted,
    /// Too many consecutive runs without a new item
    EmptyRunLimit,
    /// Empty runs kept failing for longer than the retry window
    RetryWindowElapsed,
    /// Single run ended with a non-zero status; most items are likely on disk
    NonZeroExit,
}

impl CompletionReason {
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::NonZeroExit | Self::RetryWindowElapsed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub reason: CompletionReason,
    pub exit_code: Option<i32>,
    /// Items newly downloaded by restart runs in this session
    pub items_downloaded: u32,
    pub progress: ProgressState,
}

/// Terminal state of a job. Every job ends in exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobResult {
    Completed(Completion),
    Stopped,
    Error { detail: String },
}

impl JobResult {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Progress snapshot sent to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub downloaded: u64,
    pub total: u64,
    /// Classification of the line behind this update; `None` for a final summary
    pub kind: Option<LineKind>,
    /// Percent of the current item, from `[download]  NN.N%` lines
    pub item_percent: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// One-directional event stream from the worker to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum JobEvent {
    /// Raw downloader output, unmodified
    Line(String),
    Progress(DownloadProgress),
    Notice { level: NoticeLevel, message: String },
    Finished(JobResult),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_quality_parsing() {
        assert_eq!("max".parse::<VideoQuality>(), Ok(VideoQuality::Max));
        assert_eq!("4K".parse::<VideoQuality>(), Ok(VideoQuality::Capped(2160)));
        assert_eq!("1080p".parse::<VideoQuality>(), Ok(VideoQuality::Capped(1080)));
        assert_eq!(" 720 ".parse::<VideoQuality>(), Ok(VideoQuality::Capped(720)));
        assert!("0p".parse::<VideoQuality>().is_err());
        assert!("hd".parse::<VideoQuality>().is_err());
        assert_eq!(VideoQuality::Capped(2160).to_string(), "4k");
        assert_eq!(VideoQuality::Capped(1440).to_string(), "1440p");
    }

    #[test]
    fn test_audio_bitrate_parsing() {
        assert_eq!("max".parse::<AudioBitrate>(), Ok(AudioBitrate::Max));
        assert_eq!("192".parse::<AudioBitrate>(), Ok(AudioBitrate::Kbps(192)));
        assert_eq!("320k".parse::<AudioBitrate>(), Ok(AudioBitrate::Kbps(320)));
        assert!("loud".parse::<AudioBitrate>().is_err());
    }

    #[test]
    fn test_archive_usage_per_mode() {
        assert!(DownloadMode::Channel.uses_archive());
        assert!(DownloadMode::Playlist.uses_archive());
        assert!(!DownloadMode::Video.uses_archive());
        assert!(!DownloadMode::Audio(AudioSource::Video).uses_archive());
        assert!(DownloadMode::Audio(AudioSource::Playlist).uses_archive());
        assert!(DownloadMode::Audio(AudioSource::Channel).uses_archive());
    }

    #[test]
    fn test_settings_values_serialize_as_strings() {
        let json = serde_json::to_string(&(VideoQuality::Capped(1080), AudioBitrate::Kbps(192)))
            .unwrap();
        assert_eq!(json, r#"["1080p","192"]"#);

        let parsed: VideoQuality = serde_json::from_str(r#""480p""#).unwrap();
        assert_eq!(parsed, VideoQuality::Capped(480));
        assert!(serde_json::from_str::<VideoQuality>(r#""tiny""#).is_err());
    }

    #[test]
    fn test_run_outcome_tallies() {
        let mut outcome = RunOutcome::default();
        outcome.record(LineKind::ProgressTotal);
        outcome.record(LineKind::ArchiveSkip);
        outcome.record(LineKind::ArchiveSkip);
        outcome.record(LineKind::Unclassified);
        assert!(!outcome.genuine_completion);
        assert_eq!(outcome.archive_skips, 2);
        assert_eq!(outcome.lines, 4);

        outcome.record(LineKind::GenuineCompletion);
        assert!(outcome.genuine_completion);
    }

    #[test]
    fn test_job_result_json_shape() {
        let json = serde_json::to_value(JobResult::Error {
            detail: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["detail"], "boom");

        let stopped = serde_json::to_value(JobResult::Stopped).unwrap();
        assert_eq!(stopped["status"], "stopped");
    }
}
