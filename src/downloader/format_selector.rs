// FormatSelector - yt-dlp format selection per quality setting
//
// Handles:
// - Video quality -> `-f` selector (merge best video+audio, height ceiling)
// - Audio format -> `--audio-format` codec
// - Audio bitrate -> CBR post-processor args or best VBR quality

use super::models::{AudioBitrate, AudioFormat, VideoQuality};

/// Selector used for audio extraction regardless of target format
pub const AUDIO_SOURCE_SPEC: &str = "bestaudio/best";

pub struct FormatSelector;

impl FormatSelector {
    /// Get format spec for yt-dlp based on video quality
    pub fn video_format_spec(quality: VideoQuality) -> String {
        match quality.max_height() {
            None => "bv*+ba/b".to_string(),
            // Merge under the ceiling, then a combined stream under it, then anything
            Some(height) => format!("bv*[height<={h}]+ba/b[height<={h}]/b", h = height),
        }
    }

    /// Post-processing args controlling the encoded audio quality
    pub fn audio_quality_args(format: AudioFormat, bitrate: AudioBitrate) -> Vec<String> {
        if format.is_lossless() {
            return Vec::new();
        }

        match bitrate {
            AudioBitrate::Kbps(kbps) => vec![
                "--postprocessor-args".to_string(),
                format!("ffmpeg:-b:a {}k", kbps),
            ],
            AudioBitrate::Max => vec!["--audio-quality".to_string(), "0".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_quality_has_no_ceiling() {
        let spec = FormatSelector::video_format_spec(VideoQuality::Max);
        assert_eq!(spec, "bv*+ba/b");
        assert!(!spec.contains("height"));
    }

    #[test]
    fn test_capped_quality_falls_back_under_ceiling() {
        assert_eq!(
            FormatSelector::video_format_spec(VideoQuality::Capped(1080)),
            "bv*[height<=1080]+ba/b[height<=1080]/b"
        );
        assert_eq!(
            FormatSelector::video_format_spec(VideoQuality::Capped(2160)),
            "bv*[height<=2160]+ba/b[height<=2160]/b"
        );
    }

    #[test]
    fn test_fixed_bitrate_uses_cbr_postprocessor() {
        let args = FormatSelector::audio_quality_args(AudioFormat::Mp3, AudioBitrate::Kbps(192));
        assert_eq!(args, vec!["--postprocessor-args", "ffmpeg:-b:a 192k"]);
    }

    #[test]
    fn test_max_bitrate_requests_best_vbr() {
        let args = FormatSelector::audio_quality_args(AudioFormat::Ogg, AudioBitrate::Max);
        assert_eq!(args, vec!["--audio-quality", "0"]);
    }

    #[test]
    fn test_wav_ignores_bitrate() {
        assert!(FormatSelector::audio_quality_args(AudioFormat::Wav, AudioBitrate::Kbps(320)).is_empty());
        assert!(FormatSelector::audio_quality_args(AudioFormat::Wav, AudioBitrate::Max).is_empty());
    }
}
