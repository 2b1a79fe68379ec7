// ToolManager - locates the yt-dlp binary and probes its version

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::DownloadError;
use super::utils::capture_output;

/// Environment variable overriding the yt-dlp binary
pub const YTDLP_BIN_ENV: &str = "YTDLP_BIN";

const BINARY_NAME: &str = "yt-dlp";
const VERSION_TIMEOUT: Duration = Duration::from_secs(15);

/// Where the binary path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSource {
    Settings,
    Environment,
    CommonPath,
    SearchPath,
    /// Bare name, left to the OS to resolve at launch
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub path: PathBuf,
    pub source: ToolSource,
    pub version: Option<String>,
    pub is_available: bool,
}

pub struct ToolManager {
    configured: Option<PathBuf>,
}

impl ToolManager {
    /// `configured` comes from the settings file or the command line
    pub fn new(configured: Option<PathBuf>) -> Self {
        Self {
            configured: configured.filter(|p| !p.as_os_str().is_empty()),
        }
    }

    /// Resolve the yt-dlp path without running it
    pub fn resolve_ytdlp(&self) -> (PathBuf, ToolSource) {
        let env_value = std::env::var(YTDLP_BIN_ENV).ok();
        let (path, source) = resolve_with(self.configured.as_deref(), env_value.as_deref());
        tracing::debug!("[tools] yt-dlp resolved to {} ({:?})", path.display(), source);
        (path, source)
    }

    /// Resolve and run `--version`
    pub async fn probe(&self) -> ToolInfo {
        let (path, source) = self.resolve_ytdlp();
        let version = match get_version(&path).await {
            Ok(version) => Some(version),
            Err(e) => {
                tracing::warn!("[tools] {}", e);
                None
            }
        };

        ToolInfo {
            name: BINARY_NAME.to_string(),
            is_available: version.is_some(),
            path,
            source,
            version,
        }
    }
}

fn resolve_with(configured: Option<&Path>, env_value: Option<&str>) -> (PathBuf, ToolSource) {
    // 1. Explicit setting
    if let Some(path) = configured {
        return (path.to_path_buf(), ToolSource::Settings);
    }

    // 2. Environment override
    if let Some(value) = env_value.map(str::trim).filter(|v| !v.is_empty()) {
        return (PathBuf::from(value), ToolSource::Environment);
    }

    // 3. Common install locations
    let common_paths = [
        format!("/opt/homebrew/bin/{}", BINARY_NAME),
        format!("/usr/local/bin/{}", BINARY_NAME),
        format!("/usr/bin/{}", BINARY_NAME),
    ];
    for path in common_paths {
        if Path::new(&path).exists() {
            return (PathBuf::from(path), ToolSource::CommonPath);
        }
    }

    // 4. PATH lookup
    if let Ok(output) = Command::new("which").arg(BINARY_NAME).output() {
        if output.status.success() {
            let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path.is_empty() {
                return (PathBuf::from(path), ToolSource::SearchPath);
            }
        }
    }

    // Last resort: hope it's in PATH at launch time
    (PathBuf::from(BINARY_NAME), ToolSource::Fallback)
}

async fn get_version(path: &Path) -> Result<String, DownloadError> {
    let program = path.to_string_lossy();
    let output = capture_output(&program, &["--version"], VERSION_TIMEOUT).await?;

    if !output.status.success() {
        return Err(DownloadError::ToolNotFound(format!(
            "{} --version exited with {}",
            program, output.status
        )));
    }
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if version.is_empty() {
        return Err(DownloadError::ToolNotFound(format!(
            "{} printed no version",
            program
        )));
    }
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setting_beats_environment() {
        let (path, source) = resolve_with(Some(Path::new("/custom/yt-dlp")), Some("/env/yt-dlp"));
        assert_eq!(path, PathBuf::from("/custom/yt-dlp"));
        assert_eq!(source, ToolSource::Settings);
    }

    #[test]
    fn test_environment_used_when_not_configured() {
        let (path, source) = resolve_with(None, Some(" /env/yt-dlp "));
        assert_eq!(path, PathBuf::from("/env/yt-dlp"));
        assert_eq!(source, ToolSource::Environment);
    }

    #[test]
    fn test_blank_values_fall_through() {
        let manager = ToolManager::new(Some(PathBuf::new()));
        assert!(manager.configured.is_none());

        let (_, source) = resolve_with(None, Some("   "));
        assert_ne!(source, ToolSource::Environment);
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let info = ToolManager::new(Some(PathBuf::from("/nonexistent/yt-dlp")))
            .probe()
            .await;
        assert!(!info.is_available);
        assert_eq!(info.version, None);
    }
}
