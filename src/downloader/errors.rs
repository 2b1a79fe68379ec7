// Error types for the download engine

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    /// The downloader process could not be started (missing binary, permission denied)
    #[error("Failed to start {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    /// yt-dlp not found in system
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Job parameters rejected before launch
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// A helper command did not finish in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Settings could not be read or written
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DownloadError {
    /// Launch failures are prerequisite failures, never retried by the engine
    pub fn is_launch_failure(&self) -> bool {
        matches!(self, Self::Launch { .. } | Self::ToolNotFound(_))
    }

    /// Builds a launch error, classifying a missing binary as `ToolNotFound`
    pub fn launch(program: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            return Self::ToolNotFound(format!("{} ({})", program, source));
        }
        Self::Launch {
            program: program.to_string(),
            source,
        }
    }
}
