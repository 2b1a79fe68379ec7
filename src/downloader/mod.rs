// Downloader module - yt-dlp job orchestration engine

pub mod builder;
pub mod cancel;
pub mod errors;
pub mod format_selector;
pub mod models;
pub mod orchestrator;
pub mod process;
pub mod progress;
pub mod restart;
pub mod tools;
pub mod traits;
pub mod utils;

pub use builder::DownloadJobBuilder;
pub use cancel::CancellationToken;
pub use errors::DownloadError;
pub use models::{DownloadJob, DownloadMode, DownloadProgress, JobEvent, JobResult, RunOutcome};
pub use orchestrator::{Downloader, JobHandle};
pub use process::{ProcessHandle, ProcessSupervisor, TerminationPolicy};
pub use progress::ProgressTracker;
pub use restart::{RestartController, RestartPolicy};
pub use tools::ToolManager;
pub use traits::{ProcessRunner, ProgressEmitter};
