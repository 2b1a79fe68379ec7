// Command-line front end: settings merge, job start, Ctrl-C stop, event display

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::Settings;
use crate::downloader::models::{
    AudioBitrate, AudioFormat, AudioSource, JobEvent, JobResult, ModeKind, NoticeLevel,
    ProgressState, VideoQuality,
};
use crate::downloader::{Downloader, ProcessSupervisor, ProgressEmitter, ToolManager};
use crate::logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "download-master")]
#[command(author, version, about = "Download channels, playlists, videos and audio with yt-dlp", long_about = None)]
pub struct Cli {
    /// Channel, playlist or video URL (defaults to the last one used)
    pub url: Option<String>,

    /// channel, playlist, video or audio
    #[arg(short, long)]
    pub mode: Option<ModeKind>,

    /// Source for audio mode: video, playlist or channel
    #[arg(long)]
    pub audio_source: Option<AudioSource>,

    /// Output folder
    #[arg(short, long)]
    pub outdir: Option<PathBuf>,

    /// Netscape cookie file passed to yt-dlp (empty string clears it)
    #[arg(long)]
    pub cookies: Option<String>,

    /// Video quality: max, 4k, 1440p, 1080p, 720p, 480p, ...
    #[arg(short, long)]
    pub quality: Option<VideoQuality>,

    /// wav, mp3 or ogg
    #[arg(long)]
    pub audio_format: Option<AudioFormat>,

    /// Audio bitrate in kbit/s, or max
    #[arg(long)]
    pub bitrate: Option<AudioBitrate>,

    /// Relaunch yt-dlp after every downloaded item
    #[arg(long, overrides_with = "no_restart")]
    pub restart: bool,

    #[arg(long, overrides_with = "restart")]
    pub no_restart: bool,

    /// Path to the yt-dlp binary
    #[arg(long)]
    pub ytdlp: Option<PathBuf>,

    /// Settings file (default: ~/.download_master.json)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Do not store these options as the new defaults
    #[arg(long)]
    pub no_save: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Command-line values override the persisted ones
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(url) = &self.url {
            settings.url = url.clone();
        }
        if let Some(mode) = self.mode {
            settings.mode = mode;
        }
        if let Some(source) = self.audio_source {
            settings.audio_source = source;
        }
        if let Some(outdir) = &self.outdir {
            settings.outdir = outdir.clone();
        }
        if let Some(cookies) = &self.cookies {
            let cookies = cookies.trim();
            settings.cookies = (!cookies.is_empty()).then(|| PathBuf::from(cookies));
        }
        if let Some(quality) = self.quality {
            settings.video_quality = quality;
        }
        if let Some(format) = self.audio_format {
            settings.audio_format = format;
        }
        if let Some(bitrate) = self.bitrate {
            settings.audio_bitrate = bitrate;
        }
        if self.restart {
            settings.restart_each_video = true;
        }
        if self.no_restart {
            settings.restart_each_video = false;
        }
        if let Some(ytdlp) = &self.ytdlp {
            settings.ytdlp_path = Some(ytdlp.clone());
        }
    }
}

pub fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    runtime.block_on(run_async(cli))
}

async fn run_async(cli: Cli) -> anyhow::Result<ExitCode> {
    let config_path = cli.config.clone().unwrap_or_else(Settings::default_path);
    let mut settings = Settings::load(&config_path);
    cli.apply_to(&mut settings);

    if !cli.no_save {
        if let Err(e) = settings.save(&config_path) {
            tracing::warn!("[config] {}", e);
        }
    }

    let job = settings.to_job().context("cannot start download")?;

    let tool = ToolManager::new(settings.ytdlp_path.clone()).probe().await;
    match &tool.version {
        Some(version) => tracing::info!("[tools] yt-dlp {} at {}", version, tool.path.display()),
        None => tracing::warn!("[tools] yt-dlp not working at {}", tool.path.display()),
    }

    let downloader = Downloader::new(Arc::new(ProcessSupervisor::new(tool.path)));
    let (emitter, events) = ProgressEmitter::channel();
    let handle = downloader.start(job, emitter);

    let token = handle.token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Stopping...");
            token.stop();
        }
    });

    let display = tokio::spawn(display_events(events));
    let result = handle.wait().await;
    let _ = display.await;

    Ok(match result {
        JobResult::Completed(_) | JobResult::Stopped => ExitCode::SUCCESS,
        JobResult::Error { .. } => ExitCode::FAILURE,
    })
}

/// Raw lines to stdout, everything else to stderr
async fn display_events(mut events: UnboundedReceiver<JobEvent>) {
    let mut last = ProgressState::default();

    while let Some(event) = events.recv().await {
        match event {
            JobEvent::Line(line) => println!("{}", line),
            JobEvent::Progress(progress) => {
                let state = ProgressState {
                    downloaded: progress.downloaded,
                    total: progress.total,
                };
                if state != last {
                    eprintln!("Progress: {}", state);
                    last = state;
                }
            }
            JobEvent::Notice { level, message } => match level {
                NoticeLevel::Info => eprintln!("{}", message),
                NoticeLevel::Warning => eprintln!("Warning: {}", message),
                NoticeLevel::Error => eprintln!("Error: {}", message),
            },
            JobEvent::Finished(result) => {
                match result {
                    JobResult::Completed(completion) => eprintln!(
                        "Finished ({:?}): {} new items, {}",
                        completion.reason, completion.items_downloaded, completion.progress
                    ),
                    JobResult::Stopped => eprintln!("Stopped."),
                    JobResult::Error { detail } => eprintln!("Failed: {}", detail),
                }
                break;
            }
        }
    }
}
