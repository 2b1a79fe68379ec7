pub mod cli;
pub mod config;
pub mod downloader;
pub mod logging;
pub mod ytdlp;

pub use cli::run;
