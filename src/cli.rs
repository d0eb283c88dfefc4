//! Command-line surface. With no subcommand the interactive session starts.

use clap::{Parser, Subcommand};

use crate::command::DownloadOptions;

/// Launch yt-dlp downloads in a terminal window and keep yt-dlp up to date.
#[derive(Parser, Debug)]
#[command(name = "ytdlp-helper")]
#[command(author, version, about)]
pub struct Args {
    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Skip the background yt-dlp update check at startup
    #[arg(long, global = true)]
    pub no_update_check: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download one URL in a new terminal window
    Get {
        /// Video URL
        url: String,

        #[command(flatten)]
        options: OptionArgs,
    },
    /// Check whether a newer yt-dlp is published
    Check,
    /// Download the latest yt-dlp next to this application
    Update {
        /// Reinstall without asking when already up to date
        #[arg(short, long)]
        yes: bool,
    },
}

/// Departures from the default option set.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct OptionArgs {
    /// Extract audio as mp3 (takes precedence over best quality)
    #[arg(short, long)]
    pub audio_only: bool,

    /// Let yt-dlp pick its default format instead of bestvideo+bestaudio
    #[arg(long)]
    pub no_best_quality: bool,

    /// Keep the container yt-dlp merges into instead of mp4
    #[arg(long)]
    pub no_mp4: bool,

    /// Append the video id to file names
    #[arg(long)]
    pub unique_names: bool,

    /// Embed subtitles into the video
    #[arg(short = 's', long)]
    pub embed_subs: bool,

    /// Do not pass a co-located ffmpeg to yt-dlp
    #[arg(long)]
    pub no_ffmpeg: bool,

    /// Keep the terminal open until a key is pressed
    #[arg(short, long)]
    pub keep_open: bool,
}

impl OptionArgs {
    pub fn to_options(&self, url: &str) -> DownloadOptions {
        DownloadOptions {
            url:                 url.to_string(),
            best_quality:        !self.no_best_quality,
            audio_only:          self.audio_only,
            mp4_output:          !self.no_mp4,
            pretty_naming:       !self.unique_names,
            embed_subtitles:     self.embed_subs,
            use_ffmpeg:          !self.no_ffmpeg,
            auto_close_terminal: !self.keep_open,
        }
    }
}
