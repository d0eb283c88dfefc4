use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::HelperConfig;

const PRETTY_TEMPLATE: &str = "%(title)s.%(ext)s";
const UNIQUE_TEMPLATE: &str = "%(title)s-%(id)s.%(ext)s";

pub const BOTH_FORMATS_NOTICE: &str = "Both 'Best Quality' and 'Audio Only' were selected.\n\
                                       Defaulting to 'Audio Only' for best results.";

/// Flags the user toggles before each download, plus the URL itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    pub url:                 String,
    pub best_quality:        bool,
    pub audio_only:          bool,
    pub mp4_output:          bool,
    pub pretty_naming:       bool,
    pub embed_subtitles:     bool,
    pub use_ffmpeg:          bool,
    pub auto_close_terminal: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        DownloadOptions {
            url:                 String::new(),
            best_quality:        true,
            audio_only:          false,
            mp4_output:          true,
            pretty_naming:       true,
            embed_subtitles:     false,
            use_ffmpeg:          true,
            auto_close_terminal: true,
        }
    }
}

/// Arguments for the downloader (URL last) and any notices for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadCommand {
    pub args:    Vec<String>,
    pub notices: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("Please enter a video URL.")]
    EmptyUrl,
}

/// Output template for `-o`; the non-pretty form carries the video id so
/// same-titled videos do not overwrite each other.
pub fn output_template(downloads_dir: &Path, pretty_naming: bool) -> String {
    let pattern = if pretty_naming { PRETTY_TEMPLATE } else { UNIQUE_TEMPLATE };
    downloads_dir.join(pattern).to_string_lossy().into_owned()
}

/// Translate `opts` into a yt-dlp argument list.
///
/// Pure: no filesystem access. `ffmpeg` is the already-resolved helper
/// location, used only when `opts.use_ffmpeg` is set.
pub fn build_args(
    opts: &DownloadOptions,
    downloads_dir: &Path,
    ffmpeg: Option<&Path>,
) -> Result<DownloadCommand, BuildError> {
    let url = opts.url.trim();
    if url.is_empty() {
        return Err(BuildError::EmptyUrl);
    }

    let mut args: Vec<String> = Vec::new();
    let mut notices = Vec::new();

    if opts.audio_only {
        if opts.best_quality {
            notices.push(BOTH_FORMATS_NOTICE.to_string());
        }
        args.extend(["-x", "--audio-format", "mp3"].map(String::from));
    } else if opts.best_quality {
        args.extend(["-f", "bestvideo+bestaudio"].map(String::from));
    }

    if opts.mp4_output && !opts.audio_only {
        args.extend(["--merge-output-format", "mp4"].map(String::from));
    }

    args.push("-o".to_string());
    args.push(output_template(downloads_dir, opts.pretty_naming));

    if opts.embed_subtitles {
        args.push("--embed-subs".to_string());
    }

    if opts.use_ffmpeg {
        if let Some(path) = ffmpeg {
            args.push("--ffmpeg-location".to_string());
            args.push(path.to_string_lossy().into_owned());
        }
    }

    args.push(url.to_string());
    Ok(DownloadCommand { args, notices })
}

/// Look for a co-located ffmpeg: `app_dir/ffmpeg[.exe]`, then the `ffmpeg/` subfolder.
pub fn find_ffmpeg(app_dir: &Path) -> Option<PathBuf> {
    let name = if cfg!(windows) { "ffmpeg.exe" } else { "ffmpeg" };
    [app_dir.join(name), app_dir.join("ffmpeg").join(name)]
        .into_iter()
        .find(|p| p.is_file())
}

/// Build the command for `opts` against the real application layout,
/// creating the downloads directory if needed.
pub fn prepare_download(
    config: &HelperConfig,
    opts: &DownloadOptions,
) -> anyhow::Result<DownloadCommand> {
    let ffmpeg = if opts.use_ffmpeg { find_ffmpeg(&config.app_dir) } else { None };
    let command = build_args(opts, &config.downloads_dir, ffmpeg.as_deref())?;
    std::fs::create_dir_all(&config.downloads_dir)?;
    Ok(command)
}
