use std::path::{Path, PathBuf};
use thiserror::Error;

/// GitHub "latest release" endpoint for yt-dlp.
pub const DEFAULT_RELEASE_URL: &str = "https://api.github.com/repos/yt-dlp/yt-dlp/releases/latest";

/// File name of the downloader binary expected next to this application.
pub const DOWNLOADER_BIN_NAME: &str = if cfg!(windows) { "yt-dlp.exe" } else { "yt-dlp" };

#[derive(Debug, Clone)]
pub struct HelperConfig {
    pub app_dir: PathBuf,         // directory of the running executable (or YTDLP_HELPER_DIR)
    pub downloads_dir: PathBuf,   // app_dir/downloads
    pub downloader_bin: PathBuf,  // app_dir/yt-dlp[.exe], also the self-update target
    pub release_url: String,      // YTDLP_HELPER_RELEASE_URL or DEFAULT_RELEASE_URL
    pub skip_update: bool,        // YTDLP_HELPER_NO_UPDATE_CHECK=1
    pub terminal: Option<String>, // YTDLP_HELPER_TERMINAL (Unix only)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine the application directory: {0}")]
    NoAppDir(#[source] std::io::Error),
}

impl HelperConfig {
    /// Build a config rooted at `app_dir` with no environment overrides.
    pub fn with_app_dir(app_dir: &Path) -> Self {
        HelperConfig {
            app_dir: app_dir.to_path_buf(),
            downloads_dir: app_dir.join("downloads"),
            downloader_bin: app_dir.join(DOWNLOADER_BIN_NAME),
            release_url: DEFAULT_RELEASE_URL.to_string(),
            skip_update: false,
            terminal: None,
        }
    }

    /// Program to hand to the terminal: the co-located binary when present,
    /// otherwise the bare name so the system search path is consulted.
    pub fn downloader_program(&self) -> PathBuf {
        if self.downloader_bin.is_file() {
            self.downloader_bin.clone()
        } else {
            PathBuf::from(DOWNLOADER_BIN_NAME)
        }
    }
}

pub fn helper_config() -> Result<HelperConfig, ConfigError> {
    let app_dir = if let Ok(v) = std::env::var("YTDLP_HELPER_DIR") {
        PathBuf::from(v)
    } else {
        let exe = std::env::current_exe().map_err(ConfigError::NoAppDir)?;
        exe.parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    };

    let mut config = HelperConfig::with_app_dir(&app_dir);

    if let Ok(url) = std::env::var("YTDLP_HELPER_RELEASE_URL") {
        config.release_url = url;
    }

    config.skip_update = std::env::var("YTDLP_HELPER_NO_UPDATE_CHECK")
        .map(|v| v == "1")
        .unwrap_or(false);

    config.terminal = std::env::var("YTDLP_HELPER_TERMINAL")
        .ok()
        .filter(|t| !t.trim().is_empty());

    Ok(config)
}
