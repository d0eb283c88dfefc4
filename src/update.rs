use serde::Deserialize;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::app::AppEvent;
use crate::config::HelperConfig;

/// Release asset that is a standalone yt-dlp build for this platform.
pub const ASSET_NAME: &str = if cfg!(windows) {
    "yt-dlp.exe"
} else if cfg!(target_os = "macos") {
    "yt-dlp_macos"
} else if cfg!(target_arch = "aarch64") {
    "yt-dlp_linux_aarch64"
} else {
    "yt-dlp_linux"
};

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of one update check; moved to the UI loop inside an `AppEvent`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateState {
    pub latest_version:   Option<String>,
    pub local_version:    Option<String>,
    pub update_available: bool,
    pub download_url:     Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub version:      String,         // tag as published, e.g. "2024.08.06"
    pub download_url: Option<String>, // None when no asset matches this platform
}

#[derive(Deserialize)]
struct GitHubRelease {
    tag_name: String,
    #[serde(default)]
    assets:   Vec<GitHubAsset>,
}

#[derive(Deserialize)]
struct GitHubAsset {
    name:                 String,
    browser_download_url: String,
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("release request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("release endpoint answered {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed release metadata: {0}")]
    Json(#[from] serde_json::Error),
}

pub(crate) fn http_client(timeout: Option<Duration>) -> reqwest::Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .user_agent(format!("ytdlp-helper/{}", env!("CARGO_PKG_VERSION")))
        .connect_timeout(CHECK_TIMEOUT)
        .timeout(timeout)
        .build()
}

/// Pull the version tag and the `asset_name` download URL out of a release document.
pub fn parse_release(body: &str, asset_name: &str) -> Result<ReleaseInfo, UpdateError> {
    let release: GitHubRelease = serde_json::from_str(body)?;
    let download_url = release
        .assets
        .into_iter()
        .find(|a| a.name == asset_name)
        .map(|a| a.browser_download_url);
    Ok(ReleaseInfo { version: release.tag_name.trim().to_string(), download_url })
}

/// Fetch the latest release from `url`. No retry: callers treat errors as "no news".
pub fn fetch_latest_release(url: &str) -> Result<ReleaseInfo, UpdateError> {
    let client = http_client(Some(CHECK_TIMEOUT))?;
    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, "application/vnd.github+json")
        .send()?;

    if !response.status().is_success() {
        return Err(UpdateError::Status(response.status()));
    }

    let body = response.text()?;
    parse_release(&body, ASSET_NAME)
}

/// Ask the downloader for its version; `None` if it is missing or exits non-zero.
pub fn local_version(program: &Path) -> Option<String> {
    let output = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!version.is_empty()).then_some(version)
}

/// An unknown local version always counts as outdated.
pub fn is_update_available(local: Option<&str>, latest: &str) -> bool {
    match local {
        Some(v) => v.trim() != latest.trim(),
        None => true,
    }
}

pub fn update_state(release: ReleaseInfo, local: Option<String>) -> UpdateState {
    UpdateState {
        update_available: is_update_available(local.as_deref(), &release.version),
        latest_version: Some(release.version),
        local_version: local,
        download_url: release.download_url,
    }
}

/// Run one full check: release metadata, then the installed version.
pub fn check_for_update(config: &HelperConfig) -> Result<UpdateState, UpdateError> {
    let release = fetch_latest_release(&config.release_url)?;
    let local = local_version(&config.downloader_program());
    debug!(latest = %release.version, local = ?local, "update check finished");
    Ok(update_state(release, local))
}

/// Run the check on its own thread and report back with exactly one event
/// tagged with `generation`. Failures are logged and reported with no state.
pub fn spawn_update_check(
    config: HelperConfig,
    generation: u64,
    events: Sender<AppEvent>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let state = match check_for_update(&config) {
            Ok(state) => {
                if state.update_available {
                    info!(latest = ?state.latest_version, "yt-dlp update available");
                }
                Some(state)
            }
            Err(e) => {
                warn!(error = %e, "update check abandoned");
                None
            }
        };
        // The UI may already be gone; nothing to do then.
        let _ = events.send(AppEvent::UpdateChecked { generation, state });
    })
}
