use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::update::{http_client, UpdateState, ASSET_NAME};

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("the latest release has no '{0}' asset for this platform")]
    NoAsset(&'static str),
    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("could not write {}: {source}", .path.display())]
    Stage {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not replace {}: {source}", .path.display())]
    Swap {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

/// Where the new binary is written before it is moved into place.
pub fn staging_path(target: &Path) -> PathBuf {
    with_suffix(target, ".part")
}

/// Where the previous binary is kept after a swap.
pub fn backup_path(target: &Path) -> PathBuf {
    with_suffix(target, ".old")
}

/// Copy `reader` to the staging file next to `target`. A failed transfer
/// removes the staging file and never touches `target`.
pub fn stage_from_reader<R: Read>(mut reader: R, target: &Path) -> Result<PathBuf, InstallError> {
    let staging = staging_path(target);
    let written = File::create(&staging).and_then(|mut file| {
        let n = io::copy(&mut reader, &mut file)?;
        file.sync_all()?;
        Ok(n)
    });
    match written {
        Ok(bytes) => {
            debug!(bytes, path = %staging.display(), "binary staged");
            Ok(staging)
        }
        Err(source) => {
            let _ = fs::remove_file(&staging);
            Err(InstallError::Stage { path: staging, source })
        }
    }
}

/// A plain download does not carry the executable bit.
#[cfg(unix)]
fn mark_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Replace `target` with `staging`, keeping the previous file as `<target>.old`.
/// If the final rename fails the backup is moved back.
pub fn swap_into_place(staging: &Path, target: &Path) -> Result<(), InstallError> {
    let swap_err = |source| InstallError::Swap { path: target.to_path_buf(), source };

    if !target.exists() {
        return fs::rename(staging, target).map_err(swap_err);
    }

    let backup = backup_path(target);
    if backup.exists() {
        fs::remove_file(&backup).map_err(swap_err)?;
    }
    fs::rename(target, &backup).map_err(swap_err)?;

    if let Err(source) = fs::rename(staging, target) {
        if let Err(e) = fs::rename(&backup, target) {
            warn!(error = %e, backup = %backup.display(), "could not restore previous binary");
        }
        return Err(swap_err(source));
    }
    Ok(())
}

/// Stage, mark executable, swap.
pub fn install_from_reader<R: Read>(reader: R, target: &Path) -> Result<(), InstallError> {
    let staging = stage_from_reader(reader, target)?;
    if let Err(source) = mark_executable(&staging) {
        let _ = fs::remove_file(&staging);
        return Err(InstallError::Stage { path: staging, source });
    }
    swap_into_place(&staging, target).inspect_err(|_| {
        let _ = fs::remove_file(&staging);
    })
}

/// Stream the release asset named in `state` over `target`.
///
/// Blocking, with no overall timeout: the binary is tens of megabytes.
pub fn download_update(state: &UpdateState, target: &Path) -> Result<(), InstallError> {
    let url = state.download_url.as_deref().ok_or(InstallError::NoAsset(ASSET_NAME))?;
    let client = http_client(None)?;
    let response = client.get(url).send()?.error_for_status()?;
    install_from_reader(response, target)?;
    info!(version = ?state.latest_version, path = %target.display(), "yt-dlp updated");
    Ok(())
}
