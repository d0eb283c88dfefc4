use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use thiserror::Error;
use tracing::{debug, info};

/// Probe order for a terminal emulator on Linux and the BSDs.
pub const UNIX_TERMINALS: &[&str] = &[
    "x-terminal-emulator",
    "gnome-terminal",
    "konsole",
    "xterm",
    "terminator",
];

const PAUSE_SUFFIX: &str = "; echo 'Press any key to close...'; read -n1";

/// A downloader invocation to run in a visible terminal window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub program:     PathBuf,
    pub args:        Vec<String>,
    pub working_dir: PathBuf,
    pub auto_close:  bool,
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("No terminal emulator found. Please install one of: {}", .0.join(", "))]
    NoTerminal(Vec<String>),
    #[error(
        "Could not find '{0}'.\n\nMake sure yt-dlp is next to this application or on your PATH."
    )]
    DownloaderMissing(String),
    #[error("Could not run command:\n{program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source:  io::Error,
    },
}

/// Starts a downloader job in a terminal the user can see. Implementations
/// return as soon as the terminal is spawned and never report its exit.
pub trait TerminalLauncher {
    fn launch(&self, req: &LaunchRequest) -> Result<(), LaunchError>;
}

/// Pick the launcher for the OS this binary was built for.
pub fn platform_launcher(terminal_override: Option<&str>) -> Box<dyn TerminalLauncher> {
    if cfg!(windows) {
        Box::new(WindowsConsoleLauncher)
    } else if cfg!(target_os = "macos") {
        Box::new(MacTerminalLauncher)
    } else {
        Box::new(match terminal_override {
            Some(t) => UnixTerminalLauncher::new(vec![t.to_string()]),
            None => UnixTerminalLauncher::default(),
        })
    }
}

/// Fail early with a readable message if the downloader cannot run at all;
/// otherwise the terminal would open and immediately die.
fn ensure_downloader(req: &LaunchRequest) -> Result<(), LaunchError> {
    let ok = Command::new(&req.program)
        .arg("--version")
        .current_dir(&req.working_dir)
        .stdin(Stdio::null())
        .output()
        .is_ok_and(|o| o.status.success());
    if ok {
        Ok(())
    } else {
        Err(LaunchError::DownloaderMissing(req.program.display().to_string()))
    }
}

/// POSIX shell line for the job. Without auto-close the terminal waits for a
/// key press so the user can read the output.
pub fn shell_line(req: &LaunchRequest) -> String {
    let program = req.program.to_string_lossy();
    let cmd = shell_words::join(
        std::iter::once(&*program).chain(req.args.iter().map(String::as_str)),
    );
    if req.auto_close {
        cmd
    } else {
        format!("{cmd}{PAUSE_SUFFIX}")
    }
}

/// Nobody waits for a launched terminal; a throwaway thread reaps it so
/// short-lived front-ends do not linger as zombies.
fn reap_in_background(mut child: Child) -> u32 {
    let pid = child.id();
    std::thread::spawn(move || {
        let _ = child.wait();
    });
    pid
}

fn spawn_detached(mut cmd: Command, program: &str) -> Result<u32, io::Error> {
    let child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    let pid = reap_in_background(child);
    info!(program, pid, "terminal launched");
    Ok(pid)
}

// ── Linux / BSD ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct UnixTerminalLauncher {
    terminals: Vec<String>,
}

impl UnixTerminalLauncher {
    pub fn new(terminals: Vec<String>) -> Self {
        UnixTerminalLauncher { terminals }
    }
}

impl Default for UnixTerminalLauncher {
    fn default() -> Self {
        UnixTerminalLauncher::new(UNIX_TERMINALS.iter().map(|t| t.to_string()).collect())
    }
}

impl TerminalLauncher for UnixTerminalLauncher {
    fn launch(&self, req: &LaunchRequest) -> Result<(), LaunchError> {
        ensure_downloader(req)?;
        let line = shell_line(req);

        for term in &self.terminals {
            let mut cmd = Command::new(term);
            cmd.args(["-e", "bash", "-c", &line]).current_dir(&req.working_dir);
            match spawn_detached(cmd, term) {
                Ok(_) => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(terminal = %term, "terminal emulator not installed");
                }
                Err(source) => {
                    return Err(LaunchError::Spawn { program: term.clone(), source });
                }
            }
        }
        Err(LaunchError::NoTerminal(self.terminals.clone()))
    }
}

// ── macOS ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct MacTerminalLauncher;

impl MacTerminalLauncher {
    /// AppleScript that opens Terminal.app on the job. zsh is the default
    /// shell there, so the line is handed to bash for `read -n1`.
    pub fn apple_script(req: &LaunchRequest) -> String {
        let dir = req.working_dir.to_string_lossy();
        let mut script = format!(
            "cd {} && bash -c {}",
            shell_words::quote(&dir),
            shell_words::quote(&shell_line(req))
        );
        if req.auto_close {
            script.push_str("; exit");
        }
        let escaped = script.replace('\\', "\\\\").replace('"', "\\\"");
        format!("tell application \"Terminal\" to do script \"{escaped}\"")
    }
}

impl TerminalLauncher for MacTerminalLauncher {
    fn launch(&self, req: &LaunchRequest) -> Result<(), LaunchError> {
        ensure_downloader(req)?;
        let mut cmd = Command::new("osascript");
        cmd.args(["-e", &Self::apple_script(req)])
            .args(["-e", "tell application \"Terminal\" to activate"])
            .current_dir(&req.working_dir);
        spawn_detached(cmd, "osascript")
            .map(|_| ())
            .map_err(|source| LaunchError::Spawn { program: "osascript".into(), source })
    }
}

// ── Windows ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsConsoleLauncher;

impl WindowsConsoleLauncher {
    /// Arguments after `cmd`: `/c` closes the console when the job exits,
    /// `/k` keeps it open. The outer quotes survive cmd's quote stripping.
    pub fn cmd_line(req: &LaunchRequest) -> String {
        let switch = if req.auto_close { "/c" } else { "/k" };
        let words: Vec<String> = std::iter::once(req.program.to_string_lossy().into_owned())
            .chain(req.args.iter().cloned())
            .map(|w| cmd_quote(&w))
            .collect();
        format!("{switch} \"{}\"", words.join(" "))
    }
}

fn cmd_quote(word: &str) -> String {
    const SPECIAL: &[char] = &[' ', '\t', '&', '|', '<', '>', '^', '(', ')', '%', '!', ','];
    if !word.is_empty() && !word.contains(SPECIAL) {
        word.to_string()
    } else {
        format!("\"{}\"", word.replace('"', "\"\""))
    }
}

impl TerminalLauncher for WindowsConsoleLauncher {
    fn launch(&self, req: &LaunchRequest) -> Result<(), LaunchError> {
        ensure_downloader(req)?;
        let mut cmd = Command::new("cmd");
        cmd.current_dir(&req.working_dir);
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NEW_CONSOLE: u32 = 0x0000_0010;
            cmd.raw_arg(Self::cmd_line(req)).creation_flags(CREATE_NEW_CONSOLE);
        }
        #[cfg(not(windows))]
        {
            cmd.arg(Self::cmd_line(req));
        }
        // The new console needs inherited handles, so no spawn_detached here.
        let child = cmd
            .spawn()
            .map_err(|source| LaunchError::Spawn { program: "cmd".into(), source })?;
        let pid = reap_in_background(child);
        info!(pid, "console launched");
        Ok(())
    }
}

/// Show `dir` in the platform file manager.
pub fn open_folder(dir: &Path) -> Result<(), LaunchError> {
    let opener = if cfg!(windows) {
        "explorer"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    let mut cmd = Command::new(opener);
    cmd.arg(dir);
    spawn_detached(cmd, opener)
        .map(|_| ())
        .map_err(|source| LaunchError::Spawn { program: opener.into(), source })
}
