//! Interactive session state and the handlers behind each user action.
//!
//! Everything here runs on the UI thread. The only other thread is the update
//! check, which hands its result over through `AppEvent`.

use std::io::{self, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::debug;

use crate::command::{prepare_download, BuildError, DownloadOptions};
use crate::config::HelperConfig;
use crate::exec::{open_folder, LaunchRequest, TerminalLauncher};
use crate::install::download_update;
use crate::update::{check_for_update, is_update_available, local_version, spawn_update_check, UpdateState};

#[derive(Debug)]
pub enum AppEvent {
    /// One finished update check; `state` is `None` when it failed and was
    /// abandoned. Results from an outdated `generation` are dropped.
    UpdateChecked { generation: u64, state: Option<UpdateState> },
}

/// What a user-initiated update ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Installed,
    Declined,
    Failed,
}

/// Sink for messages the user must see.
pub trait Notifier {
    fn info(&mut self, message: &str);
    fn error(&mut self, message: &str);
}

pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn info(&mut self, message: &str) {
        eprintln!("[ytdlp-helper] {message}");
    }

    fn error(&mut self, message: &str) {
        eprintln!("[ytdlp-helper] error: {message}");
    }
}

/// Source of user input for the session and for yes/no questions.
pub trait Prompt {
    /// Next line of input, `None` at end of input.
    fn read_line(&mut self, prompt: &str) -> Option<String>;

    fn confirm(&mut self, question: &str) -> bool {
        self.read_line(&format!("{question} [y/N] "))
            .is_some_and(|a| matches!(a.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
    }
}

pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn read_line(&mut self, prompt: &str) -> Option<String> {
        eprint!("{prompt}");
        let _ = io::stderr().flush();
        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line),
        }
    }
}

/// Answers yes to every question (`update --yes`).
pub struct AssumeYes;

impl Prompt for AssumeYes {
    fn read_line(&mut self, _prompt: &str) -> Option<String> {
        None
    }

    fn confirm(&mut self, _question: &str) -> bool {
        true
    }
}

pub const OPTION_NAMES: &[&str] = &["best", "audio", "mp4", "pretty", "subs", "ffmpeg", "autoclose"];

fn option_flag<'a>(opts: &'a mut DownloadOptions, name: &str) -> Option<&'a mut bool> {
    Some(match name {
        "best" => &mut opts.best_quality,
        "audio" => &mut opts.audio_only,
        "mp4" => &mut opts.mp4_output,
        "pretty" => &mut opts.pretty_naming,
        "subs" => &mut opts.embed_subtitles,
        "ffmpeg" => &mut opts.use_ffmpeg,
        "autoclose" => &mut opts.auto_close_terminal,
        _ => return None,
    })
}

const HELP: &str = "\
Paste a video URL and press Enter to download it.
  :options              show current options
  :set <option> on|off  change an option
  :toggle <option>      flip an option
  :check                check for a newer yt-dlp
  :update               download the latest yt-dlp
  :open                 open the downloads folder
  :quit                 leave (running downloads keep going)
Options: best, audio, mp4, pretty, subs, ffmpeg, autoclose";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct App {
    config:         HelperConfig,
    launcher:       Box<dyn TerminalLauncher>,
    /// Checkbox state; `url` is ignored in favour of `url_input`.
    pub options:    DownloadOptions,
    pub url_input:  String,
    pub update:     Option<UpdateState>,
    update_pending: bool,
    /// Bumped for every check started and after every install.
    generation:     u64,
    update_hint:    String,
    events_tx:      Sender<AppEvent>,
    events_rx:      Receiver<AppEvent>,
}

impl App {
    pub fn new(config: HelperConfig, launcher: Box<dyn TerminalLauncher>) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        App {
            config,
            launcher,
            options: DownloadOptions::default(),
            url_input: String::new(),
            update: None,
            update_pending: false,
            generation: 0,
            update_hint: "Type :update to install it.".to_string(),
            events_tx,
            events_rx,
        }
    }

    pub fn config(&self) -> &HelperConfig {
        &self.config
    }

    /// Text appended to the "update available" notice.
    pub fn set_update_hint(&mut self, hint: &str) {
        self.update_hint = hint.to_string();
    }

    /// Start a background check; its result arrives as an `AppEvent`.
    pub fn start_update_check(&mut self) {
        if self.update_pending {
            return;
        }
        self.update_pending = true;
        self.generation += 1;
        spawn_update_check(self.config.clone(), self.generation, self.events_tx.clone());
    }

    /// Any check still running read the pre-install binary; its result must not
    /// overwrite what the UI thread now knows.
    fn invalidate_pending_check(&mut self) {
        self.generation += 1;
        self.update_pending = false;
    }

    /// Apply every event that has arrived since the last call.
    pub fn drain_events(&mut self, notifier: &mut dyn Notifier) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event, notifier);
        }
    }

    /// Block until the next event arrives and apply it.
    pub fn wait_for_event(&mut self, notifier: &mut dyn Notifier) {
        if let Ok(event) = self.events_rx.recv() {
            self.handle_event(event, notifier);
        }
    }

    pub fn handle_event(&mut self, event: AppEvent, notifier: &mut dyn Notifier) {
        match event {
            AppEvent::UpdateChecked { generation, .. } if generation != self.generation => {
                debug!(generation, current = self.generation, "stale update check dropped");
            }
            AppEvent::UpdateChecked { state, .. } => {
                self.update_pending = false;
                match state {
                    Some(state) => {
                        self.update = Some(state);
                        if self.update.as_ref().is_some_and(|s| s.update_available) {
                            notifier.info(&format!("{}. {}", self.update_indicator(), self.update_hint));
                        }
                    }
                    None => debug!("update check produced no result"),
                }
            }
        }
    }

    /// One-line status of the downloader build.
    pub fn update_indicator(&self) -> String {
        match &self.update {
            None if self.update_pending => "checking for yt-dlp updates...".to_string(),
            None => "yt-dlp update status unknown".to_string(),
            Some(s) => {
                let latest = s.latest_version.as_deref().unwrap_or("?");
                let local = s.local_version.as_deref().unwrap_or("not installed");
                if s.update_available {
                    format!("yt-dlp update available: {latest} (installed: {local})")
                } else {
                    format!("yt-dlp is up to date ({local})")
                }
            }
        }
    }

    /// Build the command from the current options and URL and start it in a
    /// terminal. Returns true once the terminal is up; the URL is then cleared.
    pub fn download(&mut self, notifier: &mut dyn Notifier) -> bool {
        let opts = DownloadOptions { url: self.url_input.clone(), ..self.options.clone() };

        let command = match prepare_download(&self.config, &opts) {
            Ok(command) => command,
            Err(e) if e.is::<BuildError>() => {
                notifier.info(&e.to_string());
                return false;
            }
            Err(e) => {
                notifier.error(&format!("Could not prepare the download:\n{e}"));
                return false;
            }
        };

        for notice in &command.notices {
            notifier.info(notice);
        }

        let request = LaunchRequest {
            program:     self.config.downloader_program(),
            args:        command.args,
            working_dir: self.config.app_dir.clone(),
            auto_close:  opts.auto_close_terminal,
        };
        debug!(?request, "launching downloader");

        match self.launcher.launch(&request) {
            Ok(()) => {
                self.url_input.clear();
                true
            }
            Err(e) => {
                notifier.error(&e.to_string());
                false
            }
        }
    }

    /// User-initiated update: blocks until the new binary is in place, the
    /// user declined a reinstall, or the attempt failed.
    pub fn run_update(&mut self, notifier: &mut dyn Notifier, prompt: &mut dyn Prompt) -> UpdateOutcome {
        let state = match self.update.clone() {
            Some(state) => state,
            None => match check_for_update(&self.config) {
                Ok(state) => state,
                Err(e) => {
                    notifier.error(&format!("Could not check for updates:\n{e}"));
                    return UpdateOutcome::Failed;
                }
            },
        };

        if !state.update_available {
            let version = state.latest_version.as_deref().unwrap_or("?");
            let question = format!("yt-dlp {version} is already installed. Download it again?");
            if !prompt.confirm(&question) {
                self.update = Some(state);
                return UpdateOutcome::Declined;
            }
        }

        notifier.info(&format!(
            "Downloading yt-dlp {}...",
            state.latest_version.as_deref().unwrap_or("")
        ));
        if let Err(e) = download_update(&state, &self.config.downloader_bin) {
            notifier.error(&format!("Update failed, the previous yt-dlp was kept:\n{e}"));
            self.update = Some(state);
            return UpdateOutcome::Failed;
        }

        self.invalidate_pending_check();
        let local = local_version(&self.config.downloader_bin);
        let latest = state.latest_version.clone().unwrap_or_default();
        self.update = Some(UpdateState {
            update_available: is_update_available(local.as_deref(), &latest),
            local_version: local,
            ..state
        });
        notifier.info(&format!("yt-dlp updated to {latest}."));
        UpdateOutcome::Installed
    }

    pub fn set_option(&mut self, name: &str, value: Option<bool>) -> Result<bool, String> {
        let flag = option_flag(&mut self.options, name)
            .ok_or_else(|| format!("Unknown option '{name}'. Options: {}", OPTION_NAMES.join(", ")))?;
        *flag = value.unwrap_or(!*flag);
        Ok(*flag)
    }

    pub fn options_summary(&self) -> String {
        let o = &self.options;
        let mark = |b: bool| if b { "on" } else { "off" };
        format!(
            "best={} audio={} mp4={} pretty={} subs={} ffmpeg={} autoclose={}",
            mark(o.best_quality),
            mark(o.audio_only),
            mark(o.mp4_output),
            mark(o.pretty_naming),
            mark(o.embed_subtitles),
            mark(o.use_ffmpeg),
            mark(o.auto_close_terminal),
        )
    }

    fn open_downloads(&self, notifier: &mut dyn Notifier) {
        let result = std::fs::create_dir_all(&self.config.downloads_dir)
            .map_err(|e| e.to_string())
            .and_then(|()| open_folder(&self.config.downloads_dir).map_err(|e| e.to_string()));
        if let Err(e) = result {
            notifier.error(&format!("Could not open {}:\n{e}", self.config.downloads_dir.display()));
        }
    }

    /// Dispatch one line of session input.
    pub fn handle_line(&mut self, line: &str, notifier: &mut dyn Notifier, prompt: &mut dyn Prompt) -> Flow {
        let line = line.trim();
        let Some(command) = line.strip_prefix(':') else {
            self.url_input = line.to_string();
            self.download(notifier);
            return Flow::Continue;
        };

        let mut words = command.split_whitespace();
        match (words.next().unwrap_or(""), words.next(), words.next()) {
            ("quit" | "q" | "exit", _, _) => return Flow::Quit,
            ("help" | "h", _, _) => notifier.info(HELP),
            ("options" | "o", _, _) => notifier.info(&self.options_summary()),
            ("toggle" | "t", Some(name), None) => match self.set_option(name, None) {
                Ok(_) => notifier.info(&self.options_summary()),
                Err(e) => notifier.error(&e),
            },
            ("set", Some(name), Some(value)) => {
                let value = match value {
                    "on" | "true" | "yes" | "1" => true,
                    "off" | "false" | "no" | "0" => false,
                    other => {
                        notifier.error(&format!("Expected on or off, got '{other}'"));
                        return Flow::Continue;
                    }
                };
                match self.set_option(name, Some(value)) {
                    Ok(_) => notifier.info(&self.options_summary()),
                    Err(e) => notifier.error(&e),
                }
            }
            ("check", _, _) => {
                self.start_update_check();
                notifier.info(&self.update_indicator());
            }
            ("update", _, _) => {
                self.run_update(notifier, prompt);
            }
            ("open", _, _) => self.open_downloads(notifier),
            ("set" | "toggle" | "t", _, _) => {
                notifier.error("Usage: :set <option> on|off, :toggle <option>")
            }
            (other, _, _) => notifier.error(&format!("Unknown command ':{other}'. Type :help.")),
        }
        Flow::Continue
    }

    /// The interactive loop. Pending events are applied before every prompt;
    /// end of input ends the session.
    pub fn run_session(&mut self, notifier: &mut dyn Notifier, prompt: &mut dyn Prompt) {
        notifier.info("Type :help for commands.");
        notifier.info(&self.options_summary());
        loop {
            self.drain_events(notifier);
            let Some(line) = prompt.read_line("url> ") else {
                break;
            };
            if line.trim().is_empty() {
                self.url_input.clear();
                self.download(notifier);
                continue;
            }
            if self.handle_line(&line, notifier, prompt) == Flow::Quit {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::LaunchError;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingNotifier {
        infos:  Vec<String>,
        errors: Vec<String>,
    }

    impl RecordingNotifier {
        fn total(&self) -> usize {
            self.infos.len() + self.errors.len()
        }
    }

    impl Notifier for RecordingNotifier {
        fn info(&mut self, message: &str) {
            self.infos.push(message.to_string());
        }

        fn error(&mut self, message: &str) {
            self.errors.push(message.to_string());
        }
    }

    struct ScriptedPrompt(VecDeque<String>);

    impl ScriptedPrompt {
        fn new(lines: &[&str]) -> Self {
            ScriptedPrompt(lines.iter().map(|l| l.to_string()).collect())
        }
    }

    impl Prompt for ScriptedPrompt {
        fn read_line(&mut self, _prompt: &str) -> Option<String> {
            self.0.pop_front()
        }
    }

    #[derive(Clone, Default)]
    struct RecordingLauncher {
        launched: Rc<RefCell<Vec<LaunchRequest>>>,
        fail:     bool,
    }

    impl TerminalLauncher for RecordingLauncher {
        fn launch(&self, req: &LaunchRequest) -> Result<(), LaunchError> {
            if self.fail {
                return Err(LaunchError::NoTerminal(vec!["xterm".into()]));
            }
            self.launched.borrow_mut().push(req.clone());
            Ok(())
        }
    }

    fn app(dir: &std::path::Path, launcher: &RecordingLauncher) -> App {
        App::new(HelperConfig::with_app_dir(dir), Box::new(launcher.clone()))
    }

    #[test]
    fn blank_url_spawns_nothing_and_shows_one_message() {
        let dir = tempdir().unwrap();
        let launcher = RecordingLauncher::default();
        for url in ["", "   "] {
            let mut app = app(dir.path(), &launcher);
            let mut notifier = RecordingNotifier::default();
            app.url_input = url.to_string();

            assert!(!app.download(&mut notifier));
            assert_eq!(notifier.total(), 1);
            assert_eq!(notifier.infos[0], "Please enter a video URL.");
        }
        assert!(launcher.launched.borrow().is_empty());
    }

    #[test]
    fn successful_download_clears_input_and_runs_in_app_dir() {
        let dir = tempdir().unwrap();
        let launcher = RecordingLauncher::default();
        let mut app = app(dir.path(), &launcher);
        let mut notifier = RecordingNotifier::default();
        app.url_input = "https://example.test/watch?v=1".into();

        assert!(app.download(&mut notifier));
        assert!(app.url_input.is_empty());
        assert_eq!(notifier.total(), 0);

        let launched = launcher.launched.borrow();
        assert_eq!(launched.len(), 1);
        assert_eq!(launched[0].working_dir, dir.path());
        assert!(launched[0].auto_close);
        assert_eq!(launched[0].args.last().unwrap(), "https://example.test/watch?v=1");
        assert!(dir.path().join("downloads").is_dir());
    }

    #[test]
    fn launch_failure_is_reported_and_input_kept() {
        let dir = tempdir().unwrap();
        let launcher = RecordingLauncher { fail: true, ..Default::default() };
        let mut app = app(dir.path(), &launcher);
        let mut notifier = RecordingNotifier::default();
        app.url_input = "https://example.test/v".into();

        assert!(!app.download(&mut notifier));
        assert_eq!(notifier.errors.len(), 1);
        assert!(notifier.errors[0].contains("No terminal emulator found"));
        assert_eq!(app.url_input, "https://example.test/v");
    }

    #[test]
    fn audio_and_best_shows_notice_then_launches() {
        let dir = tempdir().unwrap();
        let launcher = RecordingLauncher::default();
        let mut app = app(dir.path(), &launcher);
        let mut notifier = RecordingNotifier::default();
        app.set_option("audio", Some(true)).unwrap();
        app.url_input = "u".into();

        assert!(app.download(&mut notifier));
        assert_eq!(notifier.infos.len(), 1);
        assert!(notifier.infos[0].contains("Audio Only"));
        assert!(launcher.launched.borrow()[0].args.contains(&"-x".to_string()));
    }

    #[test]
    fn update_event_refreshes_indicator() {
        let dir = tempdir().unwrap();
        let mut app = app(dir.path(), &RecordingLauncher::default());
        let mut notifier = RecordingNotifier::default();

        app.events_tx
            .send(AppEvent::UpdateChecked {
                generation: app.generation,
                state:      Some(UpdateState {
                    latest_version:   Some("2024.08.06".into()),
                    local_version:    Some("2024.07.01".into()),
                    update_available: true,
                    download_url:     None,
                }),
            })
            .unwrap();
        app.drain_events(&mut notifier);

        assert!(app.update_indicator().contains("update available: 2024.08.06"));
        assert_eq!(notifier.infos.len(), 1);
        assert!(notifier.infos[0].ends_with("Type :update to install it."));
    }

    #[test]
    fn failed_check_is_silent() {
        let dir = tempdir().unwrap();
        let mut app = app(dir.path(), &RecordingLauncher::default());
        let mut notifier = RecordingNotifier::default();

        app.events_tx
            .send(AppEvent::UpdateChecked { generation: app.generation, state: None })
            .unwrap();
        app.drain_events(&mut notifier);

        assert_eq!(notifier.total(), 0);
        assert!(app.update.is_none());
        assert_eq!(app.update_indicator(), "yt-dlp update status unknown");
    }

    #[test]
    fn declined_reinstall_touches_nothing() {
        let dir = tempdir().unwrap();
        let mut app = app(dir.path(), &RecordingLauncher::default());
        let mut notifier = RecordingNotifier::default();
        app.update = Some(UpdateState {
            latest_version:   Some("2024.08.06".into()),
            local_version:    Some("2024.08.06".into()),
            update_available: false,
            download_url:     Some("http://127.0.0.1:1/yt-dlp".into()),
        });

        let mut prompt = ScriptedPrompt::new(&["n"]);
        assert_eq!(app.run_update(&mut notifier, &mut prompt), UpdateOutcome::Declined);
        assert_eq!(notifier.total(), 0);
        assert!(!app.config().downloader_bin.exists());
    }

    #[test]
    fn failed_update_keeps_previous_binary() {
        let dir = tempdir().unwrap();
        let mut app = app(dir.path(), &RecordingLauncher::default());
        let mut notifier = RecordingNotifier::default();
        std::fs::write(&app.config().downloader_bin, b"previous").unwrap();
        app.update = Some(UpdateState {
            latest_version:   Some("2024.08.06".into()),
            local_version:    None,
            update_available: true,
            download_url:     Some("http://127.0.0.1:1/yt-dlp".into()),
        });

        assert_eq!(app.run_update(&mut notifier, &mut AssumeYes), UpdateOutcome::Failed);
        assert_eq!(notifier.errors.len(), 1);
        assert_eq!(std::fs::read(&app.config().downloader_bin).unwrap(), b"previous");
    }

    fn state(local: &str, latest: &str) -> UpdateState {
        UpdateState {
            latest_version:   Some(latest.into()),
            local_version:    Some(local.into()),
            update_available: local != latest,
            download_url:     None,
        }
    }

    #[test]
    fn check_started_before_install_cannot_overwrite_it() {
        let dir = tempdir().unwrap();
        let mut app = app(dir.path(), &RecordingLauncher::default());
        let mut notifier = RecordingNotifier::default();

        // Startup check in flight, then the user installs B.
        app.update_pending = true;
        app.generation = 1;
        let in_flight = app.generation;
        app.invalidate_pending_check();
        app.update = Some(state("2024.08.06", "2024.08.06"));

        // The startup check finally reports the binary it saw before the swap.
        app.events_tx
            .send(AppEvent::UpdateChecked {
                generation: in_flight,
                state:      Some(state("2024.07.01", "2024.08.06")),
            })
            .unwrap();
        app.drain_events(&mut notifier);

        assert_eq!(notifier.total(), 0);
        assert_eq!(app.update, Some(state("2024.08.06", "2024.08.06")));
        assert_eq!(app.update_indicator(), "yt-dlp is up to date (2024.08.06)");
    }

    #[test]
    fn check_after_install_is_still_applied() {
        let dir = tempdir().unwrap();
        let mut app = app(dir.path(), &RecordingLauncher::default());
        let mut notifier = RecordingNotifier::default();
        app.invalidate_pending_check();

        app.events_tx
            .send(AppEvent::UpdateChecked {
                generation: app.generation,
                state:      Some(state("2024.08.06", "2024.09.01")),
            })
            .unwrap();
        app.drain_events(&mut notifier);

        assert!(app.update.as_ref().is_some_and(|s| s.update_available));
        assert_eq!(notifier.infos.len(), 1);
    }

    #[test]
    fn update_notice_uses_caller_hint() {
        let dir = tempdir().unwrap();
        let mut app = app(dir.path(), &RecordingLauncher::default());
        let mut notifier = RecordingNotifier::default();
        app.set_update_hint("Run 'ytdlp-helper update' to install it.");

        let event = AppEvent::UpdateChecked {
            generation: app.generation,
            state:      Some(state("2024.07.01", "2024.08.06")),
        };
        app.handle_event(event, &mut notifier);

        assert_eq!(notifier.infos.len(), 1);
        assert!(notifier.infos[0].ends_with("Run 'ytdlp-helper update' to install it."));
        assert!(!notifier.infos[0].contains(":update"));
    }

    #[test]
    fn set_and_toggle_options() {
        let dir = tempdir().unwrap();
        let mut app = app(dir.path(), &RecordingLauncher::default());
        assert_eq!(app.set_option("subs", Some(true)), Ok(true));
        assert!(app.options.embed_subtitles);
        assert_eq!(app.set_option("best", None), Ok(false));
        assert!(!app.options.best_quality);
        assert!(app.set_option("nope", None).is_err());
    }

    #[test]
    fn session_dispatches_commands_and_urls() {
        let dir = tempdir().unwrap();
        let launcher = RecordingLauncher::default();
        let mut app = app(dir.path(), &launcher);
        let mut notifier = RecordingNotifier::default();
        let mut prompt = ScriptedPrompt::new(&[
            ":set autoclose off",
            ":toggle pretty",
            "https://example.test/a\n",
            ":bogus",
            ":quit",
            "https://example.test/never",
        ]);

        app.run_session(&mut notifier, &mut prompt);

        let launched = launcher.launched.borrow();
        assert_eq!(launched.len(), 1);
        assert!(!launched[0].auto_close);
        assert!(launched[0].args.iter().any(|a| a.contains("%(id)s")));
        assert_eq!(notifier.errors.len(), 1);
    }

    #[test]
    fn empty_line_in_session_reports_missing_url() {
        let dir = tempdir().unwrap();
        let launcher = RecordingLauncher::default();
        let mut app = app(dir.path(), &launcher);
        let mut notifier = RecordingNotifier::default();
        let mut prompt = ScriptedPrompt::new(&["\n"]);

        app.run_session(&mut notifier, &mut prompt);

        assert!(notifier.infos.iter().any(|m| m == "Please enter a video URL."));
        assert!(launcher.launched.borrow().is_empty());
    }
}
