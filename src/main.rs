// main.rs: arg parsing, logging setup and orchestration only.
mod app;
mod cli;
mod command;
mod config;
mod exec;
mod install;
mod update;

use clap::Parser;
use tracing::debug;

use app::{App, AssumeYes, ConsoleNotifier, Prompt, StdinPrompt, UpdateOutcome};
use cli::{Args, Command};
use config::helper_config;
use exec::platform_launcher;

fn init_logging(args: &Args) {
    // RUST_LOG wins over the flags.
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args);
    debug!(?args, "arguments parsed");

    let mut config = helper_config()?;
    config.skip_update |= args.no_update_check;

    let launcher = platform_launcher(config.terminal.as_deref());
    let mut app = App::new(config, launcher);
    let mut notifier = ConsoleNotifier;

    match args.command {
        None => {
            // Passive check: result shows up on a later prompt, never blocks input.
            if !app.config().skip_update {
                app.start_update_check();
            }
            app.run_session(&mut notifier, &mut StdinPrompt);
        }
        Some(Command::Get { url, options }) => {
            app.options = options.to_options(&url);
            app.url_input = url;
            if !app.download(&mut notifier) {
                std::process::exit(1);
            }
        }
        Some(Command::Check) => {
            app.set_update_hint("Run 'ytdlp-helper update' to install it.");
            app.start_update_check();
            app.wait_for_event(&mut notifier);
            match &app.update {
                None => {
                    eprintln!("[ytdlp-helper] could not reach the release server");
                    std::process::exit(1);
                }
                // An available update was already announced by the event handler.
                Some(s) if !s.update_available => eprintln!("[ytdlp-helper] {}", app.update_indicator()),
                Some(_) => {}
            }
        }
        Some(Command::Update { yes }) => {
            let (mut assume_yes, mut stdin) = (AssumeYes, StdinPrompt);
            let prompt: &mut dyn Prompt = if yes { &mut assume_yes } else { &mut stdin };
            // Declining a reinstall is not a failure.
            if app.run_update(&mut notifier, prompt) == UpdateOutcome::Failed {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
