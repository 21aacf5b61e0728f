//! Eqtrain CLI Application
//!
//! Interactive ear-training prompt: a hidden peaking band is applied to the
//! playing signal and the player guesses its frequency and gain.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use commands::Input;
use eqtrain_core::domain::{
    AudioEnumerator, BandLabel, Command, CommandResult, ConfigManager, DeviceId, GuessFeedback,
    GuessOutcome, OfflineOutput, OutputEngine, Session, SessionEvent, TrainerConfig,
};
use eqtrain_infra::{CpalEnumerator, CpalOutput, SymphoniaLoader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "eqtrain")]
#[command(about = "Train your ears to recognise EQ boosts and cuts", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to the config file (defaults to the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output device name, as listed by `eqtrain devices`
    #[arg(long)]
    device: Option<String>,

    /// Run without an audio device; nothing is heard
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: Option<Subcommands>,
}

#[derive(Subcommand)]
enum Subcommands {
    /// List output devices
    Devices,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn load_config(path: Option<PathBuf>) -> anyhow::Result<TrainerConfig> {
    let manager = match path {
        Some(path) => ConfigManager::for_file(path),
        None => ConfigManager::new(ConfigManager::default_config_dir()?),
    };
    debug!(path = %manager.config_path().display(), "Using config file");
    Ok(manager.load().await)
}

fn list_devices() -> anyhow::Result<()> {
    let enumerator = CpalEnumerator::new();
    let default = enumerator.default_output_device().ok().map(|d| d.name);

    for device in enumerator.output_devices()? {
        let marker = if default.as_deref() == Some(device.name.as_str()) {
            "*"
        } else {
            " "
        };
        match device.default_sample_rate {
            Some(rate) => println!("{} {} ({} Hz)", marker, device.name, rate.hz()),
            None => println!("{} {}", marker, device.name),
        }
    }
    Ok(())
}

fn build_engine(
    cli_device: Option<String>,
    offline: bool,
    config: &TrainerConfig,
) -> anyhow::Result<Box<dyn OutputEngine>> {
    let stream_config = config.app.stream_config();
    if offline {
        info!("Running with offline output");
        return Ok(Box::new(OfflineOutput::new(stream_config)));
    }

    let device = cli_device
        .or_else(|| config.app.output_device.clone())
        .map(DeviceId::new);
    let output = CpalOutput::new(device, stream_config).context("Failed to open output device")?;
    println!("Output: {}", output.device_name());
    Ok(Box::new(output))
}

// ============================================================================
// PRESENTATION
// ============================================================================

fn print_status(session: &Session) {
    let s = session.snapshot();
    println!(
        "{} | {} | EQ {} | volume {:.0}% | score {}/{}",
        s.current_audio_file_name,
        if s.is_playing { "playing" } else { "stopped" },
        if s.eq_bypassed { "bypassed" } else { "on" },
        s.volume * 100.0,
        s.score,
        s.total_tries
    );
}

fn print_grid(session: &Session) {
    for cell in session.grid() {
        let mark = match cell.feedback {
            GuessFeedback::Boost | GuessFeedback::Cut => " ",
            GuessFeedback::BoostDimmed | GuessFeedback::CutDimmed => ".",
            GuessFeedback::Correct => "✓",
            GuessFeedback::Missed => "!",
            GuessFeedback::WrongGuess => "✗",
        };
        println!("  {} {}", mark, cell.label);
    }
}

fn print_result(result: &CommandResult) {
    match result {
        CommandResult::VolumeChanged { volume } => println!("Volume {:.0}%", volume * 100.0),
        CommandResult::BypassToggled { bypassed } => {
            println!("EQ {}", if *bypassed { "bypassed" } else { "on" })
        }
        CommandResult::PlaybackToggled { playing } => {
            println!("{}", if *playing { "Playing" } else { "Stopped" })
        }
        CommandResult::GuessSubmitted { outcome } => match outcome {
            GuessOutcome::Correct | GuessOutcome::Incorrect => {}
            GuessOutcome::Ignored => println!("Already guessed this round"),
            GuessOutcome::Invalid => println!("Not on the grid, try `grid`"),
        },
        CommandResult::SourceChangedStopped { name, reason } => {
            println!("Source: {} (stopped: {})", name, reason)
        }
        // Announced through session events
        CommandResult::SourceChanged { .. } | CommandResult::GameReset => {}
        CommandResult::Error(message) => println!("Error: {}", message),
    }
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::SourceChanged { name } => println!("Source: {}", name),
        SessionEvent::RoundStarted => println!("New round. Listen, then `guess <hz> <db>`"),
        SessionEvent::GuessResolved {
            correct,
            score,
            total_tries,
        } => println!(
            "{} Score {}/{}",
            if *correct { "Correct!" } else { "Wrong." },
            score,
            total_tries
        ),
        SessionEvent::TargetRevealed { settings } => println!(
            "It was {}",
            BandLabel(settings.center_frequency(), settings.gain_db())
        ),
        SessionEvent::GameReset => println!("Score reset"),
        // Equalizer changes would give the answer away
        SessionEvent::EqChanged { .. }
        | SessionEvent::PlaybackChanged { .. }
        | SessionEvent::VolumeChanged { .. }
        | SessionEvent::BypassChanged { .. }
        | SessionEvent::Error { .. } => {}
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

async fn run(mut session: Session) -> anyhow::Result<()> {
    let mut events = session.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", commands::help());
    print_status(&session);

    match session.execute(Command::ResetGame, Instant::now()) {
        CommandResult::Error(message) => println!("Error: {}", message),
        _ => debug!("First round started"),
    }

    loop {
        let deadline = session.next_deadline();

        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                match commands::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(Input::Session(command))) => {
                        let result = session.execute(command, Instant::now());
                        print_result(&result);
                    }
                    Ok(Some(Input::Status { json })) => {
                        if json {
                            println!("{}", serde_json::to_string_pretty(&session.snapshot())?);
                        } else {
                            print_status(&session);
                        }
                    }
                    Ok(Some(Input::Grid)) => print_grid(&session),
                    Ok(Some(Input::Help)) => println!("{}", commands::help()),
                    Ok(Some(Input::Quit)) => break,
                    Err(message) => println!("{}", message),
                }
            }
            _ = sleep_until(deadline) => {
                session.poll(Instant::now());
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Dropped session events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    session.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Some(Subcommands::Devices) = cli.command {
        return list_devices();
    }

    info!("Eqtrain starting");

    let config = load_config(cli.config).await?;
    let engine = build_engine(cli.device, cli.offline, &config)?;
    let session = Session::from_config(&config, engine, Arc::new(SymphoniaLoader::new()))
        .context("Failed to set up session")?;

    run(session).await
}
