//! Plays one scripted round against the offline output and prints what happens
//!
//! Run with: cargo run --package eqtrain-core --example offline_session

use eqtrain_core::domain::audio::{AudioFileLoader, DecodedAudio, FileHandle, LoadError};
use eqtrain_core::domain::{
    Command, OfflineOutput, Session, SessionEvent, TrainerConfig,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct NoFiles;

impl AudioFileLoader for NoFiles {
    fn load(&self, handle: &FileHandle) -> Result<DecodedAudio, LoadError> {
        Err(LoadError::unreadable(&handle.path, "this demo does not load files"))
    }
}

fn rms(block: &[f32]) -> f32 {
    (block.iter().map(|s| s * s).sum::<f32>() / block.len().max(1) as f32).sqrt()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("eqtrain_core=debug,info")
        .init();

    let mut config = TrainerConfig::default();
    config.game.seed = Some(2024);

    let output = OfflineOutput::new(config.app.stream_config());
    let tap = output.tap();
    let mut session = Session::from_config(&config, Box::new(output), Arc::new(NoFiles))?;
    let mut events = session.subscribe();

    let start = Instant::now();
    session.execute(Command::ResetGame, start);
    println!("Playing {}", session.snapshot().current_audio_file_name);
    println!("Filtered block RMS: {:.3}", rms(&tap.render(4800)));

    // Guess the first grid cell, whatever the target is
    let cell = session.grid().remove(0);
    println!("Guessing {}", cell.label);
    let result = session.execute(
        Command::SubmitGuess {
            frequency: cell.frequency,
            gain_db: cell.gain_db,
        },
        start,
    );
    println!("Result: {:?}", result);

    // Walk the timeline forward until the next round starts
    let mut now = start;
    while session.snapshot().has_guessed {
        now += Duration::from_millis(250);
        session.poll(now);
    }

    while let Ok(event) = events.try_recv() {
        if !matches!(event, SessionEvent::VolumeChanged { .. }) {
            println!("event: {:?}", event);
        }
    }

    let snapshot = session.snapshot();
    println!(
        "Score {}/{} after {:.2}s of game time",
        snapshot.score,
        snapshot.total_tries,
        (now - start).as_secs_f32()
    );

    session.shutdown();
    Ok(())
}
