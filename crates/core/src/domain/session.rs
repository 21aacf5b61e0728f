//! Presentation-facing facade over the signal chain and the round engine
//!
//! A front end issues [`Command`]s, renders [`SessionSnapshot`]s and listens
//! for [`SessionEvent`]s. Everything here runs on the control thread.

use crate::domain::audio::{AudioError, AudioFileLoader, EngineStartError, FileHandle};
use crate::domain::chain::{Route, SignalChain};
use crate::domain::config::TrainerConfig;
use crate::domain::dsp::params::MAX_CHANNELS;
use crate::domain::eq::BandLabel;
use crate::domain::events::SessionEvent;
use crate::domain::output::OutputEngine;
use crate::domain::round::{GuessFeedback, GuessOutcome, RoundEngine, RoundTiming};
use crate::domain::source::SignalSourceKind;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

/// User intents
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetVolume { volume: f32 },
    ToggleBypass,
    SetSource { kind: SignalSourceKind },
    LoadFile { handle: FileHandle },
    TogglePlayback,
    SubmitGuess { frequency: f32, gain_db: f32 },
    ResetGame,
}

/// Result of command execution
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    VolumeChanged { volume: f32 },
    BypassToggled { bypassed: bool },
    SourceChanged { name: String },
    /// The source was swapped but playback could not resume
    SourceChangedStopped { name: String, reason: String },
    PlaybackToggled { playing: bool },
    GuessSubmitted { outcome: GuessOutcome },
    GameReset,
    Error(String),
}

impl CommandResult {
    pub fn is_error(&self) -> bool {
        matches!(self, CommandResult::Error(_))
    }
}

/// Observable state, as the presentation layer shows it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub is_playing: bool,
    pub volume: f32,
    pub eq_bypassed: bool,
    pub current_audio_file_name: String,
    pub current_sample: String,
    pub score: u32,
    pub total_tries: u32,
    pub has_guessed: bool,
    pub is_correct_guess: bool,
    pub active_frequency: f32,
    pub active_gain: f32,
}

/// One button of the guess grid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridCell {
    pub frequency: f32,
    pub gain_db: f32,
    pub label: String,
    pub feedback: GuessFeedback,
}

pub struct Session {
    chain: SignalChain,
    round: RoundEngine,
}

impl Session {
    pub fn new(mut chain: SignalChain, timing: RoundTiming) -> Self {
        let round = RoundEngine::new(&mut chain, timing);
        Self { chain, round }
    }

    /// Build a session from configuration around the given engine and loader
    #[instrument(skip_all)]
    pub fn from_config(
        config: &TrainerConfig,
        engine: Box<dyn OutputEngine>,
        loader: Arc<dyn AudioFileLoader>,
    ) -> Result<Self, AudioError> {
        let stream = engine.stream_config();
        if stream.channels.count() as usize > MAX_CHANNELS {
            return Err(AudioError::InvalidConfiguration(format!(
                "{} output channels, the equalizer filters at most {}",
                stream.channels.count(),
                MAX_CHANNELS
            )));
        }
        config.eq.validate(stream.sample_rate.hz())?;

        let mut chain = SignalChain::new(engine, loader, config.eq.clone(), config.game.seed);
        chain.set_amplitude(config.playback.volume);
        let initial = config.playback.source.kind();
        if &initial != chain.source_kind() {
            chain.set_source(initial)?;
        }

        info!(
            volume = chain.amplitude(),
            source = chain.source_kind().display_name(),
            "Session created"
        );
        Ok(Self::new(chain, config.game.timing))
    }

    /// Apply one command; `now` anchors any delayed transition it schedules
    pub fn execute(&mut self, command: Command, now: Instant) -> CommandResult {
        match command {
            Command::SetVolume { volume } => {
                self.chain.set_amplitude(volume);
                CommandResult::VolumeChanged {
                    volume: self.chain.amplitude(),
                }
            }
            Command::ToggleBypass => match self.chain.toggle_bypass() {
                Ok(bypassed) => CommandResult::BypassToggled { bypassed },
                Err(e) => self.failed(e.into()),
            },
            Command::SetSource { kind } => self.change_source(kind),
            Command::LoadFile { handle } => self.change_source(SignalSourceKind::File(handle)),
            Command::TogglePlayback => match self.chain.toggle_playback() {
                Ok(playing) => CommandResult::PlaybackToggled { playing },
                Err(e) => self.failed(e.into()),
            },
            Command::SubmitGuess { frequency, gain_db } => {
                let outcome = self.round.submit_guess(&mut self.chain, frequency, gain_db, now);
                CommandResult::GuessSubmitted { outcome }
            }
            Command::ResetGame => match self.round.reset_game(&mut self.chain) {
                Ok(()) => CommandResult::GameReset,
                Err(e) => self.failed(e.into()),
            },
        }
    }

    /// Swapping material mid-resolution starts a fresh round instead of
    /// letting a stale reveal or advance fire later
    fn change_source(&mut self, kind: SignalSourceKind) -> CommandResult {
        // A load failure leaves the chain untouched, a restart failure does not
        let mut restart: Result<(), EngineStartError> = match self.chain.set_source(kind) {
            Ok(()) => Ok(()),
            Err(AudioError::EngineStart(e)) => Err(e),
            Err(e) => return self.failed(e),
        };

        if self.round.has_guessed() {
            // Clears the resolved round before it touches the engine
            if let Err(e) = self.round.start_new_round(&mut self.chain) {
                restart = Err(e);
            }
        }

        let name = self.chain.current_audio_file_name().to_string();
        match restart {
            Ok(()) => CommandResult::SourceChanged { name },
            Err(e) => {
                warn!(error = %e, source = %name, "Source changed but playback stopped");
                self.publish_error(e.to_string());
                CommandResult::SourceChangedStopped {
                    name,
                    reason: e.to_string(),
                }
            }
        }
    }

    fn failed(&self, error: AudioError) -> CommandResult {
        warn!(error = %error, "Command failed");
        let message = error.to_string();
        self.publish_error(message.clone());
        CommandResult::Error(message)
    }

    fn publish_error(&self, message: String) {
        self.chain.events().publish(SessionEvent::Error { message });
    }

    /// Run due round transitions
    pub fn poll(&mut self, now: Instant) -> usize {
        self.round.poll(&mut self.chain, now)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.round.next_deadline()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.chain.events().subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            is_playing: self.chain.is_playing(),
            volume: self.chain.amplitude(),
            eq_bypassed: self.chain.is_bypassed(),
            current_audio_file_name: self.chain.current_audio_file_name().to_string(),
            current_sample: self.chain.source_kind().sample_id().to_string(),
            score: self.round.score(),
            total_tries: self.round.total_tries(),
            has_guessed: self.round.has_guessed(),
            is_correct_guess: self.round.is_correct_guess(),
            active_frequency: self.round.active_frequency(),
            active_gain: self.round.active_gain(),
        }
    }

    /// The guess grid with per-cell feedback for the current round
    pub fn grid(&self) -> Vec<GridCell> {
        self.chain
            .catalog()
            .guess_grid()
            .into_iter()
            .map(|(frequency, gain_db)| GridCell {
                frequency,
                gain_db,
                label: BandLabel(frequency, gain_db).to_string(),
                feedback: self.round.feedback(frequency, gain_db),
            })
            .collect()
    }

    pub fn routing(&self) -> Option<Route> {
        self.chain.routing()
    }

    pub fn chain(&self) -> &SignalChain {
        &self.chain
    }

    pub fn round(&self) -> &RoundEngine {
        &self.round
    }

    /// Stop playback and drop pending transitions
    pub fn shutdown(&mut self) {
        self.round.cancel_pending();
        self.chain.stop();
        info!("Session shut down");
    }
}
