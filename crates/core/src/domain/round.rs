//! The guessing game: hidden target, scoring and timed round transitions

use crate::domain::audio::EngineStartError;
use crate::domain::chain::SignalChain;
use crate::domain::eq::EqualizerSettings;
use crate::domain::events::{EventBus, SessionEvent};
use crate::domain::timeline::Timeline;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Delays between a guess and the next round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundTiming {
    /// After a correct guess, until the next round
    pub correct_advance_ms: u64,
    /// After a wrong guess, how long the guess stays audible
    pub reveal_ms: u64,
    /// After the target was revealed, until the next round
    pub post_reveal_advance_ms: u64,
}

impl Default for RoundTiming {
    fn default() -> Self {
        Self {
            correct_advance_ms: 1000,
            reveal_ms: 1000,
            post_reveal_advance_ms: 1500,
        }
    }
}

impl RoundTiming {
    pub fn correct_advance(&self) -> Duration {
        Duration::from_millis(self.correct_advance_ms)
    }

    pub fn reveal(&self) -> Duration {
        Duration::from_millis(self.reveal_ms)
    }

    pub fn post_reveal_advance(&self) -> Duration {
        Duration::from_millis(self.post_reveal_advance_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    AwaitingGuess,
    Resolved { correct: bool },
}

/// What happened to a submitted guess
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessOutcome {
    Correct,
    Incorrect,
    /// A guess was already scored this round
    Ignored,
    /// Not a catalog pair; nothing changed
    Invalid,
}

/// How a guess-grid cell should be shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuessFeedback {
    /// Selectable boost cell
    Boost,
    /// Selectable cut cell
    Cut,
    /// Boost cell after this round's guess
    BoostDimmed,
    /// Cut cell after this round's guess
    CutDimmed,
    /// The target, guessed right
    Correct,
    /// The target, guessed wrong
    Missed,
    /// The player's wrong pick
    WrongGuess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundTask {
    RevealTarget,
    AdvanceRound,
}

pub struct RoundEngine {
    target: EqualizerSettings,
    score: u32,
    total_tries: u32,
    has_guessed: bool,
    guessed: Option<EqualizerSettings>,
    is_correct_guess: bool,
    phase: RoundPhase,
    timing: RoundTiming,
    timeline: Timeline<RoundTask>,
    events: EventBus,
}

impl RoundEngine {
    /// Draw a first target without touching playback or bypass
    pub fn new(chain: &mut SignalChain, timing: RoundTiming) -> Self {
        let target = chain.randomize_eq();
        Self {
            target,
            score: 0,
            total_tries: 0,
            has_guessed: false,
            guessed: None,
            is_correct_guess: false,
            phase: RoundPhase::AwaitingGuess,
            timing,
            timeline: Timeline::new(),
            events: chain.events().clone(),
        }
    }

    /// Begin a round with a fresh target, EQ engaged and playback on
    ///
    /// Pending reveals and advances from the previous round are dropped. The
    /// round is active even when playback fails to start.
    pub fn start_new_round(&mut self, chain: &mut SignalChain) -> Result<(), EngineStartError> {
        self.cancel_pending();
        self.has_guessed = false;
        self.guessed = None;
        self.is_correct_guess = false;
        self.phase = RoundPhase::AwaitingGuess;
        self.target = chain.randomize_eq();

        info!(round = self.total_tries + 1, "New round started");
        self.events.publish(SessionEvent::RoundStarted);

        chain.set_bypass(false)?;
        chain.start()
    }

    /// Score a guess and schedule the follow-up transitions
    pub fn submit_guess(
        &mut self,
        chain: &mut SignalChain,
        frequency: f32,
        gain_db: f32,
        now: Instant,
    ) -> GuessOutcome {
        if self.has_guessed {
            debug!(frequency, gain_db, "Guess ignored, round already resolved");
            return GuessOutcome::Ignored;
        }
        if !(chain.catalog().contains_frequency(frequency) && chain.catalog().contains_gain(gain_db)) {
            warn!(frequency, gain_db, "Guess is not a catalog pair");
            return GuessOutcome::Invalid;
        }

        let guess = self.target.with_band(frequency, gain_db);
        let correct = self.target.matches(frequency, gain_db);

        self.has_guessed = true;
        self.total_tries += 1;
        self.guessed = Some(guess);
        self.is_correct_guess = correct;
        self.phase = RoundPhase::Resolved { correct };

        if correct {
            self.score += 1;
            chain.set_eq_settings(self.target);
            self.timeline
                .schedule(now + self.timing.correct_advance(), RoundTask::AdvanceRound);
        } else {
            chain.set_eq_settings(guess);
            self.timeline
                .schedule(now + self.timing.reveal(), RoundTask::RevealTarget);
        }

        info!(
            guess = %guess,
            correct,
            score = self.score,
            total_tries = self.total_tries,
            "Guess resolved"
        );
        self.events.publish(SessionEvent::GuessResolved {
            correct,
            score: self.score,
            total_tries: self.total_tries,
        });

        if correct {
            GuessOutcome::Correct
        } else {
            GuessOutcome::Incorrect
        }
    }

    /// Run every task due at `now`, returning how many ran
    pub fn poll(&mut self, chain: &mut SignalChain, now: Instant) -> usize {
        let mut ran = 0;
        while let Some((due, task)) = self.timeline.pop_due(now) {
            ran += 1;
            match task {
                RoundTask::RevealTarget => {
                    chain.set_eq_settings(self.target);
                    debug!(settings = %self.target, "Target revealed");
                    self.events.publish(SessionEvent::TargetRevealed {
                        settings: self.target,
                    });
                    self.timeline.schedule(
                        due + self.timing.post_reveal_advance(),
                        RoundTask::AdvanceRound,
                    );
                }
                RoundTask::AdvanceRound => {
                    if let Err(e) = self.start_new_round(chain) {
                        warn!(error = %e, "Round advanced but playback did not start");
                        self.events.publish(SessionEvent::Error {
                            message: e.to_string(),
                        });
                    }
                }
            }
        }
        ran
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timeline.next_deadline()
    }

    /// Zero the counters and begin a new round
    pub fn reset_game(&mut self, chain: &mut SignalChain) -> Result<(), EngineStartError> {
        self.score = 0;
        self.total_tries = 0;
        info!("Game reset");
        self.events.publish(SessionEvent::GameReset);
        self.start_new_round(chain)
    }

    /// Drop every scheduled reveal and advance
    pub fn cancel_pending(&mut self) {
        let dropped = self.timeline.cancel_all();
        if dropped > 0 {
            debug!(dropped, "Cancelled pending round tasks");
        }
    }

    pub fn pending_tasks(&self) -> usize {
        self.timeline.len()
    }

    /// How the grid cell for (`frequency`, `gain_db`) should look
    pub fn feedback(&self, frequency: f32, gain_db: f32) -> GuessFeedback {
        let boost = gain_db > 0.0;
        if !self.has_guessed {
            return if boost {
                GuessFeedback::Boost
            } else {
                GuessFeedback::Cut
            };
        }
        if self.target.matches(frequency, gain_db) {
            if self.is_correct_guess {
                GuessFeedback::Correct
            } else {
                GuessFeedback::Missed
            }
        } else if !self.is_correct_guess
            && self
                .guessed
                .is_some_and(|g| g.matches(frequency, gain_db))
        {
            GuessFeedback::WrongGuess
        } else if boost {
            GuessFeedback::BoostDimmed
        } else {
            GuessFeedback::CutDimmed
        }
    }

    /// The hidden ground truth
    pub fn target(&self) -> EqualizerSettings {
        self.target
    }

    pub fn active_frequency(&self) -> f32 {
        self.target.center_frequency()
    }

    pub fn active_gain(&self) -> f32 {
        self.target.gain_db()
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn total_tries(&self) -> u32 {
        self.total_tries
    }

    pub fn has_guessed(&self) -> bool {
        self.has_guessed
    }

    pub fn is_correct_guess(&self) -> bool {
        self.is_correct_guess
    }

    pub fn guessed(&self) -> Option<EqualizerSettings> {
        self.guessed
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn timing(&self) -> RoundTiming {
        self.timing
    }
}
