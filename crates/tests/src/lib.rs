//! Shared fixtures for the eqtrain integration tests

use eqtrain_core::domain::{
    AudioFileLoader, DecodedAudio, FileHandle, LoadError, OfflineOutput, OfflineTap, Session,
    TrainerConfig,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Loader serving registered in-memory clips; anything else is unreadable
#[derive(Default)]
pub struct MemoryLoader {
    clips: HashMap<PathBuf, Arc<DecodedAudio>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clip(mut self, path: impl Into<PathBuf>, audio: DecodedAudio) -> Self {
        self.clips.insert(path.into(), Arc::new(audio));
        self
    }
}

impl AudioFileLoader for MemoryLoader {
    fn load(&self, handle: &FileHandle) -> Result<DecodedAudio, LoadError> {
        match self.clips.get(&handle.path) {
            Some(audio) => Ok(audio.as_ref().clone()),
            None if handle.path.extension().is_some_and(|e| e == "txt") => {
                Err(LoadError::unsupported(&handle.path, "not an audio container"))
            }
            None => Err(LoadError::unreadable(&handle.path, "no such clip")),
        }
    }
}

/// Mono sine clip
pub fn sine(frequency: f32, sample_rate: u32, seconds: f32) -> DecodedAudio {
    let frames = (sample_rate as f32 * seconds) as usize;
    DecodedAudio {
        samples: (0..frames)
            .map(|i| {
                (2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate as f32).sin()
                    * 0.5
            })
            .collect(),
        channels: 1,
        sample_rate,
    }
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

/// Seeded session on an offline output
pub fn offline_session(seed: u64, loader: impl AudioFileLoader + 'static) -> (Session, OfflineTap) {
    let mut config = TrainerConfig::default();
    config.game.seed = Some(seed);
    let output = OfflineOutput::new(config.app.stream_config());
    let tap = output.tap();
    let session = Session::from_config(&config, Box::new(output), Arc::new(loader))
        .expect("default config builds a session");
    (session, tap)
}

/// Reset until the hidden target is `(frequency, gain_db)`
///
/// Panics if the target never comes up, which only happens for pairs
/// outside the catalog.
pub fn reset_until_target(session: &mut Session, frequency: f32, gain_db: f32, now: Instant) {
    for _ in 0..500 {
        session.execute(eqtrain_core::domain::Command::ResetGame, now);
        if session.round().target().matches(frequency, gain_db) {
            return;
        }
    }
    panic!("target {} Hz {} dB never drawn", frequency, gain_db);
}
