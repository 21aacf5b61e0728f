//! Equalizer settings and the catalog of legal values
//!
//! Settings are immutable values: every change builds a new instance, so
//! snapshots and equality checks never observe a half-updated triple.
//! Randomized values are always copied out of the catalog, never computed,
//! which keeps guess comparison bit-exact.

use crate::domain::audio::{AudioError, Result};
use crate::domain::dsp::params;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_FREQUENCIES: [f32; 6] = [250.0, 500.0, 1000.0, 2000.0, 4000.0, 10000.0];
pub const DEFAULT_GAINS: [f32; 2] = [-6.0, 6.0];
pub const DEFAULT_Q: f32 = 1.0;

/// The discrete values a round may use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqCatalog {
    /// Center frequencies in Hz
    pub frequencies: Vec<f32>,

    /// Gains in dB
    pub gains: Vec<f32>,

    /// Q shared by every setting
    pub q: f32,
}

impl Default for EqCatalog {
    fn default() -> Self {
        Self {
            frequencies: DEFAULT_FREQUENCIES.to_vec(),
            gains: DEFAULT_GAINS.to_vec(),
            q: DEFAULT_Q,
        }
    }
}

impl EqCatalog {
    /// Check the catalog can be rendered at `sample_rate`
    pub fn validate(&self, sample_rate: u32) -> Result<()> {
        let nyquist = sample_rate as f32 / 2.0;

        if self.frequencies.is_empty() {
            return Err(AudioError::InvalidConfiguration(
                "EQ catalog has no frequencies".to_string(),
            ));
        }
        if self.gains.is_empty() {
            return Err(AudioError::InvalidConfiguration(
                "EQ catalog has no gains".to_string(),
            ));
        }
        if !(self.q.is_finite() && self.q > 0.0) {
            return Err(AudioError::InvalidConfiguration(format!(
                "Q must be positive, got {}",
                self.q
            )));
        }

        for (i, &freq) in self.frequencies.iter().enumerate() {
            if !(freq.is_finite() && freq > 0.0 && freq < nyquist) {
                return Err(AudioError::InvalidConfiguration(format!(
                    "Frequency {} Hz is outside (0, {}) Hz",
                    freq, nyquist
                )));
            }
            if self.frequencies[..i].contains(&freq) {
                return Err(AudioError::InvalidConfiguration(format!(
                    "Duplicate frequency {} Hz",
                    freq
                )));
            }
        }

        for (i, &gain) in self.gains.iter().enumerate() {
            if !(gain.is_finite() && gain.abs() <= params::EQ_GAIN_MAX_DB) {
                return Err(AudioError::InvalidConfiguration(format!(
                    "Gain {} dB is outside +/-{} dB",
                    gain,
                    params::EQ_GAIN_MAX_DB
                )));
            }
            if self.gains[..i].contains(&gain) {
                return Err(AudioError::InvalidConfiguration(format!(
                    "Duplicate gain {} dB",
                    gain
                )));
            }
        }

        Ok(())
    }

    pub fn contains_frequency(&self, frequency: f32) -> bool {
        self.frequencies.contains(&frequency)
    }

    pub fn contains_gain(&self, gain_db: f32) -> bool {
        self.gains.contains(&gain_db)
    }

    /// True when both band parameters are catalog members
    pub fn contains(&self, settings: &EqualizerSettings) -> bool {
        self.contains_frequency(settings.center_frequency) && self.contains_gain(settings.gain_db)
    }

    /// Every legal (frequency, gain) pair, boosts first, ordered by frequency
    ///
    /// This is the grid the presentation layer turns into guess buttons.
    pub fn guess_grid(&self) -> Vec<(f32, f32)> {
        let mut gains = self.gains.clone();
        gains.sort_by(|a, b| b.total_cmp(a));

        let mut frequencies = self.frequencies.clone();
        frequencies.sort_by(|a, b| a.total_cmp(b));

        gains
            .iter()
            .flat_map(|&gain| frequencies.iter().map(move |&freq| (freq, gain)))
            .collect()
    }

    /// 1 kHz / +6 dB when available, otherwise the first catalog entries
    pub fn default_settings(&self) -> EqualizerSettings {
        let frequency = if self.contains_frequency(1000.0) {
            1000.0
        } else {
            self.frequencies.first().copied().unwrap_or(1000.0)
        };
        let gain = if self.contains_gain(6.0) {
            6.0
        } else {
            self.gains.first().copied().unwrap_or(0.0)
        };
        EqualizerSettings::new(frequency, gain, self.q)
    }
}

/// Parametric band: center frequency, gain and Q
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqualizerSettings {
    center_frequency: f32,
    gain_db: f32,
    q: f32,
}

impl Default for EqualizerSettings {
    fn default() -> Self {
        Self::new(1000.0, 6.0, DEFAULT_Q)
    }
}

impl EqualizerSettings {
    pub const fn new(center_frequency: f32, gain_db: f32, q: f32) -> Self {
        Self {
            center_frequency,
            gain_db,
            q,
        }
    }

    pub fn center_frequency(&self) -> f32 {
        self.center_frequency
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    pub fn q(&self) -> f32 {
        self.q
    }

    /// Same Q, different band
    pub fn with_band(&self, center_frequency: f32, gain_db: f32) -> Self {
        Self::new(center_frequency, gain_db, self.q)
    }

    /// Exact comparison of the band parameters (Q is ignored)
    pub fn matches(&self, center_frequency: f32, gain_db: f32) -> bool {
        self.center_frequency == center_frequency && self.gain_db == gain_db
    }

    /// Fresh settings drawn uniformly from the catalog
    pub fn random<R: Rng + ?Sized>(catalog: &EqCatalog, rng: &mut R) -> Self {
        catalog.default_settings().randomize(catalog, rng)
    }

    pub fn randomize_frequency<R: Rng + ?Sized>(&self, catalog: &EqCatalog, rng: &mut R) -> Self {
        let frequency = pick(&catalog.frequencies, self.center_frequency, rng);
        Self::new(frequency, self.gain_db, catalog.q)
    }

    pub fn randomize_gain<R: Rng + ?Sized>(&self, catalog: &EqCatalog, rng: &mut R) -> Self {
        let gain = pick(&catalog.gains, self.gain_db, rng);
        Self::new(self.center_frequency, gain, catalog.q)
    }

    pub fn randomize<R: Rng + ?Sized>(&self, catalog: &EqCatalog, rng: &mut R) -> Self {
        self.randomize_frequency(catalog, rng)
            .randomize_gain(catalog, rng)
    }

    /// Like [`randomize`](Self::randomize), but the result differs from `self`
    /// whenever the catalog offers an alternative
    ///
    /// The frequency always moves when it can. The gain is drawn freely and
    /// only forced to change when the frequency set has nowhere else to go.
    pub fn randomize_distinct<R: Rng + ?Sized>(&self, catalog: &EqCatalog, rng: &mut R) -> Self {
        let frequency = pick_different(&catalog.frequencies, self.center_frequency, rng);
        let gain = if frequency != self.center_frequency {
            pick(&catalog.gains, self.gain_db, rng)
        } else {
            pick_different(&catalog.gains, self.gain_db, rng)
        };
        Self::new(frequency, gain, catalog.q)
    }
}

impl fmt::Display for EqualizerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", BandLabel(self.center_frequency, self.gain_db))
    }
}

/// Button caption for a (frequency, gain) pair, e.g. `1000 Hz +6dB`
pub struct BandLabel(pub f32, pub f32);

impl fmt::Display for BandLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.1 > 0.0 { "+" } else { "" };
        write!(f, "{} Hz {}{}dB", self.0.round() as i64, sign, self.1.round() as i64)
    }
}

fn pick<R: Rng + ?Sized>(set: &[f32], fallback: f32, rng: &mut R) -> f32 {
    set.choose(rng).copied().unwrap_or(fallback)
}

fn pick_different<R: Rng + ?Sized>(set: &[f32], current: f32, rng: &mut R) -> f32 {
    // Degenerate sets return immediately instead of resampling forever
    if set.iter().all(|&v| v == current) {
        return set.first().copied().unwrap_or(current);
    }
    loop {
        let candidate = pick(set, current, rng);
        if candidate != current {
            return candidate;
        }
    }
}
