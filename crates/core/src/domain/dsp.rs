//! Digital Signal Processing for the equalizer stage
//!
//! This module provides the single filter type the exercise needs:
//! - Biquad peaking filter (RBJ cookbook coefficients)
//! - Multi-channel peaking equalizer built on top of it
//!
//! All processing is designed for:
//! - Zero allocations in the hot path
//! - Coefficient updates while the audio thread is rendering
//! - Interleaved f32 buffers normalized to [-1.0, 1.0]

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Core trait for audio effects
///
/// Effects process interleaved audio in-place.
pub trait Effect: Send + Sync {
    /// Process a buffer of interleaved samples in-place
    ///
    /// # Requirements
    /// - No allocations in the hot path
    /// - Handle buffer of any size
    fn process(&mut self, buffer: &mut [f32], channels: usize);

    /// Reset effect state to initial conditions
    ///
    /// Clears filter history. Called when the upstream signal changes so the
    /// old signal does not ring into the new one.
    fn reset(&mut self);
}

/// Parameter constraints for the equalizer
///
/// Parameters are clamped to these ranges to keep the filter stable.
pub mod params {
    /// Largest boost/cut a band may apply
    pub const EQ_GAIN_MAX_DB: f32 = 12.0;

    /// Q factor range
    pub const Q_MIN: f32 = 0.1;
    pub const Q_MAX: f32 = 10.0;

    /// Lowest center frequency in Hz
    pub const FREQ_MIN: f32 = 10.0;

    /// Highest center frequency as a fraction of the sample rate
    pub const FREQ_MAX_RATIO: f32 = 0.49;

    /// Channels the equalizer keeps filter state for
    pub const MAX_CHANNELS: usize = 8;
}

// ============================================================================
// BIQUAD FILTER
// ============================================================================

/// Biquad filter coefficients
///
/// Direct Form I implementation for numerical stability.
/// Coefficients are pre-computed to avoid per-sample calculations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiquadCoeffs {
    /// Numerator coefficients
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    /// Denominator coefficients (a0 is normalized to 1.0)
    pub a1: f32,
    pub a2: f32,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        // Unity gain (no filtering)
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

impl BiquadCoeffs {
    /// Calculate coefficients for a peaking EQ filter
    ///
    /// Boosts or cuts frequencies around a center frequency.
    ///
    /// # Parameters
    /// - `sample_rate`: Audio sample rate in Hz
    /// - `freq`: Center frequency in Hz (clamped below Nyquist)
    /// - `gain_db`: Boost/cut in decibels (clamped to +/- 12dB)
    /// - `q`: Q factor, bandwidth of the affected region
    #[must_use]
    pub fn peaking(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let gain_db = gain_db.clamp(-params::EQ_GAIN_MAX_DB, params::EQ_GAIN_MAX_DB);
        let freq = freq.clamp(params::FREQ_MIN, sample_rate * params::FREQ_MAX_RATIO);
        let q = q.clamp(params::Q_MIN, params::Q_MAX);

        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let b0 = 1.0 + alpha * a;
        let b1 = -2.0 * cos_w0;
        let b2 = 1.0 - alpha * a;

        let a0 = 1.0 + alpha / a;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha / a;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Magnitude response in dB at `freq`
    pub fn response_db(&self, sample_rate: f32, freq: f32) -> f32 {
        let w = 2.0 * std::f64::consts::PI * freq as f64 / sample_rate as f64;
        let (c1, s1) = (w.cos(), w.sin());
        let (c2, s2) = ((2.0 * w).cos(), (2.0 * w).sin());

        let num_re = self.b0 as f64 + self.b1 as f64 * c1 + self.b2 as f64 * c2;
        let num_im = -(self.b1 as f64 * s1 + self.b2 as f64 * s2);
        let den_re = 1.0 + self.a1 as f64 * c1 + self.a2 as f64 * c2;
        let den_im = -(self.a1 as f64 * s1 + self.a2 as f64 * s2);

        let num = num_re * num_re + num_im * num_im;
        let den = den_re * den_re + den_im * den_im;
        (10.0 * (num / den).log10()) as f32
    }
}

/// Stateful biquad filter using Direct Form I
///
/// Direct Form I keeps coefficient swaps free of artifacts because the
/// state holds raw input/output history rather than internal accumulators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiquadFilter {
    coeffs: BiquadCoeffs,
    // Previous input samples (x[n-1], x[n-2])
    x1: f32,
    x2: f32,
    // Previous output samples (y[n-1], y[n-2])
    y1: f32,
    y2: f32,
}

impl BiquadFilter {
    /// Create a new biquad filter with given coefficients
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Create a bypass filter (unity gain)
    pub fn bypass() -> Self {
        Self::new(BiquadCoeffs::default())
    }

    /// Update filter coefficients
    ///
    /// Can be called in real-time for parameter changes.
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    pub fn coeffs(&self) -> BiquadCoeffs {
        self.coeffs
    }

    /// Process a single sample
    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        // Direct Form I: y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2]
        //                        - a1*y[n-1] - a2*y[n-2]
        let y = self.coeffs.b0 * x + self.coeffs.b1 * self.x1 + self.coeffs.b2 * self.x2
            - self.coeffs.a1 * self.y1
            - self.coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;

        y
    }

    /// Process a mono buffer of samples
    pub fn process(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    /// Reset filter state
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

// ============================================================================
// PEAKING EQUALIZER
// ============================================================================

/// Single-band peaking equalizer with one filter per channel
#[derive(Debug, Clone)]
pub struct PeakingEqualizer {
    sample_rate: f32,
    filters: Vec<BiquadFilter>,
    center_frequency: f32,
    gain_db: f32,
    q: f32,
}

impl PeakingEqualizer {
    /// Create a flat (0 dB) equalizer at 1 kHz
    pub fn new(sample_rate: u32) -> Self {
        let mut eq = Self {
            sample_rate: sample_rate as f32,
            filters: vec![BiquadFilter::bypass(); params::MAX_CHANNELS],
            center_frequency: 1000.0,
            gain_db: 0.0,
            q: 1.0,
        };
        eq.update_coefficients();
        eq
    }

    /// Set the band parameters at once
    pub fn set_band(&mut self, center_frequency: f32, gain_db: f32, q: f32) {
        self.center_frequency = center_frequency;
        self.gain_db = gain_db;
        self.q = q;
        self.update_coefficients();
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

    pub fn coeffs(&self) -> BiquadCoeffs {
        self.filters[0].coeffs()
    }

    fn update_coefficients(&mut self) {
        let coeffs =
            BiquadCoeffs::peaking(self.sample_rate, self.center_frequency, self.gain_db, self.q);
        for filter in &mut self.filters {
            filter.set_coeffs(coeffs);
        }

        trace!(
            "Peaking EQ updated: {:.1}dB@{:.0}Hz Q={:.2}",
            self.gain_db,
            self.center_frequency,
            self.q
        );
    }
}

impl Effect for PeakingEqualizer {
    fn process(&mut self, buffer: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }

        for frame in buffer.chunks_mut(channels) {
            for (sample, filter) in frame.iter_mut().zip(self.filters.iter_mut()) {
                *sample = filter.process_sample(*sample);
            }
        }
    }

    fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
    }
}
