//! Signal sources: coloured noise generators and a looping file player
//!
//! Exactly one source feeds the chain at a time. Every variant exposes the
//! same contract (start, stop, amplitude, output node) through
//! [`SignalSource`]; the variant specific rendering sits behind a closed enum.

use crate::domain::audio::{AudioFileLoader, DecodedAudio, FileHandle, LoadError};
use crate::domain::output::{lock_node, NodeHandle, RenderNode};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument};

/// Which source the chain should play
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalSourceKind {
    WhiteNoise,
    PinkNoise,
    BrownNoise,
    File(FileHandle),
}

impl SignalSourceKind {
    pub fn display_name(&self) -> &str {
        match self {
            SignalSourceKind::WhiteNoise => BuiltinSource::WhiteNoise.display_name(),
            SignalSourceKind::PinkNoise => BuiltinSource::PinkNoise.display_name(),
            SignalSourceKind::BrownNoise => BuiltinSource::BrownNoise.display_name(),
            SignalSourceKind::File(handle) => &handle.display_name,
        }
    }

    /// Stable identifier shown to the presentation layer
    pub fn sample_id(&self) -> &'static str {
        match self {
            SignalSourceKind::WhiteNoise => "white-noise",
            SignalSourceKind::PinkNoise => "pink-noise",
            SignalSourceKind::BrownNoise => "brown-noise",
            SignalSourceKind::File(_) => "custom-file",
        }
    }

    /// The catalog entry, `None` for files
    pub fn builtin(&self) -> Option<BuiltinSource> {
        match self {
            SignalSourceKind::WhiteNoise => Some(BuiltinSource::WhiteNoise),
            SignalSourceKind::PinkNoise => Some(BuiltinSource::PinkNoise),
            SignalSourceKind::BrownNoise => Some(BuiltinSource::BrownNoise),
            SignalSourceKind::File(_) => None,
        }
    }
}

/// Sources that need no file, as offered to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuiltinSource {
    WhiteNoise,
    PinkNoise,
    BrownNoise,
}

impl BuiltinSource {
    pub const ALL: [BuiltinSource; 3] = [
        BuiltinSource::WhiteNoise,
        BuiltinSource::PinkNoise,
        BuiltinSource::BrownNoise,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            BuiltinSource::WhiteNoise => "White Noise",
            BuiltinSource::PinkNoise => "Pink Noise",
            BuiltinSource::BrownNoise => "Brownian Noise",
        }
    }

    pub fn kind(&self) -> SignalSourceKind {
        match self {
            BuiltinSource::WhiteNoise => SignalSourceKind::WhiteNoise,
            BuiltinSource::PinkNoise => SignalSourceKind::PinkNoise,
            BuiltinSource::BrownNoise => SignalSourceKind::BrownNoise,
        }
    }

    fn color(&self) -> NoiseColor {
        match self {
            BuiltinSource::WhiteNoise => NoiseColor::White,
            BuiltinSource::PinkNoise => NoiseColor::Pink,
            BuiltinSource::BrownNoise => NoiseColor::Brown,
        }
    }
}

impl fmt::Display for BuiltinSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for BuiltinSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "white" | "white-noise" => Ok(BuiltinSource::WhiteNoise),
            "pink" | "pink-noise" => Ok(BuiltinSource::PinkNoise),
            "brown" | "brownian" | "brown-noise" => Ok(BuiltinSource::BrownNoise),
            other => Err(format!("unknown source '{}' (white, pink, brown)", other)),
        }
    }
}

// ============================================================================
// NOISE GENERATORS
// ============================================================================

/// Spectral colour of a noise generator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseColor {
    /// Equal energy at all frequencies
    White,
    /// 1/f spectrum, equal energy per octave
    Pink,
    /// 1/f^2 spectrum, very bass-heavy
    Brown,
}

const PINK_ROWS: usize = 16;
const PINK_GAIN: f32 = 2.5;
const BROWN_STEP: f32 = 0.02;
const BROWN_LEAK: f32 = 1.02;
const BROWN_GAIN: f32 = 3.5;

/// Mono noise generator
pub struct NoiseGenerator {
    color: NoiseColor,
    rng: Pcg32,
    // Voss-McCartney state
    pink_rows: [f32; PINK_ROWS],
    pink_sum: f32,
    pink_index: u32,
    // Leaky random walk
    brown: f32,
}

impl NoiseGenerator {
    pub fn new(color: NoiseColor, seed: u64) -> Self {
        Self {
            color,
            rng: Pcg32::seed_from_u64(seed),
            pink_rows: [0.0; PINK_ROWS],
            pink_sum: 0.0,
            pink_index: 0,
            brown: 0.0,
        }
    }

    pub fn color(&self) -> NoiseColor {
        self.color
    }

    #[inline]
    fn white(&mut self) -> f32 {
        self.rng.gen_range(-1.0..1.0)
    }

    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        match self.color {
            NoiseColor::White => self.white(),
            NoiseColor::Pink => self.pink(),
            NoiseColor::Brown => self.brown(),
        }
    }

    fn pink(&mut self) -> f32 {
        let white = self.white();
        self.pink_index = self.pink_index.wrapping_add(1);
        // Rows whose bit flipped in the counter get a new random value
        let changed = self.pink_index ^ self.pink_index.wrapping_sub(1);
        for row in 0..PINK_ROWS {
            if changed & (1 << row) != 0 {
                let value = self.white() / PINK_ROWS as f32;
                self.pink_sum += value - self.pink_rows[row];
                self.pink_rows[row] = value;
            }
        }
        ((self.pink_sum + white / PINK_ROWS as f32) * PINK_GAIN).clamp(-1.0, 1.0)
    }

    fn brown(&mut self) -> f32 {
        let white = self.white();
        self.brown = (self.brown + white * BROWN_STEP) / BROWN_LEAK;
        (self.brown * BROWN_GAIN).clamp(-1.0, 1.0)
    }

    /// Fill interleaved frames, same sample on every channel
    fn fill(&mut self, buffer: &mut [f32], channels: usize, amplitude: f32) {
        for frame in buffer.chunks_mut(channels) {
            let sample = self.next_sample() * amplitude;
            frame.fill(sample);
        }
    }
}

// ============================================================================
// FILE PLAYER
// ============================================================================

/// Plays decoded audio at the output rate, looping by default
pub struct FilePlayer {
    audio: Arc<DecodedAudio>,
    position: f64,
    step: f64,
    looping: bool,
    finished: bool,
}

impl FilePlayer {
    pub fn new(audio: Arc<DecodedAudio>, output_rate: u32) -> Self {
        let step = if output_rate == 0 || audio.sample_rate == 0 {
            1.0
        } else {
            audio.sample_rate as f64 / output_rate as f64
        };
        Self {
            audio,
            position: 0.0,
            step,
            looping: true,
            finished: false,
        }
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    #[inline]
    fn sample(&self, frame: usize, channel: usize) -> f32 {
        let channels = self.audio.channels as usize;
        self.audio.samples[frame * channels + channel]
    }

    fn fill(&mut self, buffer: &mut [f32], channels: usize, amplitude: f32) {
        let frames = self.audio.frames();
        let src_channels = self.audio.channels as usize;
        if frames == 0 || src_channels == 0 {
            buffer.fill(0.0);
            self.finished = true;
            return;
        }

        for frame in buffer.chunks_mut(channels) {
            if self.finished {
                frame.fill(0.0);
                continue;
            }

            let i0 = self.position as usize;
            let frac = (self.position - i0 as f64) as f32;
            let i1 = if i0 + 1 < frames {
                i0 + 1
            } else if self.looping {
                0
            } else {
                i0
            };

            let interpolate = |ch: usize| {
                let a = self.sample(i0, ch);
                let b = self.sample(i1, ch);
                a + frac * (b - a)
            };

            if channels == 1 {
                let sum: f32 = (0..src_channels).map(interpolate).sum();
                frame[0] = sum / src_channels as f32 * amplitude;
            } else {
                for (ch, out) in frame.iter_mut().enumerate() {
                    *out = interpolate(ch.min(src_channels - 1)) * amplitude;
                }
            }

            self.position += self.step;
            if self.position >= frames as f64 {
                if self.looping {
                    self.position %= frames as f64;
                } else {
                    self.finished = true;
                }
            }
        }
    }
}

// ============================================================================
// SIGNAL SOURCE
// ============================================================================

enum Voice {
    Noise(NoiseGenerator),
    File(FilePlayer),
}

/// The render-side state of a source, shared with the audio thread
struct VoiceNode {
    voice: Voice,
    playing: bool,
    amplitude: f32,
}

impl RenderNode for VoiceNode {
    fn render(&mut self, buffer: &mut [f32], channels: usize) {
        if !self.playing || channels == 0 {
            buffer.fill(0.0);
            return;
        }
        match &mut self.voice {
            Voice::Noise(generator) => generator.fill(buffer, channels, self.amplitude),
            Voice::File(player) => player.fill(buffer, channels, self.amplitude),
        }
    }
}

/// A playable source with a uniform control surface
pub struct SignalSource {
    kind: SignalSourceKind,
    node: Arc<Mutex<VoiceNode>>,
}

impl SignalSource {
    /// Build one of the noise generators
    pub fn generator(builtin: BuiltinSource, seed: u64, amplitude: f32) -> Self {
        debug!(source = builtin.display_name(), seed, "Creating noise generator");
        Self::with_voice(
            builtin.kind(),
            Voice::Noise(NoiseGenerator::new(builtin.color(), seed)),
            amplitude,
        )
    }

    /// Wrap already decoded audio in a looping player
    pub fn file(handle: FileHandle, audio: Arc<DecodedAudio>, output_rate: u32, amplitude: f32) -> Self {
        Self::with_voice(
            SignalSourceKind::File(handle),
            Voice::File(FilePlayer::new(audio, output_rate)),
            amplitude,
        )
    }

    /// Decode `handle` and build a file player from it
    #[instrument(skip(loader, handle), fields(path = %handle.path.display()))]
    pub fn load(
        handle: &FileHandle,
        loader: &dyn AudioFileLoader,
        output_rate: u32,
        amplitude: f32,
    ) -> Result<Self, LoadError> {
        let audio = loader.load(handle)?;
        if audio.frames() == 0 {
            return Err(LoadError::unsupported(&handle.path, "file contains no audio frames"));
        }
        info!(
            frames = audio.frames(),
            channels = audio.channels,
            sample_rate = audio.sample_rate,
            "Audio file loaded"
        );
        Ok(Self::file(handle.clone(), Arc::new(audio), output_rate, amplitude))
    }

    fn with_voice(kind: SignalSourceKind, voice: Voice, amplitude: f32) -> Self {
        Self {
            kind,
            node: Arc::new(Mutex::new(VoiceNode {
                voice,
                playing: false,
                amplitude: amplitude.clamp(0.0, 1.0),
            })),
        }
    }

    pub fn kind(&self) -> &SignalSourceKind {
        &self.kind
    }

    /// Start producing audio; calling it again is a no-op
    pub fn start(&mut self) {
        let mut node = lock_node(&self.node);
        if !node.playing {
            node.playing = true;
            if let Voice::File(player) = &mut node.voice {
                if player.finished {
                    player.finished = false;
                    player.position = 0.0;
                }
            }
        }
    }

    /// Output silence from now on; calling it again is a no-op
    pub fn stop(&mut self) {
        lock_node(&self.node).playing = false;
    }

    pub fn is_playing(&self) -> bool {
        lock_node(&self.node).playing
    }

    /// Takes effect on the next rendered block, also while playing
    pub fn set_amplitude(&mut self, amplitude: f32) {
        lock_node(&self.node).amplitude = amplitude.clamp(0.0, 1.0);
    }

    pub fn amplitude(&self) -> f32 {
        lock_node(&self.node).amplitude
    }

    /// Only meaningful for file sources, generators never end
    pub fn set_looping(&mut self, looping: bool) {
        if let Voice::File(player) = &mut lock_node(&self.node).voice {
            player.set_looping(looping);
        }
    }

    /// Handle the equalizer stage or the output engine can pull from
    pub fn output_node(&self) -> NodeHandle {
        self.node.clone()
    }
}

impl fmt::Debug for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalSource")
            .field("kind", &self.kind)
            .field("playing", &self.is_playing())
            .finish()
    }
}
