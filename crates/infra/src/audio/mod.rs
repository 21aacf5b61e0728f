//! Platform audio adapters
//!
//! Playback goes through CPAL, which abstracts platform-specific APIs:
//! - Windows: WASAPI
//! - Linux: ALSA/PulseAudio
//! - macOS: CoreAudio
//!
//! File decoding goes through Symphonia.

pub mod cpal_backend;
pub mod decoder;
pub mod stream;

pub use cpal_backend::CpalEnumerator;
pub use decoder::SymphoniaLoader;
pub use stream::CpalOutput;
