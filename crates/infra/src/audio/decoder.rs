//! Audio file decoding using Symphonia
//!
//! Files are decoded fully into memory as interleaved f32. Channel layout and
//! sample rate are kept as-is; the file player adapts them to the output.

use eqtrain_core::domain::audio::{AudioFileLoader, DecodedAudio, FileHandle, LoadError};
use std::io::ErrorKind;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, instrument, warn};

/// Loader supporting WAV, FLAC, MP3 and Ogg Vorbis
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaLoader;

impl SymphoniaLoader {
    pub fn new() -> Self {
        Self
    }
}

impl AudioFileLoader for SymphoniaLoader {
    #[instrument(skip(self, handle), fields(path = %handle.path.display()))]
    fn load(&self, handle: &FileHandle) -> Result<DecodedAudio, LoadError> {
        decode_file(&handle.path)
    }
}

fn probe_error(path: &Path, err: SymphoniaError) -> LoadError {
    match err {
        SymphoniaError::IoError(e) if e.kind() != ErrorKind::UnexpectedEof => {
            LoadError::unreadable(path, e.to_string())
        }
        other => LoadError::unsupported(path, other.to_string()),
    }
}

fn decode_file(path: &Path) -> Result<DecodedAudio, LoadError> {
    let metadata =
        std::fs::metadata(path).map_err(|e| LoadError::unreadable(path, e.to_string()))?;
    if !metadata.is_file() {
        return Err(LoadError::unreadable(path, "not a regular file"));
    }

    let file = std::fs::File::open(path).map_err(|e| LoadError::unreadable(path, e.to_string()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // Create a hint to help the format registry guess the format
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| probe_error(path, e))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| LoadError::unsupported(path, "no audio tracks found"))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| LoadError::unsupported(path, format!("no decoder: {}", e)))?;

    let mut samples: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(SymphoniaError::IoError(e)) => {
                return Err(LoadError::unreadable(path, e.to_string()));
            }
            Err(e) => return Err(LoadError::unsupported(path, e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                if decoded.frames() == 0 {
                    continue;
                }
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;

                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(error = %e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(LoadError::unsupported(path, e.to_string())),
        }
    }

    if samples.is_empty() || channels == 0 || sample_rate == 0 {
        return Err(LoadError::unsupported(path, "no audio frames decoded"));
    }

    let audio = DecodedAudio {
        samples,
        channels,
        sample_rate,
    };
    debug!(
        frames = audio.frames(),
        channels,
        sample_rate,
        seconds = audio.duration().as_secs_f32(),
        "Decoded audio file"
    );
    Ok(audio)
}
