//! The live signal chain: source → optional equalizer → output
//!
//! The chain owns exactly one [`SignalSource`] and one [`EqualizerStage`] and
//! keeps the output engine connected to exactly one of their nodes. All
//! mutation goes through the methods below; each one leaves the graph fully
//! connected before it returns, also on failure.

use crate::domain::audio::{AudioFileLoader, EngineStartError, FileHandle, LoadError, Result};
use crate::domain::eq::{EqCatalog, EqualizerSettings};
use crate::domain::events::{EventBus, SessionEvent};
use crate::domain::output::{same_node, NodeHandle, OutputEngine};
use crate::domain::source::{BuiltinSource, SignalSource, SignalSourceKind};
use crate::domain::stage::EqualizerStage;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_VOLUME: f32 = 0.5;
pub const DEFAULT_FILE_NAME: &str = "White Noise (Default)";

/// Which node feeds the output engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The source, unfiltered
    Raw,
    /// The source through the equalizer
    Filtered,
}

pub struct SignalChain {
    engine: Box<dyn OutputEngine>,
    loader: Arc<dyn AudioFileLoader>,
    catalog: EqCatalog,
    source: SignalSource,
    stage: EqualizerStage,
    bypassed: bool,
    amplitude: f32,
    playing: bool,
    file_name: String,
    rng: Pcg32,
    events: EventBus,
}

impl SignalChain {
    /// Stopped chain playing white noise, bypassed, at the default volume
    pub fn new(
        engine: Box<dyn OutputEngine>,
        loader: Arc<dyn AudioFileLoader>,
        catalog: EqCatalog,
        seed: Option<u64>,
    ) -> Self {
        let mut rng = match seed {
            Some(seed) => Pcg32::seed_from_u64(seed),
            None => Pcg32::from_entropy(),
        };
        let sample_rate = engine.stream_config().sample_rate.hz();
        let source = SignalSource::generator(BuiltinSource::WhiteNoise, rng.gen(), DEFAULT_VOLUME);
        let stage = EqualizerStage::new(&source, catalog.default_settings(), sample_rate);

        let mut chain = Self {
            engine,
            loader,
            catalog,
            source,
            stage,
            bypassed: true,
            amplitude: DEFAULT_VOLUME,
            playing: false,
            file_name: DEFAULT_FILE_NAME.to_string(),
            rng,
            events: EventBus::new(),
        };
        chain.connect_route();

        info!(sample_rate, "Signal chain created");
        chain
    }

    /// Replace the active source
    ///
    /// Files are decoded before anything is touched, so a load failure leaves
    /// the current source and playback as they were.
    #[instrument(skip(self), fields(source = kind.display_name()))]
    pub fn set_source(&mut self, kind: SignalSourceKind) -> Result<()> {
        let source = self.build_source(&kind)?;
        let was_playing = self.playing;

        if was_playing {
            self.engine.stop();
            self.source.stop();
            self.playing = false;
        }

        self.source = source;
        self.stage.rebuild(&self.source);
        self.connect_route();
        self.file_name = kind.display_name().to_string();

        info!(name = %self.file_name, "Source changed");
        self.events.publish(SessionEvent::SourceChanged {
            name: self.file_name.clone(),
        });

        if was_playing {
            self.start_inner().map_err(|e| {
                self.events
                    .publish(SessionEvent::PlaybackChanged { playing: false });
                e
            })?;
        }
        Ok(())
    }

    pub fn load_file(&mut self, handle: FileHandle) -> Result<()> {
        self.set_source(SignalSourceKind::File(handle))
    }

    fn build_source(&mut self, kind: &SignalSourceKind) -> std::result::Result<SignalSource, LoadError> {
        match kind {
            SignalSourceKind::File(handle) => SignalSource::load(
                handle,
                self.loader.as_ref(),
                self.engine.stream_config().sample_rate.hz(),
                self.amplitude,
            ),
            generated => {
                let builtin = generated.builtin().unwrap_or(BuiltinSource::WhiteNoise);
                Ok(SignalSource::generator(builtin, self.rng.gen(), self.amplitude))
            }
        }
    }

    /// Route the output through or around the equalizer
    ///
    /// While playing, the engine is stopped, re-routed and restarted within
    /// this call.
    pub fn set_bypass(&mut self, bypassed: bool) -> std::result::Result<(), EngineStartError> {
        if bypassed == self.bypassed {
            return Ok(());
        }

        if self.playing {
            self.engine.stop();
        }
        self.bypassed = bypassed;
        self.connect_route();
        debug!(bypassed, "Bypass changed");
        self.events.publish(SessionEvent::BypassChanged { bypassed });

        if self.playing {
            if let Err(e) = self.engine.start() {
                warn!(error = %e, "Output engine failed to restart after bypass change");
                self.source.stop();
                self.playing = false;
                self.events
                    .publish(SessionEvent::PlaybackChanged { playing: false });
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn toggle_bypass(&mut self) -> std::result::Result<bool, EngineStartError> {
        let bypassed = !self.bypassed;
        self.set_bypass(bypassed)?;
        Ok(bypassed)
    }

    /// Clamped into [0, 1]; NaN counts as silence
    pub fn set_amplitude(&mut self, amplitude: f32) {
        let amplitude = if amplitude.is_nan() {
            0.0
        } else {
            amplitude.clamp(0.0, 1.0)
        };
        self.amplitude = amplitude;
        self.source.set_amplitude(amplitude);
        self.events
            .publish(SessionEvent::VolumeChanged { volume: amplitude });
    }

    /// Update the filter in place, also while playing
    pub fn set_eq_settings(&mut self, settings: EqualizerSettings) {
        self.stage.configure(settings);
        self.events.publish(SessionEvent::EqChanged { settings });
    }

    pub fn eq_settings(&self) -> EqualizerSettings {
        self.stage.settings()
    }

    /// Draw new settings that differ from the live ones and apply them
    pub fn randomize_eq(&mut self) -> EqualizerSettings {
        let settings = self.stage.randomize(&self.catalog, &mut self.rng);
        self.events.publish(SessionEvent::EqChanged { settings });
        settings
    }

    /// Start the source, then the engine; a no-op while playing
    pub fn start(&mut self) -> std::result::Result<(), EngineStartError> {
        if self.playing {
            return Ok(());
        }
        self.start_inner()
    }

    fn start_inner(&mut self) -> std::result::Result<(), EngineStartError> {
        self.source.start();
        if let Err(e) = self.engine.start() {
            warn!(error = %e, "Output engine failed to start");
            self.source.stop();
            return Err(e);
        }
        self.playing = true;
        info!("Playback started");
        self.events
            .publish(SessionEvent::PlaybackChanged { playing: true });
        Ok(())
    }

    pub fn stop(&mut self) {
        if !self.playing {
            return;
        }
        self.engine.stop();
        self.source.stop();
        self.playing = false;
        info!("Playback stopped");
        self.events
            .publish(SessionEvent::PlaybackChanged { playing: false });
    }

    /// Returns whether the chain is playing afterwards
    pub fn toggle_playback(&mut self) -> std::result::Result<bool, EngineStartError> {
        if self.playing {
            self.stop();
        } else {
            self.start()?;
        }
        Ok(self.playing)
    }

    fn connect_route(&mut self) {
        let node = self.route_node();
        self.engine.connect(node);
    }

    fn route_node(&self) -> NodeHandle {
        if self.bypassed {
            self.source.output_node()
        } else {
            self.stage.output_node()
        }
    }

    /// Which node the engine is connected to
    ///
    /// Reports `None` only if the engine lost its connection, which the
    /// chain never does itself.
    pub fn routing(&self) -> Option<Route> {
        let connected = self.engine.connected()?;
        if same_node(&connected, &self.source.output_node()) {
            Some(Route::Raw)
        } else if same_node(&connected, &self.stage.output_node()) {
            Some(Route::Filtered)
        } else {
            None
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }

    pub fn source_kind(&self) -> &SignalSourceKind {
        self.source.kind()
    }

    pub fn current_audio_file_name(&self) -> &str {
        &self.file_name
    }

    pub fn catalog(&self) -> &EqCatalog {
        &self.catalog
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Node currently feeding the output, for inspection
    pub fn output_node(&self) -> NodeHandle {
        self.route_node()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audio::{DecodedAudio, StreamConfig};
    use crate::domain::output::{OfflineOutput, OfflineTap};

    struct StubLoader;

    impl AudioFileLoader for StubLoader {
        fn load(&self, handle: &FileHandle) -> std::result::Result<DecodedAudio, LoadError> {
            match handle.path.extension().and_then(|e| e.to_str()) {
                Some("wav") => Ok(DecodedAudio {
                    samples: vec![0.25; 2048],
                    channels: 2,
                    sample_rate: 44100,
                }),
                Some("txt") => Err(LoadError::unsupported(&handle.path, "not audio")),
                _ => Err(LoadError::unreadable(&handle.path, "no such file")),
            }
        }
    }

    fn chain() -> (SignalChain, OfflineTap) {
        let output = OfflineOutput::new(StreamConfig::default());
        let tap = output.tap();
        let chain = SignalChain::new(
            Box::new(output),
            Arc::new(StubLoader),
            EqCatalog::default(),
            Some(7),
        );
        (chain, tap)
    }

    fn assert_single_route(chain: &SignalChain, tap: &OfflineTap) {
        let expected = if chain.is_bypassed() {
            Route::Raw
        } else {
            Route::Filtered
        };
        assert_eq!(chain.routing(), Some(expected));
        let connected = tap.connected().unwrap();
        assert!(same_node(&connected, &chain.output_node()));
    }

    #[test]
    fn test_initial_state() {
        let (chain, tap) = chain();
        assert!(!chain.is_playing());
        assert!(chain.is_bypassed());
        assert_eq!(chain.amplitude(), DEFAULT_VOLUME);
        assert_eq!(chain.source_kind(), &SignalSourceKind::WhiteNoise);
        assert_eq!(chain.current_audio_file_name(), DEFAULT_FILE_NAME);
        assert_eq!(chain.eq_settings(), EqualizerSettings::default());
        assert_single_route(&chain, &tap);
    }

    #[test]
    fn test_start_twice_is_idempotent() {
        let (mut chain, tap) = chain();
        chain.start().unwrap();
        chain.start().unwrap();

        assert!(chain.is_playing());
        assert_eq!(tap.start_count(), 1);
        assert!(tap.render(64).iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_start_failure_leaves_chain_stopped() {
        let (mut chain, tap) = chain();
        tap.set_unavailable(Some("no device".to_string()));

        assert!(chain.start().is_err());
        assert!(!chain.is_playing());
        assert!(!tap.is_running());

        // Retrying works once the device is back
        tap.set_unavailable(None);
        chain.start().unwrap();
        assert!(chain.is_playing());
    }

    #[test]
    fn test_eq_settings_round_trip() {
        let (mut chain, _tap) = chain();
        for (freq, gain) in EqCatalog::default().guess_grid() {
            let settings = EqualizerSettings::new(freq, gain, 1.0);
            chain.set_eq_settings(settings);
            assert_eq!(chain.eq_settings(), settings);
        }
    }

    #[test]
    fn test_bypass_switches_route_while_playing() {
        let (mut chain, tap) = chain();
        chain.start().unwrap();

        chain.set_bypass(false).unwrap();
        assert_single_route(&chain, &tap);
        assert!(chain.is_playing());
        assert!(tap.is_running());
        assert_eq!(tap.start_count(), 2);

        assert!(chain.toggle_bypass().unwrap());
        assert_single_route(&chain, &tap);
        assert_eq!(chain.routing(), Some(Route::Raw));
    }

    #[test]
    fn test_bypass_restart_failure_stops_playback() {
        let (mut chain, tap) = chain();
        chain.start().unwrap();
        tap.set_unavailable(Some("unplugged".to_string()));

        assert!(chain.set_bypass(false).is_err());
        assert!(!chain.is_playing());
        assert!(!chain.is_bypassed());
        assert_single_route(&chain, &tap);
    }

    #[test]
    fn test_source_switch_while_playing_keeps_filtered_route() {
        let (mut chain, tap) = chain();
        chain.set_bypass(false).unwrap();
        chain.start().unwrap();

        chain.set_source(SignalSourceKind::PinkNoise).unwrap();

        assert!(chain.is_playing());
        assert!(tap.is_running());
        assert_eq!(chain.source_kind(), &SignalSourceKind::PinkNoise);
        assert_eq!(chain.current_audio_file_name(), "Pink Noise");
        assert_single_route(&chain, &tap);
        assert!(tap.render(256).iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_source_switch_while_stopped_stays_stopped() {
        let (mut chain, tap) = chain();
        chain.set_source(SignalSourceKind::BrownNoise).unwrap();
        assert!(!chain.is_playing());
        assert_eq!(tap.start_count(), 0);
        assert_single_route(&chain, &tap);
    }

    #[test]
    fn test_load_file_success() {
        let (mut chain, tap) = chain();
        chain.start().unwrap();
        chain.load_file(FileHandle::from_path("/tmp/loop.wav")).unwrap();

        assert!(chain.is_playing());
        assert_eq!(chain.current_audio_file_name(), "loop.wav");
        assert_eq!(chain.source_kind().sample_id(), "custom-file");
        assert_single_route(&chain, &tap);
    }

    #[test]
    fn test_load_failure_leaves_state_untouched() {
        let (mut chain, tap) = chain();
        chain.set_bypass(false).unwrap();
        chain.set_source(SignalSourceKind::PinkNoise).unwrap();
        chain.start().unwrap();
        let before = tap.connected().unwrap();

        for path in ["/tmp/notes.txt", "/missing/take.mp3"] {
            let err = chain.load_file(FileHandle::from_path(path)).unwrap_err();
            assert!(matches!(err, crate::domain::audio::AudioError::Load(_)));
        }

        assert!(chain.is_playing());
        assert_eq!(chain.source_kind(), &SignalSourceKind::PinkNoise);
        assert_eq!(chain.current_audio_file_name(), "Pink Noise");
        assert!(same_node(&tap.connected().unwrap(), &before));
        assert_eq!(tap.start_count(), 1);
    }

    #[test]
    fn test_set_amplitude_clamps() {
        let (mut chain, _tap) = chain();
        chain.set_amplitude(1.5);
        assert_eq!(chain.amplitude(), 1.0);
        chain.set_amplitude(-0.2);
        assert_eq!(chain.amplitude(), 0.0);
        chain.set_amplitude(f32::NAN);
        assert_eq!(chain.amplitude(), 0.0);
    }

    #[test]
    fn test_new_source_inherits_amplitude() {
        let (mut chain, tap) = chain();
        chain.set_amplitude(0.1);
        chain.set_source(SignalSourceKind::WhiteNoise).unwrap();
        chain.start().unwrap();
        assert!(tap.render(512).iter().all(|&s| s.abs() <= 0.1));
    }

    #[test]
    fn test_randomize_eq_notifies() {
        let (mut chain, _tap) = chain();
        let mut rx = chain.events().subscribe();
        let before = chain.eq_settings();

        let after = chain.randomize_eq();

        assert_ne!(after.center_frequency(), before.center_frequency());
        assert_eq!(chain.eq_settings(), after);
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::EqChanged { settings: after });
    }

    #[test]
    fn test_toggle_playback() {
        let (mut chain, tap) = chain();
        assert!(chain.toggle_playback().unwrap());
        assert!(!chain.toggle_playback().unwrap());
        assert!(!tap.is_running());
        assert!(tap.render(16).iter().all(|&s| s == 0.0));
    }
}
