//! Domain entities and business rules

pub mod audio;
pub mod chain;
pub mod config;
pub mod dsp;
pub mod eq;
pub mod events;
pub mod output;
pub mod round;
pub mod session;
pub mod source;
pub mod stage;
pub mod timeline;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{
    AudioEnumerator, AudioError, AudioFileLoader, ChannelCount, DecodedAudio, DeviceId,
    DeviceInfo, EngineStartError, FileHandle, LoadError, SampleRate, StreamConfig,
};
pub use chain::{Route, SignalChain};
pub use config::{AppConfig, ConfigError, ConfigManager, GameConfig, PlaybackConfig, TrainerConfig};
pub use eq::{BandLabel, EqCatalog, EqualizerSettings};
pub use events::{EventBus, SessionEvent};
pub use output::{NodeHandle, OfflineOutput, OfflineTap, OutputEngine, RenderNode};
pub use round::{GuessFeedback, GuessOutcome, RoundEngine, RoundPhase, RoundTiming};
pub use session::{Command, CommandResult, GridCell, Session, SessionSnapshot};
pub use source::{BuiltinSource, NoiseColor, SignalSource, SignalSourceKind};
pub use stage::EqualizerStage;
pub use timeline::Timeline;
