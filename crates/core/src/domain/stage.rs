//! Equalizer stage: a peaking filter wrapped around the active source

use crate::domain::dsp::{Effect, PeakingEqualizer};
use crate::domain::eq::{EqCatalog, EqualizerSettings};
use crate::domain::output::{lock_node, render_into, NodeHandle, RenderNode};
use crate::domain::source::SignalSource;
use rand::Rng;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Render node that pulls from its input and filters in place
struct FilterNode {
    input: NodeHandle,
    eq: PeakingEqualizer,
}

impl RenderNode for FilterNode {
    fn render(&mut self, buffer: &mut [f32], channels: usize) {
        render_into(&self.input, buffer, channels);
        self.eq.process(buffer, channels);
    }
}

pub struct EqualizerStage {
    settings: EqualizerSettings,
    node: Arc<Mutex<FilterNode>>,
}

impl EqualizerStage {
    pub fn new(source: &SignalSource, settings: EqualizerSettings, sample_rate: u32) -> Self {
        let mut eq = PeakingEqualizer::new(sample_rate);
        eq.set_band(settings.center_frequency(), settings.gain_db(), settings.q());
        Self {
            settings,
            node: Arc::new(Mutex::new(FilterNode {
                input: source.output_node(),
                eq,
            })),
        }
    }

    /// Apply new band parameters; safe while the filter renders
    pub fn configure(&mut self, settings: EqualizerSettings) {
        lock_node(&self.node).eq.set_band(
            settings.center_frequency(),
            settings.gain_db(),
            settings.q(),
        );
        self.settings = settings;
        debug!(eq = %settings, "Equalizer configured");
    }

    pub fn settings(&self) -> EqualizerSettings {
        self.settings
    }

    /// The filtered signal
    pub fn output_node(&self) -> NodeHandle {
        self.node.clone()
    }

    /// Rebind the filter input to `source` and clear filter history
    pub fn rebuild(&mut self, source: &SignalSource) {
        let mut node = lock_node(&self.node);
        node.input = source.output_node();
        node.eq.reset();
    }

    /// Draw settings that differ from the live ones and apply them
    pub fn randomize<R: Rng + ?Sized>(&mut self, catalog: &EqCatalog, rng: &mut R) -> EqualizerSettings {
        let next = self.settings.randomize_distinct(catalog, rng);
        self.configure(next);
        next
    }
}
