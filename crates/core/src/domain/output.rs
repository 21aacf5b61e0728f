//! Render graph nodes and the output engine seam
//!
//! Sources and the equalizer stage publish their audio as [`NodeHandle`]s.
//! An [`OutputEngine`] pulls from exactly one connected node on its own
//! thread. The device-backed engine lives in the `infra` crate; this module
//! provides [`OfflineOutput`], which renders on demand without a device.

use crate::domain::audio::{EngineStartError, StreamConfig};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use tracing::{debug, info};

/// Anything that can fill an interleaved buffer
pub trait RenderNode: Send {
    /// Overwrite `buffer` with the next `buffer.len() / channels` frames
    fn render(&mut self, buffer: &mut [f32], channels: usize);
}

/// Shared handle to a node in the render graph
pub type NodeHandle = Arc<Mutex<dyn RenderNode>>;

/// Lock a node from the control thread, recovering from a poisoned lock
pub fn lock_node<T: ?Sized>(node: &Mutex<T>) -> MutexGuard<'_, T> {
    node.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Render from the audio thread without blocking
///
/// Produces silence for this block when the control thread holds the node.
pub fn render_into(node: &NodeHandle, buffer: &mut [f32], channels: usize) {
    match node.try_lock() {
        Ok(mut guard) => guard.render(buffer, channels),
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().render(buffer, channels),
        Err(TryLockError::WouldBlock) => buffer.fill(0.0),
    }
}

/// Identity comparison of two nodes
pub fn same_node(a: &NodeHandle, b: &NodeHandle) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// The final stage of the chain: a device or a pull-based renderer
///
/// Implementations keep at most one connected node; connecting replaces the
/// previous one.
pub trait OutputEngine: Send {
    /// Route `node` to the output, replacing the current connection
    fn connect(&mut self, node: NodeHandle);

    /// The node currently routed to the output
    fn connected(&self) -> Option<NodeHandle>;

    /// Start rendering; a no-op when already running
    fn start(&mut self) -> Result<(), EngineStartError>;

    /// Stop rendering; a no-op when already stopped
    fn stop(&mut self);

    fn is_running(&self) -> bool;

    /// Format the engine renders in
    fn stream_config(&self) -> StreamConfig;
}

#[derive(Default)]
struct OfflineState {
    node: Option<NodeHandle>,
    running: bool,
    starts: u64,
    failure: Option<String>,
}

/// Device-less output engine that renders when asked
///
/// Used for headless sessions and for inspecting what the chain would play.
pub struct OfflineOutput {
    config: StreamConfig,
    state: Arc<Mutex<OfflineState>>,
}

/// Observer/control handle onto an [`OfflineOutput`] owned elsewhere
#[derive(Clone)]
pub struct OfflineTap {
    config: StreamConfig,
    state: Arc<Mutex<OfflineState>>,
}

impl OfflineOutput {
    pub fn new(config: StreamConfig) -> Self {
        info!(
            sample_rate = config.sample_rate.hz(),
            channels = config.channels.count(),
            "Creating offline output"
        );
        Self {
            config,
            state: Arc::new(Mutex::new(OfflineState::default())),
        }
    }

    /// Handle that stays valid after the engine is moved into a chain
    pub fn tap(&self) -> OfflineTap {
        OfflineTap {
            config: self.config,
            state: Arc::clone(&self.state),
        }
    }
}

impl OutputEngine for OfflineOutput {
    fn connect(&mut self, node: NodeHandle) {
        lock_node(&self.state).node = Some(node);
    }

    fn connected(&self) -> Option<NodeHandle> {
        lock_node(&self.state).node.clone()
    }

    fn start(&mut self) -> Result<(), EngineStartError> {
        let mut state = lock_node(&self.state);
        if state.running {
            return Ok(());
        }
        if let Some(reason) = &state.failure {
            return Err(EngineStartError(reason.clone()));
        }
        state.running = true;
        state.starts += 1;
        debug!(starts = state.starts, "Offline output started");
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = lock_node(&self.state);
        if state.running {
            state.running = false;
            debug!("Offline output stopped");
        }
    }

    fn is_running(&self) -> bool {
        lock_node(&self.state).running
    }

    fn stream_config(&self) -> StreamConfig {
        self.config
    }
}

impl OfflineTap {
    pub fn is_running(&self) -> bool {
        lock_node(&self.state).running
    }

    pub fn connected(&self) -> Option<NodeHandle> {
        lock_node(&self.state).node.clone()
    }

    /// How many stopped → running transitions the engine went through
    pub fn start_count(&self) -> u64 {
        lock_node(&self.state).starts
    }

    /// Make subsequent starts fail, as an unavailable device would
    pub fn set_unavailable(&self, reason: Option<String>) {
        lock_node(&self.state).failure = reason;
    }

    /// Pull `frames` frames from the connected node
    ///
    /// Returns silence while stopped or unconnected.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let channels = self.config.channels.count() as usize;
        let mut buffer = vec![0.0; frames * channels];

        let node = {
            let state = lock_node(&self.state);
            if !state.running {
                return buffer;
            }
            state.node.clone()
        };

        if let Some(node) = node {
            render_into(&node, &mut buffer, channels);
        }
        buffer
    }
}
