//! Device-backed output engine
//!
//! CPAL streams are not `Send` on every platform, so each running stream
//! lives on its own thread. `start` spawns that thread and waits until the
//! device has accepted the stream; `stop` signals it and joins. The render
//! callback pulls from whichever node is currently connected.

use crate::audio::cpal_backend::{device_name, find_output_device};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig as CpalStreamConfig;
use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use eqtrain_core::domain::audio::{DeviceId, EngineStartError, Result, StreamConfig};
use eqtrain_core::domain::output::{lock_node, render_into, NodeHandle, OutputEngine};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

type NodeSlot = Arc<Mutex<Option<NodeHandle>>>;

struct StreamWorker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Output engine rendering into a CPAL device
pub struct CpalOutput {
    device_id: Option<DeviceId>,
    device_name: String,
    config: StreamConfig,
    slot: NodeSlot,
    worker: Option<StreamWorker>,
    error_tx: Sender<String>,
    error_rx: Receiver<String>,
}

impl CpalOutput {
    /// Resolve the device now so a bad `--device` fails early
    pub fn new(device_id: Option<DeviceId>, config: StreamConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = find_output_device(&host, device_id.as_ref())?;
        let device_name = device_name(&device);

        info!(
            device = %device_name,
            sample_rate = config.sample_rate.hz(),
            channels = config.channels.count(),
            buffer_size = config.buffer_size,
            "Creating output engine"
        );

        let (error_tx, error_rx) = unbounded();
        Ok(Self {
            device_id,
            device_name,
            config,
            slot: Arc::new(Mutex::new(None)),
            worker: None,
            error_tx,
            error_rx,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Stream errors reported by the device since the last call
    pub fn drain_errors(&self) -> Vec<String> {
        self.error_rx.try_iter().collect()
    }

    fn spawn_worker(&self) -> std::result::Result<StreamWorker, EngineStartError> {
        let (ready_tx, ready_rx) = bounded::<std::result::Result<(), String>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let device_id = self.device_id.clone();
        let config = self.config;
        let slot = Arc::clone(&self.slot);
        let error_tx = self.error_tx.clone();

        let handle = thread::Builder::new()
            .name("eqtrain-output".to_string())
            .spawn(move || {
                let stream = match build_stream(device_id.as_ref(), &config, slot, error_tx) {
                    Ok(stream) => stream,
                    Err(reason) => {
                        let _ = ready_tx.send(Err(reason));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(format!("Failed to start stream: {}", e)));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Returns on stop() or when the engine is dropped
                let _ = stop_rx.recv();
                drop(stream);
                debug!("Output stream closed");
            })
            .map_err(|e| EngineStartError(format!("Failed to spawn output thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(StreamWorker { stop_tx, handle }),
            Ok(Err(reason)) => {
                let _ = handle.join();
                Err(EngineStartError(reason))
            }
            Err(_) => {
                let _ = handle.join();
                Err(EngineStartError("Output thread exited during startup".to_string()))
            }
        }
    }
}

fn build_stream(
    device_id: Option<&DeviceId>,
    config: &StreamConfig,
    slot: NodeSlot,
    error_tx: Sender<String>,
) -> std::result::Result<cpal::Stream, String> {
    let host = cpal::default_host();
    let device = find_output_device(&host, device_id).map_err(|e| e.to_string())?;

    let channels = config.channels.count() as usize;
    let cpal_config = CpalStreamConfig {
        channels: config.channels.count(),
        sample_rate: config.sample_rate.hz(),
        buffer_size: cpal::BufferSize::Fixed(config.buffer_size),
    };

    device
        .build_output_stream(
            &cpal_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| match slot.try_lock() {
                Ok(guard) => match guard.as_ref() {
                    Some(node) => render_into(node, data, channels),
                    None => data.fill(0.0),
                },
                Err(_) => data.fill(0.0),
            },
            move |err| {
                error!("Output stream error: {}", err);
                let _ = error_tx.send(err.to_string());
            },
            None,
        )
        .map_err(|e| format!("Failed to build stream: {}", e))
}

impl OutputEngine for CpalOutput {
    fn connect(&mut self, node: NodeHandle) {
        *lock_node(&self.slot) = Some(node);
    }

    fn connected(&self) -> Option<NodeHandle> {
        lock_node(&self.slot).clone()
    }

    fn start(&mut self) -> std::result::Result<(), EngineStartError> {
        if self.worker.is_some() {
            return Ok(());
        }
        let worker = self.spawn_worker()?;
        self.worker = Some(worker);
        info!(device = %self.device_name, "Output stream started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            if worker.handle.join().is_err() {
                error!("Output thread panicked");
            }
            info!(device = %self.device_name, "Output stream stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    fn stream_config(&self) -> StreamConfig {
        self.config
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
