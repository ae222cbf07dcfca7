//! Capture engine: camera lifecycle, background acquisition and snapshots.

use super::encode::{self, EncodeError, DEFAULT_JPEG_QUALITY};
use super::{Camera, CameraError, CaptureConfig, Frame, FrameSlot};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Errors reported by the capture engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The device could not be opened or configured.
    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(#[source] CameraError),
    /// The operation needs a running acquisition loop.
    #[error("camera is not streaming")]
    CameraNotStreaming,
    /// Acquisition is running but has not produced a frame yet.
    #[error("no frame available yet")]
    NoFrameAvailable,
    /// Writing the snapshot to disk failed.
    #[error("failed to write snapshot to {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("failed to spawn acquisition thread: {0}")]
    Spawn(#[source] io::Error),
}

impl EngineError {
    /// True for conditions that clear up on their own or after `start()`.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::CameraNotStreaming | EngineError::NoFrameAvailable
        )
    }
}

/// A snapshot written to disk.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Where the JPEG was written.
    pub path: PathBuf,
    /// The exact frame that was written.
    pub frame: Arc<Frame>,
}

/// Point-in-time counters for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub streaming: bool,
    pub frames_acquired: u64,
    pub snapshots_written: u64,
    pub snapshot_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    frames_acquired: AtomicU64,
    snapshots_written: AtomicU64,
    snapshot_failures: AtomicU64,
}

/// State shared between the engine and its acquisition thread.
#[derive(Debug, Default)]
struct Shared {
    slot: FrameSlot,
    streaming: AtomicBool,
    counters: Counters,
}

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Box<dyn Camera>>,
}

/// Device ownership. `camera` is `None` while the worker holds it.
struct Lifecycle {
    camera: Option<Box<dyn Camera>>,
    worker: Option<Worker>,
}

/// Owns the camera and keeps the latest frame available to any reader.
///
/// `start()` moves the camera onto a dedicated acquisition thread that
/// refreshes the frame slot; `stop()` takes it back and closes it. Readers
/// (`latest_frame`, `capture_snapshot`) never wait for a new frame.
pub struct CaptureEngine {
    config: CaptureConfig,
    jpeg_quality: u8,
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

impl CaptureEngine {
    /// Opens and configures `camera` for continuous capture.
    pub fn open(config: CaptureConfig, camera: impl Camera + 'static) -> Result<Self, EngineError> {
        Self::open_boxed(config, Box::new(camera))
    }

    /// Like [`CaptureEngine::open`] for an already boxed backend.
    pub fn open_boxed(
        config: CaptureConfig,
        mut camera: Box<dyn Camera>,
    ) -> Result<Self, EngineError> {
        config
            .validate()
            .map_err(|e| EngineError::DeviceUnavailable(CameraError::ConfigFailed(e.to_string())))?;
        camera.open(&config).map_err(EngineError::DeviceUnavailable)?;

        tracing::info!(
            device = %config.device,
            width = config.width,
            height = config.height,
            fps = config.fps,
            "Capture engine opened"
        );

        Ok(Self {
            config,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            shared: Arc::new(Shared::default()),
            lifecycle: Mutex::new(Lifecycle {
                camera: Some(camera),
                worker: None,
            }),
        })
    }

    /// Sets the JPEG quality used for snapshots and data URLs.
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Whether the acquisition loop is running.
    pub fn is_streaming(&self) -> bool {
        self.shared.streaming.load(Ordering::Acquire)
    }

    /// Starts the acquisition loop. No-op if it is already running.
    ///
    /// Re-opens the device first if a previous `stop()` or a lost device
    /// left it closed.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut lifecycle = self.lock_lifecycle();

        if let Some(worker) = &lifecycle.worker {
            if self.is_streaming() && !worker.handle.is_finished() {
                return Ok(());
            }
        }
        // The previous worker ended on its own (end of stream); take the
        // device back before starting over.
        Self::reap(&mut lifecycle);

        let mut camera = lifecycle
            .camera
            .take()
            .ok_or(EngineError::DeviceUnavailable(CameraError::NotInitialized))?;

        if !camera.is_open() {
            if let Err(e) = camera.open(&self.config) {
                lifecycle.camera = Some(camera);
                return Err(EngineError::DeviceUnavailable(e));
            }
            tracing::info!(device = %self.config.device, "Camera re-opened");
        }

        let stop = Arc::new(AtomicBool::new(false));
        self.shared.streaming.store(true, Ordering::Release);

        let spawned = thread::Builder::new().name("frame-acquisition".into()).spawn({
            let shared = Arc::clone(&self.shared);
            let stop = Arc::clone(&stop);
            move || acquisition_loop(camera, &shared, &stop)
        });

        match spawned {
            Ok(handle) => {
                lifecycle.worker = Some(Worker { stop, handle });
                tracing::info!("Streaming started");
                Ok(())
            }
            Err(e) => {
                self.shared.streaming.store(false, Ordering::Release);
                Err(EngineError::Spawn(e))
            }
        }
    }

    /// Stops acquisition, closes the device and clears the frame slot.
    ///
    /// Safe to call at any time, including before the first `start()`.
    pub fn stop(&self) {
        let mut lifecycle = self.lock_lifecycle();
        let was_running = lifecycle.worker.is_some();

        if let Some(worker) = &lifecycle.worker {
            worker.stop.store(true, Ordering::Release);
        }
        Self::reap(&mut lifecycle);

        if let Some(camera) = lifecycle.camera.as_mut() {
            camera.close();
        }
        self.shared.slot.clear();
        self.shared.streaming.store(false, Ordering::Release);

        if was_running {
            tracing::info!("Streaming stopped");
        }
    }

    /// Returns the most recent frame, or `None` before the first one.
    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.shared.slot.latest()
    }

    /// Writes the latest frame to `destination` as a JPEG.
    ///
    /// Parent directories are created as needed. Nothing touches the
    /// filesystem unless the engine is streaming and holds a frame.
    pub fn capture_snapshot(&self, destination: impl AsRef<Path>) -> Result<Snapshot, EngineError> {
        if !self.is_streaming() {
            return Err(EngineError::CameraNotStreaming);
        }
        let frame = self.latest_frame().ok_or(EngineError::NoFrameAvailable)?;

        let path = destination.as_ref().to_path_buf();
        match self.persist(&frame, &path) {
            Ok(()) => {
                self.shared
                    .counters
                    .snapshots_written
                    .fetch_add(1, Ordering::Relaxed);
                tracing::debug!(path = %path.display(), sequence = frame.sequence(), "Snapshot written");
                Ok(Snapshot { path, frame })
            }
            Err(e) => {
                self.shared
                    .counters
                    .snapshot_failures
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(path = %path.display(), error = %e, "Snapshot failed");
                Err(e)
            }
        }
    }

    /// Encodes a frame as a JPEG data URL at the engine's quality.
    pub fn encode_as_data_url(&self, frame: &Frame) -> Result<String, EngineError> {
        Ok(encode::encode_data_url_with_quality(frame, self.jpeg_quality)?)
    }

    pub fn stats(&self) -> EngineStats {
        let counters = &self.shared.counters;
        EngineStats {
            streaming: self.is_streaming(),
            frames_acquired: counters.frames_acquired.load(Ordering::Relaxed),
            snapshots_written: counters.snapshots_written.load(Ordering::Relaxed),
            snapshot_failures: counters.snapshot_failures.load(Ordering::Relaxed),
        }
    }

    fn persist(&self, frame: &Frame, path: &Path) -> Result<(), EngineError> {
        let jpeg = encode::encode_jpeg(frame, self.jpeg_quality)?;
        let persist_err = |source| EngineError::Persist {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(persist_err)?;
        }
        std::fs::write(path, jpeg).map_err(persist_err)
    }

    /// Joins a finished or stopping worker and takes the camera back.
    fn reap(lifecycle: &mut Lifecycle) {
        let Some(worker) = lifecycle.worker.take() else {
            return;
        };
        match worker.handle.join() {
            Ok(camera) => lifecycle.camera = Some(camera),
            Err(_) => tracing::error!("Acquisition thread panicked; camera lost"),
        }
    }

    fn lock_lifecycle(&self) -> std::sync::MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CaptureEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureEngine")
            .field("config", &self.config)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("streaming", &self.is_streaming())
            .finish()
    }
}

/// Runs on the acquisition thread until stopped or the device fails.
///
/// Returns the (closed) camera so the engine can re-open it later.
fn acquisition_loop(mut camera: Box<dyn Camera>, shared: &Shared, stop: &AtomicBool) -> Box<dyn Camera> {
    while !stop.load(Ordering::Acquire) {
        match camera.capture() {
            Ok(frame) => {
                // A read that completes after stop() was requested is dropped.
                if stop.load(Ordering::Acquire) {
                    break;
                }
                tracing::trace!(sequence = frame.sequence(), "Frame acquired");
                shared.slot.publish(Arc::new(frame));
                shared.counters.frames_acquired.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Camera stream ended");
                shared.slot.clear();
                shared.streaming.store(false, Ordering::Release);
                break;
            }
        }
        thread::yield_now();
    }
    camera.close();
    camera
}
