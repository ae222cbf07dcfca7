//! Camera abstraction for frame capture.
//!
//! This module provides a trait-based abstraction over camera hardware,
//! allowing for both real camera input and mock implementations for testing.

use super::{CaptureConfig, Frame};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that can occur during camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    #[error("failed to open camera: {0}")]
    OpenFailed(String),
    #[error("failed to configure camera: {0}")]
    ConfigFailed(String),
    #[error("failed to capture frame: {0}")]
    CaptureFailed(String),
    #[error("camera not initialized")]
    NotInitialized,
}

/// Trait for camera implementations.
///
/// The capture engine moves the camera onto its acquisition thread while
/// streaming, so implementations must be `Send`.
pub trait Camera: Send {
    /// Opens and configures the camera for continuous capture.
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError>;

    /// Blocks until the next frame is available and returns it.
    fn capture(&mut self) -> Result<Frame, CameraError>;

    /// Checks if the camera is currently open.
    fn is_open(&self) -> bool;

    /// Closes the camera and releases the device.
    fn close(&mut self);
}

impl<C: Camera + ?Sized> Camera for Box<C> {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        (**self).open(config)
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        (**self).capture()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Mock camera that generates synthetic RGB frames.
///
/// Frames are paced at the configured frame rate unless built with
/// [`MockCamera::unpaced`]. Every frame's content is a pure function of its
/// sequence number (see [`MockCamera::pattern`]), so tests can verify a
/// frame they observe is exactly one the camera produced.
#[derive(Debug)]
pub struct MockCamera {
    config: Option<CaptureConfig>,
    sequence: u64,
    paced: bool,
    next_deadline: Option<Instant>,
    unavailable: bool,
    disconnect_after: Option<u64>,
}

impl Default for MockCamera {
    fn default() -> Self {
        Self {
            config: None,
            sequence: 0,
            paced: true,
            next_deadline: None,
            unavailable: false,
            disconnect_after: None,
        }
    }
}

impl MockCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produces frames as fast as they are requested.
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    /// Makes every `open` fail, as if the device were absent.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Fails every capture after `frames` frames since the last open.
    pub fn disconnect_after(mut self, frames: u64) -> Self {
        self.disconnect_after = Some(frames);
        self
    }

    /// The pixel content of frame number `sequence`.
    pub fn pattern(width: u32, height: u32, sequence: u64) -> Vec<u8> {
        let len = (width as usize) * (height as usize) * 3;
        (0..len)
            .map(|i| ((i as u64).wrapping_mul(31) ^ sequence.wrapping_mul(7)) as u8)
            .collect()
    }

    fn wait_for_deadline(&mut self, interval: Duration) {
        let now = Instant::now();
        let deadline = self.next_deadline.unwrap_or(now);
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        self.next_deadline = Some(deadline.max(now) + interval);
    }
}

impl Camera for MockCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        if self.unavailable {
            return Err(CameraError::DeviceNotFound(config.device.to_string()));
        }
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;
        self.config = Some(config.clone());
        self.sequence = 0;
        self.next_deadline = None;
        tracing::info!(device = %config.device, "MockCamera opened");
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        let config = self.config.as_ref().ok_or(CameraError::NotInitialized)?;
        let (width, height, interval) = (config.width, config.height, config.frame_interval());

        if let Some(limit) = self.disconnect_after {
            if self.sequence >= limit {
                return Err(CameraError::CaptureFailed("device disconnected".to_string()));
            }
        }
        if self.paced {
            self.wait_for_deadline(interval);
        }

        self.sequence += 1;
        let pixels = Self::pattern(width, height, self.sequence);
        Ok(Frame::new(pixels, width, height, self.sequence))
    }

    fn is_open(&self) -> bool {
        self.config.is_some()
    }

    fn close(&mut self) {
        if self.config.take().is_some() {
            tracing::info!("MockCamera closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_camera_lifecycle() {
        let mut camera = MockCamera::new().unpaced();
        let config = CaptureConfig::default();

        assert!(!camera.is_open());

        camera.open(&config).unwrap();
        assert!(camera.is_open());

        let frame = camera.capture().unwrap();
        assert!(frame.is_valid());
        assert_eq!(frame.sequence(), 1);
        assert_eq!(frame.pixels(), MockCamera::pattern(640, 480, 1).as_slice());

        let frame2 = camera.capture().unwrap();
        assert_eq!(frame2.sequence(), 2);

        camera.close();
        assert!(!camera.is_open());
    }

    #[test]
    fn test_capture_without_open() {
        let mut camera = MockCamera::new();
        assert!(matches!(
            camera.capture(),
            Err(CameraError::NotInitialized)
        ));
    }

    #[test]
    fn test_unavailable_camera_fails_open() {
        let mut camera = MockCamera::new().unavailable();
        assert!(matches!(
            camera.open(&CaptureConfig::default()),
            Err(CameraError::DeviceNotFound(_))
        ));
        assert!(!camera.is_open());
    }

    #[test]
    fn test_invalid_config_fails_open() {
        let mut camera = MockCamera::new();
        let config = CaptureConfig::with_dimensions(0, 480);
        assert!(matches!(
            camera.open(&config),
            Err(CameraError::ConfigFailed(_))
        ));
    }

    #[test]
    fn test_disconnect_after_limit() {
        let mut camera = MockCamera::new().unpaced().disconnect_after(2);
        camera.open(&CaptureConfig::with_dimensions(4, 4)).unwrap();
        assert!(camera.capture().is_ok());
        assert!(camera.capture().is_ok());
        assert!(matches!(camera.capture(), Err(CameraError::CaptureFailed(_))));

        // Reopening resets the counter.
        camera.open(&CaptureConfig::with_dimensions(4, 4)).unwrap();
        assert!(camera.capture().is_ok());
    }

    #[test]
    fn test_paced_capture_respects_frame_rate() {
        let mut config = CaptureConfig::with_dimensions(4, 4);
        config.fps = 50;
        let mut camera = MockCamera::new();
        camera.open(&config).unwrap();

        let start = Instant::now();
        for _ in 0..3 {
            camera.capture().unwrap();
        }
        // First frame is immediate, the next two wait one interval each.
        assert!(start.elapsed() >= Duration::from_millis(35));
    }
}
