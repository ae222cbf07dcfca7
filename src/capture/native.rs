//! Real camera backend built on `nokhwa` (V4L2 on Linux, libcamera through
//! its V4L2 compatibility layer on the Pi).

use super::{Camera, CameraError, CaptureConfig, DeviceId, Frame};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, ControlValueSetter, FrameFormat, KnownCameraControl,
    RequestedFormat, RequestedFormatType, Resolution,
};

/// Camera backed by a physical capture device.
pub struct NokhwaCamera {
    device: Option<nokhwa::Camera>,
    sequence: u64,
}

impl NokhwaCamera {
    pub fn new() -> Self {
        Self {
            device: None,
            sequence: 0,
        }
    }

    fn index(id: &DeviceId) -> CameraIndex {
        match id.index() {
            Some(i) => CameraIndex::Index(i),
            None => CameraIndex::String(id.to_string()),
        }
    }
}

impl Default for NokhwaCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NokhwaCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NokhwaCamera")
            .field("open", &self.device.is_some())
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl Camera for NokhwaCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;
        self.close();

        // Exact format: an unsupported resolution or rate is an open failure,
        // not a silent downgrade.
        let format = CameraFormat::new(
            Resolution::new(config.width, config.height),
            FrameFormat::MJPEG,
            config.fps,
        );
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Exact(format));

        let mut device = nokhwa::Camera::new(Self::index(&config.device), requested)
            .map_err(|e| CameraError::OpenFailed(format!("{}: {}", config.device, e)))?;

        if let Some(focus) = config.manual_focus {
            device
                .set_camera_control(
                    KnownCameraControl::Focus,
                    ControlValueSetter::Integer(focus.round() as i64),
                )
                .map_err(|e| CameraError::ConfigFailed(format!("manual focus: {}", e)))?;
        }

        device
            .open_stream()
            .map_err(|e| CameraError::OpenFailed(e.to_string()))?;

        tracing::info!(
            device = %config.device,
            width = config.width,
            height = config.height,
            fps = config.fps,
            "Camera opened"
        );
        self.device = Some(device);
        self.sequence = 0;
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        let device = self.device.as_mut().ok_or(CameraError::NotInitialized)?;
        let buffer = device
            .frame()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
        let image = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        self.sequence += 1;
        let (width, height) = image.dimensions();
        Ok(Frame::new(image.into_raw(), width, height, self.sequence))
    }

    fn is_open(&self) -> bool {
        self.device.is_some()
    }

    fn close(&mut self) {
        if let Some(mut device) = self.device.take() {
            if let Err(e) = device.stop_stream() {
                tracing::warn!(error = %e, "Failed to stop camera stream cleanly");
            }
            tracing::info!("Camera closed");
        }
    }
}
